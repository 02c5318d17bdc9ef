//! fillrate - bus route fill-rate scraper
//!
//! Visits per-route listing pages for a rolling window of travel dates,
//! reads the remaining-seat labels, computes how full each route is, and
//! replaces a stored snapshot with the fresh results.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - URL rewriting, rendering sessions, retries and the worker pool
//! - [`parser`] - Seat label parsing
//! - [`analytics`] - Fill-rate computation and per-route summaries
//! - [`models`] - Core data structures and types
//! - [`storage`] - Snapshot stores (PostgreSQL, SQLite) and the JSON backup
//! - [`metrics`] - Prometheus counters for runs
//! - [`utils`] - Retry, jitter and error helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fillrate::config::Config;
//! use fillrate::crawler::{
//!     BrowserProfile, ChromiumSessions, FetchSettings, PipelineConfig, ScrapePipeline,
//!     SeatFetcher, StealthPolicy,
//! };
//! use fillrate::utils::jitter::Jitter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let jitter = Arc::new(Jitter::from_entropy());
//!     let profile = BrowserProfile::resolve(&config.browser, &jitter, config.navigation_timeout());
//!     let sessions = ChromiumSessions::launch(&profile).await?;
//!
//!     let fetcher = SeatFetcher::new(
//!         sessions.clone(),
//!         StealthPolicy::new(config.scrape.pacing.clone(), jitter),
//!         FetchSettings::from_config(&config),
//!     );
//!     let pipeline = ScrapePipeline::new(PipelineConfig::from_config(&config), Arc::new(fetcher));
//!     let routes = fillrate::crawler::load_routes(&config.output.routes_csv)?;
//!     let outcome = pipeline.run(&routes, chrono::Local::now().date_naive()).await;
//!     println!("{} results", outcome.results.len());
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod crawler;
pub mod error;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{ScrapePipeline, SeatFetcher};
    pub use crate::error::{Error, ErrorCategory, FillRateErrorTrait};
    pub use crate::models::{Route, RouteTask, ScrapeResult};
    pub use crate::storage::{persist_run, SnapshotStore};
}

// Direct re-exports for convenience
pub use models::{Route, RouteTask, ScrapeResult};
