//! Route scraping
//!
//! Layers, bottom up:
//! - [`url`]: travel-date rewriting and the date window
//! - [`session`]: the rendering-engine seam
//! - [`browser`]: the headless Chrome implementation of that seam
//! - [`stealth`]: automation hiding and human-like pacing
//! - [`fetcher`]: one task, with retries and blocked-page detection
//! - [`pipeline`]: all tasks, with bounded concurrency
//! - [`list`]: route list loading

pub mod browser;
pub mod fetcher;
pub mod list;
pub mod pipeline;
pub mod session;
pub mod stealth;
pub mod url;

pub use browser::{BrowserProfile, ChromiumSessions};
pub use fetcher::{FetchSettings, SeatFetcher};
pub use list::load_routes;
pub use pipeline::{PipelineConfig, RunOutcome, ScrapePipeline, StatsSnapshot};
pub use session::{RenderSession, SessionProvider};
pub use stealth::StealthPolicy;
