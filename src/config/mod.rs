//! Configuration management for the fill-rate scraper
//!
//! Configuration is loaded once (environment variables or a TOML file),
//! validated, and then passed by value into the pipeline. Core code never
//! reads the environment itself.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analytics::DEFAULT_BUS_CAPACITY;

/// Local development database; never used when `FILLRATE_ENV=production`
pub const DEV_DATABASE_URL: &str = "postgresql://localhost/fillrate";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scrape and retry behaviour
    pub scrape: ScrapeConfig,

    /// Rendering engine launch settings
    pub browser: BrowserSettings,

    /// Snapshot database
    pub database: DatabaseConfig,

    /// Input and output files
    pub output: OutputConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scrape-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Seats per bus
    pub bus_capacity: u32,

    /// Number of travel dates, starting today
    pub date_range: u32,

    /// Maximum concurrently open pages
    pub max_tabs: usize,

    /// Attempts per task, including the first
    pub max_retries: u32,

    /// Cool-down between attempts in milliseconds
    pub retry_cooldown_ms: u64,

    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,

    /// Whole-run deadline in seconds; unset means no deadline
    pub run_timeout_secs: Option<u64>,

    /// JavaScript regex (case-insensitive) selecting seat labels
    pub seat_text_pattern: String,

    /// Human-like pacing
    pub pacing: PacingConfig,
}

/// Scroll and wait pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Scroll steps after the page settles
    pub scroll_count: u32,

    /// Pixel range for one scroll step
    pub scroll_min_px: i64,
    pub scroll_max_px: i64,

    /// Pause range after each scroll step, milliseconds
    pub scroll_pause_min_ms: u64,
    pub scroll_pause_max_ms: u64,

    /// Settle range after navigation, milliseconds
    pub settle_min_ms: u64,
    pub settle_max_ms: u64,
}

/// Browser launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run without a visible window
    pub headless: bool,

    /// Chrome/Chromium binary; autodetected when unset
    pub executable: Option<PathBuf>,

    /// User agents; one is picked per run
    pub user_agents: Vec<String>,

    /// Viewport size
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Extra command-line switches
    pub extra_args: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,

    /// Snapshot table name
    pub table: String,

    /// Maximum pool size
    pub pool_size: usize,

    /// Use this SQLite file instead of PostgreSQL
    pub sqlite_path: Option<PathBuf>,
}

/// Input/output file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Route list CSV
    pub routes_csv: PathBuf,

    /// JSON backup of each run
    pub backup_json: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            bus_capacity: DEFAULT_BUS_CAPACITY,
            date_range: 3,
            max_tabs: 3,
            max_retries: 3,
            retry_cooldown_ms: 3_000,
            navigation_timeout_secs: 60,
            run_timeout_secs: None,
            seat_text_pattern: String::from("seat"),
            pacing: PacingConfig::default(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            scroll_count: 6,
            scroll_min_px: 2_000,
            scroll_max_px: 5_000,
            scroll_pause_min_ms: 1_000,
            scroll_pause_max_ms: 2_000,
            settle_min_ms: 4_000,
            settle_max_ms: 7_000,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            user_agents: vec![
                String::from("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"),
                String::from("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36"),
            ],
            viewport_width: 1366,
            viewport_height: 768,
            extra_args: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::from(DEV_DATABASE_URL),
            table: String::from("redbus_fill_rates"),
            pool_size: 4,
            sqlite_path: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            routes_csv: PathBuf::from("routes.csv"),
            backup_json: PathBuf::from("route_fill_rates.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl LoggingConfig {
    /// Logging settings alone, read before anything else is loaded
    pub fn from_env() -> Self {
        let mut logging = Self::default();
        if let Ok(level) = std::env::var("FILLRATE_LOG_LEVEL") {
            logging.level = level;
        }
        if let Ok(format) = std::env::var("FILLRATE_LOG_FORMAT") {
            logging.format = format;
        }
        logging
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// `DATABASE_URL` is mandatory when `FILLRATE_ENV=production`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        let scrape = &mut config.scrape;

        if let Some(v) = env_parse("FILLRATE_BUS_CAPACITY") {
            scrape.bus_capacity = v;
        }
        if let Some(v) = env_parse("FILLRATE_DATE_RANGE") {
            scrape.date_range = v;
        }
        if let Some(v) = env_parse("FILLRATE_MAX_TABS") {
            scrape.max_tabs = v;
        }
        if let Some(v) = env_parse("FILLRATE_MAX_RETRIES") {
            scrape.max_retries = v;
        }
        if let Some(v) = env_parse("FILLRATE_SCROLL_COUNT") {
            scrape.pacing.scroll_count = v;
        }
        if let Some(v) = env_parse("FILLRATE_NAV_TIMEOUT") {
            scrape.navigation_timeout_secs = v;
        }
        if let Some(v) = env_parse("FILLRATE_RUN_TIMEOUT") {
            scrape.run_timeout_secs = Some(v);
        }

        if let Some(v) = env_bool("FILLRATE_HEADLESS") {
            config.browser.headless = v;
        }
        if let Ok(path) = std::env::var("FILLRATE_CHROME_PATH") {
            config.browser.executable = Some(PathBuf::from(path));
        }

        config.database.apply_env()?;
        if let Ok(path) = std::env::var("FILLRATE_SQLITE_PATH") {
            config.database.sqlite_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("FILLRATE_ROUTES") {
            config.output.routes_csv = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("FILLRATE_OUTPUT_JSON") {
            config.output.backup_json = PathBuf::from(path);
        }

        config.logging = LoggingConfig::from_env();

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;
        config.database.apply_env()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let scrape = &self.scrape;
        let pacing = &scrape.pacing;

        if scrape.bus_capacity == 0 {
            anyhow::bail!("bus_capacity must be greater than 0");
        }
        if scrape.date_range == 0 {
            anyhow::bail!("date_range must be greater than 0");
        }
        if scrape.max_tabs == 0 {
            anyhow::bail!("max_tabs must be greater than 0");
        }
        if scrape.max_retries == 0 {
            anyhow::bail!("max_retries must be greater than 0");
        }
        if scrape.navigation_timeout_secs == 0 {
            anyhow::bail!("navigation_timeout_secs must be greater than 0");
        }
        if scrape.seat_text_pattern.trim().is_empty() {
            anyhow::bail!("seat_text_pattern must not be empty");
        }
        if pacing.scroll_min_px > pacing.scroll_max_px
            || pacing.scroll_pause_min_ms > pacing.scroll_pause_max_ms
            || pacing.settle_min_ms > pacing.settle_max_ms
        {
            anyhow::bail!("pacing ranges must have min <= max");
        }
        if self.browser.viewport_width == 0 || self.browser.viewport_height == 0 {
            anyhow::bail!("viewport dimensions must be greater than 0");
        }
        if self.database.pool_size == 0 {
            anyhow::bail!("pool_size must be greater than 0");
        }
        if !is_sql_identifier(&self.database.table) {
            anyhow::bail!("table must be a plain SQL identifier: {}", self.database.table);
        }

        Ok(())
    }

    /// Get navigation timeout as Duration
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape.navigation_timeout_secs)
    }

    /// Get the run deadline, if any
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.scrape.run_timeout_secs.map(Duration::from_secs)
    }

    /// Get the cool-down between attempts
    #[must_use]
    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.scrape.retry_cooldown_ms)
    }
}

impl DatabaseConfig {
    /// Take the connection string from `DATABASE_URL` when set.
    ///
    /// With `FILLRATE_ENV=production` the variable is mandatory, whatever a
    /// config file says.
    pub fn apply_env(&mut self) -> Result<()> {
        let production = std::env::var("FILLRATE_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => self.url = url,
            _ if production => {
                anyhow::bail!("DATABASE_URL must be set when FILLRATE_ENV=production")
            }
            _ => {}
        }
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` is allowed.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
