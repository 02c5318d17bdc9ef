use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::path::PathBuf;
use std::sync::Arc;

use fillrate::analytics::summarize;
use fillrate::config::Config;
use fillrate::error::Error;
use fillrate::crawler::{
    load_routes, BrowserProfile, ChromiumSessions, FetchSettings, PipelineConfig, RunOutcome,
    ScrapePipeline, SeatFetcher, StealthPolicy,
};
use fillrate::metrics;
use fillrate::storage::{open_store, persist_run, PersistReport, SharedSnapshotStore};
use fillrate::utils::jitter::Jitter;
use fillrate::utils::truncate_text;

use super::load_config;

/// Options of the `run` command
pub struct RunArgs {
    pub routes: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub days: Option<u32>,
    pub tabs: Option<usize>,
    pub start_date: Option<NaiveDate>,
    pub output: Option<PathBuf>,
    pub no_db: bool,
    pub sqlite: Option<PathBuf>,
    pub run_timeout: Option<u64>,
    pub metrics_out: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.routes {
            config.output.routes_csv = path.clone();
        }
        if let Some(days) = self.days {
            config.scrape.date_range = days;
        }
        if let Some(tabs) = self.tabs {
            config.scrape.max_tabs = tabs;
        }
        if let Some(path) = &self.output {
            config.output.backup_json = path.clone();
        }
        if let Some(path) = &self.sqlite {
            config.database.sqlite_path = Some(path.clone());
        }
        if let Some(secs) = self.run_timeout {
            config.scrape.run_timeout_secs = Some(secs);
        }
    }
}

pub async fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config
        .validate()
        .map_err(|e| Error::config(format!("Invalid configuration: {e:#}")))?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }
    let timer = metrics::start_run_timer();

    let routes = load_routes(&config.output.routes_csv).with_context(|| {
        format!(
            "Failed to load routes from {}",
            config.output.routes_csv.display()
        )
    })?;
    if routes.is_empty() {
        tracing::warn!("Route list is empty, the snapshot will be cleared");
    }

    let store: Option<SharedSnapshotStore> = if args.no_db {
        None
    } else {
        Some(open_store(&config.database).context("Failed to open snapshot store")?)
    };

    let start = args
        .start_date
        .unwrap_or_else(|| Local::now().date_naive());

    println!("Starting fill-rate run");
    println!("========================");
    println!("  Routes: {}", routes.len());
    println!("  Dates: {} from {start}", config.scrape.date_range);
    println!("  Tabs: {}", config.scrape.max_tabs);

    let outcome = scrape(&config, &routes, start).await?;

    let report = persist_run(
        store.as_deref(),
        Some(config.output.backup_json.as_path()),
        &outcome.results,
    )
    .await;

    print_summary(&outcome, &report);

    drop(timer);
    if let Some(path) = &args.metrics_out {
        write_metrics(path).await;
    }

    Ok(())
}

/// Launch the browser, run the pipeline, close the browser.
/// A launch failure aborts the run before anything is persisted.
async fn scrape(
    config: &Config,
    routes: &[fillrate::Route],
    start: NaiveDate,
) -> Result<RunOutcome> {
    let jitter = Arc::new(Jitter::from_entropy());
    let profile = BrowserProfile::resolve(&config.browser, &jitter, config.navigation_timeout());
    let sessions = ChromiumSessions::launch(&profile)
        .await
        .context("Failed to launch browser")?;

    let fetcher = SeatFetcher::new(
        sessions.clone(),
        StealthPolicy::new(config.scrape.pacing.clone(), jitter),
        FetchSettings::from_config(config),
    );
    let pipeline = ScrapePipeline::new(PipelineConfig::from_config(config), Arc::new(fetcher));

    let outcome = pipeline.run(routes, start).await;

    drop(pipeline);
    sessions.shutdown().await;

    Ok(outcome)
}

fn print_summary(outcome: &RunOutcome, report: &PersistReport) {
    let stats = &outcome.stats;

    println!("\nRun Summary");
    println!("========================");
    println!("  Tasks: {}", stats.total_tasks);
    println!("  Succeeded: {}", stats.success_count);
    println!("  Dropped: {}", stats.dropped_count);
    if outcome.timed_out {
        println!("  Cancelled by deadline: {}", stats.cancelled_count());
    }
    println!("  Peak open pages: {}", stats.peak_in_flight);

    let summaries = summarize(&outcome.results);
    if !summaries.is_empty() {
        println!();
        println!("{:<32} {:>5} {:>6} {:>8} {:>8}", "Route", "Dates", "Buses", "Mean %", "Max %");
        for s in &summaries {
            println!(
                "{:<32} {:>5} {:>6} {:>8.2} {:>8.2}",
                truncate_text(&s.route_name, 32),
                s.dates,
                s.buses,
                s.mean_fill_rate,
                s.max_fill_rate
            );
        }
    }

    println!();
    match &report.backup {
        Some(Ok(rows)) => println!("  Backup: {rows} rows written"),
        Some(Err(e)) => println!("  Backup: FAILED ({e})"),
        None => println!("  Backup: skipped"),
    }
    match &report.snapshot {
        Some(Ok(rows)) => println!("  Snapshot: replaced with {rows} rows"),
        Some(Err(e)) => println!("  Snapshot: FAILED, previous snapshot kept ({e})"),
        None => println!("  Snapshot: skipped (--no-db)"),
    }
}

async fn write_metrics(path: &std::path::Path) {
    let text = match metrics::encode_metrics() {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return;
        }
    };

    match tokio::fs::write(path, text).await {
        Ok(()) => tracing::info!(path = %path.display(), "Metrics written"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to write metrics"),
    }
}
