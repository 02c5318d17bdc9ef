//! Prometheus metrics for scrape runs
//!
//! Tracks fetch attempts and faults, task outcomes, open pages, run duration
//! and snapshot writes. A run can dump the registry to a file at exit.
//!
//! # Usage
//!
//! Call `init_metrics()` at startup. If initialization fails, or never
//! happens, every recording function is a no-op.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct ScrapeMetrics {
    fetch_attempts: Counter,
    fetch_faults: CounterVec,
    tasks: CounterVec,
    in_flight: Gauge,
    run_duration: Histogram,
    snapshot_rows: Gauge,
    storage_failures: Counter,
}

static SCRAPE_METRICS: OnceLock<ScrapeMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics with the default registry.
///
/// Idempotent. On error the caller may continue without metrics.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = ScrapeMetrics {
        fetch_attempts: register_counter!(
            "fillrate_fetch_attempts_total",
            "Fetch attempts, including retries"
        )?,
        fetch_faults: register_counter_vec!(
            "fillrate_fetch_faults_total",
            "Failed fetch attempts by fault kind",
            &["kind"]
        )?,
        tasks: register_counter_vec!(
            "fillrate_tasks_total",
            "Finished tasks by outcome",
            &["outcome"]
        )?,
        in_flight: register_gauge!(
            "fillrate_pages_in_flight",
            "Pages currently being fetched"
        )?,
        run_duration: register_histogram!(
            "fillrate_run_duration_seconds",
            "Wall time of a scrape run",
            vec![30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0, 7200.0]
        )?,
        snapshot_rows: register_gauge!(
            "fillrate_snapshot_rows",
            "Rows written by the last snapshot replace"
        )?,
        storage_failures: register_counter!(
            "fillrate_storage_failures_total",
            "Snapshot replace failures"
        )?,
    };

    SCRAPE_METRICS
        .set(metrics)
        .map_err(|_| "Scrape metrics already initialized")?;

    tracing::debug!("Prometheus metrics initialized");
    Ok(())
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// ============================================================================
// Recording
// ============================================================================

pub fn record_attempt() {
    if let Some(m) = SCRAPE_METRICS.get() {
        m.fetch_attempts.inc();
    }
}

/// Record a failed attempt; `kind` is `FetchError::kind()`
pub fn record_fault(kind: &str) {
    if let Some(m) = SCRAPE_METRICS.get() {
        m.fetch_faults.with_label_values(&[kind]).inc();
    }
}

pub fn record_success() {
    if let Some(m) = SCRAPE_METRICS.get() {
        m.tasks.with_label_values(&["success"]).inc();
    }
}

pub fn record_drop() {
    if let Some(m) = SCRAPE_METRICS.get() {
        m.tasks.with_label_values(&["dropped"]).inc();
    }
}

pub fn set_in_flight(pages: u64) {
    if let Some(m) = SCRAPE_METRICS.get() {
        m.in_flight.set(pages as f64);
    }
}

/// Record the outcome of a snapshot replace
pub fn record_snapshot(rows: Option<usize>) {
    if let Some(m) = SCRAPE_METRICS.get() {
        match rows {
            Some(rows) => m.snapshot_rows.set(rows as f64),
            None => m.storage_failures.inc(),
        }
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start timing a run
pub fn start_run_timer() -> MetricsTimer {
    MetricsTimer {
        timer: SCRAPE_METRICS.get().map(|m| m.run_duration.start_timer()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(SCRAPE_METRICS.get().is_some());
    }

    #[test]
    fn test_recording_shows_in_export() {
        let _ = init_metrics();
        record_attempt();
        record_fault("blocked");
        record_success();
        record_drop();
        set_in_flight(2);
        record_snapshot(Some(9));
        record_snapshot(None);
        {
            let _timer = start_run_timer();
        }

        let text = encode_metrics().unwrap();
        assert!(text.contains("fillrate_fetch_attempts_total"));
        assert!(text.contains("kind=\"blocked\""));
        assert!(text.contains("outcome=\"dropped\""));
        assert!(text.contains("fillrate_run_duration_seconds"));
    }
}
