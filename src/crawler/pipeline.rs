//! Bounded-concurrency scrape pipeline
//!
//! A fixed pool of workers pulls tasks from a shared channel, so at most
//! `max_tabs` fetches (and therefore pages) are in flight at once.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Task      │     │   Fetch     │     │   Result    │
//! │  Producer   │────▶│   Workers   │────▶│  Collector  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!   routes × dates     K concurrent        successes only
//! ```
//!
//! When the optional run deadline fires, workers stop picking up tasks and
//! in-flight fetches close their pages. Workers still running after
//! [`CANCEL_GRACE`] are aborted. Results that already reached the collector
//! are kept.

use chrono::NaiveDate;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::crawler::fetcher::SeatFetcher;
use crate::crawler::url::date_window;
use crate::metrics;
use crate::models::{Route, RouteTask, ScrapeResult};
use crate::utils::error::FetchError;

// ============================================================================
// Configuration
// ============================================================================

/// Time in-flight fetches get to close their pages after the deadline
pub const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of fetch workers (maximum open pages)
    pub max_tabs: usize,

    /// Number of travel dates per route
    pub date_range: u32,

    /// Whole-run deadline
    pub run_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_tabs: 3,
            date_range: 3,
            run_timeout: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            max_tabs: config.scrape.max_tabs,
            date_range: config.scrape.date_range,
            run_timeout: config.run_timeout(),
        }
    }
}

// ============================================================================
// Pipeline Statistics
// ============================================================================

/// Pipeline statistics (thread-safe)
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Tasks submitted
    pub total_tasks: AtomicU64,

    /// Tasks that produced a result
    pub success_count: AtomicU64,

    /// Tasks dropped after exhausting retries
    pub dropped_count: AtomicU64,

    /// Fetches currently running
    pub in_flight: AtomicU64,

    /// Highest `in_flight` observed
    pub peak_in_flight: AtomicU64,
}

impl PipelineStats {
    /// Create new stats counter
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        metrics::set_in_flight(now);
    }

    fn leave(&self) {
        let now = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_in_flight(now);
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_tasks: self.total_tasks.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            dropped_count: self.dropped_count.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pipeline statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_tasks: u64,
    pub success_count: u64,
    pub dropped_count: u64,
    pub peak_in_flight: u64,
}

impl StatsSnapshot {
    /// Tasks neither succeeded nor dropped (cancelled by the deadline)
    pub fn cancelled_count(&self) -> u64 {
        self.total_tasks
            .saturating_sub(self.success_count + self.dropped_count)
    }

    /// Success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 1.0;
        }
        self.success_count as f64 / self.total_tasks as f64
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub results: Vec<ScrapeResult>,
    pub stats: StatsSnapshot,
    pub timed_out: bool,
}

// ============================================================================
// Pipeline Implementation
// ============================================================================

/// Scrape pipeline over a shared fetcher.
///
/// Holds no per-run state: every run gets its own channels and statistics.
pub struct ScrapePipeline {
    config: PipelineConfig,
    fetcher: Arc<SeatFetcher>,
}

impl ScrapePipeline {
    pub fn new(config: PipelineConfig, fetcher: Arc<SeatFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Scrape every route for `date_range` days starting at `start`
    pub async fn run(&self, routes: &[Route], start: NaiveDate) -> RunOutcome {
        let dates = date_window(start, self.config.date_range);
        self.run_tasks(RouteTask::expand(routes, &dates)).await
    }

    /// Run an explicit task list
    pub async fn run_tasks(&self, tasks: Vec<RouteTask>) -> RunOutcome {
        let workers = self.config.max_tabs.max(1);
        let stats = PipelineStats::new();
        stats.total_tasks.store(tasks.len() as u64, Ordering::Relaxed);

        tracing::info!(
            tasks = tasks.len(),
            workers,
            run_timeout_secs = self.config.run_timeout.map(|d| d.as_secs()),
            "Starting scrape pipeline"
        );

        let (task_tx, task_rx) = mpsc::channel::<RouteTask>(tasks.len().max(1));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ScrapeResult>();

        for task in tasks {
            // Capacity covers every task, so this never waits.
            if task_tx.send(task).await.is_err() {
                tracing::error!("Task channel closed early");
                break;
            }
        }
        drop(task_tx);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut handles = self.spawn_workers(workers, task_rx, result_tx, cancel_rx, &stats);

        let timed_out = match self.config.run_timeout {
            Some(deadline) => {
                let joined =
                    tokio::time::timeout(deadline, join_all(handles.iter_mut())).await;
                if joined.is_err() {
                    tracing::warn!(
                        deadline_secs = deadline.as_secs(),
                        "Run deadline reached, cancelling outstanding tasks"
                    );
                    let _ = cancel_tx.send(true);
                    Self::wind_down(&mut handles).await;
                    true
                } else {
                    false
                }
            }
            None => {
                join_all(handles.iter_mut()).await;
                false
            }
        };

        // Aborted fetches never called `leave`.
        stats.in_flight.store(0, Ordering::SeqCst);
        metrics::set_in_flight(0);

        let mut results = Vec::new();
        while let Ok(result) = result_rx.try_recv() {
            results.push(result);
        }

        let stats = stats.snapshot();
        tracing::info!(
            success = stats.success_count,
            dropped = stats.dropped_count,
            cancelled = stats.cancelled_count(),
            peak_in_flight = stats.peak_in_flight,
            "Pipeline completed"
        );

        RunOutcome {
            results,
            stats,
            timed_out,
        }
    }

    /// Give cancelled workers [`CANCEL_GRACE`] to close their pages, then abort
    async fn wind_down(handles: &mut [JoinHandle<()>]) {
        let closed = tokio::time::timeout(CANCEL_GRACE, join_unfinished(handles)).await;
        if closed.is_err() {
            tracing::warn!("Workers did not stop within the grace period, aborting");
            for handle in handles.iter() {
                handle.abort();
            }
            join_unfinished(handles).await;
        }
    }

    /// Spawn fetch worker tasks
    fn spawn_workers(
        &self,
        count: usize,
        task_rx: mpsc::Receiver<RouteTask>,
        result_tx: mpsc::UnboundedSender<ScrapeResult>,
        cancel: watch::Receiver<bool>,
        stats: &Arc<PipelineStats>,
    ) -> Vec<JoinHandle<()>> {
        let task_rx = Arc::new(tokio::sync::Mutex::new(task_rx));
        let mut handles = Vec::with_capacity(count);

        for worker_id in 0..count {
            let task_rx = Arc::clone(&task_rx);
            let result_tx = result_tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let stats = Arc::clone(stats);
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                loop {
                    let stop = *cancel.borrow();
                    if stop {
                        break;
                    }

                    let task = {
                        let mut rx = task_rx.lock().await;
                        rx.recv().await
                    };

                    let Some(task) = task else {
                        break;
                    };

                    tracing::debug!(worker_id, route = %task.route_name, "Picked task");

                    stats.enter();
                    let outcome = fetcher.fetch_until(&task, &cancel).await;
                    stats.leave();

                    match outcome {
                        Ok(result) => {
                            stats.success_count.fetch_add(1, Ordering::Relaxed);
                            metrics::record_success();
                            if result_tx.send(result).is_err() {
                                tracing::error!("Result channel closed");
                                break;
                            }
                        }
                        Err(FetchError::Cancelled) => {
                            tracing::debug!(worker_id, route = %task.route_name, "Task cancelled");
                            break;
                        }
                        Err(e) => {
                            stats.dropped_count.fetch_add(1, Ordering::Relaxed);
                            metrics::record_drop();
                            tracing::debug!(worker_id, error = %e, "Task dropped");
                        }
                    }
                }

                tracing::debug!(worker_id, "Fetch worker shutting down");
            });

            handles.push(handle);
        }

        handles
    }
}

/// Await the workers still running. A handle whose output was already taken
/// by an earlier, timed-out join must not be polled again.
async fn join_unfinished(handles: &mut [JoinHandle<()>]) {
    join_all(handles.iter_mut().filter(|h| !h.is_finished())).await;
}

// ============================================================================
// Tests
// ============================================================================
