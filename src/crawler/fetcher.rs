//! Per-task fetcher with retry, pacing and blocked-page detection
//!
//! Every attempt gets its own page:
//! - open a fresh session (a page that looked blocked is never reused)
//! - hide the automation flag
//! - navigate under a timeout
//! - settle, scroll like a person
//! - read the seat labels, tally them, compute fill metrics
//!
//! A page without any seat label counts as blocked and is retried like a
//! navigation failure. The session is closed at the end of every attempt,
//! successful, failed or cancelled.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::analytics::fill_rate;
use crate::crawler::session::{RenderSession, SessionProvider};
use crate::crawler::stealth::StealthPolicy;
use crate::crawler::url::rewrite_travel_date;
use crate::metrics;
use crate::models::{RouteTask, ScrapeResult};
use crate::parser::SeatTally;
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Fetcher settings derived from [`crate::config::Config`]
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub bus_capacity: u32,
    pub navigation_timeout: Duration,
    pub seat_text_pattern: String,
    pub retry: RetryConfig,
}

impl FetchSettings {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            bus_capacity: config.scrape.bus_capacity,
            navigation_timeout: config.navigation_timeout(),
            seat_text_pattern: config.scrape.seat_text_pattern.clone(),
            retry: RetryConfig::fixed(config.scrape.max_retries, config.retry_cooldown()),
        }
    }
}

/// Retrying seat fetcher
pub struct SeatFetcher {
    sessions: Arc<dyn SessionProvider>,
    stealth: StealthPolicy,
    settings: FetchSettings,
}

impl SeatFetcher {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        stealth: StealthPolicy,
        settings: FetchSettings,
    ) -> Self {
        Self {
            sessions,
            stealth,
            settings,
        }
    }

    /// Fetch one route/date, retrying transient faults.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::RetriesExhausted` once the attempt budget is spent.
    pub async fn fetch(&self, task: &RouteTask) -> Result<ScrapeResult, FetchError> {
        let (_never, cancel) = watch::channel(false);
        self.fetch_until(task, &cancel).await
    }

    /// Like [`fetch`](Self::fetch), but stops once `cancel` turns `true`.
    ///
    /// An attempt in progress closes its page before returning
    /// `FetchError::Cancelled`; no further attempt is started.
    pub async fn fetch_until(
        &self,
        task: &RouteTask,
        cancel: &watch::Receiver<bool>,
    ) -> Result<ScrapeResult, FetchError> {
        let url = rewrite_travel_date(&task.base_url, task.travel_date);
        let date = task.date_label();

        let outcome = with_retry_if(
            &self.settings.retry,
            |attempt| {
                tracing::info!(route = %task.route_name, date = %date, attempt, "Scraping");
                self.attempt(task, &url, cancel)
            },
            FetchError::is_recoverable,
        )
        .await;

        match outcome {
            Ok(result) => {
                tracing::info!(
                    route = %task.route_name,
                    date = %date,
                    buses = result.bus_count,
                    fill_rate = result.fill_rate_percent,
                    "Scraped"
                );
                Ok(result)
            }
            Err(exhausted) if matches!(exhausted.last_error, FetchError::Cancelled) => {
                Err(FetchError::Cancelled)
            }
            Err(exhausted) => {
                tracing::warn!(
                    route = %task.route_name,
                    date = %date,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Dropping task"
                );
                Err(FetchError::RetriesExhausted {
                    attempts: exhausted.attempts,
                    last: exhausted.last_error.to_string(),
                })
            }
        }
    }

    /// One attempt on one fresh session
    async fn attempt(
        &self,
        task: &RouteTask,
        url: &str,
        cancel: &watch::Receiver<bool>,
    ) -> Result<ScrapeResult, FetchError> {
        let stop = *cancel.borrow();
        if stop {
            return Err(FetchError::Cancelled);
        }
        metrics::record_attempt();

        let mut session = self.sessions.open().await?;
        let outcome = tokio::select! {
            outcome = self.drive(session.as_mut(), task, url) => outcome,
            () = cancelled(cancel.clone()) => Err(FetchError::Cancelled),
        };

        if let Err(e) = session.close().await {
            tracing::debug!(error = %e, "Session close failed");
        }

        match &outcome {
            Err(FetchError::Cancelled) => {
                tracing::debug!(route = %task.route_name, "Attempt cancelled, page closed");
            }
            Err(e) => metrics::record_fault(e.kind()),
            Ok(_) => {}
        }
        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn RenderSession,
        task: &RouteTask,
        url: &str,
    ) -> Result<ScrapeResult, FetchError> {
        self.stealth.disguise(session).await;

        let timeout = self.settings.navigation_timeout;
        tokio::time::timeout(timeout, session.navigate(url))
            .await
            .map_err(|_| FetchError::Timeout(timeout.as_secs()))??;

        self.stealth.settle().await;
        self.stealth.browse(session).await;

        let labels = session
            .texts_matching(&self.settings.seat_text_pattern)
            .await?;
        let tally = SeatTally::from_labels(&labels);

        if tally.is_empty() {
            return Err(FetchError::Blocked);
        }

        let metrics = fill_rate::compute(
            tally.bus_count,
            tally.available_seats,
            self.settings.bus_capacity,
        )
        .map_err(|e| FetchError::Session(e.to_string()))?;

        if metrics.clamped {
            tracing::warn!(
                route = %task.route_name,
                date = %task.date_label(),
                reported = tally.available_seats,
                capacity = metrics.total_capacity,
                "More seats advertised than capacity, clamping"
            );
        }

        Ok(ScrapeResult::from_metrics(
            task,
            url.to_string(),
            tally.bus_count,
            metrics,
            Utc::now(),
        ))
    }
}

/// Resolves once the flag turns `true`; never, if the sender is gone first
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    let sender_gone = cancel.wait_for(|flag| *flag).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}
