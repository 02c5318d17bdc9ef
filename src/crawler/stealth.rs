//! Automation-signal suppression and human-like pacing
//!
//! Applied to every session: hide `navigator.webdriver` before the first
//! document loads, wait a little after navigation, then scroll in uneven
//! steps with uneven pauses before anything is read from the page.

use std::sync::Arc;
use std::time::Duration;

use crate::config::PacingConfig;
use crate::crawler::session::RenderSession;
use crate::utils::jitter::Jitter;

/// Init script that removes the webdriver flag
pub const HIDE_WEBDRIVER_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// Anti-detection policy shared by all fetches of a run
#[derive(Debug, Clone)]
pub struct StealthPolicy {
    pacing: PacingConfig,
    jitter: Arc<Jitter>,
}

impl StealthPolicy {
    pub fn new(pacing: PacingConfig, jitter: Arc<Jitter>) -> Self {
        Self { pacing, jitter }
    }

    /// Hide the automation flag. Failure only weakens cover, so it is logged
    /// and otherwise ignored.
    pub async fn disguise(&self, session: &mut dyn RenderSession) {
        if let Err(e) = session.hide_automation(HIDE_WEBDRIVER_SCRIPT).await {
            tracing::warn!(error = %e, "Could not hide automation flag");
        }
    }

    /// Randomized wait after navigation
    pub async fn settle(&self) {
        let wait = self.jitter.duration_between(
            Duration::from_millis(self.pacing.settle_min_ms),
            Duration::from_millis(self.pacing.settle_max_ms),
        );
        tracing::trace!(wait_ms = wait.as_millis() as u64, "Settling");
        tokio::time::sleep(wait).await;
    }

    /// Scroll `scroll_count` times with randomized distance and pause.
    ///
    /// Returns the number of scroll steps that succeeded; a failed step ends
    /// the sequence early since the page is likely gone.
    pub async fn browse(&self, session: &mut dyn RenderSession) -> u32 {
        let mut done = 0;
        for step in 0..self.pacing.scroll_count {
            let delta = self
                .jitter
                .int_between(self.pacing.scroll_min_px, self.pacing.scroll_max_px);

            if let Err(e) = session.scroll_by(delta).await {
                tracing::debug!(step, error = %e, "Scroll failed, stopping");
                break;
            }
            done += 1;

            let pause = self.jitter.duration_between(
                Duration::from_millis(self.pacing.scroll_pause_min_ms),
                Duration::from_millis(self.pacing.scroll_pause_max_ms),
            );
            tokio::time::sleep(pause).await;
        }
        done
    }
}
