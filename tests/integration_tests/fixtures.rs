//! Scripted rendering backend for pipeline tests
//!
//! `ScriptedSessions` hands out fake pages whose behaviour is decided per
//! URL and per attempt, and records how many pages were opened, how many
//! were open at once, and how often each URL was visited.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fillrate::config::PacingConfig;
use fillrate::crawler::fetcher::{FetchSettings, SeatFetcher};
use fillrate::crawler::session::{RenderSession, SessionProvider};
use fillrate::crawler::stealth::StealthPolicy;
use fillrate::utils::error::FetchError;
use fillrate::utils::jitter::Jitter;
use fillrate::utils::retry::RetryConfig;
use fillrate::Route;

/// What a page does once navigated
#[derive(Debug, Clone)]
pub enum PageScript {
    /// Page renders these texts
    Texts(Vec<String>),
    /// Page renders but shows no seat label
    Blocked,
    /// Navigation fails immediately
    NavigationError,
    /// Navigation never finishes
    Hang,
}

impl PageScript {
    pub fn seats(labels: &[&str]) -> Self {
        Self::Texts(labels.iter().map(|s| s.to_string()).collect())
    }
}

type Script = dyn Fn(&str, u32) -> PageScript + Send + Sync;

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
    visits: Mutex<HashMap<String, u32>>,
}

/// Fake session provider driven by a `(url, visit number) -> PageScript` script
pub struct ScriptedSessions {
    script: Arc<Script>,
    counters: Arc<Counters>,
}

impl ScriptedSessions {
    pub fn new(script: impl Fn(&str, u32) -> PageScript + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(script),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Every page shows the same texts
    pub fn always(page: PageScript) -> Arc<Self> {
        Self::new(move |_, _| page.clone())
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn open_now(&self) -> usize {
        self.counters.open_now.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.counters.max_open.load(Ordering::SeqCst)
    }

    /// Navigations to URLs containing `needle`
    pub fn visits_matching(&self, needle: &str) -> u32 {
        let visits = self.counters.visits.lock().unwrap();
        visits
            .iter()
            .filter(|(url, _)| url.contains(needle))
            .map(|(_, n)| *n)
            .sum()
    }

    /// Distinct URLs navigated to
    pub fn visited_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.counters.visits.lock().unwrap().keys().cloned().collect();
        urls.sort();
        urls
    }
}

#[async_trait]
impl SessionProvider for ScriptedSessions {
    async fn open(&self) -> Result<Box<dyn RenderSession>, FetchError> {
        let c = &self.counters;
        c.opened.fetch_add(1, Ordering::SeqCst);
        let now = c.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        c.max_open.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(ScriptedPage {
            counters: Arc::clone(&self.counters),
            script: Arc::clone(&self.script),
            page: None,
        }))
    }
}

struct ScriptedPage {
    counters: Arc<Counters>,
    script: Arc<Script>,
    page: Option<PageScript>,
}

impl Drop for ScriptedPage {
    fn drop(&mut self) {
        self.counters.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RenderSession for ScriptedPage {
    async fn hide_automation(&mut self, _script: &str) -> Result<(), FetchError> {
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        let visit = {
            let mut visits = self.counters.visits.lock().unwrap();
            let n = visits.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        let page = (self.script)(url, visit);
        match page {
            PageScript::NavigationError => {
                Err(FetchError::Navigation("net::ERR_CONNECTION_RESET".into()))
            }
            PageScript::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(())
            }
            other => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                self.page = Some(other);
                Ok(())
            }
        }
    }

    async fn scroll_by(&mut self, _delta_y: i64) -> Result<(), FetchError> {
        Ok(())
    }

    async fn texts_matching(&mut self, pattern: &str) -> Result<Vec<String>, FetchError> {
        let needle = pattern.to_lowercase();
        Ok(match &self.page {
            Some(PageScript::Texts(texts)) => texts
                .iter()
                .filter(|t| t.to_lowercase().contains(&needle))
                .cloned()
                .collect(),
            _ => Vec::new(),
        })
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Settings used across pipeline tests: 36 seats, 60 s navigation timeout,
/// 3 attempts with a 3 s cool-down.
pub fn test_settings() -> FetchSettings {
    FetchSettings {
        bus_capacity: 36,
        navigation_timeout: Duration::from_secs(60),
        seat_text_pattern: String::from("seat"),
        retry: RetryConfig::fixed(3, Duration::from_secs(3)),
    }
}

pub fn fetcher(sessions: Arc<ScriptedSessions>) -> Arc<SeatFetcher> {
    let stealth = StealthPolicy::new(PacingConfig::default(), Arc::new(Jitter::seeded(7)));
    Arc::new(SeatFetcher::new(sessions, stealth, test_settings()))
}

pub fn route(name: &str, slug: &str) -> Route {
    Route::new(
        name,
        format!("https://www.redbus.in/bus-tickets/{slug}?fromCityId=1&toCityId=2&onward=01-Jan-2025&doj=01-Jan-2025"),
    )
}
