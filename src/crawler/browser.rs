//! Headless Chrome backend built on chromiumoxide
//!
//! One browser process per run acts as the shared rendering context: same
//! user agent, viewport and cookie jar for every page. Each fetch attempt
//! opens its own page and closes it afterwards.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::BrowserSettings;
use crate::crawler::session::{RenderSession, SessionProvider};
use crate::utils::error::FetchError;
use crate::utils::jitter::Jitter;

/// Switch that stops Blink from advertising automation
pub const DISABLE_AUTOMATION_FLAG: &str = "--disable-blink-features=AutomationControlled";

/// Collects the inner text of the innermost elements whose own text matches
/// the pattern. `__PATTERN__` is replaced with a JSON string literal.
const SEAT_TEXT_SCRIPT: &str = r#"(() => {
    const re = new RegExp(__PATTERN__, 'i');
    const out = [];
    for (const el of document.body ? document.body.querySelectorAll('*') : []) {
        if (el.tagName === 'SCRIPT' || el.tagName === 'STYLE') continue;
        const own = Array.from(el.childNodes)
            .filter(n => n.nodeType === Node.TEXT_NODE)
            .map(n => n.textContent)
            .join('');
        if (re.test(own)) out.push((el.innerText || own).trim());
    }
    return out;
})()"#;

/// Rendering context settings resolved for one run
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub headless: bool,
    pub executable: Option<std::path::PathBuf>,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub extra_args: Vec<String>,
    pub request_timeout: Duration,
}

impl BrowserProfile {
    /// Resolve settings, picking one user agent for the whole run
    pub fn resolve(settings: &BrowserSettings, jitter: &Jitter, request_timeout: Duration) -> Self {
        let user_agent = jitter
            .choose(&settings.user_agents)
            .cloned()
            .unwrap_or_default();

        Self {
            headless: settings.headless,
            executable: settings.executable.clone(),
            user_agent,
            viewport_width: settings.viewport_width,
            viewport_height: settings.viewport_height,
            extra_args: settings.extra_args.clone(),
            request_timeout,
        }
    }

    fn launch_config(&self) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(self.request_timeout)
            .window_size(self.viewport_width, self.viewport_height)
            .viewport(Viewport {
                width: self.viewport_width,
                height: self.viewport_height,
                ..Viewport::default()
            })
            .arg(DISABLE_AUTOMATION_FLAG)
            .arg("--disable-dev-shm-usage");

        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &self.extra_args {
            builder = builder.arg(arg.as_str());
        }

        builder.build().map_err(FetchError::Session)
    }
}

/// Session provider backed by a launched Chrome instance
pub struct ChromiumSessions {
    browser: Browser,
    handler: JoinHandle<()>,
    user_agent: String,
}

impl ChromiumSessions {
    /// Launch the browser. Failing here is a run-level fault.
    pub async fn launch(profile: &BrowserProfile) -> Result<Arc<Self>, FetchError> {
        let config = profile.launch_config()?;
        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Session(format!("Failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::info!(
            headless = profile.headless,
            user_agent = %profile.user_agent,
            "Browser launched"
        );

        Ok(Arc::new(Self {
            browser,
            handler,
            user_agent: profile.user_agent.clone(),
        }))
    }

    /// Close the browser process once no fetcher holds it any more
    pub async fn shutdown(self: Arc<Self>) {
        let mut sessions = match Arc::try_unwrap(self) {
            Ok(sessions) => sessions,
            Err(_) => {
                tracing::warn!("Browser still shared at shutdown, leaving it to drop");
                return;
            }
        };

        if let Err(e) = sessions.browser.close().await {
            tracing::warn!(error = %e, "Browser close failed");
        }
        let _ = sessions.browser.wait().await;
        sessions.handler.abort();
        tracing::debug!("Browser closed");
    }
}

#[async_trait]
impl SessionProvider for ChromiumSessions {
    async fn open(&self) -> Result<Box<dyn RenderSession>, FetchError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Session(e.to_string()))?;

        if !self.user_agent.is_empty() {
            page.set_user_agent(self.user_agent.as_str())
                .await
                .map_err(|e| FetchError::Session(e.to_string()))?;
        }

        Ok(Box::new(ChromiumSession { page }))
    }
}

/// One Chrome tab
pub struct ChromiumSession {
    page: Page,
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn hide_automation(&mut self, script: &str) -> Result<(), FetchError> {
        self.page
            .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .map(|_| ())
            .map_err(|e| FetchError::Session(e.to_string()))
    }

    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| FetchError::Navigation(e.to_string()))
    }

    async fn scroll_by(&mut self, delta_y: i64) -> Result<(), FetchError> {
        self.page
            .evaluate(format!("window.scrollBy(0, {delta_y})"))
            .await
            .map(|_| ())
            .map_err(|e| FetchError::Session(e.to_string()))
    }

    async fn texts_matching(&mut self, pattern: &str) -> Result<Vec<String>, FetchError> {
        let literal =
            serde_json::to_string(pattern).map_err(|e| FetchError::Session(e.to_string()))?;
        let script = SEAT_TEXT_SCRIPT.replace("__PATTERN__", &literal);

        self.page
            .evaluate(script)
            .await
            .map_err(|e| FetchError::Session(e.to_string()))?
            .into_value::<Vec<String>>()
            .map_err(|e| FetchError::Session(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        self.page
            .close()
            .await
            .map_err(|e| FetchError::Session(e.to_string()))
    }
}
