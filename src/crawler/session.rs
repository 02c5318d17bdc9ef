//! Rendering-session abstraction
//!
//! The fetcher only needs to open a fresh page, drive it, and close it. The
//! browser backend lives behind [`SessionProvider`], so the pipeline never
//! knows whether it talks to a headed Chrome, a headless one, or a test fake.

use async_trait::async_trait;

use crate::utils::error::FetchError;

/// One isolated page (tab) inside the shared rendering context
#[async_trait]
pub trait RenderSession: Send {
    /// Install a script that hides the automation flag on every document.
    async fn hide_automation(&mut self, script: &str) -> Result<(), FetchError>;

    /// Load `url` and wait for the page to finish loading.
    ///
    /// The caller bounds this with its own timeout.
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError>;

    /// Scroll the viewport down by `delta_y` pixels.
    async fn scroll_by(&mut self, delta_y: i64) -> Result<(), FetchError>;

    /// Inner text of every element whose own text matches `pattern`
    /// (a case-insensitive JavaScript regular expression source).
    async fn texts_matching(&mut self, pattern: &str) -> Result<Vec<String>, FetchError>;

    /// Close the page. Consumes the session so it cannot be reused.
    async fn close(self: Box<Self>) -> Result<(), FetchError>;
}

/// Opens sessions on a shared rendering context
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RenderSession>, FetchError>;
}
