use std::{path::Path, time::Duration};

#[derive(thiserror::Error, Debug)]
pub enum BrowserError {
    #[error("browser transport error: {0}")]
    Transport(String),
    #[error("webdriver command failed: {0}")]
    Command(String),
    #[error("no element matches '{0}'")]
    NoSuchElement(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote-controlled browser session driving the portal.
///
/// Every call is fallible and bounded; waits report a timeout as `Ok(false)`
/// so callers can decide between failing and degrading.
#[async_trait::async_trait]
pub trait Browser: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Polls until an element matching `selector` exists or `timeout` elapses.
    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<bool, BrowserError>;

    /// Outer HTML of the first element matching `selector`.
    async fn read_subtree(&self, selector: &str) -> Result<Option<String>, BrowserError>;

    /// Clicks the `index`-th element (document order) matching `selector`.
    async fn click_nth(&self, selector: &str, index: usize) -> Result<(), BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.click_nth(selector, 0).await
    }

    /// Types `value` into the first element matching `selector`.
    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Waits for the page to settle (loaded and no longer mutating).
    async fn wait_for_idle(&self, timeout: Duration) -> Result<bool, BrowserError>;

    /// Diagnostic capture, PNG.
    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError>;
}
