use crate::error::{BrowserError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(String);

impl WindowHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cookie as seen by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
}

/// Render cookies as a `Cookie` request header value.
pub fn cookie_header(cookies: &[BrowserCookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Capabilities the harvester needs from a browser session.
///
/// Every call acts on the current tab. Implementations are not expected to be
/// usable from several tasks at once; callers serialize access.
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate the current tab to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// URL of the current tab
    async fn current_url(&self) -> Result<String>;

    /// Serialized DOM of the current tab
    async fn page_source(&self) -> Result<String>;

    /// Document title of the current tab
    async fn title(&self) -> Result<String>;

    /// All cookies visible to the current tab
    async fn cookies(&self) -> Result<Vec<BrowserCookie>>;

    /// Remove every cookie of the session
    async fn delete_all_cookies(&self) -> Result<()>;

    /// Run a function body (may `return`) in the current tab.
    /// An uncaught exception surfaces as [`BrowserError::ScriptError`].
    async fn execute_script(&self, script: &str) -> Result<serde_json::Value>;

    /// Handles of all open tabs, oldest first
    async fn window_handles(&self) -> Result<Vec<WindowHandle>>;

    /// Handle of the current tab
    async fn current_window(&self) -> Result<WindowHandle>;

    /// Make another tab current
    async fn switch_to(&self, handle: &WindowHandle) -> Result<()>;

    /// Open a new tab on `url` and make it current
    async fn open_window(&self, url: &str) -> Result<WindowHandle>;

    /// Close a tab
    async fn close_window(&self, handle: &WindowHandle) -> Result<()>;
}

/// Reject anything that is not an absolute http(s) or `about:` URL.
pub fn check_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL {url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" | "about" | "data" => Ok(()),
        other => Err(BrowserError::NavigationError(format!(
            "unsupported scheme {other} in {url}"
        ))),
    }
}
