use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("javascript error: {0}")]
    ScriptError(String),

    #[error("no such window: {0}")]
    WindowNotFound(String),

    /// The browser process or its DevTools connection is gone.
    #[error("invalid session id: {0}")]
    SessionLost(String),
}

impl BrowserError {
    /// True when the browser session cannot be used any more.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }
}

impl From<BrowserError> for harvest_core::HarvestError {
    fn from(err: BrowserError) -> Self {
        Self::Browser(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BrowserError::NavigationError("page not found".to_string());
        assert_eq!(err.to_string(), "navigation failed: page not found");
    }

    #[test]
    fn test_script_error_keeps_message() {
        let err = BrowserError::ScriptError("Malformed UTF-8 data".to_string());
        assert_eq!(err.to_string(), "javascript error: Malformed UTF-8 data");
        assert!(!err.is_session_lost());
    }

    #[test]
    fn test_session_lost() {
        let err = BrowserError::SessionLost("handler stopped".to_string());
        assert!(err.is_session_lost());
        assert!(err.to_string().starts_with("invalid session id"));
    }
}
