use harvest_browser::{BrowserError, ScriptError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The browser session is destroyed; only a process restart recovers.
    #[error("fatal session error: {0}")]
    Fatal(String),

    /// Every refresh attempt failed.
    #[error("refresh failed after {attempts} attempts: {last_error}")]
    RefreshFailed { attempts: u32, last_error: String },

    #[error("refresh cancelled")]
    Cancelled,

    #[error("invalid proxy status: {0}")]
    ProxyStatus(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl SessionError {
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fatal(_) => true,
            Self::Browser(e) => e.is_session_lost(),
            Self::Script(e) => e.is_session_lost(),
            _ => false,
        }
    }
}

impl From<SessionError> for harvest_core::HarvestError {
    fn from(err: SessionError) -> Self {
        Self::Browser(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_detection() {
        assert!(SessionError::Fatal("gone".to_string()).is_fatal());
        assert!(SessionError::Browser(BrowserError::SessionLost("x".to_string())).is_fatal());
        assert!(!SessionError::Browser(BrowserError::Timeout("x".to_string())).is_fatal());
        assert!(!SessionError::RefreshFailed {
            attempts: 50,
            last_error: "getKey() failed".to_string()
        }
        .is_fatal());
    }
}
