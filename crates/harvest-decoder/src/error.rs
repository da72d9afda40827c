use harvest_browser::ScriptError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The service gave no usable answer; asking again may succeed.
    #[error("no usable answer: {0}")]
    Retryable(String),

    /// One record cannot be decoded and is skipped.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A decode routine threw; the session must be refreshed and the batch
    /// abandoned.
    #[error("session fault: {0}")]
    SessionFault(String),

    /// The payload or page does not have the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("payload evaluation failed: {0}")]
    Evaluation(#[from] ScriptError),

    #[error("invalid rule set: {0}")]
    InvalidRules(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// True when the browser session behind the evaluator is gone.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Evaluation(e) if e.is_session_lost())
    }
}

impl From<DecodeError> for harvest_core::HarvestError {
    fn from(err: DecodeError) -> Self {
        Self::Validation(err.to_string())
    }
}
