use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("undecodable message: {0}")]
    Decode(String),

    #[error("unknown tag '{0}'")]
    UnknownTag(String),

    /// A handler failed; the queue keeps running.
    #[error("handler failed: {0}")]
    Handler(String),

    /// A handler hit a state only a restart recovers from; the queue stops.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("worker panicked: {0}")]
    Join(String),
}

impl QueueError {
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<QueueError> for harvest_core::HarvestError {
    fn from(err: QueueError) -> Self {
        Self::Queue(err.to_string())
    }
}
