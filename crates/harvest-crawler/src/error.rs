use harvest_browser::BrowserError;
use harvest_core::HarvestError;
use harvest_db::DatabaseError;
use harvest_decoder::DecodeError;
use harvest_queue::QueueError;
use harvest_session::SessionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrawlerError>;

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Core(#[from] HarvestError),
}

impl CrawlerError {
    /// True when the browser session is gone and only a restart helps.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Browser(e) => e.is_session_lost(),
            Self::Session(e) => e.is_fatal(),
            Self::Decode(e) => e.is_session_lost(),
            Self::Queue(e) => e.is_fatal(),
            _ => false,
        }
    }
}
