/// What the dispatcher should do with a task after its handler ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Handled, or dropped on purpose
    Done,
    /// Requeue, counted against the retry bound
    Retry,
    /// Refresh the session for the given reason, then requeue
    RetryAfterRefresh(String),
    /// Hand the document to the page crawler, refreshing first when asked
    Fallback { refresh: Option<String> },
}

impl HandlerOutcome {
    pub(crate) fn refresh(reason: &str) -> Self {
        Self::RetryAfterRefresh(reason.to_string())
    }
}
