//! In-process broker for tests and single-node runs.

use crate::broker::Broker;
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Unbounded FIFO broker. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    messages: Mutex<VecDeque<String>>,
    arrived: Notify,
    polls: AtomicUsize,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting to be polled.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `poll` calls so far.
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn take(&self, max: usize) -> Vec<String> {
        let mut messages = self.lock();
        let n = max.min(messages.len());
        messages.drain(..n).collect()
    }
}

#[async_trait::async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, _key: i32, payload: String) -> Result<()> {
        self.lock().push_back(payload);
        self.arrived.notify_one();
        Ok(())
    }

    async fn poll(&self, max: usize, wait: Duration) -> Result<Vec<String>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let batch = self.take(max);
        if !batch.is_empty() {
            return Ok(batch);
        }
        if tokio::time::timeout(wait, self.arrived.notified())
            .await
            .is_err()
        {
            return Ok(Vec::new());
        }
        Ok(self.take(max))
    }
}
