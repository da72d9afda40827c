//! Broker client interface.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// The two things the queue needs from a broker.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Publish one encoded envelope; resolves when the broker acknowledged it.
    async fn publish(&self, key: i32, payload: String) -> Result<()>;

    /// Fetch up to `max` envelopes, waiting at most `wait` for the first.
    /// An empty batch is not an error.
    async fn poll(&self, max: usize, wait: Duration) -> Result<Vec<String>>;
}

/// Gather one poll's worth of messages from a one-at-a-time receiver.
///
/// `receive` yields `Ok(None)` for a message it consumed but could not use.
/// Waits up to `wait` for the first message, then only `linger` for each
/// further one. Once anything is collected, a receive error ends the batch
/// instead of discarding it, since the broker already counts those
/// messages as delivered.
#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
pub(crate) async fn collect_batch<F, Fut>(
    max: usize,
    wait: Duration,
    linger: Duration,
    mut receive: F,
) -> Result<Vec<String>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<String>>>,
{
    let deadline = Instant::now() + wait;
    let mut batch = Vec::new();

    while batch.len() < max {
        let until = if batch.is_empty() {
            deadline
        } else {
            deadline.min(Instant::now() + linger)
        };
        let Ok(received) = tokio::time::timeout_at(until, receive()).await else {
            break;
        };
        match received {
            Ok(Some(payload)) => batch.push(payload),
            Ok(None) => {}
            Err(e) if batch.is_empty() => return Err(e),
            Err(e) => {
                warn!(kept = batch.len(), "receive failed mid-batch, keeping what arrived: {}", e);
                break;
            }
        }
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays `steps`, then never yields again.
    fn scripted(
        steps: Vec<Result<Option<String>>>,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<Option<String>>> + Send>>
    {
        let steps = Mutex::new(VecDeque::from(steps));
        move || {
            let next = steps.lock().unwrap().pop_front();
            Box::pin(async move {
                match next {
                    Some(step) => step,
                    None => std::future::pending().await,
                }
            })
        }
    }

    fn message(s: &str) -> Result<Option<String>> {
        Ok(Some(s.to_string()))
    }

    fn failure() -> Result<Option<String>> {
        Err(QueueError::Broker("poll: broker transport failure".to_string()))
    }

    #[tokio::test]
    async fn test_error_after_messages_keeps_batch() {
        let receive = scripted(vec![message("a"), message("b"), failure(), message("c")]);
        let batch = collect_batch(10, Duration::from_secs(5), Duration::from_millis(50), receive)
            .await
            .expect("partial batch");
        assert_eq!(batch, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_error_before_any_message_fails() {
        let receive = scripted(vec![failure(), message("a")]);
        let result =
            collect_batch(10, Duration::from_secs(5), Duration::from_millis(50), receive).await;
        assert!(matches!(result, Err(QueueError::Broker(_))));
    }

    #[tokio::test]
    async fn test_lone_message_returns_without_full_wait() {
        let receive = scripted(vec![message("a")]);
        let started = std::time::Instant::now();
        let batch = collect_batch(10, Duration::from_secs(5), Duration::from_millis(20), receive)
            .await
            .expect("batch");
        assert_eq!(batch, vec!["a"]);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_nothing_arrives_gives_empty_batch() {
        let receive = scripted(Vec::new());
        let batch = collect_batch(10, Duration::from_millis(20), Duration::from_millis(5), receive)
            .await
            .expect("empty batch");
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_skips_unusable_and_stops_at_max() {
        let receive = scripted(vec![message("a"), Ok(None), message("b"), message("c")]);
        let batch = collect_batch(2, Duration::from_secs(5), Duration::from_millis(50), receive)
            .await
            .expect("batch");
        assert_eq!(batch, vec!["a", "b"]);
    }
}
