//! The backpressure task queue.

use crate::broker::Broker;
use crate::error::{QueueError, Result};
use crate::task::Task;
use harvest_core::BrokerConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timing and buffer limits of a [`TaskQueue`].
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Longest a single broker poll waits
    pub poll_wait: Duration,
    /// Most messages taken per poll
    pub max_poll_records: usize,
    /// Poll at once while the buffer holds fewer tasks than this
    pub low_water: usize,
    /// Stop polling while the buffer holds more tasks than this
    pub high_water: usize,
    /// Least time between poll starts while the buffer is between the marks
    pub min_poll_interval: Duration,
    /// How often the poller re-checks the buffer
    pub check_interval: Duration,
    /// Pause between checks while above the high-water mark
    pub overflow_pause: Duration,
    /// Worker nap when the buffer is empty
    pub idle_sleep: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::from_config(&BrokerConfig::default())
    }
}

impl QueueOptions {
    #[must_use]
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            poll_wait: Duration::from_millis(config.poll_wait_ms),
            max_poll_records: config.max_poll_records,
            low_water: config.low_water,
            high_water: config.high_water,
            min_poll_interval: Duration::from_millis(config.min_poll_interval_ms),
            check_interval: Duration::from_secs(1),
            overflow_pause: Duration::from_secs(10),
            idle_sleep: Duration::from_secs(1),
        }
    }
}

/// What the poller does after looking at the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Backpressure {
    /// Fetch the next batch now
    Poll,
    /// Polled a moment ago; check again shortly
    Wait,
    /// Buffer overflowing; pause longer and let the broker session lapse if
    /// it must
    Overflow,
}

/// Only the high-water mark stops polling. Between the marks polls are
/// spaced by `min_poll_interval` so the broker session stays alive while a
/// slow handler holds the worker.
pub(crate) fn backpressure(
    pending: usize,
    since_poll: Duration,
    options: &QueueOptions,
) -> Backpressure {
    if pending > options.high_water {
        Backpressure::Overflow
    } else if pending < options.low_water || since_poll >= options.min_poll_interval {
        Backpressure::Poll
    } else {
        Backpressure::Wait
    }
}

/// Consumer of dequeued tasks.
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    /// Handle one task. [`QueueError::Fatal`] stops the queue; any other
    /// error is logged and the next task is taken.
    async fn handle(&self, task: Task) -> Result<()>;
}

/// Anything tasks can be pushed to.
pub trait TaskSink: Send + Sync {
    fn push(&self, task: Task);
}

#[derive(Debug, Default)]
struct TaskBuffer {
    tasks: Mutex<VecDeque<Task>>,
    ready: Notify,
}

impl TaskBuffer {
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, task: Task) {
        self.lock().push_back(task);
        self.ready.notify_one();
    }

    fn pop(&self) -> Option<Task> {
        self.lock().pop_front()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Durable, at-least-once task queue over a [`Broker`].
pub struct TaskQueue {
    broker: Arc<dyn Broker>,
    options: QueueOptions,
    buffer: Arc<TaskBuffer>,
    outbox: mpsc::UnboundedSender<(i32, String)>,
    next_key: AtomicI32,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl TaskQueue {
    /// Create the queue and its publisher. Must run inside a tokio runtime.
    pub fn new(broker: Arc<dyn Broker>, options: QueueOptions) -> Self {
        Self::with_cancellation(broker, options, CancellationToken::new())
    }

    pub fn with_cancellation(
        broker: Arc<dyn Broker>,
        options: QueueOptions,
        cancel: CancellationToken,
    ) -> Self {
        let (outbox, rx) = mpsc::unbounded_channel();
        let publisher = tokio::spawn(publish_loop(Arc::clone(&broker), rx, cancel.clone()));

        Self {
            broker,
            options,
            buffer: Arc::new(TaskBuffer::default()),
            outbox,
            next_key: AtomicI32::new(1),
            cancel,
            handles: Mutex::new(vec![publisher]),
        }
    }

    /// Start the poller and the worker.
    pub fn start(&self, handler: Arc<dyn TaskHandler>) {
        let poller = tokio::spawn(poll_loop(
            Arc::clone(&self.broker),
            Arc::clone(&self.buffer),
            self.options.clone(),
            self.cancel.clone(),
        ));
        let worker = tokio::spawn(work_loop(
            Arc::clone(&self.buffer),
            handler,
            self.options.idle_sleep,
            self.cancel.clone(),
        ));
        self.lock_handles().extend([poller, worker]);
        info!("task queue started");
    }

    /// Signal every loop to finish its current unit of work, then join them.
    /// Returns the first fatal handler error, if any.
    pub async fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        let handles: Vec<_> = self.lock_handles().drain(..).collect();

        let mut outcome = Ok(());
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(QueueError::Join(e.to_string())),
            };
            if let Err(e) = result {
                error!("queue loop ended with error: {}", e);
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        info!("task queue stopped");
        outcome
    }

    /// Tasks buffered locally and not yet handled.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<Result<()>>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskSink for TaskQueue {
    /// Queue `task` for publishing. Delivery failures are logged only.
    fn push(&self, task: Task) {
        let payload = match task.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("cannot encode task {:?}: {}", task, e);
                return;
            }
        };
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        debug!(tag = %task.tag(), key, "push task");
        if self.outbox.send((key, payload)).is_err() {
            warn!(tag = %task.tag(), "publisher gone, task dropped");
        }
    }
}

async fn publish_loop(
    broker: Arc<dyn Broker>,
    mut rx: mpsc::UnboundedReceiver<(i32, String)>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;
            message = rx.recv() => match message {
                Some((key, payload)) => publish_one(broker.as_ref(), key, payload).await,
                None => break,
            },
            () = cancel.cancelled() => {
                // flush what was pushed before the stop
                while let Ok((key, payload)) = rx.try_recv() {
                    publish_one(broker.as_ref(), key, payload).await;
                }
                break;
            }
        }
    }
    Ok(())
}

async fn publish_one(broker: &dyn Broker, key: i32, payload: String) {
    if let Err(e) = broker.publish(key, payload.clone()).await {
        warn!(key, "message send failed, {}: {}", e, payload);
    }
}

async fn poll_loop(
    broker: Arc<dyn Broker>,
    buffer: Arc<TaskBuffer>,
    options: QueueOptions,
    cancel: CancellationToken,
) -> Result<()> {
    while !cancel.is_cancelled() {
        let started = Instant::now();

        let polled = tokio::select! {
            () = cancel.cancelled() => break,
            polled = broker.poll(options.max_poll_records, options.poll_wait) => polled,
        };
        match polled {
            Ok(messages) => {
                info!(count = messages.len(), "received broker messages");
                for message in messages {
                    match Task::decode(&message) {
                        Ok(task) => buffer.push(task),
                        Err(e) => warn!("undefined message {}: {}", message, e),
                    }
                }
            }
            Err(e) => {
                warn!("broker poll failed: {}", e);
                if pause(&cancel, options.idle_sleep).await {
                    break;
                }
            }
        }

        loop {
            let pending = buffer.len();
            match backpressure(pending, started.elapsed(), &options) {
                Backpressure::Poll => {
                    debug!(pending, "polling for new tasks");
                    break;
                }
                Backpressure::Wait => {
                    let left = options.min_poll_interval.saturating_sub(started.elapsed());
                    if pause(&cancel, left.min(options.check_interval)).await {
                        return Ok(());
                    }
                }
                Backpressure::Overflow => {
                    warn!(
                        pending,
                        "too many tasks in queue, wait for processing. broker session may time out"
                    );
                    if pause(&cancel, options.overflow_pause).await {
                        return Ok(());
                    }
                }
            }
        }
    }
    debug!("poller exited");
    Ok(())
}

async fn work_loop(
    buffer: Arc<TaskBuffer>,
    handler: Arc<dyn TaskHandler>,
    idle_sleep: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    while !cancel.is_cancelled() {
        let Some(task) = buffer.pop() else {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = buffer.ready.notified() => {}
                () = tokio::time::sleep(idle_sleep) => debug!("task queue is empty"),
            }
            continue;
        };

        let tag = task.tag();
        debug!(tag = %tag, "dispatching task");
        match handler.handle(task).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                error!(tag = %tag, "fatal handler error, stopping queue: {}", e);
                cancel.cancel();
                return Err(e);
            }
            Err(e) => warn!(tag = %tag, "task failed: {}", e),
        }
    }
    debug!("worker exited");
    Ok(())
}

/// Sleep unless cancelled first; true when cancelled.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use crate::task::ListApiTask;
    use std::sync::atomic::AtomicUsize;

    fn fast_options() -> QueueOptions {
        QueueOptions {
            poll_wait: Duration::from_millis(20),
            max_poll_records: 10,
            low_water: 3,
            high_water: 100,
            min_poll_interval: Duration::from_millis(5),
            check_interval: Duration::from_millis(5),
            overflow_pause: Duration::from_millis(20),
            idle_sleep: Duration::from_millis(10),
        }
    }

    struct Recorder {
        seen: Mutex<Vec<Task>>,
    }

    #[async_trait::async_trait]
    impl TaskHandler for Recorder {
        async fn handle(&self, task: Task) -> Result<()> {
            self.seen.lock().unwrap().push(task);
            Ok(())
        }
    }

    /// Holds every task until released.
    #[derive(Default)]
    struct Blocked {
        release: CancellationToken,
    }

    #[async_trait::async_trait]
    impl TaskHandler for Blocked {
        async fn handle(&self, _task: Task) -> Result<()> {
            self.release.cancelled().await;
            Ok(())
        }
    }

    struct FailsFatally {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TaskHandler for FailsFatally {
        async fn handle(&self, _task: Task) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(QueueError::Fatal("invalid session id".to_string()))
        }
    }

    fn doc(i: usize) -> Task {
        Task::DocApi(format!("doc-{i}"))
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[test]
    fn test_backpressure_decisions() {
        let options = QueueOptions::default();
        let spaced = options.min_poll_interval;

        assert_eq!(backpressure(2, Duration::ZERO, &options), Backpressure::Poll);
        // 2 pending plus 5 new stays under high-water: poll again
        assert_eq!(backpressure(7, spaced, &options), Backpressure::Poll);
        assert_eq!(backpressure(100, spaced, &options), Backpressure::Poll);
        assert_eq!(backpressure(101, spaced, &options), Backpressure::Overflow);
        assert_eq!(backpressure(101, Duration::ZERO, &options), Backpressure::Overflow);
    }

    #[test]
    fn test_between_marks_never_waits_past_interval() {
        let options = QueueOptions::default();
        assert_eq!(backpressure(7, Duration::ZERO, &options), Backpressure::Wait);
        assert_eq!(
            backpressure(7, options.min_poll_interval, &options),
            Backpressure::Poll
        );
        assert_eq!(
            backpressure(options.high_water, Duration::from_secs(3600), &options),
            Backpressure::Poll
        );
    }

    #[tokio::test]
    async fn test_tasks_reach_handler_in_order() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = TaskQueue::new(broker.clone(), fast_options());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });

        queue.push(Task::ListApi(ListApiTask::new("p", 1)));
        queue.push(doc(1));
        queue.push(doc(2));
        queue.start(recorder.clone());

        assert!(eventually(|| recorder.seen.lock().unwrap().len() == 3).await);
        queue.stop().await.expect("clean stop");

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0], Task::ListApi(ListApiTask::new("p", 1)));
        assert_eq!(seen[1], doc(1));
        assert_eq!(seen[2], doc(2));
    }

    #[tokio::test]
    async fn test_slow_worker_keeps_poller_alive() {
        let broker = Arc::new(MemoryBroker::new());
        // default marks, only the clock is sped up
        let options = QueueOptions {
            poll_wait: Duration::from_millis(20),
            min_poll_interval: Duration::from_millis(5),
            check_interval: Duration::from_millis(5),
            ..QueueOptions::default()
        };
        let queue = TaskQueue::new(broker.clone(), options);
        for i in 0..7 {
            queue.push(doc(i));
        }
        assert!(eventually(|| broker.len() == 7).await);

        let handler = Arc::new(Blocked::default());
        queue.start(handler.clone());
        // one task held by the worker, 6 buffered: above low-water and
        // under high-water, so polling goes on
        assert!(eventually(|| queue.pending() == 6).await);
        let polled = broker.poll_count();
        assert!(eventually(|| broker.poll_count() >= polled + 2).await);
        assert_eq!(queue.pending(), 6);

        handler.release.cancel();
        queue.stop().await.expect("clean stop");
    }

    #[tokio::test]
    async fn test_overflow_stops_polling() {
        let broker = Arc::new(MemoryBroker::new());
        let options = QueueOptions {
            high_water: 4,
            overflow_pause: Duration::from_secs(60),
            ..fast_options()
        };
        let queue = TaskQueue::new(broker.clone(), options);
        for i in 0..7 {
            queue.push(doc(i));
        }
        assert!(eventually(|| broker.len() == 7).await);

        let handler = Arc::new(Blocked::default());
        queue.start(handler.clone());
        assert!(eventually(|| queue.pending() == 6).await);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(broker.poll_count(), 1);

        handler.release.cancel();
        queue.stop().await.expect("clean stop");
    }

    #[tokio::test]
    async fn test_fatal_error_stops_queue() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = TaskQueue::new(broker.clone(), fast_options());
        let handler = Arc::new(FailsFatally {
            calls: AtomicUsize::new(0),
        });
        queue.push(doc(1));
        queue.push(doc(2));
        queue.start(handler.clone());

        let token = queue.cancellation_token();
        assert!(eventually(|| token.is_cancelled()).await);
        assert!(matches!(queue.stop().await, Err(QueueError::Fatal(_))));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_flushes_pushed_tasks() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = TaskQueue::new(broker.clone(), fast_options());
        queue.push(doc(1));
        queue.stop().await.expect("clean stop");
        assert_eq!(broker.len(), 1);
    }
}
