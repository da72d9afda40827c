use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token bucket shared by every outbound action.
///
/// `acquire` never blocks longer than the configured wait: when no permit can
/// be reserved in time the caller proceeds anyway. The limiter only slows
/// callers down, it never starves them.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    rate: f64,
    capacity: f64,
    max_wait: Duration,
}

#[derive(Debug)]
struct Bucket {
    // may go negative: permits reserved by waiting callers
    tokens: f64,
    refilled_at: Instant,
}

/// Outcome of one [`RateLimiter::acquire`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// A permit was available at once
    Immediate,
    /// A permit was reserved and the caller slept for it
    Waited(Duration),
    /// No permit within the bounded wait; the caller proceeds unthrottled
    Expired,
}

impl RateLimiter {
    /// Limiter admitting `rate` permits per second, waiting at most `1000/rate` ms.
    pub fn new(rate: f64) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        Self::with_max_wait(rate, Duration::from_secs_f64(1.0 / rate))
    }

    /// Limiter with an explicit bound on the wait per acquire.
    pub fn with_max_wait(rate: f64, max_wait: Duration) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        let capacity = rate.max(1.0);
        Self {
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
            rate,
            capacity,
            max_wait,
        }
    }

    /// Spend one unit of request budget.
    pub async fn acquire(&self) -> Permit {
        let wait = {
            let mut bucket = self.bucket.lock().await;
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
            bucket.refilled_at = now;

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return Permit::Immediate;
            }

            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate);
            if wait > self.max_wait {
                tracing::debug!(wait_ms = wait.as_millis(), "rate limit wait expired, proceeding");
                return Permit::Expired;
            }
            bucket.tokens -= 1.0;
            wait
        };

        tokio::time::sleep(wait).await;
        Permit::Waited(wait)
    }

    /// Configured permits per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Longest a single `acquire` sleeps.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }
}
