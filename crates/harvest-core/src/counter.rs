//! Bounded, access-expiring attempt counter.
//!
//! Handlers increment a key each time a task fails and stop requeueing once
//! the bound is reached. The counter is local to one process and is only a
//! liveness valve: losing an entry to eviction or expiry simply grants a few
//! more attempts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default number of keys kept before the least recently used one is evicted.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Default idle time after which a key is forgotten.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(30 * 60);

/// Outcome of [`RetryCounter::increment_and_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The attempt was counted and is within the bound.
    Allowed(u32),
    /// The bound was already reached; the count was not incremented.
    Exceeded,
}

impl Attempt {
    /// True when the caller may retry.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

#[derive(Debug)]
struct Entry {
    count: u32,
    last_access: Instant,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    // access order, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Inner {
    fn touch(&mut self, key: &str, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.seq);
            entry.seq = seq;
            entry.last_access = now;
            self.order.insert(seq, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) {
        if let Some((_, key)) = self.order.pop_first() {
            self.entries.remove(&key);
        }
    }
}

/// Attempt counter keyed by task identity.
#[derive(Debug)]
pub struct RetryCounter {
    inner: Mutex<Inner>,
    capacity: usize,
    expiry: Option<Duration>,
    max_tries: u32,
}

impl RetryCounter {
    /// Create a counter with the default capacity and 30 minute expiry.
    #[must_use]
    pub fn new(max_tries: u32) -> Self {
        Self::with_limits(DEFAULT_CAPACITY, Some(DEFAULT_EXPIRY), max_tries)
    }

    /// Create a counter with explicit limits. `expiry = None` keeps keys until
    /// they are evicted or reset.
    #[must_use]
    pub fn with_limits(capacity: usize, expiry: Option<Duration>, max_tries: u32) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            expiry,
            max_tries,
        }
    }

    /// Count one more attempt for `key`.
    pub fn increment_and_check(&self, key: &str) -> Attempt {
        let now = Instant::now();
        let mut inner = self.lock();
        self.expire_if_stale(&mut inner, key, now);

        let count = inner.entries.get(key).map_or(0, |e| e.count);
        tracing::debug!(key, count, limit = self.max_tries, "task retry count");
        if count >= self.max_tries {
            inner.touch(key, now);
            return Attempt::Exceeded;
        }

        if inner.entries.contains_key(key) {
            if let Some(entry) = inner.entries.get_mut(key) {
                entry.count = count + 1;
            }
            inner.touch(key, now);
        } else {
            while inner.entries.len() >= self.capacity {
                inner.evict_oldest();
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.insert(
                key.to_string(),
                Entry {
                    count: 1,
                    last_access: now,
                    seq,
                },
            );
            inner.order.insert(seq, key.to_string());
        }

        Attempt::Allowed(count + 1)
    }

    /// Current count for `key` (0 if unknown or expired).
    pub fn count(&self, key: &str) -> u32 {
        let now = Instant::now();
        let mut inner = self.lock();
        self.expire_if_stale(&mut inner, key, now);
        let count = inner.entries.get(key).map_or(0, |e| e.count);
        inner.touch(key, now);
        count
    }

    /// Forget `key`.
    pub fn reset(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire_if_stale(&self, inner: &mut Inner, key: &str, now: Instant) {
        let Some(expiry) = self.expiry else {
            return;
        };
        let stale = inner
            .entries
            .get(key)
            .is_some_and(|e| now.duration_since(e.last_access) > expiry);
        if stale {
            inner.remove(key);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned counter only loses bookkeeping, keep going with it
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
