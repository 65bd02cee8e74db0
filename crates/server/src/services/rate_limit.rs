//! Fixed-window request limiting.
//!
//! Each client key gets a counter and a window end. The first hit after the
//! window has ended starts a new window at count 1; every other hit
//! increments. A request is admitted while the post-increment count is at
//! most the configured maximum, so exactly `max` requests pass per window.
//!
//! Counters live behind the [`CounterStore`] trait. The in-process
//! [`MemoryCounterStore`] takes a read lock plus a per-key mutex on the hot
//! path, so hits on different keys never wait on each other and hits on the
//! same key are serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

/// Storage for per-key window counters.
pub trait CounterStore: Send + Sync {
    /// Count one hit for `key` at `now` and return the count in the current
    /// window, including this hit.
    ///
    /// Opens a window of length `window` if the key has none or its window
    /// has ended.
    fn hit(&self, key: &str, now: Instant, window: Duration) -> u32;

    /// Drop every counter whose window ended before `now`. Returns how many
    /// were dropped.
    fn sweep(&self, now: Instant) -> usize;

    /// Number of tracked keys.
    fn tracked_keys(&self) -> usize;
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: Instant,
}

impl Window {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now.checked_add(window).unwrap_or(now),
        }
    }

    fn hit(&mut self, now: Instant, window: Duration) -> u32 {
        if now >= self.reset_at {
            *self = Self::open(now, window);
        }
        self.count = self.count.saturating_add(1);
        self.count
    }
}

/// Process-local [`CounterStore`].
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: RwLock<HashMap<String, Mutex<Window>>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn hit(&self, key: &str, now: Instant, window: Duration) -> u32 {
        {
            let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = windows.get(key) {
                return slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .hit(now, window);
            }
        }

        // First hit for this key. Another thread may have inserted it since
        // the read lock was released, so go through the entry API.
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        let slot = windows
            .entry(key.to_owned())
            .or_insert_with(|| Mutex::new(Window::open(now, window)));
        slot.get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .hit(now, window)
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, slot| {
            slot.get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .reset_at
                > now
        });
        before - windows.len()
    }

    fn tracked_keys(&self) -> usize {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Per-client request limiter.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            max_requests: config.max_requests,
            window: config.window,
        }
    }

    /// Limiter over a fresh [`MemoryCounterStore`].
    #[must_use]
    pub fn in_memory(config: &RateLimitConfig) -> Self {
        Self::new(Arc::new(MemoryCounterStore::new()), config)
    }

    /// Count a request from `key` now and decide whether to admit it.
    #[must_use]
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Count a request from `key` at `now` and decide whether to admit it.
    #[must_use]
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let count = self.store.hit(key, now, self.window);
        let admitted = count <= self.max_requests;
        if !admitted && count == self.max_requests.saturating_add(1) {
            // Log once per window, not once per rejected request.
            warn!(client = key, max = self.max_requests, "rate limit exceeded");
        }
        admitted
    }

    /// Drop counters whose window has ended.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let removed = self.store.sweep(now);
        if removed > 0 {
            debug!(removed, remaining = self.store.tracked_keys(), "rate limit counters swept");
        }
        removed
    }

    /// Sweep stale counters once per window until the task is aborted.
    #[must_use]
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.window);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        })
    }
}
