//! A centralized, seedable source of the scheduler's only two sources of
//! non-determinism: wall-clock timestamps and generated ids (§5, §9
//! "Async control flow"). Deterministic replay requires every frame to be
//! reproducible from identical inputs, so neither is ever read directly
//! from `SystemTime`/`Uuid::new_v4` inside a component — only through this
//! trait, reached via the scheduler's frame context.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
    fn next_id(&self) -> u64;
}

/// The default clock for live operation: real time, a monotone counter for
/// ids.
pub struct SystemClock {
    counter: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { counter: AtomicU64::new(0) }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

/// A clock driven by a caller-supplied sequence, for tests and for replay
/// where the recorded timestamps must be reproduced bit-for-bit rather
/// than resampled.
pub struct FixedClock {
    current: AtomicI64,
    step: i64,
    counter: AtomicU64,
}

impl FixedClock {
    pub fn starting_at(start: i64, step: i64) -> Self {
        Self { current: AtomicI64::new(start), step, counter: AtomicU64::new(0) }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.current.fetch_add(self.step, Ordering::Relaxed)
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}
