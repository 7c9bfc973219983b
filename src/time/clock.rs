//! Elapsed-time sources.
//!
//! The scheduler never reads the wall clock directly. It asks a [`Clock`] for
//! the number of microseconds elapsed since some fixed origin, which keeps
//! deadlines monotonic and lets tests drive time by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Supplies a monotonically increasing elapsed-time counter.
pub trait Clock: Send + Sync {
    /// Microseconds elapsed since the clock's origin.
    fn elapsed_micros(&self) -> u64;
}

/// A [`Clock`] backed by [`Instant`], with its origin at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn elapsed_micros(&self) -> u64 {
        // Saturate rather than wrap: u64 micros covers ~584k years.
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// A [`Clock`] that only moves when told to.
///
/// Setting the clock backwards is ignored so it stays monotonic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let micros = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.now.fetch_add(micros, Ordering::SeqCst);
    }

    /// Moves the clock to `millis` milliseconds after its origin.
    pub fn set_millis(&self, millis: u64) {
        self.now
            .fetch_max(millis.saturating_mul(1_000), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn elapsed_micros(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
