//! Runtime configuration.
//!
//! Chooses the clock timers are measured against, how many timer identities
//! the local free list has room for up front, and how long `block_on` may
//! sleep between ticks when nothing is due.

use crate::runtime::Runtime;
use crate::time::{Clock, MonotonicClock};

use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MAX_IDLE_WAIT: Duration = Duration::from_millis(10);

/// Configures and builds a [`Runtime`].
///
/// The thread that calls [`RuntimeBuilder::build`] becomes the runtime's
/// coordinating thread.
///
/// # Example
/// ```ignore
/// let rt = RuntimeBuilder::new()
///     .handle_capacity(64)
///     .max_idle_wait(Duration::from_millis(2))
///     .build();
/// ```
pub struct RuntimeBuilder {
    clock: Option<Arc<dyn Clock>>,
    handle_capacity: usize,
    max_idle_wait: Duration,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a builder with a monotonic clock, no preallocated identities
    /// and a 10ms idle wait.
    pub fn new() -> Self {
        Self {
            clock: None,
            handle_capacity: 0,
            max_idle_wait: DEFAULT_MAX_IDLE_WAIT,
        }
    }

    /// Uses `clock` instead of a [`MonotonicClock`] started at build time.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Reserves room on the local free list for `capacity` timer identities.
    pub fn handle_capacity(mut self, capacity: usize) -> Self {
        self.handle_capacity = capacity;
        self
    }

    /// Caps how long [`Runtime::block_on`] sleeps between ticks.
    pub fn max_idle_wait(mut self, wait: Duration) -> Self {
        self.max_idle_wait = wait;
        self
    }

    /// Builds the runtime, bound to the calling thread.
    pub fn build(self) -> Runtime {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        Runtime::from_parts(clock, self.handle_capacity, self.max_idle_wait)
    }
}
