//! Time sources for the timer scheduler.
//!
//! - [`MonotonicClock`] for real hosts
//! - [`ManualClock`] for deterministic tests and replay
//!
//! # Example
//!
//! ```ignore
//! use tickstep::time::{Clock, ManualClock};
//!
//! let clock = ManualClock::new();
//! clock.set_millis(150);
//! assert_eq!(clock.elapsed_micros(), 150_000);
//! ```

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};
