//! Workflow-driven asynchronous steps and a deadline-ordered timer scheduler
//! for single-threaded, tick-driven hosts.
//!
//! # Architecture
//!
//! - **AsyncStep**: a suspension point, either already resolved or pending a continuation
//! - **Workflow**: an ordered, single-pass sequence of steps
//! - **Driver**: advances a workflow step by step until it is exhausted
//! - **Primitives**: adapt callback and begin/end operations into steps, with thread affinity
//! - **Parallel**: fans out independent workflows and resumes once all finish
//! - **TimerScheduler**: reusable handles ordered by deadline, drained once per tick
//! - **Dispatcher / Clock**: the host's coordinating-thread oracle and time source
//! - **Runtime**: a reference host loop tying the pieces together

mod builder;
pub mod error;
pub mod runtime;
pub mod step;
pub mod time;
pub mod timer;

pub use builder::RuntimeBuilder;
pub use error::{Error, Result};
pub use runtime::{Dispatcher, Runtime, TickDispatcher, Timer};
pub use step::{AsyncStep, Continuation, Primitives, StepValue, TypedStep, Workflow};
pub use time::{Clock, ManualClock, MonotonicClock};
pub use timer::{TimerHandle, TimerId, TimerScheduler, TimerState};
