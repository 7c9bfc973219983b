//! Suspension points and the workflows built from them.
//!
//! A workflow is an ordered, single-pass sequence of [`AsyncStep`]s. Each step
//! is either already resolved ([`AsyncStep::Ready`]) or pending: a pending
//! step is handed a [`Continuation`] and must call it exactly once, on any
//! thread, when the outcome is known.
//!
//! # How Workflows Run
//!
//! 1. The driver pulls the next step from the workflow
//! 2. A `Ready` step binds its value; the driver moves on without suspending
//! 3. A pending step is advanced with a continuation that resumes the driver
//! 4. When the workflow is exhausted the driver reports completion
//!
//! # Example
//!
//! ```ignore
//! use tickstep::step::{AsyncStep, Workflow, drive};
//!
//! let workflow = Workflow::new([
//!     AsyncStep::pending(|done| done()),
//!     AsyncStep::Ready(5),
//! ]);
//!
//! drive(workflow, |result| assert_eq!(result, Ok(5)));
//! ```

pub mod driver;
pub mod future;
pub mod parallel;
pub mod primitive;

pub use driver::{drive, drive_unit, execute_and_wait, spawn_detached};
pub use future::WorkflowFuture;
pub use parallel::parallel;
pub use primitive::{Affinity, Primitives};

use crate::error::{Error, Result};

use parking_lot::Mutex;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Resumes whoever advanced a pending step. Called exactly once.
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// The pending half of an [`AsyncStep`].
///
/// `advance` consumes the step, so it can run at most once. Implementations
/// must eventually invoke `done` exactly once, either before returning or
/// later from any thread.
pub trait Suspend: Send {
    fn advance(self: Box<Self>, done: Continuation);
}

impl<F> Suspend for F
where
    F: FnOnce(Continuation) + Send,
{
    fn advance(self: Box<Self>, done: Continuation) {
        (*self)(done)
    }
}

/// A unit of suspension inside a workflow.
pub enum AsyncStep<T = ()> {
    /// An already known value. Drivers bind it without suspending.
    Ready(T),

    /// A step that completes later through its continuation.
    Pending(Box<dyn Suspend>),
}

impl<T> AsyncStep<T> {
    /// Wraps a closure as a pending step.
    pub fn pending<F>(start: F) -> Self
    where
        F: FnOnce(Continuation) + Send + 'static,
    {
        AsyncStep::Pending(Box::new(start))
    }

    /// Returns `true` for [`AsyncStep::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, AsyncStep::Ready(_))
    }

    /// Advances a pending step.
    ///
    /// # Errors
    /// Returns [`Error::ContractViolation`] for a `Ready` step; drivers must
    /// bind ready values instead of advancing them.
    pub fn advance(self, done: Continuation) -> Result<()> {
        match self {
            AsyncStep::Ready(_) => Err(Error::ContractViolation(
                "advance called on an already resolved step",
            )),
            AsyncStep::Pending(step) => {
                step.advance(done);
                Ok(())
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncStep<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncStep::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            AsyncStep::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// An ordered, lazily produced, single-pass sequence of steps.
///
/// A workflow cannot be rewound; to run it again, call whatever produced it
/// again.
pub struct Workflow<T = ()> {
    steps: Box<dyn Iterator<Item = AsyncStep<T>> + Send>,
}

impl<T: 'static> Workflow<T> {
    /// Builds a workflow from any sendable iterator of steps.
    pub fn new<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = AsyncStep<T>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            steps: Box::new(steps.into_iter()),
        }
    }

    /// Builds a workflow that asks `next` for each step.
    ///
    /// The closure runs only after the previous step completed, so it can
    /// read values produced by earlier typed steps.
    pub fn from_fn<F>(next: F) -> Self
    where
        F: FnMut() -> Option<AsyncStep<T>> + Send + 'static,
    {
        Self {
            steps: Box::new(std::iter::from_fn(next)),
        }
    }

    /// A workflow that immediately resolves to `value`.
    pub fn ready(value: T) -> Self
    where
        T: Send,
    {
        Self::new(std::iter::once(AsyncStep::Ready(value)))
    }

    /// A workflow with no steps.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }
}

impl<T> Iterator for Workflow<T> {
    type Item = AsyncStep<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.steps.next()
    }
}

struct Slot<T> {
    completed: AtomicBool,
    value: Mutex<Option<Result<T>>>,
}

/// Read side of a [`TypedStep`].
///
/// Cloning shares the same slot.
pub struct StepValue<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for StepValue<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> StepValue<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                completed: AtomicBool::new(false),
                value: Mutex::new(None),
            }),
        }
    }

    /// Stores the outcome and raises the completed flag.
    pub(crate) fn complete(&self, outcome: Result<T>) {
        *self.slot.value.lock() = Some(outcome);
        self.slot.completed.store(true, Ordering::Release);
    }

    /// Returns `true` once the step's continuation has fired.
    pub fn is_completed(&self) -> bool {
        self.slot.completed.load(Ordering::Acquire)
    }

    /// Returns a copy of the value.
    ///
    /// # Errors
    /// [`Error::NotReady`] before completion, or the error the step completed
    /// with (a nested workflow that never produced a value).
    pub fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        if !self.is_completed() {
            return Err(Error::NotReady);
        }

        self.slot.value.lock().clone().unwrap_or(Err(Error::NotReady))
    }

    /// Moves the value out. Later reads report [`Error::NotReady`].
    pub fn take(&self) -> Result<T> {
        if !self.is_completed() {
            return Err(Error::NotReady);
        }

        self.slot.value.lock().take().unwrap_or(Err(Error::NotReady))
    }
}

/// A pending step that produces a value of type `T`.
///
/// Keep a [`StepValue`] from [`TypedStep::value`] before yielding the step
/// with [`TypedStep::into_step`]; the value becomes readable once the
/// workflow moves past the step.
pub struct TypedStep<T> {
    value: StepValue<T>,
    step: Box<dyn Suspend>,
}

impl<T> TypedStep<T> {
    pub(crate) fn from_parts(value: StepValue<T>, step: Box<dyn Suspend>) -> Self {
        Self { value, step }
    }

    /// Handle for reading the value once the step completes.
    pub fn value(&self) -> StepValue<T> {
        self.value.clone()
    }

    /// Returns `true` once the step's continuation has fired.
    pub fn is_completed(&self) -> bool {
        self.value.is_completed()
    }

    /// Converts into a step that can be yielded from any workflow.
    pub fn into_step<U>(self) -> AsyncStep<U> {
        AsyncStep::Pending(self.step)
    }
}
