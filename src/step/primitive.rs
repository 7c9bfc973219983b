//! Adapters that turn callback-style operations into steps.
//!
//! Every adapter resumes its workflow according to an [`Affinity`] captured
//! when the step is advanced:
//!
//! - advanced on the coordinating thread: the continuation is marshaled back
//!   through the [`Dispatcher`], so it runs on the coordinating thread no
//!   matter which thread finished the operation;
//! - advanced anywhere else: the continuation runs directly on the thread
//!   that finished the operation.
//!
//! The second case means a step started off the coordinating thread may
//! resume on an arbitrary thread even if its neighbours expect coordinating
//! affinity. That asymmetry is long-standing observable behaviour and is kept
//! as is.

use crate::error::Result;
use crate::runtime::Dispatcher;
use crate::step::driver::{self, drive, drive_unit};
use crate::step::parallel;
use crate::step::{AsyncStep, Continuation, StepValue, TypedStep, Workflow};

use std::sync::Arc;

/// Delivers the value of a callback-based operation.
pub type Deliver<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Which thread a step was advanced on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    /// Advanced on the coordinating thread; resume there.
    Coordinating,
    /// Advanced elsewhere; resume on whichever thread completes.
    Foreign,
}

impl Affinity {
    /// Asks `dispatcher` which thread the caller is on.
    pub fn capture(dispatcher: &dyn Dispatcher) -> Self {
        if dispatcher.is_coordinating_thread() {
            Affinity::Coordinating
        } else {
            Affinity::Foreign
        }
    }

    /// Runs `done` according to this affinity.
    pub fn resume(self, dispatcher: &dyn Dispatcher, done: Continuation) {
        match self {
            Affinity::Coordinating => dispatcher.run_on_coordinating_thread(done),
            Affinity::Foreign => done(),
        }
    }
}

/// Factory for adapter-backed steps bound to one [`Dispatcher`].
#[derive(Clone)]
pub struct Primitives {
    dispatcher: Arc<dyn Dispatcher>,
}

impl Primitives {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Wraps "start work, call back later" as a step.
    ///
    /// `start` receives the completion callback and must call it exactly once.
    pub fn from_callback<U, F>(&self, start: F) -> AsyncStep<U>
    where
        F: FnOnce(Continuation) + Send + 'static,
    {
        let dispatcher = Arc::clone(&self.dispatcher);

        AsyncStep::pending(move |done: Continuation| {
            let affinity = Affinity::capture(&*dispatcher);

            start(Box::new(move || affinity.resume(&*dispatcher, done)));
        })
    }

    /// Wraps "start work, call back later with a value" as a typed step.
    ///
    /// The value is stored before the workflow resumes, so the next step can
    /// read it.
    pub fn from_callback_value<T, F>(&self, start: F) -> TypedStep<T>
    where
        T: Send + 'static,
        F: FnOnce(Deliver<T>) + Send + 'static,
    {
        let value = StepValue::new();
        let slot = value.clone();
        let dispatcher = Arc::clone(&self.dispatcher);

        let step = move |done: Continuation| {
            let affinity = Affinity::capture(&*dispatcher);

            start(Box::new(move |produced: T| {
                slot.complete(Ok(produced));
                affinity.resume(&*dispatcher, done);
            }));
        };

        TypedStep::from_parts(value, Box::new(step))
    }

    /// Adapts a begin/end pair into a typed step.
    ///
    /// `begin` starts the operation and later delivers a token; `end` turns
    /// the token into the value.
    pub fn from_begin_end<Tok, T, B, E>(&self, begin: B, end: E) -> TypedStep<T>
    where
        Tok: Send + 'static,
        T: Send + 'static,
        B: FnOnce(Deliver<Tok>) + Send + 'static,
        E: FnOnce(Tok) -> T + Send + 'static,
    {
        self.from_callback_value(move |deliver: Deliver<T>| {
            begin(Box::new(move |token: Tok| deliver(end(token))));
        })
    }

    /// Adapts a begin/end pair whose end yields nothing.
    pub fn from_begin_end_unit<U, Tok, B, E>(&self, begin: B, end: E) -> AsyncStep<U>
    where
        Tok: Send + 'static,
        B: FnOnce(Deliver<Tok>) + Send + 'static,
        E: FnOnce(Tok) + Send + 'static,
    {
        self.from_callback(move |done: Continuation| {
            begin(Box::new(move |token: Tok| {
                end(token);
                done();
            }));
        })
    }

    /// Runs `workflow` as a single step of an outer workflow.
    pub fn nested<U, T>(&self, workflow: Workflow<T>) -> AsyncStep<U>
    where
        T: Send + 'static,
    {
        self.from_callback(move |done: Continuation| drive_unit(workflow, done))
    }

    /// Runs `workflow` as a single typed step of an outer workflow.
    ///
    /// If the nested workflow never produces a value, reading the step's value
    /// reports the contract violation.
    pub fn nested_value<T>(&self, workflow: Workflow<T>) -> TypedStep<T>
    where
        T: Send + 'static,
    {
        let value = StepValue::new();
        let slot = value.clone();
        let dispatcher = Arc::clone(&self.dispatcher);

        let step = move |done: Continuation| {
            let affinity = Affinity::capture(&*dispatcher);

            drive(workflow, move |outcome: Result<T>| {
                slot.complete(outcome);
                affinity.resume(&*dispatcher, done);
            });
        };

        TypedStep::from_parts(value, Box::new(step))
    }

    /// A step that resumes on the coordinating thread's next idle tick.
    pub fn yield_tick<U>(&self) -> AsyncStep<U> {
        let dispatcher = Arc::clone(&self.dispatcher);

        AsyncStep::pending(move |done: Continuation| dispatcher.run_on_next_idle_tick(done))
    }

    /// Fans out `workflows` and resumes once all of them finished.
    pub fn parallel<U>(&self, workflows: Vec<Workflow>) -> AsyncStep<U> {
        parallel::parallel(workflows)
    }

    /// Drives `workflow` and blocks until it finishes.
    ///
    /// # Errors
    /// See [`driver::execute_and_wait`].
    pub fn execute_and_wait<T>(&self, workflow: Workflow<T>) -> Result<T>
    where
        T: Send + 'static,
    {
        if self.dispatcher.is_coordinating_thread() {
            tracing::warn!("blocking the coordinating thread on a workflow");
        }

        driver::execute_and_wait(workflow)
    }
}
