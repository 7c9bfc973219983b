//! Drives workflows to completion.
//!
//! The driver is a resumable loop rather than a recursive call chain. When a
//! pending step calls its continuation before `advance` returns, the frame
//! that called `advance` simply keeps looping, so long runs of synchronously
//! completing steps never grow the stack. When the continuation fires later
//! (from any thread), that thread picks the loop back up.

use crate::error::{Error, Result};
use crate::step::{AsyncStep, Continuation, Workflow};

use parking_lot::Mutex;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;

// Phases of the step currently being advanced.
const ADVANCING: u8 = 0;
const PARKED: u8 = 1;
const RESUMED: u8 = 2;

type ValueCallback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

enum Finish<T> {
    Value(ValueCallback<T>),
    Unit(Continuation),
    Detached,
}

struct Drive<T> {
    steps: Mutex<Workflow<T>>,
    bound: Mutex<Option<T>>,
    finish: Mutex<Option<Finish<T>>>,
    phase: AtomicU8,
}

impl<T: Send + 'static> Drive<T> {
    fn start(workflow: Workflow<T>, finish: Finish<T>) {
        let drive = Arc::new(Self {
            steps: Mutex::new(workflow),
            bound: Mutex::new(None),
            finish: Mutex::new(Some(finish)),
            phase: AtomicU8::new(ADVANCING),
        });

        drive.run();
    }

    fn run(self: Arc<Self>) {
        loop {
            let next = self.steps.lock().next();

            let step = match next {
                None => return self.complete(),
                Some(AsyncStep::Ready(value)) => {
                    *self.bound.lock() = Some(value);
                    continue;
                }
                Some(AsyncStep::Pending(step)) => step,
            };

            self.phase.store(ADVANCING, Ordering::Release);
            tracing::trace!("advancing pending step");

            let drive = Arc::clone(&self);
            step.advance(Box::new(move || drive.resume()));

            if self
                .phase
                .compare_exchange(ADVANCING, PARKED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // The continuation owns the rest of the loop now.
                return;
            }
        }
    }

    fn resume(self: Arc<Self>) {
        let inline = self
            .phase
            .compare_exchange(ADVANCING, RESUMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if !inline {
            tracing::trace!("resuming parked workflow");
            self.run();
        }
    }

    fn complete(&self) {
        let Some(finish) = self.finish.lock().take() else {
            return;
        };

        match finish {
            Finish::Value(callback) => {
                let outcome = self.bound.lock().take().ok_or(Error::ContractViolation(
                    "workflow exhausted without producing a result",
                ));

                if let Err(err) = &outcome {
                    tracing::error!(%err, "typed workflow finished without a value");
                }

                callback(outcome);
            }
            Finish::Unit(done) => done(),
            Finish::Detached => tracing::trace!("detached workflow finished"),
        }
    }
}

/// Drives `workflow` and hands its result to `on_done`.
///
/// The result is the value of the last [`AsyncStep::Ready`] the workflow
/// produced. A workflow that is exhausted without ever producing one reports
/// [`Error::ContractViolation`].
pub fn drive<T, F>(workflow: Workflow<T>, on_done: F)
where
    T: Send + 'static,
    F: FnOnce(Result<T>) + Send + 'static,
{
    Drive::start(workflow, Finish::Value(Box::new(on_done)));
}

/// Drives `workflow` to exhaustion, then calls `on_done`.
pub fn drive_unit<T, F>(workflow: Workflow<T>, on_done: F)
where
    T: Send + 'static,
    F: FnOnce() + Send + 'static,
{
    Drive::start(workflow, Finish::Unit(Box::new(on_done)));
}

/// Drives `workflow` with nobody waiting for it.
pub fn spawn_detached<T>(workflow: Workflow<T>)
where
    T: Send + 'static,
{
    Drive::start(workflow, Finish::Detached);
}

/// Drives `workflow` and blocks the calling thread until it finishes.
///
/// Meant for bridging synchronous callers. Calling it on the coordinating
/// thread deadlocks any step that needs that thread to resume.
///
/// # Errors
/// Whatever the workflow reports, or [`Error::ContractViolation`] if a step
/// dropped its continuation without calling it.
pub fn execute_and_wait<T>(workflow: Workflow<T>) -> Result<T>
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);

    drive(workflow, move |outcome| {
        let _ = tx.send(outcome);
    });

    rx.recv()
        .map_err(|_| Error::ContractViolation("workflow dropped its continuation"))?
}
