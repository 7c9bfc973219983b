//! Fan-out / fan-in over independent workflows.

use crate::step::driver::drive_unit;
use crate::step::{AsyncStep, Continuation, Workflow};

use parking_lot::Mutex;

use std::sync::Arc;

struct JoinState {
    finished: Vec<bool>,
    done: Option<Continuation>,
}

struct Join {
    state: Mutex<JoinState>,
}

impl Join {
    fn branch_finished(&self, index: usize) {
        let done = {
            let mut state = self.state.lock();
            state.finished[index] = true;

            if state.finished.iter().all(|&f| f) {
                state.done.take()
            } else {
                None
            }
        };

        // Exactly one branch observes the last flag under the lock.
        if let Some(done) = done {
            tracing::trace!("all parallel branches finished");
            done();
        }
    }
}

/// Returns a step that drives every workflow independently and resumes once
/// all of them are exhausted.
///
/// Branches may finish synchronously while the step is being advanced or
/// later from any thread; completion is decided by the shared flags, never
/// by branch order. With no workflows the step resumes immediately.
pub fn parallel<U>(workflows: Vec<Workflow>) -> AsyncStep<U> {
    AsyncStep::pending(move |done: Continuation| {
        if workflows.is_empty() {
            return done();
        }

        let join = Arc::new(Join {
            state: Mutex::new(JoinState {
                finished: vec![false; workflows.len()],
                done: Some(done),
            }),
        });

        for (index, workflow) in workflows.into_iter().enumerate() {
            let join = Arc::clone(&join);
            drive_unit(workflow, move || join.branch_finished(index));
        }
    })
}
