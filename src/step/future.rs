//! Awaiting a workflow from `async` code.
//!
//! ```ignore
//! use tickstep::step::{AsyncStep, Workflow, WorkflowFuture};
//!
//! let result = futures::executor::block_on(WorkflowFuture::new(Workflow::ready(7)));
//! assert_eq!(result, Ok(7));
//! ```

use crate::error::{Error, Result};
use crate::step::Workflow;
use crate::step::driver::drive;

use futures::channel::oneshot;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future resolving to the result of a driven workflow.
///
/// The workflow starts driving as soon as the future is created, not on
/// first poll.
#[must_use = "the workflow runs regardless, but its result is lost"]
pub struct WorkflowFuture<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T: Send + 'static> WorkflowFuture<T> {
    pub fn new(workflow: Workflow<T>) -> Self {
        let (tx, rx) = oneshot::channel();

        drive(workflow, move |outcome| {
            let _ = tx.send(outcome);
        });

        Self { rx }
    }
}

impl<T> Future for WorkflowFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::ContractViolation(
                "workflow dropped its continuation",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::AsyncStep;

    use std::thread;
    use std::time::Duration;

    #[test]
    fn resolves_after_cross_thread_completion() {
        let workflow = Workflow::new([
            AsyncStep::pending(|done| {
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(10));
                    done();
                });
            }),
            AsyncStep::Ready("finished"),
        ]);

        let result = futures::executor::block_on(WorkflowFuture::new(workflow));
        assert_eq!(result, Ok("finished"));
    }

    #[test]
    fn abandoned_workflow_reports_contract_violation() {
        let workflow = Workflow::<u8>::new([AsyncStep::pending(drop)]);

        let result = futures::executor::block_on(WorkflowFuture::new(workflow));
        assert!(matches!(result, Err(Error::ContractViolation(_))));
    }
}
