//! Tick-driven host for timers and workflows.
//!
//! The runtime owns the coordinating thread's view of the world: the
//! dispatcher queues, the timer scheduler and the callbacks attached to
//! timers. Each [`Runtime::tick`] runs marshaled work, fires due timers and
//! then runs idle work.

use crate::builder::RuntimeBuilder;
use crate::error::{Error, Result};
use crate::runtime::guard::{Callbacks, Timer};
use crate::runtime::{Dispatcher, TickDispatcher};
use crate::step::{AsyncStep, Continuation, Primitives, Workflow, drive};
use crate::time::Clock;
use crate::timer::TimerScheduler;

use parking_lot::Mutex;

use std::sync::Arc;
use std::time::Duration;

/// Host loop binding a dispatcher, a clock and a timer scheduler to the
/// thread that built it.
pub struct Runtime {
    dispatcher: Arc<TickDispatcher>,
    clock: Arc<dyn Clock>,
    scheduler: TimerScheduler,
    primitives: Primitives,
    callbacks: Callbacks,
    max_idle_wait: Duration,
}

impl Runtime {
    /// Creates a runtime with default settings, coordinated by the calling
    /// thread.
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    pub(crate) fn from_parts(
        clock: Arc<dyn Clock>,
        handle_capacity: usize,
        max_idle_wait: Duration,
    ) -> Self {
        let dispatcher = Arc::new(TickDispatcher::for_current_thread());
        let scheduler =
            TimerScheduler::with_capacity(dispatcher.clone(), clock.clone(), handle_capacity);

        Self {
            primitives: Primitives::new(dispatcher.clone()),
            dispatcher,
            clock,
            scheduler,
            callbacks: Callbacks::default(),
            max_idle_wait,
        }
    }

    pub fn dispatcher(&self) -> &Arc<TickDispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &TimerScheduler {
        &self.scheduler
    }

    pub fn primitives(&self) -> &Primitives {
        &self.primitives
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Creates an idle timer that runs `callback` each time it fires.
    pub fn timer<F>(&self, callback: F) -> Timer
    where
        F: Fn() + Send + Sync + 'static,
    {
        Timer::new(&self.scheduler, &self.callbacks, callback)
    }

    /// Number of timers with a registered callback.
    pub fn timers(&self) -> usize {
        self.callbacks.len()
    }

    /// A step that resumes on the coordinating thread after `millis`.
    ///
    /// The backing timer is released as soon as it fires.
    pub fn delay<U>(&self, millis: i64) -> AsyncStep<U> {
        let scheduler = self.scheduler.clone();
        let callbacks = self.callbacks.clone();

        AsyncStep::pending(move |done: Continuation| {
            let slot: Arc<Mutex<Option<Timer>>> = Arc::new(Mutex::new(None));
            let done = Mutex::new(Some(done));

            let owner = Arc::clone(&slot);
            let timer = Timer::new(&scheduler, &callbacks, move || {
                let Some(done) = done.lock().take() else {
                    return;
                };

                drop(owner.lock().take());
                done();
            });

            // Park the timer before starting it so the callback always finds it.
            let mut parked = slot.lock();
            let timer = parked.insert(timer);

            if let Err(err) = timer.start(millis, false) {
                tracing::error!(%err, "delay timer failed to start");
            }
        })
    }

    /// Runs one host tick and returns how many timers fired.
    ///
    /// # Errors
    /// [`Error::ContractViolation`] when called off the coordinating thread.
    pub fn tick(&self) -> Result<usize> {
        if !self.dispatcher.is_coordinating_thread() {
            return Err(Error::ContractViolation(
                "runtime ticked off the coordinating thread",
            ));
        }

        self.dispatcher.run_pending();

        let mut due = Vec::new();
        self.scheduler
            .drain_due(self.clock.elapsed_micros(), &mut due)?;

        for firing in &due {
            // Earlier callbacks in this tick may have stopped or released it.
            if !firing.is_current() {
                continue;
            }

            if let Some(callback) = self.callbacks.get(firing.ticket()) {
                callback();
            }
        }

        self.dispatcher.run_idle();

        Ok(due.len())
    }

    /// Ticks until `workflow` completes and returns its result.
    ///
    /// Between ticks the thread waits for marshaled work, at most until the
    /// next timer deadline or the configured idle wait.
    ///
    /// # Errors
    /// Whatever the workflow reports, or [`Error::ContractViolation`] if a
    /// step dropped its continuation.
    pub fn block_on<T>(&self, workflow: Workflow<T>) -> Result<T>
    where
        T: Send + 'static,
    {
        let outcome: Arc<Mutex<Option<Result<T>>>> = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&outcome);
        let dispatcher = Arc::clone(&self.dispatcher);
        drive(workflow, move |result| {
            // Wakes the waiting host when the workflow ends on another thread.
            dispatcher.run_on_coordinating_thread(Box::new(move || {
                *slot.lock() = Some(result);
            }));
        });

        loop {
            self.tick()?;

            if let Some(result) = outcome.lock().take() {
                return result;
            }

            if Arc::strong_count(&outcome) == 1 {
                return Err(Error::ContractViolation("workflow dropped its continuation"));
            }

            let now = self.clock.elapsed_micros();
            let wait = match self.scheduler.next_deadline() {
                Some(deadline) => {
                    Duration::from_micros(deadline.saturating_sub(now)).min(self.max_idle_wait)
                }
                None => self.max_idle_wait,
            };

            if !wait.is_zero() {
                self.dispatcher.wait_for_work(wait);
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
