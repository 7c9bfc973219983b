//! Deadline-ordered timer scheduling.
//!
//! Handles can be created, started, stopped and released from any thread.
//! The deadline queue itself is only ever touched on the coordinating
//! thread: calls made elsewhere are marshaled there through the
//! [`Dispatcher`].
//!
//! The host drains due timers once per tick and runs the callbacks it keeps
//! for the returned identities:
//!
//! ```ignore
//! let mut fired = Vec::new();
//! scheduler.drain(clock.elapsed_micros(), &mut fired)?;
//! for id in fired {
//!     callbacks[&id]();
//! }
//! ```

mod alloc;
pub mod handle;
mod queue;

pub use handle::{TimerHandle, TimerId, TimerState};

use crate::error::{Error, Result};
use crate::runtime::Dispatcher;
use crate::time::Clock;
use self::alloc::IdAllocator;
use self::handle::TimerCell;
use self::queue::DeadlineQueue;

use parking_lot::Mutex;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// One timer popped by a drain.
pub(crate) struct Firing {
    pub(crate) id: TimerId,
    generation: u64,
    cell: Arc<TimerCell>,
}

impl Firing {
    pub(crate) fn ticket(&self) -> u64 {
        self.cell.ticket()
    }

    /// `false` once the timer was stopped or released after it was drained.
    pub(crate) fn is_current(&self) -> bool {
        self.cell.generation() == self.generation && self.cell.id() == Some(self.id)
    }
}

struct Inner {
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
    ids: IdAllocator,
    // Coordinating thread only.
    queue: Mutex<DeadlineQueue>,
    next_ticket: AtomicU64,
    live: AtomicUsize,
    leaks: Arc<AtomicUsize>,
}

impl Inner {
    fn on_coordinating(&self) -> bool {
        self.dispatcher.is_coordinating_thread()
    }

    fn arm(&self, cell: Arc<TimerCell>) {
        if !cell.transition(TimerState::Starting, TimerState::Armed) {
            // Stopped or released before the insert got here.
            return;
        }

        // Deferred inserts may land after their deadline; never arm in the past.
        let deadline = cell.deadline().max(self.clock.elapsed_micros());
        cell.set_deadline(deadline);
        self.queue.lock().insert(deadline, cell);
    }

    fn unqueue(&self, ticket: u64) {
        self.queue.lock().remove(ticket);
    }

    // Deferred removals skip cells that were armed again in the meantime.
    fn unqueue_unless_armed(&self, cell: &TimerCell) {
        if cell.state() != TimerState::Armed {
            self.unqueue(cell.ticket());
        }
    }
}

/// Allocates timer handles and orders them by deadline.
///
/// Cloning is cheap and shares the same scheduler.
#[derive(Clone)]
pub struct TimerScheduler {
    inner: Arc<Inner>,
}

impl TimerScheduler {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(dispatcher, clock, 0)
    }

    /// Creates a scheduler whose local free list starts with room for
    /// `capacity` identities.
    pub fn with_capacity(
        dispatcher: Arc<dyn Dispatcher>,
        clock: Arc<dyn Clock>,
        capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                clock,
                ids: IdAllocator::with_capacity(capacity),
                queue: Mutex::new(DeadlineQueue::new()),
                next_ticket: AtomicU64::new(0),
                live: AtomicUsize::new(0),
                leaks: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Allocates a new idle handle.
    pub fn create(&self) -> TimerHandle {
        let id = self.inner.ids.allocate(self.inner.on_coordinating());
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);

        self.inner.live.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(id, "timer created");

        TimerHandle::new(
            Arc::new(TimerCell::new(ticket, id)),
            Arc::clone(&self.inner.leaks),
        )
    }

    /// Schedules `handle` to fire `delay_millis` from now.
    ///
    /// A repeating timer fires every `delay_millis` after that. Negative or
    /// missing delays are treated as zero. Starting a timer that is already
    /// starting or armed does nothing.
    ///
    /// # Errors
    /// [`Error::Disposed`] if the handle was released.
    pub fn start(
        &self,
        handle: &TimerHandle,
        delay_millis: Option<i64>,
        repeating: bool,
    ) -> Result<()> {
        let cell = &handle.cell;

        if !cell.transition(TimerState::Idle, TimerState::Starting) {
            return match cell.state() {
                TimerState::Released => Err(Error::Disposed),
                _ => Ok(()),
            };
        }

        let delay = delay_millis.unwrap_or(0).max(0).unsigned_abs();
        let period = delay.saturating_mul(1_000);
        let deadline = self.inner.clock.elapsed_micros().saturating_add(period);
        cell.configure(deadline, period, repeating);

        tracing::debug!(id = ?cell.id(), deadline, repeating, "timer starting");

        if self.inner.on_coordinating() {
            self.inner.arm(Arc::clone(cell));
        } else {
            let inner = Arc::clone(&self.inner);
            let cell = Arc::clone(cell);
            self.inner
                .dispatcher
                .run_on_coordinating_thread(Box::new(move || inner.arm(cell)));
        }

        Ok(())
    }

    /// Cancels a pending firing without releasing the handle.
    ///
    /// # Errors
    /// [`Error::Disposed`] if the handle was released.
    pub fn stop(&self, handle: &TimerHandle) -> Result<()> {
        let cell = &handle.cell;

        if cell.transition(TimerState::Armed, TimerState::Idle) {
            self.unqueue(cell);
        } else if !cell.transition(TimerState::Starting, TimerState::Idle)
            && cell.state() == TimerState::Released
        {
            return Err(Error::Disposed);
        }

        cell.cancel_pending_fire();
        tracing::debug!(id = ?cell.id(), "timer stopped");
        Ok(())
    }

    /// Fires every timer whose deadline is `<= now`.
    ///
    /// Identities are appended to `fired` in deadline order, ties broken by
    /// the order timers were armed. Repeating timers are re-armed at their
    /// previous deadline plus their period and fire at most once per drain.
    ///
    /// A handle released from another thread while the drain runs may still
    /// be reported; its identity can already belong to a newer handle.
    ///
    /// # Errors
    /// [`Error::ContractViolation`] when called off the coordinating thread.
    pub fn drain(&self, now: u64, fired: &mut Vec<TimerId>) -> Result<()> {
        let mut due = Vec::new();
        self.drain_due(now, &mut due)?;

        fired.extend(due.iter().map(|firing| firing.id));
        Ok(())
    }

    /// Same as [`drain`](Self::drain), keeping enough of each timer to tell
    /// later whether the firing is still wanted.
    pub(crate) fn drain_due(&self, now: u64, due: &mut Vec<Firing>) -> Result<()> {
        if !self.inner.on_coordinating() {
            return Err(Error::ContractViolation(
                "timers drained off the coordinating thread",
            ));
        }

        let before = due.len();
        let mut rearm = Vec::new();
        let mut queue = self.inner.queue.lock();

        while let Some((key, cell)) = queue.pop_due(now) {
            // A cell stopped or released mid-drain is no longer armed; skip it.
            if !cell.transition(TimerState::Armed, TimerState::Idle) {
                continue;
            }

            let generation = cell.generation();
            let Some(id) = cell.id() else {
                continue;
            };

            if cell.is_repeating() && cell.transition(TimerState::Idle, TimerState::Armed) {
                let deadline = key.deadline.saturating_add(cell.period());
                cell.set_deadline(deadline);
                rearm.push((deadline, Arc::clone(&cell)));
            }

            due.push(Firing {
                id,
                generation,
                cell,
            });
        }

        for (deadline, cell) in rearm {
            queue.insert(deadline, cell);
        }

        let count = due.len() - before;
        if count > 0 {
            tracing::debug!(now, count, pending = queue.len(), "timers drained");
        }

        Ok(())
    }

    /// Releases `handle`, cancelling it and recycling its identity.
    ///
    /// # Errors
    /// [`Error::Disposed`] if the handle was already released.
    pub fn release(&self, handle: &TimerHandle) -> Result<()> {
        let cell = &handle.cell;
        let (id, previous) = cell.retire()?;
        let on_coordinating = self.inner.on_coordinating();

        if previous == TimerState::Armed {
            self.unqueue(cell);
        }

        self.inner.ids.release(id, on_coordinating);
        self.inner.live.fetch_sub(1, Ordering::AcqRel);

        tracing::debug!(id, "timer released");
        Ok(())
    }

    /// Moves identities released on other threads onto the local free list.
    ///
    /// [`create`](Self::create) does this on demand; hosts may call it during
    /// quiet ticks. Coordinating thread only; elsewhere returns zero.
    pub fn merge_released(&self) -> usize {
        if !self.inner.on_coordinating() {
            return 0;
        }

        self.inner.ids.merge_released()
    }

    /// Earliest queued deadline in elapsed microseconds.
    ///
    /// Coordinating thread only; elsewhere returns `None`.
    pub fn next_deadline(&self) -> Option<u64> {
        if !self.inner.on_coordinating() {
            return None;
        }

        self.inner.queue.lock().peek_deadline()
    }

    /// Number of queued entries. Coordinating thread only.
    pub fn pending(&self) -> usize {
        if !self.inner.on_coordinating() {
            return 0;
        }

        self.inner.queue.lock().len()
    }

    /// Returns `true` if `handle` currently has a queued entry.
    pub fn is_queued(&self, handle: &TimerHandle) -> bool {
        self.inner.on_coordinating() && self.inner.queue.lock().contains(handle.cell.ticket())
    }

    /// Handles created and not yet released.
    pub fn live_handles(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Handles dropped without being released.
    pub fn leaked_handles(&self) -> usize {
        self.inner.leaks.load(Ordering::Acquire)
    }

    /// Identities minted so far; stays flat while released ones are reused.
    pub fn minted(&self) -> u64 {
        self.inner.ids.minted()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    fn unqueue(&self, cell: &Arc<TimerCell>) {
        if self.inner.on_coordinating() {
            self.inner.unqueue(cell.ticket());
            return;
        }

        let inner = Arc::clone(&self.inner);
        let cell = Arc::clone(cell);
        self.inner
            .dispatcher
            .run_on_coordinating_thread(Box::new(move || inner.unqueue_unless_armed(&cell)));
    }
}
