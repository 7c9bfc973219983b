//! Timer handles and their shared scheduling state.

use crate::error::{Error, Result};
use crate::timer::alloc::RELEASED;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};

/// Numeric identity of a live timer. Reused after its handle is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub(crate) u64);

impl TimerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Where a timer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimerState {
    /// Never started, stopped, or fired (one-shot).
    Idle = 0,
    /// Start requested; waiting to be inserted on the coordinating thread.
    Starting = 1,
    /// Queued with a deadline.
    Armed = 2,
    /// Released. Terminal.
    Released = 3,
}

impl TimerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TimerState::Idle,
            1 => TimerState::Starting,
            2 => TimerState::Armed,
            _ => TimerState::Released,
        }
    }
}

/// Scheduling state shared between a handle and the deadline queue.
pub(crate) struct TimerCell {
    // Never reused, unlike `id`; keys the cell inside the queue index.
    ticket: u64,
    id: AtomicU64,
    state: AtomicU8,
    repeating: AtomicBool,
    period: AtomicU64,
    deadline: AtomicU64,
    // Bumped on stop and release so firings recorded earlier go stale.
    generation: AtomicU64,
}

impl TimerCell {
    pub(crate) fn new(ticket: u64, id: u64) -> Self {
        Self {
            ticket,
            id: AtomicU64::new(id),
            state: AtomicU8::new(TimerState::Idle as u8),
            repeating: AtomicBool::new(false),
            period: AtomicU64::new(0),
            deadline: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn ticket(&self) -> u64 {
        self.ticket
    }

    pub(crate) fn id(&self) -> Option<TimerId> {
        match self.id.load(Ordering::Acquire) {
            RELEASED => None,
            id => Some(TimerId(id)),
        }
    }

    pub(crate) fn state(&self) -> TimerState {
        TimerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Atomically moves `from` -> `to`. Returns whether it happened.
    pub(crate) fn transition(&self, from: TimerState, to: TimerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Records what the next arm should use.
    pub(crate) fn configure(&self, deadline: u64, period: u64, repeating: bool) {
        self.deadline.store(deadline, Ordering::Release);
        self.period.store(period, Ordering::Release);
        self.repeating.store(repeating, Ordering::Release);
    }

    pub(crate) fn deadline(&self) -> u64 {
        self.deadline.load(Ordering::Acquire)
    }

    pub(crate) fn set_deadline(&self, deadline: u64) {
        self.deadline.store(deadline, Ordering::Release);
    }

    pub(crate) fn period(&self) -> u64 {
        self.period.load(Ordering::Acquire)
    }

    pub(crate) fn is_repeating(&self) -> bool {
        self.repeating.load(Ordering::Acquire)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn cancel_pending_fire(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Clears the identity and marks the cell released.
    ///
    /// Returns the identity and the state the cell was in.
    pub(crate) fn retire(&self) -> Result<(u64, TimerState)> {
        let id = self.id.swap(RELEASED, Ordering::AcqRel);
        if id == RELEASED {
            return Err(Error::Disposed);
        }

        let previous = self.state.swap(TimerState::Released as u8, Ordering::AcqRel);
        self.cancel_pending_fire();
        Ok((id, TimerState::from_u8(previous)))
    }
}

/// Caller-owned handle naming one timer.
///
/// Release it with [`TimerScheduler::release`](crate::timer::TimerScheduler::release)
/// (or hold it inside a [`Timer`](crate::Timer) guard). A handle dropped
/// without release keeps its identity forever and is counted as a leak.
pub struct TimerHandle {
    pub(crate) cell: Arc<TimerCell>,
    leaks: Arc<AtomicUsize>,
}

impl TimerHandle {
    pub(crate) fn new(cell: Arc<TimerCell>, leaks: Arc<AtomicUsize>) -> Self {
        Self { cell, leaks }
    }

    /// The handle's identity.
    ///
    /// # Errors
    /// [`Error::Disposed`] once released.
    pub fn id(&self) -> Result<TimerId> {
        self.cell.id().ok_or(Error::Disposed)
    }

    pub fn state(&self) -> TimerState {
        self.cell.state()
    }

    pub fn is_released(&self) -> bool {
        self.state() == TimerState::Released
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.cell.id())
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if self.is_released() {
            return;
        }

        self.leaks.fetch_add(1, Ordering::AcqRel);
        tracing::warn!(id = ?self.cell.id(), "timer handle dropped without release");
    }
}
