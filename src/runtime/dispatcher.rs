//! Coordinating-thread oracle and action marshaling.
//!
//! [`Dispatcher`] is the seam between this crate and whatever host loop owns
//! the coordinating thread. [`TickDispatcher`] is a ready-made implementation
//! backed by two FIFO queues that the host pumps once per tick.

use parking_lot::{Condvar, Mutex};

use std::collections::VecDeque;
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Work marshaled onto the coordinating thread.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Reports thread identity and moves work onto the coordinating thread.
pub trait Dispatcher: Send + Sync {
    /// Returns `true` if the calling thread is the coordinating thread.
    fn is_coordinating_thread(&self) -> bool;

    /// Runs `action` on the coordinating thread.
    fn run_on_coordinating_thread(&self, action: Action);

    /// Runs `action` on the coordinating thread during the next idle tick.
    fn run_on_next_idle_tick(&self, action: Action);
}

#[derive(Default)]
struct Queues {
    marshaled: VecDeque<Action>,
    idle: VecDeque<Action>,
}

/// A [`Dispatcher`] bound to the thread that created it.
///
/// Marshaled actions run inline when the caller already is the coordinating
/// thread and are queued otherwise. Queued work only runs when the host calls
/// [`TickDispatcher::run_pending`] and [`TickDispatcher::run_idle`].
pub struct TickDispatcher {
    owner: ThreadId,
    queues: Mutex<Queues>,
    signal: Condvar,
}

impl TickDispatcher {
    /// Creates a dispatcher whose coordinating thread is the calling thread.
    pub fn for_current_thread() -> Self {
        Self::for_thread(thread::current().id())
    }

    /// Creates a dispatcher whose coordinating thread is `owner`.
    pub fn for_thread(owner: ThreadId) -> Self {
        Self {
            owner,
            queues: Mutex::new(Queues::default()),
            signal: Condvar::new(),
        }
    }

    /// Runs marshaled actions until the queue is empty.
    ///
    /// Actions queued while draining run in the same call. Returns the number
    /// of actions executed.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;

        loop {
            // Lock is released before running the action so it can queue more work.
            let next = self.queues.lock().marshaled.pop_front();

            match next {
                Some(action) => {
                    action();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Runs the actions that were waiting for an idle tick.
    ///
    /// Only the batch present on entry runs; anything queued by those actions
    /// waits for the next idle tick.
    pub fn run_idle(&self) -> usize {
        let batch = std::mem::take(&mut self.queues.lock().idle);
        let ran = batch.len();

        for action in batch {
            action();
        }

        ran
    }

    /// Returns `true` if no marshaled or idle work is queued.
    pub fn is_idle(&self) -> bool {
        let queues = self.queues.lock();
        queues.marshaled.is_empty() && queues.idle.is_empty()
    }

    /// Blocks until marshaled work is queued or `timeout` elapses.
    ///
    /// Returns `true` if work is available.
    pub fn wait_for_work(&self, timeout: Duration) -> bool {
        let mut queues = self.queues.lock();

        if queues.marshaled.is_empty() && queues.idle.is_empty() {
            self.signal.wait_for(&mut queues, timeout);
        }

        !queues.marshaled.is_empty() || !queues.idle.is_empty()
    }
}

impl Dispatcher for TickDispatcher {
    fn is_coordinating_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn run_on_coordinating_thread(&self, action: Action) {
        if self.is_coordinating_thread() {
            action();
            return;
        }

        self.queues.lock().marshaled.push_back(action);
        self.signal.notify_one();
    }

    fn run_on_next_idle_tick(&self, action: Action) {
        self.queues.lock().idle.push_back(action);
        self.signal.notify_one();
    }
}
