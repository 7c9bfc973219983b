//! Scoped timers with callbacks.
//!
//! A [`Timer`] owns its [`TimerHandle`] and releases it when dropped, so a
//! callback can never outlive the timer that fires it.

use crate::error::Result;
use crate::timer::{TimerHandle, TimerId, TimerScheduler, TimerState};

use parking_lot::Mutex;

use std::collections::HashMap;
use std::sync::Arc;

pub(crate) type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Callbacks keyed by the ticket of the timer that fires them.
///
/// Tickets are never reused, so a recycled [`TimerId`] cannot reach a
/// callback registered by an earlier timer.
#[derive(Clone, Default)]
pub(crate) struct Callbacks {
    map: Arc<Mutex<HashMap<u64, Callback>>>,
}

impl Callbacks {
    fn insert(&self, ticket: u64, callback: Callback) {
        self.map.lock().insert(ticket, callback);
    }

    fn remove(&self, ticket: u64) {
        self.map.lock().remove(&ticket);
    }

    /// The callback for `ticket`. The lock is not held once this returns.
    pub(crate) fn get(&self, ticket: u64) -> Option<Callback> {
        self.map.lock().get(&ticket).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }
}

/// A timer that runs a callback on the coordinating thread when it fires.
///
/// Created by [`Runtime::timer`](crate::Runtime::timer). Dropping it releases
/// the underlying handle.
pub struct Timer {
    handle: TimerHandle,
    scheduler: TimerScheduler,
    callbacks: Callbacks,
}

impl Timer {
    pub(crate) fn new<F>(scheduler: &TimerScheduler, callbacks: &Callbacks, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handle = scheduler.create();
        callbacks.insert(handle.cell.ticket(), Arc::new(callback));

        Self {
            handle,
            scheduler: scheduler.clone(),
            callbacks: callbacks.clone(),
        }
    }

    /// Fires after `delay_millis`, and every `delay_millis` after that if
    /// `repeating`. Does nothing if already started.
    pub fn start(&self, delay_millis: i64, repeating: bool) -> Result<()> {
        self.scheduler
            .start(&self.handle, Some(delay_millis), repeating)
    }

    pub fn stop(&self) -> Result<()> {
        self.scheduler.stop(&self.handle)
    }

    pub fn id(&self) -> Result<TimerId> {
        self.handle.id()
    }

    pub fn state(&self) -> TimerState {
        self.handle.state()
    }

    /// Releases the timer now instead of at drop.
    pub fn release(self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&self) -> Result<()> {
        self.callbacks.remove(self.handle.cell.ticket());
        self.scheduler.release(&self.handle)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if !self.handle.is_released() {
            let _ = self.release_inner();
        }
    }
}
