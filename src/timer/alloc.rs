//! Reusable timer identities.
//!
//! Released identities go onto one of two free lists. The coordinating
//! thread owns the local list; every other thread pushes onto the shared list
//! and raises a dirty flag. The coordinating thread only takes the shared
//! lock when the flag says there is something to merge.

use parking_lot::Mutex;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Identity value marking a released handle. Never minted.
pub(crate) const RELEASED: u64 = u64::MAX;

pub(crate) struct IdAllocator {
    // Only touched on the coordinating thread; the lock is never contended.
    local: Mutex<Vec<u64>>,
    shared: Mutex<Vec<u64>>,
    shared_dirty: AtomicBool,
    next: AtomicU64,
}

impl IdAllocator {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            local: Mutex::new(Vec::with_capacity(capacity)),
            shared: Mutex::new(Vec::new()),
            shared_dirty: AtomicBool::new(false),
            next: AtomicU64::new(0),
        }
    }

    /// Hands out an identity no live handle holds.
    pub(crate) fn allocate(&self, on_coordinating: bool) -> u64 {
        if !on_coordinating {
            return self.shared.lock().pop().unwrap_or_else(|| self.mint());
        }

        let mut local = self.local.lock();

        if let Some(id) = local.pop() {
            return id;
        }

        // Local list is empty: pick up what other threads released, if anything.
        self.merge_into(&mut local);
        local.pop().unwrap_or_else(|| self.mint())
    }

    /// Returns `id` to the free list matching the calling thread.
    pub(crate) fn release(&self, id: u64, on_coordinating: bool) {
        if on_coordinating {
            self.local.lock().push(id);
            return;
        }

        let mut shared = self.shared.lock();
        shared.push(id);
        self.shared_dirty.store(true, Ordering::Release);
    }

    /// Moves identities released by other threads onto the local list.
    ///
    /// Coordinating thread only. Returns how many were moved.
    pub(crate) fn merge_released(&self) -> usize {
        let mut local = self.local.lock();
        self.merge_into(&mut local)
    }

    /// Number of identities minted so far.
    pub(crate) fn minted(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    fn merge_into(&self, local: &mut Vec<u64>) -> usize {
        if !self.shared_dirty.swap(false, Ordering::AcqRel) {
            return 0;
        }

        let mut shared = self.shared.lock();
        let moved = shared.len();
        local.append(&mut shared);
        moved
    }

    fn mint(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }
}
