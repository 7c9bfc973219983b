//! Deadline-ordered timer entries.
//!
//! Entries are keyed by `(deadline, sequence)`. The sequence grows with every
//! insertion, so timers sharing a deadline come out in the order they were
//! armed.

use crate::timer::handle::TimerCell;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct EntryKey {
    pub(crate) deadline: u64,
    pub(crate) sequence: u64,
}

#[derive(Default)]
pub(crate) struct DeadlineQueue {
    entries: BTreeMap<EntryKey, Arc<TimerCell>>,
    // cell ticket -> key of its current entry
    index: HashMap<u64, EntryKey>,
    next_sequence: u64,
}

impl DeadlineQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Inserts `cell` at `deadline`, replacing any entry it already had.
    pub(crate) fn insert(&mut self, deadline: u64, cell: Arc<TimerCell>) {
        let key = EntryKey {
            deadline,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        if let Some(stale) = self.index.insert(cell.ticket(), key) {
            self.entries.remove(&stale);
        }

        self.entries.insert(key, cell);
    }

    /// Removes the entry belonging to `ticket`, if any.
    pub(crate) fn remove(&mut self, ticket: u64) -> bool {
        match self.index.remove(&ticket) {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    pub(crate) fn contains(&self, ticket: u64) -> bool {
        self.index.contains_key(&ticket)
    }

    /// Earliest deadline, if any entry is queued.
    pub(crate) fn peek_deadline(&self) -> Option<u64> {
        self.entries.first_key_value().map(|(key, _)| key.deadline)
    }

    /// Pops the earliest entry if its deadline is `<= now`.
    pub(crate) fn pop_due(&mut self, now: u64) -> Option<(EntryKey, Arc<TimerCell>)> {
        if self.peek_deadline()? > now {
            return None;
        }

        let (key, cell) = self.entries.pop_first()?;
        self.index.remove(&cell.ticket());
        Some((key, cell))
    }
}
