//! Linear undo/redo history of scene snapshots.
//!
//! Unlike a pair of undo/redo stacks, the log is one list with a cursor:
//! `entries[cursor]` is always the state on screen. Recording after an undo
//! discards everything to the right of the cursor.

use std::collections::VecDeque;

use sketchsync_core::Snapshot;
use tracing::warn;

/// Default number of snapshots kept
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Bounded, linear snapshot history
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<Snapshot>,
    cursor: usize,
    capacity: usize,
}

impl HistoryLog {
    /// Start a history at `seed`. A capacity of zero is treated as one.
    pub fn new(seed: Snapshot, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = VecDeque::with_capacity(capacity.min(64));
        entries.push_back(seed);
        Self {
            entries,
            cursor: 0,
            capacity,
        }
    }

    /// Drop all history and start again at `seed`
    pub fn reset(&mut self, seed: Snapshot) {
        self.entries.clear();
        self.entries.push_back(seed);
        self.cursor = 0;
    }

    /// Record a new state after the cursor.
    ///
    /// Returns false when `snapshot` equals the current state.
    pub fn record(&mut self, snapshot: Snapshot) -> bool {
        if self.entries.get(self.cursor) == Some(&snapshot) {
            return false;
        }

        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(snapshot);
        self.cursor = self.entries.len() - 1;

        // Evict oldest
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
        }
        true
    }

    /// Step back, returning the state to display
    pub fn undo(&mut self) -> Option<Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.step_to(self.cursor - 1)
    }

    /// Step forward, returning the state to display
    pub fn redo(&mut self) -> Option<Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.step_to(self.cursor + 1)
    }

    fn step_to(&mut self, target: usize) -> Option<Snapshot> {
        match self.entries.get(target) {
            Some(snapshot) => {
                self.cursor = target;
                Some(snapshot.clone())
            }
            None => {
                warn!(
                    target_index = target,
                    len = self.entries.len(),
                    "history index out of range, ignoring"
                );
                None
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true: the log always holds the current state
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The state at the cursor
    pub fn current(&self) -> Option<&Snapshot> {
        self.entries.get(self.cursor)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
