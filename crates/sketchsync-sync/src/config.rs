//! Configuration for the sync coordinator.

use std::time::Duration;

/// Quiet period before a burst of local edits is written to the store
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Configuration for sync behavior
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Trailing-edge debounce delay for store writes.
    pub debounce: Duration,
    /// Whether states reached through undo/redo are written to the store.
    pub persist_history_applies: bool,
    /// View-only session: remote changes are applied, nothing is written.
    pub read_only: bool,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            persist_history_applies: true,
            read_only: false,
        }
    }

    /// Sets the debounce delay.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets whether undo/redo results are persisted.
    pub fn with_persist_history_applies(mut self, persist: bool) -> Self {
        self.persist_history_applies = persist;
        self
    }

    /// Makes the session view-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
