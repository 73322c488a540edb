//! Editing session configuration.

use sketchsync_core::Template;
use sketchsync_sync::SyncConfig;

use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Configuration for an [`EditorSession`](crate::EditorSession)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of snapshots the undo history keeps.
    pub history_capacity: usize,
    /// Starting content when the scene has never been saved.
    pub template: Template,
    pub sync: SyncConfig,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            template: Template::default(),
            sync: SyncConfig::default(),
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = template;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
