//! Document-store synchronization for sketchsync.
//!
//! Local edits are written to a [`DocumentStore`] after a debounce window,
//! and snapshots arriving on the store's change feed are applied to the
//! [`RenderSurface`], except the echoes of this client's own writes.
//!
//! - [`coordinator`]: the per-scene [`SyncCoordinator`]
//! - [`store`]: the store trait plus in-memory and file-backed stores
//! - [`surface`]: the render surface trait plus a headless surface

pub mod config;
pub mod coordinator;
pub mod error;
pub mod store;
pub mod surface;

pub use config::{SyncConfig, DEFAULT_DEBOUNCE};
pub use coordinator::{CoordinatorState, HistoryApplyGuard, RemoteOutcome, SyncCoordinator};
pub use error::{ApplyError, StoreError};
pub use store::{
    check_structure, default_store_dir, ChangeFeed, Document, DocumentStore, FileStore,
    MemoryStore, MAX_DOCUMENT_BYTES,
};
pub use surface::{HeadlessSurface, MutationEvent, MutationListener, RenderSurface};
