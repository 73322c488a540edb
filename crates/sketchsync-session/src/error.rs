//! Error types for editing sessions.

use sketchsync_core::ParseError;
use sketchsync_sync::{ApplyError, CoordinatorState, StoreError};
use thiserror::Error;

/// The stored scene could not be loaded.
///
/// Never fatal: the session starts from its template instead.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read scene: {0}")]
    Store(#[from] StoreError),

    #[error("stored scene is invalid: {0}")]
    Parse(#[from] ParseError),
}

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another snapshot is being applied; try again once it finishes.
    #[error("busy: {0:?} in progress")]
    Busy(CoordinatorState),

    #[error("session is view-only")]
    ReadOnly,

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
