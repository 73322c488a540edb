//! Error types for sketchsync-core

use thiserror::Error;

/// A snapshot could not be turned back into a scene.
///
/// Decoding is all-or-nothing: callers never see a partially loaded scene.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Payload was empty
    #[error("snapshot is empty")]
    Empty,

    /// Payload is not a valid scene document
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A string was rejected as a scene identifier
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneIdError {
    #[error("scene id is empty")]
    Empty,

    #[error("scene id is {0} bytes long")]
    TooLong(usize),

    #[error("scene id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Unknown template name
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown template: {0}")]
pub struct UnknownTemplate(pub String);
