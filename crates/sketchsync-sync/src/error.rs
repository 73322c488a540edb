//! Error types for the sync layer.

use thiserror::Error;

/// Errors reported by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write, e.g. because the payload breaks its
    /// structural limits.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The change feed failed; it is not resubscribed automatically.
    #[error("change feed failed: {0}")]
    Feed(String),

    /// Stored document could not be decoded.
    #[error("corrupt stored document: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a rejected-write error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

/// The render surface could not materialize a snapshot.
#[derive(Debug, Error)]
#[error("could not apply snapshot: {0}")]
pub struct ApplyError(pub String);

impl ApplyError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<sketchsync_core::ParseError> for ApplyError {
    fn from(err: sketchsync_core::ParseError) -> Self {
        Self(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::rejected("payload too large");
        assert_eq!(err.to_string(), "write rejected: payload too large");

        let err = ApplyError::new("surface disposed");
        assert!(err.to_string().contains("surface disposed"));
    }

    #[test]
    fn from_serde_error() {
        let result: Result<i32, serde_json::Error> = serde_json::from_str("not json");
        let err: StoreError = result.unwrap_err().into();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn parse_error_becomes_apply_error() {
        let parse = sketchsync_core::deserialize(&sketchsync_core::Snapshot::from_raw(""))
            .unwrap_err();
        let err: ApplyError = parse.into();
        assert!(err.to_string().contains("empty"));
    }
}
