//! Core types for sketchsync.
//!
//! - [`scene`]: the Scene document and its opaque Shape records
//! - [`codec`]: canonical Snapshot serialization
//! - [`templates`]: starter content for new scenes

pub mod codec;
pub mod error;
pub mod scene;
pub mod templates;

pub use codec::{deserialize, serialize, Snapshot, MAX_PATH_COMMANDS};
pub use error::{ParseError, SceneIdError, UnknownTemplate};
pub use scene::{Scene, SceneId, Shape, ShapeType, DEFAULT_BACKGROUND};
pub use templates::Template;
