//! Editing sessions for sketchsync.
//!
//! - [`history`]: the bounded linear undo/redo log
//! - [`editor`]: [`EditorSession`], which wires history, render surface and
//!   sync coordinator together for one open scene

pub mod config;
pub mod editor;
pub mod error;
pub mod history;

pub use config::SessionConfig;
pub use editor::{EditorSession, SessionOrigin};
pub use error::{LoadError, SessionError};
pub use history::{HistoryLog, DEFAULT_HISTORY_CAPACITY};
