//! Document store backed by one JSON file per scene.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sketchsync_core::SceneId;
use tracing::debug;

use super::{check_structure, ChangeFeed, Document, DocumentStore, Subscribers};
use crate::error::StoreError;

/// Distinguishes temp files of overlapping writes to the same scene
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get the default directory for stored scenes
pub fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sketchsync")
        .join("scenes")
}

/// Stores each scene as `<dir>/<scene-id>.json`.
///
/// The change feed only reports writes made through this instance; other
/// processes writing the same directory are not observed.
pub struct FileStore {
    dir: PathBuf,
    subscribers: Subscribers,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            subscribers: Subscribers::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, scene: &SceneId) -> PathBuf {
        self.dir.join(format!("{scene}.json"))
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, scene: &SceneId) -> Result<Option<Document>, StoreError> {
        let content = match tokio::fs::read_to_string(self.document_path(scene)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn set(&self, scene: &SceneId, document: Document) -> Result<(), StoreError> {
        check_structure(&document.payload)?;

        let path = self.document_path(scene);
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{scene}.{}.{n}.tmp", std::process::id()));
        let content = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(scene = %scene, path = %path.display(), "file store write");
        self.subscribers.notify(scene, &document);
        Ok(())
    }

    fn subscribe(&self, scene: &SceneId) -> Result<ChangeFeed, StoreError> {
        Ok(self.subscribers.register(scene))
    }
}
