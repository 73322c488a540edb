//! Document store abstraction.
//!
//! A store keeps one durable [`Document`] per scene and publishes a change
//! feed of every document written to it, including writes made by this
//! client. Conflicts resolve as last-write-wins on the whole document.

mod file;
mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sketchsync_core::{SceneId, Snapshot};
use tokio::sync::mpsc;

use crate::error::StoreError;

pub use file::{default_store_dir, FileStore};
pub use memory::MemoryStore;

/// Largest payload a store accepts
pub const MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

/// A durable copy of a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Serialized snapshot, opaque to the store
    pub payload: Snapshot,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Wrap a snapshot, stamped with the current time
    pub fn new(payload: Snapshot) -> Self {
        Self {
            payload,
            updated_at: Utc::now(),
        }
    }
}

/// Stream of documents written to one scene.
///
/// Dropping the receiver unsubscribes. An `Err` item ends the feed.
pub type ChangeFeed = mpsc::UnboundedReceiver<Result<Document, StoreError>>;

/// Keyed durable storage for scene documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the current document for a scene, if one was ever written.
    async fn get(&self, scene: &SceneId) -> Result<Option<Document>, StoreError>;

    /// Replace the document for a scene.
    async fn set(&self, scene: &SceneId, document: Document) -> Result<(), StoreError>;

    /// Subscribe to every subsequent write to a scene.
    fn subscribe(&self, scene: &SceneId) -> Result<ChangeFeed, StoreError>;
}

/// Reject payloads a document store cannot hold.
///
/// Mirrors the limits of hosted document databases: bounded size, and no
/// array directly inside another array.
pub fn check_structure(payload: &Snapshot) -> Result<(), StoreError> {
    if payload.len() > MAX_DOCUMENT_BYTES {
        return Err(StoreError::rejected(format!(
            "payload is {} bytes, limit is {}",
            payload.len(),
            MAX_DOCUMENT_BYTES
        )));
    }
    let value: Value = serde_json::from_str(payload.as_str())
        .map_err(|e| StoreError::rejected(format!("payload is not JSON: {e}")))?;
    if let Some(at) = find_nested_array(&value, "$") {
        return Err(StoreError::rejected(format!(
            "nested arrays are not supported (at {at})"
        )));
    }
    Ok(())
}

fn find_nested_array(value: &Value, at: &str) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().enumerate().find_map(|(i, item)| {
            let here = format!("{at}[{i}]");
            if item.is_array() {
                Some(here)
            } else {
                find_nested_array(item, &here)
            }
        }),
        Value::Object(map) => map
            .iter()
            .find_map(|(key, item)| find_nested_array(item, &format!("{at}.{key}"))),
        _ => None,
    }
}

/// Per-scene change feed fan-out shared by the bundled stores
#[derive(Default)]
pub(crate) struct Subscribers {
    feeds: Mutex<HashMap<SceneId, Vec<mpsc::UnboundedSender<Result<Document, StoreError>>>>>,
}

impl Subscribers {
    pub(crate) fn register(&self, scene: &SceneId) -> ChangeFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().entry(scene.clone()).or_default().push(tx);
        rx
    }

    /// Deliver a document to every live subscriber, pruning dropped ones
    pub(crate) fn notify(&self, scene: &SceneId, document: &Document) {
        let mut feeds = self.feeds.lock();
        if let Some(senders) = feeds.get_mut(scene) {
            senders.retain(|tx| tx.send(Ok(document.clone())).is_ok());
        }
    }

    /// Terminate every feed for a scene with an error
    pub(crate) fn fail(&self, scene: &SceneId, message: &str) {
        if let Some(senders) = self.feeds.lock().remove(scene) {
            for tx in senders {
                let _ = tx.send(Err(StoreError::Feed(message.to_string())));
            }
        }
    }

    pub(crate) fn count(&self, scene: &SceneId) -> usize {
        let mut feeds = self.feeds.lock();
        match feeds.get_mut(scene) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_check_accepts_codec_output() {
        let mut scene = sketchsync_core::Scene::new();
        scene.push(sketchsync_core::Shape::path(&[(0.0, 0.0), (1.0, 1.0)], "#000", 2.0));
        assert!(check_structure(&sketchsync_core::serialize(&scene)).is_ok());
    }

    #[test]
    fn structure_check_rejects_nested_arrays() {
        let payload = Snapshot::from_raw(r#"{"objects":[{"type":"path","path":[["M",1,2]]}]}"#);
        let err = check_structure(&payload).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(err.to_string().contains("$.objects[0].path[0]"));
    }

    #[test]
    fn structure_check_rejects_oversized_and_invalid() {
        let big = Snapshot::from_raw(format!("\"{}\"", "x".repeat(MAX_DOCUMENT_BYTES)));
        assert!(matches!(check_structure(&big), Err(StoreError::Rejected(_))));
        assert!(matches!(
            check_structure(&Snapshot::from_raw("{not json")),
            Err(StoreError::Rejected(_))
        ));
    }

    #[test]
    fn document_wire_shape() {
        let doc = Document::new(Snapshot::from_raw("{}"));
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["payload"], "{}");
        assert!(value.get("updatedAt").is_some());
    }

    #[test]
    fn subscribers_prune_dropped_feeds() {
        let subscribers = Subscribers::default();
        let scene: SceneId = "scene".parse().unwrap();
        let mut kept = subscribers.register(&scene);
        let dropped = subscribers.register(&scene);
        drop(dropped);
        assert_eq!(subscribers.count(&scene), 1);

        let doc = Document::new(Snapshot::from_raw("{}"));
        subscribers.notify(&scene, &doc);
        assert_eq!(kept.try_recv().unwrap().unwrap(), doc);

        subscribers.fail(&scene, "gone");
        assert!(matches!(kept.try_recv(), Ok(Err(StoreError::Feed(_)))));
        assert_eq!(subscribers.count(&scene), 0);
    }
}
