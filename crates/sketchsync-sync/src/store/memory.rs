//! In-memory document store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sketchsync_core::{SceneId, Snapshot};
use tracing::debug;

use super::{check_structure, ChangeFeed, Document, DocumentStore, Subscribers};
use crate::error::StoreError;

/// A document store held in memory.
///
/// Behaves like a hosted store, including the change feed echoing this
/// client's own writes. Knobs for latency, outages and write rejection make
/// it usable as a test double.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<SceneId, Document>>,
    subscribers: Subscribers,
    write_log: Mutex<Vec<(SceneId, Snapshot)>>,
    faults: Mutex<Faults>,
}

#[derive(Default)]
struct Faults {
    offline: bool,
    reject_writes: bool,
    write_latency: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every request fail with [`StoreError::Unavailable`]
    pub fn set_offline(&self, offline: bool) {
        self.faults.lock().offline = offline;
    }

    /// Make every write fail with [`StoreError::Rejected`]
    pub fn set_reject_writes(&self, reject: bool) {
        self.faults.lock().reject_writes = reject;
    }

    /// Delay each write by `latency` before it lands
    pub fn set_write_latency(&self, latency: Duration) {
        self.faults.lock().write_latency = latency;
    }

    /// Simulate a write made by another client
    pub fn push_remote(&self, scene: &SceneId, payload: Snapshot) {
        let document = Document::new(payload);
        self.documents.lock().insert(scene.clone(), document.clone());
        self.subscribers.notify(scene, &document);
    }

    /// Terminate every change feed for a scene with an error
    pub fn fail_feed(&self, scene: &SceneId, message: &str) {
        self.subscribers.fail(scene, message);
    }

    /// Snapshots successfully written through [`DocumentStore::set`], in order
    pub fn writes(&self, scene: &SceneId) -> Vec<Snapshot> {
        self.write_log
            .lock()
            .iter()
            .filter(|(id, _)| id == scene)
            .map(|(_, snapshot)| snapshot.clone())
            .collect()
    }

    /// Number of successful writes across all scenes
    pub fn write_count(&self) -> usize {
        self.write_log.lock().len()
    }

    pub fn subscriber_count(&self, scene: &SceneId) -> usize {
        self.subscribers.count(scene)
    }

    /// Current payload for a scene without going through the async API
    pub fn payload(&self, scene: &SceneId) -> Option<Snapshot> {
        self.documents.lock().get(scene).map(|d| d.payload.clone())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.faults.lock().offline {
            Err(StoreError::unavailable("memory store is offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, scene: &SceneId) -> Result<Option<Document>, StoreError> {
        self.check_online()?;
        Ok(self.documents.lock().get(scene).cloned())
    }

    async fn set(&self, scene: &SceneId, document: Document) -> Result<(), StoreError> {
        let (latency, reject) = {
            let faults = self.faults.lock();
            (faults.write_latency, faults.reject_writes)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.check_online()?;
        if reject {
            return Err(StoreError::rejected("memory store is rejecting writes"));
        }
        check_structure(&document.payload)?;

        debug!(scene = %scene, bytes = document.payload.len(), "memory store write");
        self.documents.lock().insert(scene.clone(), document.clone());
        self.write_log
            .lock()
            .push((scene.clone(), document.payload.clone()));
        self.subscribers.notify(scene, &document);
        Ok(())
    }

    fn subscribe(&self, scene: &SceneId) -> Result<ChangeFeed, StoreError> {
        self.check_online()?;
        Ok(self.subscribers.register(scene))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn scene() -> SceneId {
        "memory-test".parse().unwrap()
    }

    fn payload(background: &str) -> Snapshot {
        sketchsync_core::serialize(&sketchsync_core::Scene::new().with_background(background))
    }

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryStore::new();
        assert!(store.get(&scene()).await.unwrap().is_none());

        assert_ok!(store.set(&scene(), Document::new(payload("#000000"))).await);
        let doc = assert_ok!(store.get(&scene()).await).unwrap();
        assert_eq!(doc.payload, payload("#000000"));
        assert_eq!(store.writes(&scene()), vec![payload("#000000")]);
    }

    #[tokio::test]
    async fn feed_echoes_own_writes_and_remote_writes() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe(&scene()).unwrap();

        store.set(&scene(), Document::new(payload("#111111"))).await.unwrap();
        store.push_remote(&scene(), payload("#222222"));

        assert_eq!(feed.recv().await.unwrap().unwrap().payload, payload("#111111"));
        assert_eq!(feed.recv().await.unwrap().unwrap().payload, payload("#222222"));
        // remote writes are not part of this client's write log
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn faults() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(store.get(&scene()).await, Err(StoreError::Unavailable(_))));
        assert_err!(store.subscribe(&scene()));

        store.set_offline(false);
        store.set_reject_writes(true);
        let result = store.set(&scene(), Document::new(payload("#000000"))).await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn structurally_invalid_writes_are_rejected() {
        let store = MemoryStore::new();
        let bad = Snapshot::from_raw(r#"{"objects":[[1]]}"#);
        let result = store.set(&scene(), Document::new(bad)).await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert!(store.payload(&scene()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn write_latency_delays_the_write() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.set_write_latency(Duration::from_millis(500));

        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.set(&scene(), Document::new(payload("#000000"))).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.write_count(), 0);

        writer.await.unwrap().unwrap();
        assert_eq!(store.write_count(), 1);
    }
}
