//! Editing session: ties the undo history to the sync coordinator.
//!
//! An [`EditorSession`] is the one object a host needs per open scene. It
//! loads the scene, seeds the render surface, listens for the surface's
//! mutations, and runs undo/redo through the coordinator so that history
//! applies never interleave with remote applies.

use std::sync::Arc;

use parking_lot::Mutex;
use sketchsync_core::{codec, SceneId, Snapshot};
use sketchsync_sync::{
    CoordinatorState, DocumentStore, MutationEvent, RenderSurface, SyncCoordinator,
};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{LoadError, SessionError};
use crate::history::HistoryLog;

/// Where the initial content of a session came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// Read from the document store.
    Loaded,
    /// Nothing usable was stored; started from the template.
    Fresh,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Undo,
    Redo,
}

struct SessionInner {
    coordinator: SyncCoordinator,
    surface: Arc<dyn RenderSurface>,
    history: Mutex<HistoryLog>,
    origin: SessionOrigin,
    read_only: bool,
}

impl SessionInner {
    fn handle_mutation(&self, event: MutationEvent) {
        if self.read_only {
            return;
        }
        match self.coordinator.state() {
            CoordinatorState::ApplyingRemote => {
                debug!(?event, "mutation from remote apply, not recorded");
            }
            CoordinatorState::AwaitingHistoryApply => {
                let snapshot = codec::serialize(&self.surface.capture());
                self.coordinator.on_local_mutation(snapshot);
            }
            CoordinatorState::Idle => {
                let snapshot = codec::serialize(&self.surface.capture());
                let recorded = self.history.lock().record(snapshot.clone());
                self.coordinator.on_local_mutation(snapshot);
                debug!(?event, recorded, "local mutation");
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.coordinator.teardown();
    }
}

/// One open scene.
///
/// Must be opened and used inside a Tokio runtime.
pub struct EditorSession {
    inner: Arc<SessionInner>,
}

impl EditorSession {
    /// Open `scene` on `surface`, backed by `store`.
    ///
    /// A missing or unreadable stored document is not an error: the session
    /// starts from the configured template and reports
    /// [`SessionOrigin::Fresh`]. The seed itself is not written back.
    pub async fn open(
        scene: SceneId,
        store: Arc<dyn DocumentStore>,
        surface: Arc<dyn RenderSurface>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let (seed, origin) = match load(store.as_ref(), &scene).await {
            Ok(Some(snapshot)) => (snapshot, SessionOrigin::Loaded),
            Ok(None) => {
                info!(scene = %scene, template = %config.template, "new scene");
                (codec::serialize(&config.template.scene()), SessionOrigin::Fresh)
            }
            Err(e) => {
                warn!(scene = %scene, error = %e, "could not load scene, starting from template");
                (codec::serialize(&config.template.scene()), SessionOrigin::Fresh)
            }
        };

        let coordinator =
            SyncCoordinator::new(scene, store, surface.clone(), config.sync.clone());
        coordinator.apply_seed(&seed).await?;

        let inner = Arc::new(SessionInner {
            coordinator,
            surface,
            history: Mutex::new(HistoryLog::new(seed, config.history_capacity)),
            origin,
            read_only: config.sync.read_only,
        });

        let weak = Arc::downgrade(&inner);
        inner
            .surface
            .set_mutation_listener(Some(Arc::new(move |event: MutationEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_mutation(event);
                }
            })));

        if let Err(e) = inner.coordinator.subscribe() {
            warn!(
                scene = %inner.coordinator.scene(),
                error = %e,
                "could not subscribe to remote changes, editing locally"
            );
        }

        info!(scene = %inner.coordinator.scene(), ?origin, "scene opened");
        Ok(Self { inner })
    }

    pub fn scene_id(&self) -> &SceneId {
        self.inner.coordinator.scene()
    }

    pub fn origin(&self) -> SessionOrigin {
        self.inner.origin
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.coordinator.state()
    }

    /// Feed a surface mutation into the session.
    ///
    /// The session registers itself as the surface's listener on open, so
    /// hosts only call this when they deliver events themselves.
    pub fn handle_mutation(&self, event: MutationEvent) {
        self.inner.handle_mutation(event);
    }

    /// Step back one state. `Ok(None)` when there is nothing to undo.
    pub async fn undo(&self) -> Result<Option<Snapshot>, SessionError> {
        self.step(Step::Undo).await
    }

    /// Step forward one state. `Ok(None)` when there is nothing to redo.
    pub async fn redo(&self) -> Result<Option<Snapshot>, SessionError> {
        self.step(Step::Redo).await
    }

    async fn step(&self, step: Step) -> Result<Option<Snapshot>, SessionError> {
        if self.inner.read_only {
            return Err(SessionError::ReadOnly);
        }
        let available = {
            let history = self.inner.history.lock();
            match step {
                Step::Undo => history.can_undo(),
                Step::Redo => history.can_redo(),
            }
        };
        if !available {
            return Ok(None);
        }
        let guard = self
            .inner
            .coordinator
            .begin_history_apply()
            .map_err(SessionError::Busy)?;

        let target = {
            let mut history = self.inner.history.lock();
            match step {
                Step::Undo => history.undo(),
                Step::Redo => history.redo(),
            }
        };
        let Some(snapshot) = target else {
            guard.release().await;
            return Ok(None);
        };

        match self.inner.coordinator.apply_history(guard, &snapshot).await {
            Ok(()) => {
                debug!(scene = %self.scene_id(), ?step, cursor = self.cursor(), "history applied");
                Ok(Some(snapshot))
            }
            Err(e) => {
                // Put the cursor back on the state still displayed.
                let mut history = self.inner.history.lock();
                match step {
                    Step::Undo => history.redo(),
                    Step::Redo => history.undo(),
                };
                warn!(scene = %self.scene_id(), ?step, error = %e, "history apply failed");
                Err(e.into())
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.inner.history.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.inner.history.lock().can_redo()
    }

    pub fn history_len(&self) -> usize {
        self.inner.history.lock().len()
    }

    pub fn cursor(&self) -> usize {
        self.inner.history.lock().cursor()
    }

    /// The history entry at the cursor
    pub fn current_snapshot(&self) -> Option<Snapshot> {
        self.inner.history.lock().current().cloned()
    }

    /// Whether a debounced write has not been sent yet
    pub fn has_pending_write(&self) -> bool {
        self.inner.coordinator.has_pending_write()
    }

    /// Write any pending edit now. Returns whether there was one.
    pub async fn flush(&self) -> Result<bool, SessionError> {
        Ok(self.inner.coordinator.flush().await?)
    }

    /// Stop listening to the surface and the store.
    ///
    /// A pending (not yet sent) write is dropped; call [`flush`](Self::flush)
    /// first to keep it.
    pub fn close(self) {
        self.inner.surface.set_mutation_listener(None);
        self.inner.coordinator.teardown();
        info!(scene = %self.scene_id(), "scene closed");
    }
}

async fn load(store: &dyn DocumentStore, scene: &SceneId) -> Result<Option<Snapshot>, LoadError> {
    let Some(document) = store.get(scene).await? else {
        return Ok(None);
    };
    let parsed = codec::deserialize(&document.payload)?;
    info!(scene = %scene, objects = parsed.len(), updated_at = %document.updated_at, "loaded scene");
    // Re-encode so the seed compares equal to later captures.
    Ok(Some(codec::serialize(&parsed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use sketchsync_core::{serialize, Scene, Shape, Template};
    use sketchsync_sync::{FileStore, HeadlessSurface, MemoryStore, SyncConfig};

    struct Harness {
        session: EditorSession,
        store: Arc<MemoryStore>,
        surface: Arc<HeadlessSurface>,
        scene: SceneId,
    }

    async fn open_with(store: Arc<MemoryStore>, config: SessionConfig) -> Harness {
        let surface = Arc::new(HeadlessSurface::new());
        let scene: SceneId = "session-test".parse().unwrap();
        let session = EditorSession::open(scene.clone(), store.clone(), surface.clone(), config)
            .await
            .unwrap();
        Harness {
            session,
            store,
            surface,
            scene,
        }
    }

    async fn open() -> Harness {
        open_with(Arc::new(MemoryStore::new()), SessionConfig::default()).await
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1500)).await;
    }

    fn rect() -> Shape {
        Shape::rect(10.0, 20.0, 100.0, 50.0, "#3366ff")
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_scene_starts_from_template_without_writing() {
        let h = open_with(
            Arc::new(MemoryStore::new()),
            SessionConfig::new().with_template(Template::Diagram),
        )
        .await;

        assert_eq!(h.session.origin(), SessionOrigin::Fresh);
        assert_eq!(h.surface.capture(), Template::Diagram.scene());
        assert_eq!(h.session.history_len(), 1);
        assert!(!h.session.can_undo());

        settle().await;
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_scene_is_loaded_in_canonical_form() {
        let store = Arc::new(MemoryStore::new());
        let scene: SceneId = "session-test".parse().unwrap();
        store.push_remote(
            &scene,
            Snapshot::from_raw(
                r##"{ "objects": [ {"width": 3, "type": "rect", "left": 1} ], "background": "#abcdef" }"##,
            ),
        );

        let h = open_with(store, SessionConfig::default()).await;
        assert_eq!(h.session.origin(), SessionOrigin::Loaded);
        assert_eq!(h.surface.capture().background, "#abcdef");
        assert_eq!(h.surface.capture().len(), 1);
        assert_eq!(
            h.session.current_snapshot(),
            Some(serialize(&h.surface.capture()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_scene_falls_back_to_template() {
        let store = Arc::new(MemoryStore::new());
        let scene: SceneId = "session-test".parse().unwrap();
        store.push_remote(&scene, Snapshot::from_raw("{\"objects\": 7}"));

        let h = open_with(store, SessionConfig::new().with_template(Template::Wireframe)).await;
        assert_eq!(h.session.origin(), SessionOrigin::Fresh);
        assert_eq!(h.surface.capture(), Template::Wireframe.scene());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_store_still_opens() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let h = open_with(store, SessionConfig::default()).await;
        assert_eq!(h.session.origin(), SessionOrigin::Fresh);

        h.surface.add(rect());
        assert_eq!(h.session.history_len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn add_undo_redo_round_trip() {
        let h = open().await;
        let seed = h.session.current_snapshot().unwrap();

        h.surface.add(rect());
        assert_eq!(h.session.history_len(), 2);
        assert_eq!(h.session.cursor(), 1);
        assert!(h.session.can_undo());
        let with_rect = serialize(&h.surface.capture());
        settle().await;
        assert_eq!(h.store.payload(&h.scene), Some(with_rect.clone()));

        assert_eq!(h.session.undo().await.unwrap(), Some(seed.clone()));
        assert!(h.surface.capture().is_empty());
        assert_eq!(h.session.cursor(), 0);
        assert!(!h.session.can_undo());
        assert!(h.session.can_redo());
        settle().await;
        assert_eq!(h.store.payload(&h.scene), Some(seed));

        assert_eq!(h.session.redo().await.unwrap(), Some(with_rect.clone()));
        assert_eq!(h.surface.capture().len(), 1);
        assert_eq!(h.session.history_len(), 2);
        assert!(!h.session.can_redo());
        settle().await;
        assert_eq!(h.store.payload(&h.scene), Some(with_rect));
        assert_eq!(h.surface.applied().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn each_edit_is_recorded_but_burst_is_one_write() {
        let h = open().await;
        for i in 0..5 {
            h.surface.add(Shape::circle(i as f64, 0.0, 5.0, "#000000"));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(h.session.history_len(), 6);
        settle().await;
        assert_eq!(h.store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_to_undo_is_not_an_error() {
        let h = open().await;
        assert_eq!(h.session.undo().await.unwrap(), None);
        assert_eq!(h.session.redo().await.unwrap(), None);
        assert_eq!(h.session.state(), CoordinatorState::Idle);

        // an empty step never claims the apply region, even mid remote apply
        h.surface.set_apply_latency(Duration::from_millis(100));
        h.store.push_remote(&h.scene, serialize(&Scene::new().with_background("#222222")));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.session.undo().await.unwrap(), None);
        settle().await;
        assert_eq!(h.surface.capture().background, "#222222");
    }

    #[tokio::test(start_paused = true)]
    async fn remote_change_is_shown_but_not_recorded() {
        let h = open().await;
        let mut remote = Scene::new().with_background("#000000");
        remote.push(rect());
        h.store.push_remote(&h.scene, serialize(&remote));
        settle().await;

        assert_eq!(h.surface.capture(), remote);
        assert_eq!(h.session.history_len(), 1);
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn undo_during_remote_apply_is_busy() {
        let h = open().await;
        h.surface.add(rect());
        h.surface.set_apply_latency(Duration::from_millis(100));

        h.store.push_remote(&h.scene, serialize(&Scene::new().with_background("#111111")));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = h.session.undo().await.unwrap_err();
        assert!(matches!(err, SessionError::Busy(CoordinatorState::ApplyingRemote)));
        assert_eq!(h.session.cursor(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_history_steps_are_rejected() {
        let h = open().await;
        h.surface.add(rect());
        h.surface.add(rect());
        h.surface.set_apply_latency(Duration::from_millis(100));

        let (first, second) = tokio::join!(h.session.undo(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.session.undo().await
        });
        assert!(first.unwrap().is_some());
        assert!(matches!(
            second,
            Err(SessionError::Busy(CoordinatorState::AwaitingHistoryApply))
        ));
        assert_eq!(h.session.cursor(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_apply_rolls_back_cursor() {
        let h = open().await;
        h.surface.add(rect());
        h.surface.fail_next_applies(1);

        assert!(matches!(h.session.undo().await, Err(SessionError::Apply(_))));
        assert_eq!(h.session.cursor(), 1);
        assert!(h.session.can_undo());
        assert_eq!(h.session.state(), CoordinatorState::Idle);

        assert!(h.session.undo().await.unwrap().is_some());
        assert_eq!(h.session.cursor(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn read_only_session_never_writes() {
        let h = open_with(
            Arc::new(MemoryStore::new()),
            SessionConfig::new().with_sync(SyncConfig::new().read_only()),
        )
        .await;
        assert!(h.session.is_read_only());

        h.surface.add(rect());
        assert_eq!(h.session.history_len(), 1);
        assert!(matches!(h.session.undo().await, Err(SessionError::ReadOnly)));
        settle().await;
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn history_capacity_is_honoured() {
        let h = open_with(
            Arc::new(MemoryStore::new()),
            SessionConfig::new().with_history_capacity(3),
        )
        .await;
        for i in 0..5 {
            h.surface.add(Shape::text(0.0, i as f64, "x", 12.0, "#000000"));
        }
        assert_eq!(h.session.history_len(), 3);
        assert_eq!(h.session.cursor(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn close_drops_pending_write_and_detaches() {
        let h = open().await;
        h.surface.add(rect());
        assert!(h.session.has_pending_write());

        h.session.close();
        h.surface.add(rect());
        settle().await;
        assert_eq!(h.store.write_count(), 0);
        assert_eq!(h.store.subscriber_count(&h.scene), 0);
    }

    #[tokio::test]
    async fn flush_then_reopen_from_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let scene: SceneId = "persisted".parse().unwrap();

        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let surface = Arc::new(HeadlessSurface::new());
        let session = EditorSession::open(
            scene.clone(),
            store.clone(),
            surface.clone(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        surface.add(rect());
        assert!(session.flush().await.unwrap());
        session.close();

        let reopened_surface = Arc::new(HeadlessSurface::new());
        let reopened = EditorSession::open(
            scene,
            Arc::new(FileStore::open(dir.path()).await.unwrap()),
            reopened_surface.clone(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(reopened.origin(), SessionOrigin::Loaded);
        assert_eq!(reopened_surface.capture(), surface.capture());
    }
}
