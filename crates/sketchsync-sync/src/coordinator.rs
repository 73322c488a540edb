//! Sync coordinator: debounced writes, remote apply, echo suppression.
//!
//! One coordinator exists per open scene. It owns every piece of mutable sync
//! state behind a single lock that is never held across an `.await`:
//!
//! - the pending debounce timer (at most one)
//! - the state machine `Idle -> ApplyingRemote | AwaitingHistoryApply -> Idle`
//! - the snapshots written by this client, used to recognise the store's
//!   change feed reflecting them back
//!
//! A write only counts as "ours" while the surface still shows it. Applying
//! a remote snapshot bumps the remote epoch; writes dispatched before that
//! are stale, and their echo is applied like any other remote change.
//!
//! Writes are trailing-edge debounced: every local mutation replaces the
//! pending timer, and only the last snapshot of a burst reaches the store.
//! Replacing the timer never cancels a write that has already been handed to
//! the store.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sketchsync_core::{codec, SceneId, Snapshot};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{ApplyError, StoreError};
use crate::store::{Document, DocumentStore};
use crate::surface::RenderSurface;

/// What the coordinator is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Nothing is being applied to the surface.
    Idle,
    /// A snapshot from the change feed is being applied.
    ApplyingRemote,
    /// An undo/redo snapshot is being applied.
    AwaitingHistoryApply,
}

/// How a snapshot from the change feed was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Applied to the render surface.
    Applied,
    /// The store reflecting this client's own write; ignored.
    Echo,
    /// Same as the last applied remote snapshot; ignored.
    Duplicate,
    /// Another apply was in progress; queued until it finishes.
    Deferred,
    /// Not a valid scene; skipped.
    Invalid,
    /// The render surface refused it.
    Failed,
}

struct PendingWrite {
    generation: u64,
    snapshot: Snapshot,
    timer: AbortHandle,
}

struct InFlight {
    snapshot: Snapshot,
    /// Remote epoch when the write was dispatched.
    epoch: u64,
}

struct Shared {
    state: CoordinatorState,
    pending: Option<PendingWrite>,
    next_generation: u64,
    remote_epoch: u64,
    in_flight: Vec<InFlight>,
    last_written: Option<Snapshot>,
    last_applied_remote: Option<Snapshot>,
    deferred_remote: Option<Snapshot>,
    listener: Option<AbortHandle>,
    closed: bool,
}

struct Inner {
    scene: SceneId,
    store: Arc<dyn DocumentStore>,
    surface: Arc<dyn RenderSurface>,
    config: SyncConfig,
    shared: Mutex<Shared>,
}

/// Handle to the sync coordinator of one scene. Clones share state.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("scene", &self.inner.scene)
            .field("state", &self.state())
            .finish()
    }
}

impl SyncCoordinator {
    pub fn new(
        scene: SceneId,
        store: Arc<dyn DocumentStore>,
        surface: Arc<dyn RenderSurface>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                scene,
                store,
                surface,
                config,
                shared: Mutex::new(Shared {
                    state: CoordinatorState::Idle,
                    pending: None,
                    next_generation: 0,
                    remote_epoch: 0,
                    in_flight: Vec::new(),
                    last_written: None,
                    last_applied_remote: None,
                    deferred_remote: None,
                    listener: None,
                    closed: false,
                }),
            }),
        }
    }

    pub fn scene(&self) -> &SceneId {
        &self.inner.scene
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.shared.lock().state
    }

    /// Whether a debounced write is waiting for its timer
    pub fn has_pending_write(&self) -> bool {
        self.inner.shared.lock().pending.is_some()
    }

    /// Last snapshot the store acknowledged, while the surface still shows it
    pub fn last_written(&self) -> Option<Snapshot> {
        self.inner.shared.lock().last_written.clone()
    }

    /// Whether the change feed listener is still running
    pub fn is_listening(&self) -> bool {
        self.inner
            .shared
            .lock()
            .listener
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Report a completed mutation on the render surface.
    ///
    /// Returns whether a write was scheduled. Mutations are dropped while a
    /// remote snapshot is being applied (they were caused by it), in
    /// view-only sessions, and after teardown. Mutations caused by an
    /// undo/redo apply are scheduled unless `persist_history_applies` is off.
    pub fn on_local_mutation(&self, snapshot: Snapshot) -> bool {
        let mut shared = self.inner.shared.lock();
        if shared.closed || self.inner.config.read_only {
            return false;
        }
        match shared.state {
            CoordinatorState::ApplyingRemote => {
                debug!(scene = %self.inner.scene, "mutation caused by remote apply, not scheduling");
                false
            }
            CoordinatorState::AwaitingHistoryApply if !self.inner.config.persist_history_applies => {
                false
            }
            _ => self.schedule_locked(&mut shared, snapshot),
        }
    }

    /// (Re)start the debounce timer for `snapshot`.
    ///
    /// Any pending timer is cancelled first; a write already dispatched to
    /// the store keeps running.
    pub fn schedule_write(&self, snapshot: Snapshot) -> bool {
        let mut shared = self.inner.shared.lock();
        if shared.closed || self.inner.config.read_only {
            return false;
        }
        self.schedule_locked(&mut shared, snapshot)
    }

    fn schedule_locked(&self, shared: &mut Shared, snapshot: Snapshot) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(scene = %self.inner.scene, "no async runtime, write not scheduled");
            return false;
        };

        if let Some(previous) = shared.pending.take() {
            previous.timer.abort();
        }
        // A local edit makes the next remote snapshot worth applying even if
        // it repeats the previous one.
        shared.last_applied_remote = None;

        let generation = shared.next_generation;
        shared.next_generation += 1;

        let this = self.clone();
        let delay = self.inner.config.debounce;
        let timer = runtime
            .spawn(async move {
                tokio::time::sleep(delay).await;
                this.dispatch(generation).await;
            })
            .abort_handle();

        debug!(
            scene = %self.inner.scene,
            generation,
            delay_ms = delay.as_millis() as u64,
            "write scheduled"
        );
        shared.pending = Some(PendingWrite {
            generation,
            snapshot,
            timer,
        });
        true
    }

    /// Timer expiry: claim the pending write if it is still ours and send it
    async fn dispatch(&self, generation: u64) {
        let snapshot = {
            let mut shared = self.inner.shared.lock();
            let Some(pending) = shared.pending.take_if(|p| p.generation == generation) else {
                return;
            };
            let epoch = shared.remote_epoch;
            shared.in_flight.push(InFlight {
                snapshot: pending.snapshot.clone(),
                epoch,
            });
            pending.snapshot
        };
        // Failures are logged inside; the next local mutation reschedules.
        let _ = self.write(snapshot).await;
    }

    async fn write(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        let result = self
            .inner
            .store
            .set(&self.inner.scene, Document::new(snapshot.clone()))
            .await;

        let mut shared = self.inner.shared.lock();
        let epoch = shared
            .in_flight
            .iter()
            .position(|w| w.snapshot == snapshot)
            .map(|pos| shared.in_flight.remove(pos).epoch);
        match &result {
            Ok(()) => {
                info!(scene = %self.inner.scene, bytes = snapshot.len(), "scene saved");
                if epoch == Some(shared.remote_epoch) {
                    shared.last_written = Some(snapshot);
                } else {
                    debug!(scene = %self.inner.scene, "saved snapshot was superseded by a remote change");
                }
            }
            Err(e) => {
                error!(scene = %self.inner.scene, error = %e, "save failed, keeping edit local");
            }
        }
        result
    }

    /// Write the pending snapshot now instead of waiting for its timer.
    ///
    /// Returns `Ok(false)` when nothing was pending.
    pub async fn flush(&self) -> Result<bool, StoreError> {
        let snapshot = {
            let mut shared = self.inner.shared.lock();
            let Some(pending) = shared.pending.take() else {
                return Ok(false);
            };
            pending.timer.abort();
            let epoch = shared.remote_epoch;
            shared.in_flight.push(InFlight {
                snapshot: pending.snapshot.clone(),
                epoch,
            });
            pending.snapshot
        };
        self.write(snapshot).await.map(|()| true)
    }

    /// Handle a snapshot delivered by the store's change feed.
    ///
    /// Remote snapshots are applied to the surface but never enter the
    /// local undo history.
    pub async fn on_remote_change(&self, snapshot: Snapshot) -> RemoteOutcome {
        let outcome = self.apply_remote(snapshot).await;
        self.drain_deferred().await;
        outcome
    }

    async fn apply_remote(&self, snapshot: Snapshot) -> RemoteOutcome {
        if let Err(e) = codec::deserialize(&snapshot) {
            warn!(scene = %self.inner.scene, error = %e, "skipping corrupt remote snapshot");
            return RemoteOutcome::Invalid;
        }

        {
            let mut shared = self.inner.shared.lock();
            let epoch = shared.remote_epoch;
            let own_write = shared.last_written.as_ref() == Some(&snapshot)
                || shared
                    .in_flight
                    .iter()
                    .any(|w| w.epoch == epoch && w.snapshot == snapshot);
            if own_write {
                debug!(scene = %self.inner.scene, "ignoring echo of own write");
                return RemoteOutcome::Echo;
            }
            if shared.last_applied_remote.as_ref() == Some(&snapshot) {
                return RemoteOutcome::Duplicate;
            }
            if shared.state != CoordinatorState::Idle {
                debug!(scene = %self.inner.scene, state = ?shared.state, "deferring remote snapshot");
                shared.deferred_remote = Some(snapshot);
                return RemoteOutcome::Deferred;
            }
            shared.state = CoordinatorState::ApplyingRemote;
            // The whole-document replace discards the local edit the timer
            // was about to save.
            if let Some(pending) = shared.pending.take() {
                pending.timer.abort();
                debug!(scene = %self.inner.scene, "remote snapshot supersedes pending write");
            }
        }

        let reset = ResetToIdle(&self.inner.shared);
        let result = self.inner.surface.materialize(&snapshot).await;
        drop(reset);

        match result {
            Ok(()) => {
                info!(scene = %self.inner.scene, "applied remote change");
                let mut shared = self.inner.shared.lock();
                // The surface no longer shows anything this client wrote.
                shared.remote_epoch += 1;
                shared.last_written = None;
                shared.last_applied_remote = Some(snapshot);
                RemoteOutcome::Applied
            }
            Err(e) => {
                warn!(scene = %self.inner.scene, error = %e, "could not apply remote change");
                RemoteOutcome::Failed
            }
        }
    }

    /// Apply the most recent deferred remote snapshot, if the surface is free
    async fn drain_deferred(&self) {
        loop {
            let next = {
                let mut shared = self.inner.shared.lock();
                if shared.state != CoordinatorState::Idle {
                    return;
                }
                shared.deferred_remote.take()
            };
            let Some(snapshot) = next else {
                return;
            };
            self.apply_remote(snapshot).await;
        }
    }

    /// Apply a seed snapshot when a scene is opened.
    ///
    /// Runs in the `ApplyingRemote` state so the mutations it causes are
    /// neither recorded nor written back.
    pub async fn apply_seed(&self, snapshot: &Snapshot) -> Result<(), ApplyError> {
        {
            let mut shared = self.inner.shared.lock();
            if shared.state != CoordinatorState::Idle {
                return Err(ApplyError::new(format!(
                    "cannot seed scene while {:?}",
                    shared.state
                )));
            }
            shared.state = CoordinatorState::ApplyingRemote;
        }
        let reset = ResetToIdle(&self.inner.shared);
        let result = self.inner.surface.materialize(snapshot).await;
        drop(reset);
        self.drain_deferred().await;
        result
    }

    /// Enter the `AwaitingHistoryApply` state.
    ///
    /// Fails with the current state if any apply is already in progress. The
    /// state is held until the returned guard is dropped or applied.
    pub fn begin_history_apply(&self) -> Result<HistoryApplyGuard, CoordinatorState> {
        let mut shared = self.inner.shared.lock();
        if shared.state != CoordinatorState::Idle {
            return Err(shared.state);
        }
        shared.state = CoordinatorState::AwaitingHistoryApply;
        Ok(HistoryApplyGuard {
            coordinator: self.clone(),
        })
    }

    /// Apply an undo/redo snapshot in the region opened by `guard`.
    ///
    /// See [`HistoryApplyGuard::apply`].
    pub async fn apply_history(
        &self,
        guard: HistoryApplyGuard,
        snapshot: &Snapshot,
    ) -> Result<(), ApplyError> {
        debug_assert!(Arc::ptr_eq(&guard.coordinator.inner, &self.inner));
        guard.apply(snapshot).await
    }

    /// Start listening to the store's change feed.
    ///
    /// A feed error stops the listener; it is not resubscribed.
    pub fn subscribe(&self) -> Result<(), StoreError> {
        let mut feed = self.inner.store.subscribe(&self.inner.scene)?;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            while let Some(change) = feed.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let coordinator = SyncCoordinator { inner };
                match change {
                    Ok(document) => {
                        coordinator.on_remote_change(document.payload).await;
                    }
                    Err(e) => {
                        error!(scene = %coordinator.inner.scene, error = %e, "change feed failed, not resubscribing");
                        break;
                    }
                }
            }
        });

        let mut shared = self.inner.shared.lock();
        if let Some(previous) = shared.listener.replace(task.abort_handle()) {
            previous.abort();
        }
        debug!(scene = %self.inner.scene, "subscribed to change feed");
        Ok(())
    }

    /// Cancel the pending timer and unsubscribe.
    ///
    /// A write already handed to the store runs to completion.
    pub fn teardown(&self) {
        let mut shared = self.inner.shared.lock();
        if shared.closed {
            return;
        }
        shared.closed = true;
        if let Some(pending) = shared.pending.take() {
            pending.timer.abort();
            debug!(scene = %self.inner.scene, "cancelled pending write");
        }
        if let Some(listener) = shared.listener.take() {
            listener.abort();
        }
        info!(scene = %self.inner.scene, "sync stopped");
    }
}

/// Puts the coordinator back to `Idle` however the apply ends
struct ResetToIdle<'a>(&'a Mutex<Shared>);

impl Drop for ResetToIdle<'_> {
    fn drop(&mut self) {
        self.0.lock().state = CoordinatorState::Idle;
    }
}

/// Exclusive right to apply one undo/redo snapshot.
///
/// Dropping the guard returns the coordinator to `Idle`.
#[must_use = "dropping the guard immediately ends the history apply"]
pub struct HistoryApplyGuard {
    coordinator: SyncCoordinator,
}

impl HistoryApplyGuard {
    /// Materialize `snapshot`, then release the state.
    ///
    /// On success the snapshot is scheduled for writing when
    /// `persist_history_applies` is on. A remote snapshot that arrived in
    /// the meantime is applied afterwards.
    pub async fn apply(self, snapshot: &Snapshot) -> Result<(), ApplyError> {
        let coordinator = self.coordinator.clone();
        let result = coordinator.inner.surface.materialize(snapshot).await;
        if result.is_ok() {
            coordinator.on_local_mutation(snapshot.clone());
        }
        drop(self);
        coordinator.drain_deferred().await;
        result
    }

    /// End the region without applying anything.
    ///
    /// Unlike dropping the guard, this also applies a remote snapshot that
    /// was deferred while the region was open.
    pub async fn release(self) {
        let coordinator = self.coordinator.clone();
        drop(self);
        coordinator.drain_deferred().await;
    }
}

impl Drop for HistoryApplyGuard {
    fn drop(&mut self) {
        let mut shared = self.coordinator.inner.shared.lock();
        if shared.state == CoordinatorState::AwaitingHistoryApply {
            shared.state = CoordinatorState::Idle;
        }
    }
}
