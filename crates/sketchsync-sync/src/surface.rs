//! Render surface abstraction.
//!
//! The render surface owns the live scene: it draws it, handles input, and
//! reports every completed mutation. The sync engine only ever asks it to
//! replace its whole scene with a snapshot, or to hand back the current one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sketchsync_core::{codec, Scene, Shape, Snapshot};

use crate::error::ApplyError;

/// A completed change on the render surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationEvent {
    Added,
    Removed,
    Modified,
    /// A freehand stroke was finished and committed as a path
    StrokeCompleted,
}

/// Callback invoked synchronously for every mutation
pub type MutationListener = Arc<dyn Fn(MutationEvent) + Send + Sync>;

/// The external drawing surface.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Replace the whole scene with the one in `snapshot`.
    ///
    /// A surface may report mutations while doing so.
    async fn materialize(&self, snapshot: &Snapshot) -> Result<(), ApplyError>;

    /// The scene as currently displayed.
    fn capture(&self) -> Scene;

    /// Install (or clear) the mutation listener.
    fn set_mutation_listener(&self, listener: Option<MutationListener>);
}

/// A render surface without a display.
///
/// Holds the scene in memory and reports mutations like a real surface
/// would, including a `Modified` event after every materialize. Used by the
/// command line tool and as a test double.
#[derive(Default)]
pub struct HeadlessSurface {
    scene: Mutex<Scene>,
    listener: Mutex<Option<MutationListener>>,
    applied: Mutex<Vec<Snapshot>>,
    faults: Mutex<SurfaceFaults>,
}

#[derive(Default)]
struct SurfaceFaults {
    failing_applies: usize,
    apply_latency: Duration,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shape, returning its index
    pub fn add(&self, shape: Shape) -> usize {
        let index = {
            let mut scene = self.scene.lock();
            scene.push(shape);
            scene.len() - 1
        };
        self.emit(MutationEvent::Added);
        index
    }

    /// Commit a freehand stroke through `points`
    pub fn finish_stroke(&self, points: &[(f64, f64)], stroke: &str, width: f64) -> usize {
        let index = {
            let mut scene = self.scene.lock();
            scene.push(Shape::path(points, stroke, width));
            scene.len() - 1
        };
        self.emit(MutationEvent::StrokeCompleted);
        index
    }

    pub fn remove(&self, index: usize) -> Option<Shape> {
        let removed = self.scene.lock().remove(index);
        if removed.is_some() {
            self.emit(MutationEvent::Removed);
        }
        removed
    }

    /// Edit the shape at `index` in place
    pub fn modify(&self, index: usize, edit: impl FnOnce(Shape) -> Shape) -> bool {
        let modified = {
            let mut scene = self.scene.lock();
            match scene.objects.get_mut(index) {
                Some(slot) => {
                    *slot = edit(slot.clone());
                    true
                }
                None => false,
            }
        };
        if modified {
            self.emit(MutationEvent::Modified);
        }
        modified
    }

    pub fn lock(&self, index: usize) -> bool {
        self.modify(index, Shape::locked)
    }

    /// Unlock every shape in one edit, returning how many there were
    pub fn unlock_all(&self) -> usize {
        let count = {
            let mut scene = self.scene.lock();
            for slot in scene.objects.iter_mut() {
                *slot = slot.clone().unlocked();
            }
            scene.len()
        };
        if count > 0 {
            self.emit(MutationEvent::Modified);
        }
        count
    }

    pub fn set_background(&self, background: impl Into<String>) {
        self.scene.lock().background = background.into();
        self.emit(MutationEvent::Modified);
    }

    /// Snapshots materialized so far, in order
    pub fn applied(&self) -> Vec<Snapshot> {
        self.applied.lock().clone()
    }

    pub fn apply_count(&self) -> usize {
        self.applied.lock().len()
    }

    /// Make the next `count` materialize calls fail
    pub fn fail_next_applies(&self, count: usize) {
        self.faults.lock().failing_applies = count;
    }

    /// Delay each materialize by `latency`
    pub fn set_apply_latency(&self, latency: Duration) {
        self.faults.lock().apply_latency = latency;
    }

    fn emit(&self, event: MutationEvent) {
        // Never call out while holding a lock: the listener reads the scene back.
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener(event);
        }
    }
}

#[async_trait]
impl RenderSurface for HeadlessSurface {
    async fn materialize(&self, snapshot: &Snapshot) -> Result<(), ApplyError> {
        let latency = self.faults.lock().apply_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        {
            let mut faults = self.faults.lock();
            if faults.failing_applies > 0 {
                faults.failing_applies -= 1;
                return Err(ApplyError::new("headless surface refused the snapshot"));
            }
        }

        let scene = codec::deserialize(snapshot)?;
        *self.scene.lock() = scene;
        self.applied.lock().push(snapshot.clone());
        self.emit(MutationEvent::Modified);
        Ok(())
    }

    fn capture(&self) -> Scene {
        self.scene.lock().clone()
    }

    fn set_mutation_listener(&self, listener: Option<MutationListener>) {
        *self.listener.lock() = listener;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(surface: &HeadlessSurface) -> Arc<Mutex<Vec<MutationEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        surface.set_mutation_listener(Some(Arc::new(move |event: MutationEvent| {
            sink.lock().push(event)
        })));
        events
    }

    #[test]
    fn edits_emit_events() {
        let surface = HeadlessSurface::new();
        let events = counting_listener(&surface);

        let index = surface.add(Shape::rect(0.0, 0.0, 10.0, 10.0, "#000000"));
        assert!(surface.lock(index));
        surface.finish_stroke(&[(0.0, 0.0), (5.0, 5.0)], "#000000", 3.0);
        surface.set_background("#eeeeee");
        assert!(surface.remove(0).is_some());
        assert!(surface.remove(9).is_none());
        assert!(!surface.lock(9));

        assert_eq!(
            *events.lock(),
            vec![
                MutationEvent::Added,
                MutationEvent::Modified,
                MutationEvent::StrokeCompleted,
                MutationEvent::Modified,
                MutationEvent::Removed,
            ]
        );
        assert_eq!(surface.capture().len(), 1);
        assert_eq!(surface.capture().background, "#eeeeee");
    }

    #[test]
    fn unlock_all_is_one_modification() {
        let surface = HeadlessSurface::new();
        assert_eq!(surface.unlock_all(), 0);

        surface.add(Shape::rect(0.0, 0.0, 10.0, 10.0, "#000000").locked());
        surface.add(Shape::circle(0.0, 0.0, 3.0, "#000000").locked());
        let events = counting_listener(&surface);

        assert_eq!(surface.unlock_all(), 2);
        assert_eq!(*events.lock(), vec![MutationEvent::Modified]);
        assert!(surface.capture().objects.iter().all(|shape| !shape.is_locked()));
    }

    #[test]
    fn listener_may_read_the_scene() {
        let surface = Arc::new(HeadlessSurface::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let weak = Arc::downgrade(&surface);
        let counter = seen.clone();
        surface.set_mutation_listener(Some(Arc::new(move |_: MutationEvent| {
            if let Some(surface) = weak.upgrade() {
                counter.store(surface.capture().len(), Ordering::SeqCst);
            }
        })));

        surface.add(Shape::circle(0.0, 0.0, 1.0, "#000000"));
        surface.add(Shape::circle(0.0, 0.0, 2.0, "#000000"));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn materialize_replaces_scene() {
        let surface = HeadlessSurface::new();
        let events = counting_listener(&surface);
        surface.add(Shape::rect(0.0, 0.0, 1.0, 1.0, "#000000"));

        let target = codec::serialize(&sketchsync_core::Template::Diagram.scene());
        surface.materialize(&target).await.unwrap();

        assert_eq!(codec::serialize(&surface.capture()), target);
        assert_eq!(surface.applied(), vec![target]);
        assert_eq!(events.lock().last(), Some(&MutationEvent::Modified));
    }

    #[tokio::test]
    async fn materialize_failures() {
        let surface = HeadlessSurface::new();
        surface.fail_next_applies(1);
        let target = codec::serialize(&Scene::new());
        assert!(surface.materialize(&target).await.is_err());
        assert!(surface.materialize(&target).await.is_ok());

        let corrupt = Snapshot::from_raw("{\"objects\": 5}");
        assert!(surface.materialize(&corrupt).await.is_err());
        assert_eq!(surface.apply_count(), 1);
    }
}
