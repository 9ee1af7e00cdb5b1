use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use project::{Project, ProjectId, VideoFormat};
use timeline::{
    DragMode, DragOutcome, DragUpdate, Frame, PlayheadPosition, Scene, SceneEdit, SceneId,
    SceneList, TimelineEditor, TimelineSettings, TrimEdge,
};

use crate::PersistHandle;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("a drag is already in progress")]
    DragActive,
    #[error("scene not found: {0}")]
    SceneNotFound(SceneId),
}

/// Change notifications, one per successful store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    PlayheadMoved(Frame),
    PlaybackChanged(bool),
    ScenesChanged { total_duration: Frame },
    DragStarted { scene_id: SceneId, mode: DragMode },
    DragUpdated(DragUpdate),
    DragEnded(DragOutcome),
    DragCanceled { scene_id: SceneId },
}

struct StoreState {
    project_id: ProjectId,
    title: String,
    format: VideoFormat,
    background_color: String,
    editor: TimelineEditor,
}

struct Shared {
    state: RwLock<StoreState>,
    subscribers: Mutex<Vec<Sender<StoreEvent>>>,
    persist: Mutex<Option<PersistHandle>>,
}

/// Shared handle to one project's video state. Clones see the same state.
#[derive(Clone)]
pub struct VideoStateStore {
    shared: Arc<Shared>,
}

impl VideoStateStore {
    pub fn new(project: Project) -> Self {
        let editor = TimelineEditor::new(project.scenes, project.settings);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(StoreState {
                    project_id: project.id,
                    title: project.title,
                    format: project.format,
                    background_color: project.background_color,
                    editor,
                }),
                subscribers: Mutex::new(Vec::new()),
                persist: Mutex::new(None),
            }),
        }
    }

    /// Routes every committed edit batch to the persistence worker.
    pub fn attach_persistence(&self, handle: PersistHandle) {
        *self.shared.persist.lock() = Some(handle);
        self.flush();
    }

    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    pub fn project_id(&self) -> ProjectId {
        self.shared.state.read().project_id
    }

    pub fn title(&self) -> String {
        self.shared.state.read().title.clone()
    }

    pub fn format(&self) -> VideoFormat {
        self.shared.state.read().format
    }

    pub fn background_color(&self) -> String {
        self.shared.state.read().background_color.clone()
    }

    /// Current project snapshot, scenes included.
    pub fn project(&self) -> Project {
        let state = self.shared.state.read();
        Project {
            id: state.project_id,
            title: state.title.clone(),
            background_color: state.background_color.clone(),
            format: state.format,
            settings: *state.editor.settings(),
            scenes: state.editor.scenes().clone(),
        }
    }

    pub fn scenes(&self) -> SceneList {
        self.shared.state.read().editor.scenes().clone()
    }

    pub fn settings(&self) -> TimelineSettings {
        *self.shared.state.read().editor.settings()
    }

    pub fn total_duration(&self) -> Frame {
        self.shared.state.read().editor.total_duration()
    }

    pub fn playhead(&self) -> Frame {
        self.shared.state.read().editor.playhead()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state.read().editor.is_playing()
    }

    pub fn is_dragging(&self) -> bool {
        self.shared.state.read().editor.is_dragging()
    }

    pub fn can_undo(&self) -> bool {
        self.shared.state.read().editor.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.shared.state.read().editor.can_redo()
    }

    pub fn resolve_playhead(&self) -> Option<PlayheadPosition> {
        self.shared.state.read().editor.resolve_playhead()
    }

    pub fn set_track_width(&self, width: f32) {
        self.shared.state.write().editor.set_track_width(width);
    }

    pub fn scrub(&self, fraction: f64) -> Option<Frame> {
        let frame = self.shared.state.write().editor.scrub(fraction)?;
        self.emit(StoreEvent::PlayheadMoved(frame));
        Some(frame)
    }

    pub fn set_playhead(&self, frame: Frame) -> Frame {
        let frame = self.shared.state.write().editor.set_playhead(frame);
        self.emit(StoreEvent::PlayheadMoved(frame));
        frame
    }

    pub fn toggle_playback(&self) -> bool {
        let playing = self.shared.state.write().editor.toggle_playback();
        self.emit(StoreEvent::PlaybackChanged(playing));
        playing
    }

    pub fn set_playing(&self, playing: bool) {
        self.shared.state.write().editor.set_playing(playing);
        self.emit(StoreEvent::PlaybackChanged(playing));
    }

    pub fn add_scene(&self, scene: Scene, index: Option<usize>) -> Option<SceneId> {
        self.edit(|e| e.add_scene(scene, index))
    }

    pub fn cut_scene(&self, scene_id: SceneId) -> Option<(SceneId, SceneId)> {
        self.edit(|e| e.cut_scene(scene_id))
    }

    pub fn delete_scene(&self, scene_id: SceneId) -> Option<Scene> {
        self.edit(|e| e.delete_scene(scene_id))
    }

    pub fn move_scene(&self, scene_id: SceneId, index: usize) -> Option<usize> {
        self.edit(|e| e.move_scene(scene_id, index))
    }

    pub fn trim_scene(&self, scene_id: SceneId, edge: TrimEdge, frame_delta: Frame) -> Option<Frame> {
        self.edit(|e| e.trim_scene(scene_id, edge, frame_delta))
    }

    pub fn undo(&self) -> bool {
        self.edit(|e| e.undo().then_some(())).is_some()
    }

    pub fn redo(&self) -> bool {
        self.edit(|e| e.redo().then_some(())).is_some()
    }

    /// Drains edits not yet handed to a persistence worker.
    pub fn take_pending_edits(&self) -> Vec<SceneEdit> {
        self.shared.state.write().editor.take_pending_edits()
    }

    /// Starts a drag gesture. The returned guard ends it when finished or dropped.
    pub fn begin_drag(
        &self,
        scene_id: SceneId,
        mode: DragMode,
        pointer_x: f32,
    ) -> Result<DragGuard, StoreError> {
        {
            let mut state = self.shared.state.write();
            if state.editor.is_dragging() {
                return Err(StoreError::DragActive);
            }
            if !state.editor.begin_drag(scene_id, mode, pointer_x) {
                return Err(StoreError::SceneNotFound(scene_id));
            }
        }
        self.emit(StoreEvent::DragStarted { scene_id, mode });
        Ok(DragGuard {
            store: self.clone(),
            scene_id,
            done: false,
        })
    }

    fn update_drag(&self, pointer_x: f32) -> Option<DragUpdate> {
        let update = self.shared.state.write().editor.update_drag(pointer_x)?;
        self.emit(StoreEvent::DragUpdated(update));
        Some(update)
    }

    fn end_drag(&self) -> Option<DragOutcome> {
        let (outcome, total) = {
            let mut state = self.shared.state.write();
            let outcome = state.editor.end_drag()?;
            (outcome, state.editor.total_duration())
        };
        self.emit(StoreEvent::DragEnded(outcome));
        if outcome.changed {
            self.emit(StoreEvent::ScenesChanged {
                total_duration: total,
            });
            self.flush();
        }
        Some(outcome)
    }

    fn cancel_drag(&self, scene_id: SceneId) -> bool {
        let canceled = self.shared.state.write().editor.cancel_drag();
        if canceled {
            self.emit(StoreEvent::DragCanceled { scene_id });
        }
        canceled
    }

    fn edit<R>(&self, op: impl FnOnce(&mut TimelineEditor) -> Option<R>) -> Option<R> {
        let (result, changed, total) = {
            let mut state = self.shared.state.write();
            let before = state.editor.change_count();
            let result = op(&mut state.editor);
            let changed = state.editor.change_count() != before;
            (result, changed, state.editor.total_duration())
        };
        if changed {
            self.emit(StoreEvent::ScenesChanged {
                total_duration: total,
            });
            self.flush();
        }
        result
    }

    fn flush(&self) {
        let persist = self.shared.persist.lock();
        let Some(handle) = persist.as_ref() else {
            return;
        };
        let (project_id, edits) = {
            let mut state = self.shared.state.write();
            (state.project_id, state.editor.take_pending_edits())
        };
        if let Some(batch) = handle.submit(project_id, edits) {
            debug!(%project_id, batch, "queued edit batch");
        }
    }

    fn emit(&self, event: StoreEvent) {
        // Receivers that went away are pruned on the next send.
        self.shared
            .subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Scope of one drag gesture. Dropping it without `finish` still ends the
/// drag, keeping whatever was applied.
pub struct DragGuard {
    store: VideoStateStore,
    scene_id: SceneId,
    done: bool,
}

impl DragGuard {
    pub fn scene_id(&self) -> SceneId {
        self.scene_id
    }

    pub fn update(&self, pointer_x: f32) -> Option<DragUpdate> {
        self.store.update_drag(pointer_x)
    }

    pub fn finish(mut self) -> Option<DragOutcome> {
        self.done = true;
        self.store.end_drag()
    }

    /// Restores the pre-drag state instead of keeping it.
    pub fn cancel(mut self) -> bool {
        self.done = true;
        self.store.cancel_drag(self.scene_id)
    }
}

impl Drop for DragGuard {
    fn drop(&mut self) {
        if !self.done {
            debug!(scene_id = %self.scene_id, "drag guard dropped, ending drag");
            self.store.end_drag();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PersistWorker, SyncEvent};
    use project::ProjectDb;
    use std::time::Duration;
    use timeline::ScenePayload;

    fn project(durations: &[Frame]) -> Project {
        let mut project = Project::new("Demo", VideoFormat::Landscape);
        for (i, d) in durations.iter().enumerate() {
            project.scenes.push(Scene::new(
                format!("Scene {i}"),
                *d,
                ScenePayload::new(format!("<Scene{i} />")),
            ));
        }
        project
    }

    fn drain(rx: &Receiver<StoreEvent>) -> Vec<StoreEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn clones_share_state_and_notify() {
        let store = VideoStateStore::new(project(&[150, 90, 120]));
        let other = store.clone();
        let rx = store.subscribe();

        assert_eq!(other.scrub(0.5), Some(180));
        assert_eq!(store.playhead(), 180);
        let id = store.scenes().ids()[1];
        store.cut_scene(id).unwrap();
        assert_eq!(other.scenes().len(), 4);

        let events = drain(&rx);
        assert_eq!(
            events,
            vec![
                StoreEvent::PlayheadMoved(180),
                StoreEvent::ScenesChanged {
                    total_duration: 360
                },
            ]
        );
    }

    #[test]
    fn failed_edits_do_not_notify() {
        let store = VideoStateStore::new(project(&[150]));
        let rx = store.subscribe();
        assert!(store.delete_scene(SceneId::new()).is_none());
        assert!(!store.undo());
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn unchanged_trims_do_not_notify() {
        let store = VideoStateStore::new(project(&[150, 30]));
        let rx = store.subscribe();
        let ids = store.scenes().ids();
        assert_eq!(store.trim_scene(ids[0], TrimEdge::End, 0), Some(150));
        assert_eq!(store.trim_scene(ids[1], TrimEdge::End, -10), Some(30));
        assert_eq!(store.move_scene(ids[0], 0), Some(0));
        assert!(drain(&rx).is_empty());
        assert!(!store.can_undo());
        assert!(store.take_pending_edits().is_empty());
    }

    #[test]
    fn drag_guard_scopes_the_gesture() {
        let store = VideoStateStore::new(project(&[120, 240]));
        store.set_track_width(720.0);
        let id = store.scenes().ids()[0];

        let guard = store.begin_drag(id, DragMode::TrimEnd, 100.0).unwrap();
        assert_eq!(
            store.begin_drag(id, DragMode::Move, 0.0).err(),
            Some(StoreError::DragActive)
        );
        assert_eq!(store.scrub(0.0), None);
        let update = guard.update(220.0).unwrap();
        assert_eq!(update.duration, 180);
        let outcome = guard.finish().unwrap();
        assert!(outcome.changed);
        assert!(!store.is_dragging());
        assert_eq!(store.total_duration(), 420);
    }

    #[test]
    fn dropped_guard_ends_the_drag() {
        let store = VideoStateStore::new(project(&[120, 240]));
        store.set_track_width(720.0);
        let id = store.scenes().ids()[0];
        {
            let guard = store.begin_drag(id, DragMode::TrimEnd, 0.0).unwrap();
            guard.update(60.0);
        }
        assert!(!store.is_dragging());
        assert_eq!(store.scenes().get(id).unwrap().duration, 150);
        assert!(store.can_undo());
    }

    #[test]
    fn canceled_guard_restores() {
        let store = VideoStateStore::new(project(&[120, 240]));
        let id = store.scenes().ids()[0];
        let rx = store.subscribe();
        let guard = store.begin_drag(id, DragMode::TrimEnd, 0.0).unwrap();
        guard.update(500.0);
        assert!(guard.cancel());
        assert_eq!(store.scenes().get(id).unwrap().duration, 120);
        assert!(drain(&rx).contains(&StoreEvent::DragCanceled { scene_id: id }));
    }

    #[test]
    fn unknown_scene_cannot_be_dragged() {
        let store = VideoStateStore::new(project(&[120]));
        let missing = SceneId::new();
        assert_eq!(
            store.begin_drag(missing, DragMode::Move, 0.0).err(),
            Some(StoreError::SceneNotFound(missing))
        );
    }

    #[test]
    fn committed_edits_flow_to_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.db");
        let db = ProjectDb::open_or_create(&path).unwrap();
        let mut created = db
            .create_project("Persisted", VideoFormat::Square, None)
            .unwrap();
        for scene in project(&[150, 90, 120]).scenes.iter() {
            db.insert_scene(created.id, scene).unwrap();
        }
        created = db.load(created.id).unwrap().unwrap();

        let store = VideoStateStore::new(created.clone());
        let handle = PersistWorker::start(path.clone());
        store.attach_persistence(handle.clone());

        let ids = store.scenes().ids();
        store.delete_scene(ids[0]).unwrap();
        let event = handle
            .rx_events
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(matches!(event, SyncEvent::Saved { .. }));
        assert!(store.take_pending_edits().is_empty());

        let reloaded = db.load(created.id).unwrap().unwrap();
        assert_eq!(reloaded.scenes.ids(), vec![ids[1], ids[2]]);
        assert_eq!(reloaded.target_duration(), 210);
        handle.shutdown();
    }
}
