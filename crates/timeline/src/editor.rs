use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    clamp_playhead, cut_command, diff_scenes, drop_index, resolve_playhead, scrub_frame,
    CommandHistory, DragMode, DragSession, Frame, PlayheadPosition, Scene, SceneEdit, SceneId,
    SceneList, TimelineCommand, TimelineSettings, TimingSnapshot, TrimEdge, TrimStartPolicy,
    MAX_TRACK_DURATION,
};

pub const DEFAULT_TRACK_WIDTH: f32 = 1000.0;

/// Effect of one pointer move during a drag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DragUpdate {
    pub scene_id: SceneId,
    pub mode: DragMode,
    pub frame_delta: Frame,
    pub start: Frame,
    pub duration: Frame,
    /// Prospective position for move drags, as an index into the final list.
    pub drop_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DragOutcome {
    pub scene_id: SceneId,
    pub mode: DragMode,
    pub changed: bool,
    pub moved_to: Option<usize>,
}

/// The editing model of one project's timeline. Every change to the scene
/// list goes through here so derived offsets, order indices, the playhead
/// bounds, undo history and the edit outbox stay consistent.
#[derive(Debug, Clone)]
pub struct TimelineEditor {
    scenes: SceneList,
    settings: TimelineSettings,
    playhead: Frame,
    playing: bool,
    track_width: f32,
    drag: Option<DragSession>,
    drag_baseline: Option<SceneList>,
    history: CommandHistory,
    pending: Vec<SceneEdit>,
    changes: u64,
}

impl TimelineEditor {
    pub fn new(scenes: SceneList, settings: TimelineSettings) -> Self {
        Self {
            scenes,
            settings,
            playhead: 0,
            playing: false,
            track_width: DEFAULT_TRACK_WIDTH,
            drag: None,
            drag_baseline: None,
            history: CommandHistory::default(),
            pending: Vec::new(),
            changes: 0,
        }
    }

    pub fn scenes(&self) -> &SceneList {
        &self.scenes
    }

    pub fn settings(&self) -> &TimelineSettings {
        &self.settings
    }

    pub fn total_duration(&self) -> Frame {
        self.scenes.total_duration()
    }

    pub fn playhead(&self) -> Frame {
        self.playhead
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn track_width(&self) -> f32 {
        self.track_width
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn drag(&self) -> Option<&DragSession> {
        self.drag.as_ref()
    }

    /// Number of committed changes to the scene list so far.
    pub fn change_count(&self) -> u64 {
        self.changes
    }

    pub fn can_undo(&self) -> bool {
        self.drag.is_none() && self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.drag.is_none() && self.history.can_redo()
    }

    pub fn set_track_width(&mut self, width: f32) {
        self.track_width = width;
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn toggle_playback(&mut self) -> bool {
        self.playing = !self.playing;
        self.playing
    }

    pub fn set_playhead(&mut self, frame: Frame) -> Frame {
        self.playhead = clamp_playhead(frame, self.total_duration());
        self.playhead
    }

    /// Click-to-seek at `fraction` of the track width. Ignored while a drag
    /// is active.
    pub fn scrub(&mut self, fraction: f64) -> Option<Frame> {
        if self.drag.is_some() {
            debug!(fraction, "scrub ignored during drag");
            return None;
        }
        self.playhead = scrub_frame(fraction, self.total_duration());
        Some(self.playhead)
    }

    pub fn resolve_playhead(&self) -> Option<PlayheadPosition> {
        resolve_playhead(&self.scenes, self.playhead)
    }

    pub fn begin_drag(&mut self, scene_id: SceneId, mode: DragMode, pointer_x: f32) -> bool {
        if self.drag.is_some() {
            debug!(%scene_id, "drag already active");
            return false;
        }
        let Some(session) =
            DragSession::capture(&self.scenes, scene_id, mode, pointer_x, self.track_width)
        else {
            debug!(%scene_id, "begin_drag on unknown scene");
            return false;
        };
        self.drag_baseline = Some(self.scenes.clone());
        self.drag = Some(session);
        true
    }

    /// Applies the pointer position live, relative to where the drag began.
    pub fn update_drag(&mut self, pointer_x: f32) -> Option<DragUpdate> {
        let mut session = self.drag.take()?;
        let frame_delta = session.frame_delta(pointer_x);

        match session.mode.trim_edge() {
            Some(edge) => {
                let timings = trim_timings(&session, edge, frame_delta, &self.settings);
                self.write_timings(&timings);
                self.playhead = clamp_playhead(self.playhead, self.total_duration());
            }
            None => {
                let start = session.initial_start + frame_delta;
                session.drop_index = drop_index(&self.scenes, session.scene_id, start);
            }
        }

        let update = self.describe(&session, frame_delta);
        self.drag = Some(session);
        update
    }

    /// Finishes the gesture. Trims already applied stay; a move commits the
    /// reorder here.
    pub fn end_drag(&mut self) -> Option<DragOutcome> {
        let session = self.drag.take()?;
        let baseline = self.drag_baseline.take().unwrap_or_else(|| self.scenes.clone());

        let mut outcome = DragOutcome {
            scene_id: session.scene_id,
            mode: session.mode,
            changed: false,
            moved_to: None,
        };

        match session.mode {
            DragMode::Move => {
                if let Some(index) = session.drop_index {
                    if index != session.initial_index {
                        outcome.changed = self.run(TimelineCommand::MoveScene {
                            scene_id: session.scene_id,
                            index,
                        });
                        if outcome.changed {
                            outcome.moved_to = Some(index);
                        }
                    }
                }
            }
            DragMode::TrimStart | DragMode::TrimEnd => {
                let original = session.touched();
                let changed = original.iter().any(|t| {
                    self.scenes
                        .get(t.scene_id)
                        .map(|s| s.duration != t.duration || s.trim_in != t.trim_in)
                        .unwrap_or(false)
                });
                if changed {
                    self.history.record(restore_command(&original));
                    self.commit(&baseline);
                    outcome.changed = true;
                }
            }
        }
        Some(outcome)
    }

    /// Abandons the gesture and puts every touched scene back.
    pub fn cancel_drag(&mut self) -> bool {
        let Some(session) = self.drag.take() else {
            return false;
        };
        self.drag_baseline = None;
        self.write_timings(&session.touched());
        self.playhead = clamp_playhead(self.playhead, self.total_duration());
        true
    }

    /// Trim by a frame delta without a pointer gesture. Returns the new duration.
    pub fn trim_scene(&mut self, scene_id: SceneId, edge: TrimEdge, frame_delta: Frame) -> Option<Frame> {
        if self.drag.is_some() {
            debug!(%scene_id, "trim ignored during drag");
            return None;
        }
        let mode = match edge {
            TrimEdge::Start => DragMode::TrimStart,
            TrimEdge::End => DragMode::TrimEnd,
        };
        let Some(session) = DragSession::capture(&self.scenes, scene_id, mode, 0.0, self.track_width)
        else {
            debug!(%scene_id, "trim on unknown scene");
            return None;
        };
        let timings = trim_timings(&session, edge, frame_delta, &self.settings);
        if timings.iter().all(|t| session.touched().contains(t)) {
            debug!(%scene_id, frame_delta, "trim left timings unchanged");
            return Some(session.initial.duration);
        }
        let command = TimelineCommand::Batch {
            commands: timings.iter().map(set_timing).collect(),
        };
        self.run(command);
        self.scenes.get(scene_id).map(|s| s.duration)
    }

    pub fn cut_scene(&mut self, scene_id: SceneId) -> Option<(SceneId, SceneId)> {
        if self.refuse_during_drag("cut") {
            return None;
        }
        let Some(command) = cut_command(&self.scenes, scene_id) else {
            debug!(%scene_id, "cut on unknown or unsplittable scene");
            return None;
        };
        let index = self.scenes.index_of(scene_id)?;
        if !self.run(command) {
            return None;
        }
        let first = self.scenes.at(index)?.id;
        let second = self.scenes.at(index + 1)?.id;
        Some((first, second))
    }

    pub fn delete_scene(&mut self, scene_id: SceneId) -> Option<Scene> {
        if self.refuse_during_drag("delete") {
            return None;
        }
        let removed = self.scenes.get(scene_id).cloned();
        if removed.is_none() {
            debug!(%scene_id, "delete on unknown scene");
            return None;
        }
        if self.run(TimelineCommand::RemoveScene { scene_id }) {
            removed
        } else {
            None
        }
    }

    /// Moves a scene to `index` in the final list. Returns the index it left.
    pub fn move_scene(&mut self, scene_id: SceneId, index: usize) -> Option<usize> {
        if self.refuse_during_drag("move") {
            return None;
        }
        let from = self.scenes.index_of(scene_id)?;
        if from == index.min(self.scenes.len().saturating_sub(1)) {
            return Some(from);
        }
        self.run(TimelineCommand::MoveScene { scene_id, index })
            .then_some(from)
    }

    /// Adds a scene at `index`, or at the end when `None`.
    pub fn add_scene(&mut self, scene: Scene, index: Option<usize>) -> Option<SceneId> {
        if self.refuse_during_drag("add") {
            return None;
        }
        let scene_id = scene.id;
        let index = index.unwrap_or(self.scenes.len());
        self.run(TimelineCommand::InsertScene { index, scene })
            .then_some(scene_id)
    }

    pub fn undo(&mut self) -> bool {
        if self.refuse_during_drag("undo") {
            return false;
        }
        let before = self.scenes.clone();
        match self.history.undo(&mut self.scenes) {
            Ok(()) => {
                self.commit(&before);
                true
            }
            Err(err) => {
                debug!(%err, "undo unavailable");
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.refuse_during_drag("redo") {
            return false;
        }
        let before = self.scenes.clone();
        match self.history.redo(&mut self.scenes) {
            Ok(()) => {
                self.commit(&before);
                true
            }
            Err(err) => {
                debug!(%err, "redo unavailable");
                false
            }
        }
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drains the edit outbox.
    pub fn take_pending_edits(&mut self) -> Vec<SceneEdit> {
        std::mem::take(&mut self.pending)
    }

    fn refuse_during_drag(&self, op: &'static str) -> bool {
        if self.drag.is_some() {
            debug!(op, "edit ignored during drag");
            true
        } else {
            false
        }
    }

    fn run(&mut self, command: TimelineCommand) -> bool {
        let before = self.scenes.clone();
        match self.history.apply(&mut self.scenes, command) {
            Ok(()) => {
                self.commit(&before);
                true
            }
            Err(err) => {
                debug!(%err, "timeline command ignored");
                false
            }
        }
    }

    /// Records the difference to `before` in the outbox and bumps revisions
    /// of scenes whose persisted fields changed.
    fn commit(&mut self, before: &SceneList) {
        let mut edits = diff_scenes(before.as_slice(), self.scenes.as_slice());
        for edit in edits.iter_mut() {
            if let SceneEdit::Upsert { scene } = edit {
                if let Some(old) = before.get(scene.id) {
                    let revision = old.revision.max(scene.revision) + 1;
                    if let Some(live) = self.scenes.get_mut(scene.id) {
                        live.revision = revision;
                    }
                    scene.revision = revision;
                }
            }
        }
        self.playhead = clamp_playhead(self.playhead, self.total_duration());
        self.pending.extend(edits);
        self.changes += 1;
    }

    fn write_timings(&mut self, timings: &[TimingSnapshot]) {
        for timing in timings {
            self.scenes.set_duration(timing.scene_id, timing.duration);
            self.scenes.set_trim_in(timing.scene_id, timing.trim_in);
        }
    }

    fn describe(&self, session: &DragSession, frame_delta: Frame) -> Option<DragUpdate> {
        let span = self.scenes.span_of(session.scene_id)?;
        let start = match session.mode {
            DragMode::Move => session.initial_start + frame_delta,
            _ => span.start,
        };
        Some(DragUpdate {
            scene_id: session.scene_id,
            mode: session.mode,
            frame_delta,
            start,
            duration: span.duration,
            drop_index: session.drop_index,
        })
    }
}

/// New timings for a trim of `frame_delta` frames, always relative to the
/// timings captured in `session`.
fn trim_timings(
    session: &DragSession,
    edge: TrimEdge,
    frame_delta: Frame,
    settings: &TimelineSettings,
) -> Vec<TimingSnapshot> {
    let min = settings.min_scene_duration.max(1);
    let target = session.initial;
    // Longest the scene may grow to while the track stays within bounds.
    let room = MAX_TRACK_DURATION
        .saturating_sub(session.total_at_begin.saturating_sub(target.duration))
        .max(min);

    match edge {
        TrimEdge::End => vec![TimingSnapshot {
            duration: target.duration.saturating_add(frame_delta).clamp(min, room),
            ..target
        }],
        TrimEdge::Start => {
            let desired = target.duration.saturating_sub(frame_delta).clamp(min, room);
            // Positive when the scene shrinks from the front.
            let mut change = target.duration - desired;

            let absorber = match settings.trim_start_policy {
                TrimStartPolicy::HoldEnd => session.predecessor,
                TrimStartPolicy::Ripple => None,
            };
            let mut out = Vec::with_capacity(2);
            if let Some(prev) = absorber {
                if change < 0 {
                    change = change.max(min.saturating_sub(prev.duration).min(0));
                }
                out.push(TimingSnapshot {
                    duration: prev.duration.saturating_add(change),
                    ..prev
                });
            }
            out.push(TimingSnapshot {
                duration: target.duration.saturating_sub(change),
                trim_in: target.trim_in.saturating_add(change).max(0),
                ..target
            });
            out
        }
    }
}

fn set_timing(timing: &TimingSnapshot) -> TimelineCommand {
    TimelineCommand::SetTiming {
        scene_id: timing.scene_id,
        duration: timing.duration,
        trim_in: timing.trim_in,
    }
}

fn restore_command(original: &[TimingSnapshot]) -> TimelineCommand {
    TimelineCommand::Batch {
        commands: original.iter().map(set_timing).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScenePayload;

    fn editor(durations: &[Frame]) -> TimelineEditor {
        let scenes = durations
            .iter()
            .enumerate()
            .map(|(i, d)| Scene::new(format!("Scene {}", i + 1), *d, ScenePayload::new("code")))
            .collect();
        let mut editor = TimelineEditor::new(scenes, TimelineSettings::default());
        editor.set_track_width(720.0);
        editor
    }

    fn durations(editor: &TimelineEditor) -> Vec<Frame> {
        editor.scenes().iter().map(|s| s.duration).collect()
    }

    #[test]
    fn scrub_sets_playhead_without_touching_scenes() {
        let mut ed = editor(&[150, 90, 120]);
        assert_eq!(ed.scrub(0.5), Some(180));
        assert_eq!(ed.playhead(), 180);
        assert!(!ed.has_pending_edits());
        assert_eq!(ed.resolve_playhead().map(|p| p.index), Some(1));
    }

    #[test]
    fn scrub_is_ignored_while_dragging() {
        let mut ed = editor(&[150, 90, 120]);
        let id = ed.scenes().ids()[0];
        ed.set_playhead(10);
        assert!(ed.begin_drag(id, DragMode::TrimEnd, 100.0));
        assert_eq!(ed.scrub(0.9), None);
        assert_eq!(ed.playhead(), 10);
        ed.end_drag();
        assert_eq!(ed.scrub(0.9), Some(324));
    }

    #[test]
    fn trim_end_applies_live_relative_to_origin() {
        let mut ed = editor(&[120, 240]);
        let id = ed.scenes().ids()[0];
        assert!(ed.begin_drag(id, DragMode::TrimEnd, 200.0));
        // 2 px per frame on a 720 px track for 360 frames
        let update = ed.update_drag(320.0).unwrap();
        assert_eq!(update.duration, 180);
        assert_eq!(durations(&ed), vec![180, 240]);
        // a later move is measured from the origin, not the previous update
        ed.update_drag(240.0);
        assert_eq!(durations(&ed), vec![140, 240]);
        ed.update_drag(200.0 - 400.0);
        assert_eq!(durations(&ed), vec![30, 240]);
        let outcome = ed.end_drag().unwrap();
        assert!(outcome.changed);
        assert_eq!(durations(&ed), vec![30, 240]);
        assert!(!ed.is_dragging());
    }

    #[test]
    fn trim_start_holds_end_by_rolling_into_predecessor() {
        let mut ed = editor(&[150, 90, 120]);
        let ids = ed.scenes().ids();
        let end_before = ed.scenes().span_of(ids[1]).unwrap().end();

        ed.trim_scene(ids[1], TrimEdge::Start, 20);
        assert_eq!(durations(&ed), vec![170, 70, 120]);
        assert_eq!(ed.scenes().span_of(ids[1]).unwrap().end(), end_before);
        assert_eq!(ed.scenes().get(ids[1]).unwrap().trim_in, 20);
        assert_eq!(ed.total_duration(), 360);
    }

    #[test]
    fn trim_start_growth_is_bounded_by_predecessor_minimum() {
        let mut ed = editor(&[40, 90]);
        let ids = ed.scenes().ids();
        ed.trim_scene(ids[1], TrimEdge::Start, -100);
        assert_eq!(durations(&ed), vec![30, 100]);
        assert_eq!(ed.scenes().get(ids[1]).unwrap().trim_in, 0);
    }

    #[test]
    fn first_scene_trim_start_ripples() {
        let mut ed = editor(&[150, 90]);
        let ids = ed.scenes().ids();
        ed.trim_scene(ids[0], TrimEdge::Start, 50);
        assert_eq!(durations(&ed), vec![100, 90]);
        assert_eq!(ed.scenes().start_of(ids[1]), Some(100));
        assert_eq!(ed.scenes().get(ids[0]).unwrap().trim_in, 50);
    }

    #[test]
    fn ripple_policy_keeps_predecessor() {
        let scenes: SceneList = [150, 90]
            .iter()
            .map(|d| Scene::new("s", *d, ScenePayload::new("code")))
            .collect();
        let settings = TimelineSettings {
            trim_start_policy: TrimStartPolicy::Ripple,
            ..TimelineSettings::default()
        };
        let mut ed = TimelineEditor::new(scenes, settings);
        let ids = ed.scenes().ids();
        ed.trim_scene(ids[1], TrimEdge::Start, 80);
        assert_eq!(durations(&ed), vec![150, 30]);
    }

    #[test]
    fn trim_start_floor_is_exact() {
        let mut ed = editor(&[150, 90]);
        let ids = ed.scenes().ids();
        assert_eq!(ed.trim_scene(ids[1], TrimEdge::Start, 500), Some(30));
        assert_eq!(durations(&ed), vec![210, 30]);
    }

    #[test]
    fn extreme_trim_deltas_stay_in_bounds() {
        let mut ed = editor(&[150, 90, 120]);
        let ids = ed.scenes().ids();

        let grown = ed.trim_scene(ids[2], TrimEdge::End, Frame::MAX).unwrap();
        assert_eq!(ed.total_duration(), MAX_TRACK_DURATION);
        assert_eq!(grown, MAX_TRACK_DURATION - 240);
        assert_eq!(ed.trim_scene(ids[2], TrimEdge::End, Frame::MIN), Some(30));

        assert_eq!(ed.trim_scene(ids[1], TrimEdge::Start, Frame::MAX), Some(30));
        assert_eq!(durations(&ed), vec![210, 30, 30]);
        ed.trim_scene(ids[1], TrimEdge::Start, Frame::MIN);
        assert_eq!(durations(&ed), vec![30, 210, 30]);
        assert_eq!(ed.scenes().get(ids[1]).unwrap().trim_in, 0);

        ed.trim_scene(ids[0], TrimEdge::Start, Frame::MIN);
        assert!(ed.total_duration() <= MAX_TRACK_DURATION);
        assert!(ed.scenes().iter().all(|s| s.duration >= 30));
    }

    #[test]
    fn runaway_pointer_is_clamped_to_the_track() {
        let mut ed = editor(&[150, 90, 120]);
        let ids = ed.scenes().ids();
        assert!(ed.begin_drag(ids[1], DragMode::TrimStart, 0.0));
        ed.update_drag(-1.0e30);
        // growth from the front is bounded by the predecessor floor
        assert_eq!(durations(&ed), vec![30, 210, 120]);
        ed.update_drag(1.0e30);
        assert_eq!(durations(&ed), vec![210, 30, 120]);
        ed.update_drag(f32::NAN);
        assert_eq!(durations(&ed), vec![150, 90, 120]);
        assert!(ed.end_drag().is_some());
        assert_eq!(ed.total_duration(), 360);

        assert!(ed.begin_drag(ids[2], DragMode::TrimEnd, 0.0));
        ed.update_drag(1.0e30);
        assert_eq!(durations(&ed), vec![150, 90, 480]);
        ed.end_drag();

        assert!(ed.begin_drag(ids[0], DragMode::Move, 0.0));
        let update = ed.update_drag(-1.0e30).unwrap();
        assert_eq!(update.drop_index, Some(0));
        ed.end_drag();
        assert_eq!(ed.scenes().ids(), ids);
    }

    #[test]
    fn no_op_trims_leave_history_alone() {
        let mut ed = editor(&[150, 30]);
        let ids = ed.scenes().ids();
        let before = ed.change_count();

        assert_eq!(ed.trim_scene(ids[0], TrimEdge::End, 0), Some(150));
        assert_eq!(ed.trim_scene(ids[1], TrimEdge::End, -50), Some(30));
        assert_eq!(ed.trim_scene(ids[1], TrimEdge::Start, 10), Some(30));

        assert_eq!(ed.change_count(), before);
        assert!(!ed.can_undo());
        assert!(!ed.has_pending_edits());
        assert!(ed.scenes().iter().all(|s| s.revision == 0));

        ed.trim_scene(ids[0], TrimEdge::End, 5);
        assert_eq!(ed.change_count(), before + 1);
        assert!(ed.can_undo());
    }

    #[test]
    fn cancel_drag_restores_timings() {
        let mut ed = editor(&[150, 90, 120]);
        let ids = ed.scenes().ids();
        ed.begin_drag(ids[1], DragMode::TrimStart, 0.0);
        ed.update_drag(40.0);
        assert_ne!(durations(&ed), vec![150, 90, 120]);
        assert!(ed.cancel_drag());
        assert_eq!(durations(&ed), vec![150, 90, 120]);
        assert!(!ed.has_pending_edits());
    }

    #[test]
    fn move_drag_commits_on_release() {
        let mut ed = editor(&[100, 100, 100]);
        ed.set_track_width(300.0);
        let ids = ed.scenes().ids();
        assert!(ed.begin_drag(ids[0], DragMode::Move, 0.0));
        let update = ed.update_drag(60.0).unwrap();
        assert_eq!(update.drop_index, Some(1));
        // nothing moves until release
        assert_eq!(ed.scenes().ids(), ids);
        let outcome = ed.end_drag().unwrap();
        assert_eq!(outcome.moved_to, Some(1));
        assert_eq!(ed.scenes().ids(), vec![ids[1], ids[0], ids[2]]);
        let edits = ed.take_pending_edits();
        assert_eq!(
            edits,
            vec![SceneEdit::Reorder {
                order: vec![ids[1], ids[0], ids[2]]
            }]
        );
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let mut ed = editor(&[150, 90]);
        let missing = SceneId::new();
        assert!(!ed.begin_drag(missing, DragMode::TrimEnd, 0.0));
        assert!(ed.update_drag(10.0).is_none());
        assert!(ed.end_drag().is_none());
        assert!(ed.cut_scene(missing).is_none());
        assert!(ed.delete_scene(missing).is_none());
        assert!(ed.trim_scene(missing, TrimEdge::End, 10).is_none());
        assert_eq!(durations(&ed), vec![150, 90]);
        assert!(!ed.has_pending_edits());
    }

    #[test]
    fn delete_clamps_playhead() {
        let mut ed = editor(&[150, 90, 120]);
        let ids = ed.scenes().ids();
        ed.set_playhead(360);
        ed.delete_scene(ids[2]);
        assert_eq!(ed.playhead(), 240);
    }

    #[test]
    fn undo_restores_cut_and_emits_edits() {
        let mut ed = editor(&[150, 90, 120]);
        let ids = ed.scenes().ids();
        let (a, b) = ed.cut_scene(ids[1]).unwrap();
        let edits = ed.take_pending_edits();
        assert!(edits.contains(&SceneEdit::Delete { scene_id: ids[1] }));
        assert!(edits.iter().any(|e| e.scene_id() == Some(a)));
        assert!(edits.iter().any(|e| e.scene_id() == Some(b)));

        assert!(ed.undo());
        assert_eq!(ed.scenes().ids(), ids);
        let edits = ed.take_pending_edits();
        assert!(edits.contains(&SceneEdit::Delete { scene_id: a }));
        assert!(edits.contains(&SceneEdit::Delete { scene_id: b }));

        assert!(ed.redo());
        assert_eq!(ed.scenes().len(), 4);
    }

    #[test]
    fn revisions_increase_on_every_timing_change() {
        let mut ed = editor(&[150, 90]);
        let id = ed.scenes().ids()[1];
        ed.trim_scene(id, TrimEdge::End, 10);
        assert_eq!(ed.scenes().get(id).unwrap().revision, 1);
        ed.undo();
        assert_eq!(ed.scenes().get(id).unwrap().revision, 2);
        assert_eq!(ed.scenes().get(id).unwrap().duration, 90);
    }

    #[test]
    fn structural_edits_wait_for_drag_end() {
        let mut ed = editor(&[150, 90]);
        let ids = ed.scenes().ids();
        ed.begin_drag(ids[0], DragMode::TrimEnd, 0.0);
        assert!(ed.delete_scene(ids[1]).is_none());
        assert!(ed.cut_scene(ids[1]).is_none());
        assert!(!ed.undo());
        ed.end_drag();
        assert!(ed.delete_scene(ids[1]).is_some());
    }
}
