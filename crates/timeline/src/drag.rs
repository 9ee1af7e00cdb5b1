/// Pointer-gesture bookkeeping for scene drags on the timeline track.
use serde::{Deserialize, Serialize};

use crate::{Frame, FrameRange, SceneId, SceneList};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DragMode {
    Move,
    TrimStart,
    TrimEnd,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrimEdge {
    Start,
    End,
}

impl DragMode {
    pub fn trim_edge(self) -> Option<TrimEdge> {
        match self {
            DragMode::Move => None,
            DragMode::TrimStart => Some(TrimEdge::Start),
            DragMode::TrimEnd => Some(TrimEdge::End),
        }
    }
}

/// Timing of a scene at the moment a gesture began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSnapshot {
    pub scene_id: SceneId,
    pub duration: Frame,
    pub trim_in: Frame,
}

/// State captured by `begin_drag`. Every update is computed from this
/// reference, never from the previous update.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub scene_id: SceneId,
    pub mode: DragMode,
    pub origin_x: f32,
    pub initial: TimingSnapshot,
    pub initial_start: Frame,
    pub initial_index: usize,
    pub predecessor: Option<TimingSnapshot>,
    pub total_at_begin: Frame,
    pub track_width: f32,
    pub drop_index: Option<usize>,
}

impl DragSession {
    pub fn capture(
        scenes: &SceneList,
        scene_id: SceneId,
        mode: DragMode,
        origin_x: f32,
        track_width: f32,
    ) -> Option<Self> {
        let index = scenes.index_of(scene_id)?;
        let scene = scenes.at(index)?;
        let predecessor = index
            .checked_sub(1)
            .and_then(|i| scenes.at(i))
            .map(|prev| TimingSnapshot {
                scene_id: prev.id,
                duration: prev.duration,
                trim_in: prev.trim_in,
            });

        Some(Self {
            scene_id,
            mode,
            origin_x,
            initial: TimingSnapshot {
                scene_id,
                duration: scene.duration,
                trim_in: scene.trim_in,
            },
            initial_start: scenes.start_of(scene_id)?,
            initial_index: index,
            predecessor,
            total_at_begin: scenes.total_duration(),
            track_width,
            drop_index: None,
        })
    }

    pub fn frame_delta(&self, pointer_x: f32) -> Frame {
        pixels_to_frames(pointer_x - self.origin_x, self.total_at_begin, self.track_width)
    }

    /// Timings the gesture may have touched, as they were at the start.
    pub fn touched(&self) -> Vec<TimingSnapshot> {
        let mut out = Vec::with_capacity(2);
        if let Some(prev) = self.predecessor {
            out.push(prev);
        }
        out.push(self.initial);
        out
    }
}

/// Converts a pointer delta to frames using `total / width` frames per pixel.
/// The result never exceeds `total` in either direction.
pub fn pixels_to_frames(delta_px: f32, total: Frame, track_width: f32) -> Frame {
    if !(track_width > 0.0) || !delta_px.is_finite() || total <= 0 {
        return 0;
    }
    let frames = delta_px as f64 * total as f64 / track_width as f64;
    let limit = total as f64;
    frames.round().clamp(-limit, limit) as Frame
}

/// Drop position for a scene being moved: where its midpoint would land
/// among the other scenes, as an index into the list without it.
pub fn drop_index(scenes: &SceneList, scene_id: SceneId, start: Frame) -> Option<usize> {
    let dragged = scenes.get(scene_id)?;
    let midpoint = start + dragged.duration / 2;

    let mut others_start = 0;
    let mut index = 0;
    for scene in scenes.iter().filter(|s| s.id != scene_id) {
        let span = FrameRange::new(others_start, scene.duration);
        if midpoint <= span.start + span.duration / 2 {
            break;
        }
        index += 1;
        others_start = span.end();
    }
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Scene, ScenePayload};

    fn list(durations: &[Frame]) -> SceneList {
        durations
            .iter()
            .map(|d| Scene::new("s", *d, ScenePayload::new("code")))
            .collect()
    }

    #[test]
    fn pixel_conversion_uses_track_ratio() {
        assert_eq!(pixels_to_frames(120.0, 360, 720.0), 60);
        assert_eq!(pixels_to_frames(-400.0, 360, 720.0), -200);
        assert_eq!(pixels_to_frames(1.0, 360, 720.0), 1);
        assert_eq!(pixels_to_frames(50.0, 360, 0.0), 0);
        assert_eq!(pixels_to_frames(f32::NAN, 360, 720.0), 0);
    }

    #[test]
    fn pixel_conversion_never_exceeds_the_track() {
        assert_eq!(pixels_to_frames(1.0e30, 360, 720.0), 360);
        assert_eq!(pixels_to_frames(-1.0e30, 360, 720.0), -360);
        assert_eq!(pixels_to_frames(f32::INFINITY, 360, 720.0), 0);
        assert_eq!(pixels_to_frames(5000.0, 360, 1.0e-30), 360);
    }

    #[test]
    fn capture_records_reference_frame() {
        let scenes = list(&[150, 90, 120]);
        let id = scenes.ids()[1];
        let session = DragSession::capture(&scenes, id, DragMode::TrimStart, 300.0, 720.0).unwrap();
        assert_eq!(session.initial_start, 150);
        assert_eq!(session.initial.duration, 90);
        assert_eq!(session.initial_index, 1);
        assert_eq!(session.total_at_begin, 360);
        assert_eq!(session.predecessor.map(|p| p.duration), Some(150));
        assert_eq!(session.frame_delta(310.0), 5);
    }

    #[test]
    fn capture_unknown_scene_is_none() {
        let scenes = list(&[30]);
        assert!(DragSession::capture(&scenes, SceneId::new(), DragMode::Move, 0.0, 100.0).is_none());
    }

    #[test]
    fn drop_index_follows_midpoint() {
        let scenes = list(&[100, 100, 100]);
        let first = scenes.ids()[0];
        assert_eq!(drop_index(&scenes, first, 0), Some(0));
        // midpoint 50 + 60 = 110, past the first other scene's midpoint (50)
        assert_eq!(drop_index(&scenes, first, 60), Some(1));
        assert_eq!(drop_index(&scenes, first, 400), Some(2));
        assert_eq!(drop_index(&scenes, first, -500), Some(0));
    }
}
