use serde::{Deserialize, Serialize};

use crate::{Frame, SceneId, SceneList};

/// Where the playhead sits relative to the scene that owns it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayheadPosition {
    pub scene_id: SceneId,
    pub index: usize,
    pub scene_start: Frame,
    pub offset: Frame,
}

/// Frame for a click at `fraction` of the track width, clamped to `[0, total]`.
pub fn scrub_frame(fraction: f64, total: Frame) -> Frame {
    if !fraction.is_finite() || total <= 0 {
        return 0;
    }
    let frame = (fraction * total as f64).round();
    clamp_playhead(frame as Frame, total)
}

pub fn clamp_playhead(frame: Frame, total: Frame) -> Frame {
    frame.clamp(0, total.max(0))
}

/// Finds the scene under the playhead. The end-of-track position (`frame ==
/// total`) is resolved against `total - 1`, so it belongs to the last scene.
pub fn resolve_playhead(scenes: &SceneList, frame: Frame) -> Option<PlayheadPosition> {
    let total = scenes.total_duration();
    if total <= 0 {
        return None;
    }
    let frame = frame.clamp(0, total - 1);

    let mut start = 0;
    for (index, scene) in scenes.iter().enumerate() {
        let end = start + scene.duration;
        if frame < end {
            return Some(PlayheadPosition {
                scene_id: scene.id,
                index,
                scene_start: start,
                offset: frame - start,
            });
        }
        start = end;
    }
    None
}
