use serde::{Deserialize, Serialize};

use crate::{Fps, Frame, DEFAULT_FPS, MIN_SCENE_DURATION};

/// What stays fixed when a scene's start edge is trimmed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrimStartPolicy {
    /// The scene's end frame stays put; the preceding scene absorbs the change.
    #[default]
    HoldEnd,
    /// The scene's start stays put; the end and every later scene shift.
    Ripple,
}

/// Per-project editing settings, stored alongside the project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimelineSettings {
    #[serde(default = "default_fps")]
    pub fps: Fps,
    #[serde(default = "default_min_scene_duration")]
    pub min_scene_duration: Frame,
    #[serde(default)]
    pub trim_start_policy: TrimStartPolicy,
}

fn default_fps() -> Fps {
    DEFAULT_FPS
}

fn default_min_scene_duration() -> Frame {
    MIN_SCENE_DURATION
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            min_scene_duration: MIN_SCENE_DURATION,
            trim_start_policy: TrimStartPolicy::default(),
        }
    }
}
