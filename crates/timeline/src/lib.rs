use serde::{Deserialize, Serialize};
use thiserror::Error;

mod scene;
pub use scene::*;
mod sequence;
pub use sequence::*;
mod playhead;
pub use playhead::*;
mod drag;
pub use drag::*;
mod commands;
pub use commands::*;
mod edits;
pub use edits::*;
mod settings;
pub use settings::*;
mod editor;
pub use editor::*;
pub mod timecode;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("invalid operation: {0}")]
    InvalidOp(String),
    #[error("scene already exists: {0}")]
    SceneExists(SceneId),
    #[error("scene not found: {0}")]
    SceneNotFound(SceneId),
    #[error("invalid timecode: {0}")]
    InvalidTimecode(String),
    #[error("history empty: {0}")]
    HistoryEmpty(&'static str),
}

pub type Frame = i64; // 0-based time in frames

/// Shortest a trim can make a scene: one second at the default rate.
pub const MIN_SCENE_DURATION: Frame = 30;

/// Upper bound on a track's total length; trims stop growing a scene here.
pub const MAX_TRACK_DURATION: Frame = i32::MAX as Frame;

pub const DEFAULT_FPS: Fps = Fps::new(30, 1);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fps {
    pub num: u32,
    pub den: u32,
}

impl Fps {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Whole frames per second, never zero.
    pub fn frames_per_second(&self) -> u32 {
        (self.as_f64().round() as u32).max(1)
    }

    pub fn frames_to_seconds(&self, frames: Frame) -> f64 {
        frames as f64 / self.frames_per_second() as f64
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> Frame {
        (seconds * self.as_f64()).round() as Frame
    }
}

impl Default for Fps {
    fn default() -> Self {
        DEFAULT_FPS
    }
}
