use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use project::{Project, ProjectId, VideoFormat};
use timeline::{ContentId, Fps, Frame, SceneId};

use crate::JobError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderQuality {
    Draft,
    #[default]
    Standard,
    High,
}

impl RenderQuality {
    pub fn scale(self) -> f64 {
        match self {
            RenderQuality::Draft => 0.5,
            RenderQuality::Standard | RenderQuality::High => 1.0,
        }
    }

    pub fn bitrate_kbps(self) -> u32 {
        match self {
            RenderQuality::Draft => 4_000,
            RenderQuality::Standard => 8_000,
            RenderQuality::High => 16_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RenderQuality::Draft => "draft",
            RenderQuality::Standard => "standard",
            RenderQuality::High => "high",
        }
    }
}

impl FromStr for RenderQuality {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(RenderQuality::Draft),
            "standard" => Ok(RenderQuality::Standard),
            "high" => Ok(RenderQuality::High),
            other => Err(JobError::UnknownQuality(other.to_string())),
        }
    }
}

impl fmt::Display for RenderQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderJobSpec {
    pub project_id: ProjectId,
    pub format: VideoFormat,
    pub quality: RenderQuality,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedScene {
    pub scene_id: SceneId,
    pub name: String,
    pub start: Frame,
    pub duration: Frame,
    pub trim_in: Frame,
    pub content_id: ContentId,
}

/// Everything a backend needs, frozen at submit time so later edits do not
/// leak into a running render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderPlan {
    pub project_id: ProjectId,
    pub title: String,
    pub format: VideoFormat,
    pub quality: RenderQuality,
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub bitrate_kbps: u32,
    pub background_color: String,
    pub total_frames: Frame,
    pub scenes: Vec<PlannedScene>,
}

impl RenderPlan {
    pub fn from_project(project: &Project, spec: &RenderJobSpec) -> Self {
        let (base_w, base_h) = spec.format.dimensions();
        let scale = spec.quality.scale();
        let scenes = project
            .scenes
            .spans()
            .into_iter()
            .filter_map(|(id, span)| {
                let scene = project.scenes.get(id)?;
                Some(PlannedScene {
                    scene_id: id,
                    name: scene.name.clone(),
                    start: span.start,
                    duration: span.duration,
                    trim_in: scene.trim_in,
                    content_id: scene.payload.content_id(),
                })
            })
            .collect();
        Self {
            project_id: project.id,
            title: project.title.clone(),
            format: spec.format,
            quality: spec.quality,
            width: scaled_even(base_w, scale),
            height: scaled_even(base_h, scale),
            fps: project.settings.fps,
            bitrate_kbps: spec.quality.bitrate_kbps(),
            background_color: project.background_color.clone(),
            total_frames: project.target_duration(),
            scenes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty() || self.total_frames <= 0
    }
}

// Encoders want even dimensions.
fn scaled_even(value: u32, scale: f64) -> u32 {
    let scaled = (value as f64 * scale).round() as u32;
    (scaled & !1).max(2)
}
