use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use timeline::{Frame, SceneList, TimelineSettings};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
#[error("unknown video format: {0} (expected landscape, portrait or square)")]
pub struct UnknownFormat(pub String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    #[default]
    Landscape,
    Portrait,
    Square,
}

impl VideoFormat {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            VideoFormat::Landscape => (1920, 1080),
            VideoFormat::Portrait => (1080, 1920),
            VideoFormat::Square => (1080, 1080),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VideoFormat::Landscape => "landscape",
            VideoFormat::Portrait => "portrait",
            VideoFormat::Square => "square",
        }
    }
}

impl FromStr for VideoFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "landscape" => Ok(VideoFormat::Landscape),
            "portrait" => Ok(VideoFormat::Portrait),
            "square" => Ok(VideoFormat::Square),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

pub const DEFAULT_BACKGROUND: &str = "#000000";

/// A project as loaded into memory: metadata plus the ordered scene snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub background_color: String,
    pub format: VideoFormat,
    #[serde(default)]
    pub settings: TimelineSettings,
    pub scenes: SceneList,
}

impl Project {
    pub fn new(title: impl Into<String>, format: VideoFormat) -> Self {
        Self {
            id: ProjectId::new(),
            title: title.into(),
            background_color: DEFAULT_BACKGROUND.to_string(),
            format,
            settings: TimelineSettings::default(),
            scenes: SceneList::new(),
        }
    }

    /// Target duration, derived from the scenes.
    pub fn target_duration(&self) -> Frame {
        self.scenes.total_duration()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.settings.fps.frames_to_seconds(self.target_duration())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.format.dimensions()
    }
}

/// Accepts `#rgb` or `#rrggbb`; returns the lower-case long form.
pub fn normalize_color(input: &str) -> Option<String> {
    let hex = input.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => Some(format!("#{}", hex.to_ascii_lowercase())),
        3 => {
            let long: String = hex
                .chars()
                .flat_map(|c| [c, c])
                .collect::<String>()
                .to_ascii_lowercase();
            Some(format!("#{long}"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline::{Scene, ScenePayload};

    #[test]
    fn formats_parse_and_map_to_dimensions() {
        assert_eq!("Portrait".parse::<VideoFormat>().unwrap(), VideoFormat::Portrait);
        assert_eq!(VideoFormat::Square.dimensions(), (1080, 1080));
        assert_eq!(VideoFormat::Landscape.dimensions(), (1920, 1080));
        assert!("cinema".parse::<VideoFormat>().is_err());
    }

    #[test]
    fn target_duration_follows_scenes() {
        let mut project = Project::new("Launch", VideoFormat::Landscape);
        project.scenes.push(Scene::new("a", 150, ScenePayload::new("a")));
        project.scenes.push(Scene::new("b", 90, ScenePayload::new("b")));
        assert_eq!(project.target_duration(), 240);
        assert!((project.duration_seconds() - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn colors_normalize() {
        assert_eq!(normalize_color("#FFAA00").as_deref(), Some("#ffaa00"));
        assert_eq!(normalize_color("#fa0").as_deref(), Some("#ffaa00"));
        assert_eq!(normalize_color("ffaa00"), None);
        assert_eq!(normalize_color("#ggg"), None);
    }
}
