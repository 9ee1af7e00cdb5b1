use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Frame, MAX_TRACK_DURATION};

/// Namespace for payload content ids. Fixed so ids are stable across runs.
const PAYLOAD_NAMESPACE: Uuid = Uuid::from_u128(0x6d6f_7469_6f6e_2d70_6179_6c6f_6164_7631);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SceneId(pub Uuid);

impl SceneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for SceneId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ContentId(pub Uuid);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Renderable code attached to a scene. The timeline never looks inside it;
/// only the content id is used to tell payloads apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "PayloadRepr")]
pub struct ScenePayload {
    code: String,
    content_id: ContentId,
}

impl ScenePayload {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let content_id = ContentId(Uuid::new_v5(&PAYLOAD_NAMESPACE, code.as_bytes()));
        Self { code, content_id }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn content_id(&self) -> ContentId {
        self.content_id
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// Wire form of a payload. A stored content id is ignored and derived again
/// from the code.
#[derive(Deserialize)]
struct PayloadRepr {
    code: String,
    #[serde(default, rename = "content_id")]
    _content_id: Option<ContentId>,
}

impl From<PayloadRepr> for ScenePayload {
    fn from(repr: PayloadRepr) -> Self {
        ScenePayload::new(repr.code)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameRange {
    pub start: Frame,
    pub duration: Frame,
}

impl FrameRange {
    pub fn new(start: Frame, duration: Frame) -> Self {
        Self { start, duration }
    }

    pub fn end(&self) -> Frame {
        self.start + self.duration
    }

    pub fn contains(&self, frame: Frame) -> bool {
        frame >= self.start && frame < self.end()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "SceneRepr")]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub duration: Frame,
    pub payload: ScenePayload,
    /// Position in the owning list. Rewritten by the list, never trusted as input.
    pub order: usize,
    pub revision: u64,
    /// Frames of the payload's own timeline skipped at the head.
    pub trim_in: Frame,
}

#[derive(Deserialize)]
struct SceneRepr {
    id: SceneId,
    name: String,
    duration: Frame,
    payload: ScenePayload,
    #[serde(default)]
    order: usize,
    #[serde(default)]
    revision: u64,
    #[serde(default)]
    trim_in: Frame,
}

impl From<SceneRepr> for Scene {
    fn from(repr: SceneRepr) -> Self {
        Scene {
            id: repr.id,
            name: repr.name,
            duration: repr.duration.clamp(1, MAX_TRACK_DURATION),
            payload: repr.payload,
            order: repr.order,
            revision: repr.revision,
            trim_in: repr.trim_in.max(0),
        }
    }
}

impl Scene {
    pub fn new(name: impl Into<String>, duration: Frame, payload: ScenePayload) -> Self {
        Self {
            id: SceneId::new(),
            name: name.into(),
            duration: duration.max(1),
            payload,
            order: 0,
            revision: 0,
            trim_in: 0,
        }
    }

    pub fn with_id(mut self, id: SceneId) -> Self {
        self.id = id;
        self
    }

    /// Splits at `floor(duration / 2)` into two new scenes that share the payload.
    /// Returns `None` when either half would be empty.
    pub fn split(&self) -> Option<(Scene, Scene)> {
        let first_len = self.duration / 2;
        let second_len = self.duration - first_len;
        if first_len < 1 || second_len < 1 {
            return None;
        }

        let first = Scene {
            id: SceneId::new(),
            name: self.name.clone(),
            duration: first_len,
            payload: self.payload.clone(),
            order: self.order,
            revision: 0,
            trim_in: self.trim_in,
        };
        let second = Scene {
            id: SceneId::new(),
            name: format!("{} (2)", self.name),
            duration: second_len,
            payload: self.payload.clone(),
            order: self.order + 1,
            revision: 0,
            trim_in: self.trim_in + first_len,
        };
        Some((first, second))
    }

    /// True when the persisted fields differ, ignoring order and revision.
    pub fn content_differs(&self, other: &Scene) -> bool {
        self.duration != other.duration
            || self.trim_in != other.trim_in
            || self.name != other.name
            || self.payload.content_id() != other.payload.content_id()
    }
}
