use serde::{Deserialize, Serialize};

use crate::{Frame, FrameRange, Scene, SceneId};

/// Ordered scenes of one project. Start offsets are always derived from the
/// durations of the preceding scenes and are never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SceneList {
    scenes: Vec<Scene>,
}

impl SceneList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from scenes in any order, sorting by their stored order index.
    pub fn from_scenes(mut scenes: Vec<Scene>) -> Self {
        scenes.sort_by_key(|s| s.order);
        let mut list = Self { scenes };
        list.renumber();
        list
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.iter()
    }

    pub fn as_slice(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn ids(&self) -> Vec<SceneId> {
        self.scenes.iter().map(|s| s.id).collect()
    }

    pub fn get(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: SceneId) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.id == id)
    }

    pub fn index_of(&self, id: SceneId) -> Option<usize> {
        self.scenes.iter().position(|s| s.id == id)
    }

    pub fn at(&self, index: usize) -> Option<&Scene> {
        self.scenes.get(index)
    }

    pub fn total_duration(&self) -> Frame {
        self.scenes.iter().map(|s| s.duration).sum()
    }

    pub fn start_of(&self, id: SceneId) -> Option<Frame> {
        let mut start = 0;
        for scene in &self.scenes {
            if scene.id == id {
                return Some(start);
            }
            start += scene.duration;
        }
        None
    }

    pub fn span_of(&self, id: SceneId) -> Option<FrameRange> {
        let start = self.start_of(id)?;
        let duration = self.get(id)?.duration;
        Some(FrameRange::new(start, duration))
    }

    pub fn spans(&self) -> Vec<(SceneId, FrameRange)> {
        let mut start = 0;
        self.scenes
            .iter()
            .map(|scene| {
                let span = FrameRange::new(start, scene.duration);
                start += scene.duration;
                (scene.id, span)
            })
            .collect()
    }

    /// Strict ownership: the scene whose span contains `frame`. The end of
    /// the track belongs to no scene.
    pub fn scene_at(&self, frame: Frame) -> Option<&Scene> {
        if frame < 0 {
            return None;
        }
        let mut end = 0;
        for scene in &self.scenes {
            end += scene.duration;
            if frame < end {
                return Some(scene);
            }
        }
        None
    }

    /// Writes a duration as-is (floor of one frame). Returns the previous value.
    pub fn set_duration(&mut self, id: SceneId, duration: Frame) -> Option<Frame> {
        let scene = self.get_mut(id)?;
        let previous = scene.duration;
        scene.duration = duration.max(1);
        Some(previous)
    }

    pub fn set_trim_in(&mut self, id: SceneId, trim_in: Frame) -> Option<Frame> {
        let scene = self.get_mut(id)?;
        let previous = scene.trim_in;
        scene.trim_in = trim_in.max(0);
        Some(previous)
    }

    pub fn push(&mut self, scene: Scene) {
        self.scenes.push(scene);
        self.renumber();
    }

    /// Inserts at `index`, clamped to the end of the list.
    pub fn insert(&mut self, index: usize, scene: Scene) -> usize {
        let index = index.min(self.scenes.len());
        self.scenes.insert(index, scene);
        self.renumber();
        index
    }

    pub fn remove(&mut self, id: SceneId) -> Option<(usize, Scene)> {
        let index = self.index_of(id)?;
        let scene = self.scenes.remove(index);
        self.renumber();
        Some((index, scene))
    }

    /// Moves a scene to `index` (clamped). Returns the index it came from.
    pub fn move_to(&mut self, id: SceneId, index: usize) -> Option<usize> {
        let from = self.index_of(id)?;
        let scene = self.scenes.remove(from);
        let target = index.min(self.scenes.len());
        self.scenes.insert(target, scene);
        self.renumber();
        Some(from)
    }

    /// Replaces the scene in place by its two halves. Returns the new ids.
    pub fn cut(&mut self, id: SceneId) -> Option<(SceneId, SceneId)> {
        let index = self.index_of(id)?;
        let (first, second) = self.scenes[index].split()?;
        let ids = (first.id, second.id);
        self.scenes[index] = second;
        self.scenes.insert(index, first);
        self.renumber();
        Some(ids)
    }

    fn renumber(&mut self) {
        for (i, scene) in self.scenes.iter_mut().enumerate() {
            scene.order = i;
        }
    }
}

impl FromIterator<Scene> for SceneList {
    fn from_iter<I: IntoIterator<Item = Scene>>(iter: I) -> Self {
        let mut list = Self {
            scenes: iter.into_iter().collect(),
        };
        list.renumber();
        list
    }
}
