use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{Scene, SceneId};

/// A change to persisted scene state, produced in memory and pushed to the
/// project database later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum SceneEdit {
    Upsert { scene: Scene },
    Delete { scene_id: SceneId },
    Reorder { order: Vec<SceneId> },
}

impl SceneEdit {
    pub fn scene_id(&self) -> Option<SceneId> {
        match self {
            SceneEdit::Upsert { scene } => Some(scene.id),
            SceneEdit::Delete { scene_id } => Some(*scene_id),
            SceneEdit::Reorder { .. } => None,
        }
    }
}

/// Edits that turn `before` into `after`. Deletes come first, then upserts in
/// list order, then a reorder when the id sequence changed.
pub fn diff_scenes(before: &[Scene], after: &[Scene]) -> Vec<SceneEdit> {
    let previous: HashMap<SceneId, &Scene> = before.iter().map(|s| (s.id, s)).collect();
    let current: HashMap<SceneId, &Scene> = after.iter().map(|s| (s.id, s)).collect();

    let mut edits = Vec::new();
    for scene in before {
        if !current.contains_key(&scene.id) {
            edits.push(SceneEdit::Delete { scene_id: scene.id });
        }
    }
    for scene in after {
        let changed = match previous.get(&scene.id) {
            Some(old) => old.content_differs(scene),
            None => true,
        };
        if changed {
            edits.push(SceneEdit::Upsert {
                scene: scene.clone(),
            });
        }
    }

    let before_ids: Vec<SceneId> = before.iter().map(|s| s.id).collect();
    let after_ids: Vec<SceneId> = after.iter().map(|s| s.id).collect();
    if before_ids != after_ids && !after_ids.is_empty() {
        edits.push(SceneEdit::Reorder { order: after_ids });
    }
    edits
}
