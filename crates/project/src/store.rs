use anyhow::Result;
use serde::{Deserialize, Serialize};
use timeline::{SceneEdit, SceneId};

use crate::{Project, ProjectId};

/// Outcome of pushing one batch of edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditReport {
    pub written: usize,
    pub deleted: usize,
    pub reordered: bool,
    /// Upserts skipped because the stored revision was newer.
    pub stale: Vec<SceneId>,
}

impl EditReport {
    pub fn is_clean(&self) -> bool {
        self.stale.is_empty()
    }
}

/// Server-side data layer the editor persists through.
pub trait ProjectStore {
    fn load_project(&self, id: ProjectId) -> Result<Option<Project>>;

    /// Applies a batch atomically: either every edit lands or none does.
    fn apply_edits(&self, project_id: ProjectId, edits: &[SceneEdit]) -> Result<EditReport>;
}
