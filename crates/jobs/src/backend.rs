use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{JobError, JobId, PlannedScene, RenderPlan};

/// Does the actual rendering. `progress` takes a fraction in `0..=1` and
/// returns `false` once the job has been canceled; backends should stop then.
pub trait RenderBackend: Send + Sync {
    fn render(
        &self,
        job_id: &JobId,
        plan: &RenderPlan,
        progress: &mut dyn FnMut(f32) -> bool,
    ) -> Result<String>;
}

#[derive(Serialize)]
struct Manifest<'a> {
    job_id: &'a JobId,
    #[serde(flatten)]
    plan: &'a RenderPlan,
    seconds: f64,
}

/// Writes a JSON render manifest per job instead of encoding video.
pub struct ManifestBackend {
    out_dir: PathBuf,
}

impl ManifestBackend {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

impl RenderBackend for ManifestBackend {
    fn render(
        &self,
        job_id: &JobId,
        plan: &RenderPlan,
        progress: &mut dyn FnMut(f32) -> bool,
    ) -> Result<String> {
        if plan.is_empty() {
            return Err(JobError::EmptyPlan.into());
        }
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("create render dir {}", self.out_dir.display()))?;

        let total = plan.scenes.len();
        for (i, scene) in plan.scenes.iter().enumerate() {
            check_scene(scene)?;
            if !progress((i + 1) as f32 / (total + 1) as f32) {
                return Err(JobError::Canceled.into());
            }
        }

        let manifest = Manifest {
            job_id,
            plan,
            seconds: plan.fps.frames_to_seconds(plan.total_frames),
        };
        let path = self.out_dir.join(format!("{job_id}.json"));
        let body = serde_json::to_vec_pretty(&manifest)?;
        fs::write(&path, body).with_context(|| format!("write manifest {}", path.display()))?;
        progress(1.0);

        let abs = path.canonicalize().unwrap_or(path);
        Ok(format!("file://{}", abs.display()))
    }
}

fn check_scene(scene: &PlannedScene) -> Result<()> {
    if scene.duration <= 0 {
        anyhow::bail!("scene {} has no frames", scene.scene_id);
    }
    Ok(())
}
