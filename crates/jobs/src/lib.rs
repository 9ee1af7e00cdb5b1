use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use project::{ProjectDb, ProjectId};

mod backend;
pub use backend::*;
mod plan;
pub use plan::*;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("worker stopped")]
    Stopped,
    #[error("job canceled")]
    Canceled,
    #[error("nothing to render: the project has no scenes")]
    EmptyPlan,
    #[error("unknown render quality: {0} (expected draft, standard or high)")]
    UnknownQuality(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub project_id: ProjectId,
    pub status: JobStatus,
    pub progress: f32,
    pub output_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobEvent {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: f32,
}

/// Finished jobs kept for polling; older ones are dropped first.
pub const KEEP_FINISHED: usize = 256;

type Queued = (JobId, RenderJobSpec, RenderPlan);
type SharedTable = Arc<RwLock<JobTable>>;

/// In-memory job state shared by the handle, the feeder and the workers.
#[derive(Default)]
struct JobTable {
    jobs: HashMap<JobId, JobSnapshot>,
    finished: VecDeque<JobId>,
    canceled: HashSet<JobId>,
}

impl JobTable {
    fn update(
        &mut self,
        id: &JobId,
        status: JobStatus,
        progress: Option<f32>,
        output_url: Option<String>,
        error: Option<String>,
    ) {
        let Some(snapshot) = self.jobs.get_mut(id) else {
            return;
        };
        let newly_finished = status.is_terminal() && !snapshot.status.is_terminal();
        snapshot.status = status;
        if let Some(p) = progress {
            snapshot.progress = p;
        }
        if output_url.is_some() {
            snapshot.output_url = output_url;
        }
        if error.is_some() {
            snapshot.error = error;
        }
        if newly_finished {
            self.canceled.remove(id);
            self.finished.push_back(id.clone());
            while self.finished.len() > KEEP_FINISHED {
                if let Some(old) = self.finished.pop_front() {
                    self.jobs.remove(&old);
                }
            }
        }
    }

    fn is_canceled(&self, id: &JobId) -> bool {
        self.canceled.contains(id)
    }

    fn progress(&self, id: &JobId) -> f32 {
        self.jobs.get(id).map(|s| s.progress).unwrap_or(0.0)
    }
}

/// One thread's writer for job state. The database row changes before the
/// in-memory snapshot, so anyone who sees a status can read it back from the db.
struct Recorder {
    table: SharedTable,
    tx_events: Sender<JobEvent>,
    db: Option<ProjectDb>,
}

impl Recorder {
    fn record(&self, id: &JobId, status: JobStatus, progress: f32, url: Option<String>, error: Option<String>) {
        if let Some(db) = &self.db {
            if let Err(e) = db.update_render_job(
                id.as_str(),
                status.as_str(),
                progress as f64,
                url.as_deref(),
                error.as_deref(),
            ) {
                warn!(job = %id, status = status.as_str(), "failed to update render job row: {e:#}");
            }
        }
        self.table.write().update(id, status, Some(progress), url, error);
        let _ = self.tx_events.send(JobEvent {
            id: id.clone(),
            status,
            progress,
        });
    }

    fn progress(&self, id: &JobId, fraction: f32) {
        self.table
            .write()
            .update(id, JobStatus::Running, Some(fraction), None, None);
        let _ = self.tx_events.send(JobEvent {
            id: id.clone(),
            status: JobStatus::Running,
            progress: fraction,
        });
    }
}

#[derive(Clone)]
pub struct JobsHandle {
    tx_submit: Sender<Queued>,
    tx_cancel: Sender<JobId>,
    pub rx_events: Receiver<JobEvent>,
    table: SharedTable,
    stop: Arc<AtomicBool>,
}

pub struct JobsRuntime {
    queue: Arc<Mutex<VecDeque<Queued>>>,
    table: SharedTable,
    tx_events: Sender<JobEvent>,
    stop: Arc<AtomicBool>,
    db_path: Option<Arc<PathBuf>>,
}

impl JobsRuntime {
    /// Starts `num_workers` render threads. With a `db_path`, job rows are
    /// recorded in the project database as they change.
    pub fn start(
        backend: Arc<dyn RenderBackend>,
        num_workers: usize,
        db_path: Option<PathBuf>,
    ) -> JobsHandle {
        let (tx_submit, rx_submit) = unbounded::<Queued>();
        let (tx_cancel, rx_cancel) = unbounded::<JobId>();
        let (tx_events, rx_events) = unbounded::<JobEvent>();

        let runtime = JobsRuntime {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            table: Arc::new(RwLock::new(JobTable::default())),
            tx_events,
            stop: Arc::new(AtomicBool::new(false)),
            db_path: db_path.map(Arc::new),
        };

        // Rows left pending or running by an earlier process cannot resume.
        if let Some(db) = runtime.open_db() {
            match db.fail_interrupted_render_jobs() {
                Ok(0) => {}
                Ok(n) => info!(count = n, "marked interrupted render jobs failed"),
                Err(e) => warn!("failed to reset interrupted render jobs: {e:#}"),
            }
        }

        runtime.spawn_workers(num_workers.max(1), backend);
        runtime.spawn_feeder(rx_submit, rx_cancel);
        info!(workers = num_workers.max(1), "render queue started");

        JobsHandle {
            tx_submit,
            tx_cancel,
            rx_events,
            table: runtime.table.clone(),
            stop: runtime.stop.clone(),
        }
    }

    fn open_db(&self) -> Option<ProjectDb> {
        let path = self.db_path.as_ref()?;
        match ProjectDb::open_or_create(path.as_ref()) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(path = %path.display(), "render queue cannot open db: {e:#}");
                None
            }
        }
    }

    fn recorder(&self) -> Recorder {
        Recorder {
            table: self.table.clone(),
            tx_events: self.tx_events.clone(),
            db: self.open_db(),
        }
    }

    fn spawn_feeder(&self, rx_submit: Receiver<Queued>, rx_cancel: Receiver<JobId>) {
        let q = self.queue.clone();
        let table = self.table.clone();
        let stop = self.stop.clone();
        let recorder = self.recorder();
        thread::spawn(move || loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            crossbeam_channel::select! {
                recv(rx_submit) -> msg => {
                    let Ok((id, spec, plan)) = msg else { break };
                    if let Some(db) = &recorder.db {
                        if let Err(e) = db.insert_render_job(id.as_str(), spec.project_id, spec.format.as_str(), spec.quality.as_str()) {
                            warn!(job = %id, "failed to record render job: {e:#}");
                        }
                    }
                    if table.read().is_canceled(&id) {
                        recorder.record(&id, JobStatus::Canceled, 0.0, None, None);
                        continue;
                    }
                    q.lock().push_back((id.clone(), spec, plan));
                    let _ = recorder.tx_events.send(JobEvent { id, status: JobStatus::Pending, progress: 0.0 });
                }
                recv(rx_cancel) -> msg => {
                    let Ok(id) = msg else { break };
                    let was_queued = {
                        let mut ql = q.lock();
                        let before = ql.len();
                        ql.retain(|(queued, _, _)| queued != &id);
                        ql.len() != before
                    };
                    if was_queued {
                        recorder.record(&id, JobStatus::Canceled, 0.0, None, None);
                        continue;
                    }
                    // Running jobs notice on their next progress tick.
                    let mut t = table.write();
                    let active = t.jobs.get(&id).map(|s| !s.status.is_terminal()).unwrap_or(false);
                    if active {
                        t.canceled.insert(id);
                    }
                }
                default(Duration::from_millis(50)) => {}
            }
        });
    }

    fn spawn_workers(&self, n: usize, backend: Arc<dyn RenderBackend>) {
        for worker in 0..n {
            let q = self.queue.clone();
            let stop = self.stop.clone();
            let backend = backend.clone();
            let recorder = self.recorder();
            thread::spawn(move || {
                debug!(worker, "render worker started");
                while !stop.load(Ordering::Relaxed) {
                    let next = q.lock().pop_front();
                    let Some((id, _spec, plan)) = next else {
                        thread::sleep(Duration::from_millis(10));
                        continue;
                    };
                    if recorder.table.read().is_canceled(&id) {
                        recorder.record(&id, JobStatus::Canceled, 0.0, None, None);
                        continue;
                    }

                    recorder.record(&id, JobStatus::Running, 0.0, None, None);
                    let mut on_progress = |fraction: f32| {
                        if recorder.table.read().is_canceled(&id) {
                            return false;
                        }
                        recorder.progress(&id, fraction.clamp(0.0, 1.0));
                        true
                    };
                    let result = backend.render(&id, &plan, &mut on_progress);

                    let progress = recorder.table.read().progress(&id);
                    match result {
                        Ok(url) => {
                            info!(job = %id, %url, "render completed");
                            recorder.record(&id, JobStatus::Completed, 1.0, Some(url), None);
                        }
                        Err(e) if matches!(e.downcast_ref::<JobError>(), Some(JobError::Canceled)) => {
                            info!(job = %id, "render canceled");
                            recorder.record(&id, JobStatus::Canceled, progress, None, None);
                        }
                        Err(e) => {
                            warn!(job = %id, "render failed: {e:#}");
                            recorder.record(&id, JobStatus::Failed, progress, None, Some(e.to_string()));
                        }
                    }
                }
            });
        }
    }
}

impl JobsHandle {
    pub fn submit(&self, spec: RenderJobSpec, plan: RenderPlan) -> Result<JobId, JobError> {
        let id = JobId::new();
        self.table.write().jobs.insert(
            id.clone(),
            JobSnapshot {
                id: id.clone(),
                project_id: spec.project_id,
                status: JobStatus::Pending,
                progress: 0.0,
                output_url: None,
                error: None,
            },
        );
        if self.tx_submit.send((id.clone(), spec, plan)).is_err() {
            self.table.write().jobs.remove(&id);
            return Err(JobError::Stopped);
        }
        Ok(id)
    }

    /// Current snapshot. Finished jobs are forgotten once more than
    /// [`KEEP_FINISHED`] newer ones have finished.
    pub fn poll(&self, id: &JobId) -> Option<JobSnapshot> {
        self.table.read().jobs.get(id).cloned()
    }

    /// Requests cancellation. Returns `false` for unknown or finished jobs.
    pub fn cancel(&self, id: &JobId) -> bool {
        let active = self
            .table
            .read()
            .jobs
            .get(id)
            .map(|s| !s.status.is_terminal())
            .unwrap_or(false);
        if active {
            let _ = self.tx_cancel.send(id.clone());
        }
        active
    }

    /// Blocks until the job reaches a terminal status or `timeout` passes.
    pub fn wait(&self, id: &JobId, timeout: Duration) -> Option<JobSnapshot> {
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.poll(id)?;
            if snapshot.status.is_terminal() || Instant::now() >= deadline {
                return Some(snapshot);
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use project::{Project, VideoFormat};
    use timeline::{Scene, ScenePayload};

    const WAIT: Duration = Duration::from_secs(5);

    fn project(durations: &[i64]) -> Project {
        let mut project = Project::new("Render me", VideoFormat::Landscape);
        for (i, d) in durations.iter().enumerate() {
            project
                .scenes
                .push(Scene::new(format!("s{i}"), *d, ScenePayload::new(format!("{i}"))));
        }
        project
    }

    fn job(project: &Project, quality: RenderQuality) -> (RenderJobSpec, RenderPlan) {
        let spec = RenderJobSpec {
            project_id: project.id,
            format: project.format,
            quality,
        };
        let plan = RenderPlan::from_project(project, &spec);
        (spec, plan)
    }

    /// Waits on progress until released, then succeeds.
    struct Gate {
        open: Arc<AtomicBool>,
    }

    impl RenderBackend for Gate {
        fn render(
            &self,
            job_id: &JobId,
            _plan: &RenderPlan,
            progress: &mut dyn FnMut(f32) -> bool,
        ) -> Result<String> {
            let deadline = Instant::now() + WAIT;
            while !self.open.load(Ordering::SeqCst) && Instant::now() < deadline {
                if !progress(0.25) {
                    return Err(JobError::Canceled.into());
                }
                thread::sleep(Duration::from_millis(5));
            }
            Ok(format!("memory://{job_id}"))
        }
    }

    struct Broken;

    impl RenderBackend for Broken {
        fn render(&self, _: &JobId, _: &RenderPlan, _: &mut dyn FnMut(f32) -> bool) -> Result<String> {
            bail!("encoder crashed")
        }
    }

    #[test]
    fn manifest_jobs_complete_with_url() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ManifestBackend::new(dir.path().join("renders")));
        let handle = JobsRuntime::start(backend, 2, None);
        let project = project(&[150, 90, 120]);
        let (spec, plan) = job(&project, RenderQuality::Draft);

        let id = handle.submit(spec, plan).unwrap();
        let done = handle.wait(&id, WAIT).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 1.0);
        let url = done.output_url.unwrap();
        assert!(url.starts_with("file://"));

        let path = url.trim_start_matches("file://");
        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(manifest["width"], 960);
        assert_eq!(manifest["total_frames"], 360);
        assert_eq!(manifest["scenes"].as_array().unwrap().len(), 3);
        assert_eq!(manifest["scenes"][2]["start"], 240);
        handle.shutdown();
    }

    #[test]
    fn empty_projects_fail_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let handle = JobsRuntime::start(Arc::new(ManifestBackend::new(dir.path())), 1, None);
        let project = project(&[]);
        let (spec, plan) = job(&project, RenderQuality::Standard);
        let id = handle.submit(spec, plan).unwrap();
        let done = handle.wait(&id, WAIT).unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("no scenes"));
        assert!(done.output_url.is_none());
    }

    #[test]
    fn backend_errors_are_reported() {
        let handle = JobsRuntime::start(Arc::new(Broken), 1, None);
        let project = project(&[30]);
        let (spec, plan) = job(&project, RenderQuality::High);
        let id = handle.submit(spec, plan).unwrap();
        let done = handle.wait(&id, WAIT).unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("encoder crashed"));
        assert!(!handle.cancel(&id));
    }

    #[test]
    fn running_jobs_can_be_canceled() {
        let open = Arc::new(AtomicBool::new(false));
        let handle = JobsRuntime::start(Arc::new(Gate { open: open.clone() }), 1, None);
        let project = project(&[30]);
        let (spec, plan) = job(&project, RenderQuality::Draft);
        let id = handle.submit(spec, plan).unwrap();

        loop {
            let event = handle.rx_events.recv_timeout(WAIT).unwrap();
            if event.id == id && event.status == JobStatus::Running {
                break;
            }
        }
        assert!(handle.cancel(&id));
        let done = handle.wait(&id, WAIT).unwrap();
        assert_eq!(done.status, JobStatus::Canceled);
        assert!(done.output_url.is_none());
        assert!(handle.table.read().canceled.is_empty());
    }

    #[test]
    fn canceled_rows_are_settled_before_wait_returns() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("p.db");
        let db = ProjectDb::open_or_create(&db_path).unwrap();
        let created = db
            .create_project("Canceled", VideoFormat::Landscape, None)
            .unwrap();
        let mut project = project(&[30]);
        project.id = created.id;

        let open = Arc::new(AtomicBool::new(false));
        let handle = JobsRuntime::start(Arc::new(Gate { open }), 1, Some(db_path));
        let (spec, plan) = job(&project, RenderQuality::Draft);
        let running = handle.submit(spec, plan.clone()).unwrap();
        let queued = handle.submit(spec, plan).unwrap();
        while handle.poll(&running).unwrap().status != JobStatus::Running {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            db.get_render_job(running.as_str()).unwrap().unwrap().status,
            "running"
        );

        assert!(handle.cancel(&queued));
        assert!(handle.cancel(&running));
        for id in [&queued, &running] {
            assert_eq!(handle.wait(id, WAIT).unwrap().status, JobStatus::Canceled);
            let row = db.get_render_job(id.as_str()).unwrap().unwrap();
            assert_eq!(row.status, "canceled");
        }
        assert!(handle.table.read().canceled.is_empty());
        handle.shutdown();
    }

    #[test]
    fn finished_jobs_are_forgotten_oldest_first() {
        let mut table = JobTable::default();
        let project_id = ProjectId::new();
        let ids: Vec<JobId> = (0..KEEP_FINISHED + 3).map(|_| JobId::new()).collect();
        let live = JobId::new();
        for id in ids.iter().chain(std::iter::once(&live)) {
            table.jobs.insert(
                id.clone(),
                JobSnapshot {
                    id: id.clone(),
                    project_id,
                    status: JobStatus::Pending,
                    progress: 0.0,
                    output_url: None,
                    error: None,
                },
            );
        }
        table.canceled.insert(ids[0].clone());
        for id in &ids {
            table.update(id, JobStatus::Completed, Some(1.0), None, None);
        }
        // a second terminal update must not queue the job twice
        table.update(&ids[KEEP_FINISHED + 2], JobStatus::Failed, None, None, None);

        assert_eq!(table.finished.len(), KEEP_FINISHED);
        assert_eq!(table.jobs.len(), KEEP_FINISHED + 1);
        assert!(ids[..3].iter().all(|id| !table.jobs.contains_key(id)));
        assert!(table.jobs.contains_key(&ids[3]));
        assert!(table.jobs.contains_key(&live));
        assert!(table.canceled.is_empty());
    }

    #[test]
    fn queued_jobs_cancel_before_running() {
        let open = Arc::new(AtomicBool::new(false));
        let handle = JobsRuntime::start(Arc::new(Gate { open: open.clone() }), 1, None);
        let project = project(&[30]);
        let (spec, plan) = job(&project, RenderQuality::Draft);
        let blocker = handle.submit(spec, plan.clone()).unwrap();
        let queued = handle.submit(spec, plan).unwrap();

        // Wait for the blocker to occupy the only worker.
        while handle.poll(&blocker).unwrap().status != JobStatus::Running {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.cancel(&queued));
        let done = handle.wait(&queued, WAIT).unwrap();
        assert_eq!(done.status, JobStatus::Canceled);

        open.store(true, Ordering::SeqCst);
        let finished = handle.wait(&blocker, WAIT).unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.output_url, Some(format!("memory://{blocker}")));
    }

    #[test]
    fn jobs_are_recorded_in_the_project_db() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("p.db");
        let db = ProjectDb::open_or_create(&db_path).unwrap();
        let created = db
            .create_project("Recorded", VideoFormat::Square, None)
            .unwrap();
        let mut project = project(&[60]);
        project.id = created.id;
        project.format = VideoFormat::Square;

        let backend = Arc::new(ManifestBackend::new(dir.path().join("out")));
        let handle = JobsRuntime::start(backend, 1, Some(db_path.clone()));
        let (spec, plan) = job(&project, RenderQuality::Standard);
        let id = handle.submit(spec, plan).unwrap();
        let done = handle.wait(&id, WAIT).unwrap();
        assert_eq!(done.status, JobStatus::Completed);

        let row = db.get_render_job(id.as_str()).unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!(row.quality, "standard");
        assert_eq!(row.format, "square");
        assert_eq!(row.output_url, done.output_url);
    }

    #[test]
    fn unknown_jobs_poll_as_none() {
        let handle = JobsRuntime::start(Arc::new(Broken), 1, None);
        assert!(handle.poll(&JobId::new()).is_none());
        assert!(!handle.cancel(&JobId::new()));
    }
}
