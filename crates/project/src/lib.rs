use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use timeline::{Scene, SceneEdit, SceneId, SceneList, ScenePayload, TimelineSettings};
use tracing::{debug, warn};

mod model;
pub use model::*;
mod store;
pub use store::*;

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("motion_studio")
}

pub fn default_db_path() -> PathBuf {
    app_data_dir().join("projects.db")
}

pub struct ProjectDb {
    conn: Connection,
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectInfo {
    pub id: ProjectId,
    pub title: String,
    pub format: VideoFormat,
    pub scene_count: usize,
    pub duration_frames: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Written,
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderJobRow {
    pub id: String,
    pub project_id: String,
    pub format: String,
    pub quality: String,
    pub status: String,
    pub progress: f64,
    pub output_url: Option<String>,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProjectDb {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open project db at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", &"WAL")?;
        conn.pragma_update(None, "synchronous", &"NORMAL")?;
        conn.pragma_update(None, "foreign_keys", &"ON")?;
        // Worker threads share the file with the editor.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", &"ON")?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn begin_tx(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    pub fn create_project(
        &self,
        title: &str,
        format: VideoFormat,
        background_color: Option<&str>,
    ) -> Result<Project> {
        let background = match background_color {
            Some(raw) => {
                normalize_color(raw).ok_or_else(|| anyhow!("invalid background color {raw:?}"))?
            }
            None => DEFAULT_BACKGROUND.to_string(),
        };
        let mut project = Project::new(title, format);
        project.background_color = background;

        let now = chrono::Utc::now().timestamp();
        let settings_json = serde_json::to_string(&project.settings)?;
        self.conn.execute(
            "INSERT INTO projects(id, title, format, background_color, settings_json, created_at, updated_at) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                project.id.to_string(),
                project.title,
                project.format.as_str(),
                project.background_color,
                settings_json,
                now
            ],
        )?;
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.title, p.format, p.updated_at, COUNT(s.id), COALESCE(SUM(s.duration_frames), 0) \
             FROM projects p LEFT JOIN scenes s ON s.project_id = p.id \
             GROUP BY p.id ORDER BY p.updated_at DESC, p.title ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, title, format, updated_at, count, duration) = row?;
            out.push(ProjectInfo {
                id: parse_project_id(&id)?,
                title,
                format: format.parse().unwrap_or_default(),
                scene_count: count.max(0) as usize,
                duration_frames: duration,
                updated_at,
            });
        }
        Ok(out)
    }

    /// Resolves a project by full id, id prefix, or exact title.
    pub fn find_project_id(&self, needle: &str) -> Result<Option<ProjectId>> {
        if let Some(id) = ProjectId::parse(needle) {
            return Ok(Some(id));
        }
        let mut matches = Vec::new();
        for info in self.list_projects()? {
            if info.title == needle || info.id.to_string().starts_with(needle) {
                matches.push(info.id);
            }
        }
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => bail!("{n} projects match {needle:?}; use the full id"),
        }
    }

    pub fn load(&self, id: ProjectId) -> Result<Option<Project>> {
        let row = self
            .conn
            .query_row(
                "SELECT title, format, background_color, settings_json FROM projects WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((title, format, background_color, settings_json)) = row else {
            return Ok(None);
        };

        let settings = parse_settings(&settings_json);
        let scenes = self.load_scenes(id)?;
        Ok(Some(Project {
            id,
            title,
            background_color,
            format: format.parse().unwrap_or_default(),
            settings,
            scenes,
        }))
    }

    fn load_scenes(&self, project_id: ProjectId) -> Result<SceneList> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, duration_frames, code, order_index, revision, trim_in \
             FROM scenes WHERE project_id = ?1 ORDER BY order_index ASC",
        )?;
        let rows = stmt.query_map(params![project_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;
        let mut scenes = Vec::new();
        for row in rows {
            let (id, name, duration, code, order, revision, trim_in) = row?;
            let id = SceneId::parse(&id).ok_or_else(|| anyhow!("corrupt scene id {id:?}"))?;
            let mut scene = Scene::new(name, duration, ScenePayload::new(code)).with_id(id);
            scene.order = order.max(0) as usize;
            scene.revision = revision.max(0) as u64;
            scene.trim_in = trim_in.max(0);
            scenes.push(scene);
        }
        Ok(SceneList::from_scenes(scenes))
    }

    pub fn insert_scene(&self, project_id: ProjectId, scene: &Scene) -> Result<()> {
        insert_scene_row(&self.conn, project_id, scene)?;
        touch_project(&self.conn, project_id)
    }

    pub fn upsert_scene(&self, project_id: ProjectId, scene: &Scene) -> Result<UpsertOutcome> {
        let outcome = upsert_scene_row(&self.conn, project_id, scene)?;
        touch_project(&self.conn, project_id)?;
        Ok(outcome)
    }

    pub fn delete_scene(&self, project_id: ProjectId, scene_id: SceneId) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM scenes WHERE id = ?1 AND project_id = ?2",
            params![scene_id.to_string(), project_id.to_string()],
        )?;
        touch_project(&self.conn, project_id)?;
        Ok(removed > 0)
    }

    pub fn reorder_scenes(&self, project_id: ProjectId, order: &[SceneId]) -> Result<()> {
        let tx = self.begin_tx()?;
        reorder_rows(&tx, project_id, order)?;
        touch_project(&tx, project_id)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_timeline_settings(&self, project_id: ProjectId) -> Result<TimelineSettings> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT settings_json FROM projects WHERE id = ?1",
                params![project_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|s| parse_settings(&s)).unwrap_or_default())
    }

    pub fn update_timeline_settings(
        &self,
        project_id: ProjectId,
        settings: &TimelineSettings,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let updated = self.conn.execute(
            "UPDATE projects SET settings_json = ?2, updated_at = ?3 WHERE id = ?1",
            params![project_id.to_string(), serde_json::to_string(settings)?, now],
        )?;
        if updated == 0 {
            bail!("project not found: {project_id}");
        }
        Ok(())
    }

    pub fn delete_project(&self, project_id: ProjectId) -> Result<bool> {
        let tx = self.begin_tx()?;
        tx.execute(
            "DELETE FROM render_jobs WHERE project_id = ?1",
            params![project_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM scenes WHERE project_id = ?1",
            params![project_id.to_string()],
        )?;
        let removed = tx.execute(
            "DELETE FROM projects WHERE id = ?1",
            params![project_id.to_string()],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn insert_render_job(
        &self,
        job_id: &str,
        project_id: ProjectId,
        format: &str,
        quality: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO render_jobs(id, project_id, format, quality, status, progress, created_at, updated_at) VALUES(?1, ?2, ?3, ?4, 'pending', 0, ?5, ?5)",
            params![job_id, project_id.to_string(), format, quality, now],
        )?;
        Ok(())
    }

    pub fn update_render_job(
        &self,
        job_id: &str,
        status: &str,
        progress: f64,
        output_url: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "UPDATE render_jobs SET status = ?2, progress = ?3, output_url = COALESCE(?4, output_url), error = COALESCE(?5, error), updated_at = ?6 WHERE id = ?1",
            params![job_id, status, progress, output_url, error, now],
        )?;
        Ok(())
    }

    pub fn get_render_job(&self, job_id: &str) -> Result<Option<RenderJobRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, format, quality, status, progress, output_url, error, created_at, updated_at \
             FROM render_jobs WHERE id = ?1 LIMIT 1",
        )?;
        let row = stmt.query_row(params![job_id], render_job_from_row).optional()?;
        Ok(row)
    }

    pub fn list_render_jobs(&self, project_id: ProjectId) -> Result<Vec<RenderJobRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, format, quality, status, progress, output_url, error, created_at, updated_at \
             FROM render_jobs WHERE project_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![project_id.to_string()], render_job_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Jobs left pending or running by a previous process are failed, not resumed.
    pub fn fail_interrupted_render_jobs(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let n = self.conn.execute(
            "UPDATE render_jobs SET status = 'failed', error = 'interrupted', updated_at = ?1 WHERE status IN ('pending', 'running')",
            params![now],
        )?;
        Ok(n)
    }
}

impl ProjectStore for ProjectDb {
    fn load_project(&self, id: ProjectId) -> Result<Option<Project>> {
        self.load(id)
    }

    fn apply_edits(&self, project_id: ProjectId, edits: &[SceneEdit]) -> Result<EditReport> {
        let tx = self.begin_tx()?;
        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM projects WHERE id = ?1",
                params![project_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            bail!("project not found: {project_id}");
        }

        let mut report = EditReport::default();
        for edit in edits {
            match edit {
                SceneEdit::Upsert { scene } => match upsert_scene_row(&tx, project_id, scene)? {
                    UpsertOutcome::Written => report.written += 1,
                    UpsertOutcome::Stale => {
                        warn!(scene_id = %scene.id, revision = scene.revision, "stale scene upsert skipped");
                        report.stale.push(scene.id);
                    }
                },
                SceneEdit::Delete { scene_id } => {
                    report.deleted += tx.execute(
                        "DELETE FROM scenes WHERE id = ?1 AND project_id = ?2",
                        params![scene_id.to_string(), project_id.to_string()],
                    )?;
                }
                SceneEdit::Reorder { order } => {
                    reorder_rows(&tx, project_id, order)?;
                    report.reordered = true;
                }
            }
        }
        touch_project(&tx, project_id)?;
        tx.commit()?;
        debug!(%project_id, edits = edits.len(), "applied scene edits");
        Ok(report)
    }
}

fn parse_project_id(raw: &str) -> Result<ProjectId> {
    ProjectId::parse(raw).ok_or_else(|| anyhow!("corrupt project id {raw:?}"))
}

fn parse_settings(raw: &str) -> TimelineSettings {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!(%err, "unreadable timeline settings, using defaults");
        TimelineSettings::default()
    })
}

fn touch_project(conn: &Connection, project_id: ProjectId) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "UPDATE projects SET updated_at = ?2 WHERE id = ?1",
        params![project_id.to_string(), now],
    )?;
    Ok(())
}

fn insert_scene_row(conn: &Connection, project_id: ProjectId, scene: &Scene) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO scenes(id, project_id, name, duration_frames, code, order_index, revision, trim_in, created_at, updated_at) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            scene.id.to_string(),
            project_id.to_string(),
            scene.name,
            scene.duration,
            scene.payload.code(),
            scene.order as i64,
            scene.revision as i64,
            scene.trim_in,
            now
        ],
    )?;
    Ok(())
}

fn upsert_scene_row(conn: &Connection, project_id: ProjectId, scene: &Scene) -> Result<UpsertOutcome> {
    let stored: Option<(String, i64)> = conn
        .query_row(
            "SELECT project_id, revision FROM scenes WHERE id = ?1",
            params![scene.id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match stored {
        None => {
            insert_scene_row(conn, project_id, scene)?;
            Ok(UpsertOutcome::Written)
        }
        Some((owner, _)) if owner != project_id.to_string() => {
            bail!("scene {} belongs to another project", scene.id)
        }
        Some((_, revision)) if revision > scene.revision as i64 => Ok(UpsertOutcome::Stale),
        Some(_) => {
            let now = chrono::Utc::now().timestamp();
            conn.execute(
                "UPDATE scenes SET name = ?2, duration_frames = ?3, code = ?4, order_index = ?5, revision = ?6, trim_in = ?7, updated_at = ?8 WHERE id = ?1",
                params![
                    scene.id.to_string(),
                    scene.name,
                    scene.duration,
                    scene.payload.code(),
                    scene.order as i64,
                    scene.revision as i64,
                    scene.trim_in,
                    now
                ],
            )?;
            Ok(UpsertOutcome::Written)
        }
    }
}

fn reorder_rows(conn: &Connection, project_id: ProjectId, order: &[SceneId]) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let mut stmt = conn.prepare(
        "UPDATE scenes SET order_index = ?3, updated_at = ?4 WHERE id = ?1 AND project_id = ?2",
    )?;
    for (index, scene_id) in order.iter().enumerate() {
        stmt.execute(params![
            scene_id.to_string(),
            project_id.to_string(),
            index as i64,
            now
        ])?;
    }
    Ok(())
}

fn render_job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RenderJobRow> {
    Ok(RenderJobRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        format: row.get(2)?,
        quality: row.get(3)?,
        status: row.get(4)?,
        progress: row.get(5)?,
        output_url: row.get(6)?,
        error: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn ensure_column(conn: &Connection, table: &str, column: &str, alter_sql: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    let mut exists = false;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name.eq_ignore_ascii_case(column) {
            exists = true;
            break;
        }
    }
    if !exists {
        conn.execute(alter_sql, [])?;
    }
    Ok(())
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(include_str!("../migrations/V0001__init.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0001__init"],
    )?;
    // Render job history (V0002)
    conn.execute_batch(include_str!("../migrations/V0002__render_jobs.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0002__render_jobs"],
    )?;
    ensure_column(
        conn,
        "scenes",
        "trim_in",
        "ALTER TABLE scenes ADD COLUMN trim_in INTEGER NOT NULL DEFAULT 0",
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0003__scene_trim"],
    )?;
    Ok(())
}
