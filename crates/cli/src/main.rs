use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use timeline::timecode::{format_seconds, Timecode};
use timeline::{Scene, SceneId, ScenePayload, TrimEdge};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jobs::{JobStatus, JobsRuntime, ManifestBackend, RenderJobSpec, RenderPlan, RenderQuality};
use project::{ProjectDb, ProjectStore, VideoFormat};
use video_state::VideoStateStore;

#[derive(Parser)]
#[command(name = "motion-cli")]
#[command(about = "Motion Studio CLI - headless scene timeline editing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project database (defaults to the app data directory)
    #[arg(long, global = true, env = "MOTION_DB")]
    db: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Edge {
    Start,
    End,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project
    New {
        title: String,

        /// landscape, portrait or square
        #[arg(long, default_value = "landscape")]
        format: VideoFormat,

        /// Background color as #rgb or #rrggbb
        #[arg(long)]
        background: Option<String>,
    },

    /// List projects
    List,

    /// Show a project's scenes and derived timing
    Show { project: String },

    /// Append or insert a scene
    AddScene {
        project: String,

        #[arg(long)]
        name: String,

        /// Frames, or HH:MM:SS:FF
        #[arg(long)]
        duration: String,

        /// Scene code
        #[arg(long, conflicts_with = "code_file")]
        code: Option<String>,

        /// Read scene code from a file
        #[arg(long)]
        code_file: Option<PathBuf>,

        /// 1-based position; appends when omitted
        #[arg(long)]
        at: Option<usize>,
    },

    /// Split a scene at its midpoint
    Cut {
        project: String,
        /// 1-based position or scene id prefix
        scene: String,
    },

    /// Remove a scene
    Delete { project: String, scene: String },

    /// Move a scene edge by a signed number of frames
    Trim {
        project: String,
        scene: String,

        #[arg(long, value_enum)]
        edge: Edge,

        #[arg(long, allow_hyphen_values = true)]
        by: i64,
    },

    /// Move a scene to a new 1-based position
    Move {
        project: String,
        scene: String,

        #[arg(long)]
        to: usize,
    },

    /// Resolve the playhead at a fraction of the track or at a timecode
    Scrub {
        project: String,

        #[arg(conflicts_with = "at", allow_hyphen_values = true)]
        fraction: Option<f64>,

        /// Frames, or HH:MM:SS:FF
        #[arg(long)]
        at: Option<String>,
    },

    /// Render a project through the job queue
    Render {
        project: String,

        #[arg(long, default_value = "standard")]
        quality: RenderQuality,

        /// Overrides the project's format
        #[arg(long)]
        format: Option<VideoFormat>,

        /// Output directory for render manifests
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long, default_value = "2")]
        workers: usize,

        /// Seconds to wait for the job
        #[arg(long, default_value = "120")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let fallback = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_path = cli.db.clone().unwrap_or_else(project::default_db_path);
    let db = ProjectDb::open_or_create(&db_path)
        .with_context(|| format!("open project database {}", db_path.display()))?;

    match cli.command {
        Commands::New {
            title,
            format,
            background,
        } => new_command(&db, &title, format, background.as_deref()).await,
        Commands::List => list_command(&db).await,
        Commands::Show { project } => show_command(&db, &project).await,
        Commands::AddScene {
            project,
            name,
            duration,
            code,
            code_file,
            at,
        } => add_scene_command(&db, &project, name, &duration, code, code_file, at).await,
        Commands::Cut { project, scene } => {
            edit_command(&db, &project, |store| {
                let id = resolve_scene(store, &scene)?;
                let (first, second) = store
                    .cut_scene(id)
                    .ok_or_else(|| anyhow!("scene {scene} is too short to cut"))?;
                info!("Cut into {} and {}", short(first), short(second));
                Ok(())
            })
            .await
        }
        Commands::Delete { project, scene } => {
            edit_command(&db, &project, |store| {
                let id = resolve_scene(store, &scene)?;
                let removed = store
                    .delete_scene(id)
                    .ok_or_else(|| anyhow!("failed to delete scene {scene}"))?;
                info!("Deleted '{}' ({} frames)", removed.name, removed.duration);
                Ok(())
            })
            .await
        }
        Commands::Trim {
            project,
            scene,
            edge,
            by,
        } => {
            edit_command(&db, &project, |store| {
                let id = resolve_scene(store, &scene)?;
                let edge = match edge {
                    Edge::Start => TrimEdge::Start,
                    Edge::End => TrimEdge::End,
                };
                let duration = store
                    .trim_scene(id, edge, by)
                    .ok_or_else(|| anyhow!("failed to trim scene {scene}"))?;
                info!("Scene {} is now {} frames", short(id), duration);
                Ok(())
            })
            .await
        }
        Commands::Move { project, scene, to } => {
            edit_command(&db, &project, |store| {
                let id = resolve_scene(store, &scene)?;
                if to == 0 {
                    bail!("positions start at 1");
                }
                let from = store
                    .move_scene(id, to - 1)
                    .ok_or_else(|| anyhow!("failed to move scene {scene}"))?;
                info!("Moved scene {} from {} to {}", short(id), from + 1, to);
                Ok(())
            })
            .await
        }
        Commands::Scrub {
            project,
            fraction,
            at,
        } => scrub_command(&db, &project, fraction, at.as_deref()).await,
        Commands::Render {
            project,
            quality,
            format,
            out,
            workers,
            timeout,
        } => render_command(&db, &project, quality, format, out, workers, timeout).await,
    }
}

fn load_store(db: &ProjectDb, needle: &str) -> Result<VideoStateStore> {
    let id = db
        .find_project_id(needle)?
        .ok_or_else(|| anyhow!("no project matches {needle:?}"))?;
    let project = db
        .load_project(id)?
        .ok_or_else(|| anyhow!("project not found: {id}"))?;
    Ok(VideoStateStore::new(project))
}

/// Loads the project, applies one edit, and writes the resulting edits back.
async fn edit_command(
    db: &ProjectDb,
    project: &str,
    op: impl FnOnce(&VideoStateStore) -> Result<()>,
) -> Result<()> {
    let store = load_store(db, project)?;
    op(&store)?;
    save(db, &store)?;
    print_scenes(&store);
    Ok(())
}

fn save(db: &ProjectDb, store: &VideoStateStore) -> Result<()> {
    let edits = store.take_pending_edits();
    if edits.is_empty() {
        return Ok(());
    }
    let report = db
        .apply_edits(store.project_id(), &edits)
        .context("save scene edits")?;
    if !report.is_clean() {
        warn!(
            "{} scene(s) changed elsewhere and were not overwritten",
            report.stale.len()
        );
    }
    info!(
        "Saved {} scene(s), removed {}",
        report.written, report.deleted
    );
    Ok(())
}

/// A number is a 1-based position; anything else is matched as an id prefix.
fn resolve_scene(store: &VideoStateStore, selector: &str) -> Result<SceneId> {
    let scenes = store.scenes();
    if let Ok(position) = selector.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|i| scenes.at(i))
            .map(|s| s.id)
            .ok_or_else(|| anyhow!("no scene at position {position}"));
    }
    let matches: Vec<SceneId> = scenes
        .iter()
        .filter(|s| s.id.to_string().starts_with(selector))
        .map(|s| s.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("no scene matches {selector:?}"),
        _ => bail!("{selector:?} matches {} scenes", matches.len()),
    }
}

fn short(id: SceneId) -> String {
    id.to_string().chars().take(8).collect()
}

fn print_scenes(store: &VideoStateStore) {
    let fps = store.settings().fps;
    let scenes = store.scenes();
    println!(
        "{} [{}] {} frames ({})",
        store.title(),
        store.format(),
        scenes.total_duration(),
        format_seconds(scenes.total_duration(), fps)
    );
    for (i, (id, span)) in scenes.spans().into_iter().enumerate() {
        let Some(scene) = scenes.get(id) else { continue };
        println!(
            "  {:>2}. {}  {}  {:>5}f  trim_in {:>4}  {}",
            i + 1,
            short(id),
            Timecode::from_frame(span.start, fps),
            span.duration,
            scene.trim_in,
            scene.name
        );
    }
}

async fn new_command(
    db: &ProjectDb,
    title: &str,
    format: VideoFormat,
    background: Option<&str>,
) -> Result<()> {
    let project = db.create_project(title, format, background)?;
    let (w, h) = project.dimensions();
    info!("Created project '{}' ({}x{})", project.title, w, h);
    println!("{}", project.id);
    Ok(())
}

async fn list_command(db: &ProjectDb) -> Result<()> {
    let projects = db.list_projects()?;
    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    for p in projects {
        let updated = chrono::DateTime::from_timestamp(p.updated_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{}  {:<10} {:>3} scenes {:>6}f  {}  {}",
            p.id, p.format, p.scene_count, p.duration_frames, updated, p.title
        );
    }
    Ok(())
}

async fn show_command(db: &ProjectDb, project: &str) -> Result<()> {
    let store = load_store(db, project)?;
    print_scenes(&store);
    Ok(())
}

async fn add_scene_command(
    db: &ProjectDb,
    project: &str,
    name: String,
    duration: &str,
    code: Option<String>,
    code_file: Option<PathBuf>,
    at: Option<usize>,
) -> Result<()> {
    let store = load_store(db, project)?;
    let fps = store.settings().fps;
    let frames = Timecode::parse(duration, fps)?.to_frame(fps);
    if frames < store.settings().min_scene_duration {
        bail!(
            "duration {frames} is below the minimum of {} frames",
            store.settings().min_scene_duration
        );
    }
    let code = match (code, code_file) {
        (Some(code), _) => code,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("read scene code from {}", path.display()))?,
        (None, None) => String::new(),
    };
    let index = match at {
        Some(0) => bail!("positions start at 1"),
        Some(n) => Some(n - 1),
        None => None,
    };

    let scene = Scene::new(name, frames, ScenePayload::new(code));
    let id = store
        .add_scene(scene, index)
        .ok_or_else(|| anyhow!("failed to add scene"))?;
    save(db, &store)?;
    info!("Added scene {}", short(id));
    print_scenes(&store);
    Ok(())
}

async fn scrub_command(
    db: &ProjectDb,
    project: &str,
    fraction: Option<f64>,
    at: Option<&str>,
) -> Result<()> {
    let store = load_store(db, project)?;
    let fps = store.settings().fps;
    let frame = match (fraction, at) {
        (Some(f), _) => store.scrub(f).unwrap_or_default(),
        (None, Some(tc)) => store.set_playhead(Timecode::parse(tc, fps)?.to_frame(fps)),
        (None, None) => bail!("give a fraction or --at"),
    };

    println!(
        "playhead {} ({}, frame {} of {})",
        Timecode::from_frame(frame, fps),
        format_seconds(frame, fps),
        frame,
        store.total_duration()
    );
    match store.resolve_playhead() {
        Some(pos) => {
            let name = store
                .scenes()
                .get(pos.scene_id)
                .map(|s| s.name.clone())
                .unwrap_or_default();
            println!(
                "scene {}. {} '{}' at +{} frames",
                pos.index + 1,
                short(pos.scene_id),
                name,
                pos.offset
            );
        }
        None => println!("no scenes"),
    }
    Ok(())
}

async fn render_command(
    db: &ProjectDb,
    project: &str,
    quality: RenderQuality,
    format: Option<VideoFormat>,
    out: Option<PathBuf>,
    workers: usize,
    timeout: u64,
) -> Result<()> {
    let store = load_store(db, project)?;
    let project = store.project();
    let spec = RenderJobSpec {
        project_id: project.id,
        format: format.unwrap_or(project.format),
        quality,
    };
    let plan = RenderPlan::from_project(&project, &spec);
    info!(
        "Rendering '{}' at {}x{} ({} kbps, {} frames)",
        plan.title, plan.width, plan.height, plan.bitrate_kbps, plan.total_frames
    );

    let out_dir = out.unwrap_or_else(|| project::app_data_dir().join("renders"));
    let backend = Arc::new(ManifestBackend::new(out_dir));
    let handle = JobsRuntime::start(backend, workers, Some(db.path().to_path_buf()));
    let job_id = handle.submit(spec, plan)?;

    let waiter = handle.clone();
    let id = job_id.clone();
    let snapshot = tokio::task::spawn_blocking(move || {
        let snapshot = waiter.wait(&id, Duration::from_secs(timeout))?;
        if snapshot.status.is_terminal() || !waiter.cancel(&id) {
            return Some(snapshot);
        }
        // Give the worker a moment to record the cancellation before exit.
        waiter.wait(&id, Duration::from_secs(2))
    })
    .await?
    .ok_or_else(|| anyhow!("render job {job_id} vanished"))?;
    handle.shutdown();

    match snapshot.status {
        JobStatus::Completed => {
            println!("{}", snapshot.output_url.unwrap_or_default());
            Ok(())
        }
        JobStatus::Failed => bail!(
            "render failed: {}",
            snapshot.error.unwrap_or_else(|| "unknown error".into())
        ),
        status => bail!("render did not finish (status {})", status.as_str()),
    }
}
