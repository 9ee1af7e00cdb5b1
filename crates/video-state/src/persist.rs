use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

use project::{EditReport, ProjectDb, ProjectId, ProjectStore};
use timeline::SceneEdit;

/// Outcome of one edit batch, reported after the fact. The editor never waits
/// on these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SyncEvent {
    Saved {
        batch: u64,
        report: EditReport,
    },
    Failed {
        batch: u64,
        error: String,
        retryable: bool,
    },
}

impl SyncEvent {
    pub fn batch(&self) -> u64 {
        match self {
            SyncEvent::Saved { batch, .. } | SyncEvent::Failed { batch, .. } => *batch,
        }
    }
}

#[derive(Debug, Clone)]
struct EditBatch {
    seq: u64,
    project_id: ProjectId,
    edits: Vec<SceneEdit>,
}

enum PersistMsg {
    Save(EditBatch),
    Retry,
    Shutdown,
}

#[derive(Clone)]
pub struct PersistHandle {
    tx: Sender<PersistMsg>,
    pub rx_events: Receiver<SyncEvent>,
    failed: Arc<Mutex<Vec<EditBatch>>>,
    next_seq: Arc<AtomicU64>,
}

/// Worker-side state. Batches are applied strictly in sequence order: once
/// one fails, every later batch is parked behind it until a retry succeeds.
struct Worker<S, F> {
    open: F,
    store: Option<S>,
    failed: Arc<Mutex<Vec<EditBatch>>>,
    tx_events: Sender<SyncEvent>,
}

impl<S, F> Worker<S, F>
where
    S: ProjectStore,
    F: Fn() -> Result<S>,
{
    fn run(mut self, rx: Receiver<PersistMsg>) {
        info!("persistence worker started");
        while let Ok(msg) = rx.recv() {
            match msg {
                PersistMsg::Save(batch) => self.save(batch),
                PersistMsg::Retry => self.retry(),
                PersistMsg::Shutdown => break,
            }
        }
        info!("persistence worker stopped");
    }

    fn save(&mut self, batch: EditBatch) {
        let blocker = self.failed.lock().iter().map(|b| b.seq).min();
        match blocker {
            Some(first) => self.park(batch, format!("waiting behind failed batch {first}")),
            None => {
                if let Err(error) = self.apply(&batch) {
                    self.park(batch, error);
                }
            }
        }
    }

    fn retry(&mut self) {
        let mut batches = std::mem::take(&mut *self.failed.lock());
        batches.sort_by_key(|b| b.seq);
        debug!(batches = batches.len(), "retrying failed batches");

        let mut pending = batches.into_iter();
        while let Some(batch) = pending.next() {
            if let Err(error) = self.apply(&batch) {
                let first = batch.seq;
                self.park(batch, error);
                for rest in pending.by_ref() {
                    self.park(rest, format!("waiting behind failed batch {first}"));
                }
            }
        }
    }

    fn apply(&mut self, batch: &EditBatch) -> Result<(), String> {
        if self.store.is_none() {
            match (self.open)() {
                Ok(s) => self.store = Some(s),
                Err(e) => {
                    warn!(batch = batch.seq, "failed to open project store: {e:#}");
                    return Err(e.to_string());
                }
            }
        }
        let Some(db) = self.store.as_ref() else {
            return Err("project store unavailable".into());
        };

        match db.apply_edits(batch.project_id, &batch.edits) {
            Ok(report) => {
                if !report.is_clean() {
                    warn!(batch = batch.seq, stale = report.stale.len(), "stale scene edits skipped");
                }
                debug!(batch = batch.seq, edits = batch.edits.len(), "edit batch saved");
                let _ = self.tx_events.send(SyncEvent::Saved {
                    batch: batch.seq,
                    report,
                });
                Ok(())
            }
            Err(e) => {
                warn!(batch = batch.seq, "failed to save edits: {e:#}");
                Err(e.to_string())
            }
        }
    }

    fn park(&self, batch: EditBatch, error: String) {
        let seq = batch.seq;
        self.failed.lock().push(batch);
        let _ = self.tx_events.send(SyncEvent::Failed {
            batch: seq,
            error,
            retryable: true,
        });
    }
}

pub struct PersistWorker;

impl PersistWorker {
    /// Persists into the project database at `db_path`, opened on the worker thread.
    pub fn start(db_path: PathBuf) -> PersistHandle {
        Self::start_with(move || ProjectDb::open_or_create(&db_path))
    }

    /// Runs the worker against any store. `open` is called on the worker
    /// thread, and again on the next batch if it failed.
    pub fn start_with<S, F>(open: F) -> PersistHandle
    where
        S: ProjectStore,
        F: Fn() -> Result<S> + Send + 'static,
    {
        let (tx, rx) = unbounded::<PersistMsg>();
        let (tx_events, rx_events) = unbounded::<SyncEvent>();
        let failed = Arc::new(Mutex::new(Vec::new()));

        let failed_w = failed.clone();
        thread::spawn(move || {
            Worker {
                open,
                store: None,
                failed: failed_w,
                tx_events,
            }
            .run(rx)
        });

        PersistHandle {
            tx,
            rx_events,
            failed,
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl PersistHandle {
    /// Queues a batch and returns its sequence number. Empty batches are dropped.
    /// While an earlier batch is failed, new ones are held back behind it.
    pub fn submit(&self, project_id: ProjectId, edits: Vec<SceneEdit>) -> Option<u64> {
        if edits.is_empty() {
            return None;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let batch = EditBatch {
            seq,
            project_id,
            edits,
        };
        if self.tx.send(PersistMsg::Save(batch.clone())).is_err() {
            warn!(batch = seq, "persistence worker is gone");
            self.failed.lock().push(batch);
        }
        Some(seq)
    }

    /// Batches held back by a failure, including those queued behind it.
    pub fn failed_count(&self) -> usize {
        self.failed.lock().len()
    }

    /// Asks the worker to replay held-back batches in sequence order. Stops at
    /// the first one that fails again. Returns how many were held back.
    pub fn retry_failed(&self) -> usize {
        let count = self.failed_count();
        if count > 0 && self.tx.send(PersistMsg::Retry).is_err() {
            warn!("persistence worker is gone");
        }
        count
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(PersistMsg::Shutdown);
    }
}
