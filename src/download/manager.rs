use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::download::errors::TaskError;
use crate::download::fetcher::{FetchOutcome, FetchProgress, Fetcher};
use crate::download::injector;
use crate::download::store::TaskStore;
use crate::download::task::{DownloadTask, SinfRecord, TaskStatus};

pub type Result<T> = std::result::Result<T, TaskError>;

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct CreateTask {
    pub account_hash: String,
    pub software: Value,
    pub download_url: String,
    pub sinfs: Vec<SinfRecord>,
    pub itunes_metadata: Value,
}

/// One in-flight transfer. The generation lets a finished job clean up its
/// own table entry without clobbering a successor started by resume.
struct JobHandle {
    generation: u64,
    token: CancellationToken,
}

/// Owns the task lifecycle: spawns one transfer job per active task, holds
/// the per-task cancellation tokens, and pushes task snapshots onto a
/// broadcast channel for the progress stream.
///
/// Cheap to clone; all clones share the same store and job table.
#[derive(Clone)]
pub struct TaskManager {
    store: TaskStore,
    fetcher: Arc<Fetcher>,
    packages_dir: PathBuf,
    min_hash_len: usize,
    keep_failed: bool,
    events_tx: broadcast::Sender<DownloadTask>,
    jobs: Arc<Mutex<HashMap<String, JobHandle>>>,
    job_seq: Arc<AtomicU64>,
}

impl TaskManager {
    pub fn new(
        store: TaskStore,
        fetcher: Fetcher,
        packages_dir: PathBuf,
        min_hash_len: usize,
        keep_failed: bool,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            fetcher: Arc::new(fetcher),
            packages_dir,
            min_hash_len,
            keep_failed,
            events_tx,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            job_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadTask> {
        self.events_tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.packages_dir.join(format!("{id}.ipa"))
    }

    pub fn packages_dir(&self) -> &PathBuf {
        &self.packages_dir
    }

    /// Validates the request, registers a queued task, and kicks off its
    /// transfer job. Returns immediately; progress arrives via the store and
    /// the event stream.
    pub async fn create(&self, req: CreateTask) -> Result<DownloadTask> {
        self.validate(&req)?;

        let task = DownloadTask::new(
            req.account_hash,
            req.software,
            req.download_url,
            req.sinfs,
            req.itunes_metadata,
        );
        let id = task.id.clone();
        self.store.insert(task.clone()).await;
        self.broadcast(&task);
        tracing::info!(task_id = %id, "download task created");

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_transfer(id, 0).await;
        });
        Ok(task)
    }

    pub async fn list(&self, account_hash: Option<&str>) -> Vec<DownloadTask> {
        self.store.list(account_hash).await
    }

    pub async fn get(&self, id: &str, account_hash: &str) -> Result<DownloadTask> {
        self.store.get(id, account_hash).await
    }

    /// Lookup by task id alone, for the delivery routes.
    pub async fn get_unscoped(&self, id: &str) -> Result<DownloadTask> {
        self.store.get_any(id).await
    }

    /// Stops the transfer and parks the task. Partial bytes stay on disk.
    pub async fn pause(&self, id: &str, account_hash: &str) -> Result<DownloadTask> {
        self.store.get(id, account_hash).await?;
        let task = self.store.transition(id, TaskStatus::Paused, "pause").await?;
        if let Some(job) = self.jobs.lock().await.remove(id) {
            job.token.cancel();
        }
        self.broadcast(&task);
        tracing::info!(task_id = %id, "download paused");
        Ok(task)
    }

    /// Restarts a paused transfer from the bytes already on disk.
    pub async fn resume(&self, id: &str, account_hash: &str) -> Result<DownloadTask> {
        let task = self.store.get(id, account_hash).await?;
        if task.status != TaskStatus::Paused {
            return Err(TaskError::InvalidState {
                status: task.status,
                action: "resume",
            });
        }

        let dest = self.artifact_path(id);
        let offset = match tokio::fs::metadata(&dest).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let manager = self.clone();
        let id_owned = id.to_string();
        tokio::spawn(async move {
            manager.run_transfer(id_owned, offset).await;
        });
        tracing::info!(task_id = %id, offset, "download resuming");
        Ok(task)
    }

    /// Removes the task and its artifact. An in-flight transfer is cancelled
    /// first; the cancellation is never recorded as a failure.
    pub async fn delete(&self, id: &str, account_hash: &str) -> Result<()> {
        let task = self.store.remove(id, account_hash).await?;
        if let Some(job) = self.jobs.lock().await.remove(id) {
            job.token.cancel();
        }

        let dest = self.artifact_path(&task.id);
        if let Err(err) = tokio::fs::remove_file(&dest).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(task_id = %id, error = %err, "failed to remove artifact");
            }
        }
        tracing::info!(task_id = %id, "download task deleted");
        Ok(())
    }

    fn validate(&self, req: &CreateTask) -> Result<()> {
        if req.account_hash.len() < self.min_hash_len {
            return Err(TaskError::Validation(format!(
                "accountHash must be at least {} characters",
                self.min_hash_len
            )));
        }
        let url = reqwest::Url::parse(&req.download_url)
            .map_err(|_| TaskError::Validation("downloadURL is not a valid URL".to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TaskError::Validation(
                "downloadURL must use http or https".to_string(),
            ));
        }
        if req.sinfs.is_empty() {
            return Err(TaskError::Validation(
                "sinfs must contain at least one license record".to_string(),
            ));
        }
        if req.software.is_null() {
            return Err(TaskError::Validation(
                "software metadata is required".to_string(),
            ));
        }
        Ok(())
    }

    fn broadcast(&self, task: &DownloadTask) {
        // nobody listening is fine
        let _ = self.events_tx.send(task.clone());
    }

    async fn run_transfer(self, id: String, offset: u64) {
        // the token must be discoverable before the task shows as
        // downloading, or a pause could miss the job entirely
        let generation = self.job_seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut jobs = self.jobs.lock().await;
            if jobs.contains_key(&id) {
                tracing::debug!(task_id = %id, "transfer already active");
                return;
            }
            jobs.insert(
                id.clone(),
                JobHandle {
                    generation,
                    token: token.clone(),
                },
            );
        }

        let action = if offset == 0 { "start" } else { "resume" };
        let task = match self
            .store
            .transition(&id, TaskStatus::Downloading, action)
            .await
        {
            Ok(task) => task,
            // deleted or raced by another operation before we got going
            Err(err) => {
                tracing::debug!(task_id = %id, error = %err, "transfer job not started");
                self.remove_job(&id, generation).await;
                return;
            }
        };
        self.broadcast(&task);

        let dest = self.artifact_path(&id);
        let (progress_tx, progress_rx) = watch::channel(FetchProgress {
            bytes: offset,
            total: None,
            bytes_per_sec: 0.0,
        });
        let pump = self.spawn_progress_pump(id.clone(), progress_rx);

        let result = self
            .fetcher
            .fetch(&task.download_url, &dest, offset, &token, &progress_tx)
            .await;
        drop(progress_tx);
        let _ = pump.await;
        self.remove_job(&id, generation).await;

        match result {
            Ok(FetchOutcome::Cancelled { bytes }) => {
                // pause or delete already moved the task; just record bytes
                let _ = self
                    .store
                    .update(&id, |t| t.bytes_downloaded = bytes)
                    .await;
            }
            Ok(FetchOutcome::Complete { bytes }) => {
                if token.is_cancelled() {
                    return;
                }
                if let Err(message) = self.finish(&id, &task, &dest, bytes).await {
                    self.fail(&id, message, &dest).await;
                }
            }
            Err(err) => {
                if token.is_cancelled() {
                    return;
                }
                self.fail(&id, err.to_string(), &dest).await;
            }
        }
    }

    /// Drops the job table entry only if it still belongs to this job.
    async fn remove_job(&self, id: &str, generation: u64) {
        let mut jobs = self.jobs.lock().await;
        if jobs.get(id).map(|j| j.generation) == Some(generation) {
            jobs.remove(id);
        }
    }

    fn spawn_progress_pump(
        &self,
        id: String,
        mut progress_rx: watch::Receiver<FetchProgress>,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            while progress_rx.changed().await.is_ok() {
                let p = *progress_rx.borrow();
                let updated = store
                    .update(&id, |t| {
                        t.bytes_downloaded = p.bytes;
                        if p.total.is_some() {
                            t.total_bytes = p.total;
                        }
                        if let Some(total) = t.total_bytes {
                            if total > 0 {
                                // injection still follows, hold 100 back
                                let pct = ((p.bytes * 100) / total).min(99) as u8;
                                t.progress = t.progress.max(pct);
                            }
                        }
                        if t.status == TaskStatus::Downloading {
                            t.speed = format_speed(p.bytes_per_sec);
                        }
                    })
                    .await;
                if let Ok(task) = updated {
                    let _ = events_tx.send(task);
                }
            }
        })
    }

    async fn finish(
        &self,
        id: &str,
        task: &DownloadTask,
        dest: &std::path::Path,
        bytes: u64,
    ) -> std::result::Result<(), String> {
        // a pause or delete that raced the final bytes wins; not a failure
        let injecting = match self
            .store
            .transition(id, TaskStatus::Injecting, "inject")
            .await
        {
            Ok(task) => task,
            Err(err) => {
                tracing::debug!(task_id = %id, error = %err, "injection skipped");
                return Ok(());
            }
        };
        self.broadcast(&injecting);

        injector::inject(dest, &task.sinfs, &task.itunes_metadata)
            .await
            .map_err(|err| err.to_string())?;

        let _ = self
            .store
            .update(id, |t| {
                t.file_path = Some(dest.to_path_buf());
                t.bytes_downloaded = bytes;
                t.total_bytes = Some(bytes);
                t.progress = 100;
                t.speed = String::new();
            })
            .await;
        let completed = self
            .store
            .transition(id, TaskStatus::Completed, "complete")
            .await
            .map_err(|err| err.to_string())?;
        self.broadcast(&completed);
        tracing::info!(task_id = %id, bytes, "download completed");
        Ok(())
    }

    async fn fail(&self, id: &str, message: String, dest: &std::path::Path) {
        tracing::warn!(task_id = %id, error = %message, "download failed");
        // transition and update can only fail if the task was deleted
        let _ = self.store.transition(id, TaskStatus::Failed, "fail").await;
        if let Ok(task) = self
            .store
            .update(id, |t| {
                t.error = Some(message.clone());
                t.speed = String::new();
            })
            .await
        {
            self.broadcast(&task);
        }

        if !self.keep_failed {
            let _ = tokio::fs::remove_file(dest).await;
        }
    }
}

fn format_speed(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    if bytes_per_sec >= GB {
        format!("{:.1} GB/s", bytes_per_sec / GB)
    } else if bytes_per_sec >= MB {
        format!("{:.1} MB/s", bytes_per_sec / MB)
    } else if bytes_per_sec >= KB {
        format!("{:.1} KB/s", bytes_per_sec / KB)
    } else {
        format!("{bytes_per_sec:.0} B/s")
    }
}
