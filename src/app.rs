use std::time::Duration;

use crate::api;
use crate::config::Config;
use crate::download::fetcher::{FetchLimits, Fetcher};
use crate::download::{TaskManager, TaskStore};

/// Wires the task manager to the API server and runs until the listener
/// stops.
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let packages_dir = cfg.packages_dir();
    tokio::fs::create_dir_all(&packages_dir).await?;
    tracing::info!(packages_dir = %packages_dir.display(), "package storage ready");

    let fetcher = Fetcher::new(
        FetchLimits {
            max_bytes: cfg.download.max_artifact_bytes,
            max_duration: Duration::from_secs(cfg.download.transfer_timeout_secs),
        },
        cfg.download.resume_restart_fallback,
    );
    let manager = TaskManager::new(
        TaskStore::new(),
        fetcher,
        packages_dir,
        cfg.download.min_account_hash_length,
        cfg.download.keep_failed_artifacts,
    );

    api::serve(&cfg, manager).await
}
