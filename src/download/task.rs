use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Downloading,
    Injecting,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Allowed lifecycle moves. Terminal states accept nothing; everything
    /// non-terminal may fail.
    pub fn can_transition(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Queued, Downloading) => true,
            (Downloading, Injecting) => true,
            (Downloading, Paused) => true,
            (Paused, Downloading) => true,
            (Injecting, Completed) => true,
            (Queued | Downloading | Injecting | Paused, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Injecting => "injecting",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One per-device license record to embed into the archive. The `sinf` field
/// is base64 as supplied by the license-acquisition client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinfRecord {
    pub id: u64,
    pub sinf: String,
}

/// In-memory record of one download-and-inject job. Serialization to the API
/// happens through dedicated DTOs, never from this struct, so server-side
/// fields (file path, license material) cannot leak.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub id: String,
    pub account_hash: String,
    pub software: Value,
    pub download_url: String,
    pub sinfs: Vec<SinfRecord>,
    pub itunes_metadata: Value,
    pub status: TaskStatus,
    /// 0..=100, monotonically non-decreasing per attempt.
    pub progress: u8,
    pub speed: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub file_path: Option<PathBuf>,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
}

impl DownloadTask {
    pub fn new(
        account_hash: String,
        software: Value,
        download_url: String,
        sinfs: Vec<SinfRecord>,
        itunes_metadata: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_hash,
            software,
            download_url,
            sinfs,
            itunes_metadata,
            status: TaskStatus::Queued,
            progress: 0,
            speed: String::new(),
            error: None,
            created_at: Utc::now(),
            file_path: None,
            bytes_downloaded: 0,
            total_bytes: None,
        }
    }
}
