use std::path::PathBuf;

use crate::download::task::TaskStatus;

/// Errors surfaced to API clients for task lifecycle operations.
#[derive(Debug)]
pub enum TaskError {
    Validation(String),
    NotFound,
    InvalidState {
        status: TaskStatus,
        action: &'static str,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::NotFound => write!(f, "Task not found"),
            Self::InvalidState { status, action } => {
                write!(f, "cannot {action} a task in state {status}")
            }
            Self::Io { path, .. } => write!(f, "io error on {}", path.display()),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors from the streaming transfer. Every variant renders to the operator-
/// facing `error` string recorded on a failed task.
#[derive(Debug)]
pub enum FetchError {
    Connect {
        source: reqwest::Error,
    },
    Status {
        status: u16,
    },
    /// Resume was requested but the upstream replied 200 instead of 206.
    RangeNotSupported,
    SizeExceeded {
        limit: u64,
        got: u64,
    },
    Timeout {
        limit_secs: u64,
    },
    Read {
        source: reqwest::Error,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { .. } => write!(f, "failed to connect to upstream"),
            Self::Status { status } => write!(f, "upstream returned HTTP {status}"),
            Self::RangeNotSupported => {
                write!(f, "upstream does not support resuming from an offset")
            }
            Self::SizeExceeded { limit, got } => {
                write!(f, "download exceeds size limit ({got} > {limit} bytes)")
            }
            Self::Timeout { limit_secs } => {
                write!(f, "transfer exceeded the {limit_secs}s time limit")
            }
            Self::Read { .. } => write!(f, "error reading from upstream"),
            Self::Io { path, .. } => write!(f, "io error writing {}", path.display()),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect { source } | Self::Read { source } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors from embedding license records into a finished archive.
#[derive(Debug)]
pub enum InjectError {
    MalformedArchive(String),
    BadLicenseRecord { id: u64 },
    Io { source: std::io::Error },
    Zip { source: zip::result::ZipError },
    Join,
}

impl std::fmt::Display for InjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedArchive(msg) => write!(f, "malformed app archive: {msg}"),
            Self::BadLicenseRecord { id } => {
                write!(f, "license record {id} is not valid base64")
            }
            Self::Io { .. } => write!(f, "io error during license injection"),
            Self::Zip { .. } => write!(f, "archive error during license injection"),
            Self::Join => write!(f, "injection worker panicked"),
        }
    }
}

impl std::error::Error for InjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source } => Some(source),
            Self::Zip { source } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for InjectError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}

impl From<zip::result::ZipError> for InjectError {
    fn from(source: zip::result::ZipError) -> Self {
        Self::Zip { source }
    }
}
