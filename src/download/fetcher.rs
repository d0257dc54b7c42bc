use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::download::errors::FetchError;

pub type Result<T> = std::result::Result<T, FetchError>;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    pub max_bytes: u64,
    pub max_duration: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchProgress {
    /// Absolute bytes on disk, offset included.
    pub bytes: u64,
    pub total: Option<u64>,
    pub bytes_per_sec: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Complete { bytes: u64 },
    /// The token fired mid-transfer. Bytes written so far stay on disk so a
    /// later attempt can resume from them.
    Cancelled { bytes: u64 },
}

/// Streaming HTTP fetch with resume, size and wall-clock limits, and
/// cooperative cancellation checked between chunks.
pub struct Fetcher {
    client: reqwest::Client,
    limits: FetchLimits,
    restart_fallback: bool,
}

impl Fetcher {
    pub fn new(limits: FetchLimits, restart_fallback: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            limits,
            restart_fallback,
        }
    }

    /// Downloads `url` into `dest`, appending from `offset`. A non-zero
    /// offset requires a 206 from the upstream; a 200 means the server
    /// ignored the Range header, which restarts from zero only when the
    /// fallback is enabled.
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        offset: u64,
        cancel: &CancellationToken,
        progress: &watch::Sender<FetchProgress>,
    ) -> Result<FetchOutcome> {
        let started = Instant::now();
        let deadline = started + self.limits.max_duration;

        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let response = request
            .send()
            .await
            .map_err(|source| FetchError::Connect { source })?;

        let mut offset = offset;
        match (offset > 0, response.status()) {
            (false, s) if s.is_success() => {}
            (true, StatusCode::PARTIAL_CONTENT) => {}
            (true, StatusCode::OK) => {
                if !self.restart_fallback {
                    return Err(FetchError::RangeNotSupported);
                }
                tracing::warn!(url, "upstream ignored Range header, restarting from zero");
                offset = 0;
            }
            (_, s) => return Err(FetchError::Status { status: s.as_u16() }),
        }

        let total = response.content_length().map(|len| len + offset);
        if let Some(total) = total {
            if total > self.limits.max_bytes {
                return Err(FetchError::SizeExceeded {
                    limit: self.limits.max_bytes,
                    got: total,
                });
            }
        }

        let io_err = |source: std::io::Error| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(offset > 0)
            .truncate(offset == 0)
            .open(dest)
            .await
            .map_err(io_err)?;

        let mut stream = response.bytes_stream();
        let mut bytes = offset;
        let mut window_start = Instant::now();
        let mut window_bytes: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    file.flush().await.map_err(io_err)?;
                    return Ok(FetchOutcome::Cancelled { bytes });
                }
                _ = tokio::time::sleep_until(deadline.into()) => {
                    return Err(FetchError::Timeout {
                        limit_secs: self.limits.max_duration.as_secs(),
                    });
                }
                chunk = stream.next() => chunk,
            };

            let chunk = match chunk {
                Some(Ok(chunk)) => chunk,
                Some(Err(source)) => return Err(FetchError::Read { source }),
                None => break,
            };

            bytes += chunk.len() as u64;
            window_bytes += chunk.len() as u64;
            if bytes > self.limits.max_bytes {
                return Err(FetchError::SizeExceeded {
                    limit: self.limits.max_bytes,
                    got: bytes,
                });
            }

            file.write_all(&chunk).await.map_err(io_err)?;

            let elapsed = window_start.elapsed();
            if elapsed >= PROGRESS_INTERVAL {
                let _ = progress.send(FetchProgress {
                    bytes,
                    total,
                    bytes_per_sec: window_bytes as f64 / elapsed.as_secs_f64(),
                });
                window_start = Instant::now();
                window_bytes = 0;
            }
        }

        file.flush().await.map_err(io_err)?;
        let _ = progress.send(FetchProgress {
            bytes,
            total,
            bytes_per_sec: 0.0,
        });
        Ok(FetchOutcome::Complete { bytes })
    }
}
