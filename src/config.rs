use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

fn default_port() -> u16 {
    8080
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_artifact_bytes() -> u64 {
    // 8 GiB. Signed store downloads for large games get close to this.
    8 * 1024 * 1024 * 1024
}
fn default_transfer_timeout_secs() -> u64 {
    // 8 hours of wall clock for a single transfer, resumes excluded.
    8 * 60 * 60
}
fn default_bag_timeout_secs() -> u64 {
    15
}
fn default_bag_max_bytes() -> u64 {
    1024 * 1024
}
fn default_min_account_hash_length() -> usize {
    8
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub download: DownloadConfig,
    pub general: GeneralConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Externally reachable origin (e.g. `https://pkg.example.com`). When set,
    /// install links always use it and proxy headers are ignored.
    pub public_base_url: String,
    /// Devices refuse OTA manifests over plain HTTP, so non-loopback requests
    /// are redirected to HTTPS unless this is set.
    pub disable_https_redirect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub max_artifact_bytes: u64,
    pub transfer_timeout_secs: u64,
    /// Restart a resume from byte zero when the upstream ignores Range
    /// requests. Off by default: a CDN that stops honoring ranges mid-task is
    /// treated as a hard failure.
    pub resume_restart_fallback: bool,
    /// Keep the raw (pre-injection) download around when injection fails.
    pub keep_failed_artifacts: bool,
    /// Handshake timeout and response cap for the license-acquisition client
    /// talking to the store's bag endpoint.
    pub bag_timeout_secs: u64,
    pub bag_max_bytes: u64,
    pub min_account_hash_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub data_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            public_base_url: String::new(),
            disable_https_redirect: false,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_artifact_bytes: default_max_artifact_bytes(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            resume_restart_fallback: false,
            keep_failed_artifacts: false,
            bag_timeout_secs: default_bag_timeout_secs(),
            bag_max_bytes: default_bag_max_bytes(),
            min_account_hash_length: default_min_account_hash_length(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Completed artifacts live under `<data_dir>/packages`; the delivery
    /// routes never serve anything outside this directory.
    pub fn packages_dir(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join("packages")
    }

    /// Environment overrides for the deployment-facing knobs, matching the
    /// variables the container image documents.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) if port != 0 => self.server.port = port,
                _ => tracing::warn!(value = %port, "ignoring invalid PORT override"),
            }
        }
        if let Ok(dir) = std::env::var("DATA_DIR") {
            if !dir.trim().is_empty() {
                self.general.data_dir = dir;
            }
        }
        if let Ok(url) = std::env::var("PUBLIC_BASE_URL") {
            self.server.public_base_url = url;
        }
        if let Ok(v) = std::env::var("UNSAFE_DANGEROUSLY_DISABLE_HTTPS_REDIRECT") {
            self.server.disable_https_redirect = v == "true";
        }
    }
}

pub fn init_tracing(config: &Config) {
    // RUST_LOG wins over the config file, e.g. RUST_LOG=info,otadrop=debug.
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .unwrap_or_else(|| config.general.log_level.clone());

    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.general.data_dir, "data");
        assert_eq!(cfg.download.max_artifact_bytes, 8 * 1024 * 1024 * 1024);
        assert_eq!(cfg.download.transfer_timeout_secs, 8 * 60 * 60);
        assert_eq!(cfg.download.bag_timeout_secs, 15);
        assert_eq!(cfg.download.bag_max_bytes, 1024 * 1024);
        assert_eq!(cfg.download.min_account_hash_length, 8);
        assert!(!cfg.server.disable_https_redirect);
        assert!(!cfg.download.resume_restart_fallback);
    }

    #[test]
    fn packages_dir_is_under_data_dir() {
        let mut cfg = Config::default();
        cfg.general.data_dir = "/srv/otadrop".to_string();
        assert_eq!(cfg.packages_dir(), PathBuf::from("/srv/otadrop/packages"));
    }
}
