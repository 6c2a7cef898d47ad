// Application configuration
//
// Precedence: defaults < config file < environment < command-line flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::downloader::events::DEFAULT_RELAY_CAPACITY;
use crate::downloader::models::DEFAULT_TEMPLATE;

pub const ENV_YTDLP: &str = "YT_FETCH_YTDLP";
pub const ENV_FFMPEG: &str = "YT_FETCH_FFMPEG";
pub const ENV_PROXY: &str = "YT_FETCH_PROXY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub filename_template: String,
    pub history_path: PathBuf,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub proxy: Option<String>,
    /// Relay polling interval of the presentation loop
    pub poll_interval_ms: u64,
    pub relay_capacity: usize,
    /// Upper bound for one metadata lookup
    pub resolve_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            filename_template: DEFAULT_TEMPLATE.to_string(),
            history_path: PathBuf::from("download_history.json"),
            ytdlp_path: None,
            ffmpeg_path: None,
            proxy: None,
            poll_interval_ms: 100,
            relay_capacity: DEFAULT_RELAY_CAPACITY,
            resolve_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    /// `<config_dir>/yt-fetch/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("yt-fetch").join("config.json"))
    }

    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file yields defaults. Environment overrides are applied
    /// on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `YT_FETCH_*` overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty(ENV_YTDLP) {
            self.ytdlp_path = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(ENV_FFMPEG) {
            self.ffmpeg_path = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(ENV_PROXY) {
            self.proxy = Some(v);
        }
    }
}
