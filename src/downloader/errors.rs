// Error types for the download pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single download job.
///
/// Payloads are plain strings so the error can be cloned into an
/// `Error` event and still be returned to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// URL invalid or metadata fetch failed
    #[error("could not resolve {url}: {reason}")]
    Resolution { url: String, reason: String },

    /// An external tool needed by the job is not installed
    #[error("{tool} is required for {purpose} but was not found. Install it or set its path in the config")]
    MissingDependency {
        tool: &'static str,
        purpose: &'static str,
    },

    /// Request options are inconsistent (range, quality domain, empty URL)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// yt-dlp gave up after its own retries, or could not be launched
    #[error("download failed: {0}")]
    Download(String),

    /// Output directory could not be prepared
    #[error("filesystem error at {}: {reason}", path.display())]
    Filesystem { path: PathBuf, reason: String },

    /// Another job is still running
    #[error("a download is already in progress")]
    Busy,
}

impl JobError {
    pub fn resolution(url: &str, reason: impl Into<String>) -> Self {
        Self::Resolution {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Whether a playlist job may skip the failing item and keep going.
    pub fn is_item_level(&self) -> bool {
        matches!(self, Self::Download(_))
    }
}

/// History read/write failure. Never fatal to a download.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("history I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history file {} is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
