// CLI metadata source - uses the native `yt-dlp` binary
//
// One `--dump-single-json` call per job. Playlists are enumerated flat, so
// only the playlist page is fetched, not every entry.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

use super::traits::{MetadataSource, RawMetadata};
use crate::downloader::diagnostics::describe_failure;
use crate::downloader::errors::JobError;
use crate::downloader::models::{MediaInfo, RetryPolicy};
use crate::downloader::utils::{proxy_args, run_output_with_timeout};

/// Metadata source backed by the yt-dlp binary
pub struct CliMetadataSource {
    ytdlp_path: PathBuf,
    proxy: Option<String>,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl CliMetadataSource {
    pub fn new(ytdlp_path: PathBuf, timeout_secs: u64) -> Self {
        Self {
            ytdlp_path,
            proxy: None,
            timeout_secs,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Build command arguments
    fn build_args(&self, url: &str, playlist: bool) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.retry.socket_timeout_secs.to_string(),
            "--extractor-retries".to_string(),
            self.retry.extractor_retries.to_string(),
        ];

        if playlist {
            args.push("--flat-playlist".to_string());
            args.push("--yes-playlist".to_string());
        } else {
            args.push("--no-playlist".to_string());
        }

        args.extend(proxy_args(self.proxy.as_deref()));

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MetadataSource for CliMetadataSource {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn fetch(&self, url: &str, playlist: bool) -> Result<RawMetadata, JobError> {
        let args = self.build_args(url, playlist);
        tracing::debug!(
            "[{}] {} {}",
            self.name(),
            self.ytdlp_path.display(),
            args.join(" ")
        );

        let output = run_output_with_timeout(&self.ytdlp_path, &args, self.timeout_secs)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => JobError::MissingDependency {
                    tool: "yt-dlp",
                    purpose: "metadata resolution",
                },
                _ => JobError::resolution(url, e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JobError::resolution(url, describe_failure(&stderr)));
        }

        parse_metadata(&output.stdout).map_err(|reason| JobError::resolution(url, reason))
    }
}

/// Parse the JSON document printed by `--dump-single-json`.
pub fn parse_metadata(stdout: &[u8]) -> Result<RawMetadata, String> {
    let json: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| format!("unreadable metadata from yt-dlp: {}", e))?;

    let is_playlist = json["_type"].as_str() == Some("playlist") || json["entries"].is_array();

    if is_playlist {
        let entry_count = match json["entries"].as_array() {
            Some(entries) => entries.len() as u64,
            None => json["playlist_count"].as_u64().unwrap_or(0),
        };
        return Ok(RawMetadata::Playlist {
            title: json["title"].as_str().unwrap_or("Playlist").to_string(),
            entry_count: u32::try_from(entry_count).unwrap_or(u32::MAX),
        });
    }

    Ok(RawMetadata::Media(MediaInfo {
        title: json["title"].as_str().unwrap_or("Unknown Title").to_string(),
        duration_seconds: json["duration"].as_f64().unwrap_or(0.0).max(0.0) as u64,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_video() {
        let json = br#"{"id":"abc","title":"A clip","duration":125.4,"uploader":"me"}"#;
        assert_eq!(
            parse_metadata(json).unwrap(),
            RawMetadata::Media(MediaInfo {
                title: "A clip".into(),
                duration_seconds: 125
            })
        );
    }

    #[test]
    fn missing_fields_fall_back() {
        assert_eq!(
            parse_metadata(b"{}").unwrap(),
            RawMetadata::Media(MediaInfo {
                title: "Unknown Title".into(),
                duration_seconds: 0
            })
        );
    }

    #[test]
    fn parses_flat_playlist() {
        let json = br#"{
            "_type": "playlist",
            "title": "My:Videos/2024",
            "playlist_count": 99,
            "entries": [
                {"_type": "url", "id": "a", "title": "one"},
                {"_type": "url", "id": "b", "title": "two"},
                {"_type": "url", "id": "c", "title": "three"}
            ]
        }"#;
        assert_eq!(
            parse_metadata(json).unwrap(),
            RawMetadata::Playlist {
                title: "My:Videos/2024".into(),
                entry_count: 3
            }
        );
    }

    #[test]
    fn playlist_count_is_used_without_entries() {
        let json = br#"{"_type": "playlist", "title": "P", "playlist_count": 7}"#;
        assert_eq!(
            parse_metadata(json).unwrap(),
            RawMetadata::Playlist {
                title: "P".into(),
                entry_count: 7
            }
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_metadata(b"ERROR: nope").is_err());
    }

    #[test]
    fn args_depend_on_playlist_mode() {
        let source = CliMetadataSource::new(PathBuf::from("yt-dlp"), 30)
            .with_proxy(Some("socks5://127.0.0.1:1080".into()));

        let args = source.build_args("https://youtube.com/playlist?list=x", true);
        assert!(args.contains(&"--flat-playlist".to_string()));
        assert!(!args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--proxy".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtube.com/playlist?list=x");

        let args = source.build_args("https://youtu.be/abc", false);
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(!args.contains(&"--flat-playlist".to_string()));
    }
}
