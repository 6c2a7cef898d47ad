// Common data models for the download pipeline

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::JobError;

/// Template used when the user does not supply one.
pub const DEFAULT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Output container the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Video,
    Audio,
}

impl MediaFormat {
    /// Label recorded in history ("mp4" / "mp3")
    pub fn label(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }

    pub fn default_quality(&self) -> Quality {
        match self {
            Self::Video => Quality::Video(VideoQuality::Best),
            Self::Audio => Quality::Audio(AudioBitrate::Kbps192),
        }
    }
}

impl FromStr for MediaFormat {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" | "mp4" => Ok(Self::Video),
            "audio" | "mp3" => Ok(Self::Audio),
            other => Err(JobError::InvalidRequest(format!(
                "unknown format '{}': expected video (mp4) or audio (mp3)",
                other
            ))),
        }
    }
}

/// Resolution tiers for video jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoQuality {
    Best,
    P1080,
    P720,
    P480,
}

impl VideoQuality {
    /// Maximum height passed to the format selector. `Best` has no ceiling.
    pub fn height_ceiling(&self) -> Option<u32> {
        match self {
            Self::Best => None,
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::P480 => "480p",
        }
    }
}

/// Bitrate tiers for audio jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBitrate {
    Kbps320,
    Kbps192,
    Kbps128,
    Kbps64,
}

impl AudioBitrate {
    pub fn kbps(&self) -> u32 {
        match self {
            Self::Kbps320 => 320,
            Self::Kbps192 => 192,
            Self::Kbps128 => 128,
            Self::Kbps64 => 64,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Kbps320 => "320kbps",
            Self::Kbps192 => "192kbps",
            Self::Kbps128 => "128kbps",
            Self::Kbps64 => "64kbps",
        }
    }
}

/// Quality selection. The variant fixes the format domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Video(VideoQuality),
    Audio(AudioBitrate),
}

impl Quality {
    /// Parse a user-supplied quality within the domain of `format`.
    ///
    /// Accepts `best`, `1080p`, `720p`, `480p` (the `p` is optional) for
    /// video and `320`, `192`, `128`, `64` with an optional `k`/`kbps`
    /// suffix for audio.
    pub fn parse(format: MediaFormat, value: &str) -> Result<Self, JobError> {
        let v = value.trim().to_lowercase();
        let parsed = match format {
            MediaFormat::Video => match v.trim_end_matches('p') {
                "best" => Some(Self::Video(VideoQuality::Best)),
                "1080" => Some(Self::Video(VideoQuality::P1080)),
                "720" => Some(Self::Video(VideoQuality::P720)),
                "480" => Some(Self::Video(VideoQuality::P480)),
                _ => None,
            },
            MediaFormat::Audio => match v.trim_end_matches("kbps").trim_end_matches('k') {
                "320" => Some(Self::Audio(AudioBitrate::Kbps320)),
                "192" => Some(Self::Audio(AudioBitrate::Kbps192)),
                "128" => Some(Self::Audio(AudioBitrate::Kbps128)),
                "64" => Some(Self::Audio(AudioBitrate::Kbps64)),
                _ => None,
            },
        };

        parsed.ok_or_else(|| {
            let expected = match format {
                MediaFormat::Video => "best, 1080p, 720p, 480p",
                MediaFormat::Audio => "320, 192, 128, 64 (kbps)",
            };
            JobError::InvalidRequest(format!(
                "quality '{}' is not valid for {}; expected one of {}",
                value,
                format.label(),
                expected
            ))
        })
    }

    pub fn format(&self) -> MediaFormat {
        match self {
            Self::Video(_) => MediaFormat::Video,
            Self::Audio(_) => MediaFormat::Audio,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Video(q) => q.label(),
            Self::Audio(b) => b.label(),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One user-initiated download request
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub url: String,
    pub is_playlist: bool,
    /// 1-based first playlist entry
    pub start_index: u32,
    /// 1-based last playlist entry, `None` = through the end
    pub end_index: Option<u32>,
    pub format: MediaFormat,
    pub quality: Quality,
    pub filename_template: String,
    pub output_directory: PathBuf,
}

impl JobRequest {
    pub fn new(url: impl Into<String>, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            is_playlist: false,
            start_index: 1,
            end_index: None,
            format: MediaFormat::Video,
            quality: MediaFormat::Video.default_quality(),
            filename_template: DEFAULT_TEMPLATE.to_string(),
            output_directory: output_directory.into(),
        }
    }

    pub fn playlist(mut self, start: u32, end: Option<u32>) -> Self {
        self.is_playlist = true;
        self.start_index = start;
        self.end_index = end;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.format = quality.format();
        self.quality = quality;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.filename_template = template.into();
        self
    }
}

/// Metadata of a single video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub duration_seconds: u64,
}

impl MediaInfo {
    /// Duration as `HH:MM:SS`
    pub fn formatted_duration(&self) -> String {
        let hours = self.duration_seconds / 3600;
        let minutes = (self.duration_seconds % 3600) / 60;
        let seconds = self.duration_seconds % 60;
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Playlist summary with the range that will actually be downloaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub title: String,
    pub entry_count: u32,
    /// Inclusive 1-based `[start, end]`
    pub resolved_range: (u32, u32),
}

impl PlaylistInfo {
    pub fn item_count(&self) -> u32 {
        let (start, end) = self.resolved_range;
        end + 1 - start
    }
}

/// Resolved metadata for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobInfo {
    Media(MediaInfo),
    Playlist(PlaylistInfo),
}

impl JobInfo {
    pub fn title(&self) -> &str {
        match self {
            Self::Media(m) => &m.title,
            Self::Playlist(p) => &p.title,
        }
    }

    pub fn item_count(&self) -> u32 {
        match self {
            Self::Media(_) => 1,
            Self::Playlist(p) => p.item_count(),
        }
    }
}

/// Where an item sits within its job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPosition {
    /// 1-based position within the job
    pub position: u32,
    /// 1-based index within the playlist, absent for single videos
    pub playlist_index: Option<u32>,
    /// Number of items in the job
    pub total: u32,
}

impl ItemPosition {
    pub fn single() -> Self {
        Self {
            position: 1,
            playlist_index: None,
            total: 1,
        }
    }
}

/// Retry, timeout and pacing constants handed to yt-dlp with every job.
///
/// These are policy, not user settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub fragment_retries: u32,
    /// Exponential backoff between fragment retries: base and cap, seconds
    pub fragment_backoff: (u32, u32),
    pub extractor_retries: u32,
    pub socket_timeout_secs: u32,
    /// Random sleep before each download: min and max, seconds
    pub sleep_interval: (u32, u32),
    pub concurrent_fragments: u32,
    /// Speed below which yt-dlp assumes throttling and re-extracts
    pub throttled_rate: &'static str,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 10,
            fragment_retries: 10,
            fragment_backoff: (5, 60),
            extractor_retries: 3,
            socket_timeout_secs: 30,
            sleep_interval: (5, 30),
            concurrent_fragments: 3,
            throttled_rate: "100K",
        }
    }
}
