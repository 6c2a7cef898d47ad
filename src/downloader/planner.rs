// Job planning: user options -> concrete job descriptor
//
// Planning is synchronous and touches neither the network nor the disk, so a
// rejected request never starts a worker. Anything that depends on resolved
// metadata (the playlist subdirectory, the index prefix of the output
// template, the clamped range) is derived later in `JobDescriptor::bind` on
// the worker.

use std::path::PathBuf;

use regex::Regex;

use super::errors::JobError;
use super::models::{ItemPosition, JobInfo, JobRequest, MediaFormat, Quality, RetryPolicy};
use super::tools::Toolchain;

/// Placeholder that keeps playlist files sorted in original order
pub const PLAYLIST_INDEX_PREFIX: &str = "%(playlist_index)s. ";

const KNOWN_FIELDS: [&str; 5] = ["title", "ext", "id", "uploader", "playlist_index"];

lazy_static::lazy_static! {
    static ref ILLEGAL_PATH_CHARS: Regex = Regex::new(r#"[<>:"/\\|?*]"#).unwrap();
    static ref TEMPLATE_FIELD: Regex = Regex::new(r"%\((\w+)\)").unwrap();
}

/// yt-dlp `-f` expression plus the facts it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelection {
    pub expression: String,
    pub height_ceiling: Option<u32>,
    /// Separate video and audio streams merged by ffmpeg
    pub merged: bool,
}

/// Playlist range as requested, before it is checked against the entry count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: u32,
    pub end: Option<u32>,
}

impl RangeRequest {
    /// Checks that do not need the entry count: 1-based start, end not
    /// before start.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.start == 0 {
            return Err(JobError::InvalidRequest(
                "playlist start index is 1-based".to_string(),
            ));
        }
        if let Some(end) = self.end {
            if end < self.start {
                return Err(JobError::InvalidRequest(format!(
                    "playlist end {} is before start {}",
                    end, self.start
                )));
            }
        }
        Ok(())
    }
}

/// Everything the worker needs to run a job
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub url: String,
    pub format: MediaFormat,
    pub quality: Quality,
    pub selection: FormatSelection,
    /// mp3 target bitrate for audio jobs
    pub audio_kbps: Option<u32>,
    /// User output template; the playlist index prefix is added on bind
    pub template: String,
    pub output_root: PathBuf,
    pub playlist: Option<RangeRequest>,
    pub retry: RetryPolicy,
    pub ffmpeg_location: Option<PathBuf>,
    pub proxy: Option<String>,
}

impl JobDescriptor {
    pub fn is_playlist(&self) -> bool {
        self.playlist.is_some()
    }

    /// Directory the media files of `info` land in.
    pub fn output_dir_for(&self, info: &JobInfo) -> PathBuf {
        match info {
            JobInfo::Playlist(p) => self.output_root.join(sanitize_dir_name(&p.title)),
            JobInfo::Media(_) => self.output_root.clone(),
        }
    }

    /// Attach resolved metadata and create the output directory.
    ///
    /// The template gets its index prefix only when the URL really resolved
    /// to a playlist.
    pub async fn bind(&self, info: JobInfo) -> Result<BoundJob<'_>, JobError> {
        let output_dir = self.output_dir_for(&info);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| JobError::filesystem(&output_dir, &e))?;

        let template = derive_template(&self.template, matches!(info, JobInfo::Playlist(_)));
        Ok(BoundJob {
            descriptor: self,
            output_dir,
            template,
            info,
        })
    }
}

/// A descriptor tied to resolved metadata and a concrete output directory
#[derive(Debug, Clone)]
pub struct BoundJob<'a> {
    pub descriptor: &'a JobDescriptor,
    pub output_dir: PathBuf,
    /// Output template handed to yt-dlp
    pub template: String,
    pub info: JobInfo,
}

impl BoundJob<'_> {
    pub fn is_playlist(&self) -> bool {
        matches!(self.info, JobInfo::Playlist(_))
    }

    /// Items in download order.
    pub fn items(&self) -> Vec<ItemPosition> {
        match &self.info {
            JobInfo::Media(_) => vec![ItemPosition::single()],
            JobInfo::Playlist(p) => {
                let (start, end) = p.resolved_range;
                let total = p.item_count();
                (start..=end)
                    .enumerate()
                    .map(|(offset, index)| ItemPosition {
                        position: offset as u32 + 1,
                        playlist_index: Some(index),
                        total,
                    })
                    .collect()
            }
        }
    }
}

/// Turns a `JobRequest` into a `JobDescriptor`
#[derive(Debug, Clone)]
pub struct Planner<'a> {
    toolchain: &'a Toolchain,
    retry: RetryPolicy,
    proxy: Option<String>,
}

impl<'a> Planner<'a> {
    pub fn new(toolchain: &'a Toolchain) -> Self {
        Self {
            toolchain,
            retry: RetryPolicy::default(),
            proxy: None,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn plan(&self, request: &JobRequest) -> Result<JobDescriptor, JobError> {
        validate(request)?;

        let has_ffmpeg = self.toolchain.has_ffmpeg();
        if request.format == MediaFormat::Audio && !has_ffmpeg {
            return Err(JobError::MissingDependency {
                tool: "ffmpeg",
                purpose: "audio extraction",
            });
        }
        if request.format == MediaFormat::Video && !has_ffmpeg {
            tracing::warn!("ffmpeg not found: video will be fetched as a single pre-merged stream");
        }

        let playlist = request.is_playlist.then_some(RangeRequest {
            start: request.start_index,
            end: request.end_index,
        });

        let audio_kbps = match request.quality {
            Quality::Audio(bitrate) => Some(bitrate.kbps()),
            Quality::Video(_) => None,
        };

        Ok(JobDescriptor {
            url: request.url.trim().to_string(),
            format: request.format,
            quality: request.quality,
            selection: format_selection(request.quality, has_ffmpeg),
            audio_kbps,
            template: request.filename_template.trim().to_string(),
            output_root: request.output_directory.clone(),
            playlist,
            retry: self.retry.clone(),
            ffmpeg_location: self.toolchain.ffmpeg.clone(),
            proxy: self.proxy.clone(),
        })
    }
}

fn validate(request: &JobRequest) -> Result<(), JobError> {
    if request.url.trim().is_empty() {
        return Err(JobError::InvalidRequest("please enter a URL".to_string()));
    }
    if request.quality.format() != request.format {
        return Err(JobError::InvalidRequest(format!(
            "quality '{}' does not belong to format {}",
            request.quality,
            request.format.label()
        )));
    }
    if request.filename_template.trim().is_empty() {
        return Err(JobError::InvalidRequest(
            "filename template is empty".to_string(),
        ));
    }
    if request.is_playlist {
        RangeRequest {
            start: request.start_index,
            end: request.end_index,
        }
        .validate()?;
    }

    for caps in TEMPLATE_FIELD.captures_iter(&request.filename_template) {
        let field = &caps[1];
        if !KNOWN_FIELDS.contains(&field) {
            tracing::warn!("filename template uses unrecognized field '{}'", field);
        }
    }

    Ok(())
}

/// Build the yt-dlp format expression for `quality`.
///
/// Without ffmpeg separate streams cannot be merged, so only single-file
/// formats are requested.
pub fn format_selection(quality: Quality, merge: bool) -> FormatSelection {
    let (expression, height_ceiling) = match quality {
        Quality::Audio(_) => ("bestaudio/best".to_string(), None),
        Quality::Video(q) => {
            let ceiling = q.height_ceiling();
            let expr = match (ceiling, merge) {
                (None, true) => {
                    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string()
                }
                (Some(h), true) => format!(
                    "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}][ext=mp4]/best[height<={h}]"
                ),
                (None, false) => "best[ext=mp4]/best".to_string(),
                (Some(h), false) => format!("best[height<={h}][ext=mp4]/best[height<={h}]"),
            };
            (expr, ceiling)
        }
    };

    FormatSelection {
        expression,
        height_ceiling,
        merged: merge && matches!(quality, Quality::Video(_)),
    }
}

/// Output template for a job. Playlist jobs get an index prefix unless the
/// user template already has one. The user's own template is left untouched.
pub fn derive_template(template: &str, is_playlist: bool) -> String {
    let template = template.trim();
    if is_playlist && !template.contains("%(playlist_index)") {
        format!("{}{}", PLAYLIST_INDEX_PREFIX, template)
    } else {
        template.to_string()
    }
}

/// Replace characters that are illegal in path components with `_`.
///
/// Trailing dots and spaces are dropped, so `.` and `..` never survive as a
/// component.
pub fn sanitize_dir_name(title: &str) -> String {
    let cleaned = ILLEGAL_PATH_CHARS.replace_all(title.trim(), "_");
    let cleaned = cleaned.trim_end_matches(['.', ' ']);
    if cleaned.is_empty() {
        "Playlist".to_string()
    } else {
        cleaned.to_string()
    }
}
