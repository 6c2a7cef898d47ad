// yt-dlp download backend
//
// One subprocess per item. Progress is scraped from `--newline` output on
// stdout; stderr is collected for diagnosis when the process fails.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use crate::downloader::diagnostics::{describe_failure, diagnose_error};
use crate::downloader::errors::JobError;
use crate::downloader::models::{ItemPosition, MediaFormat};
use crate::downloader::planner::BoundJob;
use crate::downloader::traits::{DownloadBackend, ProgressReporter};
use crate::downloader::utils::proxy_args;

/// What a line of yt-dlp output says about the current item
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// Download percentage of the current stream
    Percent(f64),
    /// A new output file was started
    Destination(String),
    /// ffmpeg is merging the streams
    Merging,
    /// Post-processing into the target audio format
    Extracting,
    /// The file is already on disk
    AlreadyDownloaded,
}

/// Parse one line of yt-dlp progress output.
///
/// Example: `[download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)`
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap();
        static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
        static ref MERGE_RE: Regex = Regex::new(r"\[Merger?\]\s+Merging").unwrap();
        static ref EXTRACT_RE: Regex = Regex::new(r"\[ExtractAudio\]\s+Destination").unwrap();
        static ref ALREADY_RE: Regex = Regex::new(r"has already been downloaded").unwrap();
    }

    if ALREADY_RE.is_match(line) {
        return Some(ProgressLine::AlreadyDownloaded);
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f64 = caps.get(1)?.as_str().parse().ok()?;
        return Some(ProgressLine::Percent(percent));
    }

    if let Some(caps) = DEST_RE.captures(line) {
        let path = caps.get(1)?.as_str().trim();
        return Some(ProgressLine::Destination(path.to_string()));
    }

    if MERGE_RE.is_match(line) {
        return Some(ProgressLine::Merging);
    }

    if EXTRACT_RE.is_match(line) {
        return Some(ProgressLine::Extracting);
    }

    None
}

/// Backend driving the native yt-dlp binary
pub struct YtDlpBackend {
    ytdlp_path: PathBuf,
}

impl YtDlpBackend {
    pub fn new(ytdlp_path: PathBuf) -> Self {
        Self { ytdlp_path }
    }

    /// Build command arguments for one item
    pub fn build_args(&self, job: &BoundJob<'_>, item: ItemPosition) -> Vec<String> {
        let desc = job.descriptor;
        let retry = &desc.retry;

        let mut args = vec![
            "--newline".to_string(),
            "-f".to_string(),
            desc.selection.expression.clone(),
            "-P".to_string(),
            job.output_dir.to_string_lossy().into_owned(),
            "-o".to_string(),
            job.template.clone(),
            "--retries".to_string(),
            retry.retries.to_string(),
            "--fragment-retries".to_string(),
            retry.fragment_retries.to_string(),
            "--retry-sleep".to_string(),
            format!(
                "fragment:exp={}:{}",
                retry.fragment_backoff.0, retry.fragment_backoff.1
            ),
            "--extractor-retries".to_string(),
            retry.extractor_retries.to_string(),
            "--socket-timeout".to_string(),
            retry.socket_timeout_secs.to_string(),
            "--sleep-interval".to_string(),
            retry.sleep_interval.0.to_string(),
            "--max-sleep-interval".to_string(),
            retry.sleep_interval.1.to_string(),
            "--concurrent-fragments".to_string(),
            retry.concurrent_fragments.to_string(),
            "--throttled-rate".to_string(),
            retry.throttled_rate.to_string(),
            "--no-check-certificates".to_string(),
        ];

        if desc.selection.merged {
            args.push("--merge-output-format".to_string());
            args.push("mp4".to_string());
        }

        if let Some(ffmpeg) = &desc.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }

        args.extend(proxy_args(desc.proxy.as_deref()));

        match item.playlist_index {
            Some(index) => {
                args.push("--yes-playlist".to_string());
                args.push("--playlist-items".to_string());
                args.push(index.to_string());
            }
            None => args.push("--no-playlist".to_string()),
        }

        if desc.format == MediaFormat::Audio {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push("mp3".to_string());
            if let Some(kbps) = desc.audio_kbps {
                args.push("--audio-quality".to_string());
                args.push(format!("{}K", kbps));
            }
        }

        args.push("--".to_string());
        args.push(desc.url.clone());
        args
    }
}

#[async_trait]
impl DownloadBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download_item(
        &self,
        job: &BoundJob<'_>,
        item: ItemPosition,
        reporter: &mut ProgressReporter,
    ) -> Result<(), JobError> {
        let args = self.build_args(job, item);
        tracing::debug!(
            "[{}] {} {}",
            self.name(),
            self.ytdlp_path.display(),
            args.join(" ")
        );

        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => JobError::MissingDependency {
                    tool: "yt-dlp",
                    purpose: "downloading",
                },
                _ => JobError::Download(format!("failed to start yt-dlp: {}", e)),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| JobError::Download("yt-dlp stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| JobError::Download("yt-dlp stderr not captured".to_string()))?;

        // yt-dlp output is not guaranteed to be UTF-8 (local codepage file names)
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                tracing::debug!("reading yt-dlp stderr: {}", e);
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        reporter.report(0.0).await;

        let mut reader = BufReader::new(stdout);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("[{}] stopped reading output: {}", self.name(), e);
                    break;
                }
            }
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);

            match parse_progress_line(line) {
                Some(ProgressLine::Percent(p)) => reporter.report(p).await,
                Some(ProgressLine::AlreadyDownloaded) => {
                    tracing::info!("[{}] {}", self.name(), line.trim());
                    reporter.report(100.0).await;
                }
                Some(ProgressLine::Destination(path)) => {
                    tracing::info!("[{}] writing {}", self.name(), path);
                }
                Some(ProgressLine::Merging) | Some(ProgressLine::Extracting) => {
                    tracing::info!("[{}] {}", self.name(), line.trim());
                }
                None => tracing::trace!("[{}] {}", self.name(), line),
            }
        }

        drop(reader);

        let status = child
            .wait()
            .await
            .map_err(|e| JobError::Download(format!("yt-dlp process error: {}", e)))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if status.success() {
            reporter.report(100.0).await;
            return Ok(());
        }

        let permanent = diagnose_error(&stderr_output).is_some_and(|r| r.is_permanent());
        tracing::warn!(
            "[{}] item {}/{} exited with {}{}",
            self.name(),
            item.position,
            item.total,
            status,
            if permanent { " (will not succeed on retry)" } else { "" }
        );
        Err(JobError::Download(describe_failure(&stderr_output)))
    }
}
