// Application state and the terminal presentation loop
//
// The loop never blocks on the worker: it drains the relay on a fixed tick
// and renders whatever arrived.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Mutex;

use crate::cli::{DownloadArgs, RangeArgs};
use crate::config::AppConfig;
use crate::downloader::events::{relay, EventReceiver, JobState, ProgressEvent};
use crate::downloader::executor::{Executor, JobOutcome};
use crate::downloader::extractors::CliMetadataSource;
use crate::downloader::history::HistoryStore;
use crate::downloader::models::{JobInfo, JobRequest, MediaFormat, Quality};
use crate::downloader::orchestrator::Orchestrator;
use crate::downloader::planner::RangeRequest;
use crate::downloader::tools::ToolManager;
use crate::downloader::{JobError, YtDlpBackend};

/// How events are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct App {
    config: AppConfig,
    tools: ToolManager,
    executor: Arc<Executor>,
    history: Arc<Mutex<HistoryStore>>,
    orchestrator: Orchestrator,
    events: EventReceiver,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let tools = ToolManager::new(config.ytdlp_path.clone(), config.ffmpeg_path.clone());
        let toolchain = tools.toolchain();
        let ytdlp = toolchain.ytdlp_program();

        let source = CliMetadataSource::new(ytdlp.clone(), config.resolve_timeout_secs)
            .with_proxy(config.proxy.clone());
        let executor = Arc::new(Executor::new(
            Arc::new(source),
            Arc::new(YtDlpBackend::new(ytdlp)),
        ));

        let history = Arc::new(Mutex::new(HistoryStore::open(&config.history_path)));
        let (tx, events) = relay(config.relay_capacity);
        let orchestrator = Orchestrator::new(executor.clone(), toolchain, history.clone(), tx)
            .with_proxy(config.proxy.clone());

        Self {
            config,
            tools,
            executor,
            history,
            orchestrator,
            events,
        }
    }

    /// Run one download to completion, rendering its events.
    pub async fn download(
        &mut self,
        args: &DownloadArgs,
        mode: OutputMode,
    ) -> Result<JobOutcome, JobError> {
        let mut renderer = Renderer::new(mode);

        let request = match build_request(args, &self.config) {
            Ok(request) => request,
            Err(e) => {
                renderer.render(&ProgressEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let handle = match self.orchestrator.submit(request) {
            Ok(handle) => handle,
            Err(e) => {
                for event in self.events.drain() {
                    renderer.render(&event);
                }
                return Err(e);
            }
        };

        let mut state = JobState::Resolving;
        let mut tick =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        loop {
            tick.tick().await;
            // checked before draining: once the worker is done, its events are queued
            let finished = handle.is_finished();
            for event in self.events.drain() {
                state = state.apply(&event);
                renderer.render(&event);
            }
            if !state.is_active() || finished {
                break;
            }
        }

        handle.wait().await
    }

    /// Resolve metadata only.
    pub async fn info(&self, url: &str, range: &RangeArgs, mode: OutputMode) -> anyhow::Result<()> {
        let info = self
            .executor
            .resolver()
            .resolve(url, range_request(range))
            .await?;

        match mode {
            OutputMode::Json => println!("{}", serde_json::to_string_pretty(&info)?),
            OutputMode::Text => println!("{}", describe_info(&info)),
        }
        Ok(())
    }

    pub async fn history(&self, clear: bool, mode: OutputMode) -> anyhow::Result<()> {
        let mut history = self.history.lock().await;
        if clear {
            history.clear();
            println!("History cleared");
            return Ok(());
        }

        match mode {
            OutputMode::Json => println!("{}", serde_json::to_string_pretty(history.entries())?),
            OutputMode::Text => {
                if history.entries().is_empty() {
                    println!("No downloads recorded in {}", history.path().display());
                }
                for entry in history.entries() {
                    println!(
                        "{}  {:<4} {:<8} {}",
                        entry.timestamp, entry.format, entry.quality, entry.title
                    );
                }
            }
        }
        Ok(())
    }

    pub fn tools(&self, mode: OutputMode) -> anyhow::Result<()> {
        let tools = self.tools.get_all_tools();
        if mode == OutputMode::Json {
            println!(
                "{}",
                serde_json::to_string_pretty(&tools).context("serializing tool status")?
            );
            return Ok(());
        }

        for tool in tools {
            match (&tool.path, &tool.version) {
                (Some(path), version) => println!(
                    "{:<8} {} ({})",
                    tool.name,
                    version.as_deref().unwrap_or("unknown version"),
                    path.display()
                ),
                (None, _) => println!("{:<8} not found", tool.name),
            }
        }
        Ok(())
    }
}

fn range_request(range: &RangeArgs) -> Option<RangeRequest> {
    range.playlist.then_some(RangeRequest {
        start: range.start,
        end: range.end,
    })
}

/// Turn command-line options into a job request, filling gaps from config.
pub fn build_request(args: &DownloadArgs, config: &AppConfig) -> Result<JobRequest, JobError> {
    let format: MediaFormat = args.format.parse()?;
    let quality = match &args.quality {
        Some(q) => Quality::parse(format, q)?,
        None => format.default_quality(),
    };
    let output: PathBuf = args
        .output
        .clone()
        .unwrap_or_else(|| config.output_dir.clone());
    let template = args
        .template
        .clone()
        .unwrap_or_else(|| config.filename_template.clone());

    let mut request = JobRequest::new(args.url.trim(), output)
        .with_quality(quality)
        .with_template(template);
    if args.range.playlist {
        request = request.playlist(args.range.start, args.range.end);
    }
    Ok(request)
}

fn describe_info(info: &JobInfo) -> String {
    match info {
        JobInfo::Media(m) => format!("{} [{}]", m.title, m.formatted_duration()),
        JobInfo::Playlist(p) => format!(
            "Playlist: {} ({} entries, downloading {}..={}, {} items)",
            p.title,
            p.entry_count,
            p.resolved_range.0,
            p.resolved_range.1,
            p.item_count()
        ),
    }
}

/// Writes events to the terminal
struct Renderer {
    mode: OutputMode,
    /// A `\r` progress line is open and needs a newline before other output
    progress_open: bool,
}

impl Renderer {
    fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            progress_open: false,
        }
    }

    fn render(&mut self, event: &ProgressEvent) {
        if self.mode == OutputMode::Json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("could not serialize event: {}", e),
            }
            return;
        }

        let line = format_event(event);
        let mut stdout = std::io::stdout();
        match event {
            ProgressEvent::Progress { .. } => {
                print!("\r{}", line);
                let _ = stdout.flush();
                self.progress_open = true;
            }
            ProgressEvent::Error { .. } => {
                self.close_progress();
                eprintln!("{}", line);
            }
            _ => {
                self.close_progress();
                println!("{}", line);
            }
        }
    }

    fn close_progress(&mut self) {
        if self.progress_open {
            println!();
            self.progress_open = false;
        }
    }
}

/// One-line text form of an event.
pub fn format_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Info { info } => describe_info(info),
        ProgressEvent::Progress { percent, item } if item.total > 1 => {
            format!("[{}/{}] {:5.1}%", item.position, item.total, percent)
        }
        ProgressEvent::Progress { percent, .. } => format!("{:5.1}%", percent),
        ProgressEvent::VideoComplete { item } => match item.playlist_index {
            Some(index) => format!(
                "[{}/{}] finished playlist entry {}",
                item.position, item.total, index
            ),
            None => format!("[{}/{}] finished", item.position, item.total),
        },
        ProgressEvent::Error { message } => format!("ERROR: {}", message),
        ProgressEvent::Complete { message, .. } => format!("Done. {}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::{AudioBitrate, ItemPosition, MediaInfo, VideoQuality};

    fn args(url: &str) -> DownloadArgs {
        DownloadArgs {
            url: url.to_string(),
            range: RangeArgs {
                playlist: false,
                start: 1,
                end: None,
            },
            format: "video".to_string(),
            quality: None,
            template: None,
            output: None,
            proxy: None,
        }
    }

    #[test]
    fn request_falls_back_to_config() {
        let config = AppConfig {
            output_dir: PathBuf::from("/srv/media"),
            filename_template: "%(id)s.%(ext)s".into(),
            ..AppConfig::default()
        };
        let req = build_request(&args(" https://youtu.be/abc "), &config).unwrap();
        assert_eq!(req.url, "https://youtu.be/abc");
        assert_eq!(req.output_directory, PathBuf::from("/srv/media"));
        assert_eq!(req.filename_template, "%(id)s.%(ext)s");
        assert_eq!(req.quality, Quality::Video(VideoQuality::Best));
        assert!(!req.is_playlist);
    }

    #[test]
    fn request_parses_format_and_quality() {
        let mut a = args("https://youtu.be/abc");
        a.format = "mp3".into();
        a.quality = Some("128k".into());
        a.range.playlist = true;
        a.range.start = 2;
        let req = build_request(&a, &AppConfig::default()).unwrap();
        assert_eq!(req.format, MediaFormat::Audio);
        assert_eq!(req.quality, Quality::Audio(AudioBitrate::Kbps128));
        assert!(req.is_playlist);
        assert_eq!(req.start_index, 2);

        a.quality = Some("720p".into());
        assert!(matches!(
            build_request(&a, &AppConfig::default()),
            Err(JobError::InvalidRequest(_))
        ));
    }

    #[test]
    fn formats_events() {
        let item = ItemPosition {
            position: 2,
            playlist_index: Some(5),
            total: 4,
        };
        assert_eq!(
            format_event(&ProgressEvent::Progress {
                percent: 42.5,
                item
            }),
            "[2/4]  42.5%"
        );
        assert_eq!(
            format_event(&ProgressEvent::VideoComplete { item }),
            "[2/4] finished playlist entry 5"
        );
        assert_eq!(
            format_event(&ProgressEvent::Info {
                info: JobInfo::Media(MediaInfo {
                    title: "clip".into(),
                    duration_seconds: 3723,
                })
            }),
            "clip [01:02:03]"
        );
        assert!(format_event(&ProgressEvent::Error {
            message: "x".into()
        })
        .starts_with("ERROR"));
    }
}
