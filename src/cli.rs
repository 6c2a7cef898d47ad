use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Download YouTube videos and playlists with yt-dlp")]
pub struct Cli {
    /// Config file (default: <config dir>/yt-fetch/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print events and results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a video or a playlist range
    Download(DownloadArgs),
    /// Resolve a URL and print its metadata without downloading
    Info {
        url: String,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Show or clear the download history
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Show detected external tools
    Tools,
}

#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// Treat the URL as a playlist
    #[arg(long)]
    pub playlist: bool,

    /// First playlist entry, 1-based
    #[arg(long, default_value_t = 1, requires = "playlist")]
    pub start: u32,

    /// Last playlist entry (default: through the end)
    #[arg(long, requires = "playlist")]
    pub end: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    pub url: String,

    #[command(flatten)]
    pub range: RangeArgs,

    /// video (mp4) or audio (mp3)
    #[arg(short, long, default_value = "video")]
    pub format: String,

    /// best, 1080p, 720p, 480p for video; 320, 192, 128, 64 for audio
    #[arg(short, long)]
    pub quality: Option<String>,

    /// yt-dlp output template
    #[arg(short, long)]
    pub template: Option<String>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Proxy URL passed to yt-dlp
    #[arg(long)]
    pub proxy: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
