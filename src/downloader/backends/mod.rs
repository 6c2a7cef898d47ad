// Downloader backends

mod ytdlp;

pub use ytdlp::{parse_progress_line, ProgressLine, YtDlpBackend};
