use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
    Ffprobe,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
            ToolType::Ffprobe => "ffprobe",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            // ffmpeg/ffprobe use a single dash
            ToolType::Ffmpeg | ToolType::Ffprobe => "-version",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

/// Resolved locations of the external tools a job may need
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolchain {
    pub ytdlp: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl Toolchain {
    /// Program name to spawn for yt-dlp; falls back to `PATH` lookup.
    pub fn ytdlp_program(&self) -> PathBuf {
        self.ytdlp
            .clone()
            .unwrap_or_else(|| PathBuf::from(ToolType::YtDlp.as_str()))
    }

    pub fn has_ffmpeg(&self) -> bool {
        self.ffmpeg.is_some()
    }
}

/// Locates external tools. Explicitly configured paths win over discovery.
#[derive(Debug, Default)]
pub struct ToolManager {
    ytdlp_override: Option<PathBuf>,
    ffmpeg_override: Option<PathBuf>,
}

impl ToolManager {
    pub fn new(ytdlp_override: Option<PathBuf>, ffmpeg_override: Option<PathBuf>) -> Self {
        Self {
            ytdlp_override,
            ffmpeg_override,
        }
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = path.as_deref().and_then(|p| get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
            self.get_tool_info(ToolType::Ffprobe),
        ]
    }

    /// Detect every tool once, without running version probes.
    pub fn toolchain(&self) -> Toolchain {
        let toolchain = Toolchain {
            ytdlp: self.locate(ToolType::YtDlp),
            ffmpeg: self.locate(ToolType::Ffmpeg),
            ffprobe: self.locate(ToolType::Ffprobe),
        };
        tracing::debug!(?toolchain, "detected toolchain");
        toolchain
    }

    fn locate(&self, tool_type: ToolType) -> Option<PathBuf> {
        let configured = match tool_type {
            ToolType::YtDlp => self.ytdlp_override.as_ref(),
            ToolType::Ffmpeg => self.ffmpeg_override.as_ref(),
            // ffprobe ships next to ffmpeg
            ToolType::Ffprobe => None,
        };
        if let Some(path) = configured {
            if path.exists() {
                return Some(path.clone());
            }
            tracing::warn!(
                "configured {} path {} does not exist, falling back to discovery",
                tool_type.as_str(),
                path.display()
            );
        }

        if tool_type == ToolType::Ffprobe {
            if let Some(dir) = self.ffmpeg_override.as_ref().and_then(|p| p.parent()) {
                let sibling = dir.join(executable_name(tool_type));
                if sibling.exists() {
                    return Some(sibling);
                }
            }
        }

        detect_tool(tool_type)
    }
}

fn executable_name(tool_type: ToolType) -> String {
    if cfg!(windows) {
        format!("{}.exe", tool_type.as_str())
    } else {
        tool_type.as_str().to_string()
    }
}

fn detect_tool(tool_type: ToolType) -> Option<PathBuf> {
    let binary_name = executable_name(tool_type);

    // 1. Common install locations
    let common_dirs = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];
    for dir in common_dirs {
        let path = Path::new(dir).join(&binary_name);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. PATH
    let finder = if cfg!(windows) { "where" } else { "which" };
    if let Ok(output) = Command::new(finder).arg(&binary_name).output() {
        if output.status.success() {
            let found = String::from_utf8_lossy(&output.stdout);
            if let Some(first) = found.lines().map(str::trim).find(|l| !l.is_empty()) {
                return Some(PathBuf::from(first));
            }
        }
    }

    None
}

fn get_version(path: &Path, tool_type: ToolType) -> Option<String> {
    match Command::new(path).arg(tool_type.version_arg()).output() {
        Ok(output) if output.status.success() => {
            // ffmpeg prints a banner; the first line carries the version
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|l| l.trim().to_string())
        }
        _ => None,
    }
}
