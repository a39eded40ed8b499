//! Container formats and codec mapping.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Input container extensions the pipeline accepts.
pub const INPUT_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp", "3g2", "mxf",
    "ts",
];

/// Audio bitrate used for every output.
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Supported output containers. Anything else is rejected at job-build
/// time, before a process is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Mkv,
    WebM,
    Mov,
}

impl OutputFormat {
    /// Parse a user-supplied container name; leading dots and case are
    /// ignored.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "mp4" => Some(OutputFormat::Mp4),
            "mkv" => Some(OutputFormat::Mkv),
            "webm" => Some(OutputFormat::WebM),
            "mov" => Some(OutputFormat::Mov),
            _ => None,
        }
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mkv => "mkv",
            OutputFormat::WebM => "webm",
            OutputFormat::Mov => "mov",
        }
    }

    /// Video encoder for this container.
    pub fn video_codec(&self) -> &'static str {
        match self {
            OutputFormat::WebM => "libvpx-vp9",
            _ => "libx264",
        }
    }

    /// Audio encoder for this container.
    pub fn audio_codec(&self) -> &'static str {
        match self {
            OutputFormat::WebM => "libopus",
            _ => "aac",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Check an input path against the supported container allowlist.
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            INPUT_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}
