//! Probed facts about an input file.

use serde::{Deserialize, Serialize};

/// Stream metadata produced once per job by the prober and immutable
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration_seconds: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec name
    pub video_codec: String,
    /// Audio codec name (empty when the input has no audio stream)
    pub audio_codec: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Container bitrate in bits/second
    pub bitrate: u64,
}

impl MediaInfo {
    /// Resolution rendered as `WIDTHxHEIGHT`, the form templates consume.
    pub fn resolution_string(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Duration in milliseconds, the unit ffmpeg progress records use.
    pub fn duration_ms(&self) -> i64 {
        (self.duration_seconds * 1000.0) as i64
    }
}
