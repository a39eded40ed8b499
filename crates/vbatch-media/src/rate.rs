//! Target-size bitrate derivation.
//!
//! Pure arithmetic: no I/O, trivially unit-testable. The result feeds the
//! encode command's rate-control arguments.

use crate::error::{MediaError, MediaResult};

/// Floor for the derived video bitrate. Below this the encode degenerates,
/// so the rate is clamped and the caller warned instead of failing.
pub const MIN_VIDEO_BITRATE_BPS: u64 = 300_000;

/// Derived rate-control target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitrateTarget {
    /// Video bitrate in bits/second
    pub video_bps: u64,
    /// True when the floor was applied; the output will exceed the
    /// requested size
    pub floored: bool,
}

/// Derive the video bitrate that fits `target_size_bytes` of output into
/// `duration_seconds`, after reserving `reserved_audio_bps` for audio.
pub fn target_video_bitrate(
    target_size_bytes: u64,
    duration_seconds: f64,
    reserved_audio_bps: u64,
) -> MediaResult<BitrateTarget> {
    if target_size_bytes == 0 {
        return Err(MediaError::InvalidTargetSpec(
            "target size must be positive".to_string(),
        ));
    }
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(MediaError::InvalidTargetSpec(format!(
            "duration must be positive, got {duration_seconds}"
        )));
    }

    let total_bps = (target_size_bytes as f64) * 8.0 / duration_seconds;
    let video_bps = total_bps - reserved_audio_bps as f64;

    if video_bps < MIN_VIDEO_BITRATE_BPS as f64 {
        Ok(BitrateTarget {
            video_bps: MIN_VIDEO_BITRATE_BPS,
            floored: true,
        })
    } else {
        Ok(BitrateTarget {
            video_bps: video_bps as u64,
            floored: false,
        })
    }
}
