//! FFmpeg CLI wrapper for the vbatch transcoding core.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation and stall detection via tokio
//! - ffprobe metadata extraction with a timeout bound
//! - Target-size bitrate derivation

pub mod command;
pub mod engine;
pub mod error;
pub mod probe;
pub mod progress;
pub mod rate;

pub use command::{check_ffmpeg, check_ffprobe, EncodeCommand, EncodeRunner};
pub use engine::{FfmpegEngine, MediaEngine};
pub use error::{MediaError, MediaResult};
pub use probe::probe_video;
pub use progress::EncodeProgress;
pub use rate::{target_video_bitrate, BitrateTarget, MIN_VIDEO_BITRATE_BPS};
