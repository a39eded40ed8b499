//! Error types for media operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while probing or encoding.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("probe failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("probe timed out after {0} seconds")]
    ProbeTimeout(u64),

    #[error("encode process failed: {message}")]
    EncodeFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
        /// Signal that killed the process, when it did not exit on its own
        signal: Option<i32>,
    },

    #[error("encode process produced no progress within {0} seconds")]
    Stalled(u64),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid target spec: {0}")]
    InvalidTargetSpec(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a probe failure error.
    pub fn probe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ProbeFailed {
            message: message.into(),
            stderr,
        }
    }

    /// Create an encode failure error.
    pub fn encode_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
        signal: Option<i32>,
    ) -> Self {
        Self::EncodeFailed {
            message: message.into(),
            stderr,
            exit_code,
            signal,
        }
    }

    /// True when the process died to a signal rather than exiting.
    pub fn killed_by_signal(&self) -> bool {
        matches!(
            self,
            Self::EncodeFailed {
                signal: Some(_),
                ..
            }
        )
    }
}
