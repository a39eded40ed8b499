//! Failure classification and retry policy.
//!
//! Classification is a total function over [`MediaError`] so the batch
//! reaction to each failure is explicit and testable rather than inferred
//! from exit codes at the call site.

use std::io::ErrorKind;
use std::time::Duration;

use vbatch_media::MediaError;

use crate::config::WorkerConfig;

/// How a failure affects the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The input itself is bad; siblings are unaffected.
    Input,
    /// The machine cannot run any encode; the whole batch must stop.
    Environment,
    /// The process was killed out from under us; worth one more try.
    Transient,
}

/// Classify a media error.
pub fn classify(err: &MediaError) -> FailureClass {
    match err {
        MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => FailureClass::Environment,
        MediaError::Io(io)
            if matches!(io.kind(), ErrorKind::PermissionDenied | ErrorKind::NotFound) =>
        {
            FailureClass::Environment
        }
        err if err.killed_by_signal() => FailureClass::Transient,
        _ => FailureClass::Input,
    }
}

/// Exponential-backoff retry policy for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Base delay, doubled each attempt
    pub base_delay: Duration,
    /// Cap on the backoff delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            max_retries: config.retry_max,
            base_delay: config.retry_base_delay,
            ..Default::default()
        }
    }

    /// Delay before the given (1-based) retry attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        delay.min(self.max_delay)
    }

    /// Only transient failures are retried, and only while attempts remain.
    pub fn should_retry(&self, class: FailureClass, attempt: u32) -> bool {
        class == FailureClass::Transient && attempt < self.max_retries
    }
}
