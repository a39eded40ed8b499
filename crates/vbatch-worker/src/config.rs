//! Worker configuration.

use std::time::Duration;

/// Pool and pipeline configuration, passed in at batch submission instead
/// of living in globals.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent encode slots
    pub concurrency: usize,
    /// Bound on a single probe invocation
    pub probe_timeout: Duration,
    /// Grace period for the first progress record after process start
    pub stall_grace: Duration,
    /// Retries for transient failures
    pub retry_max: u32,
    /// Base delay for retry backoff (doubles each attempt)
    pub retry_base_delay: Duration,
    /// Audio bitrate reserved when deriving a target-size video bitrate
    pub reserved_audio_bps: u64,
    /// Overwrite colliding outputs instead of auto-renaming
    pub overwrite: bool,
    /// Per-subscriber event buffer
    pub event_capacity: usize,
    /// How long a graceful shutdown waits for in-flight jobs
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            probe_timeout: Duration::from_secs(15),
            stall_grace: Duration::from_secs(30),
            retry_max: 1,
            retry_base_delay: Duration::from_millis(500),
            reserved_audio_bps: 128_000,
            overwrite: false,
            event_capacity: 256,
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse("VBATCH_CONCURRENCY", defaults.concurrency).max(1),
            probe_timeout: Duration::from_secs(env_parse(
                "VBATCH_PROBE_TIMEOUT_SECS",
                defaults.probe_timeout.as_secs(),
            )),
            stall_grace: Duration::from_secs(env_parse(
                "VBATCH_STALL_GRACE_SECS",
                defaults.stall_grace.as_secs(),
            )),
            retry_max: env_parse("VBATCH_RETRY_MAX", defaults.retry_max),
            retry_base_delay: Duration::from_millis(env_parse(
                "VBATCH_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )),
            reserved_audio_bps: env_parse("VBATCH_AUDIO_BITRATE_BPS", defaults.reserved_audio_bps),
            overwrite: env_parse("VBATCH_OVERWRITE", defaults.overwrite),
            event_capacity: env_parse("VBATCH_EVENT_CAPACITY", defaults.event_capacity).max(16),
            shutdown_timeout: Duration::from_secs(env_parse(
                "VBATCH_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
