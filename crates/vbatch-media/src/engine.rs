//! Seam between job processing and the external tooling.
//!
//! The worker pool drives everything through [`MediaEngine`], so pool and
//! pipeline behavior can be exercised with a scripted engine while
//! [`FfmpegEngine`] is the one used in production.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use vbatch_models::MediaInfo;

use crate::command::{check_ffmpeg, check_ffprobe, EncodeCommand, EncodeRunner};
use crate::error::MediaResult;
use crate::probe;
use crate::progress::EncodeProgress;

/// External-tool operations a worker needs for one job.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Verify the external tools are usable before any job runs.
    fn preflight(&self) -> MediaResult<()>;

    /// Extract stream metadata, bounded by `timeout`.
    async fn probe(&self, path: &Path, timeout: Duration) -> MediaResult<MediaInfo>;

    /// Run one encode pass, streaming progress records into `progress`.
    /// The sender is dropped when the pass ends.
    async fn encode(
        &self,
        cmd: &EncodeCommand,
        progress: mpsc::UnboundedSender<EncodeProgress>,
        cancel: watch::Receiver<bool>,
        stall_grace: Duration,
    ) -> MediaResult<()>;
}

/// Production engine backed by the ffmpeg/ffprobe binaries on PATH.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEngine;

#[async_trait]
impl MediaEngine for FfmpegEngine {
    fn preflight(&self) -> MediaResult<()> {
        check_ffmpeg()?;
        check_ffprobe()?;
        Ok(())
    }

    async fn probe(&self, path: &Path, timeout: Duration) -> MediaResult<MediaInfo> {
        probe::probe_video(path, timeout).await
    }

    async fn encode(
        &self,
        cmd: &EncodeCommand,
        progress: mpsc::UnboundedSender<EncodeProgress>,
        cancel: watch::Receiver<bool>,
        stall_grace: Duration,
    ) -> MediaResult<()> {
        EncodeRunner::new()
            .with_cancel(cancel)
            .with_stall_grace(stall_grace)
            .run(cmd, move |record| {
                let _ = progress.send(record);
            })
            .await
    }
}
