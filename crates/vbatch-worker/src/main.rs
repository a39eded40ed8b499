//! Batch transcoding CLI.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vbatch_media::{FfmpegEngine, MediaEngine};
use vbatch_models::{BatchSummary, CoreEvent};
use vbatch_worker::cli::Args;
use vbatch_worker::{ShutdownMode, WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vbatch=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = WorkerConfig::from_env();
    args.apply(&mut config);

    let specs = args.job_specs().context("building job specs")?;

    let engine = FfmpegEngine;
    engine.preflight().context("environment check failed")?;

    let pool = WorkerPool::start(config, Arc::new(engine));
    let mut events = pool.subscribe();

    let ids = pool
        .submit_batch(specs)
        .await
        .context("submitting batch")?;
    info!("submitted {} jobs", ids.len());

    let mut last_summary = BatchSummary::default();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, cancelling batch");
                pool.shutdown(ShutdownMode::Immediate).await;
                return Ok(ExitCode::from(130));
            }
            event = events.recv() => match event {
                Ok(CoreEvent::Progress { job_id, percent }) => {
                    debug!(job_id = %job_id, percent, "progress");
                }
                Ok(CoreEvent::Terminal { job_id, status, error }) => match error {
                    Some(detail) => warn!(job_id = %job_id, status = %status, "{detail}"),
                    None => info!(job_id = %job_id, status = %status, "job finished"),
                },
                Ok(CoreEvent::Summary(summary)) => {
                    let complete = summary.is_complete();
                    last_summary = summary;
                    if complete {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event subscriber lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    pool.shutdown(ShutdownMode::Graceful).await;

    info!(
        succeeded = last_summary.succeeded,
        failed = last_summary.failed,
        cancelled = last_summary.cancelled,
        "batch complete"
    );

    if last_summary.failed == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
