//! Per-job pipeline: probe, plan the output, derive the rate, invoke the
//! encode, report a terminal outcome.

use std::path::Path;

use chrono::Local;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use vbatch_media::command::{self, EncodeCommand};
use vbatch_media::{rate, MediaEngine, MediaError, MediaResult};
use vbatch_models::{Job, JobId, TemplateContext, DEFAULT_AUDIO_BITRATE};

use crate::config::WorkerConfig;
use crate::failure::{self, FailureClass, RetryPolicy};
use crate::logging::JobLogger;
use crate::output::OutputPlanner;
use crate::pool::PoolEvent;

/// How one job ended, as seen by the pool.
#[derive(Debug)]
pub(crate) enum JobOutcome {
    Succeeded,
    Cancelled,
    Failed {
        detail: String,
        class: FailureClass,
    },
}

/// Run one job end-to-end. The caller owns the job record; everything
/// observable flows through `events`.
pub(crate) async fn execute(
    config: &WorkerConfig,
    engine: &dyn MediaEngine,
    planner: &OutputPlanner,
    events: &mpsc::UnboundedSender<PoolEvent>,
    job: &mut Job,
    cancel_rx: watch::Receiver<bool>,
) -> JobOutcome {
    let log = JobLogger::new(&job.id, "transcode");

    if *cancel_rx.borrow() {
        job.cancel();
        return JobOutcome::Cancelled;
    }

    log.start(&format!("probing {}", job.input_path.display()));
    job.mark_probing();
    let media = match engine.probe(&job.input_path, config.probe_timeout).await {
        Ok(info) => info,
        Err(err) => return fail_media(job, err, &log),
    };
    if media.duration_seconds <= 0.0 {
        return fail_media(
            job,
            MediaError::probe_failed("could not determine video duration", None),
            &log,
        );
    }
    let _ = events.send(PoolEvent::Probed {
        job_id: job.id.clone(),
        duration_seconds: media.duration_seconds,
    });

    if *cancel_rx.borrow() {
        job.cancel();
        return JobOutcome::Cancelled;
    }

    // Resolve the output name now that stream facts are known.
    let ctx = TemplateContext::for_job(
        &job.input_path,
        job.quality.as_str(),
        job.sequence_index,
        Local::now(),
    )
    .with_media(&media);
    let stem = match ctx.resolve(&job.template) {
        Ok(stem) => stem,
        Err(err) => return fail_input(job, err.to_string(), &log),
    };

    if let Err(err) = tokio::fs::create_dir_all(&job.output_dir).await {
        return fail_media(job, MediaError::Io(err), &log);
    }
    let output = planner.plan(&job.output_dir, &stem, job.format).await;
    job.output_path = Some(output.clone());

    // Rate control when a target size was requested.
    let bitrate = match job.target_size_bytes {
        Some(size) => {
            match rate::target_video_bitrate(size, media.duration_seconds, config.reserved_audio_bps)
            {
                Ok(target) => {
                    if target.floored {
                        log.warning(&format!(
                            "target size too small for duration; clamping video bitrate to {} bps, output will overshoot",
                            target.video_bps
                        ));
                    }
                    Some(target.video_bps)
                }
                Err(err) => return fail_media(job, err, &log),
            }
        }
        None => None,
    };

    let duration_ms = media.duration_ms();
    job.media = Some(media);

    let (commands, _passlog_dir) = match build_commands(config, job, bitrate, &output) {
        Ok(built) => built,
        Err(err) => return fail_media(job, err, &log),
    };

    job.mark_encoding();
    log.progress(&format!(
        "encoding to {} ({} pass)",
        output.display(),
        commands.len()
    ));

    let policy = RetryPolicy::from_config(config);
    loop {
        let result = run_passes(
            config,
            engine,
            events,
            &job.id,
            duration_ms,
            &commands,
            cancel_rx.clone(),
        )
        .await;

        match result {
            Ok(()) => {
                job.succeed();
                let _ = events.send(PoolEvent::Progress {
                    job_id: job.id.clone(),
                    percent: 100.0,
                });
                log.completion(&format!("wrote {}", output.display()));
                return JobOutcome::Succeeded;
            }
            Err(MediaError::Cancelled) => {
                remove_partial(&output).await;
                job.cancel();
                log.progress("encode cancelled");
                return JobOutcome::Cancelled;
            }
            Err(err) => {
                remove_partial(&output).await;
                let class = failure::classify(&err);
                if policy.should_retry(class, job.attempt) {
                    job.attempt += 1;
                    let delay = policy.delay_for_attempt(job.attempt);
                    log.warning(&format!(
                        "transient failure ({err}), retry {} in {delay:?}",
                        job.attempt
                    ));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return fail_classified(job, err, class, &log);
            }
        }
    }
}

/// Build the pass commands: a single CRF invocation, or an analysis pass
/// plus a rate-controlled pass when a target size is set.
fn build_commands(
    config: &WorkerConfig,
    job: &Job,
    bitrate: Option<u64>,
    output: &Path,
) -> MediaResult<(Vec<EncodeCommand>, Option<TempDir>)> {
    let settings = job.quality.settings();
    let media = job.media.as_ref();
    let fps = command::optimal_fps(media.map(|m| m.fps).unwrap_or(0.0));
    let resolution = job.resolution.or(settings.resolution);
    let filter = command::video_filter_chain(fps, resolution);

    match bitrate {
        None => {
            let cmd = EncodeCommand::new(&job.input_path, output)
                .overwrite(config.overwrite)
                .video_filter(filter)
                .video_codec(job.format.video_codec())
                .crf(settings.crf)
                .preset(settings.preset)
                .audio_codec(job.format.audio_codec())
                .audio_bitrate(DEFAULT_AUDIO_BITRATE);
            Ok((vec![cmd], None))
        }
        Some(video_bps) => {
            let passlog_dir = tempfile::tempdir()?;
            let passlog = passlog_dir.path().join("ffmpeg2pass");

            let analysis = EncodeCommand::new(&job.input_path, command::null_device())
                .video_filter(filter.clone())
                .video_codec(job.format.video_codec())
                .video_bitrate(video_bps)
                .preset(settings.preset)
                .no_audio()
                .pass_number(1)
                .passlog(&passlog)
                .format("null");

            let encode = EncodeCommand::new(&job.input_path, output)
                .overwrite(config.overwrite)
                .video_filter(filter)
                .video_codec(job.format.video_codec())
                .video_bitrate(video_bps)
                .preset(settings.preset)
                .pass_number(2)
                .passlog(&passlog)
                .audio_codec(job.format.audio_codec())
                .audio_bitrate(DEFAULT_AUDIO_BITRATE);

            Ok((vec![analysis, encode], Some(passlog_dir)))
        }
    }
}

/// Run the passes in order, mapping each pass onto its slice of the
/// 0-100 range so per-job progress stays monotone.
async fn run_passes(
    config: &WorkerConfig,
    engine: &dyn MediaEngine,
    events: &mpsc::UnboundedSender<PoolEvent>,
    job_id: &JobId,
    duration_ms: i64,
    commands: &[EncodeCommand],
    cancel_rx: watch::Receiver<bool>,
) -> MediaResult<()> {
    let total = commands.len().max(1);
    let span = 100.0 / total as f64;

    for (index, cmd) in commands.iter().enumerate() {
        let (tx, mut rx) = mpsc::unbounded_channel::<vbatch_media::EncodeProgress>();

        let forward_events = events.clone();
        let forward_id = job_id.clone();
        let base = span * index as f64;
        let forward = tokio::spawn(async move {
            let mut last = 0.0f64;
            while let Some(record) = rx.recv().await {
                let percent = base + record.percentage(duration_ms) * span / 100.0;
                if percent > last {
                    last = percent;
                    let _ = forward_events.send(PoolEvent::Progress {
                        job_id: forward_id.clone(),
                        percent: percent.min(100.0),
                    });
                }
            }
        });

        let result = engine
            .encode(cmd, tx, cancel_rx.clone(), config.stall_grace)
            .await;
        let _ = forward.await;
        result?;
    }

    Ok(())
}

async fn remove_partial(output: &Path) {
    let _ = tokio::fs::remove_file(output).await;
}

fn fail_input(job: &mut Job, detail: String, log: &JobLogger) -> JobOutcome {
    log.error(&detail);
    job.fail(detail.clone());
    JobOutcome::Failed {
        detail,
        class: FailureClass::Input,
    }
}

fn fail_media(job: &mut Job, err: MediaError, log: &JobLogger) -> JobOutcome {
    let class = failure::classify(&err);
    fail_classified(job, err, class, log)
}

fn fail_classified(
    job: &mut Job,
    err: MediaError,
    class: FailureClass,
    log: &JobLogger,
) -> JobOutcome {
    let detail = err.to_string();
    log.error(&detail);
    job.fail(detail.clone());
    JobOutcome::Failed { detail, class }
}
