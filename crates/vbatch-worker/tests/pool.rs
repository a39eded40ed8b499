//! Worker pool scenarios driven through a scripted media engine.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};

use vbatch_media::{EncodeCommand, EncodeProgress, MediaEngine, MediaError, MediaResult};
use vbatch_models::{BatchSummary, CoreEvent, JobSpec, JobStatus, MediaInfo};
use vbatch_worker::{ShutdownMode, WorkerConfig, WorkerPool};

const DURATION_SECS: f64 = 100.0;

fn media_info() -> MediaInfo {
    MediaInfo {
        duration_seconds: DURATION_SECS,
        width: 1280,
        height: 720,
        fps: 30.0,
        video_codec: "h264".to_string(),
        audio_codec: "aac".to_string(),
        size_bytes: 1_000_000,
        bitrate: 2_000_000,
    }
}

/// Scripted engine: emits progress slices on a timer and honors the
/// cancellation signal, without touching any real process.
struct FakeEngine {
    steps: usize,
    step_delay: Duration,
    probe_fail: HashSet<PathBuf>,
    env_fail: HashSet<PathBuf>,
    transient_remaining: Mutex<std::collections::HashMap<PathBuf, u32>>,
    probe_calls: AtomicUsize,
    encode_calls: Mutex<Vec<PathBuf>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeEngine {
    fn new(steps: usize, step_delay: Duration) -> Self {
        Self {
            steps,
            step_delay,
            probe_fail: HashSet::new(),
            env_fail: HashSet::new(),
            transient_remaining: Mutex::new(std::collections::HashMap::new()),
            probe_calls: AtomicUsize::new(0),
            encode_calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn with_probe_failure(mut self, input: impl Into<PathBuf>) -> Self {
        self.probe_fail.insert(input.into());
        self
    }

    fn with_env_failure(mut self, input: impl Into<PathBuf>) -> Self {
        self.env_fail.insert(input.into());
        self
    }

    fn with_transient_failures(self, input: impl Into<PathBuf>, count: u32) -> Self {
        self.transient_remaining
            .lock()
            .unwrap()
            .insert(input.into(), count);
        self
    }

    fn encode_calls_for(&self, input: &Path) -> usize {
        self.encode_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_path() == input)
            .count()
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    fn preflight(&self) -> MediaResult<()> {
        Ok(())
    }

    async fn probe(&self, path: &Path, _timeout: Duration) -> MediaResult<MediaInfo> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.env_fail.contains(path) {
            return Err(MediaError::FfmpegNotFound);
        }
        if self.probe_fail.contains(path) {
            return Err(MediaError::probe_failed("input unreadable", None));
        }
        Ok(media_info())
    }

    async fn encode(
        &self,
        cmd: &EncodeCommand,
        progress: mpsc::UnboundedSender<EncodeProgress>,
        mut cancel: watch::Receiver<bool>,
        _stall_grace: Duration,
    ) -> MediaResult<()> {
        let input = cmd.input().to_path_buf();
        self.encode_calls.lock().unwrap().push(input.clone());

        if let Some(remaining) = self.transient_remaining.lock().unwrap().get_mut(&input) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MediaError::encode_failed(
                    "killed by the OS",
                    None,
                    None,
                    Some(9),
                ));
            }
        }

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let result = async {
            for step in 1..=self.steps {
                tokio::select! {
                    _ = tokio::time::sleep(self.step_delay) => {}
                    changed = cancel.changed() => {
                        if changed.is_ok() && *cancel.borrow() {
                            return Err(MediaError::Cancelled);
                        }
                    }
                }
                let record = EncodeProgress {
                    out_time_ms: ((DURATION_SECS * 1000.0) as i64) * step as i64
                        / self.steps as i64,
                    ..Default::default()
                };
                let _ = progress.send(record);
            }
            Ok(())
        }
        .await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn test_config(concurrency: usize) -> WorkerConfig {
    WorkerConfig {
        concurrency,
        probe_timeout: Duration::from_secs(1),
        stall_grace: Duration::from_secs(5),
        retry_base_delay: Duration::from_millis(10),
        ..WorkerConfig::default()
    }
}

fn spec(input: &str, out_dir: &Path) -> JobSpec {
    JobSpec::new(input, out_dir)
}

/// Drain the bus until the batch summary reports completion.
async fn collect_until_complete(
    rx: &mut broadcast::Receiver<CoreEvent>,
) -> (Vec<CoreEvent>, BatchSummary) {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("batch did not complete in time")
            .expect("event bus closed early");
        events.push(event.clone());
        if let CoreEvent::Summary(summary) = event {
            if summary.is_complete() {
                return (events, summary);
            }
        }
    }
}

fn terminal_status(events: &[CoreEvent], job_id: &vbatch_models::JobId) -> Option<JobStatus> {
    events.iter().find_map(|event| match event {
        CoreEvent::Terminal { job_id: id, status, .. } if id == job_id => Some(*status),
        _ => None,
    })
}

#[tokio::test]
async fn batch_with_one_probe_failure_reports_mixed_summary() {
    let out = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        FakeEngine::new(4, Duration::from_millis(10)).with_probe_failure("/videos/b.mp4"),
    );

    let pool = WorkerPool::start(test_config(2), engine.clone());
    let mut rx = pool.subscribe();

    let ids = pool
        .submit_batch(vec![
            spec("/videos/a.mp4", out.path()),
            spec("/videos/b.mp4", out.path()),
            spec("/videos/c.mp4", out.path()),
        ])
        .await
        .unwrap();

    let (events, summary) = collect_until_complete(&mut rx).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.remaining, 0);
    assert_eq!(terminal_status(&events, &ids[1]), Some(JobStatus::Failed));
    assert_eq!(terminal_status(&events, &ids[0]), Some(JobStatus::Succeeded));
    assert_eq!(terminal_status(&events, &ids[2]), Some(JobStatus::Succeeded));
    // the failed job never reached the encoder
    assert_eq!(engine.encode_calls_for(Path::new("/videos/b.mp4")), 0);

    pool.shutdown(ShutdownMode::Graceful).await;
}

#[tokio::test]
async fn concurrency_bound_is_never_exceeded() {
    let out = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new(5, Duration::from_millis(15)));

    let pool = WorkerPool::start(test_config(2), engine.clone());
    let mut rx = pool.subscribe();

    let specs: Vec<JobSpec> = (0..6)
        .map(|i| spec(&format!("/videos/clip{i}.mp4"), out.path()))
        .collect();
    pool.submit_batch(specs).await.unwrap();

    let (_, summary) = collect_until_complete(&mut rx).await;
    assert_eq!(summary.succeeded, 6);
    assert!(
        engine.max_active.load(Ordering::SeqCst) <= 2,
        "observed {} concurrent encodes",
        engine.max_active.load(Ordering::SeqCst)
    );

    pool.shutdown(ShutdownMode::Graceful).await;
}

#[tokio::test]
async fn per_job_progress_is_monotone_and_ends_at_100() {
    let out = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new(8, Duration::from_millis(5)));

    let pool = WorkerPool::start(test_config(1), engine);
    let mut rx = pool.subscribe();

    let ids = pool
        .submit_batch(vec![spec("/videos/a.mp4", out.path())])
        .await
        .unwrap();

    let (events, _) = collect_until_complete(&mut rx).await;

    let percents: Vec<f64> = events
        .iter()
        .filter_map(|event| match event {
            CoreEvent::Progress { job_id, percent } if job_id == &ids[0] => Some(*percent),
            _ => None,
        })
        .collect();

    assert!(!percents.is_empty());
    assert!(
        percents.windows(2).all(|pair| pair[0] <= pair[1]),
        "progress went backwards: {percents:?}"
    );
    assert_eq!(*percents.last().unwrap(), 100.0);
    assert_eq!(terminal_status(&events, &ids[0]), Some(JobStatus::Succeeded));

    pool.shutdown(ShutdownMode::Graceful).await;
}

#[tokio::test]
async fn cancelling_a_queued_job_spawns_nothing() {
    let out = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new(4, Duration::from_millis(10)));

    let pool = WorkerPool::start(test_config(1), engine.clone());
    let mut rx = pool.subscribe();

    pool.pause();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let ids = pool
        .submit_batch(vec![spec("/videos/a.mp4", out.path())])
        .await
        .unwrap();
    pool.cancel_job(&ids[0]).await.unwrap();

    let (events, summary) = collect_until_complete(&mut rx).await;
    assert_eq!(summary.cancelled, 1);
    assert_eq!(terminal_status(&events, &ids[0]), Some(JobStatus::Cancelled));
    assert_eq!(engine.probe_calls.load(Ordering::SeqCst), 0);
    assert!(engine.encode_calls.lock().unwrap().is_empty());

    pool.shutdown(ShutdownMode::Graceful).await;
}

#[tokio::test]
async fn cancelling_an_encoding_job_yields_cancelled_not_failed() {
    let out = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new(100, Duration::from_millis(20)));

    let pool = WorkerPool::start(test_config(1), engine);
    let mut rx = pool.subscribe();

    let ids = pool
        .submit_batch(vec![spec("/videos/a.mp4", out.path())])
        .await
        .unwrap();

    // wait until the encode is producing progress, then cancel
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no progress before cancel")
            .expect("bus closed")
        {
            CoreEvent::Progress { .. } => break,
            _ => {}
        }
    }
    pool.cancel_job(&ids[0]).await.unwrap();

    let (events, summary) = collect_until_complete(&mut rx).await;
    assert_eq!(summary.cancelled, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(terminal_status(&events, &ids[0]), Some(JobStatus::Cancelled));

    pool.shutdown(ShutdownMode::Graceful).await;
}

#[tokio::test]
async fn environment_failure_aborts_the_whole_batch() {
    let out = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        FakeEngine::new(4, Duration::from_millis(10)).with_env_failure("/videos/a.mp4"),
    );

    let pool = WorkerPool::start(test_config(1), engine);
    let mut rx = pool.subscribe();

    let ids = pool
        .submit_batch(vec![
            spec("/videos/a.mp4", out.path()),
            spec("/videos/b.mp4", out.path()),
            spec("/videos/c.mp4", out.path()),
        ])
        .await
        .unwrap();

    let (events, summary) = collect_until_complete(&mut rx).await;

    assert_eq!(summary.failed, 3);
    assert_eq!(summary.succeeded, 0);
    for id in &ids {
        assert_eq!(terminal_status(&events, id), Some(JobStatus::Failed));
    }

    pool.shutdown(ShutdownMode::Graceful).await;
}

#[tokio::test]
async fn transient_failure_is_retried_once() {
    let out = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        FakeEngine::new(4, Duration::from_millis(5))
            .with_transient_failures("/videos/a.mp4", 1),
    );

    let pool = WorkerPool::start(test_config(1), engine.clone());
    let mut rx = pool.subscribe();

    let ids = pool
        .submit_batch(vec![spec("/videos/a.mp4", out.path())])
        .await
        .unwrap();

    let (events, summary) = collect_until_complete(&mut rx).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(terminal_status(&events, &ids[0]), Some(JobStatus::Succeeded));
    assert_eq!(engine.encode_calls_for(Path::new("/videos/a.mp4")), 2);

    pool.shutdown(ShutdownMode::Graceful).await;
}

#[tokio::test]
async fn repeated_transient_failures_exhaust_the_retry_budget() {
    let out = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        FakeEngine::new(4, Duration::from_millis(5))
            .with_transient_failures("/videos/a.mp4", 10),
    );

    let pool = WorkerPool::start(test_config(1), engine.clone());
    let mut rx = pool.subscribe();

    let ids = pool
        .submit_batch(vec![spec("/videos/a.mp4", out.path())])
        .await
        .unwrap();

    let (events, summary) = collect_until_complete(&mut rx).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(terminal_status(&events, &ids[0]), Some(JobStatus::Failed));
    // initial attempt plus the single permitted retry
    assert_eq!(engine.encode_calls_for(Path::new("/videos/a.mp4")), 2);

    pool.shutdown(ShutdownMode::Graceful).await;
}

#[tokio::test]
async fn pause_holds_back_queued_work_until_resume() {
    let out = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new(2, Duration::from_millis(5)));

    let pool = WorkerPool::start(test_config(2), engine.clone());
    let rx = pool.subscribe();

    pool.pause();
    tokio::time::sleep(Duration::from_millis(20)).await;

    pool.submit_batch(vec![spec("/videos/a.mp4", out.path())])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.probe_calls.load(Ordering::SeqCst), 0);

    pool.resume();
    pool.wait_idle().await;
    let summary = pool.summary().await;
    assert_eq!(summary.succeeded, 1);
    drop(rx);

    pool.shutdown(ShutdownMode::Graceful).await;
}

#[tokio::test]
async fn invalid_specs_fail_fast_without_sinking_the_batch() {
    let out = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new(2, Duration::from_millis(5)));

    let pool = WorkerPool::start(test_config(1), engine);
    let mut rx = pool.subscribe();

    let ids = pool
        .submit_batch(vec![
            spec("/videos/a.mp4", out.path()),
            spec("/videos/b.mp4", out.path()).with_format("avi"),
        ])
        .await
        .unwrap();

    let (events, summary) = collect_until_complete(&mut rx).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    let failure = events.iter().find_map(|event| match event {
        CoreEvent::Terminal { job_id, error, .. } if job_id == &ids[1] => error.clone(),
        _ => None,
    });
    assert!(failure.unwrap().contains("unsupported output format"));

    pool.shutdown(ShutdownMode::Graceful).await;
}
