//! Bounded-concurrency worker pool.
//!
//! The pool drains the queue through a semaphore so at most N jobs are in
//! flight, runs each job in its own task (one job's fault never touches a
//! sibling), and funnels every observable change through a single
//! aggregator task that owns the batch accumulator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vbatch_media::MediaEngine;
use vbatch_models::{BatchSummary, CoreEvent, Job, JobId, JobSpec, JobStatus};
use vbatch_queue::{EventBus, JobQueue, QueueError, QueueResult};

use crate::config::WorkerConfig;
use crate::failure::FailureClass;
use crate::output::OutputPlanner;
use crate::processor::{self, JobOutcome};

/// How to stop the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Stop dequeuing, cancel whatever is still queued, let in-flight
    /// jobs finish.
    Graceful,
    /// Additionally cancel all in-flight jobs.
    Immediate,
}

/// Internal events feeding the aggregator.
#[derive(Debug)]
pub(crate) enum PoolEvent {
    Admitted {
        job_id: JobId,
    },
    Probed {
        job_id: JobId,
        duration_seconds: f64,
    },
    Progress {
        job_id: JobId,
        percent: f64,
    },
    Terminal {
        job_id: JobId,
        status: JobStatus,
        error: Option<String>,
    },
    /// Sentinel: everything before this has been processed.
    Closed,
}

struct JobTrack {
    /// Estimated-duration weight; 1.0 until probed
    weight: f64,
    percent: f64,
    /// Failed and cancelled jobs leave the weighted aggregate
    counted: bool,
}

#[derive(Default)]
struct BatchAggregate {
    jobs: HashMap<JobId, JobTrack>,
    total: usize,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

impl BatchAggregate {
    fn admit(&mut self, job_id: JobId) {
        self.jobs.insert(
            job_id,
            JobTrack {
                weight: 1.0,
                percent: 0.0,
                counted: true,
            },
        );
        self.total += 1;
    }

    fn probed(&mut self, job_id: &JobId, duration_seconds: f64) {
        if let Some(track) = self.jobs.get_mut(job_id) {
            track.weight = duration_seconds.max(f64::EPSILON);
        }
    }

    /// Clamp-to-monotone per job; returns the percent to publish.
    fn progress(&mut self, job_id: &JobId, percent: f64) -> f64 {
        match self.jobs.get_mut(job_id) {
            Some(track) => {
                track.percent = track.percent.max(percent.min(100.0));
                track.percent
            }
            None => percent.min(100.0),
        }
    }

    fn terminal(&mut self, job_id: &JobId, status: JobStatus) {
        match status {
            JobStatus::Succeeded => {
                self.succeeded += 1;
                if let Some(track) = self.jobs.get_mut(job_id) {
                    track.percent = 100.0;
                }
            }
            JobStatus::Failed => {
                self.failed += 1;
                if let Some(track) = self.jobs.get_mut(job_id) {
                    track.counted = false;
                }
            }
            JobStatus::Cancelled => {
                self.cancelled += 1;
                if let Some(track) = self.jobs.get_mut(job_id) {
                    track.counted = false;
                }
            }
            _ => {}
        }
    }

    fn remaining(&self) -> usize {
        self.total
            .saturating_sub(self.succeeded + self.failed + self.cancelled)
    }

    fn summary(&self) -> BatchSummary {
        let mut weight_sum = 0.0;
        let mut weighted = 0.0;
        for track in self.jobs.values().filter(|t| t.counted) {
            weight_sum += track.weight;
            weighted += track.weight * track.percent;
        }
        let overall_percent = if weight_sum > 0.0 {
            weighted / weight_sum
        } else if self.total > 0 && self.remaining() == 0 {
            100.0
        } else {
            0.0
        };

        BatchSummary {
            overall_percent,
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            cancelled: self.cancelled,
            remaining: self.remaining(),
        }
    }
}

struct PoolInner {
    config: WorkerConfig,
    engine: Arc<dyn MediaEngine>,
    queue: JobQueue,
    bus: EventBus,
    semaphore: Arc<Semaphore>,
    target_concurrency: Mutex<usize>,
    paused_tx: watch::Sender<bool>,
    shutdown_tx: watch::Sender<bool>,
    inflight: Mutex<HashMap<JobId, watch::Sender<bool>>>,
    agg_tx: mpsc::UnboundedSender<PoolEvent>,
    aggregate: Mutex<BatchAggregate>,
    planner: OutputPlanner,
    next_index: AtomicU64,
}

/// Bounded-concurrency scheduler over the job queue.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    driver: JoinHandle<()>,
    aggregator: JoinHandle<()>,
}

impl WorkerPool {
    /// Spawn the pool with `config.concurrency` encode slots.
    pub fn start(config: WorkerConfig, engine: Arc<dyn MediaEngine>) -> Self {
        let (agg_tx, agg_rx) = mpsc::unbounded_channel();
        let (paused_tx, _) = watch::channel(false);
        let (shutdown_tx, _) = watch::channel(false);

        let inner = Arc::new(PoolInner {
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            target_concurrency: Mutex::new(config.concurrency),
            planner: OutputPlanner::new(config.overwrite),
            bus: EventBus::new(config.event_capacity),
            queue: JobQueue::new(),
            inflight: Mutex::new(HashMap::new()),
            aggregate: Mutex::new(BatchAggregate::default()),
            next_index: AtomicU64::new(1),
            config,
            engine,
            agg_tx,
            paused_tx,
            shutdown_tx,
        });

        let aggregator = tokio::spawn(run_aggregator(Arc::clone(&inner), agg_rx));
        let driver = tokio::spawn(run_driver(Arc::clone(&inner)));

        info!(
            concurrency = inner.config.concurrency,
            "worker pool started"
        );
        Self {
            inner,
            driver,
            aggregator,
        }
    }

    /// Validate specs and enqueue the resulting jobs.
    ///
    /// Specs that fail validation still get a job id and an immediate
    /// Failed terminal event; the rest of the batch proceeds.
    pub async fn submit_batch(&self, specs: Vec<JobSpec>) -> QueueResult<Vec<JobId>> {
        if self.inner.queue.is_closed().await {
            return Err(QueueError::Closed);
        }

        let mut ids = Vec::with_capacity(specs.len());
        let mut accepted = Vec::new();
        for spec in specs {
            let index = self.inner.next_index.fetch_add(1, Ordering::Relaxed);
            match Job::from_spec(spec, index) {
                Ok(job) => {
                    ids.push(job.id.clone());
                    let _ = self.inner.agg_tx.send(PoolEvent::Admitted {
                        job_id: job.id.clone(),
                    });
                    accepted.push(job);
                }
                Err(err) => {
                    let job_id = JobId::new();
                    warn!(job_id = %job_id, "rejecting spec: {err}");
                    ids.push(job_id.clone());
                    let _ = self.inner.agg_tx.send(PoolEvent::Admitted {
                        job_id: job_id.clone(),
                    });
                    let _ = self.inner.agg_tx.send(PoolEvent::Terminal {
                        job_id,
                        status: JobStatus::Failed,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let accepted_ids: Vec<JobId> = accepted.iter().map(|job| job.id.clone()).collect();
        if let Err(err) = self.inner.queue.enqueue(accepted).await {
            // Lost the race with a concurrent shutdown; surface the jobs
            // as cancelled rather than leaving them dangling.
            for job_id in accepted_ids {
                let _ = self.inner.agg_tx.send(PoolEvent::Terminal {
                    job_id,
                    status: JobStatus::Cancelled,
                    error: None,
                });
            }
            return Err(err);
        }

        Ok(ids)
    }

    /// Subscribe to the progress/terminal/summary event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.inner.bus.subscribe()
    }

    /// Stop new dequeues; in-flight jobs keep running.
    pub fn pause(&self) {
        info!("worker pool paused");
        let _ = self.inner.paused_tx.send(true);
    }

    /// Resume dequeuing.
    pub fn resume(&self) {
        info!("worker pool resumed");
        let _ = self.inner.paused_tx.send(false);
    }

    /// Change the number of encode slots. Growth applies immediately;
    /// shrinking applies as running jobs release their slots.
    pub async fn set_concurrency(&self, concurrency: usize) {
        let concurrency = concurrency.max(1);
        let mut target = self.inner.target_concurrency.lock().await;
        let current = *target;
        if concurrency > current {
            self.inner.semaphore.add_permits(concurrency - current);
        } else if concurrency < current {
            let delta = (current - concurrency) as u32;
            let semaphore = Arc::clone(&self.inner.semaphore);
            tokio::spawn(async move {
                if let Ok(permits) = semaphore.acquire_many_owned(delta).await {
                    permits.forget();
                }
            });
        }
        *target = concurrency;
        info!(concurrency, "concurrency updated");
    }

    /// Cancel one job: a queued job goes straight to Cancelled with no
    /// process spawned; an encoding job is signalled and terminates
    /// within one progress-parsing iteration.
    pub async fn cancel_job(&self, id: &JobId) -> QueueResult<()> {
        if let Some(mut job) = self.inner.queue.cancel(id).await {
            job.cancel();
            let _ = self.inner.agg_tx.send(PoolEvent::Terminal {
                job_id: job.id,
                status: JobStatus::Cancelled,
                error: None,
            });
            return Ok(());
        }
        if let Some(cancel) = self.inner.inflight.lock().await.get(id) {
            let _ = cancel.send(true);
            return Ok(());
        }
        Err(QueueError::JobNotFound(id.to_string()))
    }

    /// Cancel everything: queued jobs immediately, in-flight jobs via
    /// their signal.
    pub async fn cancel_all(&self) {
        cancel_pending(&self.inner).await;
    }

    /// Snapshot of the aggregate batch state.
    pub async fn summary(&self) -> BatchSummary {
        self.inner.aggregate.lock().await.summary()
    }

    /// Block until every admitted job is terminal.
    pub async fn wait_idle(&self) {
        loop {
            let summary = self.summary().await;
            if summary.total > 0 && summary.remaining == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    /// Stop the pool and wait for it to wind down.
    pub async fn shutdown(self, mode: ShutdownMode) {
        info!(?mode, "worker pool shutting down");
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.queue.close().await;

        cancel_pending(&self.inner).await;
        if mode == ShutdownMode::Immediate {
            for cancel in self.inner.inflight.lock().await.values() {
                let _ = cancel.send(true);
            }
        }

        let wait_inflight = async {
            loop {
                if self.inner.inflight.lock().await.is_empty() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.inner.config.shutdown_timeout, wait_inflight)
            .await
            .is_err()
        {
            warn!("in-flight jobs did not finish within the shutdown timeout");
        }

        self.driver.await.ok();
        let _ = self.inner.agg_tx.send(PoolEvent::Closed);
        self.aggregator.await.ok();
        info!("worker pool stopped");
    }
}

/// Fail/cancel everything still queued without touching in-flight jobs.
async fn cancel_pending(inner: &Arc<PoolInner>) {
    for mut job in inner.queue.drain().await {
        job.cancel();
        let _ = inner.agg_tx.send(PoolEvent::Terminal {
            job_id: job.id,
            status: JobStatus::Cancelled,
            error: None,
        });
    }
}

/// Environment failures recur for every job; drain the queue to Failed and
/// cancel in-flight siblings.
async fn abort_batch(inner: &Arc<PoolInner>, detail: &str) {
    warn!("environment failure, aborting batch: {detail}");
    for mut job in inner.queue.drain().await {
        job.fail(detail.to_string());
        let _ = inner.agg_tx.send(PoolEvent::Terminal {
            job_id: job.id,
            status: JobStatus::Failed,
            error: Some(detail.to_string()),
        });
    }
    for cancel in inner.inflight.lock().await.values() {
        let _ = cancel.send(true);
    }
}

/// Dequeue loop: one permit, one job, one spawned task.
async fn run_driver(inner: Arc<PoolInner>) {
    let mut shutdown_rx = inner.shutdown_tx.subscribe();
    let mut paused_rx = inner.paused_tx.subscribe();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        if *paused_rx.borrow() {
            tokio::select! {
                _ = paused_rx.changed() => {}
                _ = shutdown_rx.changed() => {}
            }
            continue;
        }

        let permit = tokio::select! {
            permit = Arc::clone(&inner.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown_rx.changed() => continue,
        };

        let job = tokio::select! {
            job = inner.queue.dequeue() => job,
            _ = paused_rx.changed() => {
                drop(permit);
                continue;
            }
            _ = shutdown_rx.changed() => {
                drop(permit);
                continue;
            }
        };

        match job {
            Some(job) => {
                // Register the cancel handle before the job task exists, so
                // cancel_job never misses a job that left the queue.
                let (cancel_tx, cancel_rx) = watch::channel(false);
                inner
                    .inflight
                    .lock()
                    .await
                    .insert(job.id.clone(), cancel_tx);
                let inner = Arc::clone(&inner);
                tokio::spawn(run_job(inner, job, permit, cancel_rx));
            }
            // Queue closed and drained
            None => break,
        }
    }

    debug!("worker pool driver stopped");
}

/// One job end-to-end, isolated in its own task.
async fn run_job(
    inner: Arc<PoolInner>,
    mut job: Job,
    permit: OwnedSemaphorePermit,
    cancel_rx: watch::Receiver<bool>,
) {
    let _permit = permit;

    let outcome = processor::execute(
        &inner.config,
        inner.engine.as_ref(),
        &inner.planner,
        &inner.agg_tx,
        &mut job,
        cancel_rx,
    )
    .await;

    inner.inflight.lock().await.remove(&job.id);

    match outcome {
        JobOutcome::Succeeded => {
            let _ = inner.agg_tx.send(PoolEvent::Terminal {
                job_id: job.id,
                status: JobStatus::Succeeded,
                error: None,
            });
        }
        JobOutcome::Cancelled => {
            let _ = inner.agg_tx.send(PoolEvent::Terminal {
                job_id: job.id,
                status: JobStatus::Cancelled,
                error: None,
            });
        }
        JobOutcome::Failed { detail, class } => {
            let _ = inner.agg_tx.send(PoolEvent::Terminal {
                job_id: job.id,
                status: JobStatus::Failed,
                error: Some(detail.clone()),
            });
            if class == FailureClass::Environment {
                abort_batch(&inner, &detail).await;
            }
        }
    }
}

/// Single-owner aggregator: applies every event to the batch accumulator
/// and republishes on the bus with a fresh summary.
async fn run_aggregator(inner: Arc<PoolInner>, mut rx: mpsc::UnboundedReceiver<PoolEvent>) {
    while let Some(event) = rx.recv().await {
        let mut aggregate = inner.aggregate.lock().await;
        match event {
            PoolEvent::Admitted { job_id } => aggregate.admit(job_id),
            PoolEvent::Probed {
                job_id,
                duration_seconds,
            } => aggregate.probed(&job_id, duration_seconds),
            PoolEvent::Progress { job_id, percent } => {
                let clamped = aggregate.progress(&job_id, percent);
                inner.bus.progress(job_id, clamped);
            }
            PoolEvent::Terminal {
                job_id,
                status,
                error,
            } => {
                aggregate.terminal(&job_id, status);
                inner.bus.terminal(job_id, status, error);
            }
            PoolEvent::Closed => break,
        }
        inner.bus.summary(aggregate.summary());
    }
    debug!("worker pool aggregator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> JobId {
        JobId::from_string(s)
    }

    #[test]
    fn aggregate_weights_by_duration() {
        let mut agg = BatchAggregate::default();
        agg.admit(id("a"));
        agg.admit(id("b"));
        agg.probed(&id("a"), 100.0);
        agg.probed(&id("b"), 300.0);

        agg.progress(&id("a"), 100.0);
        agg.progress(&id("b"), 0.0);

        // 100s done out of 400s total
        let summary = agg.summary();
        assert!((summary.overall_percent - 25.0).abs() < 0.001);
        assert_eq!(summary.remaining, 2);
    }

    #[test]
    fn aggregate_progress_is_monotone() {
        let mut agg = BatchAggregate::default();
        agg.admit(id("a"));
        assert_eq!(agg.progress(&id("a"), 40.0), 40.0);
        assert_eq!(agg.progress(&id("a"), 25.0), 40.0);
        assert_eq!(agg.progress(&id("a"), 400.0), 100.0);
    }

    #[test]
    fn failed_jobs_leave_the_aggregate() {
        let mut agg = BatchAggregate::default();
        agg.admit(id("a"));
        agg.admit(id("b"));
        agg.probed(&id("a"), 100.0);
        agg.probed(&id("b"), 100.0);

        agg.progress(&id("a"), 50.0);
        agg.terminal(&id("b"), JobStatus::Failed);

        let summary = agg.summary();
        assert!((summary.overall_percent - 50.0).abs() < 0.001);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.remaining, 1);
    }

    #[test]
    fn all_terminal_without_weights_reads_complete() {
        let mut agg = BatchAggregate::default();
        agg.admit(id("a"));
        agg.terminal(&id("a"), JobStatus::Failed);

        let summary = agg.summary();
        assert_eq!(summary.overall_percent, 100.0);
        assert!(summary.is_complete());
    }
}
