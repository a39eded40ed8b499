//! FIFO job queue shared by the worker pool.
//!
//! All mutation happens under one lock, so no two workers can ever pop
//! the same job. Waiting dequeuers are woken on enqueue and on close.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use vbatch_models::{Job, JobId};

use crate::error::{QueueError, QueueResult};

#[derive(Default)]
struct Inner {
    jobs: VecDeque<Job>,
    closed: bool,
}

/// Ordered queue of jobs awaiting a worker.
pub struct JobQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// Append jobs in submission order.
    pub async fn enqueue(&self, jobs: Vec<Job>) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(QueueError::Closed);
        }
        for job in jobs {
            debug!(job_id = %job.id, "enqueued job");
            inner.jobs.push_back(job);
            self.notify.notify_one();
        }
        Ok(())
    }

    /// Pop the next job, waiting until one is available. Returns `None`
    /// once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<Job> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(job) = inner.jobs.pop_front() {
                    return Some(job);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Pop the next job if one is immediately available.
    pub async fn try_dequeue(&self) -> Option<Job> {
        self.inner.lock().await.jobs.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.jobs.is_empty()
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    /// Remove a still-queued job. Jobs already handed to a worker are the
    /// pool's concern.
    pub async fn cancel(&self, id: &JobId) -> Option<Job> {
        let mut inner = self.inner.lock().await;
        let pos = inner.jobs.iter().position(|job| &job.id == id)?;
        inner.jobs.remove(pos)
    }

    /// Take everything still queued (batch abort, shutdown).
    pub async fn drain(&self) -> Vec<Job> {
        let mut inner = self.inner.lock().await;
        inner.jobs.drain(..).collect()
    }

    /// Stop accepting jobs and wake every waiting dequeuer.
    pub async fn close(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.closed = true;
        }
        self.notify.notify_waiters();
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use vbatch_models::JobSpec;

    use super::*;

    fn jobs(n: usize) -> Vec<Job> {
        (0..n)
            .map(|i| {
                Job::from_spec(
                    JobSpec::new(format!("/videos/clip{i}.mp4"), "/out"),
                    i as u64 + 1,
                )
                .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let queue = JobQueue::new();
        let batch = jobs(3);
        let expected: Vec<JobId> = batch.iter().map(|j| j.id.clone()).collect();
        queue.enqueue(batch).await.unwrap();

        for id in expected {
            assert_eq!(queue.dequeue().await.unwrap().id, id);
        }
        assert!(queue.is_empty().await);
        assert!(queue.try_dequeue().await.is_none());
    }

    #[tokio::test]
    async fn try_dequeue_never_waits() {
        let queue = JobQueue::new();
        assert!(queue.try_dequeue().await.is_none());
        queue.enqueue(jobs(1)).await.unwrap();
        assert!(queue.try_dequeue().await.is_some());
    }

    #[tokio::test]
    async fn concurrent_dequeue_is_exactly_once() {
        let queue = Arc::new(JobQueue::new());
        let batch = jobs(100);
        let all_ids: HashSet<JobId> = batch.iter().map(|j| j.id.clone()).collect();
        queue.enqueue(batch).await.unwrap();
        queue.close().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Some(job) = queue.dequeue().await {
                    taken.push(job.id);
                }
                taken
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "job dequeued twice");
            }
        }
        assert_eq!(seen, all_ids);
    }

    #[tokio::test]
    async fn dequeue_wakes_on_enqueue() {
        let queue = Arc::new(JobQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.enqueue(jobs(1)).await.unwrap();

        let job = waiter.await.unwrap();
        assert!(job.is_some());
    }

    #[tokio::test]
    async fn cancel_removes_only_the_target() {
        let queue = JobQueue::new();
        let batch = jobs(3);
        let target = batch[1].id.clone();
        queue.enqueue(batch).await.unwrap();

        let removed = queue.cancel(&target).await.unwrap();
        assert_eq!(removed.id, target);
        assert_eq!(queue.len().await, 2);
        assert!(queue.cancel(&JobId::new()).await.is_none());
    }

    #[tokio::test]
    async fn close_rejects_enqueue_and_wakes_waiters() {
        let queue = Arc::new(JobQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.close().await;

        assert!(waiter.await.unwrap().is_none());
        assert_eq!(queue.enqueue(jobs(1)).await, Err(QueueError::Closed));
    }
}
