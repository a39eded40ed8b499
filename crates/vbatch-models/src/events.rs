//! Collaborator-facing event types.
//!
//! The core emits these over an in-process bus; a GUI is one possible
//! subscriber, a CLI another.

use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::status::JobStatus;

/// Aggregate batch state, recomputed on every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Duration-weighted mean progress across the batch
    pub overall_percent: f64,
    /// Jobs admitted so far
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Jobs not yet in a terminal state
    pub remaining: usize,
}

impl BatchSummary {
    /// True once every admitted job has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.remaining == 0
    }
}

/// Event stream envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    /// Per-job progress update (0-100, non-decreasing)
    Progress {
        #[serde(rename = "jobId")]
        job_id: JobId,
        percent: f64,
    },

    /// Per-job terminal notification
    Terminal {
        #[serde(rename = "jobId")]
        job_id: JobId,
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Batch-level summary
    Summary(BatchSummary),
}

impl CoreEvent {
    pub fn progress(job_id: JobId, percent: f64) -> Self {
        CoreEvent::Progress { job_id, percent }
    }

    pub fn terminal(job_id: JobId, status: JobStatus, error: Option<String>) -> Self {
        CoreEvent::Terminal {
            job_id,
            status,
            error,
        }
    }

    pub fn summary(summary: BatchSummary) -> Self {
        CoreEvent::Summary(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_event_wire_shape() {
        let event = CoreEvent::progress(JobId::from_string("job-1"), 42.5);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["percent"], 42.5);
    }

    #[test]
    fn terminal_event_omits_absent_error() {
        let event = CoreEvent::terminal(JobId::from_string("job-1"), JobStatus::Succeeded, None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn summary_uses_camel_case() {
        let summary = BatchSummary {
            overall_percent: 50.0,
            total: 4,
            succeeded: 1,
            failed: 1,
            cancelled: 0,
            remaining: 2,
        };
        let json = serde_json::to_value(CoreEvent::summary(summary.clone())).unwrap();
        assert_eq!(json["overallPercent"], 50.0);
        assert_eq!(json["remaining"], 2);
        assert!(!summary.is_complete());
    }
}
