//! Structured job logging.

use tracing::{error, info, warn, Span};

use vbatch_models::JobId;

/// Logger carrying job context through the pipeline stages.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, stage: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage: stage.to_string(),
        }
    }

    pub fn start(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "job started: {}", message);
    }

    pub fn progress(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "job progress: {}", message);
    }

    pub fn warning(&self, message: &str) {
        warn!(job_id = %self.job_id, stage = %self.stage, "job warning: {}", message);
    }

    pub fn error(&self, message: &str) {
        error!(job_id = %self.job_id, stage = %self.stage, "job error: {}", message);
    }

    pub fn completion(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "job completed: {}", message);
    }

    /// Create a tracing span carrying the job context.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, stage = %self.stage)
    }
}
