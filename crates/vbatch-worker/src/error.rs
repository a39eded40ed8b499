//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("media error: {0}")]
    Media(#[from] vbatch_media::MediaError),

    #[error("queue error: {0}")]
    Queue(#[from] vbatch_queue::QueueError),

    #[error("invalid job spec: {0}")]
    Spec(#[from] vbatch_models::SpecError),

    #[error("template error: {0}")]
    Template(#[from] vbatch_models::TemplateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
