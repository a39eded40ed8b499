//! Worker pool scheduler for batch transcoding.
//!
//! This crate provides:
//! - A bounded-concurrency pool draining the job queue
//! - The per-job pipeline (probe, plan output, derive rate, invoke)
//! - Failure classification and the retry policy
//! - Output path planning with collision handling
//! - The CLI collaborator

pub mod cli;
pub mod config;
pub mod error;
pub mod failure;
pub mod logging;
pub mod output;
pub mod pool;
pub mod processor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use failure::{FailureClass, RetryPolicy};
pub use logging::JobLogger;
pub use output::OutputPlanner;
pub use pool::{ShutdownMode, WorkerPool};
