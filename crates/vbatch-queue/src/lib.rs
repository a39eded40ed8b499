//! In-memory job queue and event bus.
//!
//! This crate provides:
//! - A FIFO queue with exactly-once dequeue across concurrent workers
//! - Cancellation of still-queued jobs
//! - A broadcast event bus carrying progress, terminal and summary events

pub mod error;
pub mod events;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use events::{EventBus, DEFAULT_EVENT_CAPACITY};
pub use queue::JobQueue;
