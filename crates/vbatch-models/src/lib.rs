//! Shared data models for the vbatch transcoding core.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job specs and lifecycle status
//! - Probed media facts
//! - Quality presets and container formats
//! - Output-name templates
//! - The collaborator-facing event stream

pub mod events;
pub mod format;
pub mod job;
pub mod media_info;
pub mod quality;
pub mod status;
pub mod template;

// Re-export common types
pub use events::{BatchSummary, CoreEvent};
pub use format::{OutputFormat, DEFAULT_AUDIO_BITRATE, INPUT_EXTENSIONS};
pub use job::{Job, JobId, JobSpec, SpecError};
pub use media_info::MediaInfo;
pub use quality::{QualityPreset, QualitySettings};
pub use status::JobStatus;
pub use template::{TemplateContext, TemplateError};
