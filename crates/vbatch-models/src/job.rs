//! Job specs and the job lifecycle record.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::format::{self, OutputFormat};
use crate::media_info::MediaInfo;
use crate::quality::QualityPreset;
use crate::status::JobStatus;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised while turning a spec into a job, before any process runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("unsupported output format: {0}")]
    UnsupportedOutputFormat(String),

    #[error("unsupported input container: {0}")]
    UnsupportedInput(String),

    #[error("invalid target spec: {0}")]
    InvalidTargetSpec(String),
}

/// One conversion request as submitted by a collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Input video file
    pub input_path: PathBuf,
    /// Directory the output lands in
    pub output_dir: PathBuf,
    /// Output naming template
    pub template: String,
    /// Requested output container, validated at job-build time
    pub format: String,
    /// Quality preset
    #[serde(default)]
    pub quality: QualityPreset,
    /// Explicit output resolution, overriding the preset's
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<(u32, u32)>,
    /// Desired output size in bytes; enables two-pass rate control
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_size_bytes: Option<u64>,
}

impl JobSpec {
    pub fn new(input_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_dir: output_dir.into(),
            template: "{filename}".to_string(),
            format: "mp4".to_string(),
            quality: QualityPreset::default(),
            resolution: None,
            target_size_bytes: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_quality(mut self, quality: QualityPreset) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some((width, height));
        self
    }

    pub fn with_target_size(mut self, bytes: u64) -> Self {
        self.target_size_bytes = Some(bytes);
        self
    }
}

/// One input-file-to-output-file conversion and its lifecycle state.
///
/// Created when a batch is submitted and mutated only by the worker that
/// owns it after dequeue; other tasks observe it through events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    /// Input video file
    pub input_path: PathBuf,
    /// Directory the output lands in
    pub output_dir: PathBuf,
    /// Output naming template
    pub template: String,
    /// Validated output container
    pub format: OutputFormat,
    /// Quality preset
    pub quality: QualityPreset,
    /// Explicit resolution override
    pub resolution: Option<(u32, u32)>,
    /// Desired output size in bytes
    pub target_size_bytes: Option<u64>,
    /// 1-based position within the submitted batch; feeds `{index}`
    pub sequence_index: u64,
    /// Resolved output path, set once the template is applied
    pub output_path: Option<PathBuf>,
    /// Probed stream facts, set once per job
    pub media: Option<MediaInfo>,
    /// Lifecycle status
    pub status: JobStatus,
    /// Encode progress, 0-100, non-decreasing while encoding
    pub progress_percent: f64,
    /// Failure detail, present iff status is Failed
    pub error_detail: Option<String>,
    /// Zero-based retry attempt
    pub attempt: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When a worker picked the job up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Validate a spec and build the queued job record.
    pub fn from_spec(spec: JobSpec, sequence_index: u64) -> Result<Self, SpecError> {
        let format = OutputFormat::parse(&spec.format)
            .ok_or_else(|| SpecError::UnsupportedOutputFormat(spec.format.clone()))?;

        if !format::is_supported_input(&spec.input_path) {
            return Err(SpecError::UnsupportedInput(
                spec.input_path.to_string_lossy().into_owned(),
            ));
        }

        if spec.target_size_bytes == Some(0) {
            return Err(SpecError::InvalidTargetSpec(
                "target size must be positive".to_string(),
            ));
        }

        Ok(Self {
            id: JobId::new(),
            input_path: spec.input_path,
            output_dir: spec.output_dir,
            template: spec.template,
            format,
            quality: spec.quality,
            resolution: spec.resolution,
            target_size_bytes: spec.target_size_bytes,
            sequence_index,
            output_path: None,
            media: None,
            status: JobStatus::Queued,
            progress_percent: 0.0,
            error_detail: None,
            attempt: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        })
    }

    /// The owning worker has started probing the input.
    pub fn mark_probing(&mut self) {
        self.status = JobStatus::Probing;
        self.started_at = Some(Utc::now());
    }

    /// The encode process has been launched.
    pub fn mark_encoding(&mut self) {
        self.status = JobStatus::Encoding;
    }

    /// Advance progress; never moves backwards.
    pub fn set_progress(&mut self, percent: f64) {
        if percent > self.progress_percent {
            self.progress_percent = percent.min(100.0);
        }
    }

    pub fn succeed(&mut self) {
        self.status = JobStatus::Succeeded;
        self.progress_percent = 100.0;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, detail: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_detail = Some(detail.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec::new("/videos/clip.mp4", "/out")
    }

    #[test]
    fn build_validates_output_format() {
        let err = Job::from_spec(spec().with_format("avi"), 1).unwrap_err();
        assert_eq!(err, SpecError::UnsupportedOutputFormat("avi".to_string()));

        let job = Job::from_spec(spec().with_format("MKV"), 1).unwrap();
        assert_eq!(job.format, OutputFormat::Mkv);
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn build_validates_input_container() {
        let bad = JobSpec::new("/music/song.flac", "/out");
        assert!(matches!(
            Job::from_spec(bad, 1),
            Err(SpecError::UnsupportedInput(_))
        ));
    }

    #[test]
    fn build_rejects_zero_target_size() {
        let err = Job::from_spec(spec().with_target_size(0), 1).unwrap_err();
        assert!(matches!(err, SpecError::InvalidTargetSpec(_)));
    }

    #[test]
    fn progress_is_monotone() {
        let mut job = Job::from_spec(spec(), 1).unwrap();
        job.set_progress(40.0);
        job.set_progress(25.0);
        assert_eq!(job.progress_percent, 40.0);
        job.set_progress(140.0);
        assert_eq!(job.progress_percent, 100.0);
    }

    #[test]
    fn terminal_transitions() {
        let mut job = Job::from_spec(spec(), 1).unwrap();
        job.mark_probing();
        assert!(job.started_at.is_some());
        job.mark_encoding();
        job.succeed();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.progress_percent, 100.0);
        assert!(job.finished_at.is_some());

        let mut job = Job::from_spec(spec(), 2).unwrap();
        job.fail("boom");
        assert_eq!(job.error_detail.as_deref(), Some("boom"));
    }
}
