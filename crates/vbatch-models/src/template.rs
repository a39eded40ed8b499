//! Output-name templates.
//!
//! A template is a string with `{name}` placeholders resolved from a
//! per-job [`TemplateContext`]. The registry is a lookup map rather than
//! hard-coded branches so collaborators can inject additional values.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use thiserror::Error;

use crate::media_info::MediaInfo;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern"));

static RESERVED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("reserved character pattern"));

/// Placeholders every context built by [`TemplateContext::for_job`] knows.
pub const STANDARD_PLACEHOLDERS: &[&str] = &[
    "filename",
    "ext",
    "quality",
    "date",
    "time",
    "datetime",
    "resolution",
    "codec",
    "duration",
    "index",
    "source",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,

    #[error("unknown placeholder: {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("template contains filesystem-reserved characters: {0}")]
    ReservedCharacters(String),
}

/// Read-only snapshot of per-job values, built at resolution time and
/// never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    /// Build the standard context for one job.
    ///
    /// `now` is passed in so resolution stays deterministic for callers
    /// that need it (tests, dry runs).
    pub fn for_job(
        input_path: &Path,
        quality: &str,
        sequence_index: u64,
        now: DateTime<Local>,
    ) -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            "filename".to_string(),
            input_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        values.insert(
            "ext".to_string(),
            input_path
                .extension()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        values.insert(
            "source".to_string(),
            input_path
                .parent()
                .and_then(|p| p.file_name())
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        values.insert("quality".to_string(), quality.to_string());
        values.insert("index".to_string(), sequence_index.to_string());
        values.insert("date".to_string(), now.format("%Y-%m-%d").to_string());
        values.insert("time".to_string(), now.format("%H-%M-%S").to_string());
        values.insert(
            "datetime".to_string(),
            now.format("%Y-%m-%d_%H-%M-%S").to_string(),
        );
        Self { values }
    }

    /// Add the stream-derived values once the input has been probed.
    pub fn with_media(mut self, info: &MediaInfo) -> Self {
        self.values
            .insert("resolution".to_string(), info.resolution_string());
        self.values
            .insert("codec".to_string(), info.video_codec.clone());
        self.values.insert(
            "duration".to_string(),
            format!("{:.1}", info.duration_seconds),
        );
        self
    }

    /// Inject or override a single value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Resolve a template against this context and sanitize the result
    /// into a safe filename stem.
    pub fn resolve(&self, template: &str) -> Result<String, TemplateError> {
        if template.trim().is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let whole = caps.get(0).expect("capture 0 always present");
            let name = &caps[1];
            let value = self
                .get(name)
                .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
            out.push_str(&template[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&template[last..]);

        Ok(sanitize_filename(&out))
    }
}

/// Pre-flight check of a template against the standard registry, so typos
/// surface before any job is built.
pub fn validate(template: &str) -> Result<(), TemplateError> {
    if template.trim().is_empty() {
        return Err(TemplateError::Empty);
    }
    if RESERVED_CHARS.is_match(template) {
        return Err(TemplateError::ReservedCharacters(template.to_string()));
    }
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if !STANDARD_PLACEHOLDERS.iter().any(|known| *known == name) {
            return Err(TemplateError::UnknownPlaceholder(name.to_string()));
        }
    }
    Ok(())
}

/// Replace filesystem-reserved characters and trim the edges; an empty
/// result becomes `unnamed`.
pub fn sanitize_filename(name: &str) -> String {
    let safe = RESERVED_CHARS.replace_all(name, "_");
    let safe = safe.trim_matches(|c| c == ' ' || c == '.');
    if safe.is_empty() {
        "unnamed".to_string()
    } else {
        safe.to_string()
    }
}
