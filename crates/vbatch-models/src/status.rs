//! Job lifecycle status.

use serde::{Deserialize, Serialize};

/// Where a job currently is in its lifecycle.
///
/// Only the worker that owns a job moves it forward; everyone else observes
/// transitions through the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue for a worker slot
    #[default]
    Queued,
    /// Input metadata is being extracted
    Probing,
    /// The encode process is running
    Encoding,
    /// Output written and the process exited cleanly
    Succeeded,
    /// Terminal failure; detail travels with the terminal event
    Failed,
    /// Cancelled before or during the encode
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Probing => "probing",
            JobStatus::Encoding => "encoding",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Probing.is_terminal());
        assert!(!JobStatus::Encoding.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn serde_names_are_snake_case() {
        let json = serde_json::to_string(&JobStatus::Encoding).unwrap();
        assert_eq!(json, "\"encoding\"");
    }
}
