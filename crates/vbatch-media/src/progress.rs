//! FFmpeg progress records.

use serde::{Deserialize, Serialize};

/// One progress snapshot from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether the encode reported completion
    pub is_complete: bool,
}

impl EncodeProgress {
    /// Percent-complete given the input's total duration in milliseconds,
    /// clamped to 100.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_clamps_at_100() {
        let progress = EncodeProgress {
            out_time_ms: 5000,
            ..Default::default()
        };

        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert!((progress.percentage(5000) - 100.0).abs() < 0.01);
        assert!((progress.percentage(2000) - 100.0).abs() < 0.01);
    }

    #[test]
    fn percentage_with_unknown_duration_is_zero() {
        let progress = EncodeProgress {
            out_time_ms: 5000,
            ..Default::default()
        };
        assert_eq!(progress.percentage(0), 0.0);
    }
}
