//! Quality presets mapped to encoder settings.

use serde::{Deserialize, Serialize};

/// Encoder settings a preset expands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualitySettings {
    /// Constant Rate Factor (0-51, lower is better)
    pub crf: u8,
    /// Encoder speed/efficiency preset
    pub preset: &'static str,
    /// Fixed output resolution, when the preset pins one
    pub resolution: Option<(u32, u32)>,
}

/// Named quality preset selected per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
    #[serde(rename = "144p")]
    P144,
    #[serde(rename = "240p")]
    P240,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "2160p")]
    P2160,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::VeryLow => "very_low",
            QualityPreset::Low => "low",
            QualityPreset::Medium => "medium",
            QualityPreset::High => "high",
            QualityPreset::VeryHigh => "very_high",
            QualityPreset::P144 => "144p",
            QualityPreset::P240 => "240p",
            QualityPreset::P360 => "360p",
            QualityPreset::P480 => "480p",
            QualityPreset::P720 => "720p",
            QualityPreset::P1080 => "1080p",
            QualityPreset::P1440 => "1440p",
            QualityPreset::P2160 => "2160p",
        }
    }

    /// Expand the preset into concrete encoder settings.
    pub fn settings(&self) -> QualitySettings {
        match self {
            QualityPreset::VeryLow => QualitySettings {
                crf: 35,
                preset: "veryfast",
                resolution: None,
            },
            QualityPreset::Low => QualitySettings {
                crf: 28,
                preset: "faster",
                resolution: None,
            },
            QualityPreset::Medium => QualitySettings {
                crf: 23,
                preset: "medium",
                resolution: None,
            },
            QualityPreset::High => QualitySettings {
                crf: 18,
                preset: "slow",
                resolution: None,
            },
            QualityPreset::VeryHigh => QualitySettings {
                crf: 15,
                preset: "veryslow",
                resolution: None,
            },
            QualityPreset::P144 => QualitySettings {
                crf: 28,
                preset: "faster",
                resolution: Some((256, 144)),
            },
            QualityPreset::P240 => QualitySettings {
                crf: 26,
                preset: "medium",
                resolution: Some((426, 240)),
            },
            QualityPreset::P360 => QualitySettings {
                crf: 24,
                preset: "medium",
                resolution: Some((640, 360)),
            },
            QualityPreset::P480 => QualitySettings {
                crf: 22,
                preset: "medium",
                resolution: Some((854, 480)),
            },
            QualityPreset::P720 => QualitySettings {
                crf: 20,
                preset: "medium",
                resolution: Some((1280, 720)),
            },
            QualityPreset::P1080 => QualitySettings {
                crf: 18,
                preset: "medium",
                resolution: Some((1920, 1080)),
            },
            QualityPreset::P1440 => QualitySettings {
                crf: 16,
                preset: "slow",
                resolution: Some((2560, 1440)),
            },
            QualityPreset::P2160 => QualitySettings {
                crf: 15,
                preset: "slow",
                resolution: Some((3840, 2160)),
            },
        }
    }
}

impl std::fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "very_low" => Ok(QualityPreset::VeryLow),
            "low" => Ok(QualityPreset::Low),
            "medium" => Ok(QualityPreset::Medium),
            "high" => Ok(QualityPreset::High),
            "very_high" => Ok(QualityPreset::VeryHigh),
            "144p" => Ok(QualityPreset::P144),
            "240p" => Ok(QualityPreset::P240),
            "360p" => Ok(QualityPreset::P360),
            "480p" => Ok(QualityPreset::P480),
            "720p" => Ok(QualityPreset::P720),
            "1080p" => Ok(QualityPreset::P1080),
            "1440p" => Ok(QualityPreset::P1440),
            "2160p" => Ok(QualityPreset::P2160),
            other => Err(format!("unknown quality preset: {other}")),
        }
    }
}
