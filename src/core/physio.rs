//! Physiological summary, difficulty tiers and fused assessment.

use crate::core::signal::BpmEstimate;
use serde::{Deserialize, Serialize};

/// Coarse level used for fatigue and activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    #[default]
    Unknown,
    None,
    Low,
    Medium,
    High,
}

/// Emotion label from the external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Happy,
    Excited,
    #[default]
    Neutral,
    Surprise,
    Sad,
    Tired,
    Angry,
    Fear,
    Disgust,
}

/// Hand gesture label from the external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    Pointing,
    OpenHand,
    Victory,
    Fist,
    Unknown,
    #[default]
    None,
}

/// Everything the state machine knows about the user for difficulty decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysiologicalSummary {
    pub bpm: BpmEstimate,
    #[serde(default)]
    pub fatigue: Level,
    #[serde(default)]
    pub emotion: Emotion,
    #[serde(default)]
    pub activity: Level,
    /// Attention in [0, 1], 0.5 when unknown
    #[serde(default = "default_attention")]
    pub attention: f64,
    #[serde(default)]
    pub gesture: Gesture,
    /// Whether the user is currently interacting with a target
    #[serde(default)]
    pub interacting: bool,
}

fn default_attention() -> f64 {
    0.5
}

impl PhysiologicalSummary {
    pub fn from_bpm(bpm: BpmEstimate) -> Self {
        Self {
            bpm,
            attention: default_attention(),
            ..Default::default()
        }
    }
}

/// Ordered difficulty tiers. Easier tiers keep targets up longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl DifficultyTier {
    /// Multiplier applied to both stay duration and spawn delay.
    pub fn scale(&self) -> f64 {
        match self {
            DifficultyTier::Easy => 1.5,
            DifficultyTier::Normal => 1.0,
            DifficultyTier::Hard => 0.75,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DifficultyTier::Easy => "easy",
            DifficultyTier::Normal => "normal",
            DifficultyTier::Hard => "hard",
        }
    }
}

impl std::fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// BPM thresholds for tier selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmThresholds {
    /// Above this the user is working hard; play gets easier
    pub high_bpm: u32,
    /// Below this the user is at rest; play gets harder
    pub low_bpm: u32,
}

impl Default for BpmThresholds {
    fn default() -> Self {
        Self {
            high_bpm: 90,
            low_bpm: 60,
        }
    }
}

/// Pick the tier for a summary.
///
/// Later rules override earlier ones. Fatigue is applied last so a tired user
/// is never pushed harder. The result depends only on `summary` and `current`,
/// so reapplying the same summary is a no-op.
pub fn classify_difficulty(
    summary: &PhysiologicalSummary,
    current: DifficultyTier,
    thresholds: &BpmThresholds,
) -> DifficultyTier {
    let mut tier = match summary.bpm {
        BpmEstimate::Known(bpm) if bpm > thresholds.high_bpm => DifficultyTier::Easy,
        BpmEstimate::Known(bpm) if bpm < thresholds.low_bpm => DifficultyTier::Hard,
        BpmEstimate::Known(_) => DifficultyTier::Normal,
        BpmEstimate::Unknown => current,
    };

    match summary.emotion {
        Emotion::Sad | Emotion::Tired => tier = DifficultyTier::Easy,
        Emotion::Happy | Emotion::Excited => tier = DifficultyTier::Hard,
        _ => {}
    }

    match summary.activity {
        Level::High => tier = DifficultyTier::Hard,
        Level::Low => tier = DifficultyTier::Easy,
        _ => {}
    }

    if summary.fatigue == Level::High {
        tier = DifficultyTier::Easy;
    }

    tier
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    ReduceIntensity,
    IncreaseEngagement,
    IncreaseDifficulty,
    MaintainCurrent,
}

/// Health and engagement scores derived from a summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedAssessment {
    pub health_score: f64,
    pub health_status: &'static str,
    pub engagement_score: f64,
    pub engagement_status: &'static str,
    pub recommendation: Recommendation,
}

const BASELINE_BPM: f64 = 70.0;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn health_score(summary: &PhysiologicalSummary) -> f64 {
    let bpm_score = match summary.bpm {
        BpmEstimate::Known(bpm) => {
            let deviation = (bpm as f64 - BASELINE_BPM).abs() / BASELINE_BPM;
            (1.0 - deviation * 2.0).max(0.0)
        }
        BpmEstimate::Unknown => 0.5,
    };
    let fatigue_score = match summary.fatigue {
        Level::Low => 1.0,
        Level::Medium => 0.7,
        Level::High => 0.3,
        _ => 0.5,
    };
    let emotion_score = match summary.emotion {
        Emotion::Happy => 1.0,
        Emotion::Neutral => 0.8,
        Emotion::Surprise => 0.7,
        Emotion::Sad => 0.4,
        Emotion::Angry | Emotion::Fear | Emotion::Disgust => 0.3,
        Emotion::Excited | Emotion::Tired => 0.5,
    };

    round2(0.3 * bpm_score + 0.3 * fatigue_score + 0.4 * emotion_score)
}

pub fn engagement_score(summary: &PhysiologicalSummary) -> f64 {
    let activity_score = match summary.activity {
        Level::High => 1.0,
        Level::Medium => 0.8,
        Level::Low => 0.5,
        Level::None => 0.2,
        Level::Unknown => 0.5,
    };
    let gesture_score = match summary.gesture {
        Gesture::Pointing => 1.0,
        Gesture::OpenHand => 0.9,
        Gesture::Victory => 0.8,
        Gesture::Fist => 0.6,
        Gesture::Unknown => 0.4,
        Gesture::None => 0.2,
    };
    let interaction_score = if summary.interacting { 0.8 } else { 0.3 };
    let attention = summary.attention.clamp(0.0, 1.0);

    round2(0.3 * attention + 0.3 * activity_score + 0.2 * gesture_score + 0.2 * interaction_score)
}

impl FusedAssessment {
    pub fn from_summary(summary: &PhysiologicalSummary) -> Self {
        let health = health_score(summary);
        let engagement = engagement_score(summary);

        let recommendation = if health < 0.4 {
            Recommendation::ReduceIntensity
        } else if engagement < 0.4 {
            Recommendation::IncreaseEngagement
        } else if health > 0.7 && engagement > 0.7 {
            Recommendation::IncreaseDifficulty
        } else {
            Recommendation::MaintainCurrent
        };

        Self {
            health_score: health,
            health_status: band(health, "good", "moderate", "poor"),
            engagement_score: engagement,
            engagement_status: band(engagement, "high", "medium", "low"),
            recommendation,
        }
    }
}

fn band(score: f64, high: &'static str, mid: &'static str, low: &'static str) -> &'static str {
    if score > 0.7 {
        high
    } else if score > 0.4 {
        mid
    } else {
        low
    }
}
