//! Frame-derived observations published by landmark sources.
//!
//! These types carry only what the core needs: one scalar per frame for the
//! heart-rate window and one tracked point per frame for the floor zones.
//! Landmark inference itself happens upstream.

use serde::{Deserialize, Serialize};

/// One scalar reading of the skin region, stamped in monotonic seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Capture time in seconds
    pub timestamp: f64,
    /// Scalar value (usually a green-channel intensity ratio)
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Build a sample from the mean green intensity of each ROI patch, normalized
    /// by the mean green intensity of the whole frame.
    ///
    /// Returns `None` when no ROI was visible this frame.
    pub fn from_roi_means(timestamp: f64, roi_means: &[f64], frame_mean: f64) -> Option<Self> {
        if roi_means.is_empty() {
            return None;
        }
        let roi_mean = roi_means.iter().sum::<f64>() / roi_means.len() as f64;
        Some(Self::new(timestamp, roi_mean / (frame_mean + 1e-6)))
    }

    /// Whether both fields are usable numbers.
    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite() && self.value.is_finite()
    }
}

/// A tracked point in camera-normalized coordinates (0..1 on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointObservation {
    pub x: f64,
    pub y: f64,
    /// False when the landmark was not found this frame
    pub detected: bool,
}

impl PointObservation {
    pub fn detected(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            detected: true,
        }
    }

    pub fn missing() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            detected: false,
        }
    }

    /// Flip horizontally, for cameras whose frames are mirrored before inference.
    pub fn mirrored(self) -> Self {
        Self {
            x: 1.0 - self.x,
            ..self
        }
    }
}

/// A single pose landmark with its visibility score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub visibility: f64,
}

/// Minimum visibility for an ankle landmark to be trusted.
pub const ANKLE_VISIBILITY_THRESHOLD: f64 = 0.5;

/// Default maximum distance between the two ankles, in normalized units.
pub const DEFAULT_MAX_FEET_SPREAD: f64 = 0.45;

/// Left and right ankle landmarks from one pose estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FootPair {
    pub left: Landmark,
    pub right: Landmark,
}

impl FootPair {
    /// Collapse both ankles into the tracked point used for the floor zones.
    ///
    /// The point is only detected when both ankles are visible and the feet are
    /// close together; a wide stance is reported as not detected.
    pub fn tracked_point(&self, max_spread: f64) -> PointObservation {
        if self.left.visibility <= ANKLE_VISIBILITY_THRESHOLD
            || self.right.visibility <= ANKLE_VISIBILITY_THRESHOLD
        {
            return PointObservation::missing();
        }

        let spread = (self.left.x - self.right.x).hypot(self.left.y - self.right.y);
        if spread >= max_spread {
            return PointObservation::missing();
        }

        PointObservation::detected(
            (self.left.x + self.right.x) / 2.0,
            (self.left.y + self.right.y) / 2.0,
        )
    }
}

/// Unified event type published by the acquisition worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LandmarkEvent {
    Sample(Sample),
    Point {
        observation: PointObservation,
        /// Acquisition time in seconds
        at: f64,
    },
    /// Raw ankle pair, collapsed into a tracked point by the engine
    Feet { feet: FootPair, at: f64 },
}

impl LandmarkEvent {
    pub fn timestamp(&self) -> f64 {
        match self {
            LandmarkEvent::Sample(s) => s.timestamp,
            LandmarkEvent::Point { at, .. } | LandmarkEvent::Feet { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ankle(x: f64, y: f64, visibility: f64) -> Landmark {
        Landmark { x, y, visibility }
    }

    #[test]
    fn test_roi_ratio() {
        let sample = Sample::from_roi_means(1.0, &[100.0, 110.0, 120.0], 100.0).unwrap();
        assert!((sample.value - 1.1).abs() < 1e-6);
        assert_eq!(sample.timestamp, 1.0);

        assert!(Sample::from_roi_means(1.0, &[], 100.0).is_none());
    }

    #[test]
    fn test_non_finite_sample() {
        assert!(Sample::new(0.0, 1.0).is_finite());
        assert!(!Sample::new(0.0, f64::NAN).is_finite());
        assert!(!Sample::new(f64::INFINITY, 1.0).is_finite());
    }

    #[test]
    fn test_mirroring() {
        let p = PointObservation::detected(0.25, 0.4).mirrored();
        assert!((p.x - 0.75).abs() < 1e-12);
        assert_eq!(p.y, 0.4);
        assert!(p.detected);
    }

    #[test]
    fn test_feet_midpoint() {
        let pair = FootPair {
            left: ankle(0.4, 0.8, 0.9),
            right: ankle(0.5, 0.8, 0.9),
        };
        let point = pair.tracked_point(DEFAULT_MAX_FEET_SPREAD);
        assert!(point.detected);
        assert!((point.x - 0.45).abs() < 1e-12);
        assert!((point.y - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_feet_rejected_when_hidden_or_apart() {
        let hidden = FootPair {
            left: ankle(0.4, 0.8, 0.3),
            right: ankle(0.5, 0.8, 0.9),
        };
        assert!(!hidden.tracked_point(DEFAULT_MAX_FEET_SPREAD).detected);

        let apart = FootPair {
            left: ankle(0.1, 0.8, 0.9),
            right: ankle(0.9, 0.8, 0.9),
        };
        assert!(!apart.tracked_point(DEFAULT_MAX_FEET_SPREAD).detected);
    }

    #[test]
    fn test_feet_event_timestamp() {
        let event = LandmarkEvent::Feet {
            feet: FootPair {
                left: ankle(0.4, 0.8, 0.9),
                right: ankle(0.5, 0.8, 0.9),
            },
            at: 3.25,
        };
        assert_eq!(event.timestamp(), 3.25);
    }
}
