//! Core sensing and decision logic.
//!
//! This module contains:
//! - DSP primitives and the sliding-window heart-rate estimator
//! - Floor calibration (homography) and dwell-based zone activation
//! - Physiological summary, difficulty tiers and the interaction state machine
//!
//! Everything here is synchronous and takes time as explicit seconds.

pub mod calibration;
pub mod dsp;
pub mod game;
pub mod physio;
pub mod signal;
pub mod zones;

// Re-export commonly used types
pub use calibration::{
    CalibrationError, CalibrationPlane, CalibrationSnapshot, CanonicalSize, Homography, Point,
};
pub use dsp::SignalError;
pub use game::{
    ActivationOutcome, CommandError, GameConfig, GameSnapshot, GameStatus,
    InteractionStateMachine, SessionSummary,
};
pub use physio::{
    classify_difficulty, BpmThresholds, DifficultyTier, Emotion, FusedAssessment, Gesture, Level,
    PhysiologicalSummary, Recommendation,
};
pub use signal::{BpmEstimate, SampleError, SignalConfig, SignalWindow};
pub use zones::{
    Activation, DwellConfig, MatchPolicy, Shape, TrackedPoint, Zone, ZoneId, ZoneProgress,
    ZoneReport, ZoneTracker,
};
