//! Companion Sense - camera-driven sensing core for an interactive floor companion.
//!
//! This library turns per-frame landmark observations into three outputs:
//! a heart-rate estimate from facial skin color, dwell-based activation of
//! floor zones from a tracked foot point, and the state of a timed
//! reaction game that adapts its difficulty to the player's physiology.
//!
//! Camera I/O and landmark inference stay outside the crate; anything that
//! implements [`source::LandmarkSource`] can feed the pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Companion Sense                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │ Landmark     │──▶│ SignalWindow │──▶│ BPM estimate         │  │
//! │  │ Source       │   │ (rPPG)       │   │   │                  │  │
//! │  │ (worker)     │   └──────────────┘   │   ▼                  │  │
//! │  │              │   ┌──────────────┐   │ Interaction          │  │
//! │  │              │──▶│ Calibration  │   │ StateMachine         │  │
//! │  └──────────────┘   │ Plane        │   │   ▲                  │  │
//! │                     └──────┬───────┘   └───┼──────────────────┘  │
//! │                            ▼               │                     │
//! │                     ┌──────────────┐       │                     │
//! │                     │ ZoneTracker  │───────┘ activations         │
//! │                     └──────────────┘                             │
//! │  ┌──────────────┐   ┌──────────────┐                             │
//! │  │ ConfigStore  │   │ Telemetry    │                             │
//! │  └──────────────┘   └──────────────┘                             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use companion_sense::{Config, Pipeline, PipelineCounters, SyntheticConfig, SyntheticSource};
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let counters = Arc::new(PipelineCounters::new());
//! let mut pipeline = Pipeline::new(config, counters).expect("valid config");
//!
//! pipeline
//!     .start(SyntheticSource::new(SyntheticConfig::default()))
//!     .expect("pipeline should start");
//! println!("BPM: {}", pipeline.get_bpm());
//! pipeline.dispose().expect("pipeline should stop");
//! ```

pub mod config;
pub mod core;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod telemetry;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, PipelineConfig};
pub use crate::core::{
    BpmEstimate, CalibrationError, CalibrationPlane, CommandError, DifficultyTier, GameSnapshot,
    GameStatus, InteractionStateMachine, PhysiologicalSummary, SessionSummary, SignalWindow, Zone,
    ZoneTracker,
};
pub use pipeline::{CalibrationStatus, Engine, EngineStatus, Pipeline, PipelineError};
pub use source::{LandmarkSource, SyntheticConfig, SyntheticSource};
pub use store::{ConfigStore, JsonFileStore, MemoryStore, Snapshot};
pub use telemetry::{PipelineCounters, SessionHistory, SharedCounters};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
