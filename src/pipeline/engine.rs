//! Synchronous owner of the core components.
//!
//! The engine is what one pipeline drives on every frame: events go in through
//! [`Engine::ingest`], timers advance through [`Engine::tick`], and readers take
//! copies of the published state. It never blocks and never fails on the
//! per-frame path; configuration changes are the only fallible operations.

use crate::config::{Config, ConfigError};
use crate::core::calibration::{CalibrationError, CalibrationPlane};
use crate::core::game::{ActivationOutcome, CommandError, GameSnapshot, InteractionStateMachine, SessionSummary};
use crate::core::physio::{FusedAssessment, PhysiologicalSummary};
use crate::core::signal::{BpmEstimate, SignalWindow};
use crate::core::zones::{TrackedPoint, Zone, ZoneReport, ZoneTracker};
use crate::source::types::{LandmarkEvent, PointObservation, Sample};
use crate::store::Snapshot;
use crate::telemetry::SharedCounters;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Whether tracked points can currently be mapped onto the floor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CalibrationStatus {
    Uncalibrated,
    Calibrated,
    Failed(String),
}

/// Everything a status publisher needs, copied out under one lock.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub bpm: BpmEstimate,
    pub zones: ZoneReport,
    pub game: GameSnapshot,
    pub calibration: CalibrationStatus,
}

pub struct Engine {
    signal: SignalWindow,
    plane: CalibrationPlane,
    tracker: ZoneTracker,
    game: InteractionStateMachine,
    calibration_status: CalibrationStatus,
    /// Externally supplied labels; the BPM is overlaid from the window
    physiology: PhysiologicalSummary,
    bpm: BpmEstimate,
    mirror_input: bool,
    max_feet_spread: f64,
    frame_budget: Duration,
    counters: SharedCounters,
    finished: Vec<SessionSummary>,
    last_outcomes: Vec<ActivationOutcome>,
}

impl Engine {
    pub fn new(config: &Config, counters: SharedCounters) -> Self {
        Self::with_game(
            config,
            InteractionStateMachine::new(config.game.clone()),
            counters,
        )
    }

    /// Build with a caller-supplied state machine (seeded in tests).
    pub fn with_game(config: &Config, game: InteractionStateMachine, counters: SharedCounters) -> Self {
        Self {
            signal: SignalWindow::new(config.signal.clone()),
            plane: CalibrationPlane::new(config.calibration.canonical_size),
            tracker: ZoneTracker::new(config.zones.clone()),
            game,
            calibration_status: CalibrationStatus::Uncalibrated,
            physiology: PhysiologicalSummary::from_bpm(BpmEstimate::Unknown),
            bpm: BpmEstimate::Unknown,
            mirror_input: config.pipeline.mirror_input,
            max_feet_spread: config.pipeline.max_feet_spread,
            frame_budget: config.pipeline.frame_budget,
            counters,
            finished: Vec::new(),
            last_outcomes: Vec::new(),
        }
    }

    /// Apply one acquisition event.
    pub fn ingest(&mut self, event: LandmarkEvent) {
        match event {
            LandmarkEvent::Sample(sample) => self.ingest_sample(sample),
            LandmarkEvent::Point { observation, at } => self.ingest_point(observation, at),
            LandmarkEvent::Feet { feet, at } => {
                self.ingest_point(feet.tracked_point(self.max_feet_spread), at)
            }
        }
    }

    fn ingest_sample(&mut self, sample: Sample) {
        let result = self.signal.push(sample);
        self.counters.record_sample(result.is_ok());
        if let Err(e) = result {
            debug!("Dropped sample: {e}");
        }
    }

    fn ingest_point(&mut self, observation: PointObservation, at: f64) {
        self.counters.record_point(observation.detected);

        let observation = if self.mirror_input {
            observation.mirrored()
        } else {
            observation
        };
        let tracked = if observation.detected {
            self.plane
                .map_point(observation.x, observation.y)
                .map(TrackedPoint::at)
                .unwrap_or_else(TrackedPoint::missing)
        } else {
            TrackedPoint::missing()
        };

        let activations = self.tracker.update(tracked, at);
        if activations.is_empty() {
            return;
        }
        self.counters.record_activations(activations.len() as u64);
        self.last_outcomes = activations
            .iter()
            .map(|a| self.game.handle_activate(a.zone_id, a.at))
            .collect();
    }

    /// Refresh the heart-rate estimate and advance game timers.
    pub fn tick(&mut self, now: f64) {
        if self.signal.needs_estimate() {
            let started = Instant::now();
            let estimate = self.signal.estimate();
            let elapsed = started.elapsed();
            self.counters.record_estimate(self.signal.last_error().is_some());

            if elapsed > self.frame_budget {
                warn!(
                    "Estimate took {:?}, over the {:?} frame budget; keeping {}",
                    elapsed, self.frame_budget, self.bpm
                );
                self.counters.record_budget_overrun();
            } else {
                self.bpm = estimate;
            }
        } else {
            self.bpm = self.signal.last_estimate();
        }

        self.game.adapt_difficulty(&PhysiologicalSummary {
            bpm: self.bpm,
            ..self.physiology.clone()
        });

        if let Some(summary) = self.game.tick(now) {
            self.finished.push(summary);
        }
    }

    pub fn get_bpm(&self) -> BpmEstimate {
        self.bpm
    }

    pub fn get_zone_state(&self) -> ZoneReport {
        self.tracker.report()
    }

    pub fn get_game_state(&self, now: f64) -> GameSnapshot {
        self.game.snapshot(now)
    }

    pub fn status(&self, now: f64) -> EngineStatus {
        EngineStatus {
            bpm: self.bpm,
            zones: self.tracker.report(),
            game: self.game.snapshot(now),
            calibration: self.calibration_status.clone(),
        }
    }

    /// Outcomes of the activations from the most recent point that produced any.
    pub fn last_outcomes(&self) -> &[ActivationOutcome] {
        &self.last_outcomes
    }

    pub fn assessment(&self) -> FusedAssessment {
        FusedAssessment::from_summary(&PhysiologicalSummary {
            bpm: self.bpm,
            ..self.physiology.clone()
        })
    }

    /// Replace the externally classified labels (emotion, fatigue, activity...).
    pub fn set_physiology(&mut self, summary: PhysiologicalSummary) {
        self.physiology = summary;
    }

    pub fn set_ready(&mut self) -> Result<(), CommandError> {
        self.game.set_ready()
    }

    pub fn start_game(&mut self, now: f64) -> Result<(), CommandError> {
        self.game.start(now)
    }

    pub fn pause(&mut self, now: f64) -> Result<(), CommandError> {
        self.game.pause(now)
    }

    pub fn resume(&mut self, now: f64) -> Result<(), CommandError> {
        self.game.resume(now)
    }

    /// Stop the game. An interrupted round is queued with the finished ones.
    pub fn stop_game(&mut self, now: f64) {
        if let Some(summary) = self.game.stop(now) {
            self.finished.push(summary);
        }
    }

    /// Sessions that ended since the last call.
    pub fn take_finished_sessions(&mut self) -> Vec<SessionSummary> {
        std::mem::take(&mut self.finished)
    }

    pub fn set_calibration_point(&mut self, index: usize, x: f64, y: f64) -> Result<(), CalibrationError> {
        self.plane.set_point(index, x, y)?;
        self.calibration_status = CalibrationStatus::Uncalibrated;
        self.tracker.reset();
        Ok(())
    }

    pub fn compute_homography(&mut self) -> Result<(), CalibrationError> {
        match self.plane.compute_homography() {
            Ok(_) => {
                self.calibration_status = CalibrationStatus::Calibrated;
                self.tracker.reset();
                Ok(())
            }
            Err(e) => {
                warn!("Calibration failed: {e}");
                self.calibration_status = CalibrationStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    pub fn configure_zones(&mut self, zones: Vec<Zone>) -> Result<(), ConfigError> {
        self.tracker.configure_zones(zones)
    }

    /// Apply a stored snapshot. Nothing changes unless both parts are valid.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ConfigError> {
        let zones = snapshot.to_zones()?;
        let plane = snapshot.to_plane()?;

        self.tracker.configure_zones(zones)?;
        if let Some(plane) = plane {
            self.plane = plane;
            self.calibration_status = CalibrationStatus::Calibrated;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_parts(&self.plane, self.tracker.zones())
    }

    pub fn calibration_status(&self) -> &CalibrationStatus {
        &self.calibration_status
    }

    /// Forget all samples, e.g. after the camera was repositioned.
    pub fn reset_signal(&mut self) {
        self.signal.reset();
        self.bpm = BpmEstimate::Unknown;
    }
}
