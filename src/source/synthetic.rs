//! Deterministic stand-in for a camera and landmark model.
//!
//! Produces a pulse-modulated skin signal and walks a tracked point through a
//! scripted list of floor positions. Used by the CLI `run` command, the demo
//! and the integration tests.

use crate::core::calibration::{CanonicalSize, Point};
use crate::core::zones::Zone;
use crate::source::types::{PointObservation, Sample};
use crate::source::LandmarkSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// One leg of the scripted walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkStep {
    pub duration_secs: f64,
    /// Camera-normalized position, `None` while out of view
    pub position: Option<(f64, f64)>,
}

impl WalkStep {
    pub fn stand(duration_secs: f64, x: f64, y: f64) -> Self {
        Self {
            duration_secs,
            position: Some((x, y)),
        }
    }

    pub fn away(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            position: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Simulated heart rate in Hz
    pub pulse_hz: f64,
    pub amplitude: f64,
    pub baseline: f64,
    /// Linear baseline drift per second (lighting change)
    pub drift_per_sec: f64,
    /// Half-width of uniform noise added to each sample
    pub noise: f64,
    /// Jitter added to the tracked point, in normalized units
    pub point_jitter: f64,
    /// Walk script, repeated forever
    pub walk: Vec<WalkStep>,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            pulse_hz: 1.2,
            amplitude: 0.02,
            baseline: 1.0,
            drift_per_sec: 0.0005,
            noise: 0.002,
            point_jitter: 0.002,
            walk: vec![
                WalkStep::stand(2.0, 0.5, 0.85),
                WalkStep::stand(1.5, 0.25, 0.4),
                WalkStep::stand(1.5, 0.5, 0.4),
                WalkStep::stand(1.5, 0.75, 0.4),
                WalkStep::away(0.5),
            ],
            seed: 42,
        }
    }
}

/// Calibration corners matching the default walk, in calibration order.
pub const DEMO_CORNERS: [[f64; 2]; 4] = [[0.1, 0.1], [0.9, 0.1], [0.9, 0.9], [0.1, 0.9]];

/// Floor layout matching the default walk: a start pad and three targets.
pub fn demo_zones(size: CanonicalSize) -> Vec<Zone> {
    let (w, h) = (size.width, size.height);
    let radius = w.min(h) * 0.14;
    vec![
        Zone::circle(0, "start", Point::new(w * 0.5, h * 0.92), radius * 0.6),
        Zone::circle(1, "left", Point::new(w * 0.1875, h * 0.375), radius),
        Zone::circle(2, "center", Point::new(w * 0.5, h * 0.375), radius),
        Zone::circle(3, "right", Point::new(w * 0.8125, h * 0.375), radius),
    ]
}

#[derive(Debug)]
pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    started_at: Option<f64>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            started_at: None,
        }
    }

    fn elapsed(&mut self, now: f64) -> f64 {
        now - *self.started_at.get_or_insert(now)
    }

    fn noise(&mut self, half_width: f64) -> f64 {
        if half_width > 0.0 {
            self.rng.gen_range(-half_width..=half_width)
        } else {
            0.0
        }
    }

    /// Walk position at `t` seconds into the script.
    fn position_at(&self, t: f64) -> Option<(f64, f64)> {
        let cycle: f64 = self.config.walk.iter().map(|s| s.duration_secs.max(0.0)).sum();
        if cycle <= 0.0 {
            return None;
        }
        let mut offset = t.rem_euclid(cycle);
        for step in &self.config.walk {
            if offset < step.duration_secs {
                return step.position;
            }
            offset -= step.duration_secs.max(0.0);
        }
        self.config.walk.last().and_then(|s| s.position)
    }
}

impl LandmarkSource for SyntheticSource {
    fn next_sample(&mut self, now: f64) -> Option<Sample> {
        let t = self.elapsed(now);
        let c = &self.config;
        let clean = c.baseline + c.drift_per_sec * t + c.amplitude * (2.0 * PI * c.pulse_hz * t).sin();
        let noise = self.noise(self.config.noise);
        Some(Sample::new(now, clean + noise))
    }

    fn next_point(&mut self, now: f64) -> PointObservation {
        let t = self.elapsed(now);
        match self.position_at(t) {
            Some((x, y)) => {
                let jitter = self.config.point_jitter;
                let (dx, dy) = (self.noise(jitter), self.noise(jitter));
                PointObservation::detected((x + dx).clamp(0.0, 1.0), (y + dy).clamp(0.0, 1.0))
            }
            None => PointObservation::missing(),
        }
    }
}
