//! Floor zones with dwell-based activation.
//!
//! Zones live in canonical-plane coordinates. A zone activates once the tracked
//! point has stayed inside it for the dwell duration; it then sits out a cooldown
//! before dwell may accrue again, even if the point never leaves.

use crate::config::ConfigError;
use crate::core::calibration::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

pub type ZoneId = u32;

/// Zone geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Polygon { vertices: Vec<Point> },
    Circle { center: Point, radius: f64 },
}

impl Shape {
    pub fn contains(&self, p: Point) -> bool {
        match self {
            Shape::Polygon { vertices } => point_in_polygon(p, vertices),
            Shape::Circle { center, radius } => {
                let (dx, dy) = (p.x - center.x, p.y - center.y);
                dx * dx + dy * dy <= radius * radius
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Shape::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(format!("polygon needs 3 vertices, got {}", vertices.len()));
                }
                if !vertices.iter().all(Point::is_finite) {
                    return Err("polygon has non-finite vertex".to_string());
                }
            }
            Shape::Circle { center, radius } => {
                if !center.is_finite() {
                    return Err("circle center is not finite".to_string());
                }
                if !(radius.is_finite() && *radius > 0.0) {
                    return Err(format!("circle radius must be positive, got {radius}"));
                }
            }
        }
        Ok(())
    }
}

/// Even-odd ray casting towards +x.
fn point_in_polygon(p: Point, vertices: &[Point]) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (a, b) = (vertices[i], vertices[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// A named region. Priority is its position in the configured list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub shape: Shape,
}

impl Zone {
    pub fn polygon(id: ZoneId, name: impl Into<String>, vertices: Vec<Point>) -> Self {
        Self {
            id,
            name: name.into(),
            shape: Shape::Polygon { vertices },
        }
    }

    pub fn circle(id: ZoneId, name: impl Into<String>, center: Point, radius: f64) -> Self {
        Self {
            id,
            name: name.into(),
            shape: Shape::Circle { center, radius },
        }
    }

    /// Axis-aligned rectangle as a four-vertex polygon.
    pub fn rect(id: ZoneId, name: impl Into<String>, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self::polygon(
            id,
            name,
            vec![
                Point::new(x, y),
                Point::new(x + w, y),
                Point::new(x + w, y + h),
                Point::new(x, y + h),
            ],
        )
    }
}

/// Validate a zone list without applying it.
pub fn validate_zones(zones: &[Zone]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for zone in zones {
        if !seen.insert(zone.id) {
            return Err(ConfigError::DuplicateZoneId(zone.id));
        }
        zone.shape
            .validate()
            .map_err(|reason| ConfigError::InvalidZone { id: zone.id, reason })?;
    }
    Ok(())
}

/// How overlapping zones share the tracked point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Every containing zone accrues dwell
    #[default]
    Independent,
    /// Only the highest-priority containing zone accrues dwell
    FirstMatch,
}

/// Dwell timing and overlap policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DwellConfig {
    /// Seconds inside a zone before it activates
    pub dwell_secs: f64,
    /// Seconds after an activation during which the zone cannot accrue
    pub cooldown_secs: f64,
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            dwell_secs: 1.0,
            cooldown_secs: 0.5,
            match_policy: MatchPolicy::Independent,
        }
    }
}

/// A canonical-plane point for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedPoint {
    pub x: f64,
    pub y: f64,
    pub detected: bool,
}

impl TrackedPoint {
    pub fn at(p: Point) -> Self {
        Self {
            x: p.x,
            y: p.y,
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

    fn position(&self) -> Option<Point> {
        let p = Point::new(self.x, self.y);
        (self.detected && p.is_finite()).then_some(p)
    }
}

/// Emitted when a zone completes its dwell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    pub zone_id: ZoneId,
    /// Time of the completing tick, in seconds
    pub at: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ZoneRuntimeState {
    dwell_start: Option<f64>,
    progress: f64,
    cooldown_until: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneProgress {
    pub zone_id: ZoneId,
    /// Percentage in [0, 100]
    pub progress: f64,
}

/// Per-zone progress plus the activations of the most recent update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneReport {
    pub zones: Vec<ZoneProgress>,
    pub activations: Vec<Activation>,
}

/// Tracks dwell and cooldown for a prioritized list of zones.
#[derive(Debug, Clone, Default)]
pub struct ZoneTracker {
    config: DwellConfig,
    zones: Vec<Zone>,
    states: Vec<ZoneRuntimeState>,
    last_activations: Vec<Activation>,
}

impl ZoneTracker {
    pub fn new(config: DwellConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &DwellConfig {
        &self.config
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Replace the zone set. Invalid input leaves the current set in force.
    ///
    /// A successful replacement resets all dwell and cooldown state.
    pub fn configure_zones(&mut self, zones: Vec<Zone>) -> Result<(), ConfigError> {
        if let Err(e) = validate_zones(&zones) {
            warn!("Rejected zone configuration: {e}");
            return Err(e);
        }

        self.states = vec![ZoneRuntimeState::default(); zones.len()];
        self.zones = zones;
        self.last_activations.clear();
        debug!("Configured {} zones", self.zones.len());
        Ok(())
    }

    /// Advance every zone by one tick and return the activations it produced.
    pub fn update(&mut self, point: TrackedPoint, now: f64) -> Vec<Activation> {
        let position = point.position();
        let first_match = match (self.config.match_policy, position) {
            (MatchPolicy::FirstMatch, Some(p)) => self.zones.iter().position(|z| z.shape.contains(p)),
            _ => None,
        };

        let mut activations = Vec::new();
        for (i, (zone, state)) in self.zones.iter().zip(self.states.iter_mut()).enumerate() {
            let inside = match (self.config.match_policy, position) {
                (_, None) => false,
                (MatchPolicy::Independent, Some(p)) => zone.shape.contains(p),
                (MatchPolicy::FirstMatch, Some(_)) => first_match == Some(i),
            };

            if let Some(until) = state.cooldown_until {
                if now >= until {
                    state.cooldown_until = None;
                }
            }

            if !inside || state.cooldown_until.is_some() {
                state.dwell_start = None;
                state.progress = 0.0;
                continue;
            }

            let start = *state.dwell_start.get_or_insert(now);
            let elapsed = (now - start).max(0.0);
            if elapsed >= self.config.dwell_secs {
                state.progress = 100.0;
                state.dwell_start = None;
                state.cooldown_until = Some(now + self.config.cooldown_secs);
                debug!("Zone {} ({}) activated at {now:.3}", zone.id, zone.name);
                activations.push(Activation {
                    zone_id: zone.id,
                    at: now,
                });
            } else {
                state.progress = (100.0 * elapsed / self.config.dwell_secs).clamp(0.0, 100.0);
            }
        }

        self.last_activations = activations.clone();
        activations
    }

    pub fn progress(&self, zone_id: ZoneId) -> Option<f64> {
        self.zones
            .iter()
            .position(|z| z.id == zone_id)
            .map(|i| self.states[i].progress)
    }

    pub fn report(&self) -> ZoneReport {
        ZoneReport {
            zones: self
                .zones
                .iter()
                .zip(&self.states)
                .map(|(zone, state)| ZoneProgress {
                    zone_id: zone.id,
                    progress: state.progress,
                })
                .collect(),
            activations: self.last_activations.clone(),
        }
    }

    /// Clear dwell and cooldown state, keeping the zones.
    pub fn reset(&mut self) {
        self.states.fill(ZoneRuntimeState::default());
        self.last_activations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_zone(id: ZoneId, x: f64, y: f64) -> Zone {
        Zone::rect(id, format!("zone-{id}"), x, y, 100.0, 100.0)
    }

    fn tracker_with(zones: Vec<Zone>) -> ZoneTracker {
        let mut tracker = ZoneTracker::new(DwellConfig::default());
        tracker.configure_zones(zones).unwrap();
        tracker
    }

    #[test]
    fn test_point_in_shapes() {
        let triangle = Shape::Polygon {
            vertices: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(0.0, 10.0)],
        };
        assert!(triangle.contains(Point::new(2.0, 2.0)));
        assert!(!triangle.contains(Point::new(8.0, 8.0)));

        let circle = Shape::Circle {
            center: Point::new(5.0, 5.0),
            radius: 2.0,
        };
        assert!(circle.contains(Point::new(6.0, 6.0)));
        assert!(circle.contains(Point::new(7.0, 5.0)));
        assert!(!circle.contains(Point::new(7.5, 5.0)));
    }

    #[test]
    fn test_dwell_and_cooldown_timeline() {
        let mut tracker = tracker_with(vec![square_zone(1, 0.0, 0.0)]);
        let inside = TrackedPoint::at(Point::new(50.0, 50.0));

        assert!(tracker.update(inside, 0.0).is_empty());
        assert_eq!(tracker.progress(1), Some(0.0));

        assert!(tracker.update(inside, 0.5).is_empty());
        assert_eq!(tracker.progress(1), Some(50.0));

        let fired = tracker.update(inside, 1.0);
        assert_eq!(fired, vec![Activation { zone_id: 1, at: 1.0 }]);
        assert_eq!(tracker.progress(1), Some(100.0));
        assert_eq!(tracker.report().activations.len(), 1);

        assert!(tracker.update(inside, 1.2).is_empty());
        assert_eq!(tracker.progress(1), Some(0.0));
        assert!(tracker.report().activations.is_empty());

        // Cooldown over, dwell restarts from this tick
        assert!(tracker.update(inside, 1.6).is_empty());
        assert_eq!(tracker.progress(1), Some(0.0));
        assert!(tracker.update(inside, 2.1).is_empty());
        assert!((tracker.progress(1).unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(tracker.update(inside, 2.7).len(), 1);
    }

    #[test]
    fn test_leaving_resets_dwell() {
        let mut tracker = tracker_with(vec![square_zone(1, 0.0, 0.0)]);
        let inside = TrackedPoint::at(Point::new(50.0, 50.0));
        let outside = TrackedPoint::at(Point::new(500.0, 500.0));

        tracker.update(inside, 0.0);
        tracker.update(inside, 0.8);
        tracker.update(outside, 0.9);
        assert_eq!(tracker.progress(1), Some(0.0));

        tracker.update(inside, 1.0);
        assert!(tracker.update(inside, 1.9).is_empty());
        assert_eq!(tracker.update(inside, 2.0).len(), 1);
    }

    #[test]
    fn test_undetected_point_is_noop() {
        let mut tracker = tracker_with(vec![square_zone(1, 0.0, 0.0)]);
        tracker.update(TrackedPoint::at(Point::new(50.0, 50.0)), 0.0);
        tracker.update(TrackedPoint::at(Point::new(50.0, 50.0)), 0.5);

        assert!(tracker.update(TrackedPoint::missing(), 0.6).is_empty());
        assert_eq!(tracker.progress(1), Some(0.0));
    }

    #[test]
    fn test_cooldown_expires_while_undetected() {
        let mut tracker = tracker_with(vec![square_zone(1, 0.0, 0.0)]);
        let inside = TrackedPoint::at(Point::new(50.0, 50.0));

        tracker.update(inside, 0.0);
        assert_eq!(tracker.update(inside, 1.0).len(), 1);
        assert_eq!(tracker.states[0].cooldown_until, Some(1.5));

        assert!(tracker.update(TrackedPoint::missing(), 1.2).is_empty());
        assert_eq!(tracker.states[0].cooldown_until, Some(1.5));
        assert!(tracker.update(TrackedPoint::missing(), 1.7).is_empty());
        assert_eq!(tracker.states[0].cooldown_until, None);

        // Back inside, dwell accrues from the first detected tick
        assert!(tracker.update(inside, 1.8).is_empty());
        assert_eq!(tracker.progress(1), Some(0.0));
        assert!(tracker.update(inside, 2.3).is_empty());
        assert!((tracker.progress(1).unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(tracker.update(inside, 2.9).len(), 1);
    }

    #[test]
    fn test_overlapping_zones_accrue_independently() {
        let mut tracker = tracker_with(vec![square_zone(1, 0.0, 0.0), square_zone(2, 50.0, 50.0)]);
        let overlap = TrackedPoint::at(Point::new(75.0, 75.0));

        tracker.update(overlap, 0.0);
        let fired = tracker.update(overlap, 1.0);
        let ids: Vec<ZoneId> = fired.iter().map(|a| a.zone_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_first_match_policy() {
        let mut tracker = ZoneTracker::new(DwellConfig {
            match_policy: MatchPolicy::FirstMatch,
            ..DwellConfig::default()
        });
        tracker
            .configure_zones(vec![square_zone(1, 0.0, 0.0), square_zone(2, 50.0, 50.0)])
            .unwrap();
        let overlap = TrackedPoint::at(Point::new(75.0, 75.0));

        tracker.update(overlap, 0.0);
        let fired = tracker.update(overlap, 1.0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].zone_id, 1);
        assert_eq!(tracker.progress(2), Some(0.0));
    }

    #[test]
    fn test_two_vertex_zone_rejected_and_previous_kept() {
        let mut tracker = tracker_with(vec![square_zone(1, 0.0, 0.0)]);

        let bad = Zone::polygon(9, "line", vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)]);
        let err = tracker.configure_zones(vec![bad]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidZone { id: 9, .. }));

        assert_eq!(tracker.zones().len(), 1);
        assert_eq!(tracker.zones()[0].id, 1);
    }

    #[test]
    fn test_duplicate_ids_and_bad_radius_rejected() {
        let mut tracker = ZoneTracker::default();
        assert!(matches!(
            tracker.configure_zones(vec![square_zone(1, 0.0, 0.0), square_zone(1, 200.0, 0.0)]),
            Err(ConfigError::DuplicateZoneId(1))
        ));
        assert!(tracker
            .configure_zones(vec![Zone::circle(3, "c", Point::new(0.0, 0.0), 0.0)])
            .is_err());
        assert!(tracker.zones().is_empty());
    }

    #[test]
    fn test_reconfigure_resets_state() {
        let mut tracker = tracker_with(vec![square_zone(1, 0.0, 0.0)]);
        let inside = TrackedPoint::at(Point::new(50.0, 50.0));
        tracker.update(inside, 0.0);
        tracker.update(inside, 0.7);

        tracker.configure_zones(vec![square_zone(1, 0.0, 0.0)]).unwrap();
        assert_eq!(tracker.progress(1), Some(0.0));
        tracker.update(inside, 0.8);
        assert!(tracker.update(inside, 1.0).is_empty());
    }

    #[test]
    fn test_shape_serde_tagging() {
        let zone = Zone::circle(4, "pad", Point::new(1.0, 2.0), 3.0);
        let json = serde_json::to_value(&zone).unwrap();
        assert_eq!(json["shape"]["type"], "circle");
        let back: Zone = serde_json::from_value(json).unwrap();
        assert_eq!(back, zone);
    }
}
