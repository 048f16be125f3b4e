//! Persisted calibration and zone snapshot.
//!
//! Only the corners and the zone list are stored. The homography is always
//! recomputed on load, and runtime dwell state is never persisted.

use crate::config::ConfigError;
use crate::core::calibration::{CalibrationPlane, CalibrationSnapshot, Point};
use crate::core::zones::{validate_zones, Shape, Zone, ZoneId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeType {
    Polygon,
    Circle,
}

/// Geometry payload, shaped by [`ShapeType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Geometry {
    Vertices(Vec<[f64; 2]>),
    CenterRadius { center: [f64; 2], radius: f64 },
}

/// One zone as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneRecord {
    pub id: ZoneId,
    pub name: String,
    pub shape_type: ShapeType,
    pub vertices_or_center_radius: Geometry,
    /// Lower values win
    pub priority: usize,
}

impl ZoneRecord {
    pub fn from_zone(zone: &Zone, priority: usize) -> Self {
        let (shape_type, geometry) = match &zone.shape {
            Shape::Polygon { vertices } => (
                ShapeType::Polygon,
                Geometry::Vertices(vertices.iter().map(|p| [p.x, p.y]).collect()),
            ),
            Shape::Circle { center, radius } => (
                ShapeType::Circle,
                Geometry::CenterRadius {
                    center: [center.x, center.y],
                    radius: *radius,
                },
            ),
        };
        Self {
            id: zone.id,
            name: zone.name.clone(),
            shape_type,
            vertices_or_center_radius: geometry,
            priority,
        }
    }

    pub fn to_zone(&self) -> Result<Zone, ConfigError> {
        let shape = match (self.shape_type, &self.vertices_or_center_radius) {
            (ShapeType::Polygon, Geometry::Vertices(vertices)) => Shape::Polygon {
                vertices: vertices.iter().map(|[x, y]| Point::new(*x, *y)).collect(),
            },
            (ShapeType::Circle, Geometry::CenterRadius { center, radius }) => Shape::Circle {
                center: Point::new(center[0], center[1]),
                radius: *radius,
            },
            (shape_type, _) => {
                return Err(ConfigError::InvalidZone {
                    id: self.id,
                    reason: format!("geometry does not match shape type {shape_type:?}"),
                })
            }
        };
        Ok(Zone {
            id: self.id,
            name: self.name.clone(),
            shape,
        })
    }
}

/// Everything a [`ConfigStore`] persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Absent until all four corners have been set
    #[serde(default)]
    pub calibration: Option<CalibrationSnapshot>,
    #[serde(default)]
    pub zones: Vec<ZoneRecord>,
}

impl Snapshot {
    pub fn from_parts(plane: &CalibrationPlane, zones: &[Zone]) -> Self {
        Self {
            calibration: plane.snapshot(),
            zones: zones
                .iter()
                .enumerate()
                .map(|(priority, zone)| ZoneRecord::from_zone(zone, priority))
                .collect(),
        }
    }

    /// Zones in priority order, validated as a set.
    pub fn to_zones(&self) -> Result<Vec<Zone>, ConfigError> {
        let mut records: Vec<&ZoneRecord> = self.zones.iter().collect();
        records.sort_by_key(|r| r.priority);
        let zones = records
            .into_iter()
            .map(ZoneRecord::to_zone)
            .collect::<Result<Vec<_>, _>>()?;
        validate_zones(&zones)?;
        Ok(zones)
    }

    /// Rebuild the calibration plane, if one was stored.
    pub fn to_plane(&self) -> Result<Option<CalibrationPlane>, ConfigError> {
        self.calibration
            .as_ref()
            .map(|c| {
                CalibrationPlane::from_snapshot(c)
                    .map_err(|e| ConfigError::InvalidCalibration(e.to_string()))
            })
            .transpose()
    }
}

/// Load/save seam for calibration and zones.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Option<Snapshot>, ConfigError>;
    fn save(&self, snapshot: &Snapshot) -> Result<(), ConfigError>;
}

/// Snapshot stored as pretty JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Option<Snapshot>, ConfigError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let snapshot =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| ConfigError::IoError(e.to_string()))
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<Snapshot>, ConfigError> {
        Ok(self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), ConfigError> {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_zones() -> Vec<Zone> {
        vec![
            Zone::rect(0, "start", 860.0, 900.0, 200.0, 150.0),
            Zone::circle(1, "left", Point::new(400.0, 400.0), 120.0),
            Zone::rect(2, "right", 1300.0, 300.0, 250.0, 250.0),
        ]
    }

    fn calibrated_plane() -> CalibrationPlane {
        let mut plane = CalibrationPlane::default();
        for (i, (x, y)) in [(0.1, 0.1), (0.9, 0.1), (0.9, 0.9), (0.1, 0.9)].into_iter().enumerate() {
            plane.set_point(i, x, y).unwrap();
        }
        plane.compute_homography().unwrap();
        plane
    }

    #[test]
    fn test_wire_shape() {
        let snapshot = Snapshot::from_parts(&calibrated_plane(), &sample_zones());
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["calibration"]["points"][1][0], 0.9);
        assert_eq!(json["zones"][1]["shapeType"], "circle");
        assert_eq!(json["zones"][1]["verticesOrCenterRadius"]["radius"], 120.0);
        assert_eq!(json["zones"][2]["verticesOrCenterRadius"][0][0], 1300.0);
        assert_eq!(json["zones"][2]["priority"], 2);
    }

    #[test]
    fn test_priority_orders_zones() {
        let mut snapshot = Snapshot::from_parts(&CalibrationPlane::default(), &sample_zones());
        snapshot.zones.reverse();
        let zones = snapshot.to_zones().unwrap();
        let ids: Vec<ZoneId> = zones.iter().map(|z| z.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(snapshot.calibration.is_none());
    }

    #[test]
    fn test_mismatched_geometry_rejected() {
        let mut snapshot = Snapshot::from_parts(&CalibrationPlane::default(), &sample_zones());
        snapshot.zones[0].shape_type = ShapeType::Circle;
        assert!(matches!(
            snapshot.to_zones(),
            Err(ConfigError::InvalidZone { id: 0, .. })
        ));
    }

    #[test]
    fn test_json_file_store() {
        let path = std::env::temp_dir()
            .join(format!("companion-sense-store-{}", uuid::Uuid::new_v4()))
            .join("snapshot.json");
        let store = JsonFileStore::new(&path);
        assert_eq!(store.load().unwrap(), None);

        let snapshot = Snapshot::from_parts(&calibrated_plane(), &sample_zones());
        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        let plane = loaded.to_plane().unwrap().unwrap();
        assert!(plane.has_homography());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&Snapshot::default()).unwrap();
        assert_eq!(store.load().unwrap(), Some(Snapshot::default()));
    }
}
