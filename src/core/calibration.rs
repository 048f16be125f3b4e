//! Perspective calibration of the floor plane.
//!
//! Four reference points, clicked in camera-normalized coordinates in the order
//! top-left, top-right, bottom-right, bottom-left, define a quadrilateral that is
//! mapped onto an upright canonical rectangle. Zones are authored in that
//! rectangle, so every tracked point is passed through [`CalibrationPlane::map_point`]
//! before hit testing.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Minimum shoelace area of the calibration quad, in normalized units².
pub const MIN_QUAD_AREA: f64 = 1e-6;

/// Divisor magnitude below which a projected point is considered at infinity.
const PROJECTIVE_EPSILON: f64 = 1e-12;

/// A 2D point. Camera-normalized or canonical depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Size of the canonical output rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSize {
    pub width: f64,
    pub height: f64,
}

impl Default for CanonicalSize {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl CanonicalSize {
    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    /// Rectangle corners in calibration order.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(0.0, 0.0),
            Point::new(self.width, 0.0),
            Point::new(self.width, self.height),
            Point::new(0.0, self.height),
        ]
    }

    fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Calibration failures.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Corner index outside 0..=3
    IndexOutOfRange(usize),
    /// Coordinate not finite or outside [0, 1]
    InvalidCoordinate { index: usize, x: f64, y: f64 },
    /// Not all four corners have been set
    Incomplete { missing: Vec<usize> },
    /// Corners are collinear, self-intersecting or enclose ~zero area
    Degenerate(String),
    /// Canonical rectangle has a non-positive side
    InvalidCanonicalSize { width: f64, height: f64 },
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationError::IndexOutOfRange(i) => {
                write!(f, "Calibration index {i} out of range (0-3)")
            }
            CalibrationError::InvalidCoordinate { index, x, y } => {
                write!(f, "Calibration point {index} ({x}, {y}) is outside [0, 1]")
            }
            CalibrationError::Incomplete { missing } => {
                write!(f, "Calibration incomplete, missing points {missing:?}")
            }
            CalibrationError::Degenerate(reason) => {
                write!(f, "Degenerate calibration: {reason}")
            }
            CalibrationError::InvalidCanonicalSize { width, height } => {
                write!(f, "Invalid canonical size {width}x{height}")
            }
        }
    }
}

impl std::error::Error for CalibrationError {}

/// Projective transform from camera-normalized to canonical coordinates,
/// normalized so the bottom-right entry is 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    /// Solve for the transform taking each `src[i]` onto `dst[i]`.
    ///
    /// Each correspondence contributes two rows of the 8×8 direct linear
    /// transform system, solved by LU decomposition.
    pub fn from_correspondences(src: &[Point; 4], dst: &[Point; 4]) -> Result<Self, CalibrationError> {
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for (i, (s, d)) in src.iter().zip(dst).enumerate() {
            let (x, y, u, v) = (s.x, s.y, d.x, d.y);
            let rows = [
                [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y],
                [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y],
            ];
            for (offset, row) in rows.iter().enumerate() {
                for (col, value) in row.iter().enumerate() {
                    a[(2 * i + offset, col)] = *value;
                }
            }
            b[2 * i] = u;
            b[2 * i + 1] = v;
        }

        let h = a.lu().solve(&b).ok_or_else(|| {
            CalibrationError::Degenerate("singular homography system".to_string())
        })?;
        if !h.iter().all(|v| v.is_finite()) {
            return Err(CalibrationError::Degenerate(
                "non-finite homography".to_string(),
            ));
        }

        Ok(Self(Matrix3::new(
            h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0,
        )))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    pub fn apply(&self, p: Point) -> Option<Point> {
        let projected = self.0 * Vector3::new(p.x, p.y, 1.0);
        if projected.z.abs() < PROJECTIVE_EPSILON {
            return None;
        }
        let mapped = Point::new(projected.x / projected.z, projected.y / projected.z);
        mapped.is_finite().then_some(mapped)
    }
}

/// Signed shoelace area of a closed polygon.
pub fn signed_area(points: &[Point]) -> f64 {
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice / 2.0
}

/// True when every turn of the closed polygon has the same, non-zero orientation.
fn is_strictly_convex(points: &[Point]) -> bool {
    let n = points.len();
    let mut sign = 0.0f64;
    for i in 0..n {
        let (a, b, c) = (points[i], points[(i + 1) % n], points[(i + 2) % n]);
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross.abs() < 1e-12 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Persisted form of a calibration: corners and output size only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    pub points: [[f64; 2]; 4],
    #[serde(default)]
    pub canonical_size: CanonicalSize,
}

/// Four-corner floor calibration with its derived homography.
#[derive(Debug, Clone, Default)]
pub struct CalibrationPlane {
    points: [Option<Point>; 4],
    canonical: CanonicalSize,
    homography: Option<Homography>,
}

impl CalibrationPlane {
    pub fn new(canonical: CanonicalSize) -> Self {
        Self {
            points: [None; 4],
            canonical,
            homography: None,
        }
    }

    pub fn canonical_size(&self) -> CanonicalSize {
        self.canonical
    }

    /// Store one corner. Any previously derived homography is dropped.
    pub fn set_point(&mut self, index: usize, x: f64, y: f64) -> Result<(), CalibrationError> {
        if index > 3 {
            return Err(CalibrationError::IndexOutOfRange(index));
        }
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(x) || !in_unit(y) {
            return Err(CalibrationError::InvalidCoordinate { index, x, y });
        }

        self.points[index] = Some(Point::new(x, y));
        self.homography = None;
        Ok(())
    }

    pub fn point(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied().flatten()
    }

    /// All four corners are set.
    pub fn is_calibrated(&self) -> bool {
        self.points.iter().all(Option::is_some)
    }

    /// A homography is available for mapping.
    pub fn has_homography(&self) -> bool {
        self.homography.is_some()
    }

    pub fn homography(&self) -> Option<&Homography> {
        self.homography.as_ref()
    }

    /// Derive the camera-to-canonical transform from the four corners.
    pub fn compute_homography(&mut self) -> Result<Homography, CalibrationError> {
        let quad = self.quad()?;

        if !self.canonical.is_valid() {
            return Err(CalibrationError::InvalidCanonicalSize {
                width: self.canonical.width,
                height: self.canonical.height,
            });
        }

        let area = signed_area(&quad).abs();
        if area <= MIN_QUAD_AREA {
            return Err(CalibrationError::Degenerate(format!(
                "quad area {area:.2e} is too small"
            )));
        }
        if !is_strictly_convex(&quad) {
            return Err(CalibrationError::Degenerate(
                "points are collinear or not in convex order".to_string(),
            ));
        }

        let h = Homography::from_correspondences(&quad, &self.canonical.corners())?;
        self.homography = Some(h);
        Ok(h)
    }

    fn quad(&self) -> Result<[Point; 4], CalibrationError> {
        let missing: Vec<usize> = (0..4).filter(|&i| self.points[i].is_none()).collect();
        match self.points {
            [Some(a), Some(b), Some(c), Some(d)] => Ok([a, b, c, d]),
            _ => Err(CalibrationError::Incomplete { missing }),
        }
    }

    /// Map a camera-normalized point into the canonical plane.
    ///
    /// Returns `None` until a homography has been computed.
    pub fn map_point(&self, x: f64, y: f64) -> Option<Point> {
        let p = Point::new(x, y);
        if !p.is_finite() {
            return None;
        }
        self.homography.as_ref()?.apply(p)
    }

    /// Clear all corners and the homography.
    pub fn clear(&mut self) {
        self.points = [None; 4];
        self.homography = None;
    }

    /// Persistable corners, or `None` while incomplete.
    pub fn snapshot(&self) -> Option<CalibrationSnapshot> {
        let quad = self.quad().ok()?;
        Some(CalibrationSnapshot {
            points: quad.map(|p| [p.x, p.y]),
            canonical_size: self.canonical,
        })
    }

    /// Rebuild a plane from a snapshot, recomputing the homography.
    pub fn from_snapshot(snapshot: &CalibrationSnapshot) -> Result<Self, CalibrationError> {
        let mut plane = Self::new(snapshot.canonical_size);
        for (i, [x, y]) in snapshot.points.iter().enumerate() {
            plane.set_point(i, *x, *y)?;
        }
        plane.compute_homography()?;
        Ok(plane)
    }
}
