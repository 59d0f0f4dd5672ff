//! Typed coordinates and the primitive operations built on them.
//!
//! Coordinates enter the crate as flat or nested numeric groups (model
//! output, JSON annotations) and are converted to [`Point2D`] at the
//! boundary. Everything past that boundary works on typed points.

mod crop;
mod flatten;

pub use crop::crop_with_fallback;
pub use flatten::{FlattenIter, Nested};

use geo::{Coord, LineString, Polygon as GeoPolygon};
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// A point in pixel space. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point2D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<(f32, f32)> for Point2D {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Point2D {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point2D> for [f32; 2] {
    fn from(p: Point2D) -> Self {
        [p.x, p.y]
    }
}

impl From<Point2D> for Coord<f64> {
    fn from(p: Point2D) -> Self {
        Coord {
            x: p.x as f64,
            y: p.y as f64,
        }
    }
}

/// Enclosing axis-aligned rectangle, Pascal VOC style.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl AxisBox {
    /// Enclosing rectangle of a point set. `None` for an empty set.
    pub fn from_points(points: &[Point2D]) -> Option<Self> {
        let first = points.first()?;
        let init = AxisBox {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        };
        Some(points.iter().skip(1).fold(init, |acc, p| AxisBox {
            x_min: acc.x_min.min(p.x),
            y_min: acc.y_min.min(p.y),
            x_max: acc.x_max.max(p.x),
            y_max: acc.y_max.max(p.y),
        }))
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// Four corners in canonical order: top-left, top-right, bottom-right,
/// bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quad(pub [Point2D; 4]);

impl Quad {
    pub fn new(tl: Point2D, tr: Point2D, br: Point2D, bl: Point2D) -> Self {
        Self([tl, tr, br, bl])
    }

    /// Axis-aligned rectangle as a quad.
    pub fn from_rect(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self::new(
            Point2D::new(x_min, y_min),
            Point2D::new(x_max, y_min),
            Point2D::new(x_max, y_max),
            Point2D::new(x_min, y_max),
        )
    }

    pub fn top_left(&self) -> Point2D {
        self.0[0]
    }

    pub fn top_right(&self) -> Point2D {
        self.0[1]
    }

    pub fn bottom_right(&self) -> Point2D {
        self.0[2]
    }

    pub fn bottom_left(&self) -> Point2D {
        self.0[3]
    }

    pub fn points(&self) -> &[Point2D] {
        &self.0
    }

    /// Mean y over the four corners.
    pub fn mean_y(&self) -> f32 {
        self.0.iter().map(|p| p.y).sum::<f32>() / 4.0
    }

    pub fn axis_box(&self) -> AxisBox {
        let p = &self.0;
        AxisBox {
            x_min: p.iter().map(|p| p.x).fold(f32::INFINITY, f32::min),
            y_min: p.iter().map(|p| p.y).fold(f32::INFINITY, f32::min),
            x_max: p.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max),
            y_max: p.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max),
        }
    }

    /// True when every coordinate is zero (the extractor's placeholder).
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|p| p.x == 0.0 && p.y == 0.0)
    }

    /// Flat `[x1, y1, ..., x4, y4]` representation.
    pub fn to_flat(&self) -> [f32; 8] {
        let mut flat = [0.0; 8];
        for (i, p) in self.0.iter().enumerate() {
            flat[i * 2] = p.x;
            flat[i * 2 + 1] = p.y;
        }
        flat
    }
}

/// Shape of a detected region: an oriented box or a free polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionShape {
    Quad(Quad),
    Polygon(Vec<Point2D>),
}

impl RegionShape {
    pub fn points(&self) -> &[Point2D] {
        match self {
            RegionShape::Quad(quad) => quad.points(),
            RegionShape::Polygon(points) => points,
        }
    }

    pub fn axis_box(&self) -> Option<AxisBox> {
        AxisBox::from_points(self.points())
    }
}

/// Group a flat `[x1, y1, x2, y2, ...]` sequence into points.
pub fn points_from_flat(flat: &[f32]) -> Result<Vec<Point2D>, GeometryError> {
    if flat.len() % 2 != 0 {
        return Err(GeometryError::InvalidGeometry(format!(
            "odd number of coordinates: {}",
            flat.len()
        )));
    }
    Ok(flat
        .chunks_exact(2)
        .map(|pair| Point2D::new(pair[0], pair[1]))
        .collect())
}

/// Enclosing rectangle of a flat coordinate sequence.
///
/// Even-indexed values are x, odd-indexed values are y. At least two
/// coordinate pairs are required.
pub fn to_axis_aligned_bbox(flat: &[f32]) -> Result<AxisBox, GeometryError> {
    let points = points_from_flat(flat)?;
    if points.len() < 2 {
        return Err(GeometryError::InvalidGeometry(format!(
            "need at least 2 coordinate pairs, got {}",
            points.len()
        )));
    }
    AxisBox::from_points(&points)
        .ok_or_else(|| GeometryError::InvalidGeometry("empty coordinates".to_string()))
}

/// Map points from one resolution to another.
///
/// `coord' = round(coord / src_dim * dest_dim)`, clamped to `[0, dest_dim]`.
pub fn rescale_points(points: &mut [Point2D], src: (u32, u32), dest: (u32, u32)) {
    let (src_w, src_h) = (src.0.max(1) as f32, src.1.max(1) as f32);
    let (dest_w, dest_h) = (dest.0 as f32, dest.1 as f32);

    for p in points.iter_mut() {
        p.x = (p.x / src_w * dest_w).round().clamp(0.0, dest_w);
        p.y = (p.y / src_h * dest_h).round().clamp(0.0, dest_h);
    }
}

/// Corners of a `width` x `height` rectangle at `(x, y)` rotated by `theta`
/// radians about its own center.
///
/// Returned in the order top-left, bottom-left, bottom-right, top-right of the
/// unrotated rectangle.
pub fn rotated_rect_corners(x: f32, y: f32, width: f32, height: f32, theta: f32) -> [Point2D; 4] {
    let cx = x + width / 2.0;
    let cy = y + height / 2.0;
    let (sin, cos) = theta.sin_cos();

    let rotate = |px: f32, py: f32| {
        Point2D::new(
            cos * (px - cx) - sin * (py - cy) + cx,
            cos * (py - cy) + sin * (px - cx) + cy,
        )
    };

    [
        rotate(x, y),
        rotate(x, y + height),
        rotate(x + width, y + height),
        rotate(x + width, y),
    ]
}

/// Closed geo polygon over the given points.
pub(crate) fn to_geo_polygon(points: &[Point2D]) -> GeoPolygon<f64> {
    let ring: Vec<Coord<f64>> = points.iter().map(|&p| p.into()).collect();
    GeoPolygon::new(LineString::from(ring), vec![])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Point2D, b: (f32, f32)) -> bool {
        (a.x - b.0).abs() < 1e-4 && (a.y - b.1).abs() < 1e-4
    }

    #[test]
    fn test_axis_aligned_bbox() {
        let bbox = to_axis_aligned_bbox(&[10.0, 5.0, 30.0, 8.0, 28.0, 20.0, 9.0, 18.0]).unwrap();
        assert_eq!(
            bbox,
            AxisBox {
                x_min: 9.0,
                y_min: 5.0,
                x_max: 30.0,
                y_max: 20.0
            }
        );
    }

    #[test]
    fn test_axis_aligned_bbox_requires_two_pairs() {
        assert!(matches!(
            to_axis_aligned_bbox(&[1.0, 2.0]),
            Err(GeometryError::InvalidGeometry(_))
        ));
        assert!(to_axis_aligned_bbox(&[1.0, 2.0, 3.0]).is_err());
        assert!(to_axis_aligned_bbox(&[]).is_err());
        assert!(to_axis_aligned_bbox(&[1.0, 2.0, 3.0, 4.0]).is_ok());
    }

    #[test]
    fn test_rescale_identity() {
        let original = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(37.0, 12.0),
            Point2D::new(100.0, 64.0),
        ];
        let mut points = original.clone();
        rescale_points(&mut points, (100, 64), (100, 64));
        assert_eq!(points, original);
    }

    #[test]
    fn test_rescale_scales_and_clamps() {
        let mut points = vec![Point2D::new(32.0, 16.0), Point2D::new(70.0, -3.0)];
        rescale_points(&mut points, (64, 32), (128, 128));
        assert_eq!(points[0], Point2D::new(64.0, 64.0));
        // 70 / 64 * 128 = 140, clamped to the destination width
        assert_eq!(points[1], Point2D::new(128.0, 0.0));
    }

    #[test]
    fn test_rotated_rect_corners_no_rotation() {
        let corners = rotated_rect_corners(10.0, 20.0, 30.0, 10.0, 0.0);
        assert!(approx(corners[0], (10.0, 20.0)));
        assert!(approx(corners[1], (10.0, 30.0)));
        assert!(approx(corners[2], (40.0, 30.0)));
        assert!(approx(corners[3], (40.0, 20.0)));
    }

    #[test]
    fn test_rotated_rect_corners_quarter_turn() {
        // 4x2 rectangle centered at (2, 1) rotated by 90 degrees
        let corners = rotated_rect_corners(0.0, 0.0, 4.0, 2.0, std::f32::consts::FRAC_PI_2);
        assert!(approx(corners[0], (3.0, -1.0)));
        assert!(approx(corners[1], (1.0, -1.0)));
        assert!(approx(corners[2], (1.0, 3.0)));
        assert!(approx(corners[3], (3.0, 3.0)));
    }

    #[test]
    fn test_quad_helpers() {
        let quad = Quad::from_rect(0.0, 10.0, 20.0, 30.0);
        assert_eq!(quad.mean_y(), 20.0);
        assert_eq!(quad.to_flat(), [0.0, 10.0, 20.0, 10.0, 20.0, 30.0, 0.0, 30.0]);
        assert!(!quad.is_zero());
        assert!(Quad::default().is_zero());
        assert_eq!(quad.axis_box().area(), 400.0);
    }

    #[test]
    fn test_region_shape_json() {
        let quad = RegionShape::Quad(Quad::from_rect(1.0, 2.0, 3.0, 4.0));
        let json = serde_json::to_string(&quad).unwrap();
        assert_eq!(json, "[[1.0,2.0],[3.0,2.0],[3.0,4.0],[1.0,4.0]]");
        assert_eq!(serde_json::from_str::<RegionShape>(&json).unwrap(), quad);

        let polygon: RegionShape = serde_json::from_str("[[0,0],[4,0],[4,4],[2,6],[0,4]]").unwrap();
        assert_eq!(polygon.points().len(), 5);
        assert!(matches!(polygon, RegionShape::Polygon(_)));
    }
}
