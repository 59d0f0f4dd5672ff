//! Differentiable Binarization post-processing.
//!
//! Turns the detector's probability map into scored text regions at source
//! image resolution: binarize, trace contours, score, unclip, re-fit and
//! rescale. Rejected candidates are dropped silently; a noisy map is
//! expected to produce many of them.

use geo::{Area, EuclideanLength, MinimumRotatedRect, MultiPoint, Point as GeoPoint};
use geo_clipper::{Clipper, EndType, JoinType};
use image::{GrayImage, Luma};
use imageproc::contours::find_contours;
use imageproc::drawing::draw_polygon_mut;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use ndarray::{ArrayD, ArrayView2, Axis, Ix3, s};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::OcrError;
use crate::geometry::{Point2D, Quad, RegionShape, rescale_points, to_geo_polygon};

/// Clipper works on integers; coordinates are scaled by this before offsetting.
const CLIPPER_SCALE: f64 = 1000.0;

/// Maximum distance in pixels between a round join's arc and its chords.
const ARC_TOLERANCE: f64 = 0.25;

/// Extractor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbPostProcessConfig {
    /// Pixels with probability above this are foreground.
    pub binarize_threshold: f32,
    /// Candidates scoring below this are dropped.
    pub box_confidence_threshold: f32,
    /// Contours beyond this count are ignored.
    pub max_candidates: usize,
    /// Expansion factor for the shrunk text kernel.
    pub unclip_ratio: f32,
    /// Minimum short side in map pixels before expansion.
    pub min_side: f32,
}

impl Default for DbPostProcessConfig {
    fn default() -> Self {
        Self {
            binarize_threshold: 0.3,
            box_confidence_threshold: 0.7,
            max_candidates: 1000,
            unclip_ratio: 2.0,
            min_side: 3.0,
        }
    }
}

/// Regions extracted from one probability map.
///
/// `regions` and `scores` are parallel. In box mode a rejected contour keeps
/// its slot as a zero quad with score 0; use [`DetectionOutput::into_scored`]
/// to drop those placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionOutput {
    pub regions: Vec<RegionShape>,
    pub scores: Vec<f32>,
}

impl DetectionOutput {
    /// Regions with a positive score, in extraction order.
    pub fn into_scored(self) -> Vec<(RegionShape, f32)> {
        self.regions
            .into_iter()
            .zip(self.scores)
            .filter(|(_, score)| *score > 0.0)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// DB post-processor.
#[derive(Debug, Clone, Default)]
pub struct DbPostProcess {
    config: DbPostProcessConfig,
}

impl DbPostProcess {
    pub fn new(config: DbPostProcessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DbPostProcessConfig {
        &self.config
    }

    /// Post-process a batch of detector outputs.
    ///
    /// `prediction` is `[N, C, H, W]` (only channel 0 is read) or `[N, H, W]`.
    /// `dest_sizes` holds the `(width, height)` of each source image.
    pub fn process_batch(
        &self,
        prediction: &ArrayD<f32>,
        dest_sizes: &[(u32, u32)],
        output_polygon: bool,
    ) -> Result<Vec<DetectionOutput>, OcrError> {
        let maps = match prediction.ndim() {
            4 => prediction.index_axis(Axis(1), 0),
            3 => prediction.view(),
            _ => {
                return Err(OcrError::Detection(format!(
                    "Invalid probability map shape: {:?}",
                    prediction.shape()
                )));
            }
        };
        let maps = maps
            .into_dimensionality::<Ix3>()
            .map_err(|e| OcrError::Detection(e.to_string()))?;

        if maps.len_of(Axis(0)) != dest_sizes.len() {
            return Err(OcrError::Detection(format!(
                "Batch has {} maps but {} image sizes",
                maps.len_of(Axis(0)),
                dest_sizes.len()
            )));
        }

        Ok(maps
            .outer_iter()
            .zip(dest_sizes)
            .map(|(map, &dest)| self.process(map, dest, output_polygon))
            .collect())
    }

    /// Post-process one `[H, W]` probability map for an image of size `dest`.
    pub fn process(
        &self,
        prob_map: ArrayView2<'_, f32>,
        dest: (u32, u32),
        output_polygon: bool,
    ) -> DetectionOutput {
        let bitmap = self.binarize(prob_map);
        let output = if output_polygon {
            self.polygons_from_bitmap(prob_map, &bitmap, dest)
        } else {
            self.boxes_from_bitmap(prob_map, &bitmap, dest)
        };

        debug!(
            "Extracted {} candidate regions ({} scored) from {}x{} map",
            output.len(),
            output.scores.iter().filter(|s| **s > 0.0).count(),
            prob_map.ncols(),
            prob_map.nrows()
        );
        output
    }

    /// Foreground mask: 255 where the probability exceeds the threshold.
    pub fn binarize(&self, prob_map: ArrayView2<'_, f32>) -> GrayImage {
        let (height, width) = prob_map.dim();
        let threshold = self.config.binarize_threshold;
        GrayImage::from_fn(width as u32, height as u32, |x, y| {
            if prob_map[[y as usize, x as usize]] > threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    fn contours(&self, bitmap: &GrayImage) -> Vec<Vec<Point<i32>>> {
        let contours = find_contours::<i32>(bitmap);
        if contours.len() > self.config.max_candidates {
            debug!(
                "Dropping {} contours beyond max_candidates",
                contours.len() - self.config.max_candidates
            );
        }
        contours
            .into_iter()
            .take(self.config.max_candidates)
            .map(|contour| contour.points)
            .collect()
    }

    /// Oriented quads, one slot per contour.
    pub fn boxes_from_bitmap(
        &self,
        prob_map: ArrayView2<'_, f32>,
        bitmap: &GrayImage,
        dest: (u32, u32),
    ) -> DetectionOutput {
        let map_size = (bitmap.width(), bitmap.height());
        let contours = self.contours(bitmap);

        let mut regions = vec![RegionShape::Quad(Quad::default()); contours.len()];
        let mut scores = vec![0.0f32; contours.len()];

        for (index, contour) in contours.iter().enumerate() {
            let points = to_points(contour);

            let Some((quad, short_side)) = mini_box(&points) else {
                continue;
            };
            if short_side < self.config.min_side {
                trace!("Contour {}: too small ({:.1})", index, short_side);
                continue;
            }

            let score = box_score_fast(prob_map, &points);
            if score < self.config.box_confidence_threshold {
                trace!("Contour {}: low score {:.3}", index, score);
                continue;
            }

            let Some(expanded) = unclip(quad.points(), self.config.unclip_ratio) else {
                trace!("Contour {}: unclip failed", index);
                continue;
            };
            let Some((mut quad, short_side)) = mini_box(&expanded) else {
                continue;
            };
            if short_side < self.config.min_side + 2.0 {
                trace!("Contour {}: too small after unclip ({:.1})", index, short_side);
                continue;
            }

            rescale_points(&mut quad.0, map_size, dest);
            regions[index] = RegionShape::Quad(quad);
            scores[index] = score;
        }

        DetectionOutput { regions, scores }
    }

    /// Free polygons; only accepted candidates are returned.
    pub fn polygons_from_bitmap(
        &self,
        prob_map: ArrayView2<'_, f32>,
        bitmap: &GrayImage,
        dest: (u32, u32),
    ) -> DetectionOutput {
        let map_size = (bitmap.width(), bitmap.height());
        let mut output = DetectionOutput::default();

        for (index, contour) in self.contours(bitmap).iter().enumerate() {
            if contour.len() < 4 {
                continue;
            }

            let epsilon = 0.002 * arc_length(contour, true);
            if epsilon <= 0.0 {
                continue;
            }
            let mut approx = approximate_polygon_dp(contour, epsilon, true);
            if approx.len() > 1 && approx.first() == approx.last() {
                approx.pop();
            }
            if approx.len() < 4 {
                trace!("Contour {}: {} vertices after approximation", index, approx.len());
                continue;
            }

            let score = box_score_fast(prob_map, &to_points(contour));
            if score < self.config.box_confidence_threshold {
                trace!("Contour {}: low score {:.3}", index, score);
                continue;
            }

            let Some(mut expanded) = unclip(&to_points(&approx), self.config.unclip_ratio) else {
                trace!("Contour {}: unclip failed", index);
                continue;
            };
            let Some((_, short_side)) = mini_box(&expanded) else {
                continue;
            };
            if short_side < self.config.min_side + 2.0 {
                trace!("Contour {}: too small after unclip ({:.1})", index, short_side);
                continue;
            }

            rescale_points(&mut expanded, map_size, dest);
            expanded.dedup();
            if expanded.len() > 1 && expanded.first() == expanded.last() {
                expanded.pop();
            }
            output.regions.push(RegionShape::Polygon(expanded));
            output.scores.push(score);
        }

        output
    }
}

fn to_points(contour: &[Point<i32>]) -> Vec<Point2D> {
    contour
        .iter()
        .map(|p| Point2D::new(p.x as f32, p.y as f32))
        .collect()
}

/// Mean probability under the polygon, evaluated over its clamped bounding
/// window.
pub fn box_score_fast(prob_map: ArrayView2<'_, f32>, points: &[Point2D]) -> f32 {
    let (height, width) = prob_map.dim();
    if height == 0 || width == 0 || points.is_empty() {
        return 0.0;
    }

    let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
    let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let clamp = |v: f32, len: usize| (v as i64).clamp(0, len as i64 - 1) as usize;
    let x_min = clamp(min_x.floor(), width);
    let x_max = clamp(max_x.ceil(), width);
    let y_min = clamp(min_y.floor(), height);
    let y_max = clamp(max_y.ceil(), height);

    let mut mask = GrayImage::new((x_max - x_min + 1) as u32, (y_max - y_min + 1) as u32);
    let mut polygon: Vec<Point<i32>> = points
        .iter()
        .map(|p| Point::new(p.x as i32 - x_min as i32, p.y as i32 - y_min as i32))
        .collect();
    polygon.dedup();
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }

    if polygon.len() < 3 {
        for p in &polygon {
            if p.x >= 0 && p.y >= 0 && (p.x as u32) < mask.width() && (p.y as u32) < mask.height() {
                mask.put_pixel(p.x as u32, p.y as u32, Luma([1]));
            }
        }
    } else {
        draw_polygon_mut(&mut mask, &polygon, Luma([1]));
    }

    let window = prob_map.slice(s![y_min..=y_max, x_min..=x_max]);
    let (sum, count) = window
        .indexed_iter()
        .filter(|((y, x), _)| mask.get_pixel(*x as u32, *y as u32)[0] > 0)
        .fold((0.0f64, 0usize), |(sum, count), (_, &v)| (sum + v as f64, count + 1));

    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

/// Expand a polygon outward by `area * ratio / perimeter` with round joins.
///
/// Returns `None` for degenerate input or when the offset splits into
/// several paths.
pub fn unclip(points: &[Point2D], unclip_ratio: f32) -> Option<Vec<Point2D>> {
    if points.len() < 3 {
        return None;
    }
    let polygon = to_geo_polygon(points);
    let area = polygon.unsigned_area();
    let perimeter = polygon.exterior().euclidean_length();
    if area <= 0.0 || perimeter <= 0.0 {
        return None;
    }

    let distance = area * unclip_ratio as f64 / perimeter;
    let expanded = polygon.offset(
        distance,
        JoinType::Round(ARC_TOLERANCE * CLIPPER_SCALE),
        EndType::ClosedPolygon,
        CLIPPER_SCALE,
    );

    let [expanded] = expanded.0.as_slice() else {
        return None;
    };
    let mut out: Vec<Point2D> = expanded
        .exterior()
        .coords()
        .map(|c| Point2D::new(c.x as f32, c.y as f32))
        .collect();
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    Some(out)
}

/// Minimum-area rotated rectangle around `points` with its short side length.
///
/// Corners are sorted by x; the left pair gives top-left and bottom-left by
/// y, the right pair gives top-right and bottom-right.
pub fn mini_box(points: &[Point2D]) -> Option<(Quad, f32)> {
    let multi: MultiPoint<f64> = points
        .iter()
        .map(|p| GeoPoint::new(p.x as f64, p.y as f64))
        .collect();
    let rect = multi.minimum_rotated_rect()?;

    let mut corners: Vec<Point2D> = rect
        .exterior()
        .coords()
        .take(4)
        .map(|c| Point2D::new(c.x as f32, c.y as f32))
        .collect();
    if corners.len() < 4 {
        return None;
    }

    let short_side = corners[0]
        .distance(&corners[1])
        .min(corners[1].distance(&corners[2]));

    corners.sort_by(|a, b| a.x.total_cmp(&b.x));
    let (tl, bl) = if corners[1].y > corners[0].y { (0, 1) } else { (1, 0) };
    let (tr, br) = if corners[3].y > corners[2].y { (2, 3) } else { (3, 2) };

    Some((
        Quad::new(corners[tl], corners[tr], corners[br], corners[bl]),
        short_side,
    ))
}
