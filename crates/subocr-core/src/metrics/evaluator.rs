//! IoU-based matching of detected regions against ground truth.

use geo::{Area, BooleanOps, Polygon};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::geometry::{Point2D, to_geo_polygon};

/// A ground-truth region. Ignored regions are neither required nor matched,
/// and detections mostly covered by them are not counted.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthRegion {
    pub points: Vec<Point2D>,
    pub ignore: bool,
}

impl GroundTruthRegion {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self {
            points,
            ignore: false,
        }
    }

    pub fn ignored(points: Vec<Point2D>) -> Self {
        Self {
            points,
            ignore: true,
        }
    }
}

/// A detected region with its confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRegion {
    pub points: Vec<Point2D>,
    pub score: f32,
}

/// Per-image evaluation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub precision: f64,
    pub recall: f64,
    pub hmean: f64,
    /// Ground-truth regions that count.
    pub gt_care: usize,
    /// Detections that count.
    pub det_care: usize,
    pub matched: usize,
    /// Matched `(ground_truth, detection)` index pairs.
    pub pairs: Vec<(usize, usize)>,
}

/// Dataset-level precision, recall and harmonic mean.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub hmean: f64,
}

impl Metrics {
    fn from_counts(matched: usize, gt_care: usize, det_care: usize) -> Self {
        let precision = ratio(matched, det_care);
        let recall = ratio(matched, gt_care);
        Self {
            precision,
            recall,
            hmean: hmean(precision, recall),
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn hmean(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Matches detections to ground truth one-to-one by IoU.
#[derive(Debug, Clone, Copy)]
pub struct RegionEvaluator {
    iou_threshold: f64,
    area_precision_threshold: f64,
}

impl Default for RegionEvaluator {
    fn default() -> Self {
        Self {
            iou_threshold: 0.5,
            area_precision_threshold: 0.5,
        }
    }
}

impl RegionEvaluator {
    pub fn new(iou_threshold: f64) -> Self {
        Self {
            iou_threshold,
            ..Default::default()
        }
    }

    /// Evaluate one image.
    ///
    /// Pairs with IoU above the threshold are matched greedily in descending
    /// IoU order; each region takes part in at most one match.
    pub fn evaluate(
        &self,
        ground_truth: &[GroundTruthRegion],
        detections: &[Vec<Point2D>],
    ) -> EvaluationResult {
        let gt_polys: Vec<Polygon<f64>> =
            ground_truth.iter().map(|g| to_geo_polygon(&g.points)).collect();
        let det_polys: Vec<Polygon<f64>> =
            detections.iter().map(|d| to_geo_polygon(d)).collect();

        let det_ignored: Vec<bool> = det_polys
            .iter()
            .map(|det| {
                let area = det.unsigned_area();
                area > 0.0
                    && ground_truth.iter().zip(&gt_polys).any(|(gt, gt_poly)| {
                        gt.ignore
                            && intersection_area(gt_poly, det) / area
                                > self.area_precision_threshold
                    })
            })
            .collect();

        let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
        for (g, gt_poly) in gt_polys.iter().enumerate() {
            if ground_truth[g].ignore {
                continue;
            }
            for (d, det_poly) in det_polys.iter().enumerate() {
                if det_ignored[d] {
                    continue;
                }
                let iou = iou(gt_poly, det_poly);
                if iou > self.iou_threshold {
                    candidates.push((g, d, iou));
                }
            }
        }
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut gt_taken = vec![false; gt_polys.len()];
        let mut det_taken = vec![false; det_polys.len()];
        let mut pairs = Vec::new();
        for (g, d, iou) in candidates {
            if gt_taken[g] || det_taken[d] {
                continue;
            }
            trace!("Matched gt {} with detection {} (IoU {:.3})", g, d, iou);
            gt_taken[g] = true;
            det_taken[d] = true;
            pairs.push((g, d));
        }

        let gt_care = ground_truth.iter().filter(|g| !g.ignore).count();
        let det_care = det_ignored.iter().filter(|ignored| !**ignored).count();
        let matched = pairs.len();
        let Metrics {
            precision,
            recall,
            hmean,
        } = Metrics::from_counts(matched, gt_care, det_care);

        EvaluationResult {
            precision,
            recall,
            hmean,
            gt_care,
            det_care,
            matched,
            pairs,
        }
    }

    /// Combine per-image results by summing their counts.
    pub fn aggregate(results: &[EvaluationResult]) -> Metrics {
        let (matched, gt_care, det_care) = results.iter().fold((0, 0, 0), |acc, r| {
            (acc.0 + r.matched, acc.1 + r.gt_care, acc.2 + r.det_care)
        });
        Metrics::from_counts(matched, gt_care, det_care)
    }
}

fn intersection_area(a: &Polygon<f64>, b: &Polygon<f64>) -> f64 {
    if a.unsigned_area() == 0.0 || b.unsigned_area() == 0.0 {
        return 0.0;
    }
    a.intersection(b).unsigned_area()
}

/// Intersection over union of two polygons. Zero when either is degenerate.
pub fn iou(a: &Polygon<f64>, b: &Polygon<f64>) -> f64 {
    let intersection = intersection_area(a, b);
    if intersection == 0.0 {
        return 0.0;
    }
    let union = a.union(b).unsigned_area();
    if union == 0.0 { 0.0 } else { intersection / union }
}
