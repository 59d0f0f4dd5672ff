//! JSON annotation files for offline evaluation.
//!
//! Both files hold one entry per image. An entry is either a list of regions
//! or an object with a `regions` list, so the output of `subocr process` can
//! be evaluated directly. A region's `bbox` may be any nesting of numbers,
//! e.g. `[[x1, y1], [x2, y2], ...]` or `[x1, y1, x2, y2, ...]`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::det_metric::{DetMetric, ThresholdDetMetric, ThresholdReport};
use super::evaluator::{GroundTruthRegion, Metrics, ScoredRegion};
use crate::error::{EvalError, Result};
use crate::geometry::{Nested, Point2D, points_from_flat};

/// One annotated or detected region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub bbox: Nested<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore: bool,
}

impl Annotation {
    pub fn points(&self) -> Result<Vec<Point2D>> {
        Ok(points_from_flat(&self.bbox.flatten())?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageEntry {
    Regions(Vec<Annotation>),
    Result { regions: Vec<Annotation> },
}

impl From<ImageEntry> for Vec<Annotation> {
    fn from(entry: ImageEntry) -> Self {
        match entry {
            ImageEntry::Regions(regions) | ImageEntry::Result { regions } => regions,
        }
    }
}

/// Parse an annotation file's contents.
pub fn parse_annotations(json: &str) -> Result<Vec<Vec<Annotation>>> {
    let entries: Vec<ImageEntry> = serde_json::from_str(json).map_err(EvalError::Parse)?;
    Ok(entries.into_iter().map(Into::into).collect())
}

/// Read and parse an annotation file.
pub fn load_annotations(path: &Path) -> Result<Vec<Vec<Annotation>>> {
    let content = std::fs::read_to_string(path)?;
    parse_annotations(&content)
}

fn ground_truth(regions: &[Annotation]) -> Result<Vec<GroundTruthRegion>> {
    regions
        .iter()
        .map(|a| {
            Ok(GroundTruthRegion {
                points: a.points()?,
                ignore: a.ignore,
            })
        })
        .collect()
}

fn check_counts(ground_truth: &[Vec<Annotation>], detections: &[Vec<Annotation>]) -> Result<()> {
    if ground_truth.len() != detections.len() {
        return Err(EvalError::ImageCountMismatch {
            ground_truth: ground_truth.len(),
            predictions: detections.len(),
        }
        .into());
    }
    Ok(())
}

/// Dataset metrics with every detection counted regardless of score.
pub fn evaluate_dataset(
    ground_truth_images: &[Vec<Annotation>],
    detection_images: &[Vec<Annotation>],
) -> Result<Metrics> {
    check_counts(ground_truth_images, detection_images)?;

    let mut metric = DetMetric::default();
    for (gt, det) in ground_truth_images.iter().zip(detection_images) {
        let detections = det.iter().map(Annotation::points).collect::<Result<Vec<_>>>()?;
        metric.update(&ground_truth(gt)?, &detections);
    }
    Ok(metric.finish())
}

/// Dataset metrics per confidence cutoff. Detections without a score count
/// as fully confident.
pub fn evaluate_dataset_thresholds(
    ground_truth_images: &[Vec<Annotation>],
    detection_images: &[Vec<Annotation>],
) -> Result<ThresholdReport> {
    check_counts(ground_truth_images, detection_images)?;

    let mut metric = ThresholdDetMetric::default();
    for (gt, det) in ground_truth_images.iter().zip(detection_images) {
        let detections = det
            .iter()
            .map(|a| {
                Ok(ScoredRegion {
                    points: a.points()?,
                    score: a.score.unwrap_or(1.0),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        metric.update(&ground_truth(gt)?, &detections);
    }
    Ok(metric.finish())
}
