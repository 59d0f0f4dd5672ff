//! Metric accumulators over a stream of evaluated images.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::evaluator::{
    EvaluationResult, GroundTruthRegion, Metrics, RegionEvaluator, ScoredRegion,
};
use crate::geometry::Point2D;

/// Confidence cutoffs swept by [`ThresholdDetMetric`]: 0.3 to 0.9 in 0.1 steps.
pub fn default_thresholds() -> Vec<f32> {
    (3..=9).map(|t| t as f32 / 10.0).collect()
}

/// Collects per-image results and aggregates them on [`DetMetric::finish`].
#[derive(Debug, Clone, Default)]
pub struct DetMetric {
    evaluator: RegionEvaluator,
    results: Vec<EvaluationResult>,
}

impl DetMetric {
    pub fn new(evaluator: RegionEvaluator) -> Self {
        Self {
            evaluator,
            results: Vec::new(),
        }
    }

    /// Evaluate one image and keep its result.
    pub fn update(
        &mut self,
        ground_truth: &[GroundTruthRegion],
        detections: &[Vec<Point2D>],
    ) -> &EvaluationResult {
        let index = self.results.len();
        self.results
            .push(self.evaluator.evaluate(ground_truth, detections));
        &self.results[index]
    }

    /// Number of images collected since the last reset.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Aggregate everything collected so far, then reset.
    pub fn finish(&mut self) -> Metrics {
        let metrics = RegionEvaluator::aggregate(&self.results);
        debug!(
            "Detection metrics over {} images: P={:.4} R={:.4} H={:.4}",
            self.results.len(),
            metrics.precision,
            metrics.recall,
            metrics.hmean
        );
        self.reset();
        metrics
    }

    pub fn reset(&mut self) {
        self.results.clear();
    }
}

/// Metrics for one confidence cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdMetrics {
    pub threshold: f32,
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// Output of [`ThresholdDetMetric::finish`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub thresholds: Vec<ThresholdMetrics>,
    /// Best hmean over all thresholds.
    pub hmean: f64,
}

impl ThresholdReport {
    /// The threshold entry with the best hmean, first one on ties.
    pub fn best(&self) -> Option<&ThresholdMetrics> {
        self.thresholds
            .iter()
            .reduce(|best, t| if t.metrics.hmean > best.metrics.hmean { t } else { best })
    }
}

/// Evaluates every image once per confidence cutoff, keeping detections
/// whose score is at least the cutoff.
#[derive(Debug, Clone)]
pub struct ThresholdDetMetric {
    evaluator: RegionEvaluator,
    thresholds: Vec<f32>,
    results: Vec<Vec<EvaluationResult>>,
}

impl Default for ThresholdDetMetric {
    fn default() -> Self {
        Self::new(RegionEvaluator::default(), default_thresholds())
    }
}

impl ThresholdDetMetric {
    pub fn new(evaluator: RegionEvaluator, thresholds: Vec<f32>) -> Self {
        let results = vec![Vec::new(); thresholds.len()];
        Self {
            evaluator,
            thresholds,
            results,
        }
    }

    pub fn thresholds(&self) -> &[f32] {
        &self.thresholds
    }

    pub fn update(&mut self, ground_truth: &[GroundTruthRegion], detections: &[ScoredRegion]) {
        for (threshold, results) in self.thresholds.iter().zip(self.results.iter_mut()) {
            let kept: Vec<Vec<Point2D>> = detections
                .iter()
                .filter(|d| d.score >= *threshold)
                .map(|d| d.points.clone())
                .collect();
            results.push(self.evaluator.evaluate(ground_truth, &kept));
        }
    }

    /// Aggregate per threshold, then reset.
    pub fn finish(&mut self) -> ThresholdReport {
        let thresholds: Vec<ThresholdMetrics> = self
            .thresholds
            .iter()
            .zip(&self.results)
            .map(|(&threshold, results)| ThresholdMetrics {
                threshold,
                metrics: RegionEvaluator::aggregate(results),
            })
            .collect();
        let hmean = thresholds
            .iter()
            .map(|t| t.metrics.hmean)
            .fold(0.0, f64::max);

        self.reset();
        ThresholdReport { thresholds, hmean }
    }

    pub fn reset(&mut self) {
        self.results.iter_mut().for_each(Vec::clear);
    }
}
