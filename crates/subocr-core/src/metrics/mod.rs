//! Offline detection quality metrics.

mod annotation;
mod det_metric;
mod evaluator;

pub use annotation::{
    Annotation, evaluate_dataset, evaluate_dataset_thresholds, load_annotations,
    parse_annotations,
};
pub use det_metric::{
    DetMetric, ThresholdDetMetric, ThresholdMetrics, ThresholdReport, default_thresholds,
};
pub use evaluator::{
    EvaluationResult, GroundTruthRegion, Metrics, RegionEvaluator, ScoredRegion, iou,
};
