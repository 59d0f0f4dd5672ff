//! Core library for subtitle OCR.
//!
//! This crate provides:
//! - Geometry utilities for quads, polygons and region crops
//! - Differentiable Binarization post-processing of probability maps
//! - Line merging of word-level boxes
//! - The detection and recognition pipeline with CTC decoding
//! - Offline detection evaluation (precision, recall, hmean)
//! - Configuration and model file resolution

pub mod error;
pub mod geometry;
pub mod metrics;
pub mod models;
pub mod ocr;

pub use error::{Result, SubOcrError};
pub use geometry::{Point2D, Quad, RegionShape};
pub use metrics::{Metrics, RegionEvaluator};
pub use models::{Language, SubOcrConfig};
pub use ocr::{OcrResult, SubtitleOcr, TextRegion};

/// Re-export inference types.
pub use subocr_inference::{
    Device, ExecutionContext, InferenceBackend, InputTensor, OutputTensor,
};

#[cfg(feature = "native")]
pub use subocr_inference::OrtBackend;

#[cfg(feature = "tract")]
pub use subocr_inference::TractBackend;
