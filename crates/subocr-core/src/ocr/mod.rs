//! Subtitle OCR pipeline: detection post-processing, line merging and
//! recognition around two opaque models.

mod db_postprocess;
mod detector;
mod engine;
mod merge;
mod preprocessing;
mod recognizer;

pub use db_postprocess::{
    DbPostProcess, DbPostProcessConfig, DetectionOutput, box_score_fast, mini_box, unclip,
};
pub use detector::TextDetector;
pub use engine::{SubtitleOcr, SubtitleOcrBuilder};
pub use merge::{DEFAULT_MERGE_THRESHOLD, LineMerger};
pub use preprocessing::{ImagePreprocessor, normalize_image, resize_norm_image};
pub use recognizer::{RecognitionResult, TextRecognizer, ctc_decode};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::RegionShape;

/// One unit of recognizable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    /// Oriented quad or free polygon in source image pixels.
    pub bbox: RegionShape,

    /// Recognized text, when recognition ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Recognition confidence when recognition ran, otherwise the detection
    /// score of an unmerged region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl TextRegion {
    pub fn new(bbox: RegionShape) -> Self {
        Self {
            bbox,
            text: None,
            score: None,
        }
    }
}

/// Pipeline output for one image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    /// Source file, if the image came from disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Regions top to bottom.
    pub regions: Vec<TextRegion>,

    /// Image dimensions (width, height).
    pub image_size: (u32, u32),

    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

impl OcrResult {
    /// Recognized text of all regions, one line per region.
    pub fn text(&self) -> String {
        self.regions
            .iter()
            .filter_map(|r| r.text.as_deref())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
