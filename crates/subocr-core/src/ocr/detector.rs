//! Text detection with a Differentiable Binarization model.

use image::{DynamicImage, GenericImageView};
use tracing::debug;

use crate::error::OcrError;
use subocr_inference::{ExecutionContext, InferenceBackend, InputTensor};

use super::db_postprocess::{DbPostProcess, DbPostProcessConfig, DetectionOutput};
use super::preprocessing::ImagePreprocessor;

/// Text detector: runs the probability-map model and extracts regions.
pub struct TextDetector<B: InferenceBackend> {
    backend: B,
    preprocessor: ImagePreprocessor,
    post_process: DbPostProcess,
    output_polygon: bool,
}

impl<B: InferenceBackend> TextDetector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            preprocessor: ImagePreprocessor::new(),
            post_process: DbPostProcess::default(),
            output_polygon: false,
        }
    }

    /// Set the detector input size.
    pub fn with_input_size(mut self, height: u32, width: u32) -> Self {
        self.preprocessor = self.preprocessor.with_detection_size(height, width);
        self
    }

    /// Set the probability map post-processing.
    pub fn with_post_process(mut self, config: DbPostProcessConfig) -> Self {
        self.post_process = DbPostProcess::new(config);
        self
    }

    /// Emit free polygons instead of oriented quads.
    pub fn with_polygon_output(mut self, output_polygon: bool) -> Self {
        self.output_polygon = output_polygon;
        self
    }

    pub fn outputs_polygons(&self) -> bool {
        self.output_polygon
    }

    /// Detect text regions in an image. Coordinates are in source pixels.
    pub fn detect(
        &self,
        ctx: &ExecutionContext,
        image: &DynamicImage,
    ) -> Result<DetectionOutput, OcrError> {
        let (width, height) = image.dimensions();
        let tensor = self.preprocessor.preprocess_for_detection(image)?;
        debug!("Detection input shape: {:?}", tensor.shape());

        let input_name = self
            .backend
            .input_names()
            .first()
            .map(String::as_str)
            .unwrap_or("x");
        let outputs = self
            .backend
            .run(ctx, &[(input_name, InputTensor::Float32(tensor.into_dyn()))])?;
        let (_, output) = outputs
            .into_iter()
            .next()
            .ok_or_else(|| OcrError::Detection("no output from model".to_string()))?;

        let prediction = output.into_f32()?;
        self.post_process
            .process_batch(&prediction, &[(width, height)], self.output_polygon)?
            .pop()
            .ok_or_else(|| OcrError::Detection("empty detection batch".to_string()))
    }
}
