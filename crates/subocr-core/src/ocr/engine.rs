//! Subtitle OCR pipeline orchestrating detection, line merging and recognition.

use std::path::Path;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use crate::error::{ModelError, OcrError, Result};
use crate::geometry::{Quad, RegionShape, crop_with_fallback};
use crate::models::{Alphabet, ModelKind, PipelineConfig, SubOcrConfig, find_model_file};
use subocr_inference::{ExecutionContext, InferenceBackend};

use super::{
    OcrResult, TextRegion, detector::TextDetector, merge::LineMerger, recognizer::TextRecognizer,
};

/// Subtitle OCR pipeline.
pub struct SubtitleOcr<B: InferenceBackend> {
    detector: Option<TextDetector<B>>,
    recognizer: Option<TextRecognizer<B>>,
    merger: LineMerger,
    config: PipelineConfig,
}

/// Builder for SubtitleOcr.
pub struct SubtitleOcrBuilder<B: InferenceBackend> {
    detector: Option<TextDetector<B>>,
    recognizer: Option<TextRecognizer<B>>,
    config: PipelineConfig,
}

impl<B: InferenceBackend> SubtitleOcrBuilder<B> {
    pub fn new() -> Self {
        Self {
            detector: None,
            recognizer: None,
            config: PipelineConfig::default(),
        }
    }

    /// Set the text detector.
    pub fn with_detector(mut self, detector: TextDetector<B>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Set the text recognizer.
    pub fn with_recognizer(mut self, recognizer: TextRecognizer<B>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Set stage toggles and merging.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the pipeline. The detector's output mode follows the config.
    pub fn build(self) -> SubtitleOcr<B> {
        let output_polygon = self.config.output_polygon;
        SubtitleOcr {
            detector: self
                .detector
                .map(|detector| detector.with_polygon_output(output_polygon)),
            recognizer: self.recognizer,
            merger: LineMerger::new(self.config.merge_threshold),
            config: self.config,
        }
    }
}

impl<B: InferenceBackend> Default for SubtitleOcrBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: InferenceBackend> SubtitleOcr<B> {
    pub fn builder() -> SubtitleOcrBuilder<B> {
        SubtitleOcrBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build a pipeline from configuration, loading each model with `load`.
    ///
    /// The language is validated before the file system is touched, then the
    /// model directory, then each enabled stage's model file is resolved and
    /// handed to `load` together with its kind.
    pub fn from_config_with<F>(config: &SubOcrConfig, mut load: F) -> Result<Self>
    where
        F: FnMut(&Path, &ModelKind) -> Result<B>,
    {
        let language = config.language()?;
        let model_dir = &config.models.model_dir;
        if !model_dir.is_dir() {
            return Err(ModelError::ModelDirNotFound(model_dir.clone()).into());
        }

        let mut builder = Self::builder().with_config(config.pipeline.clone());

        if config.pipeline.enable_detection {
            let kind = config.detection_model();
            let path = find_model_file(model_dir, language, &kind)?;
            debug!("Loading {} model {}", kind.stage(), path.display());
            let detector = TextDetector::new(load(&path, &kind)?)
                .with_input_size(config.detection.input_height, config.detection.input_width)
                .with_post_process(config.detection.post_process.clone());
            builder = builder.with_detector(detector);
        }

        if config.pipeline.enable_recognition {
            let kind = config.recognition_model();
            let path = find_model_file(model_dir, language, &kind)?;
            let alphabet = Alphabet::from_file(&config.alphabet_path(language))?;
            debug!("Loading {} model {}", kind.stage(), path.display());
            let recognizer = TextRecognizer::new(load(&path, &kind)?, alphabet).with_input_size(
                config.recognition.input_height,
                config.recognition.input_width,
            );
            builder = builder.with_recognizer(recognizer);
        }

        Ok(builder.build())
    }

    /// Run the pipeline on one image.
    pub fn process(
        &self,
        ctx: &ExecutionContext,
        image: &DynamicImage,
    ) -> std::result::Result<Vec<TextRegion>, OcrError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(OcrError::InvalidImage(format!("empty image {}x{}", width, height)));
        }

        let mut regions = if self.config.enable_detection {
            self.detect(ctx, image)?
        } else {
            vec![TextRegion::new(RegionShape::Quad(Quad::from_rect(
                0.0,
                0.0,
                width as f32,
                height as f32,
            )))]
        };

        if self.config.enable_recognition && !regions.is_empty() {
            let recognizer = self
                .recognizer
                .as_ref()
                .ok_or(OcrError::MissingModel("recognition"))?;

            for region in &mut regions {
                let (_, crop) = crop_with_fallback(image, height, width, region.bbox.points())
                    .map_err(|e| OcrError::Preprocessing(e.to_string()))?;
                let result = recognizer.recognize(ctx, &crop)?;
                region.text = Some(result.text);
                region.score = Some(result.confidence);
            }
        }

        Ok(regions)
    }

    /// Detection, placeholder removal and line merging.
    fn detect(
        &self,
        ctx: &ExecutionContext,
        image: &DynamicImage,
    ) -> std::result::Result<Vec<TextRegion>, OcrError> {
        let detector = self
            .detector
            .as_ref()
            .ok_or(OcrError::MissingModel("detection"))?;
        let scored = detector.detect(ctx, image)?.into_scored();
        debug!("Detected {} text regions", scored.len());

        if !self.config.merge_lines || detector.outputs_polygons() || scored.is_empty() {
            return Ok(scored
                .into_iter()
                .map(|(bbox, score)| TextRegion {
                    bbox,
                    text: None,
                    score: Some(score),
                })
                .collect());
        }

        let quads: Vec<Quad> = scored
            .into_iter()
            .filter_map(|(bbox, _)| match bbox {
                RegionShape::Quad(quad) => Some(quad),
                RegionShape::Polygon(_) => None,
            })
            .collect();
        Ok(self
            .merger
            .merge(quads)
            .into_iter()
            .map(|quad| TextRegion::new(RegionShape::Quad(quad)))
            .collect())
    }

    /// Load an image from disk and run the pipeline on it.
    pub fn process_path(&self, ctx: &ExecutionContext, path: &Path) -> Result<OcrResult> {
        let start = Instant::now();
        let image = image::open(path)?;
        let regions = self.process(ctx, &image)?;

        let result = OcrResult {
            path: Some(path.to_path_buf()),
            image_size: image.dimensions(),
            regions,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "{}: {} regions in {}ms",
            path.display(),
            result.regions.len(),
            result.processing_time_ms
        );
        Ok(result)
    }

    /// Process images independently, in order.
    pub fn process_batch(
        &self,
        ctx: &ExecutionContext,
        images: &[DynamicImage],
    ) -> std::result::Result<Vec<Vec<TextRegion>>, OcrError> {
        images.iter().map(|img| self.process(ctx, img)).collect()
    }
}

/// Pipeline backed by ONNX Runtime sessions.
#[cfg(feature = "native")]
impl SubtitleOcr<subocr_inference::OrtBackend> {
    pub fn from_config(config: &SubOcrConfig, ctx: &ExecutionContext) -> Result<Self> {
        Self::from_config_with(config, |path, _| {
            Ok(subocr_inference::OrtBackend::from_file(path, ctx)?)
        })
    }
}

/// Pipeline backed by tract. Every input shape must be fixed up front, so
/// the recognizer needs a configured `input_width`.
#[cfg(feature = "tract")]
impl SubtitleOcr<subocr_inference::TractBackend> {
    pub fn from_config_tract(config: &SubOcrConfig) -> Result<Self> {
        Self::from_config_with(config, |path, kind| {
            let shape = match kind {
                ModelKind::Detection(settings) => [
                    1,
                    3,
                    settings.input_height as usize,
                    settings.input_width as usize,
                ],
                ModelKind::Recognition(settings) => {
                    let width = settings.input_width.ok_or_else(|| {
                        crate::error::SubOcrError::Config(
                            "tract needs a fixed recognition input_width".to_string(),
                        )
                    })?;
                    [1, 3, settings.input_height as usize, width as usize]
                }
            };
            Ok(subocr_inference::TractBackend::from_file_with_shape(path, &shape)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubOcrError;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::RgbImage;
    use ndarray::{Array3, Array4, s};
    use pretty_assertions::assert_eq;
    use subocr_inference::{InputTensor, OutputTensor};

    type Respond = Box<dyn Fn(&[usize]) -> OutputTensor + Send + Sync>;

    /// Backend that answers every call from the input shape.
    struct MockBackend {
        names: Vec<String>,
        calls: Arc<AtomicUsize>,
        respond: Respond,
    }

    impl MockBackend {
        fn boxed(respond: Respond) -> (Box<dyn InferenceBackend>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let backend = MockBackend {
                names: vec!["x".to_string()],
                calls: calls.clone(),
                respond,
            };
            (Box::new(backend), calls)
        }
    }

    impl InferenceBackend for MockBackend {
        fn run(
            &self,
            _ctx: &ExecutionContext,
            inputs: &[(&str, InputTensor)],
        ) -> subocr_inference::Result<Vec<(String, OutputTensor)>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![("out".to_string(), (self.respond)(inputs[0].1.shape()))])
        }

        fn input_names(&self) -> &[String] {
            &self.names
        }

        fn output_names(&self) -> &[String] {
            &self.names
        }
    }

    /// Two words on one subtitle line, drawn on a 640x640 map.
    fn two_word_map() -> OutputTensor {
        let mut map = Array4::<f32>::zeros((1, 1, 640, 640));
        map.slice_mut(s![0, 0, 400..440, 100..200]).fill(0.9);
        map.slice_mut(s![0, 0, 404..444, 300..440]).fill(0.9);
        OutputTensor::Float32(map.into_dyn())
    }

    fn empty_map() -> OutputTensor {
        OutputTensor::Float32(Array4::<f32>::zeros((1, 1, 640, 640)).into_dyn())
    }

    /// Logits spelling "hi" for the alphabet "hi".
    fn hi_logits() -> OutputTensor {
        let mut out = Array3::<f32>::zeros((1, 4, 4));
        for (t, class) in [1usize, 0, 2, 0].into_iter().enumerate() {
            out[[0, t, class]] = 20.0;
        }
        OutputTensor::Float32(out.into_dyn())
    }

    fn frame() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(320, 320, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    struct Harness {
        ocr: SubtitleOcr<Box<dyn InferenceBackend>>,
        det_calls: Arc<AtomicUsize>,
        rec_calls: Arc<AtomicUsize>,
    }

    fn harness(config: PipelineConfig, map: fn() -> OutputTensor) -> Harness {
        let (det, det_calls) = MockBackend::boxed(Box::new(move |_: &[usize]| map()));
        let (rec, rec_calls) = MockBackend::boxed(Box::new(|_: &[usize]| hi_logits()));
        let ocr = SubtitleOcr::builder()
            .with_detector(TextDetector::new(det))
            .with_recognizer(TextRecognizer::new(rec, Alphabet::new("hi")))
            .with_config(config)
            .build();
        Harness {
            ocr,
            det_calls,
            rec_calls,
        }
    }

    #[test]
    fn test_words_merge_into_line() {
        let h = harness(PipelineConfig::default(), two_word_map);
        let regions = h.ocr.process(&ExecutionContext::cpu(), &frame()).unwrap();

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text.as_deref(), Some("hi"));
        assert!(regions[0].score.unwrap_or(0.0) > 0.99);
        let bbox = regions[0].bbox.axis_box().unwrap();
        // Map is 640 wide, the frame 320: both words land in one line.
        assert!(bbox.x_min < 50.0 && bbox.x_max > 220.0, "{:?}", bbox);
        assert!(bbox.y_min > 170.0 && bbox.y_max < 250.0, "{:?}", bbox);

        assert_eq!(h.det_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.rec_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_without_merge_keeps_detection_scores() {
        let config = PipelineConfig {
            merge_lines: false,
            enable_recognition: false,
            ..PipelineConfig::default()
        };
        let h = harness(config, two_word_map);
        let regions = h.ocr.process(&ExecutionContext::cpu(), &frame()).unwrap();

        assert_eq!(regions.len(), 2);
        for region in &regions {
            assert_eq!(region.text, None);
            assert!((region.score.unwrap_or(0.0) - 0.9).abs() < 1e-4);
            assert!(matches!(region.bbox, RegionShape::Quad(_)));
        }
        assert_eq!(h.rec_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_polygon_mode_skips_merge() {
        let config = PipelineConfig {
            output_polygon: true,
            enable_recognition: false,
            ..PipelineConfig::default()
        };
        let h = harness(config, two_word_map);
        let regions = h.ocr.process(&ExecutionContext::cpu(), &frame()).unwrap();

        assert_eq!(regions.len(), 2);
        assert!(
            regions
                .iter()
                .all(|r| matches!(r.bbox, RegionShape::Polygon(_)))
        );
    }

    #[test]
    fn test_detection_disabled_uses_whole_image() {
        let config = PipelineConfig {
            enable_detection: false,
            ..PipelineConfig::default()
        };
        let h = harness(config, two_word_map);
        let regions = h.ocr.process(&ExecutionContext::cpu(), &frame()).unwrap();

        assert_eq!(regions.len(), 1);
        assert_eq!(
            regions[0].bbox,
            RegionShape::Quad(Quad::from_rect(0.0, 0.0, 320.0, 320.0))
        );
        assert_eq!(regions[0].text.as_deref(), Some("hi"));
        assert_eq!(h.det_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_detections() {
        let h = harness(PipelineConfig::default(), empty_map);
        let regions = h.ocr.process(&ExecutionContext::cpu(), &frame()).unwrap();
        assert!(regions.is_empty());
        assert_eq!(h.rec_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_models() {
        let ocr: SubtitleOcr<Box<dyn InferenceBackend>> = SubtitleOcr::builder().build();
        let err = ocr.process(&ExecutionContext::cpu(), &frame());
        assert!(matches!(err, Err(OcrError::MissingModel("detection"))));

        let ocr: SubtitleOcr<Box<dyn InferenceBackend>> = SubtitleOcr::builder()
            .with_config(PipelineConfig {
                enable_detection: false,
                ..PipelineConfig::default()
            })
            .build();
        let err = ocr.process(&ExecutionContext::cpu(), &frame());
        assert!(matches!(err, Err(OcrError::MissingModel("recognition"))));
    }

    #[test]
    fn test_process_batch_in_order() {
        let config = PipelineConfig {
            enable_recognition: false,
            ..PipelineConfig::default()
        };
        let h = harness(config, two_word_map);
        let images = vec![frame(), frame()];
        let results = h.ocr.process_batch(&ExecutionContext::cpu(), &images).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], results[1]);
        assert_eq!(h.det_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_process_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        frame().save(&path).unwrap();

        let h = harness(PipelineConfig::default(), two_word_map);
        let result = h.ocr.process_path(&ExecutionContext::cpu(), &path).unwrap();
        assert_eq!(result.path, Some(path));
        assert_eq!(result.image_size, (320, 320));
        assert_eq!(result.regions.len(), 1);
        assert_eq!(result.text(), "hi");
    }

    fn model_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en DB deformable_resnet50 v1.onnx"), b"det").unwrap();
        std::fs::write(dir.path().join("en CRNN  v1.onnx"), b"rec").unwrap();
        std::fs::create_dir(dir.path().join("alphabets")).unwrap();
        std::fs::write(dir.path().join("alphabets").join("en.txt"), "h\ni\n").unwrap();
        dir
    }

    #[test]
    fn test_from_config_loads_models() {
        let dir = model_dir();
        let mut config = SubOcrConfig::default();
        config.models.model_dir = dir.path().to_path_buf();

        let mut loaded: Vec<(PathBuf, &'static str)> = Vec::new();
        let ocr = SubtitleOcr::from_config_with(&config, |path, kind| {
            loaded.push((path.to_path_buf(), kind.stage()));
            let respond: Respond = match kind {
                ModelKind::Detection(_) => Box::new(|_: &[usize]| two_word_map()),
                ModelKind::Recognition(_) => Box::new(|_: &[usize]| hi_logits()),
            };
            Ok(MockBackend::boxed(respond).0)
        })
        .unwrap();

        assert_eq!(
            loaded,
            vec![
                (dir.path().join("en DB deformable_resnet50 v1.onnx"), "detection"),
                (dir.path().join("en CRNN  v1.onnx"), "recognition"),
            ]
        );
        let regions = ocr.process(&ExecutionContext::cpu(), &frame()).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text.as_deref(), Some("hi"));
    }

    #[test]
    fn test_from_config_validation_order() {
        let never = |_: &Path, _: &ModelKind| -> Result<Box<dyn InferenceBackend>> {
            panic!("no model should be loaded")
        };

        // Language is checked before the directory.
        let mut config = SubOcrConfig::default();
        config.models.language = "xx".to_string();
        config.models.model_dir = PathBuf::from("/definitely/not/here");
        assert!(matches!(
            SubtitleOcr::from_config_with(&config, never),
            Err(SubOcrError::Model(ModelError::UnsupportedLanguage(_)))
        ));

        config.models.language = "en".to_string();
        assert!(matches!(
            SubtitleOcr::from_config_with(&config, never),
            Err(SubOcrError::Model(ModelError::ModelDirNotFound(_)))
        ));

        let empty = tempfile::tempdir().unwrap();
        config.models.model_dir = empty.path().to_path_buf();
        assert!(matches!(
            SubtitleOcr::from_config_with(&config, never),
            Err(SubOcrError::Model(ModelError::ModelNotFound { .. }))
        ));
    }
}
