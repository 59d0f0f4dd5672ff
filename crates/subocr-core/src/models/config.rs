//! Configuration structures for the subtitle OCR pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result, SubOcrError};
use crate::ocr::DbPostProcessConfig;

use super::registry::Language;

/// Main configuration for the subocr pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubOcrConfig {
    /// Stage toggles.
    pub pipeline: PipelineConfig,

    /// Detector input size and post-processing.
    pub detection: DetectionSettings,

    /// Recognizer input size.
    pub recognition: RecognitionSettings,

    /// Model locations.
    pub models: ModelConfig,
}

/// Which stages run and how their output is shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run the detector. When off the whole image is one region.
    pub enable_detection: bool,

    /// Run the recognizer on each region.
    pub enable_recognition: bool,

    /// Emit free polygons instead of oriented quads.
    pub output_polygon: bool,

    /// Merge word boxes into lines.
    pub merge_lines: bool,

    /// Vertical gap, in pixels, that starts a new line.
    pub merge_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_detection: true,
            enable_recognition: true,
            output_polygon: false,
            merge_lines: true,
            merge_threshold: crate::ocr::DEFAULT_MERGE_THRESHOLD,
        }
    }
}

/// Detection model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Backbone name used in the model file name.
    pub backbone: String,

    /// Detector input height.
    pub input_height: u32,

    /// Detector input width.
    pub input_width: u32,

    /// Probability map post-processing.
    #[serde(flatten)]
    pub post_process: DbPostProcessConfig,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            backbone: "deformable_resnet50".to_string(),
            input_height: 640,
            input_width: 640,
            post_process: DbPostProcessConfig::default(),
        }
    }
}

/// Recognition model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Backbone name used in the model file name. Empty for the default CRNN.
    pub backbone: String,

    /// Recognizer input height.
    pub input_height: u32,

    /// Fixed recognizer input width, or `None` to follow each crop's width.
    pub input_width: Option<u32>,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            backbone: String::new(),
            input_height: 32,
            input_width: None,
        }
    }
}

/// Model file locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Language code, e.g. "en".
    pub language: String,

    /// Directory with `<language>.txt` alphabet files. Relative paths are
    /// resolved against `model_dir`.
    pub alphabet_dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("saved models"),
            language: Language::English.code().to_string(),
            alphabet_dir: PathBuf::from("alphabets"),
        }
    }
}

/// A model the pipeline loads, with the settings that go with it.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelKind {
    Detection(DetectionSettings),
    Recognition(RecognitionSettings),
}

impl ModelKind {
    /// Architecture tag used in model file names.
    pub fn arch(&self) -> &'static str {
        match self {
            ModelKind::Detection(_) => "DB",
            ModelKind::Recognition(_) => "CRNN",
        }
    }

    pub fn backbone(&self) -> &str {
        match self {
            ModelKind::Detection(settings) => &settings.backbone,
            ModelKind::Recognition(settings) => &settings.backbone,
        }
    }

    /// Human-readable stage name.
    pub fn stage(&self) -> &'static str {
        match self {
            ModelKind::Detection(_) => "detection",
            ModelKind::Recognition(_) => "recognition",
        }
    }
}

impl SubOcrConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| SubOcrError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| SubOcrError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The configured language, rejected if no models exist for it.
    pub fn language(&self) -> std::result::Result<Language, ModelError> {
        self.models.language.parse()
    }

    pub fn detection_model(&self) -> ModelKind {
        ModelKind::Detection(self.detection.clone())
    }

    pub fn recognition_model(&self) -> ModelKind {
        ModelKind::Recognition(self.recognition.clone())
    }

    /// Alphabet file for `language`.
    pub fn alphabet_path(&self, language: Language) -> PathBuf {
        let dir = if self.models.alphabet_dir.is_absolute() {
            self.models.alphabet_dir.clone()
        } else {
            self.models.model_dir.join(&self.models.alphabet_dir)
        };
        dir.join(format!("{}.txt", language.code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SubOcrConfig::default();
        assert_eq!(config.detection.input_height, 640);
        assert_eq!(config.detection.input_width, 640);
        assert_eq!(config.detection.post_process.box_confidence_threshold, 0.7);
        assert_eq!(config.recognition.input_height, 32);
        assert_eq!(config.recognition.input_width, None);
        assert_eq!(config.pipeline.merge_threshold, 10.0);
        assert_eq!(config.models.model_dir, PathBuf::from("saved models"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SubOcrConfig = serde_json::from_str(
            r#"{"detection": {"unclip_ratio": 1.5}, "recognition": {"input_width": 100}}"#,
        )
        .unwrap();
        assert_eq!(config.detection.post_process.unclip_ratio, 1.5);
        assert_eq!(config.detection.post_process.binarize_threshold, 0.3);
        assert_eq!(config.detection.backbone, "deformable_resnet50");
        assert_eq!(config.recognition.input_width, Some(100));
        assert!(config.pipeline.enable_detection);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = SubOcrConfig::default();
        config.pipeline.output_polygon = true;
        config.detection.post_process.max_candidates = 50;
        config.save(&path).unwrap();

        assert_eq!(SubOcrConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(SubOcrConfig::from_file(&path), Err(SubOcrError::Config(_))));
        assert!(matches!(
            SubOcrConfig::from_file(&dir.path().join("missing.json")),
            Err(SubOcrError::Io(_))
        ));
    }

    #[test]
    fn test_model_kinds() {
        let config = SubOcrConfig::default();
        let det = config.detection_model();
        let rec = config.recognition_model();
        assert_eq!((det.arch(), det.backbone(), det.stage()), ("DB", "deformable_resnet50", "detection"));
        assert_eq!((rec.arch(), rec.backbone(), rec.stage()), ("CRNN", "", "recognition"));
    }

    #[test]
    fn test_alphabet_path() {
        let mut config = SubOcrConfig::default();
        config.models.model_dir = PathBuf::from("/models");
        assert_eq!(
            config.alphabet_path(Language::English),
            PathBuf::from("/models/alphabets/en.txt")
        );
        config.models.alphabet_dir = PathBuf::from("/etc/alphabets");
        assert_eq!(
            config.alphabet_path(Language::English),
            PathBuf::from("/etc/alphabets/en.txt")
        );
    }

    #[test]
    fn test_unsupported_language() {
        let mut config = SubOcrConfig::default();
        config.models.language = "xx".to_string();
        assert!(matches!(config.language(), Err(ModelError::UnsupportedLanguage(_))));
    }
}
