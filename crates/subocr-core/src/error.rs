//! Error types for the subocr-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the subocr library.
#[derive(Error, Debug)]
pub enum SubOcrError {
    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Geometry error.
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Model resolution or loading error.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Evaluation input error.
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// Inference error from the inference layer.
    #[error("inference error: {0}")]
    Inference(#[from] subocr_inference::InferenceError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Text detection failed.
    #[error("text detection failed: {0}")]
    Detection(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Image preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The pipeline was asked to run a stage it has no model for.
    #[error("no {0} model configured")]
    MissingModel(&'static str),

    /// Inference error while running a model.
    #[error(transparent)]
    Inference(#[from] subocr_inference::InferenceError),
}

/// Errors related to coordinate handling.
#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    /// Coordinates do not describe a usable shape.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

/// Errors raised while locating or loading models.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Requested language has no models.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The model directory does not exist.
    #[error("model directory not found: {}", .0.display())]
    ModelDirNotFound(PathBuf),

    /// No file matched the model pattern.
    #[error("no model file matches '{pattern}'")]
    ModelNotFound { pattern: String },

    /// The model file name pattern could not be built.
    #[error("invalid model pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Failed to read the alphabet file.
    #[error("failed to load alphabet {}: {source}", .path.display())]
    Alphabet {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The alphabet file contains no characters.
    #[error("alphabet {} is empty", .0.display())]
    EmptyAlphabet(PathBuf),
}

/// Errors related to evaluation input.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Ground truth and predictions describe different numbers of images.
    #[error("ground truth has {ground_truth} images but predictions have {predictions}")]
    ImageCountMismatch {
        ground_truth: usize,
        predictions: usize,
    },

    /// Evaluation input could not be parsed.
    #[error("failed to parse evaluation input: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for the subocr library.
pub type Result<T> = std::result::Result<T, SubOcrError>;
