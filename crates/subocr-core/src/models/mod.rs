//! Configuration, model discovery and alphabets.

pub mod alphabet;
pub mod config;
pub mod registry;

pub use alphabet::Alphabet;
pub use config::{
    DetectionSettings, ModelConfig, ModelKind, PipelineConfig, RecognitionSettings, SubOcrConfig,
};
pub use registry::{Language, find_model_file, model_file_pattern};
