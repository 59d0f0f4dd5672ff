//! Model file discovery.
//!
//! Model files follow the naming convention
//! `<language> <ARCH> <backbone> <anything>.onnx` inside the model directory,
//! e.g. `en DB deformable_resnet50 2024-05-01.onnx`. The first match in
//! sorted order wins.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ModelError;

use super::config::ModelKind;

/// Languages with trained models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
}

impl Language {
    pub const SUPPORTED: &'static [Language] = &[Language::English];

    /// Code used in model and alphabet file names.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::SUPPORTED
            .iter()
            .copied()
            .find(|lang| lang.code() == s)
            .ok_or_else(|| ModelError::UnsupportedLanguage(s.to_string()))
    }
}

/// File name pattern for a model, relative to the model directory.
pub fn model_file_pattern(language: Language, kind: &ModelKind) -> String {
    format!(
        "{} {} {} *.onnx",
        Pattern::escape(language.code()),
        Pattern::escape(kind.arch()),
        Pattern::escape(kind.backbone())
    )
}

/// Locate the model file for `language` and `kind` in `model_dir`.
pub fn find_model_file(
    model_dir: &Path,
    language: Language,
    kind: &ModelKind,
) -> Result<PathBuf, ModelError> {
    if !model_dir.is_dir() {
        return Err(ModelError::ModelDirNotFound(model_dir.to_path_buf()));
    }

    let file_pattern = model_file_pattern(language, kind);
    let full_pattern = format!(
        "{}/{}",
        Pattern::escape(&model_dir.to_string_lossy()),
        file_pattern
    );

    let mut matches: Vec<PathBuf> = glob::glob(&full_pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    matches.sort();

    let path = matches
        .into_iter()
        .next()
        .ok_or(ModelError::ModelNotFound {
            pattern: file_pattern,
        })?;

    debug!("Resolved {} model: {}", kind.stage(), path.display());
    Ok(path)
}
