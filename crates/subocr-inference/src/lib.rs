//! Model execution layer for subocr.
//!
//! The detector and recognizer networks are opaque to the rest of the
//! workspace: they consume a normalized NCHW tensor and return a raw output
//! tensor. This crate provides a unified interface for running them across
//! different backends:
//! - `ort` with XNNPACK (CPU) or CUDA execution providers for native platforms
//! - `tract` as a pure Rust fallback
//!
//! Every call receives an explicit [`ExecutionContext`] instead of relying on
//! a process-wide device setting.

mod backend;
mod context;
mod error;
mod tensor;

pub use backend::InferenceBackend;
pub use context::{Device, ExecutionContext};
pub use error::InferenceError;
pub use tensor::{InputTensor, OutputTensor, TensorType};

#[cfg(feature = "native")]
pub use backend::ort::OrtBackend;

#[cfg(feature = "tract")]
pub use backend::tract::TractBackend;

/// Result type for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
