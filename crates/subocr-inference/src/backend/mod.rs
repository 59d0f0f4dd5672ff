//! Inference backend implementations.

#[cfg(feature = "native")]
pub mod ort;

#[cfg(feature = "tract")]
pub mod tract;

use crate::{ExecutionContext, InputTensor, OutputTensor, Result};

/// Trait for model inference backends.
///
/// This trait abstracts over different ONNX runtime implementations,
/// allowing the same detection and recognition code to run on ONNX Runtime
/// or on tract, and to be replaced by a stub in tests.
pub trait InferenceBackend: Send + Sync {
    /// Run inference with the given inputs.
    ///
    /// # Arguments
    /// * `ctx` - Device and threading for this call
    /// * `inputs` - Named input tensors
    ///
    /// # Returns
    /// Named output tensors from the model
    fn run(
        &self,
        ctx: &ExecutionContext,
        inputs: &[(&str, InputTensor)],
    ) -> Result<Vec<(String, OutputTensor)>>;

    /// Get the input names expected by the model.
    fn input_names(&self) -> &[String];

    /// Get the output names produced by the model.
    fn output_names(&self) -> &[String];
}

impl<T: InferenceBackend + ?Sized> InferenceBackend for Box<T> {
    fn run(
        &self,
        ctx: &ExecutionContext,
        inputs: &[(&str, InputTensor)],
    ) -> Result<Vec<(String, OutputTensor)>> {
        (**self).run(ctx, inputs)
    }

    fn input_names(&self) -> &[String] {
        (**self).input_names()
    }

    fn output_names(&self) -> &[String] {
        (**self).output_names()
    }
}
