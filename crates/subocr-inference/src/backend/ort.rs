//! ONNX Runtime (ort) backend for native platforms.
//!
//! CPU sessions use the XNNPACK execution provider, CUDA sessions the CUDA
//! provider. One session is kept per [`ExecutionContext`] and created on
//! first use from the model bytes held by the backend.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::ArrayD;
use ort::ep::{CUDA, XNNPACK};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use tracing::debug;

use crate::error::InferenceError;
use crate::tensor::{InputTensor, OutputTensor};
use crate::{Device, ExecutionContext, InferenceBackend, Result};

/// Backend using ONNX Runtime for native inference.
///
/// One session is built per execution context; calls sharing a context
/// take turns on it.
pub struct OrtBackend {
    model: Vec<u8>,
    sessions: Mutex<HashMap<ExecutionContext, Arc<Mutex<Session>>>>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OrtBackend {
    /// Load a model from a file path, building a session for `ctx`.
    pub fn from_file<P: AsRef<Path>>(path: P, ctx: &ExecutionContext) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading ONNX model from: {}", path.display());

        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes, ctx)
    }

    /// Load a model from bytes, building a session for `ctx`.
    pub fn from_bytes(bytes: Vec<u8>, ctx: &ExecutionContext) -> Result<Self> {
        debug!("Loading ONNX model from {} bytes on {}", bytes.len(), ctx.device);

        let session = build_session(&bytes, ctx)?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect();

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        debug!("Model inputs: {:?}", input_names);
        debug!("Model outputs: {:?}", output_names);

        let mut sessions = HashMap::new();
        sessions.insert(*ctx, Arc::new(Mutex::new(session)));

        Ok(Self {
            model: bytes,
            sessions: Mutex::new(sessions),
            input_names,
            output_names,
        })
    }

    fn session_for(&self, ctx: &ExecutionContext) -> Result<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.lock().map_err(|e| {
            InferenceError::InferenceFailed(format!("Failed to lock session table: {}", e))
        })?;

        if let Some(session) = sessions.get(ctx) {
            return Ok(Arc::clone(session));
        }

        debug!("Creating session for {} ({} threads)", ctx.device, ctx.intra_threads);
        let session = Arc::new(Mutex::new(build_session(&self.model, ctx)?));
        sessions.insert(*ctx, Arc::clone(&session));
        Ok(session)
    }

    fn convert_input(
        &self,
        tensor: &InputTensor,
    ) -> Result<ort::session::SessionInputValue<'static>> {
        match tensor {
            InputTensor::Float32(arr) => {
                let shape: Vec<i64> = arr.shape().iter().map(|&s| s as i64).collect();
                let data: Vec<f32> = arr.iter().cloned().collect();
                Tensor::from_array((shape, data))
                    .map(Into::into)
                    .map_err(|e| InferenceError::InvalidInput(e.to_string()))
            }
        }
    }
}

fn build_session(bytes: &[u8], ctx: &ExecutionContext) -> Result<Session> {
    let builder = Session::builder().map_err(|e| InferenceError::SessionCreate(e.to_string()))?;

    let builder = match ctx.device {
        Device::Cpu => builder.with_execution_providers([XNNPACK::default().build()]),
        Device::Cuda(id) => {
            builder.with_execution_providers([CUDA::default().with_device_id(id).build()])
        }
    }
    .map_err(|e| InferenceError::SessionCreate(e.to_string()))?;

    builder
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| InferenceError::SessionCreate(e.to_string()))?
        .with_intra_threads(ctx.intra_threads)
        .map_err(|e| InferenceError::SessionCreate(e.to_string()))?
        .commit_from_memory(bytes)
        .map_err(|e| InferenceError::ModelLoad(e.to_string()))
}

impl InferenceBackend for OrtBackend {
    fn run(
        &self,
        ctx: &ExecutionContext,
        inputs: &[(&str, InputTensor)],
    ) -> Result<Vec<(String, OutputTensor)>> {
        let ort_inputs: Vec<(&str, ort::session::SessionInputValue<'static>)> = inputs
            .iter()
            .map(|(name, tensor)| {
                let value = self.convert_input(tensor)?;
                Ok((*name, value))
            })
            .collect::<Result<Vec<_>>>()?;

        let session = self.session_for(ctx)?;
        let mut session = session.lock().map_err(|e| {
            InferenceError::InferenceFailed(format!("Failed to lock session: {}", e))
        })?;

        let outputs = session
            .run(ort_inputs)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let mut results = Vec::with_capacity(outputs.len());

        for (name, value) in outputs.iter() {
            let tensor = if let Ok(tensor_ref) = value.try_extract_tensor::<f32>() {
                let (shape_ref, data) = tensor_ref;
                let shape: Vec<usize> = shape_ref.iter().map(|&s| s as usize).collect();
                let arr = ArrayD::from_shape_vec(ndarray::IxDyn(&shape), data.to_vec())
                    .map_err(|e| InferenceError::OutputExtraction(e.to_string()))?;
                OutputTensor::Float32(arr)
            } else if let Ok(tensor_ref) = value.try_extract_tensor::<i64>() {
                let (shape_ref, data) = tensor_ref;
                let shape: Vec<usize> = shape_ref.iter().map(|&s| s as usize).collect();
                let arr = ArrayD::from_shape_vec(ndarray::IxDyn(&shape), data.to_vec())
                    .map_err(|e| InferenceError::OutputExtraction(e.to_string()))?;
                OutputTensor::Int64(arr)
            } else {
                return Err(InferenceError::OutputExtraction(format!(
                    "unsupported output type for '{}'",
                    name
                )));
            };

            results.push((name.to_string(), tensor));
        }

        Ok(results)
    }

    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }
}
