//! ONNX Runtime backend implementation
//!
//! Sessions are built once at startup from a model file on disk and shared by
//! every request. `Session::run` needs `&mut self`, so each backend owns its
//! session behind a mutex and runs one inference at a time.

use crate::config::ExecutionProvider;
use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use crate::models::ModelKind;
use instant::Instant;
use ndarray::{Array4, ArrayD};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;

/// ONNX Runtime backend for one segmentation model
#[derive(Debug)]
pub struct OnnxBackend {
    session: Mutex<Session>,
    kind: ModelKind,
    input_shape: (usize, usize, usize, usize),
}

impl OnnxBackend {
    /// List all ONNX Runtime execution providers with availability status
    #[must_use]
    pub fn list_providers() -> Vec<(ExecutionProvider, bool)> {
        let cuda =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml = OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
            .unwrap_or(false);

        vec![
            (ExecutionProvider::Cpu, true),
            (ExecutionProvider::Cuda, cuda),
            (ExecutionProvider::CoreMl, coreml),
        ]
    }

    /// Load a model file and build its session
    ///
    /// # Errors
    /// - Session builder configuration failures
    /// - Model file missing or not a valid ONNX graph
    pub fn load(
        kind: ModelKind,
        model_path: &Path,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> Result<Self> {
        let load_start = Instant::now();

        let mut builder = Session::builder()
            .map_err(|e| CutoutError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| CutoutError::model(format!("Failed to set optimization level: {e}")))?;

        let providers = Self::select_providers(provider);
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                CutoutError::model(format!("Failed to set {provider} execution provider: {e}"))
            })?;
        }

        // 0 = auto-detect
        let intra_threads = if intra_threads > 0 {
            intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        let session = builder
            .with_intra_threads(intra_threads)
            .map_err(|e| CutoutError::model(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                CutoutError::model(format!(
                    "Failed to create session from {}: {e}",
                    model_path.display()
                ))
            })?;

        log::debug!("Session configuration for {kind} model:");
        log::debug!("  - Requested provider: {provider}");
        log::debug!("  - Threading: {intra_threads} intra-op threads");
        log::debug!("  - Optimization level: Level3");
        log::info!(
            "Loaded {} in {:.0}ms",
            kind.descriptor().name,
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session: Mutex::new(session),
            kind,
            input_shape: kind.descriptor().preprocessing.tensor_shape(),
        })
    }

    /// Execution providers to register for `provider`, empty for plain CPU
    fn select_providers(provider: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = || {
            let ep = CUDAExecutionProvider::default();
            OrtExecutionProvider::is_available(&ep)
                .unwrap_or(false)
                .then(|| ep.build())
        };
        let coreml = || {
            let ep = CoreMLExecutionProvider::default();
            OrtExecutionProvider::is_available(&ep)
                .unwrap_or(false)
                .then(|| ep.with_subgraphs(true).build())
        };

        match provider {
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Auto => {
                // CUDA > CoreML > CPU
                let providers: Vec<_> = [cuda(), coreml()].into_iter().flatten().collect();
                if providers.is_empty() {
                    log::warn!("No hardware acceleration available, falling back to CPU");
                } else {
                    log::info!(
                        "Hardware acceleration enabled with {} provider(s)",
                        providers.len()
                    );
                }
                providers
            },
            ExecutionProvider::Cuda => cuda().map_or_else(
                || {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                    Vec::new()
                },
                |ep| {
                    log::info!("Using CUDA execution provider");
                    vec![ep]
                },
            ),
            ExecutionProvider::CoreMl => coreml().map_or_else(
                || {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                    Vec::new()
                },
                |ep| {
                    log::info!("Using CoreML execution provider");
                    vec![ep]
                },
            ),
        }
    }
}

impl InferenceBackend for OnnxBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone())
            .map_err(|e| CutoutError::inference(format!("Failed to convert input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| CutoutError::internal("ONNX session lock poisoned"))?;

        // Positional input and output, independent of tensor names in the export
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| CutoutError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| CutoutError::inference("No output tensors found"))?;

        let output = outputs
            .get(first_key)
            .ok_or_else(|| CutoutError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| CutoutError::inference(format!("Failed to extract output tensor: {e}")))?
            .to_owned();

        log::debug!(
            "Inference complete: {:.2}ms, output shape {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            output.shape()
        );

        Ok(output)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.input_shape
    }

    fn name(&self) -> &str {
        self.kind.descriptor().name
    }
}
