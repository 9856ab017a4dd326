#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Cutout
//!
//! Background removal over HTTP with two interchangeable segmentation backends.
//!
//! - **Precise** mode runs RMBG-1.4 through ONNX Runtime and performs its own
//!   pre- and post-processing: RGB resize to 1024x1024, mean/std normalization,
//!   min/max mask normalization and an optional Gaussian edge smoothing pass.
//! - **Fast** mode runs a U2Net salient-object model at 320x320 and optionally
//!   refines the cutout with trimap-based alpha matting.
//!
//! Both modes return a PNG of the original dimensions whose alpha channel is the
//! predicted foreground mask.
//!
//! ## Library usage
//!
//! The pipeline is usable without the HTTP surface. Any [`InferenceBackend`]
//! can drive a [`PreciseProcessor`]:
//!
//! ```rust,no_run
//! # #[cfg(feature = "onnx")]
//! # fn example(upload: &[u8]) -> cutout::Result<()> {
//! use cutout::{OnnxBackend, ModelKind, ExecutionProvider, PreciseProcessor};
//! use std::sync::Arc;
//!
//! let backend = OnnxBackend::load(
//!     ModelKind::Precise,
//!     "models/rmbg-1.4.onnx".as_ref(),
//!     ExecutionProvider::Cpu,
//!     0,
//! )?;
//! let processor = PreciseProcessor::new(Arc::new(backend));
//! let output = processor.process(upload, true)?;
//! std::fs::write("cutout.png", &output.png)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA and `CoreML` providers
//! - `server` (default): axum HTTP service, CLI and tracing subscriber
//! - `tracing-json`: JSON log output for the server

pub mod backends;
pub mod cache;
#[cfg(all(feature = "server", feature = "onnx"))]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod fast;
pub mod inference;
pub mod matting;
pub mod models;
pub mod postprocessing;
pub mod preprocessing;
pub mod processor;
#[cfg(feature = "server")]
pub mod server;
pub mod tracing_config;
pub mod types;

// Public API exports
pub use backends::*;
pub use cache::{format_size, ModelCache};
pub use compositor::{composite, encode_png};
pub use config::{ExecutionProvider, ModelOverrides, ServerConfig, ServerConfigBuilder};
pub use context::AppContext;
pub use download::{ModelDownloader, ModelFetcher};
pub use error::{CutoutError, Result};
pub use fast::{naive_cutout, FastRemover, U2NetRemover};
pub use inference::InferenceBackend;
pub use matting::{matting_cutout, MattingParams};
pub use models::{ModelDescriptor, ModelKind, PreprocessingConfig};
pub use postprocessing::{MaskPostprocessor, RawMaskTensor};
pub use preprocessing::ImagePreprocessor;
pub use processor::{Mode, PreciseProcessor};
pub use tracing_config::{spans, TracingConfig, TracingFormat};
pub use types::{CutoutOutput, ProcessingTimings, SegmentationMask};
