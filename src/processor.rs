//! Request modes and the precise processing pipeline
//!
//! The precise path runs every stage in-crate:
//!
//! ```text
//! bytes -> decode -> preprocess -> infer -> RawMaskTensor -> postprocess -> composite -> PNG
//! ```

use crate::compositor::{composite, encode_png};
use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelKind, PreprocessingConfig};
use crate::postprocessing::{MaskPostprocessor, RawMaskTensor};
use crate::preprocessing::ImagePreprocessor;
use crate::types::{CutoutOutput, ProcessingTimings, SegmentationMask};
use image::DynamicImage;
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, span, Level};

/// Processing mode selected per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// RMBG-1.4 through the in-crate pipeline
    #[default]
    Precise,
    /// U²-Net end-to-end remover
    Fast,
}

impl Mode {
    /// Resolve a raw mode field
    ///
    /// An absent field means [`Mode::Precise`]. Unrecognized values are
    /// rejected unless `fallback` is set, in which case they select
    /// [`Mode::Fast`].
    ///
    /// # Errors
    /// - Unrecognized value with `fallback` disabled
    pub fn resolve(raw: Option<&str>, fallback: bool) -> Result<Self> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };

        match raw.parse() {
            Ok(mode) => Ok(mode),
            Err(_) if fallback => {
                debug!(mode = raw, "Unrecognized mode routed to fast backend");
                Ok(Self::Fast)
            },
            Err(e) => Err(e),
        }
    }

    /// Backend that serves this mode
    #[must_use]
    pub fn model_kind(self) -> ModelKind {
        match self {
            Self::Precise => ModelKind::Precise,
            Self::Fast => ModelKind::Fast,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.model_kind().as_str()
    }
}

impl FromStr for Mode {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "precise" => Ok(Self::Precise),
            "fast" => Ok(Self::Fast),
            _ => Err(CutoutError::invalid_request(format!(
                "Unknown mode '{s}' (expected 'precise' or 'fast')"
            ))),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precise background removal: RMBG-1.4 plus in-crate pre/post-processing
pub struct PreciseProcessor {
    backend: Arc<dyn InferenceBackend>,
    preprocessing: PreprocessingConfig,
}

impl PreciseProcessor {
    #[must_use]
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self::with_preprocessing(backend, ModelKind::Precise.descriptor().preprocessing)
    }

    #[must_use]
    pub fn with_preprocessing(
        backend: Arc<dyn InferenceBackend>,
        preprocessing: PreprocessingConfig,
    ) -> Self {
        if backend.input_shape() != preprocessing.tensor_shape() {
            log::warn!(
                "Backend {} expects input {:?} but preprocessing produces {:?}",
                backend.name(),
                backend.input_shape(),
                preprocessing.tensor_shape()
            );
        }
        Self {
            backend,
            preprocessing,
        }
    }

    /// Run the whole pipeline on uploaded bytes
    ///
    /// # Errors
    /// - Decode, inference, shape or encode failures; nothing partial is returned
    pub fn process(&self, bytes: &[u8], smooth: bool) -> Result<CutoutOutput> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        let decode_start = Instant::now();
        let image = ImagePreprocessor::decode(bytes)?;
        timings.decode_ms = decode_start.elapsed().as_millis() as u64;

        let dimensions = (image.width(), image.height());
        let mask = self.mask_with_timings(&image, smooth, &mut timings)?;

        let encode_start = Instant::now();
        let png = {
            let _span = span!(Level::DEBUG, "composite", width = dimensions.0, height = dimensions.1)
                .entered();
            encode_png(composite(&image.to_rgb8(), &mask)?)?
        };
        timings.encode_ms = encode_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        debug!(
            decode_ms = timings.decode_ms,
            preprocessing_ms = timings.preprocessing_ms,
            inference_ms = timings.inference_ms,
            postprocessing_ms = timings.postprocessing_ms,
            encode_ms = timings.encode_ms,
            total_ms = timings.total_ms,
            "Precise cutout complete"
        );

        Ok(CutoutOutput {
            png,
            dimensions,
            timings: Some(timings),
        })
    }

    /// Opacity mask for `image`, sized like `image`
    ///
    /// # Errors
    /// - Inference or shape failures
    pub fn mask(&self, image: &DynamicImage, smooth: bool) -> Result<SegmentationMask> {
        self.mask_with_timings(image, smooth, &mut ProcessingTimings::default())
    }

    fn mask_with_timings(
        &self,
        image: &DynamicImage,
        smooth: bool,
        timings: &mut ProcessingTimings,
    ) -> Result<SegmentationMask> {
        let (width, height) = (image.width(), image.height());

        let preprocess_start = Instant::now();
        let input = {
            let _span = span!(Level::DEBUG, "preprocessing", width, height).entered();
            ImagePreprocessor::preprocess(image, &self.preprocessing)?
        };
        timings.preprocessing_ms = preprocess_start.elapsed().as_millis() as u64;

        let inference_start = Instant::now();
        let raw = {
            let _span = span!(Level::DEBUG, "inference", backend = self.backend.name()).entered();
            RawMaskTensor::try_from(self.backend.infer(&input)?)?
        };
        timings.inference_ms = inference_start.elapsed().as_millis() as u64;

        let postprocess_start = Instant::now();
        let mask = {
            let _span = span!(Level::DEBUG, "postprocessing", smooth).entered();
            MaskPostprocessor::postprocess(&raw, width, height, smooth)?
        };
        timings.postprocessing_ms = postprocess_start.elapsed().as_millis() as u64;

        Ok(mask)
    }
}
