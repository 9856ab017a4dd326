//! Fast end-to-end remover
//!
//! A self-contained bytes-in, bytes-out path around U²-Net. It shares the
//! decoding, tensor layout and mask scaling of the precise path but never the
//! Gaussian edge smoothing: its refinement option is alpha matting.

use crate::compositor::encode_png;
use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use crate::matting::{matting_cutout, MattingParams};
use crate::models::{ModelKind, PreprocessingConfig};
use crate::postprocessing::{MaskPostprocessor, RawMaskTensor};
use crate::preprocessing::ImagePreprocessor;
use crate::types::SegmentationMask;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tracing::debug;

/// Background remover that owns its whole pipeline
pub trait FastRemover: Send + Sync {
    /// Remove the background from encoded image bytes, returning PNG bytes
    ///
    /// # Errors
    /// - Decode, inference, shape or encode failures
    fn remove(&self, bytes: &[u8], alpha_matting: bool) -> Result<Vec<u8>>;
}

/// U²-Net remover with optional alpha matting
pub struct U2NetRemover {
    backend: Arc<dyn InferenceBackend>,
    preprocessing: PreprocessingConfig,
    matting: MattingParams,
}

impl U2NetRemover {
    #[must_use]
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            preprocessing: ModelKind::Fast.descriptor().preprocessing,
            matting: MattingParams::default(),
        }
    }
}

impl FastRemover for U2NetRemover {
    fn remove(&self, bytes: &[u8], alpha_matting: bool) -> Result<Vec<u8>> {
        let image = ImagePreprocessor::decode(bytes)?;
        let (width, height) = (image.width(), image.height());

        let tensor = ImagePreprocessor::preprocess(&image, &self.preprocessing)?;
        let raw = RawMaskTensor::try_from(self.backend.infer(&tensor)?)?;
        let mask = MaskPostprocessor::postprocess(&raw, width, height, false)?;
        debug!(
            backend = self.backend.name(),
            width,
            height,
            alpha_matting,
            "Fast mask ready"
        );

        let cutout = if alpha_matting {
            matting_cutout(&image.to_rgb8(), &mask, &self.matting)?
        } else {
            naive_cutout(&image.to_rgba8(), &mask)?
        };

        encode_png(cutout)
    }
}

/// Blend every channel of `image` against transparent black by the mask
///
/// # Errors
/// - Image and mask dimensions differ
pub fn naive_cutout(image: &RgbaImage, mask: &SegmentationMask) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions {
        return Err(CutoutError::shape(format!(
            "Mask is {}x{} but image is {}x{}",
            mask.width(),
            mask.height(),
            image.width(),
            image.height()
        )));
    }

    let mut output = image.clone();
    for (pixel, &m) in output.pixels_mut().zip(mask.data.iter()) {
        *pixel = Rgba(pixel.0.map(|v| blend(v, m)));
    }
    Ok(output)
}

fn blend(value: u8, mask: u8) -> u8 {
    ((u16::from(value) * u16::from(mask) + 127) / 255) as u8
}
