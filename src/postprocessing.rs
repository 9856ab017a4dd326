//! Raw model output to opacity mask conversion
//!
//! Segmentation models are exported either with a channel axis
//! (`[N, C, H, W]`) or without one (`[N, H, W]`). The output is resolved into a
//! [`RawMaskTensor`] right after inference so nothing downstream branches on
//! rank again; any other rank is a [`CutoutError::Shape`].

use crate::error::{CutoutError, Result};
use crate::types::SegmentationMask;
use image::{imageops, GrayImage};
use ndarray::{s, Array2, Array3, Array4, ArrayD, ArrayView2, Ix3, Ix4};
use tracing::trace;

/// Standard deviation of the optional Gaussian edge smoothing, in pixels
pub const SMOOTHING_SIGMA: f32 = 1.5;

/// Model output resolved to one of the two accepted layouts
#[derive(Debug, Clone, PartialEq)]
pub enum RawMaskTensor {
    /// `[batch, height, width]`
    ThreeAxis(Array3<f32>),
    /// `[batch, channel, height, width]`
    FourAxis(Array4<f32>),
}

impl TryFrom<ArrayD<f32>> for RawMaskTensor {
    type Error = CutoutError;

    fn try_from(raw: ArrayD<f32>) -> Result<Self> {
        let shape = raw.shape().to_vec();
        let resolved = match raw.ndim() {
            3 => raw.into_dimensionality::<Ix3>().map(Self::ThreeAxis),
            4 => raw.into_dimensionality::<Ix4>().map(Self::FourAxis),
            rank => {
                return Err(CutoutError::shape(format!(
                    "Unexpected model output shape {shape:?}: expected 3 axes [N, H, W] or 4 axes [N, C, H, W], got {rank}"
                )))
            },
        };

        let tensor = resolved.map_err(|e| CutoutError::shape(format!("{shape:?}: {e}")))?;
        tensor.validate()?;
        Ok(tensor)
    }
}

impl RawMaskTensor {
    fn validate(&self) -> Result<()> {
        let shape = self.shape();
        if shape.iter().any(|&d| d == 0) {
            return Err(CutoutError::shape(format!(
                "Model output shape {shape:?} has an empty axis"
            )));
        }
        Ok(())
    }

    /// Logical shape of the underlying tensor
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::ThreeAxis(t) => t.shape(),
            Self::FourAxis(t) => t.shape(),
        }
    }

    /// First batch element (and first channel) as a 2D grid
    #[must_use]
    pub fn first_grid(&self) -> ArrayView2<'_, f32> {
        match self {
            Self::ThreeAxis(t) => t.slice(s![0, .., ..]),
            Self::FourAxis(t) => t.slice(s![0, 0, .., ..]),
        }
    }

    /// Native spatial resolution as (width, height)
    #[must_use]
    pub fn native_size(&self) -> (usize, usize) {
        let grid = self.first_grid();
        (grid.ncols(), grid.nrows())
    }
}

/// Converts raw model output into a mask sized like the original image
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Turn a resolved model output into a mask of exactly `target_width x target_height`
    ///
    /// Steps: min/max normalize at native resolution, truncate to `u8`,
    /// bilinear resize to the target, then optionally Gaussian-blur with
    /// [`SMOOTHING_SIGMA`].
    ///
    /// # Errors
    /// - Target dimensions are zero
    pub fn postprocess(
        raw: &RawMaskTensor,
        target_width: u32,
        target_height: u32,
        smooth: bool,
    ) -> Result<SegmentationMask> {
        if target_width == 0 || target_height == 0 {
            return Err(CutoutError::shape(format!(
                "Cannot scale mask to {target_width}x{target_height}"
            )));
        }

        let native = Self::normalize(raw.first_grid());
        let native_image = Self::grid_to_image(&native)?;
        trace!(
            native_width = native_image.width(),
            native_height = native_image.height(),
            target_width,
            target_height,
            smooth,
            "Scaling mask"
        );

        let mut resized = imageops::resize(
            &native_image,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        );

        if smooth {
            resized = Self::smooth(&resized);
        }

        Ok(SegmentationMask::from_image(resized))
    }

    /// Min/max normalize a float grid into `0..=255`
    ///
    /// The minimum is shifted to zero and the grid is divided by its new
    /// maximum. A constant grid has maximum zero and stays all zeros.
    /// Scaled values are truncated, not rounded.
    #[must_use]
    pub fn normalize(grid: ArrayView2<'_, f32>) -> Array2<u8> {
        let min = grid.iter().copied().fold(f32::INFINITY, f32::min);
        let shifted = grid.mapv(|v| v - min);
        let max = shifted.iter().copied().fold(0.0_f32, f32::max);

        if max > 0.0 {
            shifted.mapv(|v| ((v / max) * 255.0) as u8)
        } else {
            shifted.mapv(|_| 0)
        }
    }

    /// Gaussian blur applied to an already-resized mask
    #[must_use]
    pub fn smooth(mask: &GrayImage) -> GrayImage {
        imageops::blur(mask, SMOOTHING_SIGMA)
    }

    fn grid_to_image(grid: &Array2<u8>) -> Result<GrayImage> {
        let (height, width) = grid.dim();
        let data: Vec<u8> = grid.iter().copied().collect();
        GrayImage::from_raw(width as u32, height as u32, data).ok_or_else(|| {
            CutoutError::shape(format!("Mask grid {width}x{height} does not fit an image buffer"))
        })
    }
}
