//! Core types shared by the processing pipeline

use crate::error::{CutoutError, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Single-channel opacity mask (0 = transparent, 255 = opaque)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Mask data as row-major grayscale values
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a new segmentation mask
    ///
    /// # Errors
    /// - `data.len()` does not equal `width * height`
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(CutoutError::shape(format!(
                "Mask buffer holds {} values but {}x{} needs {}",
                data.len(),
                dimensions.0,
                dimensions.1,
                expected
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: GrayImage) -> Self {
        let dimensions = image.dimensions();
        Self {
            data: image.into_raw(),
            dimensions,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    /// Mask value at a pixel, 0 outside the mask
    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> u8 {
        let index = y as usize * self.dimensions.0 as usize + x as usize;
        self.data.get(index).copied().unwrap_or(0)
    }
}

/// Timing breakdown for one request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Decoding the uploaded bytes
    pub decode_ms: u64,

    /// Resize, normalization and tensor layout
    pub preprocessing_ms: u64,

    /// Model inference
    pub inference_ms: u64,

    /// Mask normalization, resize and smoothing
    pub postprocessing_ms: u64,

    /// Alpha compositing and PNG encoding
    pub encode_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

/// Encoded cutout plus what it took to make it
#[derive(Debug, Clone)]
pub struct CutoutOutput {
    /// PNG bytes with a full 8-bit alpha channel
    pub png: Vec<u8>,

    /// Dimensions of the encoded image (always those of the input)
    pub dimensions: (u32, u32),

    /// Stage timings, when the path records them
    pub timings: Option<ProcessingTimings>,
}

impl CutoutOutput {
    /// MIME type of [`CutoutOutput::png`]
    pub const CONTENT_TYPE: &'static str = "image/png";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_rejects_mismatched_buffer() {
        assert!(SegmentationMask::new(vec![0; 6], (2, 3)).is_ok());
        let err = SegmentationMask::new(vec![0; 5], (2, 3)).unwrap_err();
        assert!(matches!(err, CutoutError::Shape(_)));
    }

    #[test]
    fn test_mask_from_image_keeps_row_major_layout() {
        let image = GrayImage::from_raw(3, 2, vec![0, 10, 20, 30, 40, 50]).unwrap();
        let mask = SegmentationMask::from_image(image);
        assert_eq!(mask.dimensions, (3, 2));
        assert_eq!(mask.value(2, 0), 20);
        assert_eq!(mask.value(0, 1), 30);
        assert_eq!(mask.value(1, 1), 40);
        assert_eq!(mask.value(5, 5), 0);
    }
}
