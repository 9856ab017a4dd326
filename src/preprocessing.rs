//! Image to input tensor conversion
//!
//! The image is stretched (no letterboxing) to the model's input size, each
//! sample is mapped to `[0, 1]`, shifted by the channel mean, divided by the
//! channel std and laid out as NCHW with a batch axis of one.

use crate::error::{CutoutError, Result};
use crate::models::PreprocessingConfig;
use image::{imageops, DynamicImage, RgbImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Decode uploaded bytes, guessing the format from their content
    ///
    /// # Errors
    /// - Empty input
    /// - Unknown or corrupt image data
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(CutoutError::decode("Uploaded file is empty"));
        }
        image::load_from_memory(bytes)
            .map_err(|e| CutoutError::decode(format!("Cannot decode image: {e}")))
    }

    /// Preprocess a decoded image into a model input tensor
    ///
    /// The output shape is always `(1, 3, target_h, target_w)` whatever the
    /// input size or aspect ratio.
    ///
    /// # Errors
    /// - Image has a zero dimension
    /// - Configuration has a zero target size
    pub fn preprocess(image: &DynamicImage, config: &PreprocessingConfig) -> Result<Array4<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CutoutError::decode(format!(
                "Image has no pixels ({}x{})",
                image.width(),
                image.height()
            )));
        }

        let [target_width, target_height] = config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(CutoutError::invalid_config("Model input size must be non-zero"));
        }

        let rgb = image.to_rgb8();
        let resized = imageops::resize(&rgb, target_width, target_height, config.filter);
        Ok(Self::image_to_tensor(&resized, config))
    }

    /// Convert an already-resized RGB image to a normalized NCHW tensor
    #[must_use]
    pub fn image_to_tensor(image: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = image.dimensions();
        let mean = config.normalization_mean;
        let std = config.normalization_std;

        Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, c, y, x)| {
                let sample = image.get_pixel(x as u32, y as u32)[c];
                (f32::from(sample) / 255.0 - mean[c]) / std[c]
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;
    use image::{ImageBuffer, Rgb};

    fn precise() -> PreprocessingConfig {
        ModelKind::Precise.descriptor().preprocessing
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_output_shape_is_fixed() {
        for (w, h) in [(2, 2), (1, 1000), (1000, 1), (1, 1), (333, 77)] {
            let tensor = ImagePreprocessor::preprocess(&solid(w, h, [10, 20, 30]), &precise()).unwrap();
            assert_eq!(tensor.shape(), &[1, 3, 1024, 1024], "input {w}x{h}");
        }
    }

    #[test]
    fn test_values_span_half_unit_interval() {
        let mut img = RgbImage::new(4, 4);
        img.put_pixel(0, 0, Rgb([0, 128, 255]));
        let tensor = ImagePreprocessor::preprocess(&DynamicImage::ImageRgb8(img), &precise()).unwrap();

        assert!(tensor.iter().all(|v| (-0.5..=0.5).contains(v)));
    }

    #[test]
    fn test_channel_layout_and_normalization() {
        let tensor = ImagePreprocessor::preprocess(&solid(8, 8, [255, 0, 51]), &precise()).unwrap();

        assert!((tensor[[0, 0, 512, 512]] - 0.5).abs() < 1e-6);
        assert!((tensor[[0, 1, 10, 900]] + 0.5).abs() < 1e-6);
        assert!((tensor[[0, 2, 1023, 0]] - (51.0 / 255.0 - 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_alpha_is_dropped() {
        let rgba = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(3, 3, image::Rgba([255, 255, 255, 0])));
        let tensor = ImagePreprocessor::preprocess(&rgba, &precise()).unwrap();
        assert!((tensor[[0, 0, 0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_imagenet_normalization() {
        let config = ModelKind::Fast.descriptor().preprocessing;
        let tensor = ImagePreprocessor::preprocess(&solid(5, 9, [0, 0, 0]), &config).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
        let expected_r = -0.485 / 0.229;
        assert!((tensor[[0, 0, 100, 100]] - expected_r).abs() < 1e-5);
    }

    #[test]
    fn test_decode() {
        let mut png = Vec::new();
        solid(3, 2, [1, 2, 3])
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let decoded = ImagePreprocessor::decode(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));

        assert!(matches!(
            ImagePreprocessor::decode(b"").unwrap_err(),
            CutoutError::Decode(_)
        ));
        assert!(matches!(
            ImagePreprocessor::decode(b"not an image at all").unwrap_err(),
            CutoutError::Decode(_)
        ));
    }

    #[test]
    fn test_rejects_zero_target() {
        let mut config = precise();
        config.target_size = [0, 1024];
        assert!(ImagePreprocessor::preprocess(&solid(2, 2, [0, 0, 0]), &config).is_err());
    }
}
