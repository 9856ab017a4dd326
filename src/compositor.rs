//! Mask compositing and lossless encoding

use crate::error::{CutoutError, Result};
use crate::types::SegmentationMask;
use image::{DynamicImage, ImageFormat, Rgba, RgbImage, RgbaImage};
use std::io::Cursor;

/// Attach `mask` as the alpha channel of `image`
///
/// RGB samples are copied unchanged; only alpha comes from the mask.
///
/// # Errors
/// - Image and mask dimensions differ
pub fn composite(image: &RgbImage, mask: &SegmentationMask) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions {
        return Err(CutoutError::shape(format!(
            "Mask is {}x{} but image is {}x{}",
            mask.width(),
            mask.height(),
            image.width(),
            image.height()
        )));
    }

    let mut output = RgbaImage::new(image.width(), image.height());
    for ((rgb, alpha), out) in image
        .pixels()
        .zip(mask.data.iter())
        .zip(output.pixels_mut())
    {
        let [r, g, b] = rgb.0;
        *out = Rgba([r, g, b, *alpha]);
    }

    Ok(output)
}

/// Encode an RGBA image as PNG
///
/// # Errors
/// - PNG encoder failure
pub fn encode_png(image: RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| CutoutError::encode(format!("Failed to encode PNG: {e}")))?;
    Ok(buffer)
}
