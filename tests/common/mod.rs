//! Shared fixtures for integration tests
//!
//! Integration tests cannot see the crate's `cfg(test)` mocks, so this module
//! carries its own disc-shaped inference stub and image helpers.

#![allow(dead_code)]

use cutout::{
    AppContext, CutoutError, FastRemover, InferenceBackend, PreciseProcessor, Result,
    U2NetRemover,
};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use ndarray::{Array4, ArrayD, IxDyn};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Inference stub that returns a soft disc in a fixed output shape
#[derive(Debug, Clone)]
pub struct DiscBackend {
    input_size: usize,
    output_shape: Vec<usize>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl DiscBackend {
    /// RMBG-1.4 shaped stub: 1024x1024 input, `[1, 1, 1024, 1024]` output
    pub fn precise() -> Self {
        Self::new(1024, vec![1, 1, 1024, 1024])
    }

    /// U2Net shaped stub: 320x320 input, `[1, 1, 320, 320]` output
    pub fn fast() -> Self {
        Self::new(320, vec![1, 1, 320, 320])
    }

    pub fn new(input_size: usize, output_shape: Vec<usize>) -> Self {
        Self {
            input_size,
            output_shape,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceBackend for DiscBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CutoutError::inference("stub session failed"));
        }
        if input.dim() != self.input_shape() {
            return Err(CutoutError::inference(format!(
                "unexpected input {:?}",
                input.dim()
            )));
        }

        let rank = self.output_shape.len();
        let height = self.output_shape[rank - 2] as f32;
        let width = self.output_shape[rank - 1] as f32;
        let radius = width.min(height) / 3.0;
        Ok(ArrayD::from_shape_fn(IxDyn(&self.output_shape), |index| {
            let x = index[rank - 1] as f32 - width / 2.0;
            let y = index[rank - 2] as f32 - height / 2.0;
            ((radius - (x * x + y * y).sqrt()) / radius).clamp(0.0, 1.0)
        }))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.input_size, self.input_size)
    }

    fn name(&self) -> &str {
        "disc-stub"
    }
}

/// Context with both pipelines backed by disc stubs
pub fn stub_context(mode_fallback: bool) -> AppContext {
    let precise = Arc::new(PreciseProcessor::new(Arc::new(DiscBackend::precise())));
    let fast: Arc<dyn FastRemover> = Arc::new(U2NetRemover::new(Arc::new(DiscBackend::fast())));
    AppContext::new(Some(precise), Some(fast), mode_fallback).unwrap()
}

/// Context with only the precise pipeline
pub fn precise_only_context() -> AppContext {
    let precise = Arc::new(PreciseProcessor::new(Arc::new(DiscBackend::precise())));
    AppContext::new(Some(precise), None, false).unwrap()
}

pub fn solid_image(width: u32, height: u32, colour: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(colour)))
}

/// Horizontal gradient, useful where a uniform image would hide resampling bugs
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    }))
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    encode(image, ImageFormat::Png)
}

pub fn decode_rgba(bytes: &[u8]) -> image::RgbaImage {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .unwrap()
        .to_rgba8()
}
