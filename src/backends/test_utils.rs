//! Mock backends for testing the pipeline without model files

use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use ndarray::{Array4, ArrayD, IxDyn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What the mock writes into its output grid
#[derive(Debug, Clone, Copy)]
pub enum MockPattern {
    /// Soft-edged disc centred in the grid
    Disc,
    /// Every value the same
    Constant(f32),
}

/// Mock inference backend with configurable output shape
#[derive(Debug, Clone)]
pub struct MockBackend {
    input_shape: (usize, usize, usize, usize),
    output_shape: Vec<usize>,
    pattern: MockPattern,
    should_fail_inference: bool,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Backend with the given output shape and a 1024x1024 input
    #[must_use]
    pub fn with_output_shape(output_shape: Vec<usize>) -> Self {
        Self {
            input_shape: (1, 3, 1024, 1024),
            output_shape,
            pattern: MockPattern::Disc,
            should_fail_inference: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn four_axis(height: usize, width: usize) -> Self {
        Self::with_output_shape(vec![1, 1, height, width])
    }

    #[must_use]
    pub fn three_axis(height: usize, width: usize) -> Self {
        Self::with_output_shape(vec![1, height, width])
    }

    #[must_use]
    pub fn with_input_size(mut self, height: usize, width: usize) -> Self {
        self.input_shape = (1, 3, height, width);
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: MockPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.should_fail_inference = true;
        self
    }

    /// Number of `infer` calls so far, across clones
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn generate_output(&self) -> ArrayD<f32> {
        let shape = &self.output_shape;
        let rank = shape.len();
        let height = if rank >= 2 { shape[rank - 2] } else { 1 };
        let width = shape.last().copied().unwrap_or(1);

        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(1.0);
        let pattern = self.pattern;

        ArrayD::from_shape_fn(IxDyn(shape), |index| match pattern {
            MockPattern::Constant(value) => value,
            MockPattern::Disc => {
                let x = (if rank >= 1 { index[rank - 1] } else { 0 }) as f32;
                let y = (if rank >= 2 { index[rank - 2] } else { 0 }) as f32;
                let distance = ((x - center_x).powi(2) + (y - center_y).powi(2)).sqrt();
                ((radius - distance) / radius).clamp(0.0, 1.0)
            },
        })
    }
}

impl InferenceBackend for MockBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.should_fail_inference {
            return Err(CutoutError::inference("Mock backend inference failed"));
        }

        if input.dim() != self.input_shape {
            return Err(CutoutError::inference(format!(
                "Mock backend expected input {:?}, got {:?}",
                self.input_shape,
                input.dim()
            )));
        }

        Ok(self.generate_output())
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.input_shape
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_output_shapes() {
        let input = Array4::zeros((1, 3, 1024, 1024));
        for shape in [vec![1, 1, 16, 8], vec![1, 16, 8], vec![16, 8], vec![1, 1, 1, 16, 8]] {
            let out = MockBackend::with_output_shape(shape.clone()).infer(&input).unwrap();
            assert_eq!(out.shape(), shape.as_slice());
        }
    }

    #[test]
    fn test_mock_failure_and_call_count() {
        let backend = MockBackend::four_axis(4, 4).failing();
        let clone = backend.clone();
        let input = Array4::zeros((1, 3, 1024, 1024));

        assert!(matches!(clone.infer(&input), Err(CutoutError::Inference(_))));
        assert_eq!(backend.call_count(), 1);
    }

    #[test]
    fn test_mock_rejects_wrong_input() {
        let backend = MockBackend::four_axis(4, 4).with_input_size(320, 320);
        assert!(backend.infer(&Array4::zeros((1, 3, 1024, 1024))).is_err());
        assert!(backend.infer(&Array4::zeros((1, 3, 320, 320))).is_ok());
    }

    #[test]
    fn test_disc_pattern_is_not_constant() {
        let out = MockBackend::four_axis(32, 32)
            .infer(&Array4::zeros((1, 3, 1024, 1024)))
            .unwrap();
        assert!(out[[0, 0, 16, 16]] > 0.9);
        assert_eq!(out[[0, 0, 0, 0]], 0.0);
    }
}
