//! Inference backend abstraction

use crate::error::Result;
use ndarray::{Array4, ArrayD};

/// A loaded segmentation network
///
/// Implementations are shared between concurrent requests behind an `Arc`, so
/// `infer` takes `&self`; a backend whose engine needs exclusive access
/// serializes calls internally.
pub trait InferenceBackend: Send + Sync {
    /// Run inference on a `(1, 3, H, W)` input tensor
    ///
    /// The output keeps whatever rank the model was exported with; callers
    /// resolve it through [`crate::postprocessing::RawMaskTensor`].
    ///
    /// # Errors
    /// - Tensor conversion failures
    /// - Model execution failures
    fn infer(&self, input: &Array4<f32>) -> Result<ArrayD<f32>>;

    /// Expected input shape (N, C, H, W)
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Short name used in logs
    fn name(&self) -> &str;
}
