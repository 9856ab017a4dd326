//! Model catalog for the two segmentation backends
//!
//! Each backend is described by a static [`ModelDescriptor`]: where its weights
//! come from, what they are called on disk, and how an input image must be
//! turned into the tensor the network expects.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Preprocessing parameters for a model input tensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    /// Spatial size of the input tensor as `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after mapping samples to `[0, 1]`
    pub normalization_mean: [f32; 3],
    /// Per-channel divisor applied after the mean shift
    pub normalization_std: [f32; 3],
    /// Resampling filter used to reach `target_size`
    pub filter: FilterType,
}

impl PreprocessingConfig {
    /// Tensor shape (N, C, H, W) produced with this configuration
    #[must_use]
    pub fn tensor_shape(&self) -> (usize, usize, usize, usize) {
        (
            1,
            3,
            self.target_size[1] as usize,
            self.target_size[0] as usize,
        )
    }
}

/// Backends known to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// BRIA RMBG-1.4, run through the in-crate pre/post-processing pipeline
    Precise,
    /// U²-Net, run end-to-end by the fast remover
    Fast,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Precise, ModelKind::Fast];

    #[must_use]
    pub fn descriptor(self) -> &'static ModelDescriptor {
        match self {
            Self::Precise => &RMBG_V1_4,
            Self::Fast => &U2NET,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Precise => "precise",
            Self::Fast => "fast",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static facts about a model file
#[derive(Debug)]
pub struct ModelDescriptor {
    /// Human readable name used in logs
    pub name: &'static str,
    /// File name inside the model directory
    pub file_name: &'static str,
    /// Default remote location of the weights
    pub url: &'static str,
    /// Input tensor preprocessing
    pub preprocessing: PreprocessingConfig,
}

static RMBG_V1_4: ModelDescriptor = ModelDescriptor {
    name: "briaai/RMBG-1.4",
    file_name: "rmbg-v1.4.onnx",
    url: "https://huggingface.co/briaai/RMBG-1.4/resolve/main/onnx/model.onnx",
    preprocessing: PreprocessingConfig {
        target_size: [1024, 1024],
        normalization_mean: [0.5, 0.5, 0.5],
        normalization_std: [1.0, 1.0, 1.0],
        filter: FilterType::Triangle,
    },
};

static U2NET: ModelDescriptor = ModelDescriptor {
    name: "u2net",
    file_name: "u2net.onnx",
    url: "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx",
    preprocessing: PreprocessingConfig {
        target_size: [320, 320],
        normalization_mean: [0.485, 0.456, 0.406],
        normalization_std: [0.229, 0.224, 0.225],
        filter: FilterType::Lanczos3,
    },
};
