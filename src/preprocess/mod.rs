//! Preprocessing module: everything between raw bytes and model input
//!
//! This module provides:
//! - Decoding with EXIF orientation correction
//! - Fixed-size stretch resize and ImageNet standardization (CHW layout)
//! - The Laplacian-variance sharpness gate
//! - Test-time augmentation variants (identity, mirror, 90° rotation)

pub mod decode;
pub mod normalize;
pub mod sharpness;
pub mod variants;

// Re-export main types for convenience
pub use decode::{apply_orientation, read_exif_orientation, RawImage};
pub use normalize::{
    normalize, normalize_raw, NormalizedTensor, CHANNELS, IMAGENET_MEAN, IMAGENET_STD,
    IMAGE_SIZE, TENSOR_DIMS,
};
pub use sharpness::{assess_blur, laplacian_variance, BlurAssessment, SharpnessGate};
pub use variants::{generate_variants, generate_variants_raw, Variant, VARIANT_COUNT};
