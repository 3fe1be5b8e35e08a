//! Test-time augmentation variants.
//!
//! Three fixed geometric views of one photo: identity, horizontal mirror and
//! a 90° clockwise rotation. The set is not configurable.

use crate::preprocess::decode::RawImage;
use crate::preprocess::normalize::{resize_fill, tensor_from_rgb, to_rgb, NormalizedTensor};
use crate::utils::error::Result;

/// Number of TTA views per request
pub const VARIANT_COUNT: usize = 3;

/// The geometric transform behind each variant, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Identity,
    HorizontalFlip,
    Rotate90,
}

impl Variant {
    pub const ALL: [Variant; VARIANT_COUNT] =
        [Variant::Identity, Variant::HorizontalFlip, Variant::Rotate90];
}

/// Build the three normalized TTA tensors from image bytes
pub fn generate_variants(image_bytes: &[u8]) -> Result<[NormalizedTensor; VARIANT_COUNT]> {
    let raw = RawImage::decode(image_bytes)?;
    generate_variants_raw(&raw)
}

/// Build the three normalized TTA tensors from a decoded image.
///
/// The identity and flipped views share one resize; the rotated view is
/// rotated first and then resized.
pub fn generate_variants_raw(raw: &RawImage) -> Result<[NormalizedTensor; VARIANT_COUNT]> {
    let base = to_rgb(raw, &resize_fill(raw.image()))?;
    let flipped = image::imageops::flip_horizontal(&base);
    let rotated = to_rgb(raw, &resize_fill(&raw.image().rotate90()))?;

    Ok([
        tensor_from_rgb(&base),
        tensor_from_rgb(&flipped),
        tensor_from_rgb(&rotated),
    ])
}
