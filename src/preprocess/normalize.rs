//! Image-to-tensor normalization.
//!
//! Every tensor that reaches the classifier, main path and TTA variants
//! alike, goes through [`tensor_from_rgb`] with the constants below.

use image::{imageops::FilterType, DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::preprocess::decode::RawImage;
use crate::utils::error::{DiagnosisError, Result};

/// Side length of the square model input
pub const IMAGE_SIZE: u32 = 256;

/// Color channels fed to the model
pub const CHANNELS: usize = 3;

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resampling filter used for every fixed-size resize
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Channel-first dims of a model input tensor
pub const TENSOR_DIMS: [usize; 3] = [CHANNELS, IMAGE_SIZE as usize, IMAGE_SIZE as usize];

/// Flattened, channel-major, standardized image tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTensor {
    dims: [usize; 3],
    data: Vec<f32>,
}

impl NormalizedTensor {
    /// Build a tensor from raw CHW data, checking that the length matches `dims`
    pub fn from_raw(dims: [usize; 3], data: Vec<f32>) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if data.len() != expected {
            return Err(DiagnosisError::Inference(format!(
                "tensor data has {} values, dims {:?} need {}",
                data.len(),
                dims,
                expected
            )));
        }
        Ok(Self { dims, data })
    }

    /// [channels, height, width]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Batched NCHW shape with a batch of one
    pub fn batch_shape(&self) -> [usize; 4] {
        [1, self.dims[0], self.dims[1], self.dims[2]]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// Stretch an image to exactly `IMAGE_SIZE` x `IMAGE_SIZE`.
///
/// Aspect ratio is not preserved: the classifier was trained on stretched
/// squares, letterboxing would shift its input distribution.
pub fn resize_fill(image: &DynamicImage) -> DynamicImage {
    image.resize_exact(IMAGE_SIZE, IMAGE_SIZE, RESIZE_FILTER)
}

/// Drop alpha and check that exactly three color channels remain
pub fn to_rgb(raw: &RawImage, image: &DynamicImage) -> Result<RgbImage> {
    let found = raw.color_channels();
    if found != CHANNELS {
        return Err(DiagnosisError::ChannelMismatch {
            expected: CHANNELS,
            found,
        });
    }
    Ok(image.to_rgb8())
}

/// Standardize an RGB image into a CHW tensor
///
/// CHW layout: all R values, then all G values, then all B values
pub fn tensor_from_rgb(rgb: &RgbImage) -> NormalizedTensor {
    let (width, height) = rgb.dimensions();
    let num_pixels = (width * height) as usize;

    let mut normalized = vec![0.0f32; CHANNELS * num_pixels];

    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..CHANNELS {
            normalized[c * num_pixels + i] =
                (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    NormalizedTensor {
        dims: [CHANNELS, height as usize, width as usize],
        data: normalized,
    }
}

/// Decode, orient, stretch, strip alpha and standardize image bytes
pub fn normalize(image_bytes: &[u8]) -> Result<NormalizedTensor> {
    let raw = RawImage::decode(image_bytes)?;
    normalize_raw(&raw)
}

/// Normalize an already-decoded image
pub fn normalize_raw(raw: &RawImage) -> Result<NormalizedTensor> {
    let resized = resize_fill(raw.image());
    let rgb = to_rgb(raw, &resized)?;
    Ok(tensor_from_rgb(&rgb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::decode::test_images::*;
    use image::{GrayImage, Luma, Rgb, RgbaImage, Rgba};

    #[test]
    fn test_shape_is_fixed_for_any_input_size() {
        for (w, h) in [(100, 100), (37, 512), (640, 48), (256, 256), (1, 1)] {
            let tensor = normalize(&png_bytes(&flat(w, h))).unwrap();
            assert_eq!(tensor.dims(), TENSOR_DIMS);
            assert_eq!(tensor.len(), 3 * 256 * 256);
            assert_eq!(tensor.batch_shape(), [1, 3, 256, 256]);
        }
    }

    #[test]
    fn test_channel_major_layout_and_constants() {
        let img = RgbImage::from_pixel(256, 256, Rgb([255, 0, 51]));
        let tensor = tensor_from_rgb(&img);
        let plane = 256 * 256;
        let data = tensor.data();

        let r = (1.0 - 0.485) / 0.229;
        let g = (0.0 - 0.456) / 0.224;
        let b = (0.2 - 0.406) / 0.225;
        assert!((data[0] - r).abs() < 1e-5);
        assert!((data[plane - 1] - r).abs() < 1e-5);
        assert!((data[plane] - g).abs() < 1e-5);
        assert!((data[2 * plane + 17] - b).abs() < 1e-5);
    }

    #[test]
    fn test_alpha_is_dropped() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([10, 20, 30, 255])));
        let tensor = normalize(&png_bytes(&rgba)).unwrap();
        assert_eq!(tensor.dims(), TENSOR_DIMS);
        let expected_r = (10.0 / 255.0 - 0.485) / 0.229;
        assert!((tensor.data()[0] - expected_r).abs() < 1e-5);
    }

    #[test]
    fn test_grayscale_is_a_channel_mismatch() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, Luma([90])));
        let err = normalize(&png_bytes(&gray)).unwrap_err();
        assert!(matches!(
            err,
            DiagnosisError::ChannelMismatch {
                expected: 3,
                found: 1
            }
        ));
    }

    #[test]
    fn test_malformed_bytes() {
        let err = normalize(&[0xff, 0xd8, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, DiagnosisError::Decode(_)));
    }

    #[test]
    fn test_from_raw_validates_length() {
        assert!(NormalizedTensor::from_raw([3, 2, 2], vec![0.0; 12]).is_ok());
        assert!(NormalizedTensor::from_raw([3, 2, 2], vec![0.0; 11]).is_err());
    }
}
