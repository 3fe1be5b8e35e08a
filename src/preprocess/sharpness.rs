//! Sharpness gate: variance of the Laplacian.
//!
//! Runs before any model work. An out-of-focus photo has little
//! high-frequency energy, so the 4-neighbour Laplacian response is nearly
//! constant and its variance is small.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::preprocess::decode::RawImage;
use crate::preprocess::normalize::resize_fill;
use crate::utils::error::Result;
use crate::utils::round2;

/// Default decision threshold on the Laplacian variance
pub const DEFAULT_BLUR_THRESHOLD: f64 = 100.0;

/// Outcome of the focus check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlurAssessment {
    pub is_blurry: bool,
    /// Laplacian variance, rounded to two decimals
    pub variance_score: f64,
    pub threshold: f64,
}

/// Laplacian-variance blur detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharpnessGate {
    threshold: f64,
}

impl Default for SharpnessGate {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_THRESHOLD)
    }
}

impl SharpnessGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decode the bytes independently and assess focus quality
    pub fn assess_bytes(&self, image_bytes: &[u8]) -> Result<BlurAssessment> {
        let raw = RawImage::decode(image_bytes)?;
        Ok(self.assess(&raw))
    }

    /// Assess an already-decoded image at the fixed working size
    pub fn assess(&self, raw: &RawImage) -> BlurAssessment {
        let gray = resize_fill(raw.image()).to_luma8();
        let variance = laplacian_variance(&gray);

        BlurAssessment {
            is_blurry: variance < self.threshold,
            variance_score: round2(variance),
            threshold: self.threshold,
        }
    }
}

/// Assess blur with the default threshold
pub fn assess_blur(image_bytes: &[u8]) -> Result<BlurAssessment> {
    SharpnessGate::default().assess_bytes(image_bytes)
}

/// Population variance of the 4-neighbour Laplacian over interior pixels.
///
/// Kernel `[0 1 0; 1 -4 1; 0 1 0]`. The outermost ring is skipped, not
/// padded. Images smaller than 3x3 have no interior and score 0.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let (w, h) = (w as usize, h as usize);
    let px = gray.as_raw();
    let at = |x: usize, y: usize| px[y * w + x] as i32;

    let mut response = Vec::with_capacity((w - 2) * (h - 2));
    let mut sum = 0.0f64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let val = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4 * at(x, y);
            response.push(val as f64);
            sum += val as f64;
        }
    }

    let n = response.len() as f64;
    let mean = sum / n;
    response.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::decode::test_images::*;
    use image::Luma;

    #[test]
    fn test_flat_image_is_blurry() {
        let assessment = assess_blur(&png_bytes(&flat(300, 200))).unwrap();
        assert!(assessment.is_blurry);
        assert_eq!(assessment.variance_score, 0.0);
        assert_eq!(assessment.threshold, 100.0);
    }

    #[test]
    fn test_checkerboard_is_sharp() {
        let assessment = assess_blur(&png_bytes(&checkerboard(256, 4))).unwrap();
        assert!(!assessment.is_blurry);
        assert!(assessment.variance_score > 100.0);
    }

    #[test]
    fn test_edge_ring_is_excluded() {
        let img = GrayImage::from_fn(10, 10, |x, y| {
            if x == 0 || y == 0 || x == 9 || y == 9 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        // Interior pixels next to the border still see it
        assert!(laplacian_variance(&img) > 0.0);

        let interior_only = GrayImage::from_pixel(10, 10, Luma([42]));
        assert_eq!(laplacian_variance(&interior_only), 0.0);
    }

    #[test]
    fn test_single_spike_variance() {
        // 3x3 image: only the centre pixel is interior
        let mut img = GrayImage::from_pixel(3, 3, Luma([0]));
        img.put_pixel(1, 1, Luma([10]));
        // One response value, so its variance is zero
        assert_eq!(laplacian_variance(&img), 0.0);

        // 4x3 image: two interior pixels with responses -40 and +10
        let mut img = GrayImage::from_pixel(4, 3, Luma([0]));
        img.put_pixel(1, 1, Luma([10]));
        let v = laplacian_variance(&img);
        assert!((v - 625.0).abs() < 1e-9);
    }

    #[test]
    fn test_tiny_image_has_no_interior() {
        let img = GrayImage::from_pixel(2, 2, Luma([9]));
        assert_eq!(laplacian_variance(&img), 0.0);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let bytes = png_bytes(&checkerboard(256, 4));
        let strict = SharpnessGate::new(1.0e9);
        assert!(strict.assess_bytes(&bytes).unwrap().is_blurry);
    }
}
