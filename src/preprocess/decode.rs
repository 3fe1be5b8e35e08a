//! Image decoding with EXIF orientation correction.
//!
//! Phone photos usually store pixels in sensor order and record the visual
//! rotation in EXIF tag 0x0112. Both the sharpness gate and the normalizer
//! must see the image the way the user saw it, so orientation is applied
//! immediately after decoding.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView};

use crate::utils::error::{DiagnosisError, Result};

/// A decoded, orientation-corrected raster image owned by one request
#[derive(Debug, Clone)]
pub struct RawImage {
    image: DynamicImage,
    /// Channel count as decoded, alpha included
    channels: usize,
    has_alpha: bool,
}

impl RawImage {
    /// Decode JPEG/PNG/WebP (or any format `image` recognises) from memory
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(DiagnosisError::Decode("empty image buffer".to_string()));
        }

        let image = image::load_from_memory(bytes)?;
        let color = image.color();
        let orientation = read_exif_orientation(bytes);
        if orientation != 1 {
            tracing::debug!(orientation, "applying EXIF orientation");
        }

        Ok(Self {
            image: apply_orientation(image, orientation),
            channels: color.channel_count() as usize,
            has_alpha: color.has_alpha(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Channel count as decoded, alpha included
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Channel count once any alpha channel is dropped
    pub fn color_channels(&self) -> usize {
        if self.has_alpha {
            self.channels - 1
        } else {
            self.channels
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Read the EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if there is no EXIF block or no orientation tag.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation value so pixel data matches visual orientation
///
/// 1 = normal, 2 = mirrored, 3 = 180°, 4 = flipped vertically,
/// 5 = mirrored + 90° CW, 6 = 90° CW, 7 = mirrored + 270° CW, 8 = 270° CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    /// Encode an image as PNG bytes
    pub fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encoding");
        buf
    }

    /// Encode an image as JPEG bytes carrying an EXIF orientation tag
    pub fn jpeg_with_orientation(img: &DynamicImage, orientation: u16) -> Vec<u8> {
        let mut jpeg = Vec::new();
        img.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .expect("jpeg encoding");

        // Little-endian TIFF header, one IFD holding a single SHORT entry
        let mut tiff = vec![0x49, 0x49, 0x2a, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00];
        tiff.extend_from_slice(&[0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00]);
        tiff.extend_from_slice(&orientation.to_le_bytes());
        tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(&tiff);
        let segment_len = (payload.len() + 2) as u16;

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xff, 0xe1]);
        out.extend_from_slice(&segment_len.to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    /// Left half red, right half blue
    pub fn red_left_blue_right(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([230, 20, 20])
            } else {
                Rgb([20, 20, 230])
            }
        }))
    }

    /// Uniform gray image, no local contrast anywhere
    pub fn flat(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])))
    }

    /// Black/white checkerboard with square cells of `cell` pixels
    pub fn checkerboard(size: u32, cell: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }
}
