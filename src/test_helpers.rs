//! Shared test utilities.
//!
//! Synthetic image fixtures with known shape and content, plus helpers that
//! turn them into wire payloads.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let img = gray_gradient(8, 4);          // 8 wide, 4 high, 0..=255 ramp
//! let payload = png_payload(&img);       // base64 PNG, decodes bit-exact
//! ```

use crate::imaging::{Image, OutputFormat, Quality, codec};

// =========================================================================
// Image fixtures
// =========================================================================

/// Grayscale ramp over the pixels in row-major order, from 0 to 255.
///
/// Any image with at least two pixels has at least two distinct levels.
pub fn gray_gradient(width: usize, height: usize) -> Image {
    let n = width * height;
    let last = n.saturating_sub(1).max(1);
    let data = (0..n).map(|i| (i * 255 / last) as u8).collect();
    Image::from_shape(&[height, width], data).unwrap()
}

/// Color image with red ramping across, green ramping down, and blue
/// ramping the other way across.
pub fn color_gradient(width: usize, height: usize) -> Image {
    let wx = width.saturating_sub(1).max(1);
    let hy = height.saturating_sub(1).max(1);
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 255 / wx) as u8);
            data.push((y * 255 / hy) as u8);
            data.push(255 - (x * 255 / wx) as u8 / 2);
        }
    }
    Image::from_shape(&[height, width, 3], data).unwrap()
}

/// Grayscale image where every pixel is `value`.
pub fn constant_gray(width: usize, height: usize, value: u8) -> Image {
    Image::from_shape(&[height, width], vec![value; width * height]).unwrap()
}

// =========================================================================
// Payloads
// =========================================================================

/// Base64 PNG of `image`.
pub fn png_payload(image: &Image) -> String {
    codec::encode_one(image, OutputFormat::Png, Quality::default()).unwrap()
}

/// Base64 JPEG of `image` at default quality.
pub fn jpeg_payload(image: &Image) -> String {
    codec::encode_one(image, OutputFormat::Jpeg, Quality::default()).unwrap()
}
