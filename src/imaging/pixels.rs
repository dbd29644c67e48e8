//! The in-memory image entity.
//!
//! An [`Image`] is an 8-bit pixel array with either shape `(H, W)`
//! (grayscale) or `(H, W, 3)` (color). The mode is the enum variant itself,
//! decided once when the image is built (at decode time, or by
//! [`Image::from_shape`]) and never re-inferred from array rank afterwards.
//!
//! Both variants wrap `image` crate buffers so the codec can hand them to
//! encoders without copying.

use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lookup table mapping each 8-bit input intensity to an output intensity.
pub type Lut = [u8; 256];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidImageError {
    #[error("image has no pixels")]
    Empty,
    #[error("unsupported shape {shape:?}: expected (height, width) or (height, width, 3)")]
    Shape { shape: Vec<usize> },
    #[error("pixel data length {actual} does not match shape {shape:?} (expected {expected})")]
    DataLength {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// Grayscale or color, derived once from the decoded pixel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Grayscale,
    Color,
}

impl Mode {
    /// Number of intensity channels per pixel.
    pub fn channels(self) -> usize {
        match self {
            Mode::Grayscale => 1,
            Mode::Color => 3,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Grayscale => f.write_str("grayscale"),
            Mode::Color => f.write_str("color"),
        }
    }
}

/// An immutable 8-bit image tagged with its mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Image {
    Gray(GrayImage),
    Color(RgbImage),
}

impl Image {
    /// Build an image from a row-major array and its shape.
    ///
    /// Accepts `[height, width]` (grayscale) or `[height, width, 3]` (color).
    pub fn from_shape(shape: &[usize], data: Vec<u8>) -> Result<Self, InvalidImageError> {
        let (height, width, mode) = match *shape {
            [h, w] => (h, w, Mode::Grayscale),
            [h, w, 3] => (h, w, Mode::Color),
            _ => {
                return Err(InvalidImageError::Shape {
                    shape: shape.to_vec(),
                });
            }
        };
        let (Ok(h32), Ok(w32)) = (u32::try_from(height), u32::try_from(width)) else {
            return Err(InvalidImageError::Shape {
                shape: shape.to_vec(),
            });
        };

        let expected = height
            .checked_mul(width)
            .and_then(|n| n.checked_mul(mode.channels()))
            .ok_or_else(|| InvalidImageError::Shape {
                shape: shape.to_vec(),
            })?;
        if data.len() != expected {
            return Err(InvalidImageError::DataLength {
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            });
        }

        // Lengths were checked above, so from_raw cannot reject the buffer.
        let image = match mode {
            Mode::Grayscale => GrayImage::from_raw(w32, h32, data).map(Image::Gray),
            Mode::Color => RgbImage::from_raw(w32, h32, data).map(Image::Color),
        };
        image.ok_or(InvalidImageError::DataLength {
            shape: shape.to_vec(),
            expected,
            actual: expected,
        })
    }

    /// Normalize a decoded image to one of the two supported modes.
    ///
    /// Luma (with or without alpha, any bit depth) becomes 8-bit grayscale.
    /// Everything else becomes 8-bit RGB with alpha dropped.
    pub fn from_dynamic(decoded: DynamicImage) -> Self {
        match decoded {
            DynamicImage::ImageLuma8(buf) => Image::Gray(buf),
            DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_) => Image::Gray(decoded.to_luma8()),
            DynamicImage::ImageRgb8(buf) => Image::Color(buf),
            other => Image::Color(other.to_rgb8()),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Image::Gray(_) => Mode::Grayscale,
            Image::Color(_) => Mode::Color,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Image::Gray(buf) => buf.width(),
            Image::Color(buf) => buf.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Image::Gray(buf) => buf.height(),
            Image::Color(buf) => buf.height(),
        }
    }

    /// Pixel dimensions as `(height, width)`, matching array shape order.
    pub fn size(&self) -> (u32, u32) {
        (self.height(), self.width())
    }

    /// Array shape: `[h, w]` for grayscale, `[h, w, 3]` for color.
    pub fn shape(&self) -> Vec<usize> {
        let (h, w) = (self.height() as usize, self.width() as usize);
        match self.mode() {
            Mode::Grayscale => vec![h, w],
            Mode::Color => vec![h, w, 3],
        }
    }

    pub fn channels(&self) -> usize {
        self.mode().channels()
    }

    pub fn pixel_count(&self) -> usize {
        self.height() as usize * self.width() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    /// Row-major interleaved samples.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Image::Gray(buf) => buf.as_raw(),
            Image::Color(buf) => buf.as_raw(),
        }
    }

    /// Samples of a single channel in row-major order.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = u8> + '_ {
        self.as_raw()
            .iter()
            .skip(channel)
            .step_by(self.channels())
            .copied()
    }

    /// Apply one lookup table per channel. `luts.len()` must equal
    /// [`channels`](Self::channels).
    pub(crate) fn map_channels(&self, luts: &[Lut]) -> Image {
        debug_assert_eq!(luts.len(), self.channels());
        match self {
            Image::Gray(buf) => {
                let lut = &luts[0];
                let mut out = buf.clone();
                out.iter_mut().for_each(|v| *v = lut[*v as usize]);
                Image::Gray(out)
            }
            Image::Color(buf) => {
                let mut out = buf.clone();
                out.chunks_exact_mut(3).for_each(|px| {
                    for (c, v) in px.iter_mut().enumerate() {
                        *v = luts[c][*v as usize];
                    }
                });
                Image::Color(out)
            }
        }
    }
}
