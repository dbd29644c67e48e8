//! Wire codec: base64 text ⇄ [`Image`].
//!
//! ## Decoding
//!
//! | Step | Crate / function |
//! |---|---|
//! | base64 → bytes | `base64::engine::general_purpose::STANDARD` |
//! | sniff + decode (JPEG, PNG, TIFF, WebP, BMP, GIF) | `image::load_from_memory` |
//! | mode normalization | [`Image::from_dynamic`] |
//!
//! ## Encoding
//!
//! The encoder is picked from [`OutputFormat`] and the color type from the
//! image's mode tag (`L8` or `Rgb8`). PNG and TIFF round-trip bit-exact;
//! JPEG only preserves shape and mode.

use super::params::Quality;
use super::pixels::{Image, Mode};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload {index} is not valid base64: {source}")]
    Base64 {
        index: usize,
        #[source]
        source: base64::DecodeError,
    },
    #[error("payload {index} is not a readable image: {source}")]
    Image {
        index: usize,
        #[source]
        source: image::ImageError,
    },
}

impl DecodeError {
    /// Position of the offending payload in the batch.
    pub fn index(&self) -> usize {
        match self {
            DecodeError::Base64 { index, .. } | DecodeError::Image { index, .. } => *index,
        }
    }
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("cannot encode an empty {mode} image ({height}x{width})")]
    EmptyImage { mode: Mode, height: u32, width: u32 },
    #[error("{format} encoder failed: {source}")]
    Encoder {
        format: OutputFormat,
        #[source]
        source: image::ImageError,
    },
}

/// Target container format for processed images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    #[serde(alias = "tif")]
    Tiff,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Tiff => "tiff",
        }
    }

    /// Whether `decode(encode(x)) == x` holds pixel for pixel.
    pub fn is_lossless(self) -> bool {
        !matches!(self, OutputFormat::Jpeg)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Jpeg => f.write_str("jpeg"),
            OutputFormat::Png => f.write_str("png"),
            OutputFormat::Tiff => f.write_str("tiff"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "tiff" | "tif" => Ok(OutputFormat::Tiff),
            other => Err(format!(
                "unknown output format '{other}' (expected jpeg, png or tiff)"
            )),
        }
    }
}

/// Decode one base64 payload. `index` is only used for error context.
pub fn decode_one(index: usize, payload: &str) -> Result<Image, DecodeError> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|source| DecodeError::Base64 { index, source })?;
    let decoded =
        image::load_from_memory(&bytes).map_err(|source| DecodeError::Image { index, source })?;
    Ok(Image::from_dynamic(decoded))
}

/// Decode a whole batch. Stops at the first bad payload.
pub fn decode<S: AsRef<str>>(payloads: &[S]) -> Result<Vec<Image>, DecodeError> {
    payloads
        .iter()
        .enumerate()
        .map(|(index, payload)| decode_one(index, payload.as_ref()))
        .collect()
}

/// Encode an image to raw container bytes (no base64).
pub fn encode_bytes(
    image: &Image,
    format: OutputFormat,
    quality: Quality,
) -> Result<Vec<u8>, EncodeError> {
    if image.is_empty() {
        return Err(EncodeError::EmptyImage {
            mode: image.mode(),
            height: image.height(),
            width: image.width(),
        });
    }

    let color_type = match image.mode() {
        Mode::Grayscale => ExtendedColorType::L8,
        Mode::Color => ExtendedColorType::Rgb8,
    };
    let (width, height) = (image.width(), image.height());
    let raw = image.as_raw();

    let mut out = Vec::new();
    let written = match format {
        OutputFormat::Jpeg => JpegEncoder::new_with_quality(&mut out, quality.value())
            .write_image(raw, width, height, color_type),
        OutputFormat::Png => PngEncoder::new(&mut out).write_image(raw, width, height, color_type),
        OutputFormat::Tiff => {
            TiffEncoder::new(Cursor::new(&mut out)).write_image(raw, width, height, color_type)
        }
    };
    written.map_err(|source| EncodeError::Encoder { format, source })?;
    Ok(out)
}

/// Encode one image to base64 text.
pub fn encode_one(
    image: &Image,
    format: OutputFormat,
    quality: Quality,
) -> Result<String, EncodeError> {
    encode_bytes(image, format, quality).map(|bytes| STANDARD.encode(bytes))
}

/// Encode a batch. Stops at the first failure, returning its index.
pub fn encode(
    images: &[Image],
    format: OutputFormat,
    quality: Quality,
) -> Result<Vec<String>, (usize, EncodeError)> {
    images
        .iter()
        .enumerate()
        .map(|(i, img)| encode_one(img, format, quality).map_err(|e| (i, e)))
        .collect()
}

/// Base64 text for raw bytes read from disk or elsewhere.
pub fn wrap_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Raw container bytes from base64 text.
pub fn unwrap_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(payload.trim())
}
