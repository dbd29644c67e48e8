//! The five enhancement transforms.
//!
//! Each transform is a pure function from [`Image`] to [`Image`] that keeps
//! shape and mode. All five are point operations: they build one 256-entry
//! lookup table per channel (from that channel's statistics where needed)
//! and push every sample through it, so color channels never mix.
//!
//! | Kind | Mapping |
//! |---|---|
//! | [`histogram_eq`] | `round((cdf(v) - cdf_min) * 255 / (N - cdf_min))` |
//! | [`contrast_stretching`] | `round((v - min) * 255 / (max - min))` |
//! | [`log_compression`] | `round(255 * ln(1 + v) / ln(1 + max))` |
//! | [`reverse_video`] | `255 - v` |
//! | [`gamma_correction`] | `round(255 * (v / 255) ^ gamma)` |
//!
//! Degenerate inputs (a constant channel for equalization and stretching, an
//! all-zero channel for log compression) come back unchanged.

use super::histogram::{BINS, channel_counts};
use super::params::{Gamma, TransformParams};
use super::pixels::{Image, InvalidImageError, Lut};
use serde::{Deserialize, Serialize};

/// Which enhancement to run. Serialized with the short request keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransformKind {
    #[serde(rename = "hist")]
    HistogramEq,
    #[serde(rename = "cont")]
    ContrastStretching,
    #[serde(rename = "log")]
    LogCompression,
    #[serde(rename = "rev")]
    ReverseVideo,
    #[serde(rename = "gamma")]
    GammaCorrection,
}

impl TransformKind {
    /// All kinds in selection priority order.
    pub const ALL: [TransformKind; 5] = [
        TransformKind::HistogramEq,
        TransformKind::ContrastStretching,
        TransformKind::LogCompression,
        TransformKind::ReverseVideo,
        TransformKind::GammaCorrection,
    ];

    /// Short key used by requests and metrics records.
    pub fn key(self) -> &'static str {
        match self {
            TransformKind::HistogramEq => "hist",
            TransformKind::ContrastStretching => "cont",
            TransformKind::LogCompression => "log",
            TransformKind::ReverseVideo => "rev",
            TransformKind::GammaCorrection => "gamma",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    /// Human-readable name.
    pub fn label(self) -> &'static str {
        match self {
            TransformKind::HistogramEq => "histogram equalization",
            TransformKind::ContrastStretching => "contrast stretching",
            TransformKind::LogCompression => "log compression",
            TransformKind::ReverseVideo => "reverse video",
            TransformKind::GammaCorrection => "gamma correction",
        }
    }
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Run `kind` on a non-empty image.
pub fn apply(
    kind: TransformKind,
    image: &Image,
    params: &TransformParams,
) -> Result<Image, InvalidImageError> {
    if image.is_empty() {
        return Err(InvalidImageError::Empty);
    }
    Ok(match kind {
        TransformKind::HistogramEq => histogram_eq(image),
        TransformKind::ContrastStretching => contrast_stretching(image),
        TransformKind::LogCompression => log_compression(image),
        TransformKind::ReverseVideo => reverse_video(image),
        TransformKind::GammaCorrection => gamma_correction(image, params.gamma),
    })
}

fn identity_lut() -> Lut {
    std::array::from_fn(|i| i as u8)
}

/// Build one table per channel from that channel's histogram.
fn per_channel(image: &Image, build: impl Fn(&[u64; BINS]) -> Lut) -> Vec<Lut> {
    (0..image.channels())
        .map(|c| build(&channel_counts(image, c)))
        .collect()
}

/// Lowest and highest occupied levels, or `None` for an empty channel.
fn occupied_range(counts: &[u64; BINS]) -> Option<(u8, u8)> {
    let min = counts.iter().position(|&n| n > 0)?;
    let max = counts.iter().rposition(|&n| n > 0)?;
    Some((min as u8, max as u8))
}

fn to_level(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Remap intensities through the channel's cumulative distribution.
pub fn histogram_eq(image: &Image) -> Image {
    let luts = per_channel(image, |counts| {
        let total: u64 = counts.iter().sum();
        let cdf_min = counts.iter().copied().find(|&n| n > 0).unwrap_or(0);
        let span = total - cdf_min;
        if span == 0 {
            return identity_lut();
        }

        let mut lut = [0u8; BINS];
        let mut cdf = 0u64;
        for (level, &n) in counts.iter().enumerate() {
            cdf += n;
            // Levels below the first occupied bin never occur.
            let scaled = cdf.saturating_sub(cdf_min) * 255;
            lut[level] = ((scaled + span / 2) / span).min(255) as u8;
        }
        lut
    });
    image.map_channels(&luts)
}

/// Linearly stretch each channel's `[min, max]` onto `[0, 255]`.
pub fn contrast_stretching(image: &Image) -> Image {
    let luts = per_channel(image, |counts| {
        let Some((min, max)) = occupied_range(counts) else {
            return identity_lut();
        };
        if min == max {
            return identity_lut();
        }
        let range = u32::from(max - min);
        std::array::from_fn(|level| {
            let v = (level as u32).clamp(u32::from(min), u32::from(max)) - u32::from(min);
            ((v * 255 + range / 2) / range) as u8
        })
    });
    image.map_channels(&luts)
}

/// Logarithmic compression scaled so the channel maximum lands on 255.
pub fn log_compression(image: &Image) -> Image {
    let luts = per_channel(image, |counts| {
        let max = match occupied_range(counts) {
            Some((_, max)) if max > 0 => max,
            _ => return identity_lut(),
        };
        let c = 255.0 / (1.0 + f64::from(max)).ln();
        std::array::from_fn(|level| to_level(c * (1.0 + level as f64).ln()))
    });
    image.map_channels(&luts)
}

/// Invert every intensity. Applying it twice returns the input.
pub fn reverse_video(image: &Image) -> Image {
    let lut: Lut = std::array::from_fn(|level| 255 - level as u8);
    image.map_channels(&vec![lut; image.channels()])
}

/// Power-law remapping with the configured exponent.
pub fn gamma_correction(image: &Image, gamma: Gamma) -> Image {
    let g = gamma.value();
    let lut: Lut = std::array::from_fn(|level| to_level(255.0 * (level as f64 / 255.0).powf(g)));
    image.map_channels(&vec![lut; image.channels()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::pixels::Mode;
    use crate::test_helpers::{color_gradient, constant_gray, gray_gradient};

    fn min_max(image: &Image) -> (u8, u8) {
        let raw = image.as_raw();
        (*raw.iter().min().unwrap(), *raw.iter().max().unwrap())
    }

    #[test]
    fn kind_keys_round_trip() {
        for kind in TransformKind::ALL {
            assert_eq!(TransformKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(TransformKind::from_key("blur"), None);
    }

    #[test]
    fn kind_serializes_as_short_key() {
        let json = serde_json::to_string(&TransformKind::ReverseVideo).unwrap();
        assert_eq!(json, "\"rev\"");
    }

    #[test]
    fn contrast_stretching_hits_both_ends() {
        let img = Image::from_shape(&[2, 3], vec![50, 60, 70, 80, 90, 100]).unwrap();
        let out = contrast_stretching(&img);
        assert_eq!(min_max(&out), (0, 255));
        assert_eq!(out.as_raw(), &[0, 51, 102, 153, 204, 255]);
    }

    #[test]
    fn contrast_stretching_constant_is_unchanged() {
        let img = constant_gray(4, 4, 128);
        assert_eq!(contrast_stretching(&img), img);
    }

    #[test]
    fn contrast_stretching_is_per_channel() {
        // Red spans 10..20, green is constant, blue spans 0..255 already.
        let img = Image::from_shape(&[1, 2, 3], vec![10, 7, 0, 20, 7, 255]).unwrap();
        let out = contrast_stretching(&img);
        assert_eq!(out.as_raw(), &[0, 7, 0, 255, 7, 255]);
    }

    #[test]
    fn reverse_video_inverts_and_is_self_inverse() {
        let img = gray_gradient(16, 16);
        let once = reverse_video(&img);
        assert_eq!(once.as_raw()[0], 255 - img.as_raw()[0]);
        assert_eq!(reverse_video(&once), img);

        let color = color_gradient(9, 7);
        assert_eq!(reverse_video(&reverse_video(&color)), color);
    }

    #[test]
    fn reverse_video_of_black_is_white() {
        let out = reverse_video(&constant_gray(4, 4, 0));
        assert!(out.as_raw().iter().all(|&v| v == 255));
        assert_eq!(out.shape(), vec![4, 4]);
    }

    #[test]
    fn histogram_eq_spreads_narrow_range() {
        let img = Image::from_shape(&[2, 2], vec![100, 101, 102, 103]).unwrap();
        let out = histogram_eq(&img);
        assert_eq!(out.as_raw(), &[0, 85, 170, 255]);
    }

    #[test]
    fn histogram_eq_is_monotonic() {
        let img = gray_gradient(32, 8);
        let out = histogram_eq(&img);
        let pairs: Vec<(u8, u8)> = img
            .as_raw()
            .iter()
            .copied()
            .zip(out.as_raw().iter().copied())
            .collect();
        for (a, b) in &pairs {
            for (c, d) in &pairs {
                if a < c {
                    assert!(b <= d, "{a}->{b} vs {c}->{d}");
                }
            }
        }
        assert_eq!(min_max(&out), (0, 255));
    }

    #[test]
    fn histogram_eq_constant_is_unchanged() {
        let img = constant_gray(3, 3, 42);
        assert_eq!(histogram_eq(&img), img);
    }

    #[test]
    fn log_compression_preserves_zero_and_maps_max_to_255() {
        let img = Image::from_shape(&[1, 4], vec![0, 1, 15, 200]).unwrap();
        let out = log_compression(&img);
        let raw = out.as_raw();
        assert_eq!(raw[0], 0);
        assert_eq!(raw[3], 255);
        assert!(raw[1] < raw[2] && raw[2] < raw[3]);
    }

    #[test]
    fn log_compression_all_zero_is_unchanged() {
        let img = constant_gray(2, 5, 0);
        assert_eq!(log_compression(&img), img);
    }

    #[test]
    fn gamma_one_is_identity() {
        let img = color_gradient(8, 8);
        assert_eq!(gamma_correction(&img, Gamma::new(1.0).unwrap()), img);
    }

    #[test]
    fn gamma_keeps_endpoints_and_darkens_midtones() {
        let img = Image::from_shape(&[1, 3], vec![0, 128, 255]).unwrap();
        let out = gamma_correction(&img, Gamma::new(2.0).unwrap());
        // 255 * (128/255)^2 = 64.25
        assert_eq!(out.as_raw(), &[0, 64, 255]);
    }

    #[test]
    fn apply_preserves_shape_and_mode() {
        let color = color_gradient(5, 3);
        let gray = gray_gradient(5, 3);
        for kind in TransformKind::ALL {
            let out = apply(kind, &color, &TransformParams::default()).unwrap();
            assert_eq!(out.shape(), color.shape());
            assert_eq!(out.mode(), Mode::Color);

            let out = apply(kind, &gray, &TransformParams::default()).unwrap();
            assert_eq!(out.shape(), gray.shape());
            assert_eq!(out.mode(), Mode::Grayscale);
        }
    }

    #[test]
    fn apply_rejects_empty_image() {
        let img = Image::from_shape(&[0, 3, 3], Vec::new()).unwrap();
        let result = apply(TransformKind::ReverseVideo, &img, &TransformParams::default());
        assert_eq!(result, Err(InvalidImageError::Empty));
    }
}
