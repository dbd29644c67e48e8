//! Parameter types for codec and transform operations.
//!
//! These structs describe *how strongly* or *at what quality* an operation
//! runs. They come from configuration, never from the request: a request only
//! picks *which* transform to run.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`Gamma`]: Power-law exponent for gamma correction (default 2.2).
//! - [`TransformParams`]: Everything the transform engine needs beyond the pixels.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Gamma exponent for `out = 255 * (in / 255) ^ gamma`.
///
/// Values above 1.0 darken midtones, values below 1.0 brighten them, 1.0 is
/// the identity. Must be finite and strictly positive; [`Gamma::new`]
/// returns `None` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gamma(f64);

impl Gamma {
    pub const DEFAULT: f64 = 2.2;

    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Gamma {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Configuration-driven knobs for the transform engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransformParams {
    pub gamma: Gamma,
}
