//! Image processing: pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `base64` + `image::load_from_memory` |
//! | **Encode** | `image` JPEG / PNG / TIFF encoders + `base64` |
//! | **Histogram** | 256-bin counting per channel |
//! | **Transforms** | per-channel 256-entry lookup tables |
//!
//! The module is split into:
//! - **Pixels**: the [`Image`] entity and its [`Mode`] tag
//! - **Parameters**: configuration-driven knobs ([`Quality`], [`Gamma`])
//! - **Codec**: wire payloads ⇄ [`Image`]
//! - **Histogram**: intensity distributions
//! - **Transform**: the five enhancement operations

pub mod codec;
pub mod histogram;
mod params;
pub mod pixels;
pub mod transform;

pub use codec::{DecodeError, EncodeError, OutputFormat};
pub use histogram::{Counts, Histogram};
pub use params::{Gamma, Quality, TransformParams};
pub use pixels::{Image, InvalidImageError, Mode};
pub use transform::TransformKind;
