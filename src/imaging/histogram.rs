//! Intensity histograms.
//!
//! Every histogram has the same 256 bin edges (`0..=255`, one per 8-bit
//! level). Grayscale images get one count per bin; color images get an
//! `[r, g, b]` triple per bin, each channel counted independently.
//!
//! Serialized as:
//!
//! ```json
//! { "bins": [0, 1, ..., 255], "counts": [12, 0, ...] }          // grayscale
//! { "bins": [0, 1, ..., 255], "counts": [[3, 0, 9], ...] }      // color
//! ```

use super::pixels::{Image, InvalidImageError, Mode};
use serde::{Deserialize, Serialize};

/// Number of bins for 8-bit data.
pub const BINS: usize = 256;

/// Per-bin counts, shaped by image mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Counts {
    Gray(Vec<u64>),
    Color(Vec<[u64; 3]>),
}

/// Bin edges paired with counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    pub bins: Vec<u8>,
    pub counts: Counts,
}

impl Histogram {
    pub fn mode(&self) -> Mode {
        match self.counts {
            Counts::Gray(_) => Mode::Grayscale,
            Counts::Color(_) => Mode::Color,
        }
    }

    pub fn channels(&self) -> usize {
        self.mode().channels()
    }

    /// Count at `bin` for `channel` (0 for grayscale).
    pub fn count(&self, bin: u8, channel: usize) -> u64 {
        match &self.counts {
            Counts::Gray(c) => c[bin as usize],
            Counts::Color(c) => c[bin as usize][channel],
        }
    }

    /// Sum of counts per channel. Equals the pixel count for every channel.
    pub fn total_per_channel(&self) -> Vec<u64> {
        match &self.counts {
            Counts::Gray(c) => vec![c.iter().sum()],
            Counts::Color(c) => (0..3).map(|ch| c.iter().map(|t| t[ch]).sum()).collect(),
        }
    }
}

/// Count occurrences of each level in one channel.
pub(crate) fn channel_counts(image: &Image, channel: usize) -> [u64; BINS] {
    let mut counts = [0u64; BINS];
    for v in image.channel(channel) {
        counts[v as usize] += 1;
    }
    counts
}

/// Compute the histogram of a non-empty image.
pub fn compute(image: &Image) -> Result<Histogram, InvalidImageError> {
    if image.is_empty() {
        return Err(InvalidImageError::Empty);
    }

    let bins = (0..=255u8).collect();
    let counts = match image.mode() {
        Mode::Grayscale => Counts::Gray(channel_counts(image, 0).to_vec()),
        Mode::Color => {
            let [r, g, b] = [0, 1, 2].map(|c| channel_counts(image, c));
            Counts::Color((0..BINS).map(|i| [r[i], g[i], b[i]]).collect())
        }
    };

    Ok(Histogram { bins, counts })
}
