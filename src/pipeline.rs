//! Batch orchestration: select one transform and run it over every image.
//!
//! Given decoded images, the requested flags and the user's prior metrics,
//! [`process`] produces:
//!
//! - the processed images (same order, shape and mode as the input),
//! - "before" and "after" histograms for every image,
//! - per-image `(height, width)`,
//! - per-image latency (batch start → that image's transform completion)
//!   and their sum,
//! - the prior metrics with one `record` per image for the selected kind.
//!
//! ## Selection
//!
//! At most one flag is expected, but conflicts are resolved rather than
//! rejected: [`SELECTION_ORDER`] is walked front to back and the first set
//! flag wins. With no flag set, images pass through unchanged and no
//! metrics are recorded.
//!
//! ## Failure
//!
//! All or nothing. Any histogram or transform precondition failure aborts
//! the whole batch; the caller gets no partial output and the prior
//! metrics are dropped untouched.
//!
//! ## Parallel Processing
//!
//! Images are independent, so they are processed in parallel with
//! [rayon](https://docs.rs/rayon). Output order always follows input order.

use crate::imaging::{
    Histogram, Image, InvalidImageError, TransformKind, TransformParams, histogram, transform,
};
use crate::metrics::UserMetrics;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Priority used to resolve conflicting flags: `hist > cont > log > rev > gamma`.
pub const SELECTION_ORDER: [TransformKind; 5] = TransformKind::ALL;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("image {index}: {source}")]
    InvalidImage {
        index: usize,
        #[source]
        source: InvalidImageError,
    },
}

impl PipelineError {
    pub fn index(&self) -> usize {
        match self {
            PipelineError::InvalidImage { index, .. } => *index,
        }
    }
}

/// The five request flags, one per transform kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformFlags {
    pub hist: bool,
    pub cont: bool,
    pub log: bool,
    pub rev: bool,
    pub gamma: bool,
}

impl TransformFlags {
    /// Flags with exactly `kind` set.
    pub fn only(kind: TransformKind) -> Self {
        let mut flags = Self::default();
        flags.set(kind);
        flags
    }

    pub fn set(&mut self, kind: TransformKind) {
        *self.flag_mut(kind) = true;
    }

    pub fn is_set(&self, kind: TransformKind) -> bool {
        match kind {
            TransformKind::HistogramEq => self.hist,
            TransformKind::ContrastStretching => self.cont,
            TransformKind::LogCompression => self.log,
            TransformKind::ReverseVideo => self.rev,
            TransformKind::GammaCorrection => self.gamma,
        }
    }

    fn flag_mut(&mut self, kind: TransformKind) -> &mut bool {
        match kind {
            TransformKind::HistogramEq => &mut self.hist,
            TransformKind::ContrastStretching => &mut self.cont,
            TransformKind::LogCompression => &mut self.log,
            TransformKind::ReverseVideo => &mut self.rev,
            TransformKind::GammaCorrection => &mut self.gamma,
        }
    }

    /// Every set flag, in priority order.
    pub fn requested(&self) -> Vec<TransformKind> {
        SELECTION_ORDER
            .into_iter()
            .filter(|k| self.is_set(*k))
            .collect()
    }

    /// The single transform to run, or `None` for pass-through.
    pub fn select(&self) -> Option<TransformKind> {
        SELECTION_ORDER.into_iter().find(|k| self.is_set(*k))
    }
}

impl From<Option<TransformKind>> for TransformFlags {
    fn from(kind: Option<TransformKind>) -> Self {
        kind.map(Self::only).unwrap_or_default()
    }
}

/// Everything produced for a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    /// Transform applied to every image, `None` for pass-through.
    pub operation: Option<TransformKind>,
    pub images: Vec<Image>,
    pub original_histograms: Vec<Histogram>,
    pub processed_histograms: Vec<Histogram>,
    /// `(height, width)` per image.
    pub sizes: Vec<(u32, u32)>,
    pub latencies: Vec<Duration>,
    pub total_latency: Duration,
}

struct ImageOutcome {
    image: Image,
    original: Histogram,
    processed: Histogram,
    latency: Duration,
}

fn process_image(
    index: usize,
    image: &Image,
    operation: Option<TransformKind>,
    params: &TransformParams,
    started: Instant,
) -> Result<ImageOutcome, PipelineError> {
    let invalid = |source| PipelineError::InvalidImage { index, source };

    let original = histogram::compute(image).map_err(invalid)?;
    let processed_image = match operation {
        Some(kind) => transform::apply(kind, image, params).map_err(invalid)?,
        None => image.clone(),
    };
    let latency = started.elapsed();
    let processed = histogram::compute(&processed_image).map_err(invalid)?;

    Ok(ImageOutcome {
        image: processed_image,
        original,
        processed,
        latency,
    })
}

/// Run the selected transform over a batch and record it into `prior`.
pub fn process(
    images: &[Image],
    flags: &TransformFlags,
    user_key: &str,
    params: &TransformParams,
    prior: UserMetrics,
) -> Result<(ProcessingResult, UserMetrics), PipelineError> {
    let started = Instant::now();
    let operation = flags.select();

    let requested = flags.requested();
    if requested.len() > 1 {
        tracing::warn!(
            user = %user_key,
            ?requested,
            selected = ?operation,
            "Conflicting transform flags, using highest priority"
        );
    }

    let outcomes = images
        .par_iter()
        .enumerate()
        .map(|(index, image)| process_image(index, image, operation, params, started))
        .collect::<Vec<_>>()
        .into_iter()
        // Sequential so the lowest failing index is the one reported.
        .collect::<Result<Vec<_>, _>>()?;

    let mut metrics = prior;
    let mut result = ProcessingResult {
        operation,
        images: Vec::with_capacity(outcomes.len()),
        original_histograms: Vec::with_capacity(outcomes.len()),
        processed_histograms: Vec::with_capacity(outcomes.len()),
        sizes: Vec::with_capacity(outcomes.len()),
        latencies: Vec::with_capacity(outcomes.len()),
        total_latency: Duration::ZERO,
    };

    for outcome in outcomes {
        if let Some(kind) = operation {
            metrics.record(kind, outcome.latency);
        }
        result.sizes.push(outcome.image.size());
        result.images.push(outcome.image);
        result.original_histograms.push(outcome.original);
        result.processed_histograms.push(outcome.processed);
        result.latencies.push(outcome.latency);
        result.total_latency += outcome.latency;
    }

    tracing::debug!(
        user = %user_key,
        images = result.images.len(),
        operation = ?operation,
        total_latency = ?result.total_latency,
        "Processed batch"
    );

    Ok((result, metrics))
}
