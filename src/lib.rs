//! # Image Enhance
//!
//! Batch image enhancement with per-user usage metrics. A request carries a
//! user email, a selection among five enhancement operations, and a batch of
//! base64-encoded images; the response carries the processed images, before
//! and after histograms, per-image dimensions, and timing.
//!
//! # Architecture: Request Flow
//!
//! ```text
//! request JSON ─▶ validate ─▶ decode ─▶ histogram ─▶ transform ─▶ histogram ─▶ encode ─▶ response JSON
//!                                                        │
//!                                                        └─▶ metrics delta ─▶ store.merge(email)
//! ```
//!
//! The core ([`imaging`] and [`pipeline`]) holds no shared state: the
//! pipeline takes the user's metrics as a value and hands back the updated
//! value. The only shared mutable resource is the [`metrics::MetricsStore`],
//! which merges a request's delta atomically per email.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Image entity, codec, histograms and the five transforms |
//! | [`pipeline`] | Transform selection and batch processing |
//! | [`request`] | Typed request/response documents and validation |
//! | [`service`] | End-to-end request handling against a metrics store |
//! | [`metrics`] | Per-user metrics value object and stores |
//! | [`config`] | `config.toml` loading, validation, and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Operation per Batch
//!
//! A batch runs exactly one transform. Requests naming several are rejected
//! by validation; the pipeline itself resolves conflicts by a fixed priority
//! (`hist > cont > log > rev > gamma`) so it never has to fail on them.
//!
//! ## Mode as a Type
//!
//! Grayscale and color are enum variants of [`imaging::Image`], decided once
//! at decode time. Every later stage matches on the variant instead of
//! inspecting array rank.
//!
//! ## All or Nothing
//!
//! Any decode, transform or encode failure aborts the whole request and
//! leaves metrics untouched. There are no partial responses.

pub mod config;
pub mod imaging;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod request;
pub mod service;

#[cfg(test)]
pub(crate) mod test_helpers;
