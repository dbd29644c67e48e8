//! Request handling: validate, decode, process, encode, record metrics.
//!
//! [`EnhanceService`] is what a router (or the CLI) calls. It owns the
//! service configuration and a [`MetricsStore`], and turns a
//! [`ProcessRequest`] into a [`ProcessResponse`]:
//!
//! 1. stamp the upload time (UTC, RFC 3339)
//! 2. validate the request
//! 3. decode every payload
//! 4. run the pipeline against an empty metrics record, which yields the
//!    delta for this request
//! 5. encode every processed image
//! 6. merge the delta into the store under the user's email
//!
//! A failure at any step aborts the request. Since the store is only touched
//! in the last step, a failed request never changes anyone's metrics.

use crate::config::AppConfig;
use crate::imaging::{
    DecodeError, EncodeError, OutputFormat, Quality, TransformParams, codec,
};
use crate::metrics::{MetricsStore, StoreError, UserMetrics};
use crate::pipeline::{self, PipelineError, TransformFlags};
use crate::request::{ProcessRequest, ProcessResponse, ValidationError, parse_request};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error category, stable across error message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Decode,
    Encode,
    InvalidImage,
    Store,
}

#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("invalid request: {source}")]
    Validation {
        user: Option<String>,
        #[source]
        source: ValidationError,
    },
    #[error("{user}: {source}")]
    Decode {
        user: String,
        #[source]
        source: DecodeError,
    },
    #[error("{user}: image {index}: {source}")]
    Encode {
        user: String,
        index: usize,
        #[source]
        source: EncodeError,
    },
    #[error("{user}: {source}")]
    InvalidImage {
        user: String,
        #[source]
        source: PipelineError,
    },
    #[error("{user}: metrics store: {source}")]
    Store {
        user: String,
        #[source]
        source: StoreError,
    },
}

impl EnhanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnhanceError::Validation { .. } => ErrorKind::Validation,
            EnhanceError::Decode { .. } => ErrorKind::Decode,
            EnhanceError::Encode { .. } => ErrorKind::Encode,
            EnhanceError::InvalidImage { .. } => ErrorKind::InvalidImage,
            EnhanceError::Store { .. } => ErrorKind::Store,
        }
    }

    /// Email of the requesting user, when the request got far enough to have one.
    pub fn user(&self) -> Option<&str> {
        match self {
            EnhanceError::Validation { user, .. } => user.as_deref(),
            EnhanceError::Decode { user, .. }
            | EnhanceError::Encode { user, .. }
            | EnhanceError::InvalidImage { user, .. }
            | EnhanceError::Store { user, .. } => Some(user),
        }
    }

    /// Position in the batch of the image that failed.
    pub fn index(&self) -> Option<usize> {
        match self {
            EnhanceError::Decode { source, .. } => Some(source.index()),
            EnhanceError::Encode { index, .. } => Some(*index),
            EnhanceError::InvalidImage { source, .. } => Some(source.index()),
            EnhanceError::Validation { .. } | EnhanceError::Store { .. } => None,
        }
    }

    /// HTTP-equivalent status: caller mistakes are 400, store failures 500.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Store => 500,
            _ => 400,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            status: self.status_code(),
            kind: self.kind(),
            error: self.to_string(),
            index: self.index(),
        }
    }
}

/// Caller-facing error document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub kind: ErrorKind,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

/// The parts of [`AppConfig`] request handling needs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ServiceConfig {
    pub params: TransformParams,
    /// Used when a request does not name a format.
    pub format: OutputFormat,
    pub quality: Quality,
    /// Reject requests with no transform flag instead of passing images through.
    pub require_selection: bool,
}

impl ServiceConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            params: config.transform_params(),
            format: config.output.format,
            quality: config.quality(),
            require_selection: config.transforms.require_selection,
        }
    }
}

pub struct EnhanceService<S: MetricsStore> {
    config: ServiceConfig,
    store: S,
}

impl<S: MetricsStore> EnhanceService<S> {
    pub fn new(config: ServiceConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process one request end to end.
    pub fn handle(&self, request: &ProcessRequest) -> Result<ProcessResponse, EnhanceError> {
        let upload_timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let user = request.email.as_str();

        let selected = request
            .validate(self.config.require_selection)
            .map_err(|source| EnhanceError::Validation {
                user: Some(user.to_string()),
                source,
            })?;

        let images = codec::decode(&request.images).map_err(|source| EnhanceError::Decode {
            user: user.to_string(),
            source,
        })?;

        let (result, delta) = pipeline::process(
            &images,
            &TransformFlags::from(selected),
            user,
            &self.config.params,
            UserMetrics::default(),
        )
        .map_err(|source| EnhanceError::InvalidImage {
            user: user.to_string(),
            source,
        })?;

        let format = request.format.unwrap_or(self.config.format);
        let processed_images = codec::encode(&result.images, format, self.config.quality)
            .map_err(|(index, source)| EnhanceError::Encode {
                user: user.to_string(),
                index,
                source,
            })?;

        if !delta.is_empty() {
            self.store
                .merge(user, &delta)
                .map_err(|source| EnhanceError::Store {
                    user: user.to_string(),
                    source,
                })?;
        }

        tracing::info!(
            user = %user,
            images = processed_images.len(),
            operation = result.operation.map(|k| k.key()).unwrap_or("none"),
            %format,
            latency = ?result.total_latency,
            "Processed request"
        );

        Ok(ProcessResponse {
            processed_images,
            histograms_original: result.original_histograms,
            histograms_processed: result.processed_histograms,
            upload_timestamp,
            latency_seconds: result.total_latency.as_secs_f64(),
            image_sizes: result.sizes.iter().map(|&(h, w)| [h, w]).collect(),
            operation: result.operation,
            format,
        })
    }

    /// Parse a JSON request document and process it.
    pub fn handle_json(&self, body: &str) -> Result<ProcessResponse, EnhanceError> {
        let request = parse_request(body)
            .map_err(|source| EnhanceError::Validation { user: None, source })?;
        self.handle(&request)
    }

    /// Status code and JSON body for a request document, success or not.
    pub fn respond_json(&self, body: &str) -> Result<(u16, String), serde_json::Error> {
        match self.handle_json(body) {
            Ok(response) => Ok((200, serde_json::to_string(&response)?)),
            Err(e) => {
                tracing::warn!(
                    user = e.user().unwrap_or("-"),
                    kind = ?e.kind(),
                    "Request failed: {e}"
                );
                Ok((e.status_code(), serde_json::to_string(&e.to_body())?))
            }
        }
    }

    /// Stored metrics for `email`.
    pub fn metrics(&self, email: &str) -> Result<UserMetrics, StoreError> {
        self.store.snapshot(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{Image, Mode, TransformKind};
    use crate::metrics::InMemoryMetricsStore;
    use crate::test_helpers::{
        color_gradient, constant_gray, gray_gradient, jpeg_payload, png_payload,
    };

    fn service() -> EnhanceService<InMemoryMetricsStore> {
        EnhanceService::new(ServiceConfig::default(), InMemoryMetricsStore::new())
    }

    fn request(kind: Option<TransformKind>, images: &[Image]) -> ProcessRequest {
        ProcessRequest::new(
            "user@example.com",
            TransformFlags::from(kind),
            images.iter().map(png_payload).collect(),
        )
        .with_format(OutputFormat::Png)
    }

    struct FailingStore;

    impl MetricsStore for FailingStore {
        fn snapshot(&self, _email: &str) -> Result<UserMetrics, StoreError> {
            Ok(UserMetrics::default())
        }

        fn merge(&self, email: &str, _delta: &UserMetrics) -> Result<UserMetrics, StoreError> {
            Err(StoreError::Poisoned(email.to_string()))
        }
    }

    // =========================================================================
    // Success paths
    // =========================================================================

    #[test]
    fn reverse_video_request_round_trip() {
        let svc = service();
        let resp = svc
            .handle(&request(
                Some(TransformKind::ReverseVideo),
                &[constant_gray(4, 4, 0)],
            ))
            .unwrap();

        assert_eq!(resp.operation, Some(TransformKind::ReverseVideo));
        assert_eq!(resp.format, OutputFormat::Png);
        assert_eq!(resp.image_sizes, vec![[4, 4]]);

        let out = codec::decode_one(0, &resp.processed_images[0]).unwrap();
        assert_eq!(out.mode(), Mode::Grayscale);
        assert!(out.as_raw().iter().all(|&v| v == 255));

        let metrics = svc.metrics("user@example.com").unwrap();
        assert_eq!(metrics.rev.count, 1);
        assert_eq!(metrics.total_count(), 1);
    }

    #[test]
    fn response_carries_histograms_for_every_image() {
        let svc = service();
        let images = [gray_gradient(6, 4), color_gradient(3, 5)];
        let resp = svc
            .handle(&request(Some(TransformKind::ContrastStretching), &images))
            .unwrap();

        assert_eq!(resp.histograms_original.len(), 2);
        assert_eq!(resp.histograms_processed.len(), 2);
        assert_eq!(resp.histograms_original[0].mode(), Mode::Grayscale);
        assert_eq!(resp.histograms_processed[1].mode(), Mode::Color);
        assert_eq!(resp.histograms_original[1].total_per_channel(), vec![15, 15, 15]);
        assert_eq!(resp.image_sizes, vec![[4, 6], [5, 3]]);
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let resp = service()
            .handle(&request(Some(TransformKind::GammaCorrection), &[gray_gradient(2, 2)]))
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&resp.upload_timestamp).is_ok());
        assert!(resp.latency_seconds >= 0.0);
    }

    #[test]
    fn format_defaults_to_config() {
        let config = ServiceConfig {
            format: OutputFormat::Tiff,
            ..Default::default()
        };
        let svc = EnhanceService::new(config, InMemoryMetricsStore::new());
        let mut req = request(Some(TransformKind::LogCompression), &[gray_gradient(3, 3)]);
        req.format = None;

        let resp = svc.handle(&req).unwrap();
        assert_eq!(resp.format, OutputFormat::Tiff);
    }

    #[test]
    fn pass_through_leaves_metrics_alone() {
        let svc = service();
        let img = color_gradient(4, 3);
        let resp = svc.handle(&request(None, &[img.clone()])).unwrap();

        assert_eq!(resp.operation, None);
        assert_eq!(codec::decode_one(0, &resp.processed_images[0]).unwrap(), img);
        assert!(svc.metrics("user@example.com").unwrap().is_empty());
    }

    #[test]
    fn jpeg_input_is_accepted() {
        let svc = service();
        let img = color_gradient(10, 6);
        let req = ProcessRequest::new(
            "user@example.com",
            TransformFlags::only(TransformKind::ReverseVideo),
            vec![jpeg_payload(&img)],
        );

        let resp = svc.handle(&req).unwrap();
        assert_eq!(resp.format, OutputFormat::Jpeg);
        assert_eq!(resp.image_sizes, vec![[6, 10]]);
        assert_eq!(resp.histograms_original[0].mode(), Mode::Color);
    }

    #[test]
    fn metrics_accumulate_across_requests() {
        let svc = service();
        let images = [gray_gradient(4, 4), gray_gradient(4, 4)];
        svc.handle(&request(Some(TransformKind::HistogramEq), &images))
            .unwrap();
        svc.handle(&request(Some(TransformKind::HistogramEq), &images[..1]))
            .unwrap();

        let metrics = svc.metrics("user@example.com").unwrap();
        assert_eq!(metrics.hist.count, 3);
        assert_eq!(metrics.hist.latencies.len(), 3);
    }

    // =========================================================================
    // Failure paths
    // =========================================================================

    #[test]
    fn conflicting_flags_are_a_validation_error() {
        let mut req = request(Some(TransformKind::HistogramEq), &[gray_gradient(2, 2)]);
        req.flags.cont = true;

        let err = service().handle(&req).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status_code(), 400);
        assert!(matches!(
            err,
            EnhanceError::Validation {
                source: ValidationError::TooManyOperations(_),
                ..
            }
        ));
    }

    #[test]
    fn empty_selection_rejected_when_required() {
        let config = ServiceConfig {
            require_selection: true,
            ..Default::default()
        };
        let svc = EnhanceService::new(config, InMemoryMetricsStore::new());
        let err = svc.handle(&request(None, &[gray_gradient(2, 2)])).unwrap_err();
        assert!(matches!(
            err,
            EnhanceError::Validation {
                source: ValidationError::NoOperation,
                ..
            }
        ));
    }

    #[test]
    fn corrupt_payload_aborts_without_touching_metrics() {
        let svc = service();
        let mut req = request(
            Some(TransformKind::ReverseVideo),
            &[gray_gradient(3, 3), gray_gradient(3, 3), gray_gradient(3, 3)],
        );
        req.images[1] = "not base64 at all!".to_string();

        let err = svc.handle(&req).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.index(), Some(1));
        assert_eq!(err.user(), Some("user@example.com"));
        assert!(svc.metrics("user@example.com").unwrap().is_empty());
    }

    #[test]
    fn store_failure_is_a_500() {
        let svc = EnhanceService::new(ServiceConfig::default(), FailingStore);
        let err = svc
            .handle(&request(Some(TransformKind::ReverseVideo), &[gray_gradient(2, 2)]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn malformed_json_has_no_user() {
        let err = service().handle_json("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.user(), None);
    }

    #[test]
    fn respond_json_renders_error_body() {
        let (status, body) = service().respond_json("{}").unwrap();
        assert_eq!(status, 400);
        let parsed: ErrorBody = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.kind, ErrorKind::Validation);
        assert!(parsed.error.contains("email"));
        assert_eq!(parsed.index, None);
    }

    #[test]
    fn respond_json_renders_success() {
        let req = request(Some(TransformKind::ReverseVideo), &[gray_gradient(2, 2)]);
        let body = serde_json::to_string(&req).unwrap();
        let (status, text) = service().respond_json(&body).unwrap();
        assert_eq!(status, 200);
        let resp: ProcessResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(resp.operation, Some(TransformKind::ReverseVideo));
    }

    #[test]
    fn service_config_from_app_config() {
        let mut app = AppConfig::default();
        app.transforms.gamma = 1.5;
        app.transforms.require_selection = true;
        app.output.format = OutputFormat::Png;
        app.output.jpeg_quality = 40;

        let config = ServiceConfig::from_app_config(&app);
        assert_eq!(config.params.gamma.value(), 1.5);
        assert!(config.require_selection);
        assert_eq!(config.format, OutputFormat::Png);
        assert_eq!(config.quality.value(), 40);
    }
}
