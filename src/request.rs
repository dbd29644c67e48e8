//! Typed request and response documents.
//!
//! A request is a JSON object with exactly these keys:
//!
//! | Key | Type | Required |
//! |---|---|---|
//! | `email` | string of shape `*@*.*` | yes |
//! | `hist`, `cont`, `log`, `rev`, `gamma` | bool | yes |
//! | `images` | array of base64 strings, non-empty | yes |
//! | `format` | `"jpeg"`, `"png"` or `"tiff"` (or null) | no |
//!
//! [`parse_request`] checks structure (keys and types) and
//! [`ProcessRequest::validate`] checks content. Every failure is a distinct
//! [`ValidationError`] variant, so callers can tell a missing key from a
//! wrong type from a conflicting selection.

use crate::imaging::{Histogram, OutputFormat, TransformKind};
use crate::pipeline::TransformFlags;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

const REQUIRED_KEYS: [&str; 7] = ["email", "hist", "cont", "log", "rev", "gamma", "images"];
const OPTIONAL_KEYS: [&str; 1] = ["format"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request is not valid JSON: {0}")]
    Malformed(String),
    #[error("request must be a JSON object")]
    NotAnObject,
    #[error("request is missing key '{0}'")]
    MissingField(&'static str),
    #[error("request has unknown key '{0}'")]
    UnknownField(String),
    #[error("'{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("unsupported output format: {0}")]
    InvalidFormat(String),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("request contains no images")]
    NoImages,
    #[error("too many operations selected: {}", join_keys(.0))]
    TooManyOperations(Vec<TransformKind>),
    #[error("no operation selected")]
    NoOperation,
}

fn join_keys(kinds: &[TransformKind]) -> String {
    kinds.iter().map(|k| k.key()).collect::<Vec<_>>().join(", ")
}

/// A structurally valid request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRequest {
    pub email: String,
    #[serde(flatten)]
    pub flags: TransformFlags,
    /// Base64 payloads, in batch order.
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
}

impl ProcessRequest {
    pub fn new(email: impl Into<String>, flags: TransformFlags, images: Vec<String>) -> Self {
        Self {
            email: email.into(),
            flags,
            images,
            format: None,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Content checks. Returns the selected transform (`None` = pass-through).
    pub fn validate(
        &self,
        require_selection: bool,
    ) -> Result<Option<TransformKind>, ValidationError> {
        if !is_valid_email(&self.email) {
            return Err(ValidationError::InvalidEmail(self.email.clone()));
        }
        if self.images.is_empty() {
            return Err(ValidationError::NoImages);
        }
        let requested = self.flags.requested();
        if requested.len() > 1 {
            return Err(ValidationError::TooManyOperations(requested));
        }
        let selected = requested.first().copied();
        if selected.is_none() && require_selection {
            return Err(ValidationError::NoOperation);
        }
        Ok(selected)
    }
}

/// `local@domain.tld`: one `@`, non-empty local part, and a domain of at
/// least two non-empty dot-separated labels.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

/// Parse and structurally check a JSON request document.
pub fn parse_request(body: &str) -> Result<ProcessRequest, ValidationError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    from_value(value)
}

/// Structural checks on an already-parsed document.
pub fn from_value(value: Value) -> Result<ProcessRequest, ValidationError> {
    let Value::Object(map) = value else {
        return Err(ValidationError::NotAnObject);
    };

    if let Some(unknown) = map
        .keys()
        .find(|k| !REQUIRED_KEYS.contains(&k.as_str()) && !OPTIONAL_KEYS.contains(&k.as_str()))
    {
        return Err(ValidationError::UnknownField(unknown.clone()));
    }
    if let Some(missing) = REQUIRED_KEYS.iter().find(|k| !map.contains_key(**k)) {
        return Err(ValidationError::MissingField(*missing));
    }

    let email = match &map["email"] {
        Value::String(s) => s.clone(),
        _ => {
            return Err(ValidationError::WrongType {
                field: "email",
                expected: "a string",
            });
        }
    };

    let mut flags = TransformFlags::default();
    for kind in TransformKind::ALL {
        if bool_field(&map, kind.key())? {
            flags.set(kind);
        }
    }

    let images = match &map["images"] {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                _ => Err(ValidationError::WrongType {
                    field: "images",
                    expected: "an array of base64 strings",
                }),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(ValidationError::WrongType {
                field: "images",
                expected: "an array of base64 strings",
            });
        }
    };

    let format = match map.get("format") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(
            s.parse::<OutputFormat>()
                .map_err(|_| ValidationError::InvalidFormat(s.clone()))?,
        ),
        Some(_) => {
            return Err(ValidationError::WrongType {
                field: "format",
                expected: "a string",
            });
        }
    };

    Ok(ProcessRequest {
        email,
        flags,
        images,
        format,
    })
}

fn bool_field(map: &Map<String, Value>, key: &'static str) -> Result<bool, ValidationError> {
    match map.get(key) {
        Some(Value::Bool(b)) => Ok(*b),
        _ => Err(ValidationError::WrongType {
            field: key,
            expected: "a boolean",
        }),
    }
}

/// The response bundle for a processed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResponse {
    /// Base64 payloads in `format`, in batch order.
    pub processed_images: Vec<String>,
    pub histograms_original: Vec<Histogram>,
    pub histograms_processed: Vec<Histogram>,
    /// When the request was received, RFC 3339 in UTC.
    pub upload_timestamp: String,
    /// Sum of per-image latencies.
    pub latency_seconds: f64,
    /// `[height, width]` per image.
    pub image_sizes: Vec<[u32; 2]>,
    /// Applied transform, `null` for pass-through.
    pub operation: Option<TransformKind>,
    pub format: OutputFormat,
}
