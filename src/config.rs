//! Service configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! overridden by a user `config.toml` in the config directory (`--config-dir`,
//! current directory by default). Each file only needs the keys it wants to
//! change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [transforms]
//! gamma = 2.2                  # Exponent for gamma correction (> 0)
//! require_selection = false    # Reject requests with no transform flag set
//!
//! [output]
//! format = "jpeg"              # jpeg, png or tiff
//! jpeg_quality = 90            # JPEG quality (1-100)
//!
//! [processing]
//! max_processes = 4            # Max parallel workers (omit for auto = CPU cores)
//!
//! [metrics]
//! store_path = "metrics.json"  # Per-user metrics document
//! ```
//!
//! ## Partial Configuration
//!
//! ```toml
//! [transforms]
//! gamma = 1.8
//! ```
//!
//! Unspecified values keep their stock defaults. Unknown keys are rejected.

use crate::imaging::{Gamma, OutputFormat, Quality, TransformParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Transform engine knobs.
    pub transforms: TransformsConfig,
    /// Encoding of processed images.
    pub output: OutputConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Where per-user metrics live.
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Gamma::new(self.transforms.gamma).is_none() {
            return Err(ConfigError::Validation(
                "transforms.gamma must be a finite number greater than 0".into(),
            ));
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(ConfigError::Validation(
                "output.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.metrics.store_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "metrics.store_path must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Transform parameters. Only meaningful on a validated config.
    pub fn transform_params(&self) -> TransformParams {
        TransformParams {
            gamma: Gamma::new(self.transforms.gamma).unwrap_or_default(),
        }
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.output.jpeg_quality)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformsConfig {
    /// Exponent for gamma correction.
    pub gamma: f64,
    /// When true, a request with no transform flag is a validation error
    /// instead of a pass-through.
    pub require_selection: bool,
}

impl Default for TransformsConfig {
    fn default() -> Self {
        Self {
            gamma: Gamma::DEFAULT,
            require_selection: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Default container format; a request may override it.
    pub format: OutputFormat,
    pub jpeg_quality: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            jpeg_quality: 90,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// JSON document holding every user's metrics. Relative paths resolve
    /// against the config directory.
    pub store_path: PathBuf,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("metrics.json"),
        }
    }
}

impl MetricsConfig {
    pub fn resolve_store_path(&self, config_dir: &Path) -> PathBuf {
        if self.store_path.is_absolute() {
            self.store_path.clone()
        } else {
            config_dir.join(&self.store_path)
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(AppConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<AppConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(dir)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Image Enhance Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Transforms
# ---------------------------------------------------------------------------
[transforms]
# Exponent for gamma correction: out = 255 * (in / 255) ^ gamma.
# Above 1.0 darkens midtones, below 1.0 brightens them. Must be > 0.
gamma = 2.2

# Requests with no transform flag set normally pass images through
# unchanged. Set to true to reject them as invalid instead.
require_selection = false

# ---------------------------------------------------------------------------
# Output encoding
# ---------------------------------------------------------------------------
[output]
# Container for processed images when the request does not name one:
# "jpeg", "png" or "tiff". Only png and tiff are lossless.
format = "jpeg"

# JPEG encoding quality (1 = worst, 100 = best).
jpeg_quality = 90

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit to auto-detect (= number of CPU cores). Values above core count are clamped.
# max_processes = 4

# ---------------------------------------------------------------------------
# Metrics
# ---------------------------------------------------------------------------
[metrics]
# JSON document with per-user invocation counts and latencies.
# Relative paths resolve against the config directory.
store_path = "metrics.json"
"##
}
