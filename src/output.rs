//! CLI output formatting.
//!
//! Output leads with what happened (operation, image index, dimensions) and
//! shows file paths as secondary, indented context.
//!
//! # Output Format
//!
//! ## Process
//!
//! ```text
//! reverse video (rev) → png
//! 001 dawn.jpg (480x640)
//!     Output: out/dawn-rev.png
//! 002 dusk.png (300x300)
//!     Output: out/dusk-rev.png
//! Processed 2 images in 12.4ms
//! ```
//!
//! ## Metrics
//!
//! ```text
//! user@example.com
//!     hist     2 runs, mean 3.1ms
//!     cont     0 runs
//!     log      0 runs
//!     rev      5 runs, mean 1.0ms
//!     gamma    0 runs
//! Total: 7 runs
//! ```
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::metrics::UserMetrics;
use crate::request::ProcessResponse;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-scale duration: microseconds, milliseconds or seconds.
fn format_duration(d: Duration) -> String {
    let micros = d.as_micros();
    if micros < 1_000 {
        format!("{micros}µs")
    } else if micros < 1_000_000 {
        format!("{:.1}ms", micros as f64 / 1_000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Process
// ============================================================================

/// One processed file: the name it was read from and where the result went.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub source: String,
    pub output: Option<PathBuf>,
}

pub fn format_process_output(response: &ProcessResponse, files: &[FileReport]) -> Vec<String> {
    let mut lines = Vec::new();

    let header = match response.operation {
        Some(kind) => format!("{} ({}) → {}", kind.label(), kind.key(), response.format),
        None => format!("pass-through → {}", response.format),
    };
    lines.push(header);

    for (i, [height, width]) in response.image_sizes.iter().copied().enumerate() {
        let name = files.get(i).map(|f| f.source.as_str()).unwrap_or("-");
        lines.push(format!(
            "{} {} ({}x{})",
            format_index(i + 1),
            name,
            width,
            height
        ));
        if let Some(out) = files.get(i).and_then(|f| f.output.as_ref()) {
            lines.push(format!("{}Output: {}", indent(1), out.display()));
        }
    }

    lines.push(format!(
        "Processed {} in {}",
        plural(response.image_sizes.len(), "image", "images"),
        format_duration(Duration::from_secs_f64(response.latency_seconds.max(0.0)))
    ));
    lines
}

pub fn print_process_output(response: &ProcessResponse, files: &[FileReport]) {
    for line in format_process_output(response, files) {
        println!("{line}");
    }
}

// ============================================================================
// Metrics
// ============================================================================

pub fn format_metrics(email: &str, metrics: &UserMetrics) -> Vec<String> {
    let mut lines = vec![email.to_string()];
    for (kind, entry) in metrics.iter() {
        let runs = plural(entry.count as usize, "run", "runs");
        let line = match entry.mean_latency() {
            Some(mean) => format!(
                "{}{:<8} {}, mean {}",
                indent(1),
                kind.key(),
                runs,
                format_duration(mean)
            ),
            None => format!("{}{:<8} {}", indent(1), kind.key(), runs),
        };
        lines.push(line);
    }
    lines.push(format!(
        "Total: {}",
        plural(metrics.total_count() as usize, "run", "runs")
    ));
    lines
}

pub fn print_metrics(email: &str, metrics: &UserMetrics) {
    for line in format_metrics(email, metrics) {
        println!("{line}");
    }
}
