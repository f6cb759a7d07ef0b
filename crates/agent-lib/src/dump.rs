//! Raw measurement dumps
//!
//! A side-effect convenience: when enabled, every cycle leaves one JSON
//! document with the unmodified result in the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::MeasurementResult;

/// Write the unmodified result as a pretty JSON document.
///
/// The file is named from the measurement timestamp, one document per
/// cycle.
pub fn write_raw_result(dir: &Path, result: &MeasurementResult) -> Result<PathBuf> {
    let name = format!(
        "speedtest-{}.json",
        result.timestamp.format("%Y%m%dT%H%M%SZ")
    );
    let path = dir.join(name);
    let body = serde_json::to_string_pretty(result)
        .context("failed to serialize measurement result")?;
    fs::write(&path, body)
        .with_context(|| format!("failed to write raw result to {}", path.display()))?;
    Ok(path)
}
