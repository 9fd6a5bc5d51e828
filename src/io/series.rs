//! Read/write impact series JSON files.
//!
//! Series JSON is the portable representation of an analysis:
//! - response and control names, the validated periods and the fit method
//! - the effect summary
//! - the per-date actual / counterfactual / effect series, for re-plotting
//!
//! The schema is defined by `domain::SeriesFile`.

use std::fs::File;
use std::path::Path;

use crate::domain::SeriesFile;
use crate::error::AppError;

/// Write a series JSON file.
pub fn write_series_json(path: &Path, series: &SeriesFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create series JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, series)
        .map_err(|e| AppError::new(2, format!("Failed to write series JSON: {e}")))?;
    Ok(())
}

/// Read a series JSON file.
pub fn read_series_json(path: &Path) -> Result<SeriesFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open series JSON '{}': {e}", path.display())))?;
    let series: SeriesFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid series JSON: {e}")))?;
    if series.points.is_empty() {
        return Err(AppError::new(2, format!("Series JSON '{}' has no points.", path.display())));
    }
    Ok(series)
}
