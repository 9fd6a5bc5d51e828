//! Export tables to CSV.
//!
//! The clean-table export is meant to be easy to consume in spreadsheets or
//! downstream scripts: one ISO date column followed by the response and the
//! controls, exactly the rows the estimator saw.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{CleanTable, RawTable};
use crate::error::AppError;

/// Write the prepared table (date index + selected columns) to a CSV file.
pub fn write_clean_table_csv(path: &Path, table: &CleanTable, date_column: &str) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = vec![date_column.to_string()];
    header.extend(table.column_names().into_iter().map(str::to_string));
    writer
        .write_record(&header)
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for (i, date) in table.index.iter().enumerate() {
        let mut record = vec![date.format("%Y-%m-%d").to_string()];
        record.extend(table.columns.iter().map(|s| s.values[i].to_string()));
        writer
            .write_record(&record)
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Write a raw table to CSV, preceded by free-form metadata lines.
///
/// The metadata lines are what `--skip-rows` is for when the file is read back.
pub fn write_raw_csv(path: &Path, table: &RawTable, metadata: &[String]) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create CSV '{}': {e}", path.display())))?;
    for line in metadata {
        writeln!(file, "{line}").map_err(|e| AppError::new(2, format!("Failed to write CSV metadata: {e}")))?;
    }

    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(&table.headers)
        .map_err(|e| AppError::new(2, format!("Failed to write CSV header: {e}")))?;
    for row in &table.rows {
        writer
            .write_record(&row.cells)
            .map_err(|e| AppError::new(2, format!("Failed to write CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush CSV: {e}")))?;
    Ok(())
}
