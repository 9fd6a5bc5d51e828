//! Table cleaning: raw cells -> date-indexed numeric table.
//!
//! Cleaning runs in two stages so period boundaries can be validated between
//! them:
//!
//! 1. `index_by_date`: drop structurally empty columns, coerce the date
//!    column, drop rows without a usable date, and sort by date.
//! 2. `restrict`: keep only the response + control columns, drop every row
//!    with a missing or non-numeric value in them, and keep the first
//!    remaining row for each date.
//!
//! Both stages borrow their input; the raw table stays available for previews.
//! Every removed row is attributed in `CleanReport`.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::domain::{CleanTable, DateEncoding, RawTable, Series, find_column};
use crate::error::PrepError;
use crate::prep::coerce::{NumericCell, coerce_date, coerce_number, is_missing};

/// Why a row was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingDate,
    DateCoercionFailure { raw: String },
    DuplicateDate { date: NaiveDate },
    MissingValue { column: String },
    NonNumeric { column: String, raw: String },
}

impl DropReason {
    /// Short stable label used for per-reason counts.
    pub fn kind(&self) -> &'static str {
        match self {
            DropReason::MissingDate => "missing date",
            DropReason::DateCoercionFailure { .. } => "unparseable date",
            DropReason::DuplicateDate { .. } => "duplicate date",
            DropReason::MissingValue { .. } => "missing value",
            DropReason::NonNumeric { .. } => "non-numeric value",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::MissingDate => write!(f, "missing date"),
            DropReason::DateCoercionFailure { raw } => write!(f, "could not parse date '{raw}'"),
            DropReason::DuplicateDate { date } => write!(f, "duplicate date {date}"),
            DropReason::MissingValue { column } => write!(f, "missing value in `{column}`"),
            DropReason::NonNumeric { column, raw } => {
                write!(f, "non-numeric value '{raw}' in `{column}`")
            }
        }
    }
}

/// A row removed during cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRow {
    pub line: usize,
    pub date: Option<NaiveDate>,
    pub reason: DropReason,
}

/// What cleaning removed, for reporting and debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub rows_in: usize,
    pub rows_dated: usize,
    pub rows_out: usize,
    pub dropped_columns: Vec<String>,
    pub dropped_rows: Vec<DroppedRow>,
}

impl CleanReport {
    /// Per-reason drop counts in first-seen order.
    pub fn counts_by_reason(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for row in &self.dropped_rows {
            let kind = row.reason.kind();
            match counts.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((kind, 1)),
            }
        }
        counts
    }

    /// Rows removed because their date cell failed coercion.
    pub fn date_coercion_failures(&self) -> usize {
        self.dropped_rows
            .iter()
            .filter(|r| matches!(r.reason, DropReason::DateCoercionFailure { .. }))
            .count()
    }
}

/// A row that survived date indexing; cells are aligned with `DatedTable::columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedRow {
    pub line: usize,
    pub date: NaiveDate,
    pub cells: Vec<String>,
}

/// Output of stage 1: date-sorted rows with the remaining raw cells.
///
/// A date may still appear more than once here; `restrict` keeps the first
/// complete row for each date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedTable {
    pub date_column: String,
    /// Non-date columns that survived the structural drop.
    pub columns: Vec<String>,
    pub rows: Vec<DatedRow>,
}

impl DatedTable {
    pub fn index(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }
}

/// Stage 1: structural column drop, date coercion, sort.
pub fn index_by_date(
    raw: &RawTable,
    date_column: &str,
    encoding: DateEncoding,
    report: &mut CleanReport,
) -> Result<DatedTable, PrepError> {
    let date_idx = raw.column_index(date_column).ok_or_else(|| PrepError::UnknownColumn {
        name: date_column.to_string(),
        available: raw.headers.clone(),
    })?;

    report.rows_in = raw.n_rows();

    let mut kept_idx = Vec::new();
    for (idx, name) in raw.headers.iter().enumerate() {
        if idx == date_idx {
            continue;
        }
        if is_structurally_empty(raw, idx, name) {
            report.dropped_columns.push(display_column_name(idx, name));
        } else {
            kept_idx.push(idx);
        }
    }
    if !report.dropped_columns.is_empty() {
        info!(columns = ?report.dropped_columns, "dropped empty columns");
    }

    let mut rows = Vec::with_capacity(raw.n_rows());
    for row in &raw.rows {
        let cell = row.cells.get(date_idx).map(String::as_str).unwrap_or("");
        if is_missing(cell) {
            report.dropped_rows.push(DroppedRow {
                line: row.line,
                date: None,
                reason: DropReason::MissingDate,
            });
            continue;
        }
        let Some(date) = coerce_date(cell, encoding) else {
            report.dropped_rows.push(DroppedRow {
                line: row.line,
                date: None,
                reason: DropReason::DateCoercionFailure {
                    raw: cell.trim().to_string(),
                },
            });
            continue;
        };
        let cells = kept_idx
            .iter()
            .map(|&i| row.cells.get(i).cloned().unwrap_or_default())
            .collect();
        rows.push(DatedRow {
            line: row.line,
            date,
            cells,
        });
    }

    // Stable: rows sharing a date stay in source order. Duplicates are
    // resolved in `restrict`, once it is known which of them are complete.
    rows.sort_by_key(|r| r.date);

    report.rows_dated = rows.len();
    debug!(
        rows_in = report.rows_in,
        rows_dated = report.rows_dated,
        coercion_failures = report.date_coercion_failures(),
        "indexed by date"
    );

    if rows.is_empty() {
        return Err(PrepError::EmptyDataset {
            stage: format!("after parsing date column `{}`", raw.headers[date_idx]),
        });
    }

    Ok(DatedTable {
        date_column: raw.headers[date_idx].clone(),
        columns: kept_idx.iter().map(|&i| raw.headers[i].clone()).collect(),
        rows,
    })
}

/// Stage 2: keep response + controls, drop incomplete rows, then keep the
/// first complete row per date.
pub fn restrict(
    dated: &DatedTable,
    response: &str,
    controls: &[String],
    report: &mut CleanReport,
) -> Result<CleanTable, PrepError> {
    let selected = resolve_selection(dated, response, controls)?;

    let mut index = Vec::with_capacity(dated.rows.len());
    let mut values: Vec<Vec<f64>> = vec![Vec::with_capacity(dated.rows.len()); selected.len()];

    'rows: for row in &dated.rows {
        let mut parsed = Vec::with_capacity(selected.len());
        for &col in &selected {
            let name = &dated.columns[col];
            match coerce_number(&row.cells[col]) {
                NumericCell::Value(v) => parsed.push(v),
                NumericCell::Missing => {
                    report.dropped_rows.push(DroppedRow {
                        line: row.line,
                        date: Some(row.date),
                        reason: DropReason::MissingValue { column: name.clone() },
                    });
                    continue 'rows;
                }
                NumericCell::Invalid => {
                    report.dropped_rows.push(DroppedRow {
                        line: row.line,
                        date: Some(row.date),
                        reason: DropReason::NonNumeric {
                            column: name.clone(),
                            raw: row.cells[col].trim().to_string(),
                        },
                    });
                    continue 'rows;
                }
            }
        }
        if index.last() == Some(&row.date) {
            report.dropped_rows.push(DroppedRow {
                line: row.line,
                date: Some(row.date),
                reason: DropReason::DuplicateDate { date: row.date },
            });
            continue;
        }
        index.push(row.date);
        for (series, v) in values.iter_mut().zip(parsed) {
            series.push(v);
        }
    }

    report.rows_out = index.len();
    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        dropped = report.dropped_rows.len(),
        "cleaned table"
    );

    if index.is_empty() {
        return Err(PrepError::EmptyDataset {
            stage: "after dropping rows with missing values in the selected columns".to_string(),
        });
    }

    let columns = selected
        .iter()
        .zip(values)
        .map(|(&col, values)| Series {
            name: dated.columns[col].clone(),
            values,
        })
        .collect();

    Ok(CleanTable { index, columns })
}

/// Both stages back to back (no period checks in between).
pub fn clean_table(
    raw: &RawTable,
    date_column: &str,
    encoding: DateEncoding,
    response: &str,
    controls: &[String],
) -> Result<(CleanTable, CleanReport), PrepError> {
    let mut report = CleanReport::default();
    let dated = index_by_date(raw, date_column, encoding, &mut report)?;
    let table = restrict(&dated, response, controls, &mut report)?;
    Ok((table, report))
}

fn resolve_selection(
    dated: &DatedTable,
    response: &str,
    controls: &[String],
) -> Result<Vec<usize>, PrepError> {
    let mut selected = Vec::with_capacity(controls.len() + 1);
    let mut seen = HashSet::new();

    for (role, name) in std::iter::once(("response", response))
        .chain(controls.iter().map(|c| ("control", c.as_str())))
    {
        if find_column(std::slice::from_ref(&dated.date_column), name).is_some() {
            return Err(PrepError::InvalidSelection(format!(
                "the date column `{}` cannot be used as a {role} column",
                dated.date_column
            )));
        }
        let Some(col) = find_column(&dated.columns, name) else {
            return Err(PrepError::UnknownColumn {
                name: name.to_string(),
                available: dated.columns.clone(),
            });
        };
        if !seen.insert(col) {
            return Err(PrepError::InvalidSelection(format!(
                "column `{}` is selected more than once",
                dated.columns[col]
            )));
        }
        selected.push(col);
    }

    Ok(selected)
}

/// Empty name, a spreadsheet `Unnamed…` placeholder, or no non-missing cell.
pub fn is_structurally_empty(raw: &RawTable, idx: usize, name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.starts_with("Unnamed") || raw.column_cells(idx).all(is_missing)
}

fn display_column_name(idx: usize, name: &str) -> String {
    if name.trim().is_empty() {
        format!("<unnamed #{}>", idx + 1)
    } else {
        name.to_string()
    }
}
