//! Cell-level coercion: dates and numbers.
//!
//! Coercion never fails hard. A cell that cannot be interpreted under the
//! active encoding is reported as `None` and the caller decides what to do
//! with the row (the cleaning step drops and attributes it).

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::domain::DateEncoding;

/// Tokens treated as missing, in addition to blank cells.
///
/// This mirrors the NA markers common spreadsheet/CSV exports use.
const NA_TOKENS: [&str; 8] = ["na", "n/a", "nan", "null", "none", "#n/a", "-nan", "<na>"];

/// Slash dates are month-first; day-first is only a fallback for text that
/// cannot be month-first (`15/01/2023`).
const DATE_FMTS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y", "%d-%m-%Y"];

const DATETIME_FMTS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Whether a raw cell counts as missing.
pub fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || NA_TOKENS.iter().any(|t| cell.eq_ignore_ascii_case(t))
}

/// Coerce a raw cell to a calendar date under the given encoding.
pub fn coerce_date(cell: &str, encoding: DateEncoding) -> Option<NaiveDate> {
    if is_missing(cell) {
        return None;
    }
    let cell = cell.trim();
    match encoding {
        DateEncoding::Calendar => parse_calendar(cell),
        DateEncoding::Yyyymmdd => parse_yyyymmdd(cell),
        DateEncoding::Auto => parse_calendar(cell).or_else(|| parse_yyyymmdd(cell)),
    }
}

/// Parse calendar date/time text. Any time-of-day part is discarded.
pub fn parse_calendar(s: &str) -> Option<NaiveDate> {
    for fmt in DATE_FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FMTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// Strict `YYYYMMDD` parse of an integer-like number.
///
/// The value must be integral (`20230115` or `20230115.0`), and its integer
/// text must be exactly 8 digits forming a valid calendar date.
pub fn parse_yyyymmdd(s: &str) -> Option<NaiveDate> {
    let v = s.parse::<f64>().ok()?;
    if !v.is_finite() || v < 0.0 || v.fract() != 0.0 {
        return None;
    }
    let digits = format!("{}", v as u64);
    if digits.len() != 8 {
        return None;
    }
    let year: i32 = digits[0..4].parse().ok()?;
    let month: u32 = digits[4..6].parse().ok()?;
    let day: u32 = digits[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Outcome of numeric coercion for one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericCell {
    Value(f64),
    Missing,
    Invalid,
}

/// Parse a numeric cell. Non-finite values count as invalid.
pub fn coerce_number(cell: &str) -> NumericCell {
    if is_missing(cell) {
        return NumericCell::Missing;
    }
    match cell.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => NumericCell::Value(v),
        _ => NumericCell::Invalid,
    }
}
