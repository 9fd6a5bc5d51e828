//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - passed through the preparation pipeline without copying raw cells twice
//! - exported to JSON/CSV
//! - reloaded later for plotting

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};

/// An uploaded table before any interpretation.
///
/// Every cell is kept as text; an empty (or NA-like) cell means "missing".
/// Rows are guaranteed to have exactly `headers.len()` cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// One data row plus the 1-based line/row number it came from in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub line: usize,
    pub cells: Vec<String>,
}

impl RawTable {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.headers.len()
    }

    /// Exact header match first, then a unique case-insensitive match.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        find_column(&self.headers, name)
    }

    /// Iterate the cells of one column.
    pub fn column_cells(&self, idx: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |r| r.cells.get(idx).map(String::as_str).unwrap_or(""))
    }
}

pub(crate) fn find_column(headers: &[String], name: &str) -> Option<usize> {
    let name = name.trim();
    if let Some(idx) = headers.iter().position(|h| h == name) {
        return Some(idx);
    }
    let mut matches = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.eq_ignore_ascii_case(name));
    match (matches.next(), matches.next()) {
        (Some((idx, _)), None) => Some(idx),
        _ => None,
    }
}

/// A named numeric column of a `CleanTable`.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

/// A date-indexed, fully numeric table.
///
/// Invariants (upheld by `prep::clean`):
/// - `index` is strictly increasing (sorted, no duplicates)
/// - `columns[0]` is the response, the rest are controls
/// - every series has `index.len()` finite values
#[derive(Debug, Clone, PartialEq)]
pub struct CleanTable {
    pub index: Vec<NaiveDate>,
    pub columns: Vec<Series>,
}

impl CleanTable {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn response(&self) -> &Series {
        &self.columns[0]
    }

    pub fn controls(&self) -> &[Series] {
        &self.columns[1..]
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|s| s.name.as_str()).collect()
    }

    /// Row position of an exact index date.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.index.binary_search(&date).ok()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.index.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.index.last().copied()
    }

    /// Render back into a `RawTable` with the index as the first column.
    ///
    /// Dates are written as ISO `YYYY-MM-DD`; values use Rust's shortest
    /// round-trip float formatting.
    pub fn to_raw(&self, date_column: &str) -> RawTable {
        let mut headers = Vec::with_capacity(self.columns.len() + 1);
        headers.push(date_column.to_string());
        headers.extend(self.columns.iter().map(|s| s.name.clone()));

        let rows = self
            .index
            .iter()
            .enumerate()
            .map(|(i, date)| {
                let mut cells = Vec::with_capacity(headers.len());
                cells.push(date.format("%Y-%m-%d").to_string());
                cells.extend(self.columns.iter().map(|s| s.values[i].to_string()));
                RawRow { line: i + 2, cells }
            })
            .collect();

        RawTable { headers, rows }
    }
}

/// How date cells are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DateEncoding {
    /// Try calendar text first, then the numeric `YYYYMMDD` encoding.
    Auto,
    /// Calendar date/time text only (`2023-01-15`, `15/01/2023`, ...).
    Calendar,
    /// Integer-like `YYYYMMDD` values only (`20230115`, `20230115.0`).
    Yyyymmdd,
}

/// How the date column is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateColumnSelection {
    /// The user named the column.
    Explicit(String),
    /// Look for columns whose name contains "date" (case-insensitive).
    Heuristic,
}

/// Outcome of date column resolution.
///
/// `Ambiguous` is not an error: the caller must ask the user to pick one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateColumnChoice {
    Resolved(String),
    Ambiguous(Vec<String>),
}

/// An inclusive date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// The four user-chosen period endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBoundaries {
    pub pre_start: NaiveDate,
    pub pre_end: NaiveDate,
    pub post_start: NaiveDate,
    pub post_end: NaiveDate,
}

impl PeriodBoundaries {
    pub fn named(&self) -> [(Boundary, NaiveDate); 4] {
        [
            (Boundary::PreStart, self.pre_start),
            (Boundary::PreEnd, self.pre_end),
            (Boundary::PostStart, self.post_start),
            (Boundary::PostEnd, self.post_end),
        ]
    }

    pub fn pre_period(&self) -> Period {
        Period {
            start: self.pre_start,
            end: self.pre_end,
        }
    }

    pub fn post_period(&self) -> Period {
        Period {
            start: self.post_start,
            end: self.post_end,
        }
    }
}

/// Optional user-supplied period settings.
///
/// Anything left unset is derived from the intervention date and the table's
/// first/last index date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodOverrides {
    pub intervention: Option<NaiveDate>,
    pub pre_start: Option<NaiveDate>,
    pub pre_end: Option<NaiveDate>,
    pub post_start: Option<NaiveDate>,
    pub post_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    PreStart,
    PreEnd,
    PostStart,
    PostEnd,
}

impl Boundary {
    pub fn label(self) -> &'static str {
        match self {
            Boundary::PreStart => "pre-period start",
            Boundary::PreEnd => "pre-period end",
            Boundary::PostStart => "post-period start",
            Boundary::PostEnd => "post-period end",
        }
    }
}

/// Where in the pipeline the period boundaries were checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Right after the date column was parsed and the table indexed.
    AfterDateParsing,
    /// After restricting to response/control columns and dropping incomplete rows.
    AfterMissingValueDrop,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::AfterDateParsing => write!(f, "after date parsing"),
            Checkpoint::AfterMissingValueDrop => {
                write!(f, "after dropping rows with missing values")
            }
        }
    }
}

/// A boundary date absent from the table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingBoundary {
    pub boundary: Boundary,
    pub date: NaiveDate,
}

/// Pre/post periods that passed validation against a `CleanTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedPeriods {
    pub pre: Period,
    pub post: Period,
}

/// Whether `pre_end < post_start` (and start ≤ end) is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingPolicy {
    Enforce,
    AllowOverlap,
}

/// Model fitting technique passed to the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    /// Fast approximate inference (closed-form Gaussian intervals).
    Vi,
    /// Slower, higher-fidelity sampling (residual bootstrap draws).
    Hmc,
}

impl FitMethod {
    pub fn display_name(self) -> &'static str {
        match self {
            FitMethod::Vi => "vi (fast approximate)",
            FitMethod::Hmc => "hmc (sampling)",
        }
    }
}

/// Estimator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelArgs {
    pub fit_method: FitMethod,
    /// Number of sampling draws (`hmc` only).
    pub draws: usize,
    pub seed: u64,
    /// Interval level is `1 - alpha`.
    pub alpha: f64,
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            fit_method: FitMethod::Vi,
            draws: 1000,
            seed: 42,
            alpha: 0.05,
        }
    }
}

/// A full analysis configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub date_column: DateColumnSelection,
    pub date_encoding: DateEncoding,
    pub response: String,
    pub controls: Vec<String>,
    pub periods: PeriodOverrides,
    pub ordering: OrderingPolicy,
    pub model: ModelArgs,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_table: Option<PathBuf>,
    pub export_series: Option<PathBuf>,
    pub debug_bundle: Option<PathBuf>,
}

/// One point of the estimated impact series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
    pub predicted_lower: f64,
    pub predicted_upper: f64,
    pub point_effect: f64,
    /// Running sum of `point_effect` over the post-period (0 before it).
    pub cumulative_effect: f64,
    pub post: bool,
}

/// Point estimate with spread and interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    #[serde(deserialize_with = "f64_or_nan")]
    pub value: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub sd: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub lower: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub upper: f64,
}

// serde_json writes non-finite floats as `null`; read them back as NaN.
fn f64_or_nan<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
}

/// Average and cumulative view of one quantity over the post-period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measure<T> {
    pub average: T,
    pub cumulative: T,
}

/// Post-period effect summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectSummary {
    pub actual: Measure<f64>,
    pub predicted: Measure<Estimate>,
    pub absolute: Measure<Estimate>,
    pub relative: Measure<Estimate>,
    /// One-sided tail-area probability of observing the effect by chance.
    pub p_value: f64,
    pub alpha: f64,
    pub n_pre: usize,
    pub n_post: usize,
}

/// A saved impact series (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesFile {
    pub tool: String,
    pub response: String,
    pub controls: Vec<String>,
    pub periods: ValidatedPeriods,
    pub fit_method: FitMethod,
    pub summary: EffectSummary,
    pub points: Vec<SeriesPoint>,
}
