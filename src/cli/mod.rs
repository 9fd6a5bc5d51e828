//! Command-line parsing for the counterfactual impact tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the preparation/estimation code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::{DateEncoding, FitMethod};

pub mod picker;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "impact",
    version,
    about = "Counterfactual impact analysis of a time series around an intervention"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a table, validate the periods, estimate the effect and print the results.
    Run(RunArgs),
    /// Load a table and show how it is read: columns, date column, first rows, drops.
    Inspect(InspectArgs),
    /// Write a synthetic demo dataset.
    Sample(SampleArgs),
    /// Plot a previously exported impact series JSON.
    Plot(PlotArgs),
}

/// Where the table comes from and how to read its date column.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Input file (.csv or .xlsx). Prompted for when omitted on a terminal.
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Spreadsheet sheet name (default: first sheet).
    #[arg(long)]
    pub sheet: Option<String>,

    /// Metadata rows to skip before the header row.
    #[arg(long, env = "IMPACT_SKIP_ROWS", default_value_t = 0)]
    pub skip_rows: usize,

    /// Date column. Without it, columns whose name contains "date" are used.
    #[arg(short = 'd', long)]
    pub date_column: Option<String>,

    /// How to read date cells.
    #[arg(long, value_enum, default_value_t = DateEncoding::Auto)]
    pub date_encoding: DateEncoding,
}

/// Options for a full analysis.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Response (target) column. Prompted for when omitted on a terminal.
    #[arg(short = 'y', long)]
    pub response: Option<String>,

    /// Control column (repeatable).
    #[arg(short = 'x', long = "control", value_name = "COLUMN")]
    pub controls: Vec<String>,

    /// Intervention date: pre-period ends the day before, post-period starts on it.
    #[arg(short = 'i', long)]
    pub intervention: Option<NaiveDate>,

    /// Pre-period start (default: first date in the data).
    #[arg(long)]
    pub pre_start: Option<NaiveDate>,

    /// Pre-period end (default: day before the intervention).
    #[arg(long)]
    pub pre_end: Option<NaiveDate>,

    /// Post-period start (default: the intervention).
    #[arg(long)]
    pub post_start: Option<NaiveDate>,

    /// Post-period end (default: last date in the data).
    #[arg(long)]
    pub post_end: Option<NaiveDate>,

    /// Accept a pre-period that does not end before the post-period starts.
    #[arg(long)]
    pub allow_overlap: bool,

    /// Model fitting technique.
    #[arg(long, value_enum, env = "IMPACT_FIT_METHOD", default_value_t = FitMethod::Vi)]
    pub fit_method: FitMethod,

    /// Sampling draws (hmc only).
    #[arg(long, default_value_t = 1000)]
    pub draws: usize,

    /// Random seed for sampling.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Interval level is 1 - alpha.
    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Height of each plot panel (rows).
    #[arg(long, default_value_t = 12)]
    pub height: usize,

    /// Export the prepared table (date index + selected columns) to CSV.
    #[arg(long)]
    pub export_table: Option<PathBuf>,

    /// Export the impact series (summary + per-date effects) to JSON.
    #[arg(long)]
    pub export_series: Option<PathBuf>,

    /// Write a Markdown cleaning diagnostics file into this directory.
    #[arg(long, value_name = "DIR")]
    pub debug_bundle: Option<PathBuf>,
}

/// Options for inspecting a table.
#[derive(Debug, Args, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Rows to preview.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub rows: usize,
}

/// Options for the synthetic demo dataset.
#[derive(Debug, Args, Clone)]
pub struct SampleArgs {
    /// Output CSV path.
    #[arg(short = 'o', long)]
    pub out: PathBuf,

    /// First date.
    #[arg(long, default_value = "2023-01-01")]
    pub start: NaiveDate,

    /// Number of daily rows.
    #[arg(long, default_value_t = 120)]
    pub days: usize,

    /// Intervention date (default: 70% into the range).
    #[arg(long)]
    pub intervention: Option<NaiveDate>,

    /// Response lift after the intervention.
    #[arg(long, default_value_t = 10.0)]
    pub lift: f64,

    /// Random seed.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Write dates as YYYYMMDD numbers.
    #[arg(long)]
    pub yyyymmdd: bool,

    /// Probability that a control cell is left empty.
    #[arg(long, default_value_t = 0.0)]
    pub missing_prob: f64,

    /// Metadata lines written before the header.
    #[arg(long, default_value_t = 0)]
    pub metadata_rows: usize,
}

/// Options for plotting a saved impact series.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Series JSON file produced by `impact run --export-series`.
    #[arg(long, value_name = "JSON")]
    pub series: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Height of each plot panel (rows).
    #[arg(long, default_value_t = 12)]
    pub height: usize,
}
