use thiserror::Error;

use crate::domain::{Checkpoint, MissingBoundary};

/// Process-level error: a user-facing message plus the exit code to use.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures of the table preparation and estimation pipeline.
///
/// Row-level date coercion failures are not errors: they become dropped rows
/// recorded in `prep::CleanReport`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrepError {
    #[error("{0}")]
    Input(String),

    #[error(
        "No date column found: no column name contains \"date\" (columns: {}). Pick one with --date-column.",
        .columns.join(", ")
    )]
    NoDateColumnFound { columns: Vec<String> },

    #[error(
        "Several columns look like dates: {}. Choose one with --date-column.",
        .candidates.join(", ")
    )]
    AmbiguousDateColumn { candidates: Vec<String> },

    #[error("Unknown column `{name}` (available: {}).", .available.join(", "))]
    UnknownColumn { name: String, available: Vec<String> },

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("No rows remain {stage}.")]
    EmptyDataset { stage: String },

    #[error("{}", format_missing(.checkpoint, .missing))]
    PeriodBoundaryMissing {
        checkpoint: Checkpoint,
        missing: Vec<MissingBoundary>,
    },

    #[error("Invalid period ordering: {first} ({first_date}) must {relation} {second} ({second_date}).")]
    PeriodOrderingInvalid {
        first: &'static str,
        first_date: chrono::NaiveDate,
        relation: &'static str,
        second: &'static str,
        second_date: chrono::NaiveDate,
    },

    #[error("An error occurred during analysis: {0}")]
    EstimationFailure(String),
}

impl PrepError {
    /// Exit code convention: 2 = input/selection, 3 = data, 4 = estimation.
    pub fn exit_code(&self) -> u8 {
        match self {
            PrepError::Input(_)
            | PrepError::NoDateColumnFound { .. }
            | PrepError::AmbiguousDateColumn { .. }
            | PrepError::UnknownColumn { .. }
            | PrepError::InvalidSelection(_) => 2,
            PrepError::EmptyDataset { .. }
            | PrepError::PeriodBoundaryMissing { .. }
            | PrepError::PeriodOrderingInvalid { .. } => 3,
            PrepError::EstimationFailure(_) => 4,
        }
    }
}

impl From<PrepError> for AppError {
    fn from(err: PrepError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

fn format_missing(checkpoint: &Checkpoint, missing: &[MissingBoundary]) -> String {
    let dates: Vec<String> = missing
        .iter()
        .map(|m| format!("{} ({})", m.date, m.boundary.label()))
        .collect();
    match checkpoint {
        Checkpoint::AfterDateParsing => format!(
            "The following selected dates are missing in the data: {}",
            dates.join(", ")
        ),
        Checkpoint::AfterMissingValueDrop => format!(
            "The following dates were removed due to missing values: {}",
            dates.join(", ")
        ),
    }
}
