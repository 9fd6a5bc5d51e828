//! Shared analysis pipeline used by the CLI subcommands.
//!
//! One linear run:
//! index by date -> resolve boundaries -> ordering -> boundary check #1
//! -> restrict to selected columns -> boundary check #2 -> estimate
//!
//! Boundaries are re-checked after every row-removing step, so the estimator
//! only ever sees periods whose four endpoints are index entries.

use tracing::{info, warn};

use crate::domain::{
    AnalysisConfig, Checkpoint, CleanTable, MissingBoundary, ModelArgs, PeriodBoundaries, RawTable,
    ValidatedPeriods,
};
use crate::error::PrepError;
use crate::estimate::ImpactEstimator;
use crate::prep::{
    CleanReport, DatedTable, check_ordering, index_by_date, missing_boundaries, resolve_boundaries, restrict,
};

/// Outcome of one boundary checkpoint (`missing` empty = passed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointResult {
    pub checkpoint: Checkpoint,
    pub missing: Vec<MissingBoundary>,
}

impl CheckpointResult {
    pub fn passed(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Everything preparation learned, kept even when it fails.
///
/// The debug bundle is written from this, so it is filled in as the pipeline
/// goes rather than returned at the end.
#[derive(Debug, Clone, Default)]
pub struct PrepTrace {
    pub report: CleanReport,
    pub boundaries: Option<PeriodBoundaries>,
    pub checkpoints: Vec<CheckpointResult>,
}

/// A clean table with periods validated against it.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub clean: CleanTable,
    pub boundaries: PeriodBoundaries,
    pub periods: ValidatedPeriods,
}

/// Build the clean table and validate the periods at both checkpoints.
pub fn prepare(
    raw: &RawTable,
    date_column: &str,
    config: &AnalysisConfig,
    trace: &mut PrepTrace,
) -> Result<PreparedData, PrepError> {
    let dated = index_by_date(raw, date_column, config.date_encoding, &mut trace.report)?;
    let boundaries = boundaries_for(&dated, config)?;
    trace.boundaries = Some(boundaries);
    info!(
        pre_start = %boundaries.pre_start,
        pre_end = %boundaries.pre_end,
        post_start = %boundaries.post_start,
        post_end = %boundaries.post_end,
        "period boundaries"
    );

    check_ordering(&boundaries, config.ordering)?;
    checkpoint(&dated.index(), &boundaries, Checkpoint::AfterDateParsing, trace)?;

    let clean = restrict(&dated, &config.response, &config.controls, &mut trace.report)?;
    checkpoint(&clean.index, &boundaries, Checkpoint::AfterMissingValueDrop, trace)?;

    Ok(PreparedData {
        clean,
        boundaries,
        periods: ValidatedPeriods {
            pre: boundaries.pre_period(),
            post: boundaries.post_period(),
        },
    })
}

/// Hand prepared data to an estimator. Estimator errors pass through verbatim.
pub fn estimate<E: ImpactEstimator>(
    estimator: &E,
    prepared: &PreparedData,
    args: &ModelArgs,
) -> Result<E::Outcome, PrepError> {
    estimator
        .estimate(&prepared.clean, &prepared.periods, args)
        .map_err(|e| PrepError::EstimationFailure(e.to_string()))
}

/// `prepare` then `estimate`; the estimator is only called if preparation succeeds.
pub fn analyze<E: ImpactEstimator>(
    raw: &RawTable,
    date_column: &str,
    config: &AnalysisConfig,
    estimator: &E,
    trace: &mut PrepTrace,
) -> Result<(PreparedData, E::Outcome), PrepError> {
    let prepared = prepare(raw, date_column, config, trace)?;
    let outcome = estimate(estimator, &prepared, &config.model)?;
    Ok((prepared, outcome))
}

fn boundaries_for(dated: &DatedTable, config: &AnalysisConfig) -> Result<PeriodBoundaries, PrepError> {
    match (dated.first_date(), dated.last_date()) {
        (Some(first), Some(last)) => resolve_boundaries(&config.periods, first, last),
        _ => Err(PrepError::EmptyDataset {
            stage: "after parsing the date column".to_string(),
        }),
    }
}

fn checkpoint(
    index: &[chrono::NaiveDate],
    boundaries: &PeriodBoundaries,
    checkpoint: Checkpoint,
    trace: &mut PrepTrace,
) -> Result<(), PrepError> {
    let missing = missing_boundaries(index, boundaries);
    trace.checkpoints.push(CheckpointResult {
        checkpoint,
        missing: missing.clone(),
    });
    if missing.is_empty() {
        info!(%checkpoint, "all period boundaries present");
        return Ok(());
    }
    warn!(%checkpoint, missing = missing.len(), "period boundaries missing");
    Err(PrepError::PeriodBoundaryMissing { checkpoint, missing })
}
