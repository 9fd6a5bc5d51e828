//! Pre/post period construction and validation.
//!
//! Boundaries must be exact index dates. We never snap to the nearest
//! available date: an absent boundary is reported with its name and the
//! checkpoint at which it was found missing.

use chrono::{Days, NaiveDate};
use tracing::debug;

use crate::domain::{
    Checkpoint, MissingBoundary, OrderingPolicy, PeriodBoundaries, PeriodOverrides, ValidatedPeriods,
};
use crate::error::PrepError;

/// Fill unset boundaries from the intervention date and the index extent.
///
/// Defaults:
/// - pre start  = first index date
/// - pre end    = intervention - 1 day
/// - post start = intervention
/// - post end   = last index date
pub fn resolve_boundaries(
    overrides: &PeriodOverrides,
    first: NaiveDate,
    last: NaiveDate,
) -> Result<PeriodBoundaries, PrepError> {
    let pre_end = overrides
        .pre_end
        .or_else(|| overrides.intervention.and_then(|d| d.checked_sub_days(Days::new(1))));
    let post_start = overrides.post_start.or(overrides.intervention);

    match (pre_end, post_start) {
        (Some(pre_end), Some(post_start)) => Ok(PeriodBoundaries {
            pre_start: overrides.pre_start.unwrap_or(first),
            pre_end,
            post_start,
            post_end: overrides.post_end.unwrap_or(last),
        }),
        _ => Err(PrepError::InvalidSelection(
            "provide an intervention date, or both the pre-period end and post-period start".to_string(),
        )),
    }
}

/// Check `pre_start <= pre_end < post_start <= post_end`.
pub fn check_ordering(b: &PeriodBoundaries, policy: OrderingPolicy) -> Result<(), PrepError> {
    if b.pre_start > b.pre_end {
        return Err(ordering_error("pre-period start", b.pre_start, "not be after", "pre-period end", b.pre_end));
    }
    if b.post_start > b.post_end {
        return Err(ordering_error(
            "post-period start",
            b.post_start,
            "not be after",
            "post-period end",
            b.post_end,
        ));
    }
    if policy == OrderingPolicy::Enforce && b.pre_end >= b.post_start {
        return Err(ordering_error("pre-period end", b.pre_end, "precede", "post-period start", b.post_start));
    }
    Ok(())
}

/// Boundaries that are not exact entries of `index` (which must be sorted).
pub fn missing_boundaries(index: &[NaiveDate], b: &PeriodBoundaries) -> Vec<MissingBoundary> {
    b.named()
        .into_iter()
        .filter(|(_, date)| index.binary_search(date).is_err())
        .map(|(boundary, date)| MissingBoundary { boundary, date })
        .collect()
}

/// Fail with `PeriodBoundaryMissing` if any boundary is absent from `index`.
pub fn check_membership(
    index: &[NaiveDate],
    b: &PeriodBoundaries,
    checkpoint: Checkpoint,
) -> Result<(), PrepError> {
    let missing = missing_boundaries(index, b);
    debug!(%checkpoint, missing = missing.len(), "period boundary check");
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PrepError::PeriodBoundaryMissing { checkpoint, missing })
    }
}

/// Ordering + membership in one call.
pub fn validate_periods(
    index: &[NaiveDate],
    b: &PeriodBoundaries,
    checkpoint: Checkpoint,
    policy: OrderingPolicy,
) -> Result<ValidatedPeriods, PrepError> {
    check_ordering(b, policy)?;
    check_membership(index, b, checkpoint)?;
    Ok(ValidatedPeriods {
        pre: b.pre_period(),
        post: b.post_period(),
    })
}

fn ordering_error(
    first: &'static str,
    first_date: NaiveDate,
    relation: &'static str,
    second: &'static str,
    second_date: NaiveDate,
) -> PrepError {
    PrepError::PeriodOrderingInvalid {
        first,
        first_date,
        relation,
        second,
        second_date,
    }
}
