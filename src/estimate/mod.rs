//! Boundary to the causal-estimation routine.
//!
//! The pipeline only knows the `ImpactEstimator` call contract: it hands over
//! a validated `CleanTable` plus the two periods and gets back an opaque
//! outcome that can render a summary, a detailed report, and a plot.
//!
//! `regression` holds the estimator shipped with the binary.

use thiserror::Error;

use crate::domain::{CleanTable, ModelArgs, ValidatedPeriods};

pub mod regression;

pub use regression::*;

/// Failure raised inside an estimator. Surfaced to the user verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EstimateError(pub String);

impl EstimateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A causal-impact estimator.
pub trait ImpactEstimator {
    type Outcome: ImpactOutcome;

    /// Estimate the post-period effect on `data.response()`.
    ///
    /// Callers guarantee that all four period endpoints are index entries of
    /// `data`; this is a blocking call.
    fn estimate(
        &self,
        data: &CleanTable,
        periods: &ValidatedPeriods,
        args: &ModelArgs,
    ) -> Result<Self::Outcome, EstimateError>;
}

/// What the caller can do with an estimation result.
pub trait ImpactOutcome {
    /// Short tabular summary.
    fn summary(&self) -> String;

    /// Longer prose report.
    fn report(&self) -> String;

    /// Plot of actual vs counterfactual and the effects, if renderable.
    fn plot(&self, width: usize, height: usize) -> Option<String>;
}
