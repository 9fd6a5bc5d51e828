//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - raw and cleaned table shapes (`RawTable`, `CleanTable`)
//! - period boundaries and validation results (`PeriodBoundaries`, `ValidatedPeriods`)
//! - estimator configuration and outputs (`ModelArgs`, `SeriesPoint`, `EffectSummary`)

pub mod types;

pub use types::*;
