//! `impact-lab` library crate.
//!
//! The binary (`impact`) is a thin wrapper around this library so that:
//!
//! - the preparation pipeline is testable without spawning processes
//! - any estimator implementing `estimate::ImpactEstimator` can be plugged in
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod estimate;
pub mod io;
pub mod math;
pub mod plot;
pub mod prep;
pub mod report;
