//! Reporting utilities: preparation summary, effect tables, prose report.

pub mod format;

pub use format::*;
