//! Period-aligned table preparation.
//!
//! Responsibilities:
//!
//! - resolve the date column (explicit or heuristic)
//! - coerce date and numeric cells
//! - build the date-indexed `CleanTable` and attribute dropped rows
//! - validate pre/post period boundaries against the index

pub mod clean;
pub mod coerce;
pub mod date_column;
pub mod periods;

pub use clean::*;
pub use coerce::*;
pub use date_column::*;
pub use periods::*;
