//! Input/output helpers.
//!
//! - CSV / spreadsheet ingest (`ingest`)
//! - CSV exports (`export`)
//! - impact series JSON read/write (`series`)

pub mod export;
pub mod ingest;
pub mod series;

pub use export::*;
pub use ingest::*;
pub use series::*;
