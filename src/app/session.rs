//! Session-scoped state: the currently loaded table.
//!
//! A `Session` owns at most one `RawTable`. Loading a new file replaces (and
//! drops) the previous one; `close` tears the session down explicitly.
//! Everything downstream borrows the table immutably.

use std::path::PathBuf;

use tracing::debug;

use crate::domain::RawTable;
use crate::error::PrepError;
use crate::io::ingest::{LoadOptions, load_raw_table};

/// A loaded table plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSource {
    pub path: PathBuf,
    pub sheet: Option<String>,
    pub skip_rows: usize,
    pub table: RawTable,
}

#[derive(Debug, Default)]
pub struct Session {
    source: Option<LoadedSource>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a file and make it the session's table, replacing any previous one.
    ///
    /// On failure the previously loaded table is kept.
    pub fn load(&mut self, opts: &LoadOptions) -> Result<&LoadedSource, PrepError> {
        let table = load_raw_table(opts)?;
        Ok(self.replace(LoadedSource {
            path: opts.path.clone(),
            sheet: opts.sheet.clone(),
            skip_rows: opts.skip_rows,
            table,
        }))
    }

    /// Install an already decoded table.
    pub fn replace(&mut self, source: LoadedSource) -> &LoadedSource {
        if let Some(old) = self.source.take() {
            debug!(path = %old.path.display(), rows = old.table.n_rows(), "discarding previous table");
        }
        self.source.insert(source)
    }

    pub fn source(&self) -> Option<&LoadedSource> {
        self.source.as_ref()
    }

    /// The loaded table, or an input error if nothing is loaded.
    pub fn table(&self) -> Result<&RawTable, PrepError> {
        self.source
            .as_ref()
            .map(|s| &s.table)
            .ok_or_else(|| PrepError::Input("No table loaded. Pass --file.".to_string()))
    }

    /// End the session, handing back the table if there was one.
    pub fn close(&mut self) -> Option<LoadedSource> {
        self.source.take()
    }
}
