//! Date column resolution.
//!
//! Either the user names the column, or we look for headers containing
//! "date" (case-insensitive). Several matches are returned to the caller as
//! `DateColumnChoice::Ambiguous`; we never silently take the first one.

use tracing::debug;

use crate::domain::{DateColumnChoice, DateColumnSelection, RawTable};
use crate::error::PrepError;
use crate::prep::coerce::is_missing;

const DATE_HINT: &str = "date";

/// Headers that look like a date column and carry at least one value.
pub fn date_column_candidates(table: &RawTable) -> Vec<String> {
    table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, name)| name.to_ascii_lowercase().contains(DATE_HINT))
        .filter(|(idx, _)| table.column_cells(*idx).any(|c| !is_missing(c)))
        .map(|(_, name)| name.clone())
        .collect()
}

/// Resolve which column is the date axis.
pub fn resolve_date_column(
    table: &RawTable,
    selection: &DateColumnSelection,
) -> Result<DateColumnChoice, PrepError> {
    match selection {
        DateColumnSelection::Explicit(name) => {
            let idx = table.column_index(name).ok_or_else(|| PrepError::UnknownColumn {
                name: name.clone(),
                available: table.headers.clone(),
            })?;
            Ok(DateColumnChoice::Resolved(table.headers[idx].clone()))
        }
        DateColumnSelection::Heuristic => {
            let mut candidates = date_column_candidates(table);
            debug!(?candidates, "date column candidates");
            match candidates.len() {
                0 => Err(PrepError::NoDateColumnFound {
                    columns: table.headers.clone(),
                }),
                1 => Ok(DateColumnChoice::Resolved(candidates.remove(0))),
                _ => Ok(DateColumnChoice::Ambiguous(candidates)),
            }
        }
    }
}

/// Resolve, treating ambiguity as an error (non-interactive callers).
pub fn require_date_column(
    table: &RawTable,
    selection: &DateColumnSelection,
) -> Result<String, PrepError> {
    match resolve_date_column(table, selection)? {
        DateColumnChoice::Resolved(name) => Ok(name),
        DateColumnChoice::Ambiguous(candidates) => Err(PrepError::AmbiguousDateColumn { candidates }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawRow;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, r)| RawRow {
                    line: i + 2,
                    cells: r.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn no_date_like_column_is_rejected() {
        let t = table(&["day", "sales"], &[&["2023-01-01", "1"]]);
        let err = resolve_date_column(&t, &DateColumnSelection::Heuristic).unwrap_err();
        assert_eq!(
            err,
            PrepError::NoDateColumnFound {
                columns: vec!["day".to_string(), "sales".to_string()]
            }
        );
    }

    #[test]
    fn single_candidate_is_resolved_case_insensitively() {
        let t = table(&["Order DATE", "sales"], &[&["2023-01-01", "1"]]);
        let choice = resolve_date_column(&t, &DateColumnSelection::Heuristic).unwrap();
        assert_eq!(choice, DateColumnChoice::Resolved("Order DATE".to_string()));
    }

    #[test]
    fn multiple_candidates_are_all_returned() {
        let t = table(
            &["start_date", "sales", "EndDate"],
            &[&["2023-01-01", "1", "2023-01-02"]],
        );
        let choice = resolve_date_column(&t, &DateColumnSelection::Heuristic).unwrap();
        assert_eq!(
            choice,
            DateColumnChoice::Ambiguous(vec!["start_date".to_string(), "EndDate".to_string()])
        );
        let err = require_date_column(&t, &DateColumnSelection::Heuristic).unwrap_err();
        assert!(matches!(err, PrepError::AmbiguousDateColumn { candidates } if candidates.len() == 2));
    }

    #[test]
    fn empty_date_like_columns_are_not_candidates() {
        let t = table(&["date", "update_note", "y"], &[&["2023-01-01", "", "1"]]);
        let choice = resolve_date_column(&t, &DateColumnSelection::Heuristic).unwrap();
        assert_eq!(choice, DateColumnChoice::Resolved("date".to_string()));
    }

    #[test]
    fn explicit_selection_must_exist() {
        let t = table(&["when", "y"], &[&["2023-01-01", "1"]]);
        let ok = resolve_date_column(&t, &DateColumnSelection::Explicit("WHEN".to_string())).unwrap();
        assert_eq!(ok, DateColumnChoice::Resolved("when".to_string()));

        let err = resolve_date_column(&t, &DateColumnSelection::Explicit("date".to_string())).unwrap_err();
        assert!(matches!(err, PrepError::UnknownColumn { name, .. } if name == "date"));
    }
}
