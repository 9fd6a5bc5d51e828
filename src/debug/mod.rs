//! Debug bundle writer for inspecting how a table was cleaned.
//!
//! The bundle is a single Markdown file: input shape, selections, period
//! boundaries, both checkpoint results, and every dropped row with its reason.
//! It is written whether or not the run succeeded.

use std::fs::{OpenOptions, create_dir_all};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::app::pipeline::PrepTrace;
use crate::app::session::LoadedSource;
use crate::domain::{AnalysisConfig, OrderingPolicy};
use crate::error::AppError;

/// What went into (and came out of) one run.
#[derive(Debug, Clone, Copy)]
pub struct DebugContext<'a> {
    pub source: &'a LoadedSource,
    pub date_column: Option<&'a str>,
    pub config: &'a AnalysisConfig,
    pub trace: &'a PrepTrace,
    /// The user-facing error, if the run failed.
    pub error: Option<&'a str>,
}

/// Write the bundle into `dir` (created if needed) and return its path.
///
/// Names carry a millisecond timestamp; an existing file is never
/// overwritten, a `_N` suffix is added instead.
pub fn write_debug_bundle(dir: &Path, ctx: &DebugContext<'_>) -> Result<PathBuf, AppError> {
    create_dir_all(dir).map_err(|e| AppError::new(4, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
    let body = render_debug_bundle(ctx);
    let mut n = 0usize;
    loop {
        let name = match n {
            0 => format!("impact_debug_{ts}.md"),
            n => format!("impact_debug_{ts}_{n}.md"),
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(body.as_bytes())
                    .map_err(|e| AppError::new(4, format!("Failed to write debug file: {e}")))?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(AppError::new(4, format!("Failed to create debug file: {e}"))),
        }
    }
}

pub fn render_debug_bundle(ctx: &DebugContext<'_>) -> String {
    let source = ctx.source;
    let config = ctx.config;
    let trace = ctx.trace;
    let mut out = String::new();

    out.push_str("# impact debug bundle\n");
    out.push_str(&format!("- generated: {}\n", Local::now().to_rfc3339()));
    out.push_str(&format!("- input: {}\n", source.path.display()));
    if let Some(sheet) = &source.sheet {
        out.push_str(&format!("- sheet: {sheet}\n"));
    }
    out.push_str(&format!("- skip_rows: {}\n", source.skip_rows));
    out.push_str(&format!(
        "- shape: {} rows x {} columns\n",
        source.table.n_rows(),
        source.table.n_cols()
    ));
    out.push_str(&format!("- columns: {}\n", source.table.headers.join(", ")));
    out.push_str(&format!("- date column: {}\n", ctx.date_column.unwrap_or("-")));
    out.push_str(&format!("- date encoding: {:?}\n", config.date_encoding));
    out.push_str(&format!("- response: {}\n", config.response));
    out.push_str(&format!("- controls: {}\n", fmt_list(&config.controls)));
    out.push_str(&format!(
        "- ordering: {}\n",
        match config.ordering {
            OrderingPolicy::Enforce => "enforced",
            OrderingPolicy::AllowOverlap => "overlap allowed",
        }
    ));
    out.push_str(&format!(
        "- model: {} (draws={}, seed={}, alpha={})\n",
        config.model.fit_method.display_name(),
        config.model.draws,
        config.model.seed,
        config.model.alpha
    ));
    out.push_str(&format!("- outcome: {}\n", ctx.error.unwrap_or("ok")));

    out.push_str("\n## Rows\n");
    out.push_str(&format!("- read: {}\n", trace.report.rows_in));
    out.push_str(&format!("- with a usable date: {}\n", trace.report.rows_dated));
    out.push_str(&format!("- used: {}\n", trace.report.rows_out));
    for (kind, n) in trace.report.counts_by_reason() {
        out.push_str(&format!("- dropped ({kind}): {n}\n"));
    }

    out.push_str("\n## Period boundaries\n");
    match &trace.boundaries {
        Some(b) => {
            out.push_str("| boundary | date |\n| - | - |\n");
            for (boundary, date) in b.named() {
                out.push_str(&format!("| {} | {date} |\n", boundary.label()));
            }
        }
        None => out.push_str("not resolved\n"),
    }

    out.push_str("\n## Checkpoints\n");
    if trace.checkpoints.is_empty() {
        out.push_str("not reached\n");
    } else {
        out.push_str("| checkpoint | result | missing |\n| - | - | - |\n");
        for cp in &trace.checkpoints {
            let missing: Vec<String> = cp
                .missing
                .iter()
                .map(|m| format!("{} ({})", m.date, m.boundary.label()))
                .collect();
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                cp.checkpoint,
                if cp.passed() { "pass" } else { "fail" },
                fmt_list(&missing)
            ));
        }
    }

    out.push_str("\n## Dropped columns\n");
    if trace.report.dropped_columns.is_empty() {
        out.push_str("none\n");
    } else {
        for name in &trace.report.dropped_columns {
            out.push_str(&format!("- {name}\n"));
        }
    }

    out.push_str("\n## Dropped rows\n");
    if trace.report.dropped_rows.is_empty() {
        out.push_str("none\n");
    } else {
        out.push_str("| line | date | reason |\n| - | - | - |\n");
        for row in &trace.report.dropped_rows {
            let date = row.date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
            out.push_str(&format!("| {} | {date} | {} |\n", row.line, row.reason));
        }
    }

    out
}

fn fmt_list(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::CheckpointResult;
    use crate::domain::{
        Boundary, Checkpoint, DateColumnSelection, DateEncoding, MissingBoundary, ModelArgs, PeriodBoundaries,
        PeriodOverrides, RawRow, RawTable,
    };
    use crate::prep::{CleanReport, DropReason, DroppedRow};
    use chrono::NaiveDate;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, m, day).unwrap()
    }

    fn fixture() -> (LoadedSource, AnalysisConfig, PrepTrace) {
        let source = LoadedSource {
            path: PathBuf::from("shop.csv"),
            sheet: None,
            skip_rows: 6,
            table: RawTable {
                headers: vec!["date".to_string(), "sales".to_string(), "visits".to_string()],
                rows: vec![RawRow {
                    line: 8,
                    cells: vec!["2023-01-01".to_string(), "1".to_string(), "2".to_string()],
                }],
            },
        };
        let config = AnalysisConfig {
            date_column: DateColumnSelection::Heuristic,
            date_encoding: DateEncoding::Auto,
            response: "sales".to_string(),
            controls: vec!["visits".to_string()],
            periods: PeriodOverrides::default(),
            ordering: OrderingPolicy::Enforce,
            model: ModelArgs::default(),
            plot: true,
            plot_width: 80,
            plot_height: 12,
            export_table: None,
            export_series: None,
            debug_bundle: None,
        };
        let trace = PrepTrace {
            report: CleanReport {
                rows_in: 90,
                rows_dated: 90,
                rows_out: 89,
                dropped_columns: vec!["Unnamed: 3".to_string()],
                dropped_rows: vec![DroppedRow {
                    line: 39,
                    date: Some(d(2, 1)),
                    reason: DropReason::MissingValue {
                        column: "visits".to_string(),
                    },
                }],
            },
            boundaries: Some(PeriodBoundaries {
                pre_start: d(1, 1),
                pre_end: d(1, 31),
                post_start: d(2, 1),
                post_end: d(3, 31),
            }),
            checkpoints: vec![
                CheckpointResult {
                    checkpoint: Checkpoint::AfterDateParsing,
                    missing: vec![],
                },
                CheckpointResult {
                    checkpoint: Checkpoint::AfterMissingValueDrop,
                    missing: vec![MissingBoundary {
                        boundary: Boundary::PostStart,
                        date: d(2, 1),
                    }],
                },
            ],
        };
        (source, config, trace)
    }

    #[test]
    fn bundle_lists_drops_and_checkpoints() {
        let (source, config, trace) = fixture();
        let txt = render_debug_bundle(&DebugContext {
            source: &source,
            date_column: Some("date"),
            config: &config,
            trace: &trace,
            error: Some("The following dates were removed due to missing values: 2023-02-01 (post-period start)"),
        });

        assert!(txt.contains("- skip_rows: 6\n"));
        assert!(txt.contains("| 39 | 2023-02-01 | missing value in `visits` |\n"));
        assert!(txt.contains("| post-period start | 2023-02-01 |\n"));
        assert!(txt.contains("| 2023-02-01 (post-period start) |\n"));
        assert!(txt.contains("- Unnamed: 3\n"));
        assert!(txt.contains("- outcome: The following dates were removed"));
    }

    #[test]
    fn bundle_file_is_written_into_dir() {
        let (source, config, trace) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("debug");
        let path = write_debug_bundle(
            &target,
            &DebugContext {
                source: &source,
                date_column: None,
                config: &config,
                trace: &trace,
                error: None,
            },
        )
        .unwrap();

        assert!(path.starts_with(&target));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("md"));
        let txt = std::fs::read_to_string(path).unwrap();
        assert!(txt.starts_with("# impact debug bundle\n"));
        assert!(txt.contains("- date column: -\n"));
    }

    #[test]
    fn back_to_back_bundles_get_distinct_files() {
        let (source, config, trace) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let ctx = DebugContext {
            source: &source,
            date_column: Some("date"),
            config: &config,
            trace: &trace,
            error: None,
        };

        let paths: Vec<PathBuf> = (0..3).map(|_| write_debug_bundle(dir.path(), &ctx).unwrap()).collect();
        assert_ne!(paths[0], paths[1]);
        assert_ne!(paths[1], paths[2]);
        assert_ne!(paths[0], paths[2]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
