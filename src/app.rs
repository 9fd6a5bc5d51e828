//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments
//! - loads the table into a session (prompting for what is missing on a terminal)
//! - runs the preparation pipeline and the estimator
//! - prints reports/plots and writes optional exports

use std::io::{self, IsTerminal};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::picker::{prompt_choice, prompt_for_input_path};
use crate::cli::{Command, InputArgs, InspectArgs, PlotArgs, RunArgs, SampleArgs};
use crate::data::{SampleConfig, generate_sample};
use crate::debug::{DebugContext, write_debug_bundle};
use crate::domain::{
    AnalysisConfig, DateColumnChoice, DateColumnSelection, ModelArgs, OrderingPolicy, PeriodOverrides, RawTable,
};
use crate::error::{AppError, PrepError};
use crate::estimate::{ImpactOutcome, RegressionEstimator};
use crate::io::ingest::{InputFormat, LoadOptions, sheet_names};
use crate::prep::{CleanReport, index_by_date, is_structurally_empty, resolve_date_column};

pub mod pipeline;
pub mod session;

use pipeline::PrepTrace;
use session::Session;

/// Dropped rows listed in the terminal summary (the debug bundle has all of them).
const DROPPED_ROWS_SHOWN: usize = 10;

/// Entry point for the `impact` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    // We want `impact -f data.csv ...` to behave like `impact run -f data.csv ...`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    let interactive = io::stdin().is_terminal();

    match cli.command {
        Command::Run(args) => {
            let out = run_command(&args, interactive)?;
            print!("{out}");
            Ok(())
        }
        Command::Inspect(args) => {
            let out = inspect_command(&args, interactive)?;
            print!("{out}");
            Ok(())
        }
        Command::Sample(args) => {
            let out = sample_command(&args)?;
            print!("{out}");
            Ok(())
        }
        Command::Plot(args) => {
            let out = plot_command(&args)?;
            print!("{out}");
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays the report. `RUST_LOG` overrides the default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second init (tests, embedding) is not an error worth surfacing.
    let _ = fmt().with_env_filter(filter).with_writer(io::stderr).try_init();
}

/// Full analysis; returns everything that should go to stdout.
pub fn run_command(args: &RunArgs, interactive: bool) -> Result<String, AppError> {
    let mut session = Session::new();
    session.load(&load_options(&args.input, interactive)?)?;
    let source = session
        .source()
        .ok_or_else(|| AppError::new(2, "No table loaded."))?;
    let raw = &source.table;

    let selection = date_column_selection(&args.input);
    let date_column = choose_date_column(raw, &selection, interactive)?;
    let response = choose_response(raw, &date_column, args.response.as_deref(), interactive)?;
    let config = analysis_config(args, selection, response);

    let mut trace = PrepTrace::default();
    let result = pipeline::analyze(raw, &date_column, &config, &RegressionEstimator, &mut trace);

    if let Some(dir) = &config.debug_bundle {
        let error = result.as_ref().err().map(ToString::to_string);
        let path = write_debug_bundle(
            dir,
            &DebugContext {
                source,
                date_column: Some(&date_column),
                config: &config,
                trace: &trace,
                error: error.as_deref(),
            },
        )?;
        eprintln!("Debug bundle: {}", path.display());
    }

    let (prepared, analysis) = result?;

    let mut out = String::new();
    out.push_str(&crate::report::format_prep_summary(&trace.report, &prepared.clean, &date_column));
    if !trace.report.dropped_rows.is_empty() {
        out.push_str(&crate::report::format_dropped_rows(&trace.report, DROPPED_ROWS_SHOWN));
    }
    out.push('\n');
    out.push_str(&analysis.summary());
    out.push('\n');
    out.push_str(&analysis.report());

    if config.plot {
        match analysis.plot(config.plot_width, config.plot_height) {
            Some(plot) => {
                out.push('\n');
                out.push_str(&plot);
            }
            None => warn!("not enough dates to plot"),
        }
    }

    // Optional exports.
    if let Some(path) = &config.export_table {
        crate::io::export::write_clean_table_csv(path, &prepared.clean, &date_column)?;
        info!(path = %path.display(), "wrote clean table");
    }
    if let Some(path) = &config.export_series {
        crate::io::series::write_series_json(path, &analysis.to_series_file())?;
        info!(path = %path.display(), "wrote impact series");
    }

    Ok(out)
}

/// Show how a table is read without running the estimator.
pub fn inspect_command(args: &InspectArgs, interactive: bool) -> Result<String, AppError> {
    let mut session = Session::new();
    session.load(&load_options(&args.input, interactive)?)?;
    let raw = session.table()?;

    let mut out = String::new();
    out.push_str(&format!("Columns ({}):\n", raw.n_cols()));
    for (idx, name) in raw.headers.iter().enumerate() {
        let shown = if name.is_empty() { "<unnamed>" } else { name.as_str() };
        out.push_str(&format!("{:>3}) {shown}\n", idx + 1));
    }
    out.push_str(&format!("\nFirst rows ({} total):\n", raw.n_rows()));
    out.push_str(&crate::report::format_raw_preview(raw, args.rows));

    let selection = date_column_selection(&args.input);
    let date_column = choose_date_column(raw, &selection, interactive)?;
    let mut report = CleanReport::default();
    let dated = index_by_date(raw, &date_column, args.input.date_encoding, &mut report)?;

    out.push_str(&format!("\nDate column: {date_column}\n"));
    if let (Some(first), Some(last)) = (dated.first_date(), dated.last_date()) {
        out.push_str(&format!("Index: {first} .. {last} ({} dated rows)\n", dated.rows.len()));
    }
    if !report.dropped_columns.is_empty() {
        out.push_str(&format!("Dropped empty columns: {}\n", report.dropped_columns.join(", ")));
    }
    out.push_str(&crate::report::format_dropped_rows(&report, DROPPED_ROWS_SHOWN));
    out.push('\n');
    out.push_str(&crate::report::format_dated_preview(&dated, args.rows));
    Ok(out)
}

/// Write a synthetic dataset and tell the user how to analyze it.
pub fn sample_command(args: &SampleArgs) -> Result<String, AppError> {
    let config = SampleConfig {
        start: args.start,
        days: args.days,
        intervention: args.intervention,
        lift: args.lift,
        seed: args.seed,
        yyyymmdd: args.yyyymmdd,
        missing_prob: args.missing_prob,
        metadata_rows: args.metadata_rows,
    };
    let sample = generate_sample(&config)?;
    crate::io::export::write_raw_csv(&args.out, &sample.table, &sample.metadata)?;
    info!(path = %args.out.display(), rows = sample.table.n_rows(), "wrote sample");

    Ok(format!(
        "Wrote {} rows to {}\nTry: impact run -f {} --skip-rows {} --response sales -x visits -x ad_spend --intervention {}\n",
        sample.table.n_rows(),
        args.out.display(),
        args.out.display(),
        args.metadata_rows,
        sample.intervention
    ))
}

/// Re-render a saved impact series.
pub fn plot_command(args: &PlotArgs) -> Result<String, AppError> {
    let series = crate::io::series::read_series_json(&args.series)?;

    let mut out = format!(
        "Response: {} | pre-period {} | post-period {}\n\n",
        series.response, series.periods.pre, series.periods.post
    );
    out.push_str(&crate::report::format_summary(&series.summary, series.fit_method));
    out.push('\n');
    match crate::plot::render_impact_plot(&series.points, args.width, args.height) {
        Some(plot) => out.push_str(&plot),
        None => out.push_str("Not enough dates to plot.\n"),
    }
    Ok(out)
}

fn load_options(input: &InputArgs, interactive: bool) -> Result<LoadOptions, AppError> {
    let path = match &input.file {
        Some(path) => path.clone(),
        None if interactive => prompt_for_input_path()?,
        None => return Err(AppError::new(2, "No input file. Pass one with --file.")),
    };

    let sheet = match (&input.sheet, InputFormat::from_path(&path)?) {
        (Some(sheet), _) => Some(sheet.clone()),
        (None, InputFormat::Spreadsheet) if interactive => {
            let names = sheet_names(&path)?;
            if names.len() > 1 {
                Some(prompt_choice("sheet", &names)?)
            } else {
                None
            }
        }
        (None, _) => None,
    };

    Ok(LoadOptions {
        path,
        sheet,
        skip_rows: input.skip_rows,
    })
}

fn date_column_selection(input: &InputArgs) -> DateColumnSelection {
    match &input.date_column {
        Some(name) => DateColumnSelection::Explicit(name.clone()),
        None => DateColumnSelection::Heuristic,
    }
}

/// Resolve the date column; several candidates are put to the user, never first-match.
fn choose_date_column(
    raw: &RawTable,
    selection: &DateColumnSelection,
    interactive: bool,
) -> Result<String, AppError> {
    match resolve_date_column(raw, selection)? {
        DateColumnChoice::Resolved(name) => Ok(name),
        DateColumnChoice::Ambiguous(candidates) if interactive => prompt_choice("date column", &candidates),
        DateColumnChoice::Ambiguous(candidates) => Err(PrepError::AmbiguousDateColumn { candidates }.into()),
    }
}

fn choose_response(
    raw: &RawTable,
    date_column: &str,
    response: Option<&str>,
    interactive: bool,
) -> Result<String, AppError> {
    if let Some(name) = response {
        return Ok(name.to_string());
    }
    let options = response_candidates(raw, date_column);
    if interactive {
        return prompt_choice("response column", &options);
    }
    Err(PrepError::InvalidSelection(format!(
        "no response column given; pass --response (columns: {})",
        options.join(", ")
    ))
    .into())
}

/// Columns that could hold the response: everything but the date column and
/// the columns cleaning would drop as structurally empty.
fn response_candidates(raw: &RawTable, date_column: &str) -> Vec<String> {
    raw.headers
        .iter()
        .enumerate()
        .filter(|(idx, h)| h.as_str() != date_column && !is_structurally_empty(raw, *idx, h))
        .map(|(_, h)| h.clone())
        .collect()
}

fn analysis_config(args: &RunArgs, date_column: DateColumnSelection, response: String) -> AnalysisConfig {
    AnalysisConfig {
        date_column,
        date_encoding: args.input.date_encoding,
        response,
        controls: args.controls.clone(),
        periods: PeriodOverrides {
            intervention: args.intervention,
            pre_start: args.pre_start,
            pre_end: args.pre_end,
            post_start: args.post_start,
            post_end: args.post_end,
        },
        ordering: if args.allow_overlap {
            OrderingPolicy::AllowOverlap
        } else {
            OrderingPolicy::Enforce
        },
        model: ModelArgs {
            fit_method: args.fit_method,
            draws: args.draws,
            seed: args.seed,
            alpha: args.alpha,
        },
        plot: !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_table: args.export_table.clone(),
        export_series: args.export_series.clone(),
        debug_bundle: args.debug_bundle.clone(),
    }
}

/// Rewrite argv so `impact` defaults to `impact run`.
///
/// Rules:
/// - `impact`                      -> `impact run`
/// - `impact -f data.csv ...`      -> `impact run -f data.csv ...`
/// - `impact --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("run".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "run" | "inspect" | "sample" | "plot");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "run flags".
    if arg1.starts_with('-') {
        argv.insert(1, "run".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::RawRow;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn run_args(args: &[&str]) -> RunArgs {
        let mut full = vec!["impact", "run"];
        full.extend_from_slice(args);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Run(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    fn write_sample(dir: &std::path::Path, extra: &[&str]) -> std::path::PathBuf {
        let out = dir.join("demo.csv");
        let mut full = vec!["impact", "sample", "--out", out.to_str().unwrap()];
        full.extend_from_slice(extra);
        let Command::Sample(args) = Cli::try_parse_from(full).unwrap().command else {
            panic!("expected sample");
        };
        sample_command(&args).unwrap();
        out
    }

    #[test]
    fn rewrite_defaults_to_run() {
        assert_eq!(rewrite_args(argv(&["impact"])), argv(&["impact", "run"]));
        assert_eq!(
            rewrite_args(argv(&["impact", "-f", "a.csv"])),
            argv(&["impact", "run", "-f", "a.csv"])
        );
        assert_eq!(rewrite_args(argv(&["impact", "--help"])), argv(&["impact", "--help"]));
        assert_eq!(
            rewrite_args(argv(&["impact", "inspect", "-f", "a.csv"])),
            argv(&["impact", "inspect", "-f", "a.csv"])
        );
    }

    #[test]
    fn run_flags_become_analysis_config() {
        let args = run_args(&["--response", "sales", "--allow-overlap", "--no-plot", "--alpha", "0.1"]);
        let config = analysis_config(&args, DateColumnSelection::Heuristic, "sales".to_string());
        assert_eq!(config.ordering, OrderingPolicy::AllowOverlap);
        assert!(!config.plot);
        assert_eq!(config.model.alpha, 0.1);
        assert_eq!(config.periods, PeriodOverrides::default());
    }

    #[test]
    fn non_interactive_run_needs_file_and_response() {
        let err = run_command(&run_args(&[]), false).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let dir = tempfile::tempdir().unwrap();
        let file = write_sample(dir.path(), &[]);
        let err = run_command(&run_args(&["-f", file.to_str().unwrap()]), false).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("--response"));
    }

    #[test]
    fn ambiguous_date_column_is_not_guessed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("two_dates.csv");
        std::fs::write(&file, "order_date,ship_date,y\n2023-01-01,2023-01-03,1\n").unwrap();

        let err = run_command(&run_args(&["-f", file.to_str().unwrap(), "-y", "y"]), false).unwrap_err();
        assert!(err.to_string().contains("order_date, ship_date"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn sample_round_trip_through_run_with_exports() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_sample(dir.path(), &["--metadata-rows", "6", "--yyyymmdd"]);
        let table_out = dir.path().join("clean.csv");
        let series_out = dir.path().join("series.json");
        let debug_dir = dir.path().join("debug");

        let out = run_command(
            &run_args(&[
                "-f",
                file.to_str().unwrap(),
                "--skip-rows",
                "6",
                "-y",
                "sales",
                "-x",
                "visits",
                "-x",
                "ad_spend",
                "--intervention",
                "2023-03-26",
                "--width",
                "40",
                "--height",
                "6",
                "--export-table",
                table_out.to_str().unwrap(),
                "--export-series",
                series_out.to_str().unwrap(),
                "--debug-bundle",
                debug_dir.to_str().unwrap(),
            ]),
            false,
        )
        .unwrap();

        assert!(out.contains("Rows: read=120 | dated=120 | used=120"));
        assert!(out.contains("Absolute effect (s.d.)"));
        assert!(out.contains("Analysis report"));
        assert!(out.contains("Pointwise effect"));

        let clean = std::fs::read_to_string(&table_out).unwrap();
        assert!(clean.starts_with("date,sales,visits,ad_spend\n2023-01-01,"));

        let plot_out = plot_command(&PlotArgs {
            series: series_out,
            width: 40,
            height: 6,
        })
        .unwrap();
        assert!(plot_out.contains("Response: sales | pre-period [2023-01-01, 2023-03-25]"));

        assert_eq!(std::fs::read_dir(&debug_dir).unwrap().count(), 1);
    }

    #[test]
    fn failed_run_still_writes_debug_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_sample(dir.path(), &[]);
        let debug_dir = dir.path().join("debug");

        let err = run_command(
            &run_args(&[
                "-f",
                file.to_str().unwrap(),
                "-y",
                "sales",
                "--pre-end",
                "2023-03-20",
                "--post-start",
                "2023-03-26",
                "--post-end",
                "2030-01-01",
                "--debug-bundle",
                debug_dir.to_str().unwrap(),
            ]),
            false,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("2030-01-01 (post-period end)"));

        let entry = std::fs::read_dir(&debug_dir).unwrap().next().unwrap().unwrap();
        let txt = std::fs::read_to_string(entry.path()).unwrap();
        assert!(txt.contains("| after date parsing | fail | 2030-01-01 (post-period end) |"));
    }

    #[test]
    fn inspect_lists_columns_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_sample(dir.path(), &["--days", "10", "--intervention", "2023-01-08"]);
        let Command::Inspect(args) =
            Cli::try_parse_from(["impact", "inspect", "-f", file.to_str().unwrap(), "-n", "3"])
                .unwrap()
                .command
        else {
            panic!("expected inspect");
        };

        let out = inspect_command(&args, false).unwrap();
        assert!(out.contains("  1) date\n"));
        assert!(out.contains("Date column: date\n"));
        assert!(out.contains("Index: 2023-01-01 .. 2023-01-10 (10 dated rows)\n"));
    }

    #[test]
    fn response_choices_skip_date_and_empty_columns() {
        let raw = RawTable {
            headers: ["date", "sales", "Unnamed: 2", "", "notes", "visits"].map(String::from).to_vec(),
            rows: vec![RawRow {
                line: 2,
                cells: ["2023-01-01", "1", "", "", " ", "2"].map(String::from).to_vec(),
            }],
        };
        assert_eq!(response_candidates(&raw, "date"), vec!["sales", "visits"]);
    }
}
