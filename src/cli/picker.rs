//! Interactive pickers.
//!
//! This is intentionally kept separate from clap parsing:
//! - clap handles structured flags/subcommands
//! - the pickers cover what the user left out on a terminal: the input file,
//!   the sheet, an ambiguous date column, the response column
//!
//! The file picker searches for `*.csv` / `*.xlsx` files under the current
//! working directory.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Default directory recursion depth for finding input files.
const DEFAULT_SEARCH_DEPTH: usize = 4;

const INPUT_EXTENSIONS: [&str; 5] = ["csv", "xlsx", "xlsm", "xls", "ods"];

/// Prompt the user to select an input file from the current directory tree.
///
/// Behavior:
/// - list discovered input files
/// - accept either a number (from the list) or an explicit path
/// - `q` cancels
pub fn prompt_for_input_path() -> Result<PathBuf, AppError> {
    let files = discover_input_files();
    if files.is_empty() {
        return Err(AppError::new(
            2,
            "No .csv or .xlsx files found. Provide one with `impact run -f <file>`.",
        ));
    }

    println!("Found {} input file(s):", files.len());
    for (idx, path) in files.iter().enumerate() {
        println!("{:>3}) {}", idx + 1, pretty_path(path));
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        let Some(answer) = read_answer(
            &mut input,
            &format!("Select a file by number (1-{}) or type a path (q to quit): ", files.len()),
        )?
        else {
            return Err(AppError::new(2, "No input received. Provide a path with `impact run -f <file>`."));
        };

        if answer.eq_ignore_ascii_case("q") {
            return Err(AppError::new(2, "Canceled."));
        }

        if let Ok(choice) = answer.parse::<usize>() {
            if (1..=files.len()).contains(&choice) {
                return validate_input_path(&files[choice - 1]);
            }
            println!("Invalid choice: {choice}. Enter a number between 1 and {}.", files.len());
            continue;
        }

        match validate_input_path(Path::new(&answer)) {
            Ok(path) => return Ok(path),
            Err(err) => println!("{err}"),
        }
    }
}

/// Ask the user to pick one of `options` (by number or by exact name).
pub fn prompt_choice(label: &str, options: &[String]) -> Result<String, AppError> {
    let stdin = io::stdin();
    choose_from(&mut stdin.lock(), label, options)
}

fn choose_from(input: &mut impl BufRead, label: &str, options: &[String]) -> Result<String, AppError> {
    if options.is_empty() {
        return Err(AppError::new(2, format!("No {label} to choose from.")));
    }

    println!("Choose the {label}:");
    for (idx, option) in options.iter().enumerate() {
        println!("{:>3}) {option}", idx + 1);
    }

    loop {
        let Some(answer) = read_answer(input, &format!("{label} (1-{}, q to quit): ", options.len()))? else {
            return Err(AppError::new(2, format!("No {label} selected.")));
        };
        if answer.eq_ignore_ascii_case("q") {
            return Err(AppError::new(2, "Canceled."));
        }
        if let Ok(choice) = answer.parse::<usize>() {
            if (1..=options.len()).contains(&choice) {
                return Ok(options[choice - 1].clone());
            }
        } else if let Some(found) = options.iter().find(|o| **o == answer) {
            return Ok(found.clone());
        }
        println!("Invalid choice: {answer}.");
    }
}

/// Print `prompt` and read one trimmed line; `None` on end of input.
fn read_answer(input: &mut impl BufRead, prompt: &str) -> Result<Option<String>, AppError> {
    print!("{prompt}");
    io::stdout()
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write prompt: {e}")))?;

    let mut line = String::new();
    let bytes = input
        .read_line(&mut line)
        .map_err(|e| AppError::new(2, format!("Failed to read input: {e}")))?;
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Validate the provided path points to a supported input file.
pub fn validate_input_path(path: &Path) -> Result<PathBuf, AppError> {
    if !path.exists() {
        return Err(AppError::new(2, format!("Input file not found: {}", path.display())));
    }
    if path.is_dir() {
        return Err(AppError::new(
            2,
            format!("Expected a file, got a directory: {}", path.display()),
        ));
    }
    if !has_input_extension(path) {
        return Err(AppError::new(
            2,
            format!("Expected a .csv or .xlsx file (got: {}).", path.display()),
        ));
    }

    Ok(path.to_path_buf())
}

/// Discover input files under the current directory (deterministic order).
pub fn discover_input_files() -> Vec<PathBuf> {
    find_input_files(Path::new("."), DEFAULT_SEARCH_DEPTH)
}

fn find_input_files(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut out = Vec::new();
    find_input_files_inner(root, 0, max_depth, &mut out);
    out.sort_by_key(|p| pretty_path(p));
    out
}

fn find_input_files_inner(root: &Path, depth: usize, max_depth: usize, out: &mut Vec<PathBuf>) {
    if depth > max_depth {
        return;
    }

    let Ok(entries) = fs::read_dir(root) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if !should_skip_dir(&path) {
                find_input_files_inner(&path, depth + 1, max_depth, out);
            }
            continue;
        }

        if file_type.is_file() && has_input_extension(&path) {
            out.push(path);
        }
    }
}

fn has_input_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| INPUT_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn should_skip_dir(path: &Path) -> bool {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    matches!(name, ".git" | "target" | "node_modules")
}

fn pretty_path(path: &Path) -> String {
    let stripped = path.strip_prefix("./").unwrap_or(path);
    stripped.display().to_string()
}
