//! CSV / spreadsheet ingest.
//!
//! This module is responsible for turning an uploaded file into a `RawTable`:
//! a header row plus rows of text cells. It does no type interpretation.
//!
//! Design goals:
//! - **Same shape for every format**: CSV and spreadsheet sheets both become a
//!   grid of strings, then go through `table_from_rows`
//! - **Configurable metadata offset**: exports often carry a fixed number of
//!   banner rows before the header (`skip_rows`)
//! - **Stable line numbers**: every row keeps its 1-based source row number so
//!   dropped rows can be reported precisely

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use tracing::{debug, info};

use crate::domain::{RawRow, RawTable};
use crate::error::PrepError;

/// Where and how to read the input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub path: PathBuf,
    /// Spreadsheet sheet name (`None` = first sheet). Ignored for CSV.
    pub sheet: Option<String>,
    /// Leading rows to skip before the header row.
    pub skip_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Spreadsheet,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self, PrepError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(InputFormat::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(InputFormat::Spreadsheet),
            _ => Err(PrepError::Input(format!(
                "Unsupported input '{}': expected .csv or .xlsx (also .xls/.xlsm/.xlsb/.ods).",
                path.display()
            ))),
        }
    }
}

/// Load a file into a `RawTable`.
pub fn load_raw_table(opts: &LoadOptions) -> Result<RawTable, PrepError> {
    let rows = match InputFormat::from_path(&opts.path)? {
        InputFormat::Csv => {
            let file = File::open(&opts.path).map_err(|e| {
                PrepError::Input(format!("Failed to open CSV '{}': {e}", opts.path.display()))
            })?;
            read_csv_rows(file)?
        }
        InputFormat::Spreadsheet => read_sheet_rows(&opts.path, opts.sheet.as_deref())?,
    };

    let table = table_from_rows(rows, opts.skip_rows)?;
    info!(
        path = %opts.path.display(),
        rows = table.n_rows(),
        cols = table.n_cols(),
        skip_rows = opts.skip_rows,
        "loaded table"
    );
    Ok(table)
}

/// Read every CSV record as plain strings (no header interpretation).
///
/// Row `i` of the result is line `i + 1` of the input. The csv reader skips
/// blank lines, so they are put back as empty rows; a quoted field spanning
/// several lines leaves empty rows for its continuation lines.
pub fn read_csv_rows<R: Read>(mut input: R) -> Result<Vec<Vec<String>>, PrepError> {
    let mut bytes = Vec::new();
    input
        .read_to_end(&mut bytes)
        .map_err(|e| PrepError::Input(format!("Failed to read CSV: {e}")))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes.as_slice());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record =
            result.map_err(|e| PrepError::Input(format!("CSV parse error on record {}: {e}", idx + 1)))?;

        if let Some(pos) = record.position() {
            let line = first_line_of_record(&bytes, pos.byte() as usize);
            while rows.len() + 1 < line {
                rows.push(Vec::new());
            }
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// 1-based line on which the record at `offset` starts.
///
/// A record's reported position includes any blank lines the reader skipped
/// before it, so those are stepped over first.
fn first_line_of_record(bytes: &[u8], offset: usize) -> usize {
    let offset = offset.min(bytes.len());
    let start = bytes[offset..]
        .iter()
        .position(|&b| b != b'\n' && b != b'\r')
        .map_or(bytes.len(), |n| offset + n);
    bytes[..start].iter().filter(|&&b| b == b'\n').count() + 1
}

/// List sheet names of a spreadsheet, in workbook order.
pub fn sheet_names(path: &Path) -> Result<Vec<String>, PrepError> {
    let workbook = open_workbook_auto(path)
        .map_err(|e| PrepError::Input(format!("Failed to open spreadsheet '{}': {e}", path.display())))?;
    Ok(workbook.sheet_names())
}

/// Read one sheet as a grid of strings.
pub fn read_sheet_rows(path: &Path, sheet: Option<&str>) -> Result<Vec<Vec<String>>, PrepError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| PrepError::Input(format!("Failed to open spreadsheet '{}': {e}", path.display())))?;

    let names = workbook.sheet_names();
    let sheet = match sheet {
        Some(name) => names
            .iter()
            .find(|n| n.as_str() == name)
            .cloned()
            .ok_or_else(|| {
                PrepError::Input(format!(
                    "Sheet '{name}' not found (available: {}).",
                    names.join(", ")
                ))
            })?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| PrepError::Input(format!("Spreadsheet '{}' has no sheets.", path.display())))?,
    };
    debug!(%sheet, "reading sheet");

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| PrepError::Input(format!("Failed to read sheet '{sheet}': {e}")))?;

    // `rows()` starts at the first used cell; pad leading empty rows so
    // `skip_rows` counts from the top of the sheet like it does for CSV.
    let leading = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let leading_cols = range.start().map(|(_, col)| col as usize).unwrap_or(0);

    let mut rows: Vec<Vec<String>> = vec![Vec::new(); leading];
    for row in range.rows() {
        let mut cells = vec![String::new(); leading_cols];
        cells.extend(row.iter().map(cell_to_string));
        rows.push(cells);
    }
    Ok(rows)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) if ts.time() == chrono::NaiveTime::MIN => ts.date().format("%Y-%m-%d").to_string(),
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => String::new(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Build a `RawTable` from a grid: skip `skip_rows`, take the next row as the
/// header, and everything after it as data.
///
/// - fully blank data rows are ignored
/// - ragged rows are padded (or the header is widened) so every row has the
///   same number of cells
/// - header names are trimmed, a UTF-8 BOM is stripped, and duplicate names
///   get a `.1`, `.2`, ... suffix
pub fn table_from_rows(rows: Vec<Vec<String>>, skip_rows: usize) -> Result<RawTable, PrepError> {
    let mut iter = rows.into_iter().enumerate().skip(skip_rows);

    let Some((_, header_row)) = iter.next() else {
        return Err(PrepError::Input(format!(
            "No header row found after skipping {skip_rows} row(s)."
        )));
    };

    let data: Vec<RawRow> = iter
        .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()))
        .map(|(idx, cells)| RawRow { line: idx + 1, cells })
        .collect();

    let width = data
        .iter()
        .map(|r| r.cells.len())
        .chain(std::iter::once(header_row.len()))
        .max()
        .unwrap_or(0);

    let mut headers: Vec<String> = header_row.iter().map(|h| normalize_header_name(h)).collect();
    headers.resize(width, String::new());
    let headers = dedupe_headers(headers);

    let rows = data
        .into_iter()
        .map(|mut r| {
            r.cells.resize(width, String::new());
            r
        })
        .collect();

    Ok(RawTable { headers, rows })
}

fn normalize_header_name(name: &str) -> String {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on the
    // first header. If we don't strip it, a "date" header would not be found.
    name.trim_start_matches('\u{feff}').trim().to_string()
}

fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(headers.len());
    for name in headers {
        if name.is_empty() || !out.contains(&name) {
            out.push(name);
            continue;
        }
        let mut n = 1;
        let renamed = loop {
            let candidate = format!("{name}.{n}");
            if !out.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        out.push(renamed);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn metadata_rows_are_skipped_without_shifting_data() {
        let rows = grid(&[
            &["Report: weekly export"],
            &["Account", "12345"],
            &[""],
            &["Generated", "2023-04-01"],
            &["Filters", "none"],
            &["Units", "EUR"],
            &["Date", "Sales", "Visits"],
            &["2023-01-01", "100", "10"],
            &["2023-01-02", "110", "11"],
        ]);

        let table = table_from_rows(rows, 6).unwrap();
        assert_eq!(table.headers, vec!["Date", "Sales", "Visits"]);
        assert_eq!(table.rows[0].cells, vec!["2023-01-01", "100", "10"]);
        assert_eq!(table.rows[0].line, 8);
        assert_eq!(table.n_rows(), 2);
    }

    #[test]
    fn ragged_rows_are_padded_and_headers_deduped() {
        let rows = grid(&[
            &["\u{feff}date", "y", "y"],
            &["2023-01-01", "1"],
            &["", "", ""],
            &["2023-01-02", "2", "3", "extra"],
        ]);
        let table = table_from_rows(rows, 0).unwrap();
        assert_eq!(table.headers, vec!["date", "y", "y.1", ""]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells, vec!["2023-01-01", "1", "", ""]);
        assert_eq!(table.rows[1].line, 4);
    }

    #[test]
    fn skipping_past_the_end_is_an_input_error() {
        let err = table_from_rows(grid(&[&["a"], &["b"]]), 2).unwrap_err();
        assert!(matches!(err, PrepError::Input(_)));
    }

    #[test]
    fn csv_with_metadata_banner_loads() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "# exported by store admin").unwrap();
        writeln!(file, "# range: Q1").unwrap();
        writeln!(file, "order_date,revenue").unwrap();
        writeln!(file, "2023-01-01, 5.5").unwrap();
        file.flush().unwrap();

        let table = load_raw_table(&LoadOptions {
            path: file.path().to_path_buf(),
            sheet: None,
            skip_rows: 2,
        })
        .unwrap();
        assert_eq!(table.headers, vec!["order_date", "revenue"]);
        assert_eq!(table.rows[0].cells, vec!["2023-01-01", "5.5"]);
        assert_eq!(table.rows[0].line, 4);
    }

    #[test]
    fn blank_csv_lines_count_towards_skip_rows() {
        let rows = read_csv_rows("banner\n\nwhen,y\n2023-01-01,1\n".as_bytes()).unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[1].iter().all(|c| c.is_empty()));
        assert_eq!(rows[2], vec!["when", "y"]);

        let table = table_from_rows(rows, 2).unwrap();
        assert_eq!(table.headers, vec!["when", "y"]);
        assert_eq!(table.rows[0].line, 4);
    }

    #[test]
    fn blank_line_before_header_keeps_header_in_place() {
        let input = "Report: weekly export\nAccount,12345\nGenerated,2023-04-01\nFilters,none\nUnits,EUR\n\nDate,Sales\n2023-01-01,100\n2023-01-02,110\n";
        let table = table_from_rows(read_csv_rows(input.as_bytes()).unwrap(), 6).unwrap();
        assert_eq!(table.headers, vec!["Date", "Sales"]);
        assert_eq!(table.rows[0].cells, vec!["2023-01-01", "100"]);
        assert_eq!(table.rows[0].line, 8);
        assert_eq!(table.n_rows(), 2);
    }

    #[test]
    fn crlf_and_repeated_blank_lines_keep_line_numbers() {
        let rows = read_csv_rows("a\r\n\r\n\r\nb,c\r\n1,2\r\n".as_bytes()).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], vec!["a"]);
        assert!(rows[1].is_empty() && rows[2].is_empty());
        assert_eq!(rows[3], vec!["b", "c"]);
        assert_eq!(rows[4], vec!["1", "2"]);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = InputFormat::from_path(Path::new("data.parquet")).unwrap_err();
        assert!(matches!(err, PrepError::Input(_)));
        assert_eq!(InputFormat::from_path(Path::new("DATA.XLSX")).unwrap(), InputFormat::Spreadsheet);
    }

    enum Cell {
        Text(&'static str),
        Num(f64),
        Date(chrono::NaiveDate),
    }

    fn ymd(y: i32, m: u32, d: u32) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// One worksheet part; `(row, col)` are 0-based.
    fn sheet_xml(cells: &[(u32, u32, Cell)]) -> String {
        let epoch = ymd(1899, 12, 30);
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        let mut current = None;
        for (row, col, cell) in cells {
            if current != Some(*row) {
                if current.is_some() {
                    xml.push_str("</row>");
                }
                xml.push_str(&format!(r#"<row r="{}">"#, row + 1));
                current = Some(*row);
            }
            let r = format!("{}{}", (b'A' + *col as u8) as char, row + 1);
            match cell {
                Cell::Text(t) => xml.push_str(&format!(r#"<c r="{r}" t="inlineStr"><is><t>{t}</t></is></c>"#)),
                Cell::Num(v) => xml.push_str(&format!(r#"<c r="{r}"><v>{v}</v></c>"#)),
                Cell::Date(d) => {
                    let serial = (*d - epoch).num_days();
                    xml.push_str(&format!(r#"<c r="{r}" s="1"><v>{serial}</v></c>"#));
                }
            }
        }
        if current.is_some() {
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");
        xml
    }

    fn write_xlsx(path: &Path, sheets: &[(&str, String)]) {
        use zip::write::SimpleFileOptions;

        let ns = "http://schemas.openxmlformats.org";
        let mut workbook = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="{ns}/spreadsheetml/2006/main" xmlns:r="{ns}/officeDocument/2006/relationships"><sheets>"#
        );
        let mut rels = format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{ns}/package/2006/relationships">"#);
        let mut types = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="{ns}/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#
        );
        for (i, (name, _)) in sheets.iter().enumerate() {
            let n = i + 1;
            workbook.push_str(&format!(r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="{ns}/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
            types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
        }
        workbook.push_str("</sheets></workbook>");
        rels.push_str("</Relationships>");
        types.push_str("</Types>");

        // Style 1 is the built-in short date format (numFmtId 14).
        let styles = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><styleSheet xmlns="{ns}/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/></cellXfs></styleSheet>"#
        );
        let root_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{ns}/package/2006/relationships"><Relationship Id="rId1" Type="{ns}/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
        );

        let mut parts: Vec<(String, String)> = vec![
            ("[Content_Types].xml".to_string(), types),
            ("_rels/.rels".to_string(), root_rels),
            ("xl/workbook.xml".to_string(), workbook),
            ("xl/_rels/workbook.xml.rels".to_string(), rels),
            ("xl/styles.xml".to_string(), styles),
        ];
        for (i, (_, xml)) in sheets.iter().enumerate() {
            parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), xml.clone()));
        }

        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, body) in parts {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn fixture_workbook(dir: &Path) -> PathBuf {
        use Cell::*;

        let export = sheet_xml(&[
            (0, 0, Text("Report: weekly export")),
            (1, 0, Text("Account")),
            (1, 1, Num(12345.0)),
            // row 2 left blank
            (3, 0, Text("Generated")),
            (3, 1, Date(ymd(2023, 4, 1))),
            (4, 0, Text("Filters")),
            (4, 1, Text("none")),
            (5, 0, Text("Units")),
            (5, 1, Text("EUR")),
            (6, 0, Text("Date")),
            (6, 1, Text("Sales")),
            (6, 2, Text("Code")),
            (7, 0, Date(ymd(2023, 1, 1))),
            (7, 1, Num(100.0)),
            (7, 2, Num(20230101.0)),
            (8, 0, Date(ymd(2023, 1, 2))),
            (8, 1, Num(110.5)),
            (8, 2, Num(20230102.0)),
        ]);
        let offset = sheet_xml(&[
            (2, 1, Text("when")),
            (2, 2, Text("y")),
            (3, 1, Date(ymd(2023, 1, 5))),
            (3, 2, Num(7.0)),
        ]);
        let notes = sheet_xml(&[(0, 0, Text("see Export"))]);

        let path = dir.join("book.xlsx");
        write_xlsx(&path, &[("Notes", notes), ("Export", export), ("Offset", offset)]);
        path
    }

    #[test]
    fn xlsx_with_six_banner_rows_aligns_header_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_workbook(dir.path());

        assert_eq!(sheet_names(&path).unwrap(), vec!["Notes", "Export", "Offset"]);

        let table = load_raw_table(&LoadOptions {
            path: path.clone(),
            sheet: Some("Export".to_string()),
            skip_rows: 6,
        })
        .unwrap();
        assert_eq!(table.headers, vec!["Date", "Sales", "Code"]);
        assert_eq!(table.rows[0].cells, vec!["2023-01-01", "100", "20230101"]);
        assert_eq!(table.rows[1].cells, vec!["2023-01-02", "110.5", "20230102"]);
        assert_eq!(table.rows[0].line, 8);

        let (clean, _) = crate::prep::clean_table(
            &table,
            "Date",
            crate::domain::DateEncoding::Auto,
            "Sales",
            &["Code".to_string()],
        )
        .unwrap();
        assert_eq!(clean.index, vec![ymd(2023, 1, 1), ymd(2023, 1, 2)]);
    }

    #[test]
    fn xlsx_sheet_selection_and_leading_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_workbook(dir.path());

        let first = load_raw_table(&LoadOptions {
            path: path.clone(),
            sheet: None,
            skip_rows: 0,
        })
        .unwrap();
        assert_eq!(first.headers, vec!["see Export"]);
        assert_eq!(first.n_rows(), 0);

        // Data starts at B3: two empty rows and one empty column are kept.
        let offset = load_raw_table(&LoadOptions {
            path: path.clone(),
            sheet: Some("Offset".to_string()),
            skip_rows: 2,
        })
        .unwrap();
        assert_eq!(offset.headers, vec!["", "when", "y"]);
        assert_eq!(offset.rows[0].cells, vec!["", "2023-01-05", "7"]);
        assert_eq!(offset.rows[0].line, 4);

        let err = load_raw_table(&LoadOptions {
            path,
            sheet: Some("Missing".to_string()),
            skip_rows: 0,
        })
        .unwrap_err();
        assert!(matches!(err, PrepError::Input(msg) if msg.contains("Notes, Export, Offset")));
    }
}
