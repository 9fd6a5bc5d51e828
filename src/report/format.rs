//! Formatted terminal output: preparation summary, effect summary, prose report.
//!
//! We keep formatting code in one place so:
//! - the estimation code stays clean and testable
//! - output changes are localized (important for snapshot tests)

use crate::domain::{CleanTable, EffectSummary, Estimate, FitMethod, RawTable};
use crate::estimate::ImpactAnalysis;
use crate::prep::{CleanReport, DatedTable};

const LABEL_WIDTH: usize = 26;
const VALUE_WIDTH: usize = 22;

/// Summary of what data preparation kept and dropped.
pub fn format_prep_summary(report: &CleanReport, table: &CleanTable, date_column: &str) -> String {
    let mut out = String::new();

    out.push_str("=== impact - Counterfactual Impact Analysis ===\n");
    out.push_str(&format!("Date column: {date_column}\n"));
    out.push_str(&format!("Response: {}\n", table.response().name));
    if !table.controls().is_empty() {
        let names: Vec<&str> = table.controls().iter().map(|s| s.name.as_str()).collect();
        out.push_str(&format!("Controls: {}\n", names.join(", ")));
    }
    out.push_str(&format!(
        "Rows: read={} | dated={} | used={}\n",
        report.rows_in, report.rows_dated, report.rows_out
    ));
    if let (Some(first), Some(last)) = (table.first_date(), table.last_date()) {
        out.push_str(&format!("Index: {first} .. {last}\n"));
    }
    if !report.dropped_columns.is_empty() {
        out.push_str(&format!("Dropped empty columns: {}\n", report.dropped_columns.join(", ")));
    }
    let counts = report.counts_by_reason();
    if !counts.is_empty() {
        let parts: Vec<String> = counts.iter().map(|(kind, n)| format!("{n} {kind}")).collect();
        out.push_str(&format!("Dropped rows: {}\n", parts.join(", ")));
    }

    out
}

/// List dropped rows (first `limit`), one per line.
pub fn format_dropped_rows(report: &CleanReport, limit: usize) -> String {
    let mut out = String::new();
    for row in report.dropped_rows.iter().take(limit) {
        out.push_str(&format!("  line {:>5}: {}\n", row.line, row.reason));
    }
    if report.dropped_rows.len() > limit {
        out.push_str(&format!("  ... {} more\n", report.dropped_rows.len() - limit));
    }
    out
}

/// Tabular summary of the post-period effect.
pub fn format_summary(summary: &EffectSummary, method: FitMethod) -> String {
    let ci = ci_label(summary.alpha);
    let mut out = String::new();

    out.push_str(&format!("Counterfactual inference (fit method: {})\n\n", method.display_name()));
    out.push_str(&row("", "Average", "Cumulative"));
    out.push_str(&row(
        "Actual",
        &fmt_num(summary.actual.average),
        &fmt_num(summary.actual.cumulative),
    ));
    out.push_str(&row(
        "Prediction (s.d.)",
        &fmt_with_sd(&summary.predicted.average),
        &fmt_with_sd(&summary.predicted.cumulative),
    ));
    out.push_str(&row(&ci, &fmt_ci(&summary.predicted.average), &fmt_ci(&summary.predicted.cumulative)));
    out.push('\n');
    out.push_str(&row(
        "Absolute effect (s.d.)",
        &fmt_with_sd(&summary.absolute.average),
        &fmt_with_sd(&summary.absolute.cumulative),
    ));
    out.push_str(&row(&ci, &fmt_ci(&summary.absolute.average), &fmt_ci(&summary.absolute.cumulative)));
    out.push('\n');
    out.push_str(&row(
        "Relative effect (s.d.)",
        &fmt_pct_with_sd(&summary.relative.average),
        &fmt_pct_with_sd(&summary.relative.cumulative),
    ));
    out.push_str(&row(
        &ci,
        &fmt_pct_ci(&summary.relative.average),
        &fmt_pct_ci(&summary.relative.cumulative),
    ));
    out.push('\n');
    out.push_str(&format!("Tail-area probability p: {:.3}\n", summary.p_value));
    out.push_str(&format!(
        "Probability of a causal effect: {:.1}%\n",
        (1.0 - summary.p_value) * 100.0
    ));

    out
}

/// Prose report of the analysis.
pub fn format_report(analysis: &ImpactAnalysis) -> String {
    let s = &analysis.summary;
    let ci = ci_label(s.alpha);
    let level = ci.trim_end_matches(" CI");
    let post = analysis.periods.post;
    let response = &analysis.response;
    let abs = &s.absolute.average;
    let significant = abs.lower > 0.0 || abs.upper < 0.0;

    let mut out = String::new();
    out.push_str("Analysis report\n\n");

    out.push_str(&format!(
        "During the post-intervention period {post}, the response variable `{response}` had an average value of approx. {}. ",
        fmt_num(s.actual.average)
    ));
    out.push_str(&format!(
        "In the absence of an intervention, we would have expected an average response of {}. ",
        fmt_num(s.predicted.average.value)
    ));
    out.push_str(&format!(
        "The {level} interval of this counterfactual prediction is {}. ",
        fmt_ci(&s.predicted.average)
    ));
    out.push_str(&format!(
        "Subtracting this prediction from the observed response yields an estimate of the effect the intervention had on the response: {} with a {level} interval of {}.\n\n",
        fmt_num(abs.value),
        fmt_ci(abs)
    ));

    out.push_str(&format!(
        "Summing up the individual data points during the post-intervention period, the response had an overall value of {}. ",
        fmt_num(s.actual.cumulative)
    ));
    out.push_str(&format!(
        "Had the intervention not taken place, we would have expected a sum of {} {}.\n\n",
        fmt_num(s.predicted.cumulative.value),
        fmt_ci(&s.predicted.cumulative)
    ));

    let direction = if s.relative.average.value >= 0.0 { "an increase" } else { "a decrease" };
    out.push_str(&format!(
        "In relative terms, the response showed {direction} of {}. The {level} interval of this percentage is {}.\n\n",
        fmt_pct_signed(s.relative.average.value),
        fmt_pct_ci(&s.relative.average)
    ));

    if significant {
        let sign = if abs.value >= 0.0 { "positive" } else { "negative" };
        out.push_str(&format!(
            "The {sign} effect observed during the intervention period is statistically significant: the {level} interval of the average effect excludes zero. "
        ));
    } else {
        out.push_str(&format!(
            "The {level} interval of the average effect includes zero, so the effect observed during the intervention period is not statistically significant. "
        ));
    }
    out.push_str(&format!(
        "The probability of obtaining an effect this large by chance is p = {:.3}.\n\n",
        s.p_value
    ));

    out.push_str(&format!(
        "Model: linear counterfactual fitted on {} pre-period observations (pre-period {}), {} post-period observations.\n",
        s.n_pre, analysis.periods.pre, s.n_post
    ));
    for (name, beta) in &analysis.coefficients {
        out.push_str(&format!("- {name}: {beta:.6}\n"));
    }
    out.push_str(&format!("- residual s.d.: {:.6}\n", analysis.residual_sd));
    if analysis.model.fit_method == FitMethod::Hmc {
        out.push_str(&format!(
            "- sampling draws: {} used of {} (seed {})\n",
            analysis.draws_used, analysis.model.draws, analysis.model.seed
        ));
    }

    out
}

/// First `n` rows of a raw table (used by `impact inspect`).
pub fn format_raw_preview(table: &RawTable, n: usize) -> String {
    let mut out = String::new();
    let headers: Vec<String> = table.headers.iter().map(|h| truncate(h, 14)).collect();
    out.push_str(join_cells(&headers).trim_end());
    out.push('\n');
    for row in table.rows.iter().take(n) {
        let cells: Vec<String> = row.cells.iter().map(|c| truncate(c, 14)).collect();
        out.push_str(join_cells(&cells).trim_end());
        out.push('\n');
    }
    out
}

/// First `n` rows of a date-indexed table (used by `impact inspect`).
pub fn format_dated_preview(table: &DatedTable, n: usize) -> String {
    let mut out = String::new();
    let mut headers = vec![truncate(&table.date_column, 14)];
    headers.extend(table.columns.iter().map(|h| truncate(h, 14)));
    out.push_str(join_cells(&headers).trim_end());
    out.push('\n');
    for row in table.rows.iter().take(n) {
        let mut cells = vec![row.date.to_string()];
        cells.extend(row.cells.iter().map(|c| truncate(c, 14)));
        out.push_str(join_cells(&cells).trim_end());
        out.push('\n');
    }
    out
}

fn join_cells(cells: &[String]) -> String {
    cells.iter().map(|c| format!("{c:<15}")).collect::<Vec<_>>().join("")
}

fn row(label: &str, average: &str, cumulative: &str) -> String {
    let line = format!("{label:<LABEL_WIDTH$}{average:<VALUE_WIDTH$}{cumulative}");
    format!("{}\n", line.trim_end())
}

fn ci_label(alpha: f64) -> String {
    format!("{}% CI", trim_float((1.0 - alpha) * 100.0))
}

fn trim_float(v: f64) -> String {
    let s = format!("{v:.1}");
    s.strip_suffix(".0").map(str::to_string).unwrap_or(s)
}

fn fmt_num(v: f64) -> String {
    format!("{v:.2}")
}

fn fmt_with_sd(e: &Estimate) -> String {
    format!("{:.2} ({:.2})", e.value, e.sd)
}

fn fmt_ci(e: &Estimate) -> String {
    format!("[{:.2}, {:.2}]", e.lower, e.upper)
}

fn fmt_pct_with_sd(e: &Estimate) -> String {
    format!("{:.1}% ({:.1}%)", e.value * 100.0, e.sd * 100.0)
}

fn fmt_pct_ci(e: &Estimate) -> String {
    format!("[{:.1}%, {:.1}%]", e.lower * 100.0, e.upper * 100.0)
}

fn fmt_pct_signed(v: f64) -> String {
    format!("{:+.1}%", v * 100.0)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Measure;

    fn est(value: f64, sd: f64, lower: f64, upper: f64) -> Estimate {
        Estimate { value, sd, lower, upper }
    }

    fn summary() -> EffectSummary {
        EffectSummary {
            actual: Measure {
                average: 117.0,
                cumulative: 3510.0,
            },
            predicted: Measure {
                average: est(107.0, 0.5, 106.0, 108.0),
                cumulative: est(3210.0, 15.0, 3180.0, 3240.0),
            },
            absolute: Measure {
                average: est(10.0, 0.5, 9.0, 11.0),
                cumulative: est(300.0, 15.0, 270.0, 330.0),
            },
            relative: Measure {
                average: est(0.0934, 0.0047, 0.0841, 0.1028),
                cumulative: est(0.0934, 0.0047, 0.0841, 0.1028),
            },
            p_value: 0.001,
            alpha: 0.05,
            n_pre: 70,
            n_post: 30,
        }
    }

    #[test]
    fn summary_golden() {
        let txt = format_summary(&summary(), FitMethod::Vi);
        let expected = concat!(
            "Counterfactual inference (fit method: vi (fast approximate))\n",
            "\n",
            "                          Average               Cumulative\n",
            "Actual                    117.00                3510.00\n",
            "Prediction (s.d.)         107.00 (0.50)         3210.00 (15.00)\n",
            "95% CI                    [106.00, 108.00]      [3180.00, 3240.00]\n",
            "\n",
            "Absolute effect (s.d.)    10.00 (0.50)          300.00 (15.00)\n",
            "95% CI                    [9.00, 11.00]         [270.00, 330.00]\n",
            "\n",
            "Relative effect (s.d.)    9.3% (0.5%)           9.3% (0.5%)\n",
            "95% CI                    [8.4%, 10.3%]         [8.4%, 10.3%]\n",
            "\n",
            "Tail-area probability p: 0.001\n",
            "Probability of a causal effect: 99.9%\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn ci_label_follows_alpha() {
        assert_eq!(ci_label(0.05), "95% CI");
        assert_eq!(ci_label(0.1), "90% CI");
        assert_eq!(ci_label(0.025), "97.5% CI");
    }

    #[test]
    fn dropped_rows_are_listed_with_overflow_note() {
        use crate::prep::{DropReason, DroppedRow};

        let report = CleanReport {
            dropped_rows: (0..3)
                .map(|i| DroppedRow {
                    line: i + 2,
                    date: None,
                    reason: DropReason::MissingDate,
                })
                .collect(),
            ..CleanReport::default()
        };
        let txt = format_dropped_rows(&report, 2);
        assert_eq!(
            txt,
            "  line     2: missing date\n  line     3: missing date\n  ... 1 more\n"
        );
    }
}
