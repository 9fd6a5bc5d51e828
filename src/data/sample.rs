//! Synthetic daily dataset with a known lift after an intervention date.
//!
//! Two controls follow independent random walks; the response is a linear
//! combination of them plus Gaussian noise, shifted by `lift` from the
//! intervention date on. The output is a `RawTable` (text cells) so it can be
//! written out with metadata banner lines and read back exactly like a user
//! upload.

use chrono::{Days, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{RawRow, RawTable};
use crate::error::AppError;

/// Response = `SALES_PER_VISIT * visits + SALES_PER_SPEND * ad_spend + noise`.
const SALES_PER_VISIT: f64 = 1.2;
const SALES_PER_SPEND: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleConfig {
    pub start: NaiveDate,
    pub days: usize,
    /// Default: 70% into the range.
    pub intervention: Option<NaiveDate>,
    pub lift: f64,
    pub seed: u64,
    /// Encode dates as `YYYYMMDD` numbers instead of ISO text.
    pub yyyymmdd: bool,
    /// Probability that a control cell is left empty.
    pub missing_prob: f64,
    pub metadata_rows: usize,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            days: 120,
            intervention: None,
            lift: 10.0,
            seed: 7,
            yyyymmdd: false,
            missing_prob: 0.0,
            metadata_rows: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SampleData {
    pub table: RawTable,
    /// Banner lines to write before the header (exactly `metadata_rows`).
    pub metadata: Vec<String>,
    pub intervention: NaiveDate,
}

pub fn generate_sample(config: &SampleConfig) -> Result<SampleData, AppError> {
    if config.days < 4 {
        return Err(AppError::new(2, "Sample needs at least 4 days."));
    }
    if !(0.0..1.0).contains(&config.missing_prob) {
        return Err(AppError::new(2, "Missing-value probability must be in [0, 1)."));
    }
    if !config.lift.is_finite() {
        return Err(AppError::new(2, "Lift must be a finite number."));
    }

    let last = config
        .start
        .checked_add_days(Days::new(config.days as u64 - 1))
        .ok_or_else(|| AppError::new(2, "Sample date range overflows the calendar."))?;
    let intervention = match config.intervention {
        Some(d) => d,
        None => config
            .start
            .checked_add_days(Days::new((config.days as f64 * 0.7).round() as u64))
            .ok_or_else(|| AppError::new(2, "Sample date range overflows the calendar."))?,
    };
    if intervention <= config.start || intervention > last {
        return Err(AppError::new(
            2,
            format!(
                "Intervention {intervention} must fall after {} and no later than {last}.",
                config.start
            ),
        ));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let step = Normal::new(0.0, 1.0).map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
    let noise = Normal::new(0.0, 1.0).map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let mut visits = 100.0;
    let mut ad_spend = 50.0;
    let mut rows = Vec::with_capacity(config.days);

    for i in 0..config.days {
        let date = config.start + Days::new(i as u64);
        visits += step.sample(&mut rng);
        ad_spend += 0.5 * step.sample(&mut rng);

        let lift = if date >= intervention { config.lift } else { 0.0 };
        let sales = SALES_PER_VISIT * visits + SALES_PER_SPEND * ad_spend + noise.sample(&mut rng) + lift;

        let date_cell = if config.yyyymmdd {
            date.format("%Y%m%d").to_string()
        } else {
            date.format("%Y-%m-%d").to_string()
        };
        let mut control = |v: f64| {
            if config.missing_prob > 0.0 && rng.gen_bool(config.missing_prob) {
                String::new()
            } else {
                format!("{v:.3}")
            }
        };
        let cells = vec![date_cell, format!("{sales:.3}"), control(visits), control(ad_spend)];

        rows.push(RawRow {
            line: config.metadata_rows + 2 + i,
            cells,
        });
    }

    let metadata = metadata_lines(config, intervention);
    Ok(SampleData {
        table: RawTable {
            headers: ["date", "sales", "visits", "ad_spend"].map(String::from).to_vec(),
            rows,
        },
        metadata,
        intervention,
    })
}

fn metadata_lines(config: &SampleConfig, intervention: NaiveDate) -> Vec<String> {
    let mut lines = vec![
        "# impact demo dataset".to_string(),
        format!("# seed: {}", config.seed),
        format!("# intervention: {intervention}"),
        format!("# lift: {}", config.lift),
    ];
    lines.resize(config.metadata_rows.max(lines.len()), "#".to_string());
    lines.truncate(config.metadata_rows);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DateEncoding, ModelArgs, ValidatedPeriods, Period};
    use crate::estimate::{ImpactEstimator, RegressionEstimator};
    use crate::prep::clean_table;

    #[test]
    fn same_seed_same_table() {
        let config = SampleConfig::default();
        let a = generate_sample(&config).unwrap();
        let b = generate_sample(&config).unwrap();
        assert_eq!(a.table, b.table);

        let c = generate_sample(&SampleConfig { seed: 8, ..config }).unwrap();
        assert_ne!(a.table, c.table);
    }

    #[test]
    fn default_intervention_and_shape() {
        let sample = generate_sample(&SampleConfig::default()).unwrap();
        assert_eq!(sample.intervention, NaiveDate::from_ymd_opt(2023, 3, 26).unwrap());
        assert_eq!(sample.table.n_rows(), 120);
        assert_eq!(sample.table.rows[0].cells[0], "2023-01-01");
        assert!(sample.metadata.is_empty());
    }

    #[test]
    fn yyyymmdd_dates_and_metadata_rows() {
        let sample = generate_sample(&SampleConfig {
            yyyymmdd: true,
            metadata_rows: 6,
            ..SampleConfig::default()
        })
        .unwrap();
        assert_eq!(sample.table.rows[0].cells[0], "20230101");
        assert_eq!(sample.metadata.len(), 6);
        assert_eq!(sample.metadata[5], "#");
        assert_eq!(sample.table.rows[0].line, 8);
    }

    #[test]
    fn missing_values_only_hit_controls() {
        let sample = generate_sample(&SampleConfig {
            missing_prob: 0.3,
            ..SampleConfig::default()
        })
        .unwrap();
        let rows = &sample.table.rows;
        assert!(rows.iter().all(|r| !r.cells[0].is_empty() && !r.cells[1].is_empty()));
        assert!(rows.iter().any(|r| r.cells[2].is_empty() || r.cells[3].is_empty()));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let base = SampleConfig::default();
        assert!(generate_sample(&SampleConfig { days: 3, ..base.clone() }).is_err());
        assert!(generate_sample(&SampleConfig { missing_prob: 1.0, ..base.clone() }).is_err());
        assert!(generate_sample(&SampleConfig {
            intervention: Some(base.start),
            ..base
        })
        .is_err());
    }

    #[test]
    fn regression_recovers_the_planted_lift() {
        let sample = generate_sample(&SampleConfig::default()).unwrap();
        let (table, _) = clean_table(
            &sample.table,
            "date",
            DateEncoding::Auto,
            "sales",
            &["visits".to_string(), "ad_spend".to_string()],
        )
        .unwrap();

        let start = table.first_date().unwrap();
        let end = table.last_date().unwrap();
        let periods = ValidatedPeriods {
            pre: Period {
                start,
                end: sample.intervention - Days::new(1),
            },
            post: Period {
                start: sample.intervention,
                end,
            },
        };
        let analysis = RegressionEstimator
            .estimate(&table, &periods, &ModelArgs::default())
            .unwrap();
        let effect = analysis.summary.absolute.average.value;
        assert!((effect - 10.0).abs() < 1.5, "effect {effect}");
    }
}
