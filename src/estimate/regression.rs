//! Regression counterfactual estimator.
//!
//! The counterfactual for the response is a linear model on the controls,
//! fitted on the pre-period only:
//!
//! ```text
//! y_t = β0 + Σ β_j x_jt + ε_t        (t in pre-period)
//! ```
//!
//! and projected over the whole pre+post horizon. Effects are
//! `actual - predicted`, summed over the post-period for the cumulative view.
//! Without controls the model is intercept-only (the pre-period mean).
//!
//! Uncertainty depends on the fit method:
//! - `vi`: Gaussian intervals from the pre-period residual standard deviation
//! - `hmc`: residual bootstrap. Each draw refits β on resampled residuals and
//!   adds a resampled residual to every projected point. Draws run in parallel
//!   with a per-draw seed, so results are deterministic for a given seed.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, info};

use crate::domain::{
    CleanTable, EffectSummary, Estimate, FitMethod, Measure, ModelArgs, SeriesFile, SeriesPoint,
    ValidatedPeriods,
};
use crate::estimate::{EstimateError, ImpactEstimator, ImpactOutcome};
use crate::math::{intercept_design, solve_least_squares};

/// Minimum residual degrees of freedom in the pre-period fit.
const MIN_DOF: usize = 2;

/// Minimum bootstrap draws for the `hmc` method.
const MIN_DRAWS: usize = 50;

/// Linear counterfactual estimator (see module docs).
#[derive(Debug, Clone, Copy, Default)]
pub struct RegressionEstimator;

/// Result of a regression counterfactual run.
#[derive(Debug, Clone)]
pub struct ImpactAnalysis {
    pub response: String,
    pub controls: Vec<String>,
    pub periods: ValidatedPeriods,
    pub model: ModelArgs,
    /// `("(intercept)", β0)` followed by one entry per control.
    pub coefficients: Vec<(String, f64)>,
    /// Pre-period residual standard deviation.
    pub residual_sd: f64,
    /// Bootstrap draws that produced a usable fit (`hmc` only).
    pub draws_used: usize,
    pub points: Vec<SeriesPoint>,
    pub summary: EffectSummary,
}

impl ImpactAnalysis {
    /// Portable JSON representation (see `io::series`).
    pub fn to_series_file(&self) -> SeriesFile {
        SeriesFile {
            tool: "impact".to_string(),
            response: self.response.clone(),
            controls: self.controls.clone(),
            periods: self.periods,
            fit_method: self.model.fit_method,
            summary: self.summary,
            points: self.points.clone(),
        }
    }
}

impl ImpactOutcome for ImpactAnalysis {
    fn summary(&self) -> String {
        crate::report::format_summary(&self.summary, self.model.fit_method)
    }

    fn report(&self) -> String {
        crate::report::format_report(self)
    }

    fn plot(&self, width: usize, height: usize) -> Option<String> {
        crate::plot::render_impact_plot(&self.points, width, height)
    }
}

impl ImpactEstimator for RegressionEstimator {
    type Outcome = ImpactAnalysis;

    fn estimate(
        &self,
        data: &CleanTable,
        periods: &ValidatedPeriods,
        args: &ModelArgs,
    ) -> Result<ImpactAnalysis, EstimateError> {
        if !(args.alpha.is_finite() && args.alpha > 0.0 && args.alpha < 1.0) {
            return Err(EstimateError::new(format!(
                "alpha must be in (0, 1), got {}",
                args.alpha
            )));
        }

        let pre_rows: Vec<usize> = rows_in(data, |d| periods.pre.contains(d));
        let post_rows: Vec<usize> = rows_in(data, |d| periods.post.contains(d));
        let horizon: Vec<usize> = rows_in(data, |d| periods.pre.contains(d) || periods.post.contains(d));

        let p = data.controls().len() + 1;
        if pre_rows.len() < p + MIN_DOF {
            return Err(EstimateError::new(format!(
                "pre-period has {} observation(s); at least {} are needed for {} parameter(s)",
                pre_rows.len(),
                p + MIN_DOF,
                p
            )));
        }
        if post_rows.is_empty() {
            return Err(EstimateError::new("post-period has no observations"));
        }

        let started = Instant::now();
        let fit = fit_pre_period(data, &pre_rows)?;
        debug!(residual_sd = fit.residual_sd, "pre-period fit");

        let x_h = design_matrix(data, &horizon);
        let predicted: Vec<f64> = (&x_h * &fit.beta).iter().copied().collect();

        let y = &data.response().values;
        let post_mask: Vec<bool> = horizon.iter().map(|&i| periods.post.contains(data.index[i])).collect();
        let actual_sum: f64 = post_rows.iter().map(|&i| y[i]).sum();

        let inference = match args.fit_method {
            FitMethod::Vi => gaussian_inference(&predicted, &post_mask, actual_sum, fit.residual_sd, args.alpha)?,
            FitMethod::Hmc => bootstrap_inference(&fit, &x_h, &predicted, &post_mask, actual_sum, args)?,
        };

        let mut points = Vec::with_capacity(horizon.len());
        let mut cumulative = 0.0;
        for (h, &i) in horizon.iter().enumerate() {
            let point_effect = y[i] - predicted[h];
            if post_mask[h] {
                cumulative += point_effect;
            }
            points.push(SeriesPoint {
                date: data.index[i],
                actual: y[i],
                predicted: predicted[h],
                predicted_lower: inference.bands[h].0,
                predicted_upper: inference.bands[h].1,
                point_effect,
                cumulative_effect: if post_mask[h] { cumulative } else { 0.0 },
                post: post_mask[h],
            });
        }

        let n_post = post_rows.len();
        let summary = EffectSummary {
            actual: Measure {
                average: actual_sum / n_post as f64,
                cumulative: actual_sum,
            },
            predicted: inference.predicted,
            absolute: inference.absolute,
            relative: inference.relative,
            p_value: inference.p_value,
            alpha: args.alpha,
            n_pre: pre_rows.len(),
            n_post,
        };

        info!(
            method = ?args.fit_method,
            n_pre = pre_rows.len(),
            n_post,
            effect = summary.absolute.average.value,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "estimated impact"
        );

        let mut coefficients = Vec::with_capacity(p);
        coefficients.push(("(intercept)".to_string(), fit.beta[0]));
        for (j, s) in data.controls().iter().enumerate() {
            coefficients.push((s.name.clone(), fit.beta[j + 1]));
        }

        Ok(ImpactAnalysis {
            response: data.response().name.clone(),
            controls: data.controls().iter().map(|s| s.name.clone()).collect(),
            periods: *periods,
            model: *args,
            coefficients,
            residual_sd: fit.residual_sd,
            draws_used: inference.draws_used,
            points,
            summary,
        })
    }
}

struct PreFit {
    x: DMatrix<f64>,
    beta: DVector<f64>,
    fitted: DVector<f64>,
    /// Centered residuals rescaled by `sqrt(n / (n - p))`.
    adjusted_residuals: Vec<f64>,
    residual_sd: f64,
}

struct Inference {
    bands: Vec<(f64, f64)>,
    predicted: Measure<Estimate>,
    absolute: Measure<Estimate>,
    relative: Measure<Estimate>,
    p_value: f64,
    draws_used: usize,
}

fn rows_in(data: &CleanTable, pred: impl Fn(chrono::NaiveDate) -> bool) -> Vec<usize> {
    data.index
        .iter()
        .enumerate()
        .filter(|(_, d)| pred(**d))
        .map(|(i, _)| i)
        .collect()
}

fn design_matrix(data: &CleanTable, rows: &[usize]) -> DMatrix<f64> {
    let controls: Vec<&[f64]> = data.controls().iter().map(|s| s.values.as_slice()).collect();
    intercept_design(&controls, rows)
}

fn fit_pre_period(data: &CleanTable, pre_rows: &[usize]) -> Result<PreFit, EstimateError> {
    let x = design_matrix(data, pre_rows);
    let y = DVector::from_iterator(pre_rows.len(), pre_rows.iter().map(|&i| data.response().values[i]));

    let beta = solve_least_squares(&x, &y)
        .ok_or_else(|| EstimateError::new("pre-period regression could not be solved (singular design)"))?;
    let fitted = &x * &beta;
    let residuals: Vec<f64> = (&y - &fitted).iter().copied().collect();

    let n = residuals.len();
    let dof = n - x.ncols();
    let sse: f64 = residuals.iter().map(|r| r * r).sum();
    let residual_sd = (sse / dof as f64).sqrt();

    let mean = residuals.iter().sum::<f64>() / n as f64;
    let scale = (n as f64 / dof as f64).sqrt();
    let adjusted_residuals = residuals.iter().map(|r| (r - mean) * scale).collect();

    Ok(PreFit {
        x,
        beta,
        fitted,
        adjusted_residuals,
        residual_sd,
    })
}

fn gaussian_inference(
    predicted: &[f64],
    post_mask: &[bool],
    actual_sum: f64,
    sigma: f64,
    alpha: f64,
) -> Result<Inference, EstimateError> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| EstimateError::new(format!("normal distribution: {e}")))?;
    let z = normal.inverse_cdf(1.0 - alpha / 2.0);

    let bands = predicted.iter().map(|&p| (p - z * sigma, p + z * sigma)).collect();

    let n_post = post_mask.iter().filter(|&&m| m).count() as f64;
    let pred_sum: f64 = predicted
        .iter()
        .zip(post_mask)
        .filter(|(_, m)| **m)
        .map(|(p, _)| p)
        .sum();

    let sd_cum = sigma * n_post.sqrt();
    let sd_avg = sigma / n_post.sqrt();

    let predicted = Measure {
        average: symmetric(pred_sum / n_post, sd_avg, z),
        cumulative: symmetric(pred_sum, sd_cum, z),
    };
    let absolute = Measure {
        average: symmetric((actual_sum - pred_sum) / n_post, sd_avg, z),
        cumulative: symmetric(actual_sum - pred_sum, sd_cum, z),
    };
    let relative = Measure {
        average: relative_of(&absolute.average, predicted.average.value),
        cumulative: relative_of(&absolute.cumulative, predicted.cumulative.value),
    };

    let effect = absolute.average.value;
    let p_value = if sd_avg > 0.0 {
        1.0 - normal.cdf(effect.abs() / sd_avg)
    } else if effect == 0.0 {
        0.5
    } else {
        0.0
    };

    Ok(Inference {
        bands,
        predicted,
        absolute,
        relative,
        p_value,
        draws_used: 0,
    })
}

/// One bootstrap draw: projected horizon path and its post-period sum.
struct Draw {
    path: Vec<f64>,
    post_sum: f64,
}

fn bootstrap_inference(
    fit: &PreFit,
    x_h: &DMatrix<f64>,
    predicted: &[f64],
    post_mask: &[bool],
    actual_sum: f64,
    args: &ModelArgs,
) -> Result<Inference, EstimateError> {
    if args.draws < MIN_DRAWS {
        return Err(EstimateError::new(format!(
            "hmc needs at least {MIN_DRAWS} draws, got {}",
            args.draws
        )));
    }

    let draws: Vec<Draw> = (0..args.draws)
        .into_par_iter()
        .filter_map(|d| {
            let mut rng = StdRng::seed_from_u64(draw_seed(args.seed, d));
            bootstrap_draw(fit, x_h, post_mask, &mut rng)
        })
        .collect();

    if draws.len() < args.draws / 2 {
        return Err(EstimateError::new(format!(
            "only {} of {} sampling draws produced a usable fit",
            draws.len(),
            args.draws
        )));
    }
    debug!(draws = draws.len(), "bootstrap complete");

    let lo_q = args.alpha / 2.0;
    let hi_q = 1.0 - args.alpha / 2.0;

    let bands = (0..predicted.len())
        .map(|h| {
            let mut col: Vec<f64> = draws.iter().map(|d| d.path[h]).collect();
            col.sort_by(f64::total_cmp);
            (quantile(&col, lo_q), quantile(&col, hi_q))
        })
        .collect();

    let n_post = post_mask.iter().filter(|&&m| m).count() as f64;
    let pred_cum: Vec<f64> = draws.iter().map(|d| d.post_sum).collect();
    let pred_avg: Vec<f64> = pred_cum.iter().map(|s| s / n_post).collect();
    let abs_cum: Vec<f64> = pred_cum.iter().map(|s| actual_sum - s).collect();
    let abs_avg: Vec<f64> = abs_cum.iter().map(|s| s / n_post).collect();
    let rel: Vec<f64> = abs_cum
        .iter()
        .zip(&pred_cum)
        .filter(|(_, p)| **p != 0.0)
        .map(|(a, p)| a / p)
        .collect();

    let at_least = pred_cum.iter().filter(|&&s| s >= actual_sum).count();
    let at_most = pred_cum.iter().filter(|&&s| s <= actual_sum).count();
    let p_value = (at_least.min(at_most) + 1) as f64 / (pred_cum.len() + 1) as f64;

    let rel_estimate = empirical(&rel, lo_q, hi_q);

    Ok(Inference {
        bands,
        predicted: Measure {
            average: empirical(&pred_avg, lo_q, hi_q),
            cumulative: empirical(&pred_cum, lo_q, hi_q),
        },
        absolute: Measure {
            average: empirical(&abs_avg, lo_q, hi_q),
            cumulative: empirical(&abs_cum, lo_q, hi_q),
        },
        relative: Measure {
            average: rel_estimate,
            cumulative: rel_estimate,
        },
        p_value,
        draws_used: draws.len(),
    })
}

fn bootstrap_draw(fit: &PreFit, x_h: &DMatrix<f64>, post_mask: &[bool], rng: &mut StdRng) -> Option<Draw> {
    let res = &fit.adjusted_residuals;
    let n = res.len();

    let y_star = DVector::from_iterator(n, fit.fitted.iter().map(|f| f + res[rng.gen_range(0..n)]));
    let beta_star = solve_least_squares(&fit.x, &y_star)?;

    let mut post_sum = 0.0;
    let path: Vec<f64> = (x_h * &beta_star)
        .iter()
        .zip(post_mask)
        .map(|(mean, &post)| {
            let v = mean + res[rng.gen_range(0..n)];
            if post {
                post_sum += v;
            }
            v
        })
        .collect();

    if path.iter().all(|v| v.is_finite()) {
        Some(Draw { path, post_sum })
    } else {
        None
    }
}

fn draw_seed(seed: u64, draw: usize) -> u64 {
    // splitmix64-style mixing so neighbouring draws get unrelated streams.
    let mut z = seed.wrapping_add((draw as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn symmetric(value: f64, sd: f64, z: f64) -> Estimate {
    Estimate {
        value,
        sd,
        lower: value - z * sd,
        upper: value + z * sd,
    }
}

fn relative_of(absolute: &Estimate, predicted: f64) -> Estimate {
    if predicted == 0.0 {
        return Estimate {
            value: f64::NAN,
            sd: f64::NAN,
            lower: f64::NAN,
            upper: f64::NAN,
        };
    }
    let a = absolute.lower / predicted;
    let b = absolute.upper / predicted;
    Estimate {
        value: absolute.value / predicted,
        sd: absolute.sd / predicted.abs(),
        lower: a.min(b),
        upper: a.max(b),
    }
}

fn empirical(samples: &[f64], lo_q: f64, hi_q: f64) -> Estimate {
    if samples.is_empty() {
        return Estimate {
            value: f64::NAN,
            sd: f64::NAN,
            lower: f64::NAN,
            upper: f64::NAN,
        };
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = if samples.len() > 1 {
        samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    Estimate {
        value: mean,
        sd: var.sqrt(),
        lower: quantile(&sorted, lo_q),
        upper: quantile(&sorted, hi_q),
    }
}

/// Linear-interpolated quantile of an ascending slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}
