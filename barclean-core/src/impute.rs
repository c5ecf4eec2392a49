//! Missing-value imputation.
//!
//! The default strategy is multivariate and iterative: every incomplete column
//! is regressed (ridge, closed form) on the other four in round-robin until the
//! imputed values settle. When the model cannot be fit, or when configured to,
//! values are forward-filled then back-filled per column instead.
//!
//! Observed values are never changed. Rows are never added or removed.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::domain::{Candle, CandleSeries, Field};
use crate::error::PipelineError;
use crate::report::Degradation;

const PIVOT_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    #[default]
    Iterative,
    /// Forward fill then back fill. Always available.
    FillForward,
}

/// Order in which incomplete columns are visited each round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeOrder {
    /// Fewest missing values first.
    #[default]
    Ascending,
    /// Shuffled every round with the seeded RNG.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputeConfig {
    pub strategy: ImputeStrategy,
    pub max_iter: usize,
    pub seed: u64,
    /// Stop once the largest change (in standardized units) falls below this.
    pub tolerance: f64,
    pub ridge_lambda: f64,
    pub order: ImputeOrder,
    /// Draw imputed values from the fitted residual distribution instead of
    /// taking the point prediction.
    pub sample_posterior: bool,
}

impl Default for ImputeConfig {
    fn default() -> Self {
        Self {
            strategy: ImputeStrategy::Iterative,
            max_iter: 10,
            seed: 42,
            tolerance: 1e-3,
            ridge_lambda: 1.0,
            order: ImputeOrder::Ascending,
            sample_posterior: false,
        }
    }
}

/// How missing values were filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ImputeMethod {
    /// Nothing was missing.
    None,
    Iterative { iterations: usize, converged: bool },
    FillForward,
}

impl fmt::Display for ImputeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImputeMethod::None => write!(f, "none"),
            ImputeMethod::Iterative {
                iterations,
                converged,
            } => {
                let state = if *converged { "converged" } else { "max_iter" };
                write!(f, "iterative ({iterations} rounds, {state})")
            }
            ImputeMethod::FillForward => write!(f, "ffill/bfill"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImputeOutcome {
    pub series: CandleSeries,
    pub method: ImputeMethod,
    pub degraded: Option<Degradation>,
}

/// Fill every missing numeric value.
///
/// A column with no observed value at all is [`PipelineError::Unrecoverable`].
pub fn impute(series: CandleSeries, config: &ImputeConfig) -> Result<ImputeOutcome, PipelineError> {
    let missing = series.missing_cells();
    if missing == 0 {
        return Ok(ImputeOutcome {
            series,
            method: ImputeMethod::None,
            degraded: None,
        });
    }

    let columns: Vec<Vec<Option<f64>>> = Field::ALL.iter().map(|f| series.column(*f)).collect();
    for (field, column) in Field::ALL.iter().zip(&columns) {
        if column.iter().all(Option::is_none) {
            return Err(PipelineError::Unrecoverable(format!(
                "column '{field}' has no observed values to impute from"
            )));
        }
    }

    info!(missing, candles = series.len(), "imputing missing values");

    let (filled, method, degraded) = match config.strategy {
        ImputeStrategy::FillForward => (
            fill_forward_backward(&columns),
            ImputeMethod::FillForward,
            Some(Degradation::FallbackImputation {
                reason: "fill-forward strategy configured".into(),
            }),
        ),
        ImputeStrategy::Iterative => match iterative(&columns, config) {
            Ok((filled, iterations, converged)) => {
                info!(iterations, converged, "iterative imputation complete");
                (
                    filled,
                    ImputeMethod::Iterative {
                        iterations,
                        converged,
                    },
                    None,
                )
            }
            Err(reason) => {
                warn!(%reason, "iterative imputation unavailable, using ffill/bfill");
                (
                    fill_forward_backward(&columns),
                    ImputeMethod::FillForward,
                    Some(Degradation::FallbackImputation { reason }),
                )
            }
        },
    };

    let candles: Vec<Candle> = series
        .candles()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut candle = *c;
            for (j, field) in Field::ALL.iter().enumerate() {
                candle.set(*field, Some(filled[j][i]));
            }
            candle
        })
        .collect();

    Ok(ImputeOutcome {
        series: series.with_candles(candles),
        method,
        degraded,
    })
}

/// Per column: carry the last observation forward, then fill any leading gap
/// from the first observation. Every column must have one observation.
pub fn fill_forward_backward(columns: &[Vec<Option<f64>>]) -> Vec<Vec<f64>> {
    columns
        .iter()
        .map(|column| {
            let mut forward: Vec<Option<f64>> = Vec::with_capacity(column.len());
            let mut last = None;
            for v in column {
                last = v.or(last);
                forward.push(last);
            }
            let first = column.iter().flatten().next().copied().unwrap_or(0.0);
            forward.into_iter().map(|v| v.unwrap_or(first)).collect()
        })
        .collect()
}

/// Round-robin ridge regression in standardized space.
///
/// Returns the filled columns, the number of rounds run, and whether the
/// tolerance was reached. `Err` carries the reason the model could not be fit.
fn iterative(
    columns: &[Vec<Option<f64>>],
    config: &ImputeConfig,
) -> Result<(Vec<Vec<f64>>, usize, bool), String> {
    let p = columns.len();
    let n = columns.first().map_or(0, Vec::len);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let scales: Vec<(f64, f64)> = columns.iter().map(|c| standardizer(c)).collect();
    let observed: Vec<Vec<bool>> = columns
        .iter()
        .map(|c| c.iter().map(Option::is_some).collect())
        .collect();

    // Observed values standardized, missing ones start at the column mean (0).
    let mut z: Vec<Vec<f64>> = columns
        .iter()
        .zip(&scales)
        .map(|(c, (mean, std))| c.iter().map(|v| v.map_or(0.0, |x| (x - mean) / std)).collect())
        .collect();

    let mut order: Vec<usize> = (0..p)
        .filter(|j| observed[*j].iter().any(|o| !o))
        .collect();
    order.sort_by_key(|j| observed[*j].iter().filter(|o| !**o).count());

    let predictors = p - 1;
    let mut iterations = 0;
    let mut converged = false;

    for _ in 0..config.max_iter {
        iterations += 1;
        if config.order == ImputeOrder::Random {
            order.shuffle(&mut rng);
        }

        let mut max_change: f64 = 0.0;
        for &target in &order {
            let rows: Vec<usize> = (0..n).filter(|i| observed[target][*i]).collect();
            if rows.len() < predictors + 1 {
                return Err(format!(
                    "column '{}' has {} observed rows, need at least {}",
                    Field::ALL[target],
                    rows.len(),
                    predictors + 1
                ));
            }

            let others: Vec<usize> = (0..p).filter(|j| *j != target).collect();
            let design = |i: usize| -> Vec<f64> {
                std::iter::once(1.0).chain(others.iter().map(|j| z[*j][i])).collect()
            };

            let x: Vec<Vec<f64>> = rows.iter().map(|i| design(*i)).collect();
            let y: Vec<f64> = rows.iter().map(|i| z[target][*i]).collect();
            let beta = fit_ridge(&x, &y, config.ridge_lambda)
                .ok_or_else(|| format!("singular system for column '{}'", Field::ALL[target]))?;

            let sigma = if config.sample_posterior {
                residual_std(&x, &y, &beta)
            } else {
                0.0
            };

            let missing_rows: Vec<usize> = (0..n).filter(|i| !observed[target][*i]).collect();
            let predictions: Vec<f64> = missing_rows
                .iter()
                .map(|i| {
                    let mean = dot(&design(*i), &beta);
                    if sigma > 0.0 {
                        mean + sigma * standard_normal(&mut rng)
                    } else {
                        mean
                    }
                })
                .collect();

            for (i, value) in missing_rows.into_iter().zip(predictions) {
                if !value.is_finite() {
                    return Err(format!(
                        "non-finite prediction for column '{}'",
                        Field::ALL[target]
                    ));
                }
                max_change = max_change.max((value - z[target][i]).abs());
                z[target][i] = value;
            }
        }

        if !config.sample_posterior && max_change < config.tolerance {
            converged = true;
            break;
        }
    }

    let filled = z
        .iter()
        .zip(columns)
        .zip(&scales)
        .map(|((zc, raw), (mean, std))| {
            zc.iter()
                .zip(raw)
                .map(|(zv, rv)| rv.unwrap_or(zv * std + mean))
                .collect()
        })
        .collect();

    Ok((filled, iterations, converged))
}

/// Mean and population standard deviation of the observed values. A zero
/// deviation scales by one.
fn standardizer(column: &[Option<f64>]) -> (f64, f64) {
    let values: Vec<f64> = column.iter().flatten().copied().collect();
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    (mean, if std > 0.0 && std.is_finite() { std } else { 1.0 })
}

/// Solve `(XᵀX + λI')β = Xᵀy`, where the intercept (column 0) is not penalized.
fn fit_ridge(x: &[Vec<f64>], y: &[f64], lambda: f64) -> Option<Vec<f64>> {
    let d = x.first()?.len();
    let mut a = vec![vec![0.0; d]; d];
    let mut b = vec![0.0; d];
    for (row, target) in x.iter().zip(y) {
        for r in 0..d {
            b[r] += row[r] * target;
            for c in 0..d {
                a[r][c] += row[r] * row[c];
            }
        }
    }
    for (k, diag) in a.iter_mut().enumerate().skip(1) {
        diag[k] += lambda;
    }
    solve(a, b)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let d = b.len();
    for col in 0..d {
        let pivot = (col..d).max_by(|i, j| a[*i][col].abs().total_cmp(&a[*j][col].abs()))?;
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..d {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..d {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut beta = vec![0.0; d];
    for row in (0..d).rev() {
        let tail: f64 = (row + 1..d).map(|k| a[row][k] * beta[k]).sum();
        beta[row] = (b[row] - tail) / a[row][row];
    }
    beta.iter().all(|v| v.is_finite()).then_some(beta)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn residual_std(x: &[Vec<f64>], y: &[f64], beta: &[f64]) -> f64 {
    let dof = x.len().saturating_sub(beta.len()).max(1) as f64;
    let ssr: f64 = x
        .iter()
        .zip(y)
        .map(|(row, target)| (target - dot(row, beta)).powi(2))
        .sum();
    (ssr / dof).sqrt()
}

/// Box-Muller draw from N(0, 1).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
