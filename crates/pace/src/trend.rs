//! Robust trend fitting of lap time against lap number.
//!
//! The normalizer only depends on the `TrendFit` trait: it hands over ordered
//! `(lap_number, lap_time)` points and gets back the fitted curve plus residuals.
//! Implementations must tolerate a bounded fraction of outlying laps.

use configuration::{TrendConfig, TrendFitKind};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PaceError;
use crate::stats;

/// Consistency constant turning a median absolute residual into a normal-scale sigma.
const MAD_TO_SIGMA: f64 = 1.4826;

/// A polynomial in the normalized variable `t = (x - center) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendCurve {
    pub center: f64,
    pub scale: f64,
    /// Coefficients in ascending power order.
    pub coefficients: Vec<f64>,
}

impl TrendCurve {
    pub fn evaluate(&self, x: f64) -> f64 {
        let t = (x - self.center) / self.scale;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * t + c)
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }
}

/// The outcome of fitting one set of points.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedTrend {
    pub curve: TrendCurve,
    pub fitted: Vec<f64>,
    /// `y - fitted`, in input order.
    pub residuals: Vec<f64>,
    /// Final robustness weight of each point (1.0 = full weight, 0.0 = rejected).
    pub weights: Vec<f64>,
    pub iterations: usize,
}

impl FittedTrend {
    fn new(curve: TrendCurve, points: &[(f64, f64)], weights: Vec<f64>, iterations: usize) -> Self {
        let fitted: Vec<f64> = points.iter().map(|&(x, _)| curve.evaluate(x)).collect();
        let residuals = points
            .iter()
            .zip(&fitted)
            .map(|(&(_, y), f)| y - f)
            .collect();
        Self {
            curve,
            fitted,
            residuals,
            weights,
            iterations,
        }
    }
}

/// A pluggable robust regression of lap time on lap number.
///
/// The `Send + Sync` bounds let one normalizer be shared by every race worker.
pub trait TrendFit: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Fits ordered `(x, y)` points.
    ///
    /// Fails with `InsufficientData` when there are fewer points than the model has
    /// parameters and with `DegenerateFit` when the points cannot identify the model.
    fn fit(&self, points: &[(f64, f64)]) -> Result<FittedTrend, PaceError>;
}

/// Creates the trend fit selected in configuration.
pub fn create_trend_fit(config: &TrendConfig) -> Box<dyn TrendFit> {
    match config.kind {
        TrendFitKind::Irls => Box::new(IrlsPolynomial {
            degree: config.degree,
            max_iterations: config.max_iterations,
            tuning: config.tuning,
        }),
        TrendFitKind::TheilSen => Box::new(TheilSen),
    }
}

fn check_identifiable(points: &[(f64, f64)], parameters: usize) -> Result<(), PaceError> {
    if points.len() < parameters {
        return Err(PaceError::InsufficientData {
            subject: "trend fit".to_string(),
            found: points.len(),
            required: parameters,
        });
    }
    let mut xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();
    if xs.len() < parameters {
        return Err(PaceError::DegenerateFit(format!(
            "{} distinct lap numbers cannot identify {} parameters",
            xs.len(),
            parameters
        )));
    }
    Ok(())
}

/// Polynomial regression with iteratively re-weighted least squares and Tukey
/// bisquare weights.
#[derive(Debug, Clone)]
pub struct IrlsPolynomial {
    pub degree: usize,
    pub max_iterations: usize,
    pub tuning: f64,
}

impl Default for IrlsPolynomial {
    fn default() -> Self {
        let config = TrendConfig::default();
        Self {
            degree: config.degree,
            max_iterations: config.max_iterations,
            tuning: config.tuning,
        }
    }
}

impl TrendFit for IrlsPolynomial {
    fn name(&self) -> &'static str {
        "irls"
    }

    fn fit(&self, points: &[(f64, f64)]) -> Result<FittedTrend, PaceError> {
        let parameters = self.degree + 1;
        check_identifiable(points, parameters)?;

        let n = points.len();
        let center = points.iter().map(|p| p.0).sum::<f64>() / n as f64;
        let spread = points
            .iter()
            .map(|p| (p.0 - center).abs())
            .fold(0.0, f64::max);
        let scale = if spread > 0.0 { spread } else { 1.0 };
        let ts: Vec<f64> = points.iter().map(|p| (p.0 - center) / scale).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.1).collect();

        let y_level = ys.iter().map(|y| y.abs()).sum::<f64>() / n as f64;
        let scale_floor = 1e-9 * y_level.max(1.0);

        let mut weights = vec![1.0; n];
        let mut coefficients = weighted_polyfit(&ts, &ys, &weights, self.degree)?;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            let residuals: Vec<f64> = ts
                .iter()
                .zip(&ys)
                .map(|(&t, &y)| y - horner(&coefficients, t))
                .collect();
            let sigma = MAD_TO_SIGMA * stats::median_abs(&residuals).unwrap_or(0.0);
            if sigma <= scale_floor {
                break;
            }

            let cutoff = self.tuning * sigma;
            let next_weights: Vec<f64> = residuals
                .iter()
                .map(|r| {
                    let u = r / cutoff;
                    if u.abs() < 1.0 {
                        (1.0 - u * u).powi(2)
                    } else {
                        0.0
                    }
                })
                .collect();
            if next_weights.iter().filter(|w| **w > 0.0).count() < parameters {
                break;
            }
            let Ok(next) = weighted_polyfit(&ts, &ys, &next_weights, self.degree) else {
                break;
            };

            iterations += 1;
            let change = next
                .iter()
                .zip(&coefficients)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            let magnitude = coefficients.iter().map(|c| c.abs()).fold(1.0, f64::max);
            coefficients = next;
            weights = next_weights;
            if change <= 1e-12 * magnitude {
                break;
            }
        }

        let curve = TrendCurve {
            center,
            scale,
            coefficients,
        };
        Ok(FittedTrend::new(curve, points, weights, iterations))
    }
}

fn horner(coefficients: &[f64], t: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * t + c)
}

/// Weighted least squares for a polynomial of `degree` in `t`.
///
/// Rows are scaled by the square root of their weight and solved through the SVD,
/// so a rank-deficient design is reported instead of producing wild coefficients.
fn weighted_polyfit(ts: &[f64], ys: &[f64], weights: &[f64], degree: usize) -> Result<Vec<f64>, PaceError> {
    let size = degree + 1;
    let roots: Vec<f64> = weights.iter().map(|w| w.sqrt()).collect();
    let design = DMatrix::from_fn(ts.len(), size, |row, col| roots[row] * ts[row].powi(col as i32));
    let target = DVector::from_iterator(ys.len(), ys.iter().zip(&roots).map(|(y, r)| r * y));

    let svd = design.svd(true, true);
    let tolerance = 1e-12 * svd.singular_values.max().max(f64::MIN_POSITIVE);
    if svd.rank(tolerance) < size {
        return Err(PaceError::DegenerateFit(
            "weighted design matrix is rank deficient".to_string(),
        ));
    }
    let solution = svd
        .solve(&target, tolerance)
        .map_err(|e| PaceError::DegenerateFit(e.to_string()))?;
    Ok(solution.iter().copied().collect())
}

/// Theil–Sen estimator: the median of all pairwise slopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TheilSen;

impl TrendFit for TheilSen {
    fn name(&self) -> &'static str {
        "theil_sen"
    }

    fn fit(&self, points: &[(f64, f64)]) -> Result<FittedTrend, PaceError> {
        check_identifiable(points, 2)?;

        let mut slopes = Vec::with_capacity(points.len() * (points.len() - 1) / 2);
        for (i, &(x1, y1)) in points.iter().enumerate() {
            for &(x2, y2) in &points[i + 1..] {
                if x1 != x2 {
                    slopes.push((y2 - y1) / (x2 - x1));
                }
            }
        }
        let slope = stats::median(&slopes)
            .ok_or_else(|| PaceError::DegenerateFit("no pairwise slopes".to_string()))?;
        let intercepts: Vec<f64> = points.iter().map(|&(x, y)| y - slope * x).collect();
        let intercept = stats::median(&intercepts)
            .ok_or_else(|| PaceError::DegenerateFit("no intercepts".to_string()))?;

        let curve = TrendCurve {
            center: 0.0,
            scale: 1.0,
            coefficients: vec![intercept, slope],
        };
        Ok(FittedTrend::new(curve, points, vec![1.0; points.len()], 0))
    }
}
