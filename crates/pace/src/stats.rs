//! Descriptive statistics over `f64` slices, with `None` for empty input.
//!
//! Thin wrappers over `statrs`, which returns NaN for an empty sample.

use statrs::statistics::{Data, OrderStatistics, Statistics};

pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.mean())
}

pub fn median(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| Data::new(values.to_vec()).median())
}

/// Standard deviation with divisor n.
pub fn population_stdev(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.population_std_dev())
}

/// Standard deviation with divisor n - 1.
pub fn sample_stdev(values: &[f64]) -> Option<f64> {
    (values.len() >= 2).then(|| values.std_dev())
}

/// Median of absolute values, the robust residual scale used by the IRLS fit.
pub fn median_abs(values: &[f64]) -> Option<f64> {
    let abs: Vec<f64> = values.iter().map(|v| v.abs()).collect();
    median(&abs)
}
