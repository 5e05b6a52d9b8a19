use core_types::Series;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub pace: PaceConfig,
    pub leverage: LeverageConfig,
}

/// Selects which sessions a run processes and how much parallelism it uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Series to include. Empty means every series found in the input.
    pub series: Vec<Series>,
    /// First season of the window (inclusive).
    pub season_start: Option<u16>,
    /// Last season of the window (inclusive).
    pub season_end: Option<u16>,
    /// Only rounds up to and including this one are processed.
    pub max_rounds: Option<u32>,
    /// Worker threads; 0 uses one per available core.
    pub workers: usize,
    /// Races left out of every run, e.g. `exclude = [{ season = 2021, round = 12 }]`.
    pub exclude: Vec<ExcludedRace>,
}

/// One race to skip. Without a series it matches that season and round in every series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedRace {
    #[serde(default)]
    pub series: Option<Series>,
    pub season: u16,
    pub round: u32,
}

impl ExcludedRace {
    pub fn matches(&self, series: Series, season: u16, round: u32) -> bool {
        self.series.is_none_or(|s| s == series) && self.season == season && self.round == round
    }
}

impl RunConfig {
    /// Whether a race with this identity falls inside the configured window.
    pub fn includes(&self, series: Series, season: u16, round: u32) -> bool {
        (self.series.is_empty() || self.series.contains(&series))
            && self.season_start.is_none_or(|start| season >= start)
            && self.season_end.is_none_or(|end| season <= end)
            && self.max_rounds.is_none_or(|max| round <= max)
            && !self.exclude.iter().any(|e| e.matches(series, season, round))
    }
}

/// Parameters for the pace normalizer and the team aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceConfig {
    /// A driver needs at least this many fitted laps to produce a series.
    pub min_driver_laps: usize,
    /// Green-flag segments with fewer clean laps than this are dropped.
    pub min_segment_laps: usize,
    pub trend: TrendConfig,
    pub smoothing: SmoothingConfig,
}

impl Default for PaceConfig {
    fn default() -> Self {
        Self {
            min_driver_laps: 10,
            min_segment_laps: 5,
            trend: TrendConfig::default(),
            smoothing: SmoothingConfig::default(),
        }
    }
}

/// Which robust trend model absorbs fuel burn-off and tyre degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum TrendFitKind {
    /// Polynomial least squares with iteratively re-weighted (bisquare) residuals.
    Irls,
    /// Median of pairwise slopes. Linear only.
    TheilSen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub kind: TrendFitKind,
    /// Polynomial degree for the IRLS fit.
    pub degree: usize,
    pub max_iterations: usize,
    /// Bisquare tuning constant, in units of the robust residual scale.
    pub tuning: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            kind: TrendFitKind::Irls,
            degree: 1,
            max_iterations: 20,
            tuning: 4.685,
        }
    }
}

/// Rolling-window smoothing of the season pace series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Races pooled on either side of the current one.
    pub half_window: usize,
    /// Two-sided confidence level of the reported interval.
    pub ci_level: f64,
    /// Deltas are rescaled to a lap of this length before pooling races.
    pub baseline_lap_seconds: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            half_window: 3,
            ci_level: 0.8,
            baseline_lap_seconds: 100.0,
        }
    }
}

/// How excitement (championship uncertainty change) is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum ExcitementPolicy {
    /// Only narrowing of the title picture counts.
    EntropyReduction,
    /// Any change in title uncertainty counts, narrowing or re-opening.
    EntropyShift,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeverageConfig {
    pub scale_factor: f64,
    pub excitement: ExcitementPolicy,
    pub points: PointsScale,
}

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            excitement: ExcitementPolicy::EntropyReduction,
            points: PointsScale::default(),
        }
    }
}

/// Most championship points a single driver can score in one race, per series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointsScale {
    pub formula1: f64,
    pub nascar_cup: f64,
    pub nascar_xfinity: f64,
    pub nascar_truck: f64,
}

impl Default for PointsScale {
    fn default() -> Self {
        Self {
            formula1: 26.0,
            nascar_cup: 60.0,
            nascar_xfinity: 60.0,
            nascar_truck: 60.0,
        }
    }
}

impl PointsScale {
    pub fn max_points(&self, series: Series) -> f64 {
        match series {
            Series::Formula1 => self.formula1,
            Series::NascarCup => self.nascar_cup,
            Series::NascarXfinity => self.nascar_xfinity,
            Series::NascarTruck => self.nascar_truck,
        }
    }
}

impl Config {
    /// Rejects values the estimators cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(start), Some(end)) = (self.run.season_start, self.run.season_end) {
            if start > end {
                return Err(ConfigError::ValidationError(format!(
                    "season_start ({}) is after season_end ({})",
                    start, end
                )));
            }
        }
        if let Some(bad) = self.run.exclude.iter().find(|e| e.round == 0) {
            return Err(ConfigError::ValidationError(format!(
                "run.exclude entry for season {} has round 0",
                bad.season
            )));
        }
        if self.run.max_rounds == Some(0) {
            return Err(ConfigError::ValidationError(
                "max_rounds must be at least 1".to_string(),
            ));
        }

        let pace = &self.pace;
        if pace.min_driver_laps == 0 {
            return Err(ConfigError::ValidationError(
                "pace.min_driver_laps must be greater than 0".to_string(),
            ));
        }
        if pace.min_segment_laps < pace.trend.degree + 1 {
            return Err(ConfigError::ValidationError(format!(
                "pace.min_segment_laps ({}) must exceed the trend degree ({})",
                pace.min_segment_laps, pace.trend.degree
            )));
        }
        if pace.trend.kind == TrendFitKind::TheilSen && pace.trend.degree != 1 {
            return Err(ConfigError::ValidationError(
                "the theil_sen trend fit is linear; set pace.trend.degree = 1".to_string(),
            ));
        }
        if !(pace.trend.tuning.is_finite() && pace.trend.tuning > 0.0) {
            return Err(ConfigError::ValidationError(
                "pace.trend.tuning must be a positive number".to_string(),
            ));
        }
        let smoothing = &pace.smoothing;
        if !(smoothing.ci_level > 0.0 && smoothing.ci_level < 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "pace.smoothing.ci_level ({}) must be between 0 and 1",
                smoothing.ci_level
            )));
        }
        if !(smoothing.baseline_lap_seconds.is_finite() && smoothing.baseline_lap_seconds > 0.0) {
            return Err(ConfigError::ValidationError(
                "pace.smoothing.baseline_lap_seconds must be positive".to_string(),
            ));
        }

        let leverage = &self.leverage;
        if !(leverage.scale_factor.is_finite() && leverage.scale_factor > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "leverage.scale_factor ({}) must be a positive number",
                leverage.scale_factor
            )));
        }
        for series in Series::ALL {
            let points = leverage.points.max_points(series);
            if !(points.is_finite() && points > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "leverage.points.{} must be positive",
                    series
                )));
            }
        }

        Ok(())
    }
}
