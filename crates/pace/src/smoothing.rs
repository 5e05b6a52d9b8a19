use configuration::SmoothingConfig;
use core_types::{Series, TeamId};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::PaceError;
use crate::series::SeasonPace;
use crate::stats;

/// Rolling pace for one team at one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedPoint {
    pub round: u32,
    /// Mean pooled delta, in seconds on a baseline-length lap.
    pub mean: f64,
    pub stdev: f64,
    pub n: usize,
    /// Standard error of the mean. `None` with fewer than two laps.
    pub sem: Option<f64>,
    pub ci_half_width: Option<f64>,
}

impl SmoothedPoint {
    pub fn interval(&self) -> Option<(f64, f64)> {
        self.ci_half_width
            .map(|half| (self.mean - half, self.mean + half))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedTeam {
    pub team_id: TeamId,
    pub points: Vec<SmoothedPoint>,
}

impl SmoothedTeam {
    pub fn latest(&self) -> Option<&SmoothedPoint> {
        self.points.last()
    }
}

/// Smoothed pace for a season. Teams are kept in legend order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonSmoothing {
    pub series: Series,
    pub season: u16,
    pub half_window: usize,
    pub ci_level: f64,
    pub baseline_lap_seconds: f64,
    pub teams: Vec<SmoothedTeam>,
}

impl SeasonSmoothing {
    pub fn team(&self, team: &TeamId) -> Option<&SmoothedTeam> {
        self.teams.iter().find(|t| &t.team_id == team)
    }
}

/// Pools each team's lap deltas over a window of neighbouring races.
///
/// The window runs over the rounds actually processed, `half_window` races on
/// either side. Deltas are rescaled to a `baseline_lap_seconds` lap using each
/// race's reference lap, so short and long circuits pool on the same footing.
pub fn smooth(season: &SeasonPace, config: &SmoothingConfig) -> Result<SeasonSmoothing, PaceError> {
    let mut teams = Vec::with_capacity(season.teams.len());

    for (team_id, series) in &season.teams {
        let mut points = Vec::new();
        for (index, &round) in season.rounds.iter().enumerate() {
            let lo = index.saturating_sub(config.half_window);
            let hi = (index + config.half_window).min(season.rounds.len() - 1);
            let window = &season.rounds[lo..=hi];

            let pooled: Vec<f64> = window
                .iter()
                .filter_map(|r| series.get(*r))
                .filter_map(|sample| {
                    let reference = sample.reference_lap?;
                    let scale = config.baseline_lap_seconds / reference;
                    Some(sample.lap_deltas.iter().map(move |d| d * scale))
                })
                .flatten()
                .collect();

            let (Some(mean), Some(stdev)) =
                (stats::mean(&pooled), stats::population_stdev(&pooled))
            else {
                continue;
            };

            let n = pooled.len();
            let sem = stats::sample_stdev(&pooled).map(|s| s / (n as f64).sqrt());
            let ci_half_width = match sem {
                Some(sem) => Some(sem * t_quantile((1.0 + config.ci_level) / 2.0, n - 1)?),
                None => None,
            };

            points.push(SmoothedPoint {
                round,
                mean,
                stdev,
                n,
                sem,
                ci_half_width,
            });
        }

        teams.push(SmoothedTeam {
            team_id: team_id.clone(),
            points,
        });
    }

    let mut smoothing = SeasonSmoothing {
        series: season.series,
        season: season.season,
        half_window: config.half_window,
        ci_level: config.ci_level,
        baseline_lap_seconds: config.baseline_lap_seconds,
        teams,
    };
    smoothing.teams = legend_order(&smoothing)
        .into_iter()
        .filter_map(|team| smoothing.team(&team).cloned())
        .collect();

    tracing::debug!(
        series = %season.series,
        season = season.season,
        teams = smoothing.teams.len(),
        "Smoothed season pace."
    );
    Ok(smoothing)
}

/// Teams sorted by their latest smoothed mean, fastest first. Teams with no
/// smoothed point go last, by name.
pub fn legend_order(smoothing: &SeasonSmoothing) -> Vec<TeamId> {
    smoothing
        .teams
        .iter()
        .sorted_by(|a, b| {
            match (a.latest(), b.latest()) {
                (Some(x), Some(y)) => x.mean.total_cmp(&y.mean),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then_with(|| a.team_id.cmp(&b.team_id))
        })
        .map(|t| t.team_id.clone())
        .collect()
}

/// Two-sided Student-t quantile with `dof` degrees of freedom.
pub fn t_quantile(probability: f64, dof: usize) -> Result<f64, PaceError> {
    let dist = StudentsT::new(0.0, 1.0, dof as f64)
        .map_err(|e| PaceError::Statistics(e.to_string()))?;
    Ok(dist.inverse_cdf(probability))
}
