use configuration::{ExcitementPolicy, LeverageConfig};
use core_types::{DriverId, RaceId, RaceSession, Standing, StandingsSide, TrackType};
use serde::{Deserialize, Serialize};

use crate::error::LeverageError;

/// How much one race moved the championship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageScore {
    pub race_id: RaceId,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub track_type: Option<TrackType>,
    /// Drivers present in both the pre- and post-race standings.
    pub field_size: usize,
    /// Field-size-normalized standings churn plus the change in title gaps
    /// among drivers still in contention.
    pub advancement: f64,
    /// Change in title uncertainty under the configured policy.
    pub excitement: f64,
    pub scale_factor: f64,
    /// `scale_factor * (advancement + excitement)`.
    pub combined: f64,
}

impl LeverageScore {
    /// Re-derives `combined` from the stored components under a new factor.
    pub fn rescaled(&self, factor: f64) -> Result<Self, LeverageError> {
        check_scale_factor(factor)?;
        Ok(Self {
            scale_factor: factor,
            combined: factor * (self.advancement + self.excitement),
            ..self.clone()
        })
    }
}

pub(crate) fn check_scale_factor(factor: f64) -> Result<(), LeverageError> {
    if factor.is_finite() && factor > 0.0 {
        Ok(())
    } else {
        Err(LeverageError::InvalidScaleFactor(factor))
    }
}

/// One driver's championship state on both sides of the race.
struct Entry<'a> {
    pre: &'a Standing,
    post: &'a Standing,
}

/// Scores races by the championship movement they caused.
#[derive(Debug, Clone, Default)]
pub struct LeverageEstimator {
    config: LeverageConfig,
}

impl LeverageEstimator {
    pub fn new(config: LeverageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LeverageConfig {
        &self.config
    }

    /// Computes advancement, excitement and the combined score for one race.
    ///
    /// Every classified driver needs an entry on both sides of the standings;
    /// a missing one is reported, never treated as zero points.
    #[tracing::instrument(skip(self, session), fields(race = %session.race_id()))]
    pub fn estimate(
        &self,
        session: &RaceSession,
        scale_factor: f64,
    ) -> Result<LeverageScore, LeverageError> {
        session.validate()?;
        let race_id = session.race_id();

        for driver in &session.finishing_order {
            let side = match (
                session.pre_race_standings.contains_key(driver),
                session.post_race_standings.contains_key(driver),
            ) {
                (true, true) => continue,
                (false, _) => StandingsSide::PreRace,
                (true, false) => StandingsSide::PostRace,
            };
            return Err(LeverageError::MissingStandings {
                race: race_id,
                driver: driver.clone(),
                side,
            });
        }

        check_scale_factor(scale_factor)?;

        let field: Vec<(&DriverId, Entry)> = session
            .pre_race_standings
            .iter()
            .filter_map(|(driver, pre)| {
                session
                    .post_race_standings
                    .get(driver)
                    .map(|post| (driver, Entry { pre, post }))
            })
            .collect();
        let entries: Vec<&Entry> = field.iter().map(|(_, entry)| entry).collect();

        let max_points = self.config.points.max_points(session.series);
        let rounds_after = session.season_rounds.saturating_sub(session.round) as f64;
        let remaining_pre = (rounds_after + 1.0) * max_points;
        let remaining_post = rounds_after * max_points;

        let churn = churn(&entries);
        let contention = contention(&entries, remaining_pre, remaining_post);
        let advancement = churn + contention;

        let h_pre = title_entropy(entries.iter().map(|e| e.pre.points), remaining_pre);
        let h_post = title_entropy(entries.iter().map(|e| e.post.points), remaining_post);
        let shift = h_pre - h_post;
        let excitement = match self.config.excitement {
            ExcitementPolicy::EntropyReduction => {
                if shift > 0.0 {
                    shift
                } else {
                    0.0
                }
            }
            ExcitementPolicy::EntropyShift => shift.abs(),
        };

        tracing::debug!(
            field = field.len(),
            churn,
            contention,
            h_pre,
            h_post,
            excitement,
            "Estimated race leverage."
        );

        Ok(LeverageScore {
            race_id,
            track: session.track().map(str::to_string),
            track_type: session.track_type(),
            field_size: field.len(),
            advancement,
            excitement,
            scale_factor,
            combined: scale_factor * (advancement + excitement),
        })
    }
}

/// Standing as a fraction of the field, the middle of the driver's slot.
fn relative_standing(position: u32, field_size: f64) -> f64 {
    ((position as f64 - 0.5) / field_size).clamp(0.0, 1.0)
}

/// Position movement, weighted by points swing and by how near the front it happened.
fn churn(field: &[&Entry]) -> f64 {
    if field.is_empty() {
        return 0.0;
    }
    let n = field.len() as f64;
    let max_swing = field
        .iter()
        .map(|e| (e.post.points - e.pre.points).abs())
        .fold(0.0, f64::max);

    let total: f64 = field
        .iter()
        .map(|e| {
            let u_pre = relative_standing(e.pre.position, n);
            let u_post = relative_standing(e.post.position, n);
            let points_weight = if max_swing > 0.0 {
                1.0 + (e.post.points - e.pre.points).abs() / max_swing
            } else {
                1.0
            };
            let stakes = 1.0 - u_pre.min(u_post);
            (u_post - u_pre).abs() * points_weight * stakes
        })
        .sum();
    total / n
}

/// Change in each driver's gap to the leader, as a share of the points still
/// available, weighted by how alive the driver's title chances are.
fn contention(field: &[&Entry], remaining_pre: f64, remaining_post: f64) -> f64 {
    if field.is_empty() || remaining_pre <= 0.0 {
        return 0.0;
    }
    let leader_pre = field.iter().map(|e| e.pre.points).fold(f64::NEG_INFINITY, f64::max);
    let leader_post = field.iter().map(|e| e.post.points).fold(f64::NEG_INFINITY, f64::max);

    let total: f64 = field
        .iter()
        .map(|e| {
            let gap_pre = leader_pre - e.pre.points;
            let gap_post = leader_post - e.post.points;
            let weight = contender_weight(gap_pre, remaining_pre)
                .max(contender_weight(gap_post, remaining_post));
            ((gap_post - gap_pre).abs() / remaining_pre).min(1.0) * weight
        })
        .sum();
    total / field.len() as f64
}

/// Chance-weighted share of the title each driver still holds.
fn contender_weight(gap: f64, remaining: f64) -> f64 {
    if remaining > 0.0 && gap < remaining {
        1.0 - gap / remaining
    } else if gap <= 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Normalized entropy of the title distribution, in [0, 1].
fn title_entropy(points: impl Iterator<Item = f64> + Clone, remaining: f64) -> f64 {
    let n = points.clone().count();
    if n <= 1 {
        return 0.0;
    }
    let leader = points.clone().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = points
        .map(|p| contender_weight(leader - p, remaining))
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let entropy: f64 = weights
        .iter()
        .filter(|w| **w > 0.0)
        .map(|w| {
            let p = w / total;
            -p * p.ln()
        })
        .sum();
    (entropy / (n as f64).ln()).max(0.0)
}
