use core_types::{DriverId, RaceId, TeamId};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::normalizer::NormalizedSession;
use crate::stats;

/// One team's normalized pace offset for one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceSample {
    pub team_id: TeamId,
    pub race_id: RaceId,
    /// Median normalized delta over every eligible lap of the team, in seconds
    /// relative to the session median. Negative is faster.
    pub delta: f64,
    pub mean: f64,
    pub stdev: f64,
    pub laps: usize,
    pub drivers: usize,
    /// `delta` as a percentage of the session reference lap.
    pub percent: Option<f64>,
    pub reference_lap: Option<f64>,
    /// Pooled per-lap deltas the sample was computed from.
    pub lap_deltas: Vec<f64>,
}

/// Why a team has no sample for a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum GapReason {
    NoEligibleDrivers { entered: usize },
}

/// An explicit "no data" entry for a team at one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamGap {
    pub team_id: TeamId,
    pub race_id: RaceId,
    pub reason: GapReason,
}

/// Team pace for one race: a sample per team with data, a gap per team without.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacePace {
    pub race_id: RaceId,
    pub reference_lap: Option<f64>,
    pub samples: BTreeMap<TeamId, PaceSample>,
    pub gaps: Vec<TeamGap>,
}

/// Rolls normalized per-driver deltas up into one sample per team.
///
/// The median resists a single driver's incident laps. Teams in `teams` whose
/// drivers all lack normalized data produce a gap, never a made-up value.
pub fn aggregate(normalized: &NormalizedSession, teams: &BTreeMap<DriverId, TeamId>) -> RacePace {
    let race_id = normalized.race_id;
    let reference_lap = normalized.reference_lap;

    let mut samples = BTreeMap::new();
    let mut gaps = Vec::new();

    let rosters = teams
        .iter()
        .map(|(driver, team)| (team, driver))
        .into_group_map();

    for (team, drivers) in rosters.into_iter().sorted_by(|a, b| a.0.cmp(b.0)) {
        let eligible: Vec<_> = drivers
            .iter()
            .sorted()
            .filter_map(|d| normalized.drivers.get(*d))
            .collect();
        let lap_deltas: Vec<f64> = eligible
            .iter()
            .flat_map(|pace| pace.laps.iter().map(|l| l.delta))
            .collect();

        let (Some(delta), Some(mean), Some(stdev)) = (
            stats::median(&lap_deltas),
            stats::mean(&lap_deltas),
            stats::population_stdev(&lap_deltas),
        ) else {
            tracing::debug!(race = %race_id, team = %team, "No eligible drivers; leaving a gap.");
            gaps.push(TeamGap {
                team_id: team.clone(),
                race_id,
                reason: GapReason::NoEligibleDrivers {
                    entered: drivers.len(),
                },
            });
            continue;
        };

        samples.insert(
            team.clone(),
            PaceSample {
                team_id: team.clone(),
                race_id,
                delta,
                mean,
                stdev,
                laps: lap_deltas.len(),
                drivers: eligible.len(),
                percent: reference_lap.map(|reference| delta * 100.0 / reference),
                reference_lap,
                lap_deltas,
            },
        );
    }

    RacePace {
        race_id,
        reference_lap,
        samples,
        gaps,
    }
}
