use core_types::{RaceId, Series, TeamId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregator::{PaceSample, RacePace, TeamGap};
use crate::error::PaceError;

/// A team's pace over a season, one sample per race it had data for.
///
/// Append-only: rounds must arrive in strictly increasing order. Rounds without a
/// sample are simply missing, never filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceSeries {
    pub team_id: TeamId,
    samples: Vec<PaceSample>,
}

impl PaceSeries {
    pub fn new(team_id: TeamId) -> Self {
        Self {
            team_id,
            samples: Vec::new(),
        }
    }

    pub fn append(&mut self, sample: PaceSample) -> Result<(), PaceError> {
        if sample.team_id != self.team_id {
            return Err(PaceError::TeamMismatch {
                expected: self.team_id.clone(),
                found: sample.team_id,
            });
        }
        if let Some(last) = self.samples.last() {
            if sample.race_id.round <= last.race_id.round {
                return Err(PaceError::OutOfOrder {
                    team: self.team_id.clone(),
                    round: sample.race_id.round,
                    last: last.race_id.round,
                });
            }
        }
        self.samples.push(sample);
        Ok(())
    }

    pub fn samples(&self) -> &[PaceSample] {
        &self.samples
    }

    pub fn get(&self, round: u32) -> Option<&PaceSample> {
        self.samples.iter().find(|s| s.race_id.round == round)
    }

    pub fn rounds(&self) -> Vec<u32> {
        self.samples.iter().map(|s| s.race_id.round).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Team pace for a whole season of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonPace {
    pub series: Series,
    pub season: u16,
    /// Every round that was processed, whether or not any team had a sample.
    pub rounds: Vec<u32>,
    /// Session reference lap per round.
    pub reference_laps: BTreeMap<u32, f64>,
    pub teams: BTreeMap<TeamId, PaceSeries>,
    pub gaps: Vec<TeamGap>,
}

impl SeasonPace {
    pub fn new(series: Series, season: u16) -> Self {
        Self {
            series,
            season,
            rounds: Vec::new(),
            reference_laps: BTreeMap::new(),
            teams: BTreeMap::new(),
            gaps: Vec::new(),
        }
    }

    /// Folds per-race results into season series.
    ///
    /// Races may be supplied in any order (workers finish out of order); they are
    /// sorted by round before appending, so the result is the same either way.
    pub fn from_races(
        series: Series,
        season: u16,
        mut races: Vec<RacePace>,
    ) -> Result<Self, PaceError> {
        races.sort_by_key(|r| r.race_id);
        let mut season_pace = Self::new(series, season);
        for race in races {
            season_pace.push_race(race)?;
        }
        Ok(season_pace)
    }

    /// Appends the next race of the season.
    pub fn push_race(&mut self, race: RacePace) -> Result<(), PaceError> {
        let race_id: RaceId = race.race_id;
        if race_id.series != self.series || race_id.season != self.season {
            return Err(PaceError::ForeignRace {
                race: race_id,
                series: self.series,
                season: self.season,
            });
        }
        if let Some(&last) = self.rounds.last() {
            if race_id.round == last {
                return Err(PaceError::DuplicateRace(race_id));
            }
            if race_id.round < last {
                return Err(PaceError::OutOfOrder {
                    team: TeamId::from("*"),
                    round: race_id.round,
                    last,
                });
            }
        }

        self.rounds.push(race_id.round);
        if let Some(reference) = race.reference_lap {
            self.reference_laps.insert(race_id.round, reference);
        }
        for (team, sample) in race.samples {
            self.teams
                .entry(team.clone())
                .or_insert_with(|| PaceSeries::new(team))
                .append(sample)?;
        }
        self.gaps.extend(race.gaps);
        Ok(())
    }

    pub fn series_for(&self, team: &TeamId) -> Option<&PaceSeries> {
        self.teams.get(team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::GapReason;

    fn sample(team: &str, round: u32, delta: f64) -> PaceSample {
        PaceSample {
            team_id: team.into(),
            race_id: RaceId::new(Series::Formula1, 2023, round),
            delta,
            mean: delta,
            stdev: 0.0,
            laps: 1,
            drivers: 1,
            percent: None,
            reference_lap: Some(90.0),
            lap_deltas: vec![delta],
        }
    }

    fn race(round: u32, samples: &[(&str, f64)], gaps: &[&str]) -> RacePace {
        let race_id = RaceId::new(Series::Formula1, 2023, round);
        RacePace {
            race_id,
            reference_lap: Some(90.0 + round as f64),
            samples: samples
                .iter()
                .map(|(team, delta)| ((*team).into(), sample(team, round, *delta)))
                .collect(),
            gaps: gaps
                .iter()
                .map(|team| TeamGap {
                    team_id: (*team).into(),
                    race_id,
                    reason: GapReason::NoEligibleDrivers { entered: 2 },
                })
                .collect(),
        }
    }

    #[test]
    fn test_append_rejects_out_of_order_rounds() {
        let mut series = PaceSeries::new("McLaren".into());
        series.append(sample("McLaren", 2, 0.1)).unwrap();
        assert!(matches!(
            series.append(sample("McLaren", 2, 0.2)),
            Err(PaceError::OutOfOrder { round: 2, last: 2, .. })
        ));
        assert!(series.append(sample("McLaren", 1, 0.2)).is_err());
        assert!(matches!(
            series.append(sample("Ferrari", 3, 0.2)),
            Err(PaceError::TeamMismatch { .. })
        ));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_series_length_counts_races_with_a_sample() {
        let races = vec![
            race(1, &[("McLaren", -0.3), ("Alpine", 0.4)], &[]),
            race(2, &[("McLaren", -0.2)], &["Alpine"]),
            race(3, &[("McLaren", -0.4), ("Alpine", 0.5)], &[]),
        ];
        let season = SeasonPace::from_races(Series::Formula1, 2023, races).unwrap();

        assert_eq!(season.rounds, vec![1, 2, 3]);
        assert_eq!(season.series_for(&"McLaren".into()).unwrap().len(), 3);
        let alpine = season.series_for(&"Alpine".into()).unwrap();
        assert_eq!(alpine.rounds(), vec![1, 3]);
        assert!(alpine.get(2).is_none());
        assert_eq!(season.gaps.len(), 1);
    }

    #[test]
    fn test_out_of_order_fold_matches_in_order_fold() {
        let in_order = vec![
            race(1, &[("Haas", 0.6)], &[]),
            race(2, &[("Haas", 0.5)], &[]),
            race(3, &[("Haas", 0.7)], &[]),
        ];
        let mut shuffled = in_order.clone();
        shuffled.swap(0, 2);

        let a = SeasonPace::from_races(Series::Formula1, 2023, in_order).unwrap();
        let b = SeasonPace::from_races(Series::Formula1, 2023, shuffled).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_and_foreign_races_are_rejected() {
        let duplicate = vec![race(4, &[("Haas", 0.6)], &[]), race(4, &[("Haas", 0.5)], &[])];
        assert!(matches!(
            SeasonPace::from_races(Series::Formula1, 2023, duplicate),
            Err(PaceError::DuplicateRace(_))
        ));

        let foreign = vec![race(1, &[("Haas", 0.6)], &[])];
        assert!(matches!(
            SeasonPace::from_races(Series::Formula1, 2024, foreign),
            Err(PaceError::ForeignRace { .. })
        ));
    }
}
