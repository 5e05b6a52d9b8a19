use core_types::{RaceId, Series, TrackType};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Max, Min, OrderStatistics, Statistics};
use std::collections::BTreeSet;

use crate::error::LeverageError;
use crate::estimator::{LeverageScore, check_scale_factor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRace {
    /// 1-based.
    pub rank: usize,
    pub race_id: RaceId,
    pub combined: f64,
}

/// A race with no score, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmittedRace {
    pub race_id: RaceId,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl Distribution {
    fn from_values(values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut data = Data::new(values);
        Some(Self {
            min: data.min(),
            max: data.max(),
            mean: data.iter().mean(),
            median: data.median(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeverageStatistics {
    pub races: usize,
    pub advancement: Distribution,
    pub excitement: Distribution,
    pub combined: Distribution,
}

impl LeverageStatistics {
    fn from_scores(scores: &[&LeverageScore]) -> Option<Self> {
        let column = |f: fn(&LeverageScore) -> f64| -> Vec<f64> { scores.iter().map(|s| f(s)).collect() };
        Some(Self {
            races: scores.len(),
            advancement: Distribution::from_values(column(|s| s.advancement))?,
            excitement: Distribution::from_values(column(|s| s.excitement))?,
            combined: Distribution::from_values(column(|s| s.combined))?,
        })
    }
}

/// Key for races whose event names no track.
pub const UNKNOWN_TRACK: &str = "unknown";

/// Leverage of every scored race held at one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackStatistics {
    pub track: String,
    /// Set only when every race at the track states the same type.
    pub track_type: Option<TrackType>,
    pub statistics: LeverageStatistics,
}

/// Leverage over one or more seasons and series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonLeverageSummary {
    pub series: BTreeSet<Series>,
    /// First and last season covered, inclusive.
    pub season_range: Option<(u16, u16)>,
    /// Chronological.
    pub scores: Vec<LeverageScore>,
    /// Highest combined score first.
    pub ranking: Vec<RankedRace>,
    pub omitted: Vec<OmittedRace>,
}

/// Builds a summary from per-race scores in any order.
pub fn summarize(scores: Vec<LeverageScore>) -> SeasonLeverageSummary {
    let mut summary = SeasonLeverageSummary {
        scores,
        ..SeasonLeverageSummary::default()
    };
    summary.refresh();
    summary
}

impl SeasonLeverageSummary {
    /// Appends another summary. Scores are taken as they are, never re-normalized.
    pub fn concat(mut self, other: SeasonLeverageSummary) -> Self {
        self.scores.extend(other.scores);
        self.omitted.extend(other.omitted);
        self.series.extend(other.series);
        self.season_range = widen(self.season_range, other.season_range);
        self.refresh();
        self
    }

    /// Records a race that has no score.
    pub fn omit(&mut self, race_id: RaceId, reason: impl Into<String>) {
        self.omitted.push(OmittedRace {
            race_id,
            reason: reason.into(),
        });
        self.refresh();
    }

    pub fn score(&self, race_id: &RaceId) -> Option<&LeverageScore> {
        self.scores.iter().find(|s| &s.race_id == race_id)
    }

    pub fn top(&self, n: usize) -> &[RankedRace] {
        &self.ranking[..n.min(self.ranking.len())]
    }

    /// Statistics over every scored race; `None` when nothing was scored.
    pub fn statistics(&self) -> Option<LeverageStatistics> {
        LeverageStatistics::from_scores(&self.scores.iter().collect::<Vec<_>>())
    }

    /// Statistics per track, highest mean combined score first.
    ///
    /// Races without a track key are pooled under [`UNKNOWN_TRACK`].
    pub fn statistics_by_track(&self) -> Vec<TrackStatistics> {
        self.scores
            .iter()
            .into_group_map_by(|s| s.track.clone().unwrap_or_else(|| UNKNOWN_TRACK.to_string()))
            .into_iter()
            .filter_map(|(track, scores)| {
                let types: BTreeSet<TrackType> = scores.iter().filter_map(|s| s.track_type).collect();
                let track_type = if types.len() == 1 {
                    types.into_iter().next()
                } else {
                    None
                };
                Some(TrackStatistics {
                    track,
                    track_type,
                    statistics: LeverageStatistics::from_scores(&scores)?,
                })
            })
            .sorted_by(|a, b| {
                b.statistics
                    .combined
                    .mean
                    .total_cmp(&a.statistics.combined.mean)
                    .then_with(|| a.track.cmp(&b.track))
            })
            .collect()
    }

    /// Every score under a new scale factor. The ranking order cannot change.
    pub fn rescaled(&self, factor: f64) -> Result<Self, LeverageError> {
        check_scale_factor(factor)?;
        let scores = self
            .scores
            .iter()
            .map(|s| s.rescaled(factor))
            .collect::<Result<Vec<_>, _>>()?;
        let mut summary = Self {
            scores,
            ..self.clone()
        };
        summary.refresh();
        Ok(summary)
    }

    fn refresh(&mut self) {
        self.scores.sort_by_key(|s| s.race_id);
        self.omitted.sort_by_key(|o| o.race_id);

        let races = self
            .scores
            .iter()
            .map(|s| s.race_id)
            .chain(self.omitted.iter().map(|o| o.race_id));
        for race in races {
            self.series.insert(race.series);
            self.season_range = widen(self.season_range, Some((race.season, race.season)));
        }

        self.ranking = self
            .scores
            .iter()
            .sorted_by(|a, b| {
                b.combined
                    .total_cmp(&a.combined)
                    .then_with(|| a.race_id.cmp(&b.race_id))
            })
            .enumerate()
            .map(|(i, s)| RankedRace {
                rank: i + 1,
                race_id: s.race_id,
                combined: s.combined,
            })
            .collect();
    }
}

fn widen(a: Option<(u16, u16)>, b: Option<(u16, u16)>) -> Option<(u16, u16)> {
    match (a, b) {
        (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
        (range, None) | (None, range) => range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(series: Series, season: u16, round: u32, advancement: f64, excitement: f64) -> LeverageScore {
        LeverageScore {
            race_id: RaceId::new(series, season, round),
            track: None,
            track_type: None,
            field_size: 20,
            advancement,
            excitement,
            scale_factor: 1.0,
            combined: advancement + excitement,
        }
    }

    fn ranked(summary: &SeasonLeverageSummary) -> Vec<(u16, u32)> {
        summary
            .ranking
            .iter()
            .map(|r| (r.race_id.season, r.race_id.round))
            .collect()
    }

    #[test]
    fn test_ranking_descending_with_round_tie_break() {
        let summary = summarize(vec![
            score(Series::Formula1, 2021, 5, 0.1, 0.1),
            score(Series::Formula1, 2021, 2, 0.3, 0.0),
            score(Series::Formula1, 2021, 9, 0.05, 0.5),
            score(Series::Formula1, 2021, 1, 0.2, 0.0),
        ]);

        // Rounds 1 and 5 tie on 0.2; the earlier round ranks first.
        assert_eq!(ranked(&summary), vec![(2021, 9), (2021, 2), (2021, 1), (2021, 5)]);
        assert_eq!(summary.ranking[0].rank, 1);
        let rounds: Vec<u32> = summary.scores.iter().map(|s| s.race_id.round).collect();
        assert_eq!(rounds, vec![1, 2, 5, 9]);
        assert_eq!(summary.season_range, Some((2021, 2021)));
    }

    #[test]
    fn test_concat_spans_seasons_and_series() {
        let f1 = summarize(vec![score(Series::Formula1, 2022, 3, 0.2, 0.2)]);
        let mut cup = summarize(vec![score(Series::NascarCup, 2020, 3, 0.2, 0.2)]);
        cup.omit(RaceId::new(Series::NascarCup, 2020, 4), "missing standings");

        let combined = f1.concat(cup);
        assert_eq!(
            combined.series,
            BTreeSet::from([Series::Formula1, Series::NascarCup])
        );
        assert_eq!(combined.season_range, Some((2020, 2022)));
        assert_eq!(combined.scores.len(), 2);
        assert_eq!(combined.omitted.len(), 1);
        // Equal scores: the earlier season ranks first.
        assert_eq!(ranked(&combined), vec![(2020, 3), (2022, 3)]);
    }

    #[test]
    fn test_omitted_race_is_not_scored() {
        let mut summary = summarize(vec![score(Series::Formula1, 2023, 1, 0.1, 0.0)]);
        summary.omit(RaceId::new(Series::Formula1, 2023, 2), "missing standings");

        assert!(summary.score(&RaceId::new(Series::Formula1, 2023, 2)).is_none());
        assert_eq!(summary.ranking.len(), 1);
        assert_eq!(summary.statistics().unwrap().races, 1);
    }

    #[test]
    fn test_statistics() {
        let summary = summarize(vec![
            score(Series::Formula1, 2023, 1, 0.1, 0.0),
            score(Series::Formula1, 2023, 2, 0.3, 0.2),
            score(Series::Formula1, 2023, 3, 0.2, 0.1),
        ]);
        let stats = summary.statistics().unwrap();
        assert_eq!(stats.races, 3);
        assert_eq!(stats.advancement.min, 0.1);
        assert_eq!(stats.advancement.max, 0.3);
        assert_eq!(stats.advancement.median, 0.2);
        assert!((stats.excitement.mean - 0.1).abs() < 1e-12);
        assert!(summarize(Vec::new()).statistics().is_none());
    }

    #[test]
    fn test_statistics_by_track() {
        let at = |track: Option<&str>, track_type, mut score: LeverageScore| {
            score.track = track.map(str::to_string);
            score.track_type = track_type;
            score
        };
        let street = Some(TrackType::StreetCourse);
        let summary = summarize(vec![
            at(Some("monaco"), street, score(Series::Formula1, 2022, 7, 0.1, 0.0)),
            at(Some("monaco"), street, score(Series::Formula1, 2023, 6, 0.3, 0.0)),
            at(Some("interlagos"), Some(TrackType::RoadCourse), score(Series::Formula1, 2022, 21, 0.4, 0.4)),
            at(None, None, score(Series::Formula1, 2023, 1, 0.05, 0.0)),
        ]);

        let tracks = summary.statistics_by_track();
        let names: Vec<&str> = tracks.iter().map(|t| t.track.as_str()).collect();
        assert_eq!(names, vec!["interlagos", "monaco", UNKNOWN_TRACK]);

        let monaco = &tracks[1];
        assert_eq!(monaco.track_type, street);
        assert_eq!(monaco.statistics.races, 2);
        assert_eq!(monaco.statistics.advancement.min, 0.1);
        assert_eq!(monaco.statistics.advancement.max, 0.3);
        assert!((monaco.statistics.combined.median - 0.2).abs() < 1e-12);
        assert_eq!(tracks[2].track_type, None);
        assert!(summarize(Vec::new()).statistics_by_track().is_empty());
    }

    #[test]
    fn test_rescaled_keeps_ranking() {
        let summary = summarize(vec![
            score(Series::Formula1, 2023, 1, 0.1, 0.0),
            score(Series::Formula1, 2023, 2, 0.3, 0.2),
            score(Series::Formula1, 2023, 3, 0.2, 0.1),
        ]);
        let scaled = summary.rescaled(3.0).unwrap();

        assert_eq!(ranked(&summary), ranked(&scaled));
        assert!((scaled.ranking[0].combined - 1.5).abs() < 1e-12);
        assert!(summary.rescaled(-1.0).is_err());
    }
}
