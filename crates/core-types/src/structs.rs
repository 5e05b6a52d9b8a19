use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::enums::{Retirement, Series, TrackStatus, TrackType};
use crate::error::CoreError;

/// Unique identifier for a driver (three-letter code, car number, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub String);

impl From<&str> for DriverId {
    fn from(value: &str) -> Self {
        DriverId(value.to_string())
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a team (constructor or NASCAR organisation).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl From<&str> for TeamId {
    fn from(value: &str) -> Self {
        TeamId(value.to_string())
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one race. The derived ordering is chronological: season, round, then series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RaceId {
    pub season: u16,
    pub round: u32,
    pub series: Series,
}

impl RaceId {
    pub fn new(series: Series, season: u16, round: u32) -> Self {
        Self { season, round, series }
    }
}

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R{}", self.series, self.season, self.round)
    }
}

/// A single timed lap as delivered by the ingestion adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    pub driver_id: DriverId,
    pub lap_number: u32,
    /// Lap time in seconds.
    pub lap_time: f64,
    /// False for in/out laps, pit laps, deleted laps and laps under a non-green flag.
    pub is_valid: bool,
    pub track_status: TrackStatus,
}

impl Lap {
    /// Whether this lap may be used for trend fitting.
    pub fn is_clean(&self) -> bool {
        self.is_valid
            && !self.track_status.is_neutralized()
            && self.lap_time.is_finite()
            && self.lap_time > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub driver_id: DriverId,
    pub team_id: TeamId,
    pub season: u16,
    pub series: Series,
}

/// Championship state of one driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub points: f64,
    pub position: u32,
}

impl Standing {
    pub fn new(points: f64, position: u32) -> Self {
        Self { points, position }
    }
}

/// Descriptive metadata for the race weekend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub date: NaiveDate,
    /// Stable circuit key, shared by every race held at the same track.
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub track_type: Option<TrackType>,
}

/// Everything the engine needs to know about one race, fully populated before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSession {
    pub series: Series,
    pub season: u16,
    pub round: u32,
    /// Number of championship rounds in the season.
    pub season_rounds: u32,
    #[serde(default)]
    pub event: Option<EventInfo>,
    pub drivers: Vec<Driver>,
    pub laps: Vec<Lap>,
    pub finishing_order: Vec<DriverId>,
    #[serde(default)]
    pub retirements: BTreeMap<DriverId, Retirement>,
    pub pre_race_standings: BTreeMap<DriverId, Standing>,
    pub post_race_standings: BTreeMap<DriverId, Standing>,
}

impl RaceSession {
    pub fn race_id(&self) -> RaceId {
        RaceId::new(self.series, self.season, self.round)
    }

    pub fn track(&self) -> Option<&str> {
        self.event.as_ref()?.track.as_deref()
    }

    pub fn track_type(&self) -> Option<TrackType> {
        self.event.as_ref()?.track_type
    }

    /// Driver to team mapping for this race only.
    pub fn team_map(&self) -> BTreeMap<DriverId, TeamId> {
        self.drivers
            .iter()
            .map(|d| (d.driver_id.clone(), d.team_id.clone()))
            .collect()
    }

    /// Teams entered in this race, in id order.
    pub fn teams(&self) -> BTreeSet<TeamId> {
        self.drivers.iter().map(|d| d.team_id.clone()).collect()
    }

    /// Laps of one driver in lap-number order.
    pub fn laps_for<'a>(&'a self, driver: &'a DriverId) -> impl Iterator<Item = &'a Lap> + 'a {
        self.laps.iter().filter(move |l| &l.driver_id == driver)
    }

    /// Mean time of all clean laps; `None` when the session has none.
    pub fn reference_lap(&self) -> Option<f64> {
        let (sum, count) = self
            .laps
            .iter()
            .filter(|l| l.is_clean())
            .fold((0.0, 0usize), |(sum, count), l| (sum + l.lap_time, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    fn malformed(&self, reason: impl Into<String>) -> CoreError {
        CoreError::MalformedSession {
            race: self.race_id(),
            reason: reason.into(),
        }
    }

    /// Checks the structural invariants of the session.
    ///
    /// Standings coverage is only checked for the "no entry at all" case here;
    /// a driver present on just one side is a leverage-specific failure.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.round == 0 || self.round > self.season_rounds {
            return Err(self.malformed(format!(
                "round {} outside season of {} rounds",
                self.round, self.season_rounds
            )));
        }

        let mut roster = BTreeSet::new();
        for driver in &self.drivers {
            if !roster.insert(&driver.driver_id) {
                return Err(self.malformed(format!("driver {} listed twice", driver.driver_id)));
            }
        }

        let mut seen_laps = BTreeSet::new();
        let mut drivers_with_laps = BTreeSet::new();
        for lap in &self.laps {
            if !roster.contains(&lap.driver_id) {
                return Err(self.malformed(format!(
                    "lap {} belongs to unknown driver {}",
                    lap.lap_number, lap.driver_id
                )));
            }
            if lap.lap_number == 0 {
                return Err(self.malformed(format!("driver {} has a lap numbered 0", lap.driver_id)));
            }
            if !lap.lap_time.is_finite() || lap.lap_time <= 0.0 {
                return Err(self.malformed(format!(
                    "driver {} lap {} has invalid time {}",
                    lap.driver_id, lap.lap_number, lap.lap_time
                )));
            }
            if !seen_laps.insert((&lap.driver_id, lap.lap_number)) {
                return Err(self.malformed(format!(
                    "driver {} lap {} recorded twice",
                    lap.driver_id, lap.lap_number
                )));
            }
            drivers_with_laps.insert(&lap.driver_id);
        }

        let mut classified = BTreeSet::new();
        for driver in &self.finishing_order {
            if !classified.insert(driver) {
                return Err(self.malformed(format!("driver {} classified twice", driver)));
            }
            if !roster.contains(driver) {
                return Err(self.malformed(format!("classified driver {} is not entered", driver)));
            }
            if !drivers_with_laps.contains(driver) && !self.retirements.contains_key(driver) {
                return Err(self.malformed(format!(
                    "classified driver {} has no laps and no retirement marker",
                    driver
                )));
            }
            if !self.pre_race_standings.contains_key(driver)
                && !self.post_race_standings.contains_key(driver)
            {
                return Err(self.malformed(format!("classified driver {} has no standings entry", driver)));
            }
        }

        for (driver, standing) in self
            .pre_race_standings
            .iter()
            .chain(self.post_race_standings.iter())
        {
            if !standing.points.is_finite() || standing.position == 0 {
                return Err(self.malformed(format!(
                    "driver {} has an invalid standings entry ({} pts, P{})",
                    driver, standing.points, standing.position
                )));
            }
        }

        Ok(())
    }
}
