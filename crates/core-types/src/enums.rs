use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The racing series a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    Formula1,
    NascarCup,
    NascarXfinity,
    NascarTruck,
}

impl Series {
    pub const ALL: [Series; 4] = [
        Series::Formula1,
        Series::NascarCup,
        Series::NascarXfinity,
        Series::NascarTruck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Series::Formula1 => "formula1",
            Series::NascarCup => "nascar_cup",
            Series::NascarXfinity => "nascar_xfinity",
            Series::NascarTruck => "nascar_truck",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Series {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "formula1" | "f1" => Ok(Series::Formula1),
            "nascar_cup" | "cup" => Ok(Series::NascarCup),
            "nascar_xfinity" | "xfinity" => Ok(Series::NascarXfinity),
            "nascar_truck" | "truck" => Ok(Series::NascarTruck),
            other => Err(CoreError::InvalidInput(
                "series".to_string(),
                format!("unknown series '{}'", other),
            )),
        }
    }
}

/// Flag state the lap was run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Green,
    Yellow,
    Red,
    Vsc,
}

impl TrackStatus {
    /// Returns true for any neutralized state (caution, red flag, virtual safety car).
    pub fn is_neutralized(&self) -> bool {
        !matches!(self, TrackStatus::Green)
    }
}

/// Circuit family used to group leverage by kind of track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    RoadCourse,
    StreetCourse,
    Intermediate,
    ShortTrack,
    Superspeedway,
    DirtTrack,
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackType::RoadCourse => "road course",
            TrackType::StreetCourse => "street course",
            TrackType::Intermediate => "intermediate",
            TrackType::ShortTrack => "short track",
            TrackType::Superspeedway => "superspeedway",
            TrackType::DirtTrack => "dirt track",
        };
        f.write_str(name)
    }
}

/// Explicit marker for a classified driver who never completed a lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retirement {
    DidNotStart,
    DidNotFinish,
}

/// Which side of the race a standings table describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandingsSide {
    PreRace,
    PostRace,
}

impl fmt::Display for StandingsSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StandingsSide::PreRace => write!(f, "pre-race"),
            StandingsSide::PostRace => write!(f, "post-race"),
        }
    }
}
