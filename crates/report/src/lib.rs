//! # Maranello Reports
//!
//! The serialized output of a run. Every report carries a `format_version`, a
//! fresh `run_id` and the time it was generated; `read_report` refuses versions
//! it does not know.

use chrono::{DateTime, Utc};
use configuration::ExcitementPolicy;
use leverage::{LeverageStatistics, SeasonLeverageSummary, TrackStatistics};
use pace::{SeasonPace, SeasonSmoothing};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

pub mod error;

pub use error::ReportError;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceReport {
    pub format_version: u32,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub seasons: Vec<SeasonPace>,
    pub smoothed: Vec<SeasonSmoothing>,
}

impl PaceReport {
    pub fn new(seasons: Vec<SeasonPace>, smoothed: Vec<SeasonSmoothing>, elapsed: Duration) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            elapsed,
            seasons,
            smoothed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageReport {
    pub format_version: u32,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub scale_factor: f64,
    pub excitement: ExcitementPolicy,
    pub summary: SeasonLeverageSummary,
    /// `None` when no race could be scored.
    pub statistics: Option<LeverageStatistics>,
    #[serde(default)]
    pub tracks: Vec<TrackStatistics>,
}

impl LeverageReport {
    pub fn new(
        summary: SeasonLeverageSummary,
        scale_factor: f64,
        excitement: ExcitementPolicy,
        elapsed: Duration,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            elapsed,
            scale_factor,
            excitement,
            statistics: summary.statistics(),
            tracks: summary.statistics_by_track(),
            summary,
        }
    }
}

/// Writes a report as pretty-printed JSON, creating parent directories.
pub fn write_report<T: Serialize>(report: &T, path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    tracing::info!(path = %path.display(), "Report written.");
    Ok(())
}

/// Reads a report back, checking its format version before the schema.
pub fn read_report<T: DeserializeOwned>(path: &Path) -> Result<T, ReportError> {
    let contents = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&contents)?;
    let found = value
        .get("format_version")
        .and_then(serde_json::Value::as_u64)
        .ok_or(ReportError::MissingVersion)?;
    if found != u64::from(FORMAT_VERSION) {
        return Err(ReportError::UnsupportedVersion {
            found,
            expected: FORMAT_VERSION,
        });
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{RaceId, Series, TrackType};
    use leverage::{LeverageScore, summarize};
    use pace::{PaceSample, RacePace};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn season_pace() -> SeasonPace {
        let race_id = RaceId::new(Series::NascarCup, 2024, 7);
        let sample = PaceSample {
            team_id: "Hendrick".into(),
            race_id,
            delta: -0.123_456_789_012_345_6,
            mean: -0.1,
            stdev: 0.02,
            laps: 3,
            drivers: 2,
            percent: Some(-0.041),
            reference_lap: Some(30.117),
            lap_deltas: vec![-0.123_456_789_012_345_6, 0.1 + 0.2, -1e-17],
        };
        let race = RacePace {
            race_id,
            reference_lap: Some(30.117),
            samples: BTreeMap::from([("Hendrick".into(), sample)]),
            gaps: Vec::new(),
        };
        SeasonPace::from_races(Series::NascarCup, 2024, vec![race]).unwrap()
    }

    #[test]
    fn test_pace_report_round_trip_is_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("pace.json");
        let report = PaceReport::new(vec![season_pace()], Vec::new(), Duration::from_millis(1_500));

        write_report(&report, &path).unwrap();
        let back: PaceReport = read_report(&path).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_leverage_report_carries_statistics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leverage.json");
        let summary = summarize(vec![LeverageScore {
            race_id: RaceId::new(Series::Formula1, 2021, 22),
            track: Some("yas_marina".to_string()),
            track_type: Some(TrackType::RoadCourse),
            field_size: 20,
            advancement: 0.04,
            excitement: 0.63,
            scale_factor: 1.0,
            combined: 0.67,
        }]);
        let report = LeverageReport::new(
            summary,
            1.0,
            ExcitementPolicy::EntropyReduction,
            Duration::from_secs(2),
        );
        assert_eq!(report.statistics.unwrap().races, 1);
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.tracks[0].track, "yas_marina");

        write_report(&report, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"elapsed\": \"2s\""));
        assert!(text.contains("\"excitement\": \"entropy_reduction\""));
        assert!(text.contains("\"track_type\": \"road_course\""));
        let back: LeverageReport = read_report(&path).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.json");
        let mut report = PaceReport::new(Vec::new(), Vec::new(), Duration::ZERO);
        report.format_version = 99;
        write_report(&report, &path).unwrap();

        assert!(matches!(
            read_report::<PaceReport>(&path),
            Err(ReportError::UnsupportedVersion { found: 99, expected: 1 })
        ));

        fs::write(&path, "{}").unwrap();
        assert!(matches!(
            read_report::<PaceReport>(&path),
            Err(ReportError::MissingVersion)
        ));
    }
}
