use configuration::PaceConfig;
use core_types::{DriverId, Lap, RaceId, RaceSession};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::PaceError;
use crate::stats;
use crate::trend::{FittedTrend, TrendFit, create_trend_fit};

/// A maximal run of consecutive lap numbers with no neutralization anywhere on track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenSegment {
    pub first_lap: u32,
    pub last_lap: u32,
}

impl GreenSegment {
    pub fn contains(&self, lap_number: u32) -> bool {
        (self.first_lap..=self.last_lap).contains(&lap_number)
    }

    /// Lap at which driver levels are compared: the segment midpoint.
    pub fn reference_lap(&self) -> f64 {
        (self.first_lap as f64 + self.last_lap as f64) / 2.0
    }
}

/// Splits a session into green-flag segments.
///
/// A lap number is neutralized when any car recorded a non-green lap at that number,
/// so a full-course caution breaks the segment for the whole field.
pub fn green_segments(session: &RaceSession) -> Vec<GreenSegment> {
    let Some(first) = session.laps.iter().map(|l| l.lap_number).min() else {
        return Vec::new();
    };
    let last = session.laps.iter().map(|l| l.lap_number).max().unwrap_or(first);
    let neutralized: BTreeSet<u32> = session
        .laps
        .iter()
        .filter(|l| l.track_status.is_neutralized())
        .map(|l| l.lap_number)
        .collect();

    let mut segments = Vec::new();
    let mut open: Option<u32> = None;
    for lap_number in first..=last {
        if neutralized.contains(&lap_number) {
            if let Some(start) = open.take() {
                segments.push(GreenSegment {
                    first_lap: start,
                    last_lap: lap_number - 1,
                });
            }
        } else if open.is_none() {
            open = Some(lap_number);
        }
    }
    if let Some(start) = open {
        segments.push(GreenSegment {
            first_lap: start,
            last_lap: last,
        });
    }
    segments
}

/// One fitted lap of one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapDelta {
    pub lap_number: u32,
    pub lap_time: f64,
    /// Trend value of the driver's own segment fit at this lap.
    pub fitted: f64,
    /// `lap_time - fitted`: pace with the in-segment drift removed.
    pub residual: f64,
    /// Residual shifted by the driver's segment level relative to the session median.
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverPace {
    pub driver_id: DriverId,
    pub laps: Vec<LapDelta>,
    /// Number of green-flag segments that contributed laps.
    pub segments: usize,
}

impl DriverPace {
    pub fn deltas(&self) -> Vec<f64> {
        self.laps.iter().map(|l| l.delta).collect()
    }

    pub fn residuals(&self) -> Vec<f64> {
        self.laps.iter().map(|l| l.residual).collect()
    }
}

/// A driver left out of the normalized output for lack of fitted laps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientData {
    pub driver_id: DriverId,
    pub found: usize,
    pub required: usize,
}

/// Normalized pace of every eligible driver in one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSession {
    pub race_id: RaceId,
    /// Mean clean lap time of the session, if it had any clean lap.
    pub reference_lap: Option<f64>,
    pub segments: Vec<GreenSegment>,
    pub drivers: BTreeMap<DriverId, DriverPace>,
    pub insufficient: Vec<InsufficientData>,
}

impl NormalizedSession {
    /// The ordered normalized lap deltas of one driver, if the driver was eligible.
    pub fn deltas(&self, driver: &DriverId) -> Option<&[LapDelta]> {
        self.drivers.get(driver).map(|d| d.laps.as_slice())
    }
}

struct SegmentFit<'a> {
    segment: usize,
    laps: Vec<&'a Lap>,
    trend: FittedTrend,
    level: f64,
}

/// Removes fuel, tyre and track-evolution drift from raw lap times.
#[derive(Debug)]
pub struct PaceNormalizer {
    config: PaceConfig,
    trend_fit: Box<dyn TrendFit>,
}

impl PaceNormalizer {
    pub fn new(config: PaceConfig) -> Self {
        let trend_fit = create_trend_fit(&config.trend);
        Self { config, trend_fit }
    }

    /// Uses a caller-supplied trend model instead of the configured one.
    pub fn with_trend_fit(config: PaceConfig, trend_fit: Box<dyn TrendFit>) -> Self {
        Self { config, trend_fit }
    }

    pub fn config(&self) -> &PaceConfig {
        &self.config
    }

    /// Normalizes every driver of a session.
    ///
    /// Drivers with too few fitted laps are reported in `insufficient` rather than
    /// failing the session. Only a structurally malformed session is an error.
    #[tracing::instrument(name = "normalize", skip_all, fields(race = %session.race_id()))]
    pub fn normalize(&self, session: &RaceSession) -> Result<NormalizedSession, PaceError> {
        session.validate()?;

        let segments = green_segments(session);
        let mut fits: BTreeMap<&DriverId, Vec<SegmentFit<'_>>> = BTreeMap::new();
        let mut insufficient = Vec::new();

        let roster: BTreeSet<&DriverId> = session.drivers.iter().map(|d| &d.driver_id).collect();
        for driver in roster {
            let mut clean: Vec<&Lap> = session.laps_for(driver).filter(|l| l.is_clean()).collect();
            clean.sort_by_key(|l| l.lap_number);

            let driver_fits = self.fit_segments(driver, &clean, &segments);
            let fitted_laps: usize = driver_fits.iter().map(|f| f.laps.len()).sum();
            if fitted_laps < self.config.min_driver_laps {
                tracing::warn!(
                    driver = %driver,
                    fitted_laps,
                    required = self.config.min_driver_laps,
                    "Driver has insufficient data for pace normalization."
                );
                insufficient.push(InsufficientData {
                    driver_id: driver.clone(),
                    found: fitted_laps,
                    required: self.config.min_driver_laps,
                });
                continue;
            }
            fits.insert(driver, driver_fits);
        }

        // Session level of each segment: median of the eligible drivers' levels.
        let mut segment_levels = vec![Vec::new(); segments.len()];
        for driver_fits in fits.values() {
            for fit in driver_fits {
                segment_levels[fit.segment].push(fit.level);
            }
        }
        let session_levels: Vec<Option<f64>> =
            segment_levels.iter().map(|levels| stats::median(levels)).collect();

        let drivers = fits
            .into_iter()
            .map(|(driver, driver_fits)| {
                let segments_used = driver_fits.len();
                let laps = driver_fits
                    .into_iter()
                    .flat_map(|fit| {
                        let offset = session_levels[fit.segment].map_or(0.0, |session| fit.level - session);
                        fit.laps
                            .into_iter()
                            .zip(fit.trend.fitted)
                            .zip(fit.trend.residuals)
                            .map(move |((lap, fitted), residual)| LapDelta {
                                lap_number: lap.lap_number,
                                lap_time: lap.lap_time,
                                fitted,
                                residual,
                                delta: residual + offset,
                            })
                    })
                    .collect();
                (
                    driver.clone(),
                    DriverPace {
                        driver_id: driver.clone(),
                        laps,
                        segments: segments_used,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        tracing::debug!(
            eligible = drivers.len(),
            insufficient = insufficient.len(),
            segments = segments.len(),
            "Session normalized."
        );

        Ok(NormalizedSession {
            race_id: session.race_id(),
            reference_lap: session.reference_lap(),
            segments,
            drivers,
            insufficient,
        })
    }

    fn fit_segments<'a>(
        &self,
        driver: &DriverId,
        clean: &[&'a Lap],
        segments: &[GreenSegment],
    ) -> Vec<SegmentFit<'a>> {
        let mut fits = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            let laps: Vec<&Lap> = clean
                .iter()
                .copied()
                .filter(|l| segment.contains(l.lap_number))
                .collect();
            if laps.len() < self.config.min_segment_laps {
                continue;
            }

            let points: Vec<(f64, f64)> = laps
                .iter()
                .map(|l| (l.lap_number as f64, l.lap_time))
                .collect();
            match self.trend_fit.fit(&points) {
                Ok(trend) => {
                    let level = trend.curve.evaluate(segment.reference_lap());
                    fits.push(SegmentFit {
                        segment: index,
                        laps,
                        trend,
                        level,
                    });
                }
                Err(e) => {
                    tracing::debug!(
                        driver = %driver,
                        first_lap = segment.first_lap,
                        last_lap = segment.last_lap,
                        error = %e,
                        "Dropping segment that could not be fitted."
                    );
                }
            }
        }
        fits
    }
}
