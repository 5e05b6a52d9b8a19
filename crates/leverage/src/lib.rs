//! # Maranello Leverage
//!
//! Scores how much a race moved the championship.
//!
//! - `LeverageEstimator`: advancement (who moved where in the standings, weighted
//!   toward the front, and how the gaps among title contenders changed) plus excitement (how the title picture changed), combined
//!   under a positive scale factor.
//! - `summarize`: a season or multi-season `SeasonLeverageSummary` with a stable
//!   ranking, explicit omissions for races that could not be scored, and
//!   statistics overall or per track.

pub mod error;
pub mod estimator;
pub mod summary;

pub use error::LeverageError;
pub use estimator::{LeverageEstimator, LeverageScore};
pub use summary::{
    Distribution, LeverageStatistics, OmittedRace, RankedRace, SeasonLeverageSummary,
    TrackStatistics, UNKNOWN_TRACK, summarize,
};
