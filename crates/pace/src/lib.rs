//! # Maranello Pace
//!
//! Turns raw lap times into comparable team pace.
//!
//! ## Pipeline
//!
//! - **Normalize:** `PaceNormalizer` splits a race into green-flag segments, fits a
//!   robust trend per driver per segment to strip fuel burn-off and tyre wear, and
//!   expresses every clean lap as a delta to the session median.
//! - **Aggregate:** `aggregate` pools those deltas into one `PaceSample` per team,
//!   or an explicit `TeamGap` when a team has nothing usable.
//! - **Season:** `SeasonPace::from_races` folds per-race results into append-only
//!   `PaceSeries`, and `smooth` produces rolling means with confidence intervals.
//!
//! Everything here is synchronous and side-effect free apart from `tracing` events.

pub mod aggregator;
pub mod error;
pub mod normalizer;
pub mod series;
pub mod smoothing;
pub mod stats;
pub mod trend;

pub use aggregator::{GapReason, PaceSample, RacePace, TeamGap, aggregate};
pub use error::PaceError;
pub use normalizer::{
    DriverPace, GreenSegment, InsufficientData, LapDelta, NormalizedSession, PaceNormalizer,
};
pub use series::{PaceSeries, SeasonPace};
pub use smoothing::{SeasonSmoothing, SmoothedPoint, SmoothedTeam, legend_order, smooth};
pub use trend::{FittedTrend, IrlsPolynomial, TheilSen, TrendCurve, TrendFit, create_trend_fit};
