use core_types::{CoreError, DriverId, RaceId, StandingsSide};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeverageError {
    #[error("{race}: classified driver {driver} has no {side} standings entry")]
    MissingStandings {
        race: RaceId,
        driver: DriverId,
        side: StandingsSide,
    },

    #[error("Scale factor must be finite and positive, got {0}")]
    InvalidScaleFactor(f64),

    #[error(transparent)]
    Session(#[from] CoreError),
}
