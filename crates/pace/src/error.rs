use core_types::{CoreError, RaceId, TeamId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaceError {
    #[error("Not enough data for {subject}: found {found}, need {required}")]
    InsufficientData {
        subject: String,
        found: usize,
        required: usize,
    },

    #[error("Trend fit is degenerate: {0}")]
    DegenerateFit(String),

    #[error("Round {round} appended to the {team} series after round {last}")]
    OutOfOrder { team: TeamId, round: u32, last: u32 },

    #[error("Sample for {found} appended to the {expected} series")]
    TeamMismatch { expected: TeamId, found: TeamId },

    #[error("Race {0} supplied more than once")]
    DuplicateRace(RaceId),

    #[error("Race {race} does not belong to the {series} {season} season")]
    ForeignRace {
        race: RaceId,
        series: core_types::Series,
        season: u16,
    },

    #[error(transparent)]
    Session(#[from] CoreError),

    #[error("Statistics error: {0}")]
    Statistics(String),
}
