use core_types::{CoreError, RaceId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] configuration::error::ConfigError),

    #[error("Run aborted, malformed session: {0}")]
    Malformed(CoreError),

    #[error("Race {0} appears more than once in the input")]
    DuplicateRace(RaceId),

    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Pace error: {0}")]
    Pace(#[from] pace::PaceError),

    #[error("Leverage error: {0}")]
    Leverage(#[from] leverage::LeverageError),
}
