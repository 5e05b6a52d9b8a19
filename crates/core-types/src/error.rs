use thiserror::Error;

use crate::structs::RaceId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Malformed session {race}: {reason}")]
    MalformedSession { race: RaceId, reason: String },
}
