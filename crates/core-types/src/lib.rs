//! # Maranello Core Types
//!
//! Layer 0 of the workspace: the normalized race data handed over by the ingestion
//! adapter. Every other crate borrows these types; none of them mutate a session.

pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{Retirement, Series, StandingsSide, TrackStatus, TrackType};
pub use error::CoreError;
pub use structs::{DriverId, Driver, EventInfo, Lap, RaceId, RaceSession, Standing, TeamId};
