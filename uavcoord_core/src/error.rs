//! Error taxonomy for the coordination core.

use crate::model::{Conflict, MissionId};
use thiserror::Error;
use uavcoord_env::{DriverError, PersistenceError, VehicleId};

/// Errors the core surfaces synchronously to callers. `ConflictDetected` is
/// not a failure in the usual sense — it carries the rejecting conflict list
/// for a 409-class response.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed plan, out-of-range window, or bad vehicle id. Never
    /// retried.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputReason),

    /// Candidate mission rejected; conflicts attached.
    #[error("{} conflict(s) detected", .0.len())]
    ConflictDetected(Vec<Conflict>),

    /// The driver reports the vehicle missing or offline.
    #[error("vehicle unavailable: {0}")]
    VehicleUnavailable(VehicleId),

    /// Command rejected or timed out at the driver.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// Persistence failed in a way that blocks a required write (mission
    /// admission). Non-authoritative persistence failures are absorbed by
    /// the owning component instead and never surface here.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// No such mission.
    #[error("mission not found: {0:?}")]
    MissionNotFound(MissionId),

    /// Backpressure the caller should treat as retry-later.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

/// Specific reasons a candidate mission fails validation before
/// deconfliction even runs.
#[derive(Debug, Error)]
pub enum InvalidInputReason {
    #[error("plan has no waypoints")]
    EmptyPlan,
    #[error("end_time must be after start_time")]
    InvalidWindow,
    #[error("cruise speed {0:.2} m/s exceeds configured maximum")]
    InvalidSpeed(f64),
    #[error("unknown vehicle id {0}")]
    UnknownVehicle(VehicleId),
}
