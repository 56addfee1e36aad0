//! Error types for the environment abstraction layer (driver + persistence).

use crate::types::VehicleId;
use thiserror::Error;

/// Errors raised by a `FleetDriver` implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The vehicle is not known to the driver, or has gone offline.
    #[error("vehicle unavailable: {0}")]
    VehicleUnavailable(VehicleId),

    /// The command was rejected by the autopilot/driver.
    #[error("command rejected for {vehicle}: {reason}")]
    Rejected { vehicle: VehicleId, reason: String },

    /// The command did not acknowledge within the configured timeout.
    #[error("command timed out for {0}")]
    Timeout(VehicleId),

    /// Transport-level failure (disconnected, malformed wire data, ...).
    #[error("driver transport error: {0}")]
    Transport(String),
}

impl DriverError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Errors raised by a `Persistence` implementation, pre-classified transient vs. permanent so callers can
/// apply the retry-once-then-degrade policy without inspecting message text.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Likely to succeed on retry (timeout, connection hiccup).
    #[error("transient persistence failure: {0}")]
    Transient(String),

    /// Will not succeed on retry (schema violation, corrupt record, ...).
    #[error("permanent persistence failure: {0}")]
    Permanent(String),
}

impl PersistenceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PersistenceError::Transient(_))
    }
}
