//! Wire-level types shared between the coordination core and the fleet driver.
//!
//! These are the flat, transport-shaped records the driver interface (and the
//! persistence interface) speak in. The core's richer domain model
//! (`Mission`, `Plan`, ...) is built on top of these, not the other way
//! around — this crate has no dependency on the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a vehicle, assigned by the fleet inventory at
/// startup. Never destroyed while the process runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Geodetic position: latitude, longitude (degrees), altitude (meters AGL).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }
}

/// Local-frame velocity in meters/second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

impl Velocity {
    pub fn new(vx: f64, vy: f64, vz: f64) -> Self {
        Self { vx, vy, vz }
    }

    pub fn speed(&self) -> f64 {
        (self.vx * self.vx + self.vy * self.vy + self.vz * self.vz).sqrt()
    }
}

/// Current kinematic + health state of a vehicle, as reported by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub vehicle_id: VehicleId,
    pub position: Position,
    pub velocity: Velocity,
    /// Battery fraction in [0, 1].
    pub battery: f32,
    pub armed: bool,
    pub flight_mode: String,
    pub timestamp: DateTime<Utc>,
}

/// A single telemetry sample from the driver's trajectory tap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub vehicle_id: VehicleId,
    pub timestamp: DateTime<Utc>,
    pub position: Position,
    pub velocity: Velocity,
}

/// Commands the core may push to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Arm,
    Disarm,
    Takeoff { alt: f64 },
    Land,
    Rtl,
    Goto { lat: f64, lon: f64, alt: f64 },
    Stop,
}

/// Driver's acknowledgement of an issued command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    pub vehicle_id: VehicleId,
    pub accepted: bool,
    pub detail: Option<String>,
}
