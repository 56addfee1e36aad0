//! Shared domain model: waypoints/plans, missions and their
//! lifecycle state machine, conflicts, and subscriber handles. Vehicle-level
//! types (`VehicleId`, `VehicleState`, `Command`, `TrajectorySample`) live in
//! `uavcoord_env` and are re-exported here so callers only need one import
//! path for the data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use uavcoord_env::{Command, CommandAck, Position, TrajectorySample, VehicleId, VehicleState, Velocity};

/// A single leg endpoint of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    pub fn to_position(self) -> Position {
        Position::new(self.lat, self.lon, self.alt)
    }
}

/// An ordered sequence of waypoints, not yet bound to a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub waypoints: Vec<Waypoint>,
}

impl Plan {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self { waypoints }
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// A `Plan` bound to a time window, parameterized for equal-speed-per-leg
/// interpolation. `cruise_speed` is derived, not independently
/// set: `total_length / (end_time - start_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSegment {
    pub plan: Plan,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub cruise_speed: f64,
}

/// Stable mission identifier, a `Uuid` wrapped for display/serde purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissionId(pub Uuid);

impl MissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a `Mission`. Transitions are enforced by
/// `can_transition_to`, never by direct field assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionState {
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl MissionState {
    /// Every state except the two terminal-success/failure ones may move to
    /// `Cancelled`; otherwise the only edges are the forward lifecycle ones
    ///.
    pub fn can_transition_to(self, next: MissionState) -> bool {
        use MissionState::*;
        match (self, next) {
            (Scheduled, Running) => true,
            (Running, Completed) | (Running, Failed) => true,
            (Scheduled, Cancelled) | (Running, Cancelled) => true,
            // A lost persistence ack after admission fails the mission
            // before it ever dispatches.
            (Scheduled, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MissionState::Completed | MissionState::Failed | MissionState::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, MissionState::Scheduled | MissionState::Running)
    }
}

/// Reason a mission failed, carried alongside `MissionState::Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    LateConflict,
    DriverError,
    WatchdogExpired,
    PersistenceError,
}

/// An admitted plan with lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub vehicle_id: VehicleId,
    pub plan: Plan,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub state: MissionState,
    pub failure_reason: Option<FailureReason>,
}

impl Mission {
    pub fn segment(&self) -> PlannedSegment {
        let length_m = crate::geo::plan_length_m(&self.plan);
        let window_s = (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0;
        let cruise_speed = if window_s > 0.0 { length_m / window_s } else { 0.0 };
        PlannedSegment {
            plan: self.plan.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            cruise_speed,
        }
    }

    pub fn window_overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }
}

/// Classification of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    Live,
    Planned,
    Mixed,
    /// Vehicle-exclusivity rejection — not spatial.
    VehicleExclusivity,
    /// Advisory, non-spatial: a waypoint or live sample below the altitude
    /// floor.
    Altitude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictSeverity {
    Warning,
    Critical,
}

impl ConflictSeverity {
    /// WARNING for `(B/2, B]`, CRITICAL for `<= B/2`.
    pub fn classify(min_distance_m: f64, safety_buffer_m: f64) -> Self {
        if min_distance_m <= safety_buffer_m / 2.0 {
            ConflictSeverity::Critical
        } else {
            ConflictSeverity::Warning
        }
    }
}

/// A time interval, inclusive, used for PLANNED/MIXED conflict windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A detected conflict between two vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub vehicle_a: VehicleId,
    pub vehicle_b: VehicleId,
    pub interval: Option<TimeInterval>,
    pub min_distance_m: f64,
    pub severity: ConflictSeverity,
}

/// Opaque handle for an external observer. Lifecycle is bounded by
/// the owning connection; the core never inspects its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mission_state_transitions() {
        assert!(MissionState::Scheduled.can_transition_to(MissionState::Running));
        assert!(MissionState::Scheduled.can_transition_to(MissionState::Cancelled));
        assert!(MissionState::Running.can_transition_to(MissionState::Completed));
        assert!(MissionState::Running.can_transition_to(MissionState::Failed));
        assert!(!MissionState::Completed.can_transition_to(MissionState::Running));
        assert!(!MissionState::Scheduled.can_transition_to(MissionState::Completed));
    }

    #[test]
    fn severity_boundary_is_strict() {
        assert_eq!(ConflictSeverity::classify(10.0, 10.0), ConflictSeverity::Warning);
        assert_eq!(ConflictSeverity::classify(5.0, 10.0), ConflictSeverity::Critical);
        assert_eq!(ConflictSeverity::classify(5.01, 10.0), ConflictSeverity::Warning);
    }
}
