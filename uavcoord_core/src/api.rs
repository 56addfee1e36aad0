//! Contract-only DTOs for the external HTTP/WebSocket surface.
//! The router that terminates HTTP and WebSocket is an explicit external
//! collaborator — this module defines only the JSON wire shapes
//! it would translate to/from `Core` calls, plus a pure mapping from a
//! `Core` operation's `Result` to the documented status/body. No
//! axum/hyper/tower dependency: there is no server here, only the contract.

use crate::error::CoreError;
use crate::model::{Conflict, Mission, MissionId, PlannedSegment, Waypoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uavcoord_env::{CommandAck, TrajectorySample, VehicleId, VehicleState};

// ---- REST request/response bodies --------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DronesResponse {
    pub success: bool,
    pub drones: Vec<VehicleState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionsResponse {
    pub success: bool,
    pub missions: Vec<Mission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub drone_id: VehicleId,
    pub waypoints: Vec<Waypoint>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleResponse {
    Accepted { success: bool, mission_id: MissionId },
    Rejected { success: bool, conflicts: Vec<Conflict> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    #[serde(flatten)]
    pub command: uavcoord_env::Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub ack: Option<CommandAck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryResponse {
    pub success: bool,
    pub samples: Vec<TrajectorySample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTrajectoryQuery {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStatisticsQuery {
    pub window: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStatisticsResponse {
    pub success: bool,
    pub vehicle_count: usize,
    pub active_mission_count: usize,
    pub conflict_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConflictsQuery {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConflictsResponse {
    pub success: bool,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FutureTrajectoriesQuery {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FutureTrajectoriesResponse {
    pub success: bool,
    pub segments: Vec<PlannedSegment>,
}

// ---- Event channel ---------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        server_time: DateTime<Utc>,
        version: String,
    },
    DroneUpdate {
        timestamp: DateTime<Utc>,
        drones: Vec<TrajectorySample>,
        conflicts: Vec<Conflict>,
        update_id: u64,
    },
    ConflictAlert {
        conflict: Conflict,
    },
    ControlResponse {
        request_id: String,
        success: bool,
        detail: Option<String>,
    },
    HistoricalTrajectory {
        drone_id: VehicleId,
        samples: Vec<TrajectorySample>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    RequestUpdate {},
    RequestHistoricalPlayback {
        drone_id: VehicleId,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    },
    ControlDrone {
        drone_id: VehicleId,
        #[serde(flatten)]
        command: uavcoord_env::Command,
    },
}

// ---- Result -> HTTP status/body mapping -----------------------------------

/// A minimal status/body pair; the router maps this onto its own HTTP
/// response type.
pub struct HttpOutcome<T> {
    pub status: u16,
    pub body: T,
}

/// Maps a `schedule` call's `Result` onto the documented 200/409 pair
///.
pub fn map_schedule_result(result: Result<Mission, CoreError>) -> HttpOutcome<ScheduleResponse> {
    match result {
        Ok(mission) => HttpOutcome {
            status: 200,
            body: ScheduleResponse::Accepted {
                success: true,
                mission_id: mission.id,
            },
        },
        Err(CoreError::ConflictDetected(conflicts)) => HttpOutcome {
            status: 409,
            body: ScheduleResponse::Rejected {
                success: false,
                conflicts,
            },
        },
        Err(other) => HttpOutcome {
            status: status_for(&other),
            body: ScheduleResponse::Rejected {
                success: false,
                conflicts: Vec::new(),
            },
        },
    }
}

/// General-purpose status code for a `CoreError` outside the
/// `ConflictDetected` 409 special case.
pub fn status_for(err: &CoreError) -> u16 {
    match err {
        CoreError::InvalidInput(_) => 400,
        CoreError::ConflictDetected(_) => 409,
        CoreError::VehicleUnavailable(_) => 404,
        CoreError::Driver(_) => 502,
        CoreError::Persistence(_) => 503,
        CoreError::MissionNotFound(_) => 404,
        CoreError::ResourceExhausted(_) => 429,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidInputReason;
    use crate::model::{ConflictKind, ConflictSeverity, MissionState, Plan};

    #[test]
    fn schedule_success_maps_to_200() {
        let mission = Mission {
            id: MissionId::new(),
            vehicle_id: VehicleId::new("d1"),
            plan: Plan::new(vec![]),
            start_time: Utc::now(),
            end_time: Utc::now(),
            state: MissionState::Scheduled,
            failure_reason: None,
        };
        let outcome = map_schedule_result(Ok(mission));
        assert_eq!(outcome.status, 200);
        assert!(matches!(outcome.body, ScheduleResponse::Accepted { success: true, .. }));
    }

    #[test]
    fn schedule_conflict_maps_to_409() {
        let conflict = Conflict {
            kind: ConflictKind::Planned,
            vehicle_a: VehicleId::new("d1"),
            vehicle_b: VehicleId::new("d2"),
            interval: None,
            min_distance_m: 1.0,
            severity: ConflictSeverity::Critical,
        };
        let outcome = map_schedule_result(Err(CoreError::ConflictDetected(vec![conflict])));
        assert_eq!(outcome.status, 409);
        assert!(matches!(outcome.body, ScheduleResponse::Rejected { success: false, .. }));
    }

    #[test]
    fn invalid_input_maps_to_400() {
        let outcome = map_schedule_result(Err(CoreError::InvalidInput(InvalidInputReason::EmptyPlan)));
        assert_eq!(outcome.status, 400);
    }
}
