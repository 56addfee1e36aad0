//! Mission registry: storage plus atomic admission. The
//! admission lock is coarse-grained but held only across one pure
//! `deconflict::evaluate` call — reads never take it.

use crate::deconflict::{self, Candidate, DeconflictOutcome};
use crate::error::CoreError;
use crate::model::{Conflict, Mission, MissionId, MissionState, Plan};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uavcoord_env::{TrajectorySample, VehicleId};

use crate::config::CoreConfig;

pub struct MissionRegistry {
    missions: DashMap<MissionId, Mission>,
    admission_lock: tokio::sync::Mutex<()>,
}

impl Default for MissionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionRegistry {
    pub fn new() -> Self {
        Self {
            missions: DashMap::new(),
            admission_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// A copy-on-write snapshot of every mission in {SCHEDULED, RUNNING},
    /// for use as `deconflict::evaluate`'s registry input.
    fn active_snapshot(&self) -> Vec<Mission> {
        self.missions
            .iter()
            .map(|e| e.value().clone())
            .filter(|m| m.state.is_active())
            .collect()
    }

    /// Atomic admission: acquire the admission lock,
    /// run deconfliction against a fresh registry + live snapshot, insert on
    /// success, release. Callers are responsible for persisting the mission
    /// (the registry itself holds no persistence handle — see `Core::schedule`).
    pub async fn schedule(
        &self,
        vehicle_id: VehicleId,
        plan: Plan,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        live_samples: &[TrajectorySample],
        config: &CoreConfig,
    ) -> Result<Mission, CoreError> {
        let _guard = self.admission_lock.lock().await;

        let candidate = Candidate {
            vehicle_id: vehicle_id.clone(),
            plan: plan.clone(),
            start_time,
            end_time,
        };
        let snapshot = self.active_snapshot();
        let outcome: DeconflictOutcome =
            deconflict::evaluate(&candidate, &snapshot, live_samples, config)?;

        if !outcome.safe {
            return Err(CoreError::ConflictDetected(outcome.conflicts));
        }

        let mission = Mission {
            id: MissionId::new(),
            vehicle_id,
            plan,
            start_time,
            end_time,
            state: MissionState::Scheduled,
            failure_reason: None,
        };
        self.missions.insert(mission.id, mission.clone());
        Ok(mission)
    }

    /// Re-runs the candidate's deconfliction purely to surface the conflict
    /// list without admitting anything — used by `Core::schedule` error
    /// paths that need `ConflictDetected` detail; kept separate from
    /// `schedule` so callers that only want a dry-run never touch the lock.
    pub fn dry_run(
        &self,
        candidate: &Candidate,
        live_samples: &[TrajectorySample],
        config: &CoreConfig,
    ) -> Result<Vec<Conflict>, CoreError> {
        let snapshot = self.active_snapshot();
        let outcome = deconflict::evaluate(candidate, &snapshot, live_samples, config)?;
        Ok(outcome.conflicts)
    }

    /// Transitions a mission to `CANCELLED` if non-terminal; a no-op on an
    /// already-terminal mission returns its current state.
    pub fn cancel(&self, mission_id: MissionId) -> Option<Mission> {
        let mut entry = self.missions.get_mut(&mission_id)?;
        if !entry.state.is_terminal() {
            entry.state = MissionState::Cancelled;
        }
        Some(entry.clone())
    }

    pub fn get(&self, mission_id: MissionId) -> Option<Mission> {
        self.missions.get(&mission_id).map(|e| e.value().clone())
    }

    pub fn list_active(&self) -> Vec<Mission> {
        self.active_snapshot()
    }

    pub fn list_all(&self) -> Vec<Mission> {
        self.missions.iter().map(|e| e.value().clone()).collect()
    }

    /// Applies a lifecycle transition produced by the dispatcher. Returns
    /// `false` (no-op) if the transition is invalid given the mission's
    /// current state — the dispatcher treats this as "someone else already
    /// moved it" rather than an error.
    pub fn transition(
        &self,
        mission_id: MissionId,
        next: MissionState,
        failure_reason: Option<crate::model::FailureReason>,
    ) -> bool {
        let Some(mut entry) = self.missions.get_mut(&mission_id) else {
            return false;
        };
        if !entry.state.can_transition_to(next) {
            return false;
        }
        entry.state = next;
        entry.failure_reason = failure_reason;
        true
    }

    /// Earliest `start_time` among `SCHEDULED` missions, for the
    /// dispatcher's wake computation.
    pub fn next_wake(&self) -> Option<(MissionId, DateTime<Utc>)> {
        self.missions
            .iter()
            .filter(|e| e.value().state == MissionState::Scheduled)
            .map(|e| (e.value().id, e.value().start_time))
            .min_by_key(|(_, t)| *t)
    }

    /// Replays persisted mission records at startup, restoring registry
    /// state.
    pub fn restore(&self, missions: Vec<Mission>) {
        for mission in missions {
            self.missions.insert(mission.id, mission);
        }
    }
}
