//! The persistence abstraction (spec §6 "Persistence (consumed)") — a narrow
//! key-value/time-series sink. Operations may fail; the core treats this as
//! best-effort-with-retry for non-authoritative data (trajectory/conflict
//! history) and authoritative-with-ack for mission admission.
//!
//! Storage-side records are intentionally flatter than the core's domain
//! model (`Mission`, `Conflict`) — this is the boundary DTO a real backing
//! store would actually serialize, and the core is responsible for
//! translating to/from its richer types.

use crate::error::PersistenceError;
use crate::types::{TrajectorySample, VehicleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Flat storage record for a mission, independent of the core's lifecycle
/// state machine representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionRecord {
    pub mission_id: String,
    pub vehicle_id: VehicleId,
    pub state: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Opaque serialized plan (waypoints), to avoid a domain-model dependency.
    pub plan_json: String,
}

/// Flat storage record for a detected conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub kind: String,
    pub vehicle_a: VehicleId,
    pub vehicle_b: VehicleId,
    pub timestamp: DateTime<Utc>,
    pub min_distance_m: f64,
    pub severity: String,
}

/// Filter for `list_missions`.
#[derive(Debug, Clone, Default)]
pub struct MissionFilter {
    pub vehicle_id: Option<VehicleId>,
    pub state: Option<String>,
}

#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    async fn put_mission(&self, record: MissionRecord) -> Result<(), PersistenceError>;
    async fn get_mission(&self, mission_id: &str) -> Result<Option<MissionRecord>, PersistenceError>;
    async fn list_missions(&self, filter: MissionFilter) -> Result<Vec<MissionRecord>, PersistenceError>;

    async fn append_trajectory(&self, sample: TrajectorySample) -> Result<(), PersistenceError>;
    async fn range_trajectory(
        &self,
        vehicle: &VehicleId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TrajectorySample>, PersistenceError>;

    async fn append_conflict_event(&self, event: ConflictRecord) -> Result<(), PersistenceError>;
    async fn range_conflicts(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ConflictRecord>, PersistenceError>;
}

/// In-memory `Persistence` test double, backed by `DashMap` for concurrent
/// access without a broad exclusive lock (the same pattern the pack's
/// `atc-drone` reference state store uses for its drone/conflict tables).
#[derive(Default)]
pub struct InMemoryPersistence {
    missions: DashMap<String, MissionRecord>,
    trajectories: DashMap<VehicleId, Vec<TrajectorySample>>,
    conflicts: DashMap<u64, ConflictRecord>,
    conflict_seq: std::sync::atomic::AtomicU64,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn put_mission(&self, record: MissionRecord) -> Result<(), PersistenceError> {
        self.missions.insert(record.mission_id.clone(), record);
        Ok(())
    }

    async fn get_mission(&self, mission_id: &str) -> Result<Option<MissionRecord>, PersistenceError> {
        Ok(self.missions.get(mission_id).map(|e| e.value().clone()))
    }

    async fn list_missions(&self, filter: MissionFilter) -> Result<Vec<MissionRecord>, PersistenceError> {
        Ok(self
            .missions
            .iter()
            .map(|e| e.value().clone())
            .filter(|m| {
                filter
                    .vehicle_id
                    .as_ref()
                    .map_or(true, |v| *v == m.vehicle_id)
                    && filter.state.as_ref().map_or(true, |s| *s == m.state)
            })
            .collect())
    }

    async fn append_trajectory(&self, sample: TrajectorySample) -> Result<(), PersistenceError> {
        self.trajectories
            .entry(sample.vehicle_id.clone())
            .or_default()
            .push(sample);
        Ok(())
    }

    async fn range_trajectory(
        &self,
        vehicle: &VehicleId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TrajectorySample>, PersistenceError> {
        Ok(self
            .trajectories
            .get(vehicle)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|s| s.timestamp >= from && s.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_conflict_event(&self, event: ConflictRecord) -> Result<(), PersistenceError> {
        let seq = self
            .conflict_seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.conflicts.insert(seq, event);
        Ok(())
    }

    async fn range_conflicts(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ConflictRecord>, PersistenceError> {
        Ok(self
            .conflicts
            .iter()
            .map(|e| e.value().clone())
            .filter(|c| c.timestamp >= from && c.timestamp <= to)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(vehicle: &str, ts: DateTime<Utc>) -> TrajectorySample {
        TrajectorySample {
            vehicle_id: VehicleId::new(vehicle),
            timestamp: ts,
            position: crate::types::Position::new(0.0, 0.0, 10.0),
            velocity: crate::types::Velocity::default(),
        }
    }

    #[tokio::test]
    async fn range_trajectory_filters_by_window() {
        let store = InMemoryPersistence::new();
        let t0 = Utc::now();
        store.append_trajectory(sample("d1", t0)).await.unwrap();
        store
            .append_trajectory(sample("d1", t0 + chrono::Duration::seconds(10)))
            .await
            .unwrap();
        store
            .append_trajectory(sample("d1", t0 + chrono::Duration::seconds(100)))
            .await
            .unwrap();

        let results = store
            .range_trajectory(
                &VehicleId::new("d1"),
                t0,
                t0 + chrono::Duration::seconds(50),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn mission_filter_matches_vehicle() {
        let store = InMemoryPersistence::new();
        store
            .put_mission(MissionRecord {
                mission_id: "m1".into(),
                vehicle_id: VehicleId::new("d1"),
                state: "SCHEDULED".into(),
                start_time: Utc::now(),
                end_time: Utc::now() + chrono::Duration::seconds(60),
                plan_json: "[]".into(),
            })
            .await
            .unwrap();

        let matches = store
            .list_missions(MissionFilter {
                vehicle_id: Some(VehicleId::new("d1")),
                state: None,
            })
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);

        let none = store
            .list_missions(MissionFilter {
                vehicle_id: Some(VehicleId::new("d2")),
                state: None,
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
