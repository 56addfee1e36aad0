//! Broadcaster: composes a `Snapshot` every tick from the same
//! `latest_all()` data the live monitor used that tick, and fans it out to
//! subscribers. Per-subscriber delivery uses `tokio::sync::watch` — its
//! coalescing-overwrite semantics are exactly "keep only the newest pending,
//! never block the tick". Conflict alerts are discrete, not coalesced, and
//! go out over a small bounded `mpsc` instead.

use crate::config::CoreConfig;
use crate::model::{Conflict, SubscriberId};
use crate::trajectory::TrajectoryStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use uavcoord_env::{ClockContext, TrajectorySample};

/// One fanned-out state update.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub server_timestamp: DateTime<Utc>,
    pub vehicles: Vec<TrajectorySample>,
    pub conflicts: Vec<Conflict>,
    pub update_id: u64,
}

const ALERT_CHANNEL_CAPACITY: usize = 16;

struct Subscriber {
    snapshot_tx: tokio::sync::watch::Sender<Option<Snapshot>>,
    alert_tx: tokio::sync::mpsc::Sender<Conflict>,
}

/// A subscriber's receive handles, returned from `Broadcaster::subscribe`.
pub struct SubscriberHandle {
    pub id: SubscriberId,
    pub snapshots: tokio::sync::watch::Receiver<Option<Snapshot>>,
    pub alerts: tokio::sync::mpsc::Receiver<Conflict>,
}

pub struct Broadcaster<C: ClockContext> {
    trajectory: Arc<TrajectoryStore>,
    conflicts_rx: tokio::sync::watch::Receiver<Vec<Conflict>>,
    clock: Arc<C>,
    config: CoreConfig,
    subscribers: AsyncMutex<HashMap<SubscriberId, Subscriber>>,
    update_id: AtomicU64,
    last_snapshot: AsyncMutex<Option<Snapshot>>,
}

impl<C: ClockContext> Broadcaster<C> {
    pub fn new(
        trajectory: Arc<TrajectoryStore>,
        conflicts_rx: tokio::sync::watch::Receiver<Vec<Conflict>>,
        clock: Arc<C>,
        config: CoreConfig,
    ) -> Self {
        Self {
            trajectory,
            conflicts_rx,
            clock,
            config,
            subscribers: AsyncMutex::new(HashMap::new()),
            update_id: AtomicU64::new(0),
            last_snapshot: AsyncMutex::new(None),
        }
    }

    /// Adds a subscriber, returning its receive handles. Takes the
    /// subscriber-set lock only for the duration of the insert.
    pub async fn subscribe(&self) -> SubscriberHandle {
        let id = SubscriberId::new();
        let (snapshot_tx, snapshot_rx) = tokio::sync::watch::channel(self.last_snapshot.lock().await.clone());
        let (alert_tx, alert_rx) = tokio::sync::mpsc::channel(ALERT_CHANNEL_CAPACITY);
        self.subscribers.lock().await.insert(
            id,
            Subscriber {
                snapshot_tx,
                alert_tx,
            },
        );
        SubscriberHandle {
            id,
            snapshots: snapshot_rx,
            alerts: alert_rx,
        }
    }

    pub async fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().await.remove(&id);
    }

    /// Serves the most recently composed snapshot without re-running the
    /// monitor.
    pub async fn current_snapshot(&self) -> Option<Snapshot> {
        self.last_snapshot.lock().await.clone()
    }

    /// Runs the fixed-rate tick loop until `shutdown` resolves, forwarding
    /// the live monitor's edge-triggered alerts to every subscriber as soon
    /// as they arrive rather than waiting for the next snapshot tick.
    pub async fn run(
        self: Arc<Self>,
        mut alerts_rx: tokio::sync::mpsc::Receiver<Conflict>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let interval = self.config.tick_interval();
        let mut alerts_open = true;
        loop {
            tokio::select! {
                _ = self.clock.sleep(interval) => {
                    self.tick().await;
                }
                alert = alerts_rx.recv(), if alerts_open => {
                    match alert {
                        Some(conflict) => self.fan_out_alert(conflict).await,
                        None => alerts_open = false,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn fan_out_alert(&self, conflict: Conflict) {
        let subscribers = self.subscribers.lock().await;
        for (id, sub) in subscribers.iter() {
            if let Err(err) = sub.alert_tx.try_send(conflict.clone()) {
                debug!(subscriber = ?id, %err, "alert channel full, dropping for this subscriber");
            }
        }
    }

    /// Composes and fans out a snapshot. Discrete alerts are *not* repeated
    /// here — they travel over `alerts_rx` in `run` the instant the live
    /// monitor emits them, so a snapshot tick and an alert are independent
    /// events on the wire, matching the edge-triggered-vs-continuous split
    /// the live monitor itself maintains.
    async fn tick(&self) {
        let vehicles = self.trajectory.latest_all();
        let conflicts = self.conflicts_rx.borrow().clone();
        let snapshot = Snapshot {
            server_timestamp: self.clock.wall_time(),
            vehicles,
            conflicts,
            update_id: self.update_id.fetch_add(1, Ordering::SeqCst) + 1,
        };

        *self.last_snapshot.lock().await = Some(snapshot.clone());

        let subscribers = self.subscribers.lock().await;
        for sub in subscribers.values() {
            // `send` overwrites any unread value, coalescing a slow
            // subscriber down to the latest snapshot instead of queuing.
            let _ = sub.snapshot_tx.send(Some(snapshot.clone()));
        }
    }

    /// Forces one snapshot composition/fan-out outside the tick loop's own
    /// schedule. Exposed for callers that drive the broadcaster under their
    /// own clock rather than spawning `run` (e.g. a deterministic scenario
    /// harness).
    pub async fn tick_once(&self) {
        self.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConflictKind;
    use uavcoord_env::{Position, TokioClock, VehicleId, Velocity};

    fn make_broadcaster() -> (Arc<Broadcaster<TokioClock>>, tokio::sync::watch::Sender<Vec<Conflict>>) {
        let trajectory = Arc::new(TrajectoryStore::new(3600, 100));
        trajectory.append(TrajectorySample {
            vehicle_id: VehicleId::new("d1"),
            timestamp: Utc::now(),
            position: Position::new(0.0, 0.0, 10.0),
            velocity: Velocity::default(),
        });
        let (conflicts_tx, conflicts_rx) = tokio::sync::watch::channel(Vec::new());
        let clock = TokioClock::shared();
        let broadcaster = Arc::new(Broadcaster::new(trajectory, conflicts_rx, clock, CoreConfig::default()));
        (broadcaster, conflicts_tx)
    }

    #[tokio::test]
    async fn tick_composes_snapshot_with_strictly_increasing_update_id() {
        let (broadcaster, _conflicts_tx) = make_broadcaster();
        broadcaster.tick().await;
        broadcaster.tick().await;
        let snapshot = broadcaster.current_snapshot().await.unwrap();
        assert_eq!(snapshot.update_id, 2);
    }

    #[tokio::test]
    async fn subscriber_receives_coalesced_snapshot() {
        let (broadcaster, _conflicts_tx) = make_broadcaster();
        let mut handle = broadcaster.subscribe().await;

        broadcaster.tick().await;
        broadcaster.tick().await;
        broadcaster.tick().await;

        // A slow subscriber that only checks now sees the latest, not every
        // intermediate tick.
        handle.snapshots.changed().await.unwrap();
        let snapshot = handle.snapshots.borrow().clone().unwrap();
        assert_eq!(snapshot.update_id, 3);
    }

    #[tokio::test]
    async fn on_demand_snapshot_served_without_recompute() {
        let (broadcaster, _conflicts_tx) = make_broadcaster();
        assert!(broadcaster.current_snapshot().await.is_none());
        broadcaster.tick().await;
        let snapshot = broadcaster.current_snapshot().await.unwrap();
        assert_eq!(snapshot.vehicles.len(), 1);
    }

    #[tokio::test]
    async fn conflicts_propagate_into_snapshot() {
        let (broadcaster, conflicts_tx) = make_broadcaster();
        conflicts_tx
            .send(vec![Conflict {
                kind: ConflictKind::Live,
                vehicle_a: VehicleId::new("d1"),
                vehicle_b: VehicleId::new("d2"),
                interval: None,
                min_distance_m: 1.0,
                severity: crate::model::ConflictSeverity::Critical,
            }])
            .unwrap();
        broadcaster.tick().await;
        let snapshot = broadcaster.current_snapshot().await.unwrap();
        assert_eq!(snapshot.conflicts.len(), 1);
    }
}
