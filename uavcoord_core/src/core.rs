//! The composition root (design note "Module-level singletons -> explicit
//! composition"): `Core<C, D, P>` assembles the trajectory store, mission
//! registry, live monitor, and broadcaster into one value built at startup
//! and handed to callers, generalizing the single-process
//! driver/registry/engine bundle this kind of service otherwise keeps as
//! global state.

use crate::broadcast::{Broadcaster, Snapshot, SubscriberHandle};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::model::{FailureReason, Mission, MissionId, MissionState, Plan};
use crate::monitor::LiveMonitor;
use crate::registry::MissionRegistry;
use crate::scheduler::Dispatcher;
use crate::trajectory::TrajectoryStore;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};
use uavcoord_env::{
    ClockContext, Command, DriverError, FleetDriver, MissionFilter, MissionRecord, Persistence,
    PersistenceError, VehicleId, VehicleState,
};

pub struct Core<C: ClockContext, D: FleetDriver, P: Persistence> {
    pub config: CoreConfig,
    pub clock: Arc<C>,
    pub driver: Arc<D>,
    pub persistence: Arc<P>,
    pub trajectory: Arc<TrajectoryStore>,
    pub registry: Arc<MissionRegistry>,
    monitor: Arc<LiveMonitor<C>>,
    broadcaster: Arc<Broadcaster<C>>,
    dispatcher: Arc<Dispatcher<C, D>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    alerts_rx: tokio::sync::Mutex<Option<tokio::sync::mpsc::Receiver<crate::model::Conflict>>>,
}

impl<C: ClockContext, D: FleetDriver, P: Persistence> Core<C, D, P> {
    pub fn new(clock: Arc<C>, driver: Arc<D>, persistence: Arc<P>, config: CoreConfig) -> Arc<Self> {
        let trajectory = Arc::new(TrajectoryStore::new(config.trajectory_retention_s, config.trajectory_jitter_slack_ms));
        let registry = Arc::new(MissionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            trajectory.clone(),
            driver.clone(),
            clock.clone(),
            config.clone(),
        ));

        let (alerts_tx, alerts_rx) = tokio::sync::mpsc::channel(64);
        let (monitor, conflicts_rx) = LiveMonitor::new(trajectory.clone(), clock.clone(), config.clone(), alerts_tx);
        let monitor = Arc::new(monitor);
        let broadcaster = Arc::new(Broadcaster::new(trajectory.clone(), conflicts_rx, clock.clone(), config.clone()));

        let (shutdown_tx, _) = tokio::sync::watch::channel(false);

        Arc::new(Self {
            config,
            clock,
            driver,
            persistence,
            trajectory,
            registry,
            monitor,
            broadcaster,
            dispatcher,
            shutdown_tx,
            alerts_rx: tokio::sync::Mutex::new(Some(alerts_rx)),
        })
    }

    /// Spawns the telemetry ingress pump, dispatcher, live monitor, and
    /// broadcaster as long-lived tasks via `ClockContext::spawn`.
    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        self.clock.spawn("telemetry-ingress", async move { this.run_telemetry_ingress().await });

        let dispatcher = self.dispatcher.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.clock.spawn("dispatcher", async move { dispatcher.run(shutdown_rx).await });

        let monitor = self.monitor.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.clock.spawn("live-monitor", async move { monitor.run(shutdown_rx).await });

        let broadcaster = self.broadcaster.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let alerts_rx = self
            .alerts_rx
            .try_lock()
            .expect("start() is called once, before any concurrent access")
            .take()
            .expect("start() must only be called once");
        self.clock
            .spawn("broadcaster", async move { broadcaster.run(alerts_rx, shutdown_rx).await });
    }

    /// Pulls telemetry from the driver, appends it to the trajectory store,
    /// and best-effort persists it.
    async fn run_telemetry_ingress(&self) {
        loop {
            match self.driver.recv_telemetry().await {
                Some(sample) => {
                    self.trajectory.append(sample.clone());
                    if let Err(err) = self.persistence.append_trajectory(sample).await {
                        warn!(%err, "trajectory append failed, continuing");
                    }
                }
                None => {
                    info!("driver telemetry tap closed, stopping ingress");
                    return;
                }
            }
        }
    }

    /// Signals every long-lived task to shut down. Does not block on their
    /// completion: the dispatcher's own shutdown deadline governs
    /// how long it spends cancelling/stopping vehicles before returning.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    // ---- Mission lifecycle ------------------------------------

    pub async fn schedule(
        &self,
        vehicle_id: VehicleId,
        plan: Plan,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<MissionId, CoreError> {
        let live = self.trajectory.latest_all();
        let mission = self
            .registry
            .schedule(vehicle_id, plan, start_time, end_time, &live, &self.config)
            .await?;

        if let Err(err) = self.persist_mission(&mission).await {
            warn!(mission = %mission.id, %err, "mission admission persistence failed");
            self.registry
                .transition(mission.id, MissionState::Failed, Some(FailureReason::PersistenceError));
            return Err(CoreError::Persistence(err));
        }
        Ok(mission.id)
    }

    pub fn cancel(&self, mission_id: MissionId) -> Option<Mission> {
        let was_running = self
            .registry
            .get(mission_id)
            .map(|m| m.state == MissionState::Running)
            .unwrap_or(false);
        let mission = self.registry.cancel(mission_id)?;
        if was_running {
            let driver = self.driver.clone();
            let vehicle = mission.vehicle_id.clone();
            self.clock.spawn("cancel-stop", async move {
                if let Err(err) = driver.command(&vehicle, Command::Stop).await {
                    warn!(%vehicle, %err, "stop command failed during cancel");
                }
            });
        }
        Some(mission)
    }

    pub fn get(&self, mission_id: MissionId) -> Option<Mission> {
        self.registry.get(mission_id)
    }

    pub fn list_active(&self) -> Vec<Mission> {
        self.registry.list_active()
    }

    pub async fn emergency_stop(&self) -> Result<(), DriverError> {
        self.driver.emergency_stop_all().await
    }

    pub async fn status_all(&self) -> Vec<VehicleState> {
        self.driver.status_all().await
    }

    // ---- Subscribers / snapshots ------------------------------

    pub async fn subscribe(&self) -> SubscriberHandle {
        self.broadcaster.subscribe().await
    }

    pub async fn unsubscribe(&self, id: crate::model::SubscriberId) {
        self.broadcaster.unsubscribe(id).await
    }

    pub async fn current_snapshot(&self) -> Option<Snapshot> {
        self.broadcaster.current_snapshot().await
    }

    // ---- Startup reconciliation ----------------------------------

    /// Replays persisted mission records, discarding any in-memory state
    /// (there should be none yet, at startup) older than the persisted
    /// record — reconciles state after a crash that may have lost a
    /// persistence ack.
    pub async fn reconcile(&self) -> Result<(), PersistenceError> {
        let records = self.persistence.list_missions(MissionFilter::default()).await?;
        let missions = records.into_iter().filter_map(Self::record_to_mission).collect();
        self.registry.restore(missions);
        Ok(())
    }

    fn record_to_mission(record: MissionRecord) -> Option<Mission> {
        let plan: Plan = serde_json::from_str(&record.plan_json).ok()?;
        let state = match record.state.as_str() {
            "SCHEDULED" => MissionState::Scheduled,
            "RUNNING" => MissionState::Running,
            "COMPLETED" => MissionState::Completed,
            "FAILED" => MissionState::Failed,
            "CANCELLED" => MissionState::Cancelled,
            _ => return None,
        };
        Some(Mission {
            id: MissionId(uuid::Uuid::parse_str(&record.mission_id).ok()?),
            vehicle_id: record.vehicle_id,
            plan,
            start_time: record.start_time,
            end_time: record.end_time,
            state,
            failure_reason: None,
        })
    }

    async fn persist_mission(&self, mission: &Mission) -> Result<(), PersistenceError> {
        let record = MissionRecord {
            mission_id: mission.id.to_string(),
            vehicle_id: mission.vehicle_id.clone(),
            state: format!("{:?}", mission.state).to_uppercase(),
            start_time: mission.start_time,
            end_time: mission.end_time,
            plan_json: serde_json::to_string(&mission.plan).unwrap_or_default(),
        };
        let deadline = StdDuration::from_secs_f64(self.config.persistence_write_deadline_s);

        match self.with_deadline(deadline, self.persistence.put_mission(record.clone())).await {
            Some(Ok(())) => return Ok(()),
            Some(Err(err)) if !err.is_transient() => return Err(err),
            _ => {}
        }
        // One retry on a transient failure, then give up.
        match self.with_deadline(deadline, self.persistence.put_mission(record)).await {
            Some(result) => result,
            None => Err(PersistenceError::Transient("write deadline exceeded".into())),
        }
    }

    async fn with_deadline<F, T>(&self, deadline: StdDuration, fut: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            result = fut => Some(result),
            _ = self.clock.sleep(deadline) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Waypoint;
    use uavcoord_env::{InMemoryPersistence, TokioClock};

    #[derive(Default)]
    struct NullDriver;

    #[async_trait::async_trait]
    impl FleetDriver for NullDriver {
        async fn status(&self, _vehicle: &VehicleId) -> Option<VehicleState> {
            None
        }
        async fn status_all(&self) -> Vec<VehicleState> {
            Vec::new()
        }
        async fn command(&self, vehicle: &VehicleId, _cmd: Command) -> Result<uavcoord_env::CommandAck, DriverError> {
            Ok(uavcoord_env::CommandAck {
                vehicle_id: vehicle.clone(),
                accepted: true,
                detail: None,
            })
        }
        async fn emergency_stop_all(&self) -> Result<(), DriverError> {
            Ok(())
        }
        async fn recv_telemetry(&self) -> Option<uavcoord_env::TrajectorySample> {
            None
        }
    }

    fn plan() -> Plan {
        Plan::new(vec![Waypoint::new(0.0, 0.0, 10.0), Waypoint::new(0.0, 0.001, 10.0)])
    }

    #[tokio::test]
    async fn schedule_persists_and_is_retrievable() {
        let core = Core::new(
            TokioClock::shared(),
            Arc::new(NullDriver::default()),
            Arc::new(InMemoryPersistence::new()),
            CoreConfig::default(),
        );
        let start = Utc::now();
        let mission_id = core
            .schedule(VehicleId::new("d1"), plan(), start, start + chrono::Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(core.get(mission_id).unwrap().state, MissionState::Scheduled);
        let persisted = core.persistence.get_mission(&mission_id.to_string()).await.unwrap();
        assert!(persisted.is_some());
    }

    #[tokio::test]
    async fn reconcile_restores_persisted_missions() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let core = Core::new(
            TokioClock::shared(),
            Arc::new(NullDriver::default()),
            persistence.clone(),
            CoreConfig::default(),
        );
        let start = Utc::now();
        let mission_id = core
            .schedule(VehicleId::new("d1"), plan(), start, start + chrono::Duration::seconds(60))
            .await
            .unwrap();

        let fresh_core = Core::new(
            TokioClock::shared(),
            Arc::new(NullDriver::default()),
            persistence,
            CoreConfig::default(),
        );
        fresh_core.reconcile().await.unwrap();
        assert_eq!(fresh_core.get(mission_id).unwrap().state, MissionState::Scheduled);
    }
}
