//! Lifecycle dispatcher: a single long-lived task that wakes at the earliest
//! `SCHEDULED` mission's start time, re-validates against live state,
//! dispatches driver commands with a watchdog, and finalizes the mission.

use crate::config::CoreConfig;
use crate::deconflict::{self, Candidate};
use crate::geo;
use crate::model::{FailureReason, Mission, MissionState};
use crate::registry::MissionRegistry;
use crate::trajectory::TrajectoryStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};
use uavcoord_env::{ClockContext, Command, CommandAck, DriverError, FleetDriver, VehicleId};

/// Separation from the final waypoint, meters, below which the driver's
/// reported position counts as "last waypoint reached".
const ARRIVAL_TOLERANCE_M: f64 = 2.0;

/// Polling cadence for `await_arrival`'s driver-status checks.
const ARRIVAL_POLL_INTERVAL: StdDuration = StdDuration::from_millis(200);

pub struct Dispatcher<C: ClockContext, D: FleetDriver> {
    registry: Arc<MissionRegistry>,
    trajectory: Arc<TrajectoryStore>,
    driver: Arc<D>,
    clock: Arc<C>,
    config: CoreConfig,
}

impl<C: ClockContext, D: FleetDriver> Dispatcher<C, D> {
    pub fn new(
        registry: Arc<MissionRegistry>,
        trajectory: Arc<TrajectoryStore>,
        driver: Arc<D>,
        clock: Arc<C>,
        config: CoreConfig,
    ) -> Self {
        Self {
            registry,
            trajectory,
            driver,
            clock,
            config,
        }
    }

    /// Runs the wake loop until `shutdown` signals true. Designed to be
    /// handed to `ClockContext::spawn`.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            let wait = match self.registry.next_wake() {
                Some((_, start_time)) => {
                    let now = self.clock.wall_time();
                    (start_time - now).to_std().unwrap_or(StdDuration::ZERO)
                }
                // Nothing scheduled: poll periodically for new admissions.
                None => StdDuration::from_secs(1),
            };

            tokio::select! {
                _ = self.clock.sleep(wait) => {
                    self.wake().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.shutdown().await;
                        return;
                    }
                }
            }
        }
    }

    async fn wake(&self) {
        let Some((mission_id, start_time)) = self.registry.next_wake() else {
            return;
        };
        if self.clock.wall_time() < start_time {
            // A later-starting mission was scheduled since we computed the
            // wait; loop back around rather than dispatching early.
            return;
        }
        let Some(mission) = self.registry.get(mission_id) else {
            return;
        };
        self.dispatch_one(mission).await;
    }

    /// Re-validates, runs, and finalizes a single mission. Exposed `pub`
    /// (rather than only reachable via `run`'s wake loop) so a deterministic
    /// scenario harness can dispatch a specific mission at a specific
    /// virtual instant, the same way `LiveMonitor::tick_once`/
    /// `Broadcaster::tick_once` let a harness drive those components outside
    /// their own clocks.
    pub async fn dispatch_one(&self, mission: Mission) {
        let candidate = Candidate {
            vehicle_id: mission.vehicle_id.clone(),
            plan: mission.plan.clone(),
            start_time: mission.start_time,
            end_time: mission.end_time,
        };
        let live = self.trajectory.latest_all();
        let revalidation = deconflict::evaluate_against_live(&candidate, &live, &self.config);
        let now_unsafe = match &revalidation {
            Ok(outcome) => !outcome.safe,
            Err(_) => true,
        };
        if now_unsafe {
            warn!(mission = %mission.id, vehicle = %mission.vehicle_id, "late conflict at dispatch");
            self.registry
                .transition(mission.id, MissionState::Failed, Some(FailureReason::LateConflict));
            return;
        }

        if !self.registry.transition(mission.id, MissionState::Running, None) {
            return;
        }
        info!(mission = %mission.id, vehicle = %mission.vehicle_id, "mission running");

        match self.issue_waypoints(&mission).await {
            Ok(()) => {
                // The last `Goto` being *accepted* only means the driver took the
                // command, not that the vehicle arrived: completion waits for the
                // driver to report the last waypoint reached, or for the mission's
                // own `end_time` to elapse, whichever comes first.
                self.await_arrival(&mission).await;
                self.registry.transition(mission.id, MissionState::Completed, None);
                info!(mission = %mission.id, "mission completed");
            }
            Err(err) => {
                warn!(mission = %mission.id, error = %err, "driver error, mission failed");
                self.registry
                    .transition(mission.id, MissionState::Failed, Some(FailureReason::DriverError));
            }
        }
    }

    /// Polls the driver's reported vehicle position until it settles within
    /// `ARRIVAL_TOLERANCE_M` of the plan's final waypoint, or until
    /// `mission.end_time` elapses. Keeps the mission RUNNING (and therefore
    /// occupying its planned window for exclusivity/spatial deconfliction)
    /// for the actual duration of the flight rather than for the instant it
    /// takes the driver to acknowledge the last command.
    async fn await_arrival(&self, mission: &Mission) {
        let target = mission.plan.waypoints.last().map(|wp| wp.to_position());
        loop {
            let now = self.clock.wall_time();
            if now >= mission.end_time {
                return;
            }
            if let Some(target) = target {
                if let Some(state) = self.driver.status(&mission.vehicle_id).await {
                    if geo::distance_m(state.position, target) <= ARRIVAL_TOLERANCE_M {
                        return;
                    }
                }
            }
            let remaining = (mission.end_time - now).to_std().unwrap_or(StdDuration::ZERO);
            let wait = ARRIVAL_POLL_INTERVAL.min(remaining).max(StdDuration::from_millis(1));
            self.clock.sleep(wait).await;
        }
    }

    /// Dispatches arm, takeoff, and per-waypoint goto commands, each bounded
    /// by the configured watchdog.
    async fn issue_waypoints(&self, mission: &Mission) -> Result<(), DriverError> {
        let timeout = StdDuration::from_secs_f64(self.config.driver_command_timeout_s);
        let vehicle = &mission.vehicle_id;

        self.with_watchdog(vehicle, timeout, self.driver.command(vehicle, Command::Arm))
            .await?;

        if let Some(first) = mission.plan.waypoints.first() {
            self.with_watchdog(
                vehicle,
                timeout,
                self.driver.command(vehicle, Command::Takeoff { alt: first.alt }),
            )
            .await?;
        }

        for wp in &mission.plan.waypoints {
            self.with_watchdog(
                vehicle,
                timeout,
                self.driver.command(
                    vehicle,
                    Command::Goto {
                        lat: wp.lat,
                        lon: wp.lon,
                        alt: wp.alt,
                    },
                ),
            )
            .await?;
        }

        Ok(())
    }

    async fn with_watchdog<F>(
        &self,
        vehicle: &VehicleId,
        timeout: StdDuration,
        fut: F,
    ) -> Result<CommandAck, DriverError>
    where
        F: Future<Output = Result<CommandAck, DriverError>>,
    {
        tokio::select! {
            result = fut => result,
            _ = self.clock.sleep(timeout) => Err(DriverError::Timeout(vehicle.clone())),
        }
    }

    /// Cancels all `SCHEDULED` missions and stops every vehicle, bounded by
    /// `shutdown_deadline_s`, then proceeds regardless.
    async fn shutdown(&self) {
        let scheduled: Vec<_> = self
            .registry
            .list_active()
            .into_iter()
            .filter(|m| m.state == MissionState::Scheduled)
            .map(|m| m.id)
            .collect();
        for id in scheduled {
            self.registry.transition(id, MissionState::Cancelled, None);
        }

        let deadline = StdDuration::from_secs_f64(self.config.shutdown_deadline_s);
        tokio::select! {
            result = self.driver.emergency_stop_all() => {
                if let Err(err) = result {
                    warn!(error = %err, "emergency stop failed during shutdown");
                }
            }
            _ = self.clock.sleep(deadline) => {
                warn!("shutdown deadline exceeded, proceeding regardless");
            }
        }

        let running: Vec<_> = self
            .registry
            .list_active()
            .into_iter()
            .filter(|m| m.state == MissionState::Running)
            .map(|m| m.id)
            .collect();
        for id in running {
            self.registry.transition(id, MissionState::Cancelled, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Plan, Waypoint};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use uavcoord_env::{CommandAck, Position, TrajectorySample, TokioClock, VehicleState, Velocity};

    struct StubDriver {
        acks: StdMutex<VecDeque<Result<CommandAck, DriverError>>>,
        /// Reported as the vehicle's position from `status`; `None` means
        /// "never confirms arrival" (status pull fails to find the vehicle).
        position: StdMutex<Option<Position>>,
    }

    impl StubDriver {
        fn accepting() -> Self {
            Self {
                acks: StdMutex::new(VecDeque::new()),
                position: StdMutex::new(None),
            }
        }

        /// A driver whose status pull always reports `position`, so
        /// `await_arrival` can confirm arrival without waiting for `end_time`.
        fn confirming(position: Position) -> Self {
            Self {
                acks: StdMutex::new(VecDeque::new()),
                position: StdMutex::new(Some(position)),
            }
        }
    }

    #[async_trait]
    impl FleetDriver for StubDriver {
        async fn status(&self, vehicle: &VehicleId) -> Option<VehicleState> {
            let position = (*self.position.lock().unwrap())?;
            Some(VehicleState {
                vehicle_id: vehicle.clone(),
                position,
                velocity: Velocity::default(),
                battery: 1.0,
                armed: true,
                flight_mode: "GUIDED".to_string(),
                timestamp: Utc::now(),
            })
        }
        async fn status_all(&self) -> Vec<VehicleState> {
            Vec::new()
        }
        async fn command(&self, vehicle: &VehicleId, _cmd: Command) -> Result<CommandAck, DriverError> {
            let mut acks = self.acks.lock().unwrap();
            acks.pop_front().unwrap_or(Ok(CommandAck {
                vehicle_id: vehicle.clone(),
                accepted: true,
                detail: None,
            }))
        }
        async fn emergency_stop_all(&self) -> Result<(), DriverError> {
            Ok(())
        }
        async fn recv_telemetry(&self) -> Option<TrajectorySample> {
            None
        }
    }

    fn plan() -> Plan {
        Plan::new(vec![Waypoint::new(0.0, 0.0, 10.0), Waypoint::new(0.0, 0.001, 10.0)])
    }

    /// A plan whose two waypoints are a hair's-breadth apart, so even a
    /// sub-second window stays well under the configured max cruise speed —
    /// used by tests that want a short `end_time` without tripping
    /// `InvalidSpeed`.
    fn tiny_plan() -> Plan {
        Plan::new(vec![Waypoint::new(0.0, 0.0, 10.0), Waypoint::new(0.0, 0.0000001, 10.0)])
    }

    #[tokio::test]
    async fn dispatch_runs_and_completes_a_safe_mission() {
        let registry = Arc::new(MissionRegistry::new());
        let trajectory = Arc::new(TrajectoryStore::new(3600, 100));
        // Never confirms arrival via `status`, so completion falls back to
        // the mission's own `end_time` elapsing — pick a window that has
        // already elapsed by dispatch time so the test doesn't block on a
        // real-clock wait for it.
        let driver = Arc::new(StubDriver::accepting());
        let clock = TokioClock::shared();
        let config = CoreConfig::default();

        let start: DateTime<Utc> = clock.wall_time() - chrono::Duration::seconds(61);
        let mission = registry
            .schedule(VehicleId::new("d1"), plan(), start, start + chrono::Duration::seconds(60), &[], &config)
            .await
            .unwrap();

        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), trajectory, driver, clock, config));
        dispatcher.dispatch_one(registry.get(mission.id).unwrap()).await;

        assert_eq!(registry.get(mission.id).unwrap().state, MissionState::Completed);
    }

    /// Completion can also be driven by the driver confirming arrival at the
    /// final waypoint well before `end_time` elapses.
    #[tokio::test]
    async fn dispatch_completes_promptly_on_confirmed_arrival() {
        let registry = Arc::new(MissionRegistry::new());
        let trajectory = Arc::new(TrajectoryStore::new(3600, 100));
        let final_position = Waypoint::new(0.0, 0.001, 10.0).to_position();
        let driver = Arc::new(StubDriver::confirming(final_position));
        let clock = TokioClock::shared();
        let config = CoreConfig::default();

        let start: DateTime<Utc> = clock.wall_time() - chrono::Duration::seconds(1);
        let mission = registry
            .schedule(VehicleId::new("d1"), plan(), start, start + chrono::Duration::seconds(60), &[], &config)
            .await
            .unwrap();

        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), trajectory, driver, clock, config));
        dispatcher.dispatch_one(registry.get(mission.id).unwrap()).await;

        assert_eq!(registry.get(mission.id).unwrap().state, MissionState::Completed);
    }

    /// Guards the safety property the maintainer flagged: acceptance of the
    /// final `Goto` command must not by itself complete the mission. While
    /// the driver has yet to confirm arrival and `end_time` hasn't elapsed,
    /// the mission must still read RUNNING (and therefore still count as
    /// active for vehicle-exclusivity/planned-conflict checks elsewhere).
    #[tokio::test]
    async fn mission_stays_running_until_arrival_or_end_time_elapses() {
        let registry = Arc::new(MissionRegistry::new());
        let trajectory = Arc::new(TrajectoryStore::new(3600, 100));
        let driver = Arc::new(StubDriver::accepting());
        let clock = TokioClock::shared();
        let config = CoreConfig::default();

        let start = clock.wall_time() - chrono::Duration::milliseconds(10);
        let end = start + chrono::Duration::milliseconds(300);
        let mission = registry
            .schedule(VehicleId::new("d1"), tiny_plan(), start, end, &[], &config)
            .await
            .unwrap();

        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), trajectory, driver, clock, config));
        let mission_record = registry.get(mission.id).unwrap();
        let dispatch_task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch_one(mission_record).await }
        });

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        let mid_flight = registry.get(mission.id).unwrap();
        assert_eq!(mid_flight.state, MissionState::Running);

        dispatch_task.await.unwrap();
        assert_eq!(registry.get(mission.id).unwrap().state, MissionState::Completed);
    }

    #[tokio::test]
    async fn dispatch_fails_mission_on_late_conflict() {
        let registry = Arc::new(MissionRegistry::new());
        let trajectory = Arc::new(TrajectoryStore::new(3600, 100));
        let driver = Arc::new(StubDriver::accepting());
        let clock = TokioClock::shared();
        let config = CoreConfig::default();

        let start = clock.wall_time() - chrono::Duration::seconds(1);
        let mission = registry
            .schedule(VehicleId::new("d1"), plan(), start, start + chrono::Duration::seconds(60), &[], &config)
            .await
            .unwrap();

        // A live vehicle sitting directly on the candidate's own first waypoint.
        trajectory.append(TrajectorySample {
            vehicle_id: VehicleId::new("d2"),
            timestamp: clock.wall_time(),
            position: Position::new(0.0, 0.0, 10.0),
            velocity: Velocity::default(),
        });

        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), trajectory, driver, clock, config));
        dispatcher.dispatch_one(registry.get(mission.id).unwrap()).await;

        let after = registry.get(mission.id).unwrap();
        assert_eq!(after.state, MissionState::Failed);
        assert_eq!(after.failure_reason, Some(FailureReason::LateConflict));
    }
}
