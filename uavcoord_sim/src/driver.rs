//! `SimFleetDriver`: an in-memory `FleetDriver` backed by `Oracle`, the
//! deterministic ground-truth stepper. Shaped the same way as
//! `uavcoord_env::TokioClock`: a thin, fully-owned adapter between the trait
//! the core consumes and a concrete backing store, here a `Mutex<Oracle>`
//! instead of OS calls.

use crate::oracle::Oracle;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use uavcoord_env::{Command, CommandAck, DriverError, FleetDriver, Position, TrajectorySample, VehicleId, VehicleState};

const TELEMETRY_CHANNEL_CAPACITY: usize = 1024;

pub struct SimFleetDriver {
    oracle: Mutex<Oracle>,
    telemetry_tx: mpsc::Sender<TrajectorySample>,
    telemetry_rx: Mutex<mpsc::Receiver<TrajectorySample>>,
}

impl SimFleetDriver {
    pub fn new(oracle: Oracle) -> Self {
        let (telemetry_tx, telemetry_rx) = mpsc::channel(TELEMETRY_CHANNEL_CAPACITY);
        Self {
            oracle: Mutex::new(oracle),
            telemetry_tx,
            telemetry_rx: Mutex::new(telemetry_rx),
        }
    }

    /// Advances the backing oracle by `dt` and emits a fresh telemetry
    /// sample for every vehicle, timestamped at `wall_time`. Called by the
    /// scenario runner once per tick — this is the simulation's analogue of
    /// telemetry arriving off the wire in production.
    pub fn tick(&self, dt: Duration, wall_time: chrono::DateTime<chrono::Utc>) {
        let mut oracle = self.oracle.lock().expect("oracle mutex poisoned");
        oracle.step(dt.as_secs_f64());
        for id in oracle.vehicle_ids() {
            let Some(position) = oracle.noisy_position(&id) else {
                continue;
            };
            let velocity = oracle.velocity(&id).unwrap_or_default();
            let sample = TrajectorySample {
                vehicle_id: id,
                timestamp: wall_time,
                position,
                velocity,
            };
            // Best-effort: a full channel means no consumer is pulling
            // telemetry, which is the scenario's problem, not the driver's.
            let _ = self.telemetry_tx.try_send(sample);
        }
    }

    pub fn true_position(&self, id: &VehicleId) -> Option<Position> {
        self.oracle.lock().expect("oracle mutex poisoned").true_position(id)
    }

    /// Adds a vehicle to the backing oracle, armed and ready to fly. Exposed
    /// so the scenario harness can populate a fleet before driving ticks.
    pub fn spawn(&self, id: VehicleId, position: Position, velocity: uavcoord_env::Velocity) {
        self.oracle.lock().expect("oracle mutex poisoned").spawn(id, position, velocity);
    }

    /// Jumps a vehicle straight to `position`, bypassing its current target
    /// or velocity — used by scenarios that need an instantaneous ground-truth
    /// change.
    pub fn teleport(&self, id: &VehicleId, position: Position) {
        self.oracle.lock().expect("oracle mutex poisoned").teleport(id, position);
    }

    /// Drains every telemetry sample currently buffered, without blocking.
    /// The scenario harness calls this immediately after `tick` so it can
    /// feed samples into the trajectory store on its own schedule rather
    /// than awaiting `recv_telemetry` one vehicle at a time.
    pub fn drain_telemetry(&self) -> Vec<TrajectorySample> {
        let mut rx = self.telemetry_rx.lock().expect("telemetry rx mutex poisoned");
        let mut samples = Vec::new();
        while let Ok(sample) = rx.try_recv() {
            samples.push(sample);
        }
        samples
    }
}

#[async_trait]
impl FleetDriver for SimFleetDriver {
    async fn status(&self, vehicle: &VehicleId) -> Option<VehicleState> {
        let oracle = self.oracle.lock().expect("oracle mutex poisoned");
        let position = oracle.true_position(vehicle)?;
        let velocity = oracle.velocity(vehicle)?;
        let armed = oracle.is_armed(vehicle)?;
        Some(VehicleState {
            vehicle_id: vehicle.clone(),
            position,
            velocity,
            battery: 1.0,
            armed,
            flight_mode: if armed { "GUIDED".to_string() } else { "DISARMED".to_string() },
            timestamp: chrono::Utc::now(),
        })
    }

    async fn status_all(&self) -> Vec<VehicleState> {
        let ids = self.oracle.lock().expect("oracle mutex poisoned").vehicle_ids();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(state) = self.status(&id).await {
                out.push(state);
            }
        }
        out
    }

    async fn command(&self, vehicle: &VehicleId, cmd: Command) -> Result<CommandAck, DriverError> {
        let mut oracle = self.oracle.lock().expect("oracle mutex poisoned");
        if oracle.is_armed(vehicle).is_none() {
            return Err(DriverError::VehicleUnavailable(vehicle.clone()));
        }
        match cmd {
            Command::Arm => oracle.set_armed(vehicle, true),
            Command::Disarm => oracle.set_armed(vehicle, false),
            Command::Takeoff { alt } => {
                if let Some(pos) = oracle.true_position(vehicle) {
                    oracle.set_target(vehicle, Position::new(pos.lat, pos.lon, alt), 2.0);
                }
            }
            Command::Land => {
                if let Some(pos) = oracle.true_position(vehicle) {
                    oracle.set_target(vehicle, Position::new(pos.lat, pos.lon, 0.0), 2.0);
                }
            }
            Command::Rtl => oracle.stop(vehicle),
            Command::Goto { lat, lon, alt } => oracle.set_target(vehicle, Position::new(lat, lon, alt), 10.0),
            Command::Stop => oracle.stop(vehicle),
        }
        Ok(CommandAck {
            vehicle_id: vehicle.clone(),
            accepted: true,
            detail: None,
        })
    }

    async fn emergency_stop_all(&self) -> Result<(), DriverError> {
        self.oracle.lock().expect("oracle mutex poisoned").stop_all();
        Ok(())
    }

    async fn recv_telemetry(&self) -> Option<TrajectorySample> {
        self.telemetry_rx.lock().expect("telemetry rx mutex poisoned").recv().await
    }
}
