//! The fleet driver abstraction — the capability set the core consumes from
//! the vehicle abstraction that speaks the autopilot wire protocol (spec §6
//! "Fleet driver (consumed)"). The core treats commands as advisory to this
//! driver; it is never authoritative about actuation.

use crate::error::DriverError;
use crate::types::{Command, CommandAck, TrajectorySample, VehicleId, VehicleState};
use async_trait::async_trait;

/// Abstraction for the vehicle driver.
///
/// # Implementations
///
/// - **Production**: wraps the autopilot wire protocol (MAVLink or similar).
/// - **Simulation**: `uavcoord_sim::SimFleetDriver`, a deterministic
///   in-memory stepper used by tests and the scenario CLI.
#[async_trait]
pub trait FleetDriver: Send + Sync + 'static {
    /// Non-blocking best-effort status pull for a single vehicle.
    async fn status(&self, vehicle: &VehicleId) -> Option<VehicleState>;

    /// Status of every known vehicle.
    async fn status_all(&self) -> Vec<VehicleState>;

    /// Issues a command, returning the driver's acknowledgement or an error
    /// (rejected, timed out, vehicle unavailable).
    async fn command(&self, vehicle: &VehicleId, cmd: Command) -> Result<CommandAck, DriverError>;

    /// Idempotent emergency stop for every vehicle in the fleet.
    async fn emergency_stop_all(&self) -> Result<(), DriverError>;

    /// Pulls the next telemetry sample from the driver's trajectory tap.
    /// Returns `None` once the driver has shut down.
    async fn recv_telemetry(&self) -> Option<TrajectorySample>;
}
