//! Environment abstraction layer for the UAV fleet coordination core.
//!
//! This crate provides the "Sans-IO" boundary the core runs against so that
//! the same dispatcher/monitor/broadcaster code works unchanged against a
//! production fleet and against a deterministic simulation driven by
//! `uavcoord_sim`. Three things are intercepted here rather than called
//! directly by the core:
//!
//! - Time (`ClockContext::now`/`sleep`/`spawn`)
//! - The fleet driver (`FleetDriver::status`/`command`/`recv_telemetry`)
//! - The persistence sink (`Persistence::put_mission`/...)
//!
//! # Example
//!
//! ```ignore
//! use uavcoord_env::{ClockContext, FleetDriver};
//!
//! async fn tick<C: ClockContext, D: FleetDriver>(ctx: &C, driver: &D) {
//!     let states = driver.status_all().await;
//!     ctx.sleep(std::time::Duration::from_millis(500)).await;
//! }
//! ```

mod context;
mod driver;
mod error;
mod persistence;
mod tokio_impl;
mod types;

pub use context::ClockContext;
pub use driver::FleetDriver;
pub use error::{DriverError, PersistenceError};
pub use persistence::{
    ConflictRecord, InMemoryPersistence, MissionFilter, MissionRecord, Persistence,
};
pub use tokio_impl::TokioClock;
pub use types::{Command, CommandAck, Position, TrajectorySample, VehicleId, VehicleState, Velocity};
