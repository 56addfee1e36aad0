//! Deterministic simulation harness for the UAV coordination core.
//!
//! This crate wires `uavcoord_core::Core` to an in-memory ground-truth
//! stepper (`Oracle`) and a virtual clock (`SimClock`) instead of real
//! vehicles and wall-clock time, so the scenarios in `scenarios` can run many
//! simulated seconds of fleet coordination in a fraction of a second of wall
//! time. `SimClock` is backed by `madsim`'s virtual-time reactor, so a given
//! seed reproduces bit-for-bit — including the wake order of any concurrent
//! `sleep`s, not just the harness's own single-threaded ticking.
//!
//! # Usage
//!
//! ```ignore
//! use uavcoord_sim::{ScenarioId, ScenarioRunner};
//!
//! let runner = ScenarioRunner::new(42);
//! let result = runner.run(ScenarioId::HeadOnRejection);
//! assert!(result.passed);
//! ```

mod clock;
mod driver;
mod oracle;
pub mod runner;
pub mod scenarios;

pub use clock::SimClock;
pub use driver::SimFleetDriver;
pub use oracle::{GroundTruthVehicle, Oracle};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
