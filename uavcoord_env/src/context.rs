//! Clock/task abstraction the core runs its background tasks against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// The central interface for time and task interaction.
///
/// This trait abstracts "the real world" so the dispatcher, live monitor,
/// and broadcaster can run unchanged in production (`TokioClock`) or under a
/// deterministic simulation (`uavcoord_sim::SimClock`) driven tick-by-tick by
/// a scenario runner.
///
/// # Determinism
///
/// For scenario replay, every source of non-determinism the core touches —
/// time and task scheduling — is routed through this trait rather than
/// called directly.
#[async_trait]
pub trait ClockContext: Send + Sync + 'static {
    /// Monotonic time since context creation. Used for internal timers and
    /// duration measurements (tick cadence, watchdogs).
    fn now(&self) -> Duration;

    /// Wall-clock time for boundary timestamps (ISO-8601 per spec §6).
    fn wall_time(&self) -> DateTime<Utc>;

    /// Suspends execution for the given duration.
    ///
    /// Production: wraps `tokio::time::sleep`.
    /// Simulation: resolves once the virtual clock has been advanced past
    /// `now() + duration` by the scenario driving it.
    async fn sleep(&self, duration: Duration);

    /// Spawns a long-lived background task (dispatcher, monitor,
    /// broadcaster ticker).
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
