//! `SimClock`: the deterministic `ClockContext` implementation the scenario
//! runner drives instead of wall-clock time. `now`/`wall_time` are read off
//! `madsim`'s virtual `Instant`, and `sleep`/`spawn` are thin wrappers over
//! `madsim::time`/`madsim::task` — the crate's actual DST runtime, not a
//! hand-rolled stand-in for one. Running anything that calls `sleep` or
//! `spawn` requires being inside a `madsim::runtime::Runtime::block_on`
//! (`ScenarioRunner::run` sets this up); two tasks racing on `sleep` resolve
//! in madsim's event-queue order rather than in spawn order, so a scenario
//! that exercises `Core::start`'s spawned task loops is reproducible from the
//! seed alone, the same guarantee the harness's own direct ticking already
//! gave the no-concurrency scenarios.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uavcoord_env::ClockContext;

pub struct SimClock {
    seed: u64,
    start: madsim::time::Instant,
    epoch: DateTime<Utc>,
}

impl SimClock {
    /// Must be called from inside a `madsim::runtime::Runtime::block_on` —
    /// `madsim::time::Instant::now()` has no meaning outside one.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start: madsim::time::Instant::now(),
            epoch: "2024-01-01T00:00:00Z".parse().expect("valid epoch literal"),
        }
    }

    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[async_trait]
impl ClockContext for SimClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        self.epoch + chrono::Duration::from_std(self.now()).unwrap_or_default()
    }

    /// Suspends on madsim's virtual-time reactor; resolves in deadline order
    /// against any other task sleeping in the same `Runtime`, and — because
    /// nothing else is runnable while every task is parked on a timer —
    /// advances the runtime's clock by exactly `duration` rather than by
    /// however long the host machine takes to schedule the wakeup.
    async fn sleep(&self, duration: Duration) {
        madsim::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.to_string();
        madsim::task::spawn(async move {
            debug!(task = %name, "spawned (sim)");
            future.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_retained() {
        let rt = madsim::runtime::Runtime::new();
        rt.block_on(async {
            assert_eq!(SimClock::new(12345).seed(), 12345);
        });
    }

    #[test]
    fn virtual_time_starts_at_zero() {
        let rt = madsim::runtime::Runtime::new();
        rt.block_on(async {
            let clock = SimClock::new(42);
            assert_eq!(clock.now(), Duration::ZERO);
        });
    }

    #[test]
    fn sleep_advances_virtual_time() {
        let rt = madsim::runtime::Runtime::new();
        rt.block_on(async {
            let clock = SimClock::new(42);
            clock.sleep(Duration::from_secs(1)).await;
            assert_eq!(clock.now(), Duration::from_secs(1));
            clock.sleep(Duration::from_millis(500)).await;
            assert_eq!(clock.now(), Duration::from_millis(1500));
        });
    }

    #[test]
    fn concurrent_sleeps_resolve_in_deadline_order() {
        let rt = madsim::runtime::Runtime::new();
        rt.block_on(async {
            let clock = Arc::new(SimClock::new(7));
            let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

            let (c1, o1) = (clock.clone(), order.clone());
            let short = madsim::task::spawn(async move {
                c1.sleep(Duration::from_millis(100)).await;
                o1.lock().await.push("short");
            });
            let (c2, o2) = (clock.clone(), order.clone());
            let long = madsim::task::spawn(async move {
                c2.sleep(Duration::from_millis(500)).await;
                o2.lock().await.push("long");
            });
            short.await.expect("short sleep task panicked");
            long.await.expect("long sleep task panicked");

            assert_eq!(*order.lock().await, vec!["short", "long"]);
            assert_eq!(clock.now(), Duration::from_millis(500));
        });
    }

    #[test]
    fn wall_time_tracks_the_virtual_clock_from_a_fixed_epoch() {
        let rt = madsim::runtime::Runtime::new();
        rt.block_on(async {
            let clock = SimClock::new(42);
            let t0 = clock.wall_time();
            clock.sleep(Duration::from_secs(10)).await;
            let t1 = clock.wall_time();
            assert_eq!((t1 - t0).num_seconds(), 10);
        });
    }
}
