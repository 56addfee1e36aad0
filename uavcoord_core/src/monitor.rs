//! Live conflict monitor: a ticker that scans current telemetry
//! pairwise for proximity violations and applies an edge-triggered
//! de-duplication state machine. The de-dup table is owned exclusively by
//! this component — nothing outside `monitor.rs` ever touches it.

use crate::config::CoreConfig;
use crate::geo;
use crate::model::{Conflict, ConflictKind, ConflictSeverity, TimeInterval};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uavcoord_env::{ClockContext, TrajectorySample, VehicleId};

use crate::trajectory::TrajectoryStore;

/// One conflicting-pair's de-dup bookkeeping.
struct PairState {
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    last_alert_sent: DateTime<Utc>,
    last_distance_m: f64,
}

/// Canonical (sorted) key for an unordered vehicle pair.
fn pair_key(a: &VehicleId, b: &VehicleId) -> (VehicleId, VehicleId) {
    if a.0 <= b.0 {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

pub struct LiveMonitor<C: ClockContext> {
    trajectory: Arc<TrajectoryStore>,
    clock: Arc<C>,
    config: CoreConfig,
    conflicts_tx: tokio::sync::watch::Sender<Vec<Conflict>>,
    alerts_tx: tokio::sync::mpsc::Sender<Conflict>,
    dedup: std::sync::Mutex<HashMap<(VehicleId, VehicleId), PairState>>,
}

impl<C: ClockContext> LiveMonitor<C> {
    pub fn new(
        trajectory: Arc<TrajectoryStore>,
        clock: Arc<C>,
        config: CoreConfig,
        alerts_tx: tokio::sync::mpsc::Sender<Conflict>,
    ) -> (Self, tokio::sync::watch::Receiver<Vec<Conflict>>) {
        let (conflicts_tx, conflicts_rx) = tokio::sync::watch::channel(Vec::new());
        (
            Self {
                trajectory,
                clock,
                config,
                conflicts_tx,
                alerts_tx,
                dedup: std::sync::Mutex::new(HashMap::new()),
            },
            conflicts_rx,
        )
    }

    /// Runs the tick loop until `shutdown` resolves. Hand to `ClockContext::spawn`.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let interval = self.config.tick_interval();
        loop {
            tokio::select! {
                _ = self.clock.sleep(interval) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let now = self.clock.wall_time();
        let samples = self.trajectory.latest_all();
        let (emitted, current) = self.scan(now, &samples);

        for conflict in emitted {
            if let Err(err) = self.alerts_tx.try_send(conflict) {
                debug!(%err, "alert channel full or closed, dropping alert");
            }
        }
        let _ = self.conflicts_tx.send(current);
    }

    /// Forces one scan/emit pass outside the tick loop's own schedule.
    /// Exposed for callers that drive the monitor under their own clock
    /// rather than spawning `run` (e.g. a deterministic scenario harness).
    pub async fn tick_once(&self) {
        self.tick().await;
    }

    /// Performs one pairwise scan + de-dup update. Returns `(emitted,
    /// current)`: `emitted` is the edge-triggered set (initial alert or
    /// reminder) for the alert channel; `current` is every pair presently
    /// in conflict, for the broadcaster's snapshot.
    fn scan(&self, now: DateTime<Utc>, samples: &[TrajectorySample]) -> (Vec<Conflict>, Vec<Conflict>) {
        let staleness = seconds(self.config.staleness_bound_s);
        let fresh: Vec<&TrajectorySample> = samples
            .iter()
            .filter(|s| now - s.timestamp <= staleness)
            .collect();

        let mut currently_conflicting = std::collections::HashSet::new();
        let mut emitted = Vec::new();

        for i in 0..fresh.len() {
            for j in (i + 1)..fresh.len() {
                let a = fresh[i];
                let b = fresh[j];
                let distance = geo::distance_m(a.position, b.position);
                if distance >= self.config.safety_buffer_m {
                    continue;
                }
                let key = pair_key(&a.vehicle_id, &b.vehicle_id);
                currently_conflicting.insert(key.clone());

                let mut dedup = self.dedup.lock().expect("dedup table lock poisoned");
                let severity = ConflictSeverity::classify(distance, self.config.safety_buffer_m);
                match dedup.get_mut(&key) {
                    None => {
                        dedup.insert(
                            key.clone(),
                            PairState {
                                first_seen: now,
                                last_seen: now,
                                last_alert_sent: now,
                                last_distance_m: distance,
                            },
                        );
                        emitted.push(Conflict {
                            kind: ConflictKind::Live,
                            vehicle_a: key.0.clone(),
                            vehicle_b: key.1.clone(),
                            interval: Some(TimeInterval { start: now, end: now }),
                            min_distance_m: distance,
                            severity,
                        });
                    }
                    Some(state) => {
                        state.last_seen = now;
                        state.last_distance_m = distance;
                        let reminder_due = now - state.last_alert_sent >= seconds(self.config.dedup_reminder_s);
                        if reminder_due {
                            state.last_alert_sent = now;
                            emitted.push(Conflict {
                                kind: ConflictKind::Live,
                                vehicle_a: key.0.clone(),
                                vehicle_b: key.1.clone(),
                                interval: Some(TimeInterval {
                                    start: state.first_seen,
                                    end: now,
                                }),
                                min_distance_m: distance,
                                severity,
                            });
                        }
                    }
                }
            }
        }

        // Clear pairs whose gap since last conflicting sample exceeds dedup_clear_s.
        let mut dedup = self.dedup.lock().expect("dedup table lock poisoned");
        dedup.retain(|key, state| {
            if currently_conflicting.contains(key) {
                true
            } else {
                now - state.last_seen < seconds(self.config.dedup_clear_s)
            }
        });

        let current = dedup
            .iter()
            .filter(|(key, _)| currently_conflicting.contains(*key))
            .map(|(key, state)| Conflict {
                kind: ConflictKind::Live,
                vehicle_a: key.0.clone(),
                vehicle_b: key.1.clone(),
                interval: Some(TimeInterval {
                    start: state.first_seen,
                    end: now,
                }),
                min_distance_m: state.last_distance_m,
                severity: ConflictSeverity::classify(state.last_distance_m, self.config.safety_buffer_m),
            })
            .collect();

        (emitted, current)
    }
}

fn seconds(s: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((s * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uavcoord_env::{Position, TokioClock, Velocity};

    fn sample(vehicle: &str, ts: DateTime<Utc>, lat: f64) -> TrajectorySample {
        TrajectorySample {
            vehicle_id: VehicleId::new(vehicle),
            timestamp: ts,
            position: Position::new(lat, 0.0, 10.0),
            velocity: Velocity::default(),
        }
    }

    fn monitor() -> (LiveMonitor<TokioClock>, tokio::sync::mpsc::Receiver<Conflict>) {
        let trajectory = Arc::new(TrajectoryStore::new(3600, 100));
        let clock = TokioClock::shared();
        let (alerts_tx, alerts_rx) = tokio::sync::mpsc::channel(16);
        let (monitor, _conflicts_rx) = LiveMonitor::new(trajectory, clock, CoreConfig::default(), alerts_tx);
        (monitor, alerts_rx)
    }

    #[test]
    fn close_pair_produces_initial_alert() {
        let (monitor, _rx) = monitor();
        let t0 = Utc::now();
        let samples = vec![sample("d1", t0, 0.0), sample("d2", t0, 0.00001)];
        let (emitted, current) = monitor.scan(t0, &samples);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].kind, ConflictKind::Live);
        assert_eq!(current.len(), 1);
    }

    #[test]
    fn distant_pair_has_no_conflict() {
        let (monitor, _rx) = monitor();
        let t0 = Utc::now();
        let samples = vec![sample("d1", t0, 0.0), sample("d2", t0, 0.01)];
        let (emitted, current) = monitor.scan(t0, &samples);
        assert!(emitted.is_empty());
        assert!(current.is_empty());
    }

    #[test]
    fn stale_sample_is_excluded() {
        let (monitor, _rx) = monitor();
        let t0 = Utc::now();
        let stale_ts = t0 - chrono::Duration::seconds(10);
        let samples = vec![sample("d1", t0, 0.0), sample("d2", stale_ts, 0.00001)];
        let (emitted, current) = monitor.scan(t0, &samples);
        assert!(emitted.is_empty());
        assert!(current.is_empty());
    }

    /// S4 — live alert edge-trigger: 8 m apart for 7 s, dedup_reminder=5s ->
    /// initial alert at t=0 and a reminder at t=5, no third alert before
    /// separation increases.
    #[test]
    fn reminder_fires_once_within_seven_seconds() {
        let (monitor, _rx) = monitor();
        let t0 = Utc::now();
        // ~8 m south in latitude degrees.
        let offset = 8.0 / 111_195.0;
        let close = |t: DateTime<Utc>| vec![sample("d1", t, 0.0), sample("d2", t, offset)];

        let (emitted0, _) = monitor.scan(t0, &close(t0));
        assert_eq!(emitted0.len(), 1, "initial alert");

        let (emitted3, current3) =
            monitor.scan(t0 + chrono::Duration::seconds(3), &close(t0 + chrono::Duration::seconds(3)));
        assert!(emitted3.is_empty(), "no reminder before 5s elapsed");
        assert_eq!(current3.len(), 1, "pair still counted as currently conflicting");

        let (emitted5, _) =
            monitor.scan(t0 + chrono::Duration::seconds(5), &close(t0 + chrono::Duration::seconds(5)));
        assert_eq!(emitted5.len(), 1, "reminder at 5s");
    }

    #[test]
    fn pair_clears_after_gap() {
        let (monitor, _rx) = monitor();
        let t0 = Utc::now();
        let offset = 8.0 / 111_195.0;
        let close = vec![sample("d1", t0, 0.0), sample("d2", t0, offset)];
        monitor.scan(t0, &close);

        let far_t = t0 + chrono::Duration::seconds(4);
        let far = vec![sample("d1", far_t, 0.0), sample("d2", far_t, 0.01)];
        let (emitted, current) = monitor.scan(far_t, &far);
        assert!(emitted.is_empty());
        assert!(current.is_empty());
        assert!(monitor.dedup.lock().unwrap().is_empty());
    }
}
