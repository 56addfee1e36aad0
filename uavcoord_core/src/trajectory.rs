//! Per-vehicle trajectory store: an append-only, time-ordered
//! ring buffer of live telemetry samples, retained for a configured window.
//!
//! Concurrency discipline: single writer per vehicle (the driver
//! poller), multiple readers; cross-vehicle consistency is only guaranteed
//! by `latest_all`, which takes each vehicle's lock briefly and in turn —
//! never all at once — so it never contends with `append`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::RwLock;
use uavcoord_env::{TrajectorySample, VehicleId};

/// Smallest index in `buf` for which `pred` no longer holds, via binary
/// search on `VecDeque`'s O(1) indexed access. `buf` must be ordered so that
/// every index satisfying `pred` precedes every index that doesn't.
fn lower_bound<F>(buf: &VecDeque<TrajectorySample>, pred: F) -> usize
where
    F: Fn(&TrajectorySample) -> bool,
{
    let mut lo = 0;
    let mut hi = buf.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(&buf[mid]) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

pub struct TrajectoryStore {
    buffers: DashMap<VehicleId, RwLock<VecDeque<TrajectorySample>>>,
    retention: chrono::Duration,
    jitter_slack: chrono::Duration,
}

impl TrajectoryStore {
    pub fn new(retention_s: u64, jitter_slack_ms: i64) -> Self {
        Self {
            buffers: DashMap::new(),
            retention: chrono::Duration::seconds(retention_s as i64),
            jitter_slack: chrono::Duration::milliseconds(jitter_slack_ms),
        }
    }

    /// Appends a sample for `sample.vehicle_id`. Samples older than the
    /// current newest by more than the configured jitter slack are silently
    /// dropped rather than erroring — clock jitter from the
    /// driver is expected, not exceptional.
    pub fn append(&self, sample: TrajectorySample) {
        let lock = self
            .buffers
            .entry(sample.vehicle_id.clone())
            .or_insert_with(|| RwLock::new(VecDeque::new()));
        let mut buf = lock.write().expect("trajectory buffer lock poisoned");
        if let Some(newest) = buf.back() {
            if sample.timestamp + self.jitter_slack < newest.timestamp {
                return;
            }
        }
        buf.push_back(sample);
    }

    pub fn latest(&self, vehicle: &VehicleId) -> Option<TrajectorySample> {
        let entry = self.buffers.get(vehicle)?;
        let buf = entry.read().expect("trajectory buffer lock poisoned");
        buf.back().cloned()
    }

    /// Ordered samples with `t_from <= timestamp <= t_to`, located by binary
    /// search over the buffer's (near-)monotonic timestamp order rather than
    /// a full scan: O(log n + k) instead of O(n).
    pub fn slice(
        &self,
        vehicle: &VehicleId,
        t_from: DateTime<Utc>,
        t_to: DateTime<Utc>,
    ) -> Vec<TrajectorySample> {
        let Some(entry) = self.buffers.get(vehicle) else {
            return Vec::new();
        };
        let buf = entry.read().expect("trajectory buffer lock poisoned");
        let start = lower_bound(&buf, |s| s.timestamp < t_from);
        let end = lower_bound(&buf, |s| s.timestamp <= t_to);
        buf.iter().skip(start).take(end - start).cloned().collect()
    }

    /// A point-in-time consistent snapshot of the most recent sample per
    /// vehicle — the only cross-vehicle read the store offers.
    pub fn latest_all(&self) -> Vec<TrajectorySample> {
        self.buffers
            .iter()
            .filter_map(|entry| {
                let buf = entry.value().read().expect("trajectory buffer lock poisoned");
                buf.back().cloned()
            })
            .collect()
    }

    /// Removes samples older than the retention window, for every vehicle.
    pub fn prune(&self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        for entry in self.buffers.iter() {
            let mut buf = entry.value().write().expect("trajectory buffer lock poisoned");
            while let Some(front) = buf.front() {
                if front.timestamp < cutoff {
                    buf.pop_front();
                } else {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uavcoord_env::{Position, Velocity};

    fn sample(vehicle: &str, ts: DateTime<Utc>) -> TrajectorySample {
        TrajectorySample {
            vehicle_id: VehicleId::new(vehicle),
            timestamp: ts,
            position: Position::new(0.0, 0.0, 10.0),
            velocity: Velocity::default(),
        }
    }

    #[test]
    fn append_and_latest() {
        let store = TrajectoryStore::new(3600, 100);
        let t0 = Utc::now();
        store.append(sample("d1", t0));
        store.append(sample("d1", t0 + Duration::seconds(1)));
        let latest = store.latest(&VehicleId::new("d1")).unwrap();
        assert_eq!(latest.timestamp, t0 + Duration::seconds(1));
    }

    #[test]
    fn out_of_order_beyond_slack_is_dropped() {
        let store = TrajectoryStore::new(3600, 100);
        let t0 = Utc::now();
        store.append(sample("d1", t0));
        store.append(sample("d1", t0 - Duration::seconds(1)));
        let latest = store.latest(&VehicleId::new("d1")).unwrap();
        assert_eq!(latest.timestamp, t0);
    }

    #[test]
    fn out_of_order_within_slack_is_kept() {
        let store = TrajectoryStore::new(3600, 100);
        let t0 = Utc::now();
        store.append(sample("d1", t0));
        store.append(sample("d1", t0 - Duration::milliseconds(50)));
        let latest = store.latest(&VehicleId::new("d1")).unwrap();
        assert_eq!(latest.timestamp, t0 - Duration::milliseconds(50));
    }

    #[test]
    fn slice_is_ordered_and_bounded() {
        let store = TrajectoryStore::new(3600, 100);
        let t0 = Utc::now();
        for i in 0..5 {
            store.append(sample("d1", t0 + Duration::seconds(i)));
        }
        let result = store.slice(
            &VehicleId::new("d1"),
            t0 + Duration::seconds(1),
            t0 + Duration::seconds(3),
        );
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].timestamp, t0 + Duration::seconds(1));
        assert_eq!(result[2].timestamp, t0 + Duration::seconds(3));
    }

    #[test]
    fn latest_all_returns_one_per_vehicle() {
        let store = TrajectoryStore::new(3600, 100);
        let t0 = Utc::now();
        store.append(sample("d1", t0));
        store.append(sample("d2", t0));
        let all = store.latest_all();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn prune_removes_samples_older_than_retention() {
        let store = TrajectoryStore::new(10, 100);
        let t0 = Utc::now();
        store.append(sample("d1", t0 - Duration::seconds(20)));
        store.append(sample("d1", t0));
        store.prune(t0);
        let remaining = store.slice(&VehicleId::new("d1"), t0 - Duration::seconds(30), t0);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp, t0);
    }
}
