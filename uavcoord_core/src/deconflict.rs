//! The deconfliction engine: a pure, synchronous function over a
//! point-in-time snapshot of the registry and live telemetry. It holds no
//! state of its own and performs no I/O, so it can run entirely inside the
//! registry's admission lock without crossing an `.await` point — the same
//! separation the rest of this crate keeps between pure math (`geo`) and
//! stateful runtime (`registry`, `monitor`).

use crate::config::CoreConfig;
use crate::error::InvalidInputReason;
use crate::geo;
use crate::model::{
    Conflict, ConflictKind, ConflictSeverity, Mission, Plan, PlannedSegment, TimeInterval,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use uavcoord_env::{Position, TrajectorySample, VehicleId};

/// A not-yet-admitted mission request, as presented to `evaluate`.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub vehicle_id: VehicleId,
    pub plan: Plan,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Result of one `evaluate` call.
#[derive(Debug, Clone)]
pub struct DeconflictOutcome {
    pub safe: bool,
    pub conflicts: Vec<Conflict>,
}

/// Runs the full five-step algorithm against a registry snapshot (active
/// missions) and a live-telemetry snapshot. Returns `Err` for the
/// structural edge cases (empty plan, inverted window, overspeed) that make
/// evaluation meaningless; otherwise always returns `Ok`, with `safe` false
/// whenever `conflicts` is non-empty.
pub fn evaluate(
    candidate: &Candidate,
    active_missions: &[Mission],
    live_samples: &[TrajectorySample],
    config: &CoreConfig,
) -> Result<DeconflictOutcome, InvalidInputReason> {
    if candidate.plan.is_empty() {
        return Err(InvalidInputReason::EmptyPlan);
    }
    if candidate.end_time <= candidate.start_time {
        return Err(InvalidInputReason::InvalidWindow);
    }

    let length_m = geo::plan_length_m(&candidate.plan);
    let window_s = (candidate.end_time - candidate.start_time).num_milliseconds() as f64 / 1000.0;
    let cruise_speed = length_m / window_s;
    if cruise_speed > config.max_cruise_speed_mps {
        return Err(InvalidInputReason::InvalidSpeed(cruise_speed));
    }

    let candidate_segment = PlannedSegment {
        plan: candidate.plan.clone(),
        start_time: candidate.start_time,
        end_time: candidate.end_time,
        cruise_speed,
    };

    let mut conflicts = Vec::new();

    // Step 4: vehicle-exclusivity, independent of the spatial checks below.
    for mission in active_missions {
        if mission.vehicle_id == candidate.vehicle_id
            && mission.window_overlaps(candidate.start_time, candidate.end_time)
        {
            let start = candidate.start_time.max(mission.start_time);
            let end = candidate.end_time.min(mission.end_time);
            conflicts.push(Conflict {
                kind: ConflictKind::VehicleExclusivity,
                vehicle_a: candidate.vehicle_id.clone(),
                vehicle_b: candidate.vehicle_id.clone(),
                interval: Some(TimeInterval { start, end }),
                min_distance_m: 0.0,
                severity: ConflictSeverity::Critical,
            });
        }
    }

    // Altitude floor, advisory and non-spatial.
    if let Some(wp) = candidate
        .plan
        .waypoints
        .iter()
        .find(|wp| wp.alt < config.altitude_floor_m)
    {
        conflicts.push(Conflict {
            kind: ConflictKind::Altitude,
            vehicle_a: candidate.vehicle_id.clone(),
            vehicle_b: candidate.vehicle_id.clone(),
            interval: Some(TimeInterval {
                start: candidate.start_time,
                end: candidate.end_time,
            }),
            min_distance_m: wp.alt,
            severity: ConflictSeverity::Warning,
        });
    }

    let resolution = seconds_to_duration(config.deconflict_resolution_s);
    let refine_precision = seconds_to_duration(config.deconflict_resolution_s * 0.1);

    // Step 2: planned-vs-planned.
    for mission in active_missions {
        if mission.vehicle_id == candidate.vehicle_id || !mission.state.is_active() {
            continue;
        }
        if !mission.window_overlaps(candidate.start_time, candidate.end_time) {
            continue;
        }
        let other_segment = mission.segment();
        let overlap_start = candidate.start_time.max(other_segment.start_time);
        let overlap_end = candidate.end_time.min(other_segment.end_time);
        if overlap_end <= overlap_start {
            continue;
        }
        let times = sample_times(overlap_start, overlap_end, resolution);
        if let Some(conflict) = scan_for_conflict(
            &candidate.vehicle_id,
            |t| geo::position_at(&candidate_segment, t),
            &mission.vehicle_id,
            |t| geo::position_at(&other_segment, t),
            &times,
            config.safety_buffer_m,
            refine_precision,
            ConflictKind::Planned,
        ) {
            conflicts.push(conflict);
        }
    }

    // Step 3: MIXED — live vehicles with no active mission, projected
    // forward at constant velocity within the projection horizon.
    let vehicles_with_missions: HashSet<VehicleId> = active_missions
        .iter()
        .filter(|m| m.state.is_active())
        .map(|m| m.vehicle_id.clone())
        .collect();
    let horizon = seconds_to_duration(config.projection_horizon_s);

    for sample in live_samples {
        if sample.vehicle_id == candidate.vehicle_id
            || vehicles_with_missions.contains(&sample.vehicle_id)
        {
            continue;
        }
        let projection_end = sample.timestamp + horizon;
        let overlap_start = candidate.start_time.max(sample.timestamp);
        let overlap_end = candidate.end_time.min(projection_end);
        if overlap_end <= overlap_start {
            continue;
        }
        let times = sample_times(overlap_start, overlap_end, resolution);
        let origin: Position = sample.position;
        let vel = sample.velocity;
        let origin_t = sample.timestamp;
        let project = |t: DateTime<Utc>| {
            let dt = (t - origin_t).num_milliseconds() as f64 / 1000.0;
            geo::offset_position(origin, vel.vx * dt, vel.vy * dt, vel.vz * dt)
        };
        if let Some(conflict) = scan_for_conflict(
            &candidate.vehicle_id,
            |t| geo::position_at(&candidate_segment, t),
            &sample.vehicle_id,
            project,
            &times,
            config.safety_buffer_m,
            refine_precision,
            ConflictKind::Mixed,
        ) {
            conflicts.push(conflict);
        }
    }

    Ok(DeconflictOutcome {
        safe: conflicts.is_empty(),
        conflicts,
    })
}

/// A restricted re-validation pass for the scheduler's dispatch-time
/// second look: only MIXED/LIVE-relevant (i.e. live
/// telemetry) conflicts are considered, since by dispatch time the
/// candidate's own registry entry already exists.
pub fn evaluate_against_live(
    candidate: &Candidate,
    live_samples: &[TrajectorySample],
    config: &CoreConfig,
) -> Result<DeconflictOutcome, InvalidInputReason> {
    evaluate(candidate, &[], live_samples, config)
}

fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::milliseconds((seconds * 1000.0).round() as i64)
}

fn sample_times(start: DateTime<Utc>, end: DateTime<Utc>, delta: Duration) -> Vec<DateTime<Utc>> {
    let mut times = vec![start];
    let mut t = start + delta;
    while t < end {
        times.push(t);
        t += delta;
    }
    times.push(end);
    times
}

/// Scans a sampled time series for the sub-interval where `d(t) < buffer`
///, and
/// refines the interval's boundaries to `refine_precision` by bisection
///.
#[allow(clippy::too_many_arguments)]
fn scan_for_conflict<FA, FB>(
    vehicle_a: &VehicleId,
    pos_a: FA,
    vehicle_b: &VehicleId,
    pos_b: FB,
    times: &[DateTime<Utc>],
    buffer: f64,
    refine_precision: Duration,
    kind: ConflictKind,
) -> Option<Conflict>
where
    FA: Fn(DateTime<Utc>) -> Position,
    FB: Fn(DateTime<Utc>) -> Position,
{
    let distances: Vec<f64> = times.iter().map(|&t| geo::distance_m(pos_a(t), pos_b(t))).collect();
    let (min_idx, &min_dist) = distances
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).expect("distance is never NaN"))?;
    if min_dist >= buffer {
        return None;
    }

    let mut first = min_idx;
    while first > 0 && distances[first - 1] < buffer {
        first -= 1;
    }
    let mut last = min_idx;
    while last + 1 < distances.len() && distances[last + 1] < buffer {
        last += 1;
    }

    let interval_start = if first == 0 {
        times[0]
    } else {
        refine_boundary(&pos_a, &pos_b, buffer, times[first], times[first - 1], refine_precision)
    };
    let interval_end = if last == times.len() - 1 {
        times[last]
    } else {
        refine_boundary(&pos_a, &pos_b, buffer, times[last], times[last + 1], refine_precision)
    };

    Some(Conflict {
        kind,
        vehicle_a: vehicle_a.clone(),
        vehicle_b: vehicle_b.clone(),
        interval: Some(TimeInterval {
            start: interval_start,
            end: interval_end,
        }),
        min_distance_m: min_dist,
        severity: ConflictSeverity::classify(min_dist, buffer),
    })
}

/// Bisects between a sample known to be inside the conflict (`d < buffer`)
/// and one known to be outside it, to within `precision`.
fn refine_boundary<FA, FB>(
    pos_a: FA,
    pos_b: FB,
    buffer: f64,
    mut inside: DateTime<Utc>,
    mut outside: DateTime<Utc>,
    precision: Duration,
) -> DateTime<Utc>
where
    FA: Fn(DateTime<Utc>) -> Position,
    FB: Fn(DateTime<Utc>) -> Position,
{
    while (outside - inside).abs() > precision {
        let mid = inside + (outside - inside) / 2;
        let d = geo::distance_m(pos_a(mid), pos_b(mid));
        if d < buffer {
            inside = mid;
        } else {
            outside = mid;
        }
    }
    inside
}
