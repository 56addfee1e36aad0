//! Pure geo math: distance between geodetic points and
//! time-parameterized interpolation along a planned segment. No I/O, no
//! shared state — these functions are called directly from the
//! deconfliction engine under its admission lock.

use crate::model::{Plan, PlannedSegment, Waypoint};
use chrono::{DateTime, Utc};
use uavcoord_env::Position;

/// Earth radius used for both the equirectangular and Haversine forms.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Threshold below which the cheap local-tangent-plane approximation is
/// used instead of Haversine. Fixed so that two implementations always
/// agree.
const LOCAL_APPROX_THRESHOLD_M: f64 = 10_000.0;

/// Horizontal distance (meters) via the equirectangular projection, valid
/// for point pairs expected to be within `LOCAL_APPROX_THRESHOLD_M` of each
/// other.
fn equirectangular_m(a: Position, b: Position) -> f64 {
    let lat_mid = (a.lat + b.lat).to_radians() / 2.0;
    let dx = (b.lon - a.lon).to_radians() * lat_mid.cos() * EARTH_RADIUS_M;
    let dy = (b.lat - a.lat).to_radians() * EARTH_RADIUS_M;
    (dx * dx + dy * dy).sqrt()
}

/// Great-circle horizontal distance (meters) via the Haversine formula.
fn haversine_m(a: Position, b: Position) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Horizontal-only distance, choosing the approximation per the 10 km rule.
fn horizontal_distance_m(a: Position, b: Position) -> f64 {
    let approx = equirectangular_m(a, b);
    if approx <= LOCAL_APPROX_THRESHOLD_M {
        approx
    } else {
        haversine_m(a, b)
    }
}

/// Full 3-D Euclidean distance: horizontal distance (great-circle or local
/// approximation) combined with the vertical (altitude) difference via
/// Pythagoras.
pub fn distance_m(a: Position, b: Position) -> f64 {
    let horizontal = horizontal_distance_m(a, b);
    let vertical = b.alt - a.alt;
    (horizontal * horizontal + vertical * vertical).sqrt()
}

/// Inverse of the local-tangent-plane projection: displaces `origin` by a
/// local-frame offset in meters (east/north/up), used to project a live
/// vehicle's constant-velocity trajectory forward in time.
pub fn offset_position(origin: Position, east_m: f64, north_m: f64, up_m: f64) -> Position {
    let lat_rad = origin.lat.to_radians();
    let dlat = (north_m / EARTH_RADIUS_M).to_degrees();
    let dlon = (east_m / (EARTH_RADIUS_M * lat_rad.cos())).to_degrees();
    Position::new(origin.lat + dlat, origin.lon + dlon, origin.alt + up_m)
}

/// Forward companion of `offset_position`: the local-frame (east, north)
/// offset of `point` from `origin`, in meters. Exact inverse of
/// `offset_position` for the horizontal plane (round-trips to within
/// floating-point error for points within the local-approximation range).
pub fn local_offset_m(origin: Position, point: Position) -> (f64, f64) {
    let lat_rad = origin.lat.to_radians();
    let east_m = (point.lon - origin.lon).to_radians() * lat_rad.cos() * EARTH_RADIUS_M;
    let north_m = (point.lat - origin.lat).to_radians() * EARTH_RADIUS_M;
    (east_m, north_m)
}

/// Total path length of a plan's waypoint polyline, in meters.
pub fn plan_length_m(plan: &Plan) -> f64 {
    plan.waypoints
        .windows(2)
        .map(|pair| distance_m(pair[0].to_position(), pair[1].to_position()))
        .sum()
}

/// Evaluates a `PlannedSegment` at time `t`: walk legs by cumulative length
/// until the consumed length equals `cruise_speed * (t - start_time)`, then
/// linearly interpolate (including altitude) within the current leg. Times
/// outside `[start_time, end_time]` clamp to the nearest endpoint.
pub fn position_at(segment: &PlannedSegment, t: DateTime<Utc>) -> Position {
    let waypoints = &segment.plan.waypoints;
    debug_assert!(!waypoints.is_empty(), "position_at called on an empty plan");
    if waypoints.len() == 1 {
        return waypoints[0].to_position();
    }

    let t_clamped = t.clamp(segment.start_time, segment.end_time);
    let elapsed_s = (t_clamped - segment.start_time).num_milliseconds() as f64 / 1000.0;
    let target_length = segment.cruise_speed * elapsed_s;

    let mut consumed = 0.0;
    for pair in waypoints.windows(2) {
        let a = pair[0];
        let b = pair[1];
        let leg_length = distance_m(a.to_position(), b.to_position());
        if leg_length <= f64::EPSILON {
            // Degenerate (coincident) leg: no distance to consume, fall through.
            continue;
        }
        if consumed + leg_length >= target_length || is_last_leg(waypoints, pair) {
            let remaining = (target_length - consumed).clamp(0.0, leg_length);
            let frac = remaining / leg_length;
            return interpolate(a, b, frac);
        }
        consumed += leg_length;
    }

    waypoints[waypoints.len() - 1].to_position()
}

fn is_last_leg(waypoints: &[Waypoint], pair: &[Waypoint]) -> bool {
    let last_two = &waypoints[waypoints.len() - 2..];
    pair[0] == last_two[0] && pair[1] == last_two[1]
}

fn interpolate(a: Waypoint, b: Waypoint, frac: f64) -> Position {
    Position::new(
        a.lat + (b.lat - a.lat) * frac,
        a.lon + (b.lon - a.lon) * frac,
        a.alt + (b.alt - a.alt) * frac,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use chrono::Duration;

    fn pos(lat: f64, lon: f64, alt: f64) -> Position {
        Position::new(lat, lon, alt)
    }

    #[test]
    fn equirectangular_matches_known_short_distance() {
        // ~0.001 deg of latitude is ~111 m.
        let a = pos(0.0, 0.0, 10.0);
        let b = pos(0.001, 0.0, 10.0);
        assert_relative_eq!(distance_m(a, b), 111.19, epsilon = 1.0);
    }

    #[test]
    fn vertical_component_uses_pythagoras() {
        let a = pos(0.0, 0.0, 0.0);
        let b = pos(0.0, 0.0, 10.0);
        assert_relative_eq!(distance_m(a, b), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn haversine_used_beyond_threshold() {
        // ~1 degree of latitude is ~111 km, well past the 10 km cutover.
        let a = pos(0.0, 0.0, 0.0);
        let b = pos(1.0, 0.0, 0.0);
        assert_relative_eq!(distance_m(a, b), 111_195.0, epsilon = 200.0);
    }

    #[test]
    fn interpolation_is_equal_speed_per_leg_at_midpoint() {
        let start = Utc::now();
        let end = start + Duration::seconds(60);
        let plan = Plan::new(vec![
            Waypoint::new(0.0, 0.0, 10.0),
            Waypoint::new(0.0, 0.001, 10.0),
        ]);
        let length = plan_length_m(&plan);
        let segment = PlannedSegment {
            plan,
            start_time: start,
            end_time: end,
            cruise_speed: length / 60.0,
        };
        let mid = position_at(&segment, start + Duration::seconds(30));
        assert_abs_diff_eq!(mid.lon, 0.0005, epsilon = 1e-6);
    }

    #[test]
    fn interpolation_clamps_outside_window() {
        let start = Utc::now();
        let end = start + Duration::seconds(60);
        let plan = Plan::new(vec![
            Waypoint::new(0.0, 0.0, 10.0),
            Waypoint::new(0.0, 0.001, 10.0),
        ]);
        let length = plan_length_m(&plan);
        let segment = PlannedSegment {
            plan,
            start_time: start,
            end_time: end,
            cruise_speed: length / 60.0,
        };
        let before = position_at(&segment, start - Duration::seconds(10));
        let after = position_at(&segment, end + Duration::seconds(10));
        assert_eq!(before, Position::new(0.0, 0.0, 10.0));
        assert_eq!(after, Position::new(0.0, 0.001, 10.0));
    }

    #[test]
    fn local_offset_round_trips_through_offset_position() {
        let origin = pos(12.5, -3.2, 50.0);
        let (east, north) = local_offset_m(origin, pos(12.501, -3.199, 60.0));
        let back = offset_position(origin, east, north, 10.0);
        assert_abs_diff_eq!(back.lat, 12.501, epsilon = 1e-9);
        assert_abs_diff_eq!(back.lon, -3.199, epsilon = 1e-9);
    }

    #[test]
    fn multi_leg_interpolation_reaches_second_leg() {
        let start = Utc::now();
        let end = start + Duration::seconds(100);
        let plan = Plan::new(vec![
            Waypoint::new(0.0, 0.0, 10.0),
            Waypoint::new(0.0, 0.0005, 10.0),
            Waypoint::new(0.0, 0.001, 10.0),
        ]);
        let length = plan_length_m(&plan);
        let segment = PlannedSegment {
            plan,
            start_time: start,
            end_time: end,
            cruise_speed: length / 100.0,
        };
        let near_end = position_at(&segment, start + Duration::seconds(90));
        assert!(near_end.lon > 0.0005);
    }
}
