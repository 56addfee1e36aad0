//! Ground-truth physics stepper: the simulated world's "view from above"
//! that `SimFleetDriver` reports telemetry from. Kept in a local
//! east/north/up tangent plane (meters) around a configurable origin and
//! projected to geodetic `Position` via `uavcoord_core::geo::offset_position`
//! on read, rather than integrating lat/lon directly.
//!
//! Noise is a single configurable Gaussian jitter knob — trajectory samples
//! are telemetry, not a tracker's sensor-fusion input, so heavier-tailed
//! noise models aren't warranted here.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;
use uavcoord_core::geo;
use uavcoord_env::{Position, VehicleId, Velocity};

/// One simulated vehicle's true kinematic state, in local tangent-plane
/// meters relative to `Oracle::origin`.
#[derive(Debug, Clone)]
pub struct GroundTruthVehicle {
    pub id: VehicleId,
    pub east_m: f64,
    pub north_m: f64,
    pub alt_m: f64,
    pub vel_east: f64,
    pub vel_north: f64,
    pub vel_up: f64,
    pub armed: bool,
    /// A commanded waypoint (local frame); when set, the vehicle steers
    /// toward it at the speed implied by its current velocity magnitude
    /// instead of flying its raw constant velocity.
    pub target: Option<(f64, f64, f64)>,
}

impl GroundTruthVehicle {
    fn position(&self, origin: Position) -> Position {
        geo::offset_position(origin, self.east_m, self.north_m, self.alt_m)
    }

    fn velocity(&self) -> Velocity {
        Velocity::new(self.vel_east, self.vel_north, self.vel_up)
    }

    fn step(&mut self, dt: f64) {
        if !self.armed {
            return;
        }
        match self.target {
            Some((te, tn, ta)) => {
                let dx = te - self.east_m;
                let dy = tn - self.north_m;
                let dz = ta - self.alt_m;
                let remaining = (dx * dx + dy * dy + dz * dz).sqrt();
                let speed = self.vel_east.hypot(self.vel_north).max(self.vel_up.abs()).max(1e-6);
                let step_len = (speed * dt).min(remaining);
                if remaining < 1e-6 {
                    self.target = None;
                } else {
                    let frac = step_len / remaining;
                    self.east_m += dx * frac;
                    self.north_m += dy * frac;
                    self.alt_m += dz * frac;
                }
            }
            None => {
                self.east_m += self.vel_east * dt;
                self.north_m += self.vel_north * dt;
                self.alt_m += self.vel_up * dt;
            }
        }
    }
}

/// The simulated world's ground truth, stepped in fixed `dt` increments by
/// the scenario runner.
pub struct Oracle {
    origin: Position,
    vehicles: HashMap<VehicleId, GroundTruthVehicle>,
    noise_rng: ChaCha8Rng,
    position_noise_std_m: f64,
    elapsed_s: f64,
}

impl Oracle {
    pub fn new(seed: u64, origin: Position) -> Self {
        Self {
            origin,
            vehicles: HashMap::new(),
            noise_rng: ChaCha8Rng::seed_from_u64(seed),
            position_noise_std_m: 0.0,
            elapsed_s: 0.0,
        }
    }

    pub fn set_position_noise(&mut self, std_dev_m: f64) {
        self.position_noise_std_m = std_dev_m;
    }

    pub fn spawn(&mut self, id: VehicleId, position: Position, velocity: Velocity) {
        let (east_m, north_m) = geo::local_offset_m(self.origin, position);
        self.vehicles.insert(
            id.clone(),
            GroundTruthVehicle {
                id,
                east_m,
                north_m,
                alt_m: position.alt,
                vel_east: velocity.vx,
                vel_north: velocity.vy,
                vel_up: velocity.vz,
                armed: true,
                target: None,
            },
        );
    }

    pub fn set_armed(&mut self, id: &VehicleId, armed: bool) {
        if let Some(v) = self.vehicles.get_mut(id) {
            v.armed = armed;
            if !armed {
                v.vel_east = 0.0;
                v.vel_north = 0.0;
                v.vel_up = 0.0;
            }
        }
    }

    pub fn set_target(&mut self, id: &VehicleId, target: Position, cruise_speed: f64) {
        if let Some(v) = self.vehicles.get_mut(id) {
            let (te, tn) = geo::local_offset_m(self.origin, target);
            let dx = te - v.east_m;
            let dy = tn - v.north_m;
            let dz = target.alt - v.alt_m;
            let dist = (dx * dx + dy * dy + dz * dz).sqrt().max(1e-6);
            let speed = cruise_speed.max(0.1);
            v.vel_east = dx / dist * speed;
            v.vel_north = dy / dist * speed;
            v.vel_up = dz / dist * speed;
            v.target = Some((te, tn, target.alt));
        }
    }

    /// Jumps a vehicle straight to `position`, clearing any in-flight
    /// target and velocity. Models an instantaneous ground-truth change
    /// (e.g. a scenario script placing two vehicles at a fixed separation)
    /// rather than the gradual approach `set_target` produces.
    pub fn teleport(&mut self, id: &VehicleId, position: Position) {
        if let Some(v) = self.vehicles.get_mut(id) {
            let (east_m, north_m) = geo::local_offset_m(self.origin, position);
            v.east_m = east_m;
            v.north_m = north_m;
            v.alt_m = position.alt;
            v.vel_east = 0.0;
            v.vel_north = 0.0;
            v.vel_up = 0.0;
            v.target = None;
        }
    }

    pub fn stop(&mut self, id: &VehicleId) {
        if let Some(v) = self.vehicles.get_mut(id) {
            v.vel_east = 0.0;
            v.vel_north = 0.0;
            v.vel_up = 0.0;
            v.target = None;
        }
    }

    pub fn stop_all(&mut self) {
        for v in self.vehicles.values_mut() {
            v.armed = false;
            v.vel_east = 0.0;
            v.vel_north = 0.0;
            v.vel_up = 0.0;
            v.target = None;
        }
    }

    pub fn step(&mut self, dt: f64) {
        self.elapsed_s += dt;
        for v in self.vehicles.values_mut() {
            v.step(dt);
        }
    }

    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }

    /// True position, no noise.
    pub fn true_position(&self, id: &VehicleId) -> Option<Position> {
        self.vehicles.get(id).map(|v| v.position(self.origin))
    }

    pub fn velocity(&self, id: &VehicleId) -> Option<Velocity> {
        self.vehicles.get(id).map(GroundTruthVehicle::velocity)
    }

    pub fn is_armed(&self, id: &VehicleId) -> Option<bool> {
        self.vehicles.get(id).map(|v| v.armed)
    }

    pub fn vehicle_ids(&self) -> Vec<VehicleId> {
        self.vehicles.keys().cloned().collect()
    }

    /// A noisy telemetry reading — Gaussian jitter on each horizontal axis
    /// when `position_noise_std_m > 0`, otherwise the exact true position.
    pub fn noisy_position(&mut self, id: &VehicleId) -> Option<Position> {
        let true_pos = self.true_position(id)?;
        if self.position_noise_std_m <= 0.0 {
            return Some(true_pos);
        }
        let normal = Normal::new(0.0, self.position_noise_std_m).expect("finite std dev");
        let de = normal.sample(&mut self.noise_rng);
        let dn = normal.sample(&mut self.noise_rng);
        let v = self.vehicles.get(id)?;
        Some(geo::offset_position(self.origin, v.east_m + de, v.north_m + dn, v.alt_m))
    }
}
