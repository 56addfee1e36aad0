//! Runtime configuration (spec §6 "Configuration (enumerated)"). Every field
//! has the documented default; `uavcoord_sim`'s binary loads overrides from
//! the environment via `envy` and maps a deserialization failure to exit
//! code 2.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// B, meters.
    pub safety_buffer_m: f64,
    /// Broadcaster/monitor tick rate, Hz.
    pub update_hz: f64,
    pub trajectory_retention_s: u64,
    /// Live forward-projection horizon for MIXED conflicts, seconds.
    pub projection_horizon_s: f64,
    /// Live alert reminder interval, seconds.
    pub dedup_reminder_s: f64,
    pub dedup_clear_s: f64,
    /// Δ, seconds.
    pub deconflict_resolution_s: f64,
    pub max_cruise_speed_mps: f64,
    pub altitude_floor_m: f64,
    pub driver_command_timeout_s: f64,
    pub max_drones: usize,
    /// Trajectory-store out-of-order tolerance, milliseconds.
    pub trajectory_jitter_slack_ms: i64,
    /// Live-sample staleness bound for the monitor's pairwise scan, seconds.
    pub staleness_bound_s: f64,
    /// Persistence write deadline, seconds.
    pub persistence_write_deadline_s: f64,
    /// Scheduler shutdown deadline, seconds.
    pub shutdown_deadline_s: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            safety_buffer_m: 10.0,
            update_hz: 2.0,
            trajectory_retention_s: 3600,
            projection_horizon_s: 30.0,
            dedup_reminder_s: 5.0,
            dedup_clear_s: 3.0,
            deconflict_resolution_s: 0.5,
            max_cruise_speed_mps: 20.0,
            altitude_floor_m: 2.0,
            driver_command_timeout_s: 15.0,
            max_drones: 10,
            trajectory_jitter_slack_ms: 100,
            staleness_bound_s: 2.0,
            persistence_write_deadline_s: 2.0,
            shutdown_deadline_s: 5.0,
        }
    }
}

impl CoreConfig {
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.update_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.safety_buffer_m, 10.0);
        assert_eq!(cfg.update_hz, 2.0);
        assert_eq!(cfg.max_drones, 10);
    }

    #[test]
    fn tick_interval_derives_from_update_hz() {
        let cfg = CoreConfig {
            update_hz: 4.0,
            ..Default::default()
        };
        assert_eq!(cfg.tick_interval(), std::time::Duration::from_millis(250));
    }
}
