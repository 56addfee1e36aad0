//! Scenario identifiers: literal encodings of the coordination core's
//! end-to-end acceptance scenarios S1-S6, plus a couple of supplemental
//! chaos scenarios exercising the same machinery at higher density.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// S1 — head-on rejection: two reciprocal plans over the same window
    /// must collide, and the second schedule is rejected with one PLANNED
    /// conflict at ~0 m separation.
    HeadOnRejection,

    /// S2 — safe parallel: two plans far enough apart laterally (~111 m vs.
    /// a 10 m buffer) are both accepted with zero conflicts.
    SafeParallel,

    /// S3 — vehicle exclusivity: the same vehicle cannot hold two
    /// overlapping missions, independent of spatial separation.
    VehicleExclusivity,

    /// S4 — live alert edge-trigger: two vehicles close for 7 s then clear;
    /// expect exactly an initial alert and one reminder, then a clear.
    LiveAlertEdgeTrigger,

    /// S5 — late conflict: a newly scheduled mission's second-pass
    /// deconfliction against live telemetry fails it before dispatch.
    LateConflict,

    /// S6 — subscriber coalescing: a slow subscriber draining at 1 Hz over a
    /// 5 s/10-tick broadcaster run sees a handful of strictly-increasing
    /// snapshots, never a stale one.
    SubscriberCoalescing,

    /// Supplemental: several pairs converging and clearing at once, stress
    /// testing the live monitor's per-pair dedup table under load.
    ChaosMultiPairReminders,

    /// Supplemental: a denser fleet with staggered overlapping missions,
    /// exercising the registry/admission lock under contention.
    ChaosDenseSwarm,
}

impl ScenarioId {
    pub fn name(self) -> &'static str {
        match self {
            ScenarioId::HeadOnRejection => "head_on_rejection",
            ScenarioId::SafeParallel => "safe_parallel",
            ScenarioId::VehicleExclusivity => "vehicle_exclusivity",
            ScenarioId::LiveAlertEdgeTrigger => "live_alert_edge_trigger",
            ScenarioId::LateConflict => "late_conflict",
            ScenarioId::SubscriberCoalescing => "subscriber_coalescing",
            ScenarioId::ChaosMultiPairReminders => "chaos_multi_pair_reminders",
            ScenarioId::ChaosDenseSwarm => "chaos_dense_swarm",
        }
    }

    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::HeadOnRejection,
            ScenarioId::SafeParallel,
            ScenarioId::VehicleExclusivity,
            ScenarioId::LiveAlertEdgeTrigger,
            ScenarioId::LateConflict,
            ScenarioId::SubscriberCoalescing,
            ScenarioId::ChaosMultiPairReminders,
            ScenarioId::ChaosDenseSwarm,
        ]
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioId::all()
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| format!("unknown scenario '{s}'"))
    }
}
