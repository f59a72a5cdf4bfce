//! Strategy lifecycle phases

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of lifecycle states; invalid phases are unrepresentable.
/// `Halted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    ActiveMonitoring,
    RebalancingRequired,
    WaitingForStability,
    Halted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initializing => "initializing",
            Phase::ActiveMonitoring => "active_monitoring",
            Phase::RebalancingRequired => "rebalancing_required",
            Phase::WaitingForStability => "waiting_for_stability",
            Phase::Halted => "halted",
        };
        f.write_str(name)
    }
}
