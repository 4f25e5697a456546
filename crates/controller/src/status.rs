//! Read-only status surface

use overtake_decision::{LaneWarning, NoOvertakeReason};
use overtake_model::{LaneTopology, ManeuverPhase, OvertakeResult, RoadType};
use serde::Serialize;

/// Hazards in the neighbouring lanes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LaneWarnings {
    pub left: Option<LaneWarning>,
    pub right: Option<LaneWarning>,
}

/// Snapshot of the decision layer for display and monitoring
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: String,
    pub reason: String,
    pub phase: ManeuverPhase,
    pub road_type: RoadType,
    pub topology: LaneTopology,
    /// Trigger conditions holding on the last evaluation
    pub trigger_conditions: Vec<String>,
    /// Why the last triggered evaluation did not overtake
    pub no_overtake_reasons: Vec<NoOvertakeReason>,
    /// Pending return state, when a return is being considered
    pub return_status: Option<String>,
    pub lane_warnings: LaneWarnings,
    pub cooldown_remaining_s: f64,
    pub return_timeout_remaining_s: f64,
    pub auto_control_cooldown_s: f64,
    pub last_result: OvertakeResult,
    pub consecutive_failures: u32,
    pub net_lane_changes: i32,
    pub original_lane: Option<u8>,
    pub return_attempts: u32,
    pub lane_change_count: u32,
    pub overtakes_requested: u32,
    pub overtakes_completed: u32,
    pub returns_completed: u32,
    pub verification_confidence: u8,
    /// Index of the last command issued
    pub last_command_index: u64,
}

impl StatusReport {
    /// Whether an automatic excursion is open
    pub fn in_excursion(&self) -> bool {
        self.net_lane_changes != 0 || self.original_lane.is_some()
    }
}
