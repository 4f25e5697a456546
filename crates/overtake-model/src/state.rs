//! Control state threaded through every tick

use crate::debounce::{DebounceSettings, Debouncer};
use crate::snapshot::{AutoControl, Direction};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Status label shown while nothing is happening
pub const STATUS_READY: &str = "ready";
/// Reason shown while nothing is happening
pub const REASON_IDLE: &str = "waiting for overtake conditions";

/// Lane layout as confirmed by verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneTopology {
    /// Number of lanes (2..=5)
    pub lane_count: u8,
    /// Confirmed lane, 1 = leftmost, 0 until the first estimate
    pub current_lane: u8,
}

impl Default for LaneTopology {
    fn default() -> Self {
        Self {
            lane_count: 3,
            current_lane: 0,
        }
    }
}

impl LaneTopology {
    pub fn is_known(&self) -> bool {
        self.current_lane > 0
    }

    pub fn is_leftmost(&self) -> bool {
        self.current_lane <= 1
    }

    pub fn is_rightmost(&self) -> bool {
        self.current_lane >= self.lane_count
    }

    /// Whether a neighbouring lane exists in `direction`
    pub fn has_lane(&self, direction: Direction) -> bool {
        self.is_known()
            && match direction {
                Direction::Left => !self.is_leftmost(),
                Direction::Right => !self.is_rightmost(),
            }
    }
}

/// Outcome that feeds the next cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OvertakeResult {
    #[default]
    None,
    Success,
    Failed,
    Condition,
}

/// Cooldown bookkeeping
#[derive(Debug, Clone, Default, Serialize)]
pub struct CooldownState {
    /// Time of the last completed or failed manoeuvre (ms), 0 = never
    pub last_maneuver_ms: u64,
    pub last_result: OvertakeResult,
    pub consecutive_failures: u32,
    /// Cooldown computed on the last evaluation (ms)
    pub dynamic_cooldown_ms: u64,
}

impl CooldownState {
    pub fn record_success(&mut self, now_ms: u64) {
        self.last_maneuver_ms = now_ms;
        self.last_result = OvertakeResult::Success;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, now_ms: u64) {
        self.last_maneuver_ms = now_ms;
        self.last_result = OvertakeResult::Failed;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Forget the last manoeuvre entirely
    pub fn clear(&mut self) {
        self.last_maneuver_ms = 0;
        self.last_result = OvertakeResult::None;
        self.consecutive_failures = 0;
    }
}

/// Continuous-following timer
#[derive(Debug, Clone, Default, Serialize)]
pub struct FollowState {
    pub since_ms: Option<u64>,
    pub max_follow_reached: bool,
}

impl FollowState {
    pub fn is_following(&self) -> bool {
        self.since_ms.is_some()
    }

    pub fn duration_ms(&self, now_ms: u64) -> u64 {
        self.since_ms.map_or(0, |since| now_ms.saturating_sub(since))
    }

    pub fn reset(&mut self) {
        self.since_ms = None;
        self.max_follow_reached = false;
    }
}

/// Remembered lane at the start of an excursion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LaneMemory {
    pub original_lane: u8,
    pub started_ms: u64,
}

impl LaneMemory {
    pub fn expired(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.started_ms) > timeout_ms
    }

    pub fn remaining_ms(&self, now_ms: u64, timeout_ms: u64) -> u64 {
        timeout_ms.saturating_sub(now_ms.saturating_sub(self.started_ms))
    }
}

/// The vehicle being overtaken, tracked to time the return
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetVehicleTracker {
    pub side: Direction,
    pub initial_distance: f64,
    pub initial_speed: f64,
    pub last_seen_distance: f64,
    pub last_seen_ms: u64,
    pub tracking_start_ms: u64,
    /// Start of the current uninterrupted speed advantage over the target
    pub advantage_since_ms: Option<u64>,
    /// Latest observed speed (km/h)
    pub speed: f64,
}

/// External auto-control bookkeeping
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AutoControlState {
    pub level: AutoControl,
    /// Set when the external controller released the car
    pub cooldown_start_ms: Option<u64>,
}

/// Ordinary trigger kinds, in evaluation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    EarlyOvertake,
    MaxFollowTime,
    SlowLead,
    ShortTimeGap,
    LowCruiseRatio,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerKind::EarlyOvertake => "lead far too slow",
            TriggerKind::MaxFollowTime => "max follow time",
            TriggerKind::SlowLead => "slow lead",
            TriggerKind::ShortTimeGap => "short time gap",
            TriggerKind::LowCruiseRatio => "below cruise speed",
        };
        f.write_str(name)
    }
}

/// Who asked for a lane change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverKind {
    Overtake,
    Return,
    Manual,
}

/// A commanded lane change awaiting completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Maneuver {
    pub kind: ManeuverKind,
    pub direction: Direction,
    /// Completed-lane-change count when the command went out
    pub start_count: u32,
    pub command_ms: u64,
}

/// How a manoeuvre ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverOutcome {
    Completed(ManeuverKind),
    TimedOut(ManeuverKind),
    Cancelled,
}

/// Manoeuvre state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverPhase {
    #[default]
    Idle,
    InProgress(Maneuver),
    /// Display hold after a manoeuvre ended
    Settling {
        outcome: ManeuverOutcome,
        since_ms: u64,
    },
}

/// Human-facing status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusText {
    pub status: String,
    pub reason: String,
    /// Last status transition (ms)
    pub updated_ms: u64,
}

impl Default for StatusText {
    fn default() -> Self {
        Self {
            status: STATUS_READY.to_string(),
            reason: REASON_IDLE.to_string(),
            updated_ms: 0,
        }
    }
}

/// Process-wide decision state
#[derive(Debug, Clone, Default)]
pub struct ControlState {
    pub phase: ManeuverPhase,
    pub topology: LaneTopology,
    /// Lane changes the driving model reported as finished
    pub lane_change_count: u32,
    pub overtakes_requested: u32,
    pub overtakes_completed: u32,
    pub returns_completed: u32,
    /// Signed: positive means the car sits left of its original lane
    pub net_lane_changes: i32,
    pub is_auto_overtake: bool,
    pub return_attempts: u32,
    /// Last automatic overtake command (ms), 0 = none this excursion
    pub last_auto_overtake_ms: u64,
    pub lane_memory: Option<LaneMemory>,
    pub cooldown: CooldownState,
    pub follow: FollowState,
    pub trigger_debounce: Debouncer<TriggerKind>,
    pub auto_control: AutoControlState,
    pub target_vehicle: Option<TargetVehicleTracker>,
    /// Start of the post-overtake confirmation hold
    pub overtake_complete_timer: Option<u64>,
    pub status: StatusText,
}

impl ControlState {
    pub fn new(debounce: DebounceSettings) -> Self {
        Self {
            trigger_debounce: Debouncer::new(debounce),
            ..Default::default()
        }
    }

    pub fn active_maneuver(&self) -> Option<&Maneuver> {
        match &self.phase {
            ManeuverPhase::InProgress(maneuver) => Some(maneuver),
            _ => None,
        }
    }

    /// An automatic overtake or return is under way
    pub fn is_overtaking(&self) -> bool {
        matches!(
            self.active_maneuver(),
            Some(Maneuver {
                kind: ManeuverKind::Overtake | ManeuverKind::Return,
                ..
            })
        )
    }

    pub fn lane_change_in_progress(&self) -> bool {
        self.active_maneuver().is_some()
    }

    /// Update the status label and record the transition time
    pub fn set_status(&mut self, status: impl Into<String>, reason: impl Into<String>, now_ms: u64) {
        self.status.status = status.into();
        self.status.reason = reason.into();
        self.status.updated_ms = now_ms;
    }

    /// Replace the reason text without counting as a transition
    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.status.reason = reason.into();
    }

    /// Start remembering the current lane, once per excursion
    pub fn start_lane_memory(&mut self, now_ms: u64) {
        if self.lane_memory.is_none() && self.topology.is_known() {
            self.lane_memory = Some(LaneMemory {
                original_lane: self.topology.current_lane,
                started_ms: now_ms,
            });
            info!("Lane memory started: original lane {}", self.topology.current_lane);
        }
    }

    /// Clear the excursion: net counter, lane memory, return bookkeeping
    /// and any active manoeuvre. Lifetime counters and cooldown survive.
    pub fn reset_net_lane_changes(&mut self) {
        self.net_lane_changes = 0;
        self.return_attempts = 0;
        self.last_auto_overtake_ms = 0;
        self.is_auto_overtake = false;
        self.lane_memory = None;
        self.target_vehicle = None;
        self.overtake_complete_timer = None;
        self.phase = ManeuverPhase::Idle;
        self.status.status = STATUS_READY.to_string();
        self.status.reason = REASON_IDLE.to_string();
    }
}
