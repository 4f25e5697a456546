//! Overtake configuration

use crate::debounce::DebounceSettings;
use crate::error::ModelError;
use crate::snapshot::RoadType;
use serde::{Deserialize, Serialize};

/// How the lane count is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneCountMode {
    /// Estimated from road-edge geometry
    #[default]
    Auto,
    /// Fixed to `manual_lane_count`
    Manual,
}

/// Speed floors per road type (km/h)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedLimits {
    /// Slowest lead still worth overtaking on a highway
    pub highway_lead_min: f64,
    /// Slowest lead still worth overtaking on a normal road
    pub normal_lead_min: f64,
    /// Minimum ego speed for any highway manoeuvre
    pub highway_min: f64,
    /// Minimum ego speed for any normal-road manoeuvre
    pub normal_min: f64,
}

impl Default for SpeedLimits {
    fn default() -> Self {
        Self {
            highway_lead_min: 35.0,
            normal_lead_min: 20.0,
            highway_min: 75.0,
            normal_min: 40.0,
        }
    }
}

/// Long-range trigger for a markedly slow lead
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyTrigger {
    pub speed_ratio: f64,
    pub min_lead_speed: f64,
    pub min_distance: f64,
    pub max_distance: f64,
    pub min_speed_diff: f64,
}

impl Default for EarlyTrigger {
    fn default() -> Self {
        Self {
            speed_ratio: 0.6,
            min_lead_speed: 50.0,
            min_distance: 30.0,
            max_distance: 100.0,
            min_speed_diff: 20.0,
        }
    }
}

/// Thresholds for the ordinary triggers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerThresholds {
    /// Ego/cruise ratio below which the car is considered held up
    pub cruise_speed_ratio: f64,
    /// Following time gap (s)
    pub follow_time_gap: f64,
    /// Continuous following ceiling (ms)
    pub max_follow_time_ms: u64,
    /// Lead relative speed (km/h, negative)
    pub lead_relative_speed: f64,
    /// Ego/cruise ratio at which no overtake is needed
    pub cruise_reached_ratio: f64,
    pub early: EarlyTrigger,
}

impl Default for TriggerThresholds {
    fn default() -> Self {
        Self {
            cruise_speed_ratio: 0.8,
            follow_time_gap: 2.0,
            max_follow_time_ms: 600_000,
            lead_relative_speed: -15.0,
            cruise_reached_ratio: 0.95,
            early: EarlyTrigger::default(),
        }
    }
}

/// Neighbouring-lane safety limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneSafety {
    pub min_lane_width: f64,
    pub safe_lane_width: f64,
    pub side_lead_distance_min: f64,
    pub side_relative_speed_threshold: f64,
}

impl Default for LaneSafety {
    fn default() -> Self {
        Self {
            min_lane_width: 2.3,
            safe_lane_width: 2.8,
            side_lead_distance_min: 25.0,
            side_relative_speed_threshold: 25.0,
        }
    }
}

/// Curve abort limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveLimits {
    pub curvature_threshold: f64,
    /// Steering angle (deg)
    pub steering_threshold: f64,
    /// Planner max-curve value treated as a curve
    pub max_curve: f64,
}

impl Default for CurveLimits {
    fn default() -> Self {
        Self {
            curvature_threshold: 0.02,
            steering_threshold: 10.0,
            max_curve: 1.0,
        }
    }
}

/// Cooldown timings (ms)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownTimings {
    pub base_ms: u64,
    pub failed_ms: u64,
    pub success_ms: u64,
    pub condition_ms: u64,
    /// Extra per consecutive failure beyond three
    pub failure_step_ms: u64,
    /// Cap on the failure penalty
    pub max_failure_penalty_ms: u64,
    /// Highway cooldown never drops below this
    pub highway_floor_ms: u64,
    /// Pause after the external auto-control releases the car
    pub auto_control_ms: u64,
}

impl Default for CooldownTimings {
    fn default() -> Self {
        Self {
            base_ms: 8000,
            failed_ms: 3000,
            success_ms: 15_000,
            condition_ms: 5000,
            failure_step_ms: 2000,
            max_failure_penalty_ms: 10_000,
            highway_floor_ms: 5000,
            auto_control_ms: 3000,
        }
    }
}

/// Weights of the direction safety penalty terms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyWeights {
    pub lead_relative_speed: f64,
    pub side_lead_distance: f64,
    pub side_relative_speed: f64,
    pub lane_width: f64,
    pub blindspot: f64,
    pub curvature: f64,
    pub min_speed_advantage: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            lead_relative_speed: 2.0,
            side_lead_distance: 1.5,
            side_relative_speed: 1.8,
            lane_width: 1.2,
            blindspot: 3.0,
            curvature: 1.5,
            min_speed_advantage: 5.0,
        }
    }
}

/// Highway lane-position preferences
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighwayStrategy {
    /// Bonus for leaving the rightmost lane to the left
    pub fast_lane_bonus: f64,
    /// Penalty for moving right out of the leftmost lane
    pub slow_lane_penalty: f64,
    /// Final speed advantage required for the chosen lane (km/h)
    pub min_advantage_threshold: f64,
}

impl Default for HighwayStrategy {
    fn default() -> Self {
        Self {
            fast_lane_bonus: 15.0,
            slow_lane_penalty: 10.0,
            min_advantage_threshold: 3.0,
        }
    }
}

/// Return-to-lane policy for one road type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnPolicy {
    pub enabled: bool,
    /// Lane memory lifetime (ms)
    pub timeout_ms: u64,
    pub max_attempts: u32,
    /// Hold after the target is overtaken (ms)
    pub confirm_hold_ms: u64,
    /// Required speed gain of the return lane (km/h)
    pub min_advantage: f64,
}

impl Default for ReturnPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 30_000,
            max_attempts: 2,
            confirm_hold_ms: 5000,
            min_advantage: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnPolicies {
    pub highway: ReturnPolicy,
    pub normal: ReturnPolicy,
}

impl Default for ReturnPolicies {
    fn default() -> Self {
        Self {
            highway: ReturnPolicy::default(),
            normal: ReturnPolicy {
                enabled: false,
                ..Default::default()
            },
        }
    }
}

/// Tick and display timings (ms)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub tick_interval_ms: u64,
    /// Deadline for a commanded lane change to complete
    pub maneuver_timeout_ms: u64,
    /// Display hold after completion or timeout
    pub completion_hold_ms: u64,
    /// Idle time before the status reverts to ready
    pub status_idle_ms: u64,
    /// Lane count recompute period
    pub lane_count_interval_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            maneuver_timeout_ms: 15_000,
            completion_hold_ms: 2000,
            status_idle_ms: 5000,
            lane_count_interval_ms: 5000,
        }
    }
}

/// Complete overtake configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OvertakeConfig {
    /// Automatic overtaking on highways
    pub auto_overtake_highway: bool,
    /// Automatic overtaking on normal roads
    pub auto_overtake_normal: bool,
    /// Master switch for returning to the original lane
    pub should_return_to_lane: bool,
    pub lane_count_mode: LaneCountMode,
    pub manual_lane_count: u8,
    pub speed: SpeedLimits,
    pub triggers: TriggerThresholds,
    pub lane_safety: LaneSafety,
    pub curve: CurveLimits,
    pub cooldown: CooldownTimings,
    pub penalty_weights: PenaltyWeights,
    /// Combined score a direction must exceed
    pub penalty_threshold: f64,
    /// Speed advantage required of an occupied target lane (km/h)
    pub min_speed_advantage: f64,
    pub highway: HighwayStrategy,
    pub return_policy: ReturnPolicies,
    pub debounce: DebounceSettings,
    pub timings: Timings,
    /// Actuation endpoint address
    pub command_endpoint: String,
}

impl Default for OvertakeConfig {
    fn default() -> Self {
        Self {
            auto_overtake_highway: true,
            auto_overtake_normal: false,
            should_return_to_lane: true,
            lane_count_mode: LaneCountMode::Auto,
            manual_lane_count: 3,
            speed: SpeedLimits::default(),
            triggers: TriggerThresholds::default(),
            lane_safety: LaneSafety::default(),
            curve: CurveLimits::default(),
            cooldown: CooldownTimings::default(),
            penalty_weights: PenaltyWeights::default(),
            penalty_threshold: 60.0,
            min_speed_advantage: 5.0,
            highway: HighwayStrategy::default(),
            return_policy: ReturnPolicies::default(),
            debounce: DebounceSettings::default(),
            timings: Timings::default(),
            command_endpoint: "127.0.0.1:4211".to_string(),
        }
    }
}

impl OvertakeConfig {
    /// Whether automatic overtaking runs on this road type
    pub fn auto_overtake_enabled(&self, road: RoadType) -> bool {
        match road {
            RoadType::Highway => self.auto_overtake_highway,
            RoadType::Normal => self.auto_overtake_normal,
        }
    }

    pub fn return_policy(&self, road: RoadType) -> &ReturnPolicy {
        match road {
            RoadType::Highway => &self.return_policy.highway,
            RoadType::Normal => &self.return_policy.normal,
        }
    }

    /// Master switch and road policy both allow returning
    pub fn return_enabled(&self, road: RoadType) -> bool {
        self.should_return_to_lane && self.return_policy(road).enabled
    }

    /// Minimum ego speed for manoeuvres on this road type
    pub fn min_ego_speed(&self, road: RoadType) -> f64 {
        match road {
            RoadType::Highway => self.speed.highway_min,
            RoadType::Normal => self.speed.normal_min,
        }
    }

    /// Minimum lead speed still worth overtaking on this road type
    pub fn lead_min_speed(&self, road: RoadType) -> f64 {
        match road {
            RoadType::Highway => self.speed.highway_lead_min,
            RoadType::Normal => self.speed.normal_lead_min,
        }
    }

    /// Reject settings that would make the decision layer incoherent
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.lane_safety.min_lane_width > self.lane_safety.safe_lane_width {
            return Err(ModelError::InvalidConfig(format!(
                "min_lane_width {} exceeds safe_lane_width {}",
                self.lane_safety.min_lane_width, self.lane_safety.safe_lane_width
            )));
        }
        if !(2..=5).contains(&self.manual_lane_count) {
            return Err(ModelError::InvalidConfig(format!(
                "manual_lane_count {} outside 2..=5",
                self.manual_lane_count
            )));
        }
        if self.timings.tick_interval_ms == 0 {
            return Err(ModelError::InvalidConfig("tick_interval_ms must be positive".into()));
        }
        let early = &self.triggers.early;
        if early.min_distance > early.max_distance {
            return Err(ModelError::InvalidConfig(format!(
                "early trigger distance window [{}, {}] is empty",
                early.min_distance, early.max_distance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OvertakeConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.return_enabled(RoadType::Highway));
        assert!(!config.return_enabled(RoadType::Normal));
        assert_eq!(config.min_ego_speed(RoadType::Highway), 75.0);
        assert_eq!(config.lead_min_speed(RoadType::Normal), 20.0);
    }

    #[test]
    fn test_unknown_keys_and_partial_tables() {
        let config: OvertakeConfig = serde_json::from_str(
            r#"{"penalty_threshold": 50, "cooldown": {"success_ms": 20000}, "legacy_key": 1}"#,
        )
        .unwrap();
        assert_eq!(config.penalty_threshold, 50.0);
        assert_eq!(config.cooldown.success_ms, 20_000);
        assert_eq!(config.cooldown.failed_ms, 3000);
        assert!(config.auto_overtake_highway);
    }

    #[test]
    fn test_master_switch_disables_return() {
        let config = OvertakeConfig {
            should_return_to_lane: false,
            ..Default::default()
        };
        assert!(!config.return_enabled(RoadType::Highway));
    }

    #[test]
    fn test_validate_rejects_inverted_widths() {
        let mut config = OvertakeConfig::default();
        config.lane_safety.min_lane_width = 3.0;
        assert!(config.validate().is_err());
    }
}
