//! Overtake trigger evaluation
//!
//! Gates run in a fixed order and the first one that holds blocks the
//! trigger with its own reason. The early long-range trigger skips the
//! stability debounce but still honours the cooldown.

use crate::cooldown::{cooldown_remaining_ms, dynamic_cooldown_ms};
use crate::reasons::{LaneWarning, TriggerBlock};
use crate::scoring::{self, DirectionDecision};
use overtake_model::{
    AutoControl, ControlState, Direction, LaneTopology, OvertakeConfig, OvertakeResult,
    TriggerKind, VehicleSnapshot,
};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// A trigger condition that currently holds, with the value that tripped it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TriggerCondition {
    pub kind: TriggerKind,
    pub value: f64,
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TriggerKind::EarlyOvertake => write!(f, "{} ({:.0}km/h)", self.kind, self.value),
            TriggerKind::MaxFollowTime => write!(f, "{} ({:.0}s)", self.kind, self.value),
            TriggerKind::SlowLead => write!(f, "{} ({:+.1}km/h)", self.kind, self.value),
            TriggerKind::ShortTimeGap => write!(f, "{} ({:.1}s)", self.kind, self.value),
            TriggerKind::LowCruiseRatio => {
                write!(f, "{} ({:.0}%)", self.kind, self.value * 100.0)
            }
        }
    }
}

/// Outcome of one trigger evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerDecision {
    /// Go ahead and score directions
    Fire {
        condition: TriggerCondition,
        /// Fired by the long-range trigger, debounce bypassed
        early: bool,
    },
    Blocked(TriggerBlock),
}

impl TriggerDecision {
    pub fn fired(&self) -> bool {
        matches!(self, TriggerDecision::Fire { .. })
    }
}

/// Decides whether an overtake should start and where to go
#[derive(Debug, Clone, Default)]
pub struct OvertakeDecisionEngine {
    config: OvertakeConfig,
}

impl OvertakeDecisionEngine {
    pub fn new(config: OvertakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OvertakeConfig {
        &self.config
    }

    /// Track external auto-control transitions. Releasing control opens a
    /// short cooldown, taking it clears one.
    pub fn update_auto_control(
        &self,
        snapshot: &VehicleSnapshot,
        state: &mut ControlState,
        now_ms: u64,
    ) {
        let previous = state.auto_control.level;
        let current = snapshot.auto_control;
        if previous == current {
            return;
        }

        if !previous.is_engaged() && current.is_engaged() {
            state.auto_control.cooldown_start_ms = None;
            info!("External auto control engaged (level {})", current.level());
        } else if previous.is_engaged() && !current.is_engaged() {
            state.auto_control.cooldown_start_ms = Some(now_ms);
            info!(
                "External auto control released, pausing overtakes for {}ms",
                self.config.cooldown.auto_control_ms
            );
        }
        state.auto_control.level = current;
    }

    /// Time left on the post-auto-control cooldown (ms)
    pub fn auto_control_cooldown_remaining(&self, state: &ControlState, now_ms: u64) -> u64 {
        state.auto_control.cooldown_start_ms.map_or(0, |start| {
            self.config
                .cooldown
                .auto_control_ms
                .saturating_sub(now_ms.saturating_sub(start))
        })
    }

    fn is_following(&self, snapshot: &VehicleSnapshot) -> bool {
        if !snapshot.lead.is_present() {
            return false;
        }
        let triggers = &self.config.triggers;
        let gap = snapshot.time_gap();
        snapshot.lead.relative_speed < triggers.lead_relative_speed
            || (gap > 0.0 && gap <= triggers.follow_time_gap)
            || snapshot.speed_ratio() < triggers.cruise_speed_ratio
    }

    /// Update the continuous-following timer, returns whether following
    pub fn update_following(
        &self,
        snapshot: &VehicleSnapshot,
        state: &mut ControlState,
        now_ms: u64,
    ) -> bool {
        if !self.is_following(snapshot) {
            if state.follow.is_following() {
                debug!(
                    "Stopped following after {}ms",
                    state.follow.duration_ms(now_ms)
                );
            }
            state.follow.reset();
            return false;
        }

        if state.follow.since_ms.is_none() {
            state.follow.since_ms = Some(now_ms);
            debug!("Started following lead at {:.1}m", snapshot.lead.distance);
        }

        if !state.follow.max_follow_reached
            && state.follow.duration_ms(now_ms) >= self.config.triggers.max_follow_time_ms
        {
            state.follow.max_follow_reached = true;
            info!(
                "Max follow time reached ({}ms)",
                self.config.triggers.max_follow_time_ms
            );
        }
        true
    }

    /// Long-range trigger: a much slower lead still far enough ahead
    fn early_condition(&self, snapshot: &VehicleSnapshot) -> Option<TriggerCondition> {
        if !snapshot.road_type.is_highway() {
            return None;
        }
        let lead = &snapshot.lead;
        let early = &self.config.triggers.early;
        if !lead.is_present() || snapshot.v_ego <= 0.0 || lead.speed <= 0.0 || snapshot.v_cruise <= 0.0
        {
            return None;
        }
        if lead.speed < self.config.lead_min_speed(snapshot.road_type) {
            return None;
        }

        let ratio = lead.speed / snapshot.v_ego;
        let diff = snapshot.v_ego - lead.speed;
        let in_range = lead.distance >= early.min_distance && lead.distance <= early.max_distance;
        if ratio <= early.speed_ratio
            && lead.speed >= early.min_lead_speed
            && diff >= early.min_speed_diff
            && in_range
        {
            Some(TriggerCondition {
                kind: TriggerKind::EarlyOvertake,
                value: lead.speed,
            })
        } else {
            None
        }
    }

    /// Ordinary trigger conditions, highest priority first
    pub fn conditions(
        &self,
        snapshot: &VehicleSnapshot,
        state: &ControlState,
        now_ms: u64,
    ) -> Vec<TriggerCondition> {
        let triggers = &self.config.triggers;
        let mut conditions = Vec::new();

        if state.follow.max_follow_reached {
            conditions.push(TriggerCondition {
                kind: TriggerKind::MaxFollowTime,
                value: state.follow.duration_ms(now_ms) as f64 / 1000.0,
            });
        }
        if snapshot.lead.is_present() && snapshot.lead.relative_speed < triggers.lead_relative_speed {
            conditions.push(TriggerCondition {
                kind: TriggerKind::SlowLead,
                value: snapshot.lead.relative_speed,
            });
        }
        let gap = snapshot.time_gap();
        if gap > 0.0 && gap <= triggers.follow_time_gap {
            conditions.push(TriggerCondition {
                kind: TriggerKind::ShortTimeGap,
                value: gap,
            });
        }
        let ratio = snapshot.speed_ratio();
        if ratio < triggers.cruise_speed_ratio {
            conditions.push(TriggerCondition {
                kind: TriggerKind::LowCruiseRatio,
                value: ratio,
            });
        }
        conditions
    }

    fn block(&self, state: &mut ControlState, block: TriggerBlock, cooldown_left: u64) -> TriggerDecision {
        if cooldown_left == 0 {
            state.cooldown.last_result = OvertakeResult::Condition;
        }
        TriggerDecision::Blocked(block)
    }

    /// Decide whether an overtake should start this tick
    pub fn evaluate_trigger(
        &self,
        snapshot: &VehicleSnapshot,
        state: &mut ControlState,
        now_ms: u64,
    ) -> TriggerDecision {
        let road = snapshot.road_type;
        if !self.config.auto_overtake_enabled(road) {
            return TriggerDecision::Blocked(TriggerBlock::Disabled { road });
        }
        match snapshot.auto_control {
            AutoControl::Active => return TriggerDecision::Blocked(TriggerBlock::AutoControlActive),
            AutoControl::Tunnel => return TriggerDecision::Blocked(TriggerBlock::Tunnel),
            AutoControl::Off => {}
        }
        let auto_left = self.auto_control_cooldown_remaining(state, now_ms);
        if auto_left > 0 {
            return TriggerDecision::Blocked(TriggerBlock::AutoControlCooldown {
                remaining_ms: auto_left,
            });
        }
        if !snapshot.onroad {
            return TriggerDecision::Blocked(TriggerBlock::NotOnroad);
        }
        if !snapshot.engaged {
            return TriggerDecision::Blocked(TriggerBlock::NotEngaged);
        }

        state.cooldown.dynamic_cooldown_ms = dynamic_cooldown_ms(&self.config, &state.cooldown, road);
        let cooldown_left = cooldown_remaining_ms(&self.config, &state.cooldown, road, now_ms);

        if let Some(condition) = self.early_condition(snapshot) {
            if cooldown_left > 0 {
                return TriggerDecision::Blocked(TriggerBlock::Cooldown {
                    remaining_ms: cooldown_left,
                    last_result: state.cooldown.last_result,
                });
            }
            state.trigger_debounce.reset();
            info!("Early overtake trigger: {}", condition);
            return TriggerDecision::Fire {
                condition,
                early: true,
            };
        }

        let lead_min = self.config.lead_min_speed(road);
        if snapshot.lead.is_present() && snapshot.lead.speed < lead_min {
            return self.block(
                state,
                TriggerBlock::LeadTooSlow {
                    speed: snapshot.lead.speed,
                    min: lead_min,
                },
                cooldown_left,
            );
        }
        if !snapshot.lead.is_present() {
            state.trigger_debounce.reset();
            return self.block(state, TriggerBlock::NoLead, cooldown_left);
        }
        let ratio = snapshot.speed_ratio();
        if ratio >= self.config.triggers.cruise_reached_ratio {
            state.trigger_debounce.reset();
            return self.block(state, TriggerBlock::CruiseReached { ratio }, cooldown_left);
        }
        let ego_min = self.config.min_ego_speed(road);
        if snapshot.v_ego < ego_min {
            return self.block(
                state,
                TriggerBlock::EgoTooSlow {
                    speed: snapshot.v_ego,
                    min: ego_min,
                },
                cooldown_left,
            );
        }

        let quick = state.trigger_debounce.quick_trigger_active(now_ms);
        if cooldown_left > 0 && !quick {
            return TriggerDecision::Blocked(TriggerBlock::Cooldown {
                remaining_ms: cooldown_left,
                last_result: state.cooldown.last_result,
            });
        }

        let condition = self.conditions(snapshot, state, now_ms).into_iter().next();
        let stable = state
            .trigger_debounce
            .observe(condition.as_ref().map(|c| &c.kind), now_ms);

        match condition {
            Some(condition) if stable || quick => {
                debug!("Overtake trigger: {} (quick={})", condition, quick);
                TriggerDecision::Fire {
                    condition,
                    early: false,
                }
            }
            Some(condition) => TriggerDecision::Blocked(TriggerBlock::AwaitingStability {
                kind: condition.kind,
                remaining_ms: state.trigger_debounce.remaining_ms(now_ms),
                count: state.trigger_debounce.met_count(),
            }),
            None => self.block(state, TriggerBlock::NoCondition, cooldown_left),
        }
    }

    /// First hazard found in the lane on `direction`, for display
    pub fn lane_warning(&self, snapshot: &VehicleSnapshot, direction: Direction) -> Option<LaneWarning> {
        let side = snapshot.side(direction);
        let safety = &self.config.lane_safety;
        if side.lane_width < safety.min_lane_width {
            Some(LaneWarning::NarrowLane)
        } else if side.is_blocked() {
            Some(LaneWarning::BlindSpot)
        } else if side.lead.distance > 0.0 && side.lead.distance < safety.side_lead_distance_min {
            Some(LaneWarning::SideLeadTooClose)
        } else if side.lead.relative_speed.abs() > safety.side_relative_speed_threshold {
            Some(LaneWarning::SideSpeedTooHigh)
        } else {
            None
        }
    }

    /// Score the available directions and pick one, if any
    pub fn select_direction(&self, snapshot: &VehicleSnapshot, topology: &LaneTopology) -> DirectionDecision {
        scoring::select_direction(&self.config, snapshot, topology)
    }
}
