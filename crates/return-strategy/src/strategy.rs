//! Return-to-lane evaluation

use overtake_model::{
    AutoControl, ControlState, Direction, LaneMemory, OvertakeConfig, SideObservation,
    TargetVehicleTracker, VehicleSnapshot,
};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Side vehicle closer than this becomes the overtake target (m)
const TARGET_ACQUIRE_DISTANCE: f64 = 80.0;
/// Target is dropped beyond this distance (m)
const TARGET_KEEP_DISTANCE: f64 = 100.0;
/// A candidate this much closer than the anchor replaces it (m)
const TARGET_REANCHOR_MARGIN: f64 = 10.0;
/// Side vehicle beyond this distance counts as passed (m)
const OVERTAKEN_DISTANCE: f64 = 50.0;
/// Growth in gap since last seen that counts as passed (m)
const OVERTAKEN_GAP_GROWTH: f64 = 20.0;
/// Ego speed advantage over the target (km/h)
const ADVANTAGE_SPEED: f64 = 10.0;
/// How long the advantage must hold (ms)
const ADVANTAGE_HOLD_MS: u64 = 8000;
/// Below this speed the car is always stable enough (km/h)
const STABLE_SPEED: f64 = 60.0;
const MAX_STEERING_DEG: f64 = 10.0;
const MAX_LAT_ACCEL: f64 = 0.5;

/// Where to go and how many lane changes it takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReturnPlan {
    pub direction: Direction,
    pub required_changes: u32,
}

/// Why no return is pending at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnBlock {
    Disabled,
    MemoryExpired,
    EgoTooSlow,
    NotOnroad,
    NotEngaged,
    AutoControl,
    NoExcursion,
    NotAutoOvertake,
    AttemptsExhausted,
    Overtaking,
    LaneUnavailable(Direction),
}

impl fmt::Display for ReturnBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnBlock::Disabled => f.write_str("return disabled for this road"),
            ReturnBlock::MemoryExpired => f.write_str("lane memory expired"),
            ReturnBlock::EgoTooSlow => f.write_str("speed too low to return"),
            ReturnBlock::NotOnroad => f.write_str("vehicle not on road"),
            ReturnBlock::NotEngaged => f.write_str("cruise not engaged"),
            ReturnBlock::AutoControl => f.write_str("external auto control active"),
            ReturnBlock::NoExcursion => f.write_str("already in original lane"),
            ReturnBlock::NotAutoOvertake => f.write_str("last lane change was not an automatic overtake"),
            ReturnBlock::AttemptsExhausted => f.write_str("return attempts exhausted"),
            ReturnBlock::Overtaking => f.write_str("overtake in progress"),
            ReturnBlock::LaneUnavailable(direction) => write!(f, "no lane to the {}", direction),
        }
    }
}

/// Why a pending return is not ready yet
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "wait", rename_all = "snake_case")]
pub enum ReturnWait {
    NotOvertaken,
    ConfirmHold { remaining_ms: u64 },
    Inefficient { advantage: f64 },
    Unsafe,
    Unstable,
}

impl fmt::Display for ReturnWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnWait::NotOvertaken => f.write_str("overtaken vehicle still alongside"),
            ReturnWait::ConfirmHold { remaining_ms } => write!(
                f,
                "confirming overtake complete, {:.1}s",
                *remaining_ms as f64 / 1000.0
            ),
            ReturnWait::Inefficient { advantage } => {
                write!(f, "return gains too little ({:+.1}km/h)", advantage)
            }
            ReturnWait::Unsafe => f.write_str("target lane not safe"),
            ReturnWait::Unstable => f.write_str("vehicle not stable"),
        }
    }
}

/// Return evaluation result
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnDecision {
    NotApplicable(ReturnBlock),
    Waiting(ReturnWait),
    Ready(ReturnPlan),
}

impl ReturnDecision {
    pub fn is_pending(&self) -> bool {
        !matches!(self, ReturnDecision::NotApplicable(_))
    }
}

/// Decides when to return to the remembered lane
#[derive(Debug, Clone, Default)]
pub struct ReturnStrategy {
    config: OvertakeConfig,
}

impl ReturnStrategy {
    pub fn new(config: OvertakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OvertakeConfig {
        &self.config
    }

    /// Direction and lane count back to the original lane
    pub fn plan(state: &ControlState) -> Option<ReturnPlan> {
        if let Some(memory) = state.lane_memory {
            if state.topology.is_known() {
                let current = state.topology.current_lane;
                let direction = Direction::between(current, memory.original_lane)?;
                return Some(ReturnPlan {
                    direction,
                    required_changes: u32::from(current.abs_diff(memory.original_lane)),
                });
            }
        }
        match state.net_lane_changes {
            0 => None,
            net => Some(ReturnPlan {
                direction: if net > 0 { Direction::Right } else { Direction::Left },
                required_changes: net.unsigned_abs(),
            }),
        }
    }

    /// Rebuild lane memory from the net counter when it was lost
    fn reconstruct_memory(state: &mut ControlState, now_ms: u64) {
        if state.lane_memory.is_some() || state.net_lane_changes == 0 || !state.topology.is_known() {
            return;
        }
        let original = i32::from(state.topology.current_lane) + state.net_lane_changes;
        let original = original.clamp(1, i32::from(state.topology.lane_count)) as u8;
        state.lane_memory = Some(LaneMemory {
            original_lane: original,
            started_ms: now_ms,
        });
        info!(
            "Lane memory reconstructed: original lane {} (net {})",
            original, state.net_lane_changes
        );
    }

    fn gate(&self, snapshot: &VehicleSnapshot, state: &mut ControlState, now_ms: u64) -> Result<ReturnPlan, ReturnBlock> {
        let road = snapshot.road_type;
        if !self.config.return_enabled(road) {
            return Err(ReturnBlock::Disabled);
        }
        let policy = self.config.return_policy(road);
        if state
            .lane_memory
            .is_some_and(|memory| memory.expired(now_ms, policy.timeout_ms))
        {
            return Err(ReturnBlock::MemoryExpired);
        }
        Self::reconstruct_memory(state, now_ms);

        if snapshot.v_ego < self.config.min_ego_speed(road) {
            return Err(ReturnBlock::EgoTooSlow);
        }
        if !snapshot.onroad {
            return Err(ReturnBlock::NotOnroad);
        }
        if !snapshot.engaged {
            return Err(ReturnBlock::NotEngaged);
        }
        if snapshot.auto_control == AutoControl::Active {
            return Err(ReturnBlock::AutoControl);
        }
        if state.net_lane_changes == 0 {
            return Err(ReturnBlock::NoExcursion);
        }
        if !state.is_auto_overtake {
            return Err(ReturnBlock::NotAutoOvertake);
        }
        if state.return_attempts >= policy.max_attempts {
            return Err(ReturnBlock::AttemptsExhausted);
        }
        if state.is_overtaking() {
            return Err(ReturnBlock::Overtaking);
        }

        let plan = Self::plan(state).ok_or(ReturnBlock::NoExcursion)?;
        let topology = &state.topology;
        let available = topology.is_known()
            && match plan.direction {
                Direction::Right => topology.current_lane < topology.lane_count,
                Direction::Left => topology.current_lane > 1,
            };
        if !available {
            return Err(ReturnBlock::LaneUnavailable(plan.direction));
        }
        Ok(plan)
    }

    /// Evaluate the return for this tick
    pub fn evaluate(&self, snapshot: &VehicleSnapshot, state: &mut ControlState, now_ms: u64) -> ReturnDecision {
        let plan = match self.gate(snapshot, state, now_ms) {
            Ok(plan) => plan,
            Err(block) => return ReturnDecision::NotApplicable(block),
        };

        let side = snapshot.side(plan.direction);
        let overtaken = Self::fully_overtaken(side, state.target_vehicle.as_ref(), snapshot.v_ego, now_ms);
        Self::update_target(plan.direction, side, snapshot.v_ego, state, now_ms);
        if !overtaken {
            state.overtake_complete_timer = None;
            return ReturnDecision::Waiting(ReturnWait::NotOvertaken);
        }

        let policy = self.config.return_policy(snapshot.road_type);
        let hold_start = *state.overtake_complete_timer.get_or_insert(now_ms);
        let held = now_ms.saturating_sub(hold_start);
        if held < policy.confirm_hold_ms {
            return ReturnDecision::Waiting(ReturnWait::ConfirmHold {
                remaining_ms: policy.confirm_hold_ms - held,
            });
        }

        let advantage = Self::speed_advantage(snapshot, side);
        let wait = if advantage < policy.min_advantage {
            Some(ReturnWait::Inefficient { advantage })
        } else if !Self::is_safe(side, snapshot.v_ego) {
            Some(ReturnWait::Unsafe)
        } else if !Self::is_stable(snapshot) {
            Some(ReturnWait::Unstable)
        } else {
            None
        };
        if let Some(wait) = wait {
            debug!("Return held back: {}", wait);
            state.overtake_complete_timer = Some(now_ms);
            return ReturnDecision::Waiting(wait);
        }

        info!(
            "Return ready: {} x{} (advantage {:+.1}km/h)",
            plan.direction, plan.required_changes, advantage
        );
        ReturnDecision::Ready(plan)
    }

    fn fully_overtaken(
        side: &SideObservation,
        tracker: Option<&TargetVehicleTracker>,
        v_ego: f64,
        now_ms: u64,
    ) -> bool {
        let distance = side.lead.distance;
        if distance <= 0.0 || distance > OVERTAKEN_DISTANCE {
            return true;
        }
        let Some(tracker) = tracker else {
            return false;
        };
        if distance - tracker.last_seen_distance >= OVERTAKEN_GAP_GROWTH {
            return true;
        }
        let advantage_held = tracker
            .advantage_since_ms
            .is_some_and(|since| now_ms.saturating_sub(since) >= ADVANTAGE_HOLD_MS);
        advantage_held && v_ego - tracker.speed >= ADVANTAGE_SPEED
    }

    fn update_target(
        direction: Direction,
        side: &SideObservation,
        v_ego: f64,
        state: &mut ControlState,
        now_ms: u64,
    ) {
        let lead = &side.lead;
        let has_advantage = v_ego - lead.speed >= ADVANTAGE_SPEED;
        let acquire = |now_ms: u64| TargetVehicleTracker {
            side: direction,
            initial_distance: lead.distance,
            initial_speed: lead.speed,
            last_seen_distance: lead.distance,
            last_seen_ms: now_ms,
            tracking_start_ms: now_ms,
            advantage_since_ms: has_advantage.then_some(now_ms),
            speed: lead.speed,
        };

        if state.target_vehicle.is_none() {
            if lead.distance > 0.0 && lead.distance < TARGET_ACQUIRE_DISTANCE {
                debug!("Tracking {} target at {:.1}m", direction, lead.distance);
                state.target_vehicle = Some(acquire(now_ms));
            }
            return;
        }
        if lead.distance <= 0.0 || lead.distance >= TARGET_KEEP_DISTANCE {
            debug!("{} target gone", direction);
            state.target_vehicle = None;
            return;
        }
        if let Some(tracker) = state.target_vehicle.as_mut() {
            if lead.distance < tracker.initial_distance - TARGET_REANCHOR_MARGIN {
                debug!("Re-anchoring {} target at {:.1}m", direction, lead.distance);
                *tracker = acquire(now_ms);
            } else {
                tracker.last_seen_distance = lead.distance;
                tracker.last_seen_ms = now_ms;
                tracker.speed = lead.speed;
                if has_advantage {
                    tracker.advantage_since_ms.get_or_insert(now_ms);
                } else {
                    tracker.advantage_since_ms = None;
                }
            }
        }
    }

    /// Expected speed in the target lane minus the current lane (km/h)
    fn speed_advantage(snapshot: &VehicleSnapshot, side: &SideObservation) -> f64 {
        let cruise = snapshot.v_cruise;
        let capped = |speed: f64| if cruise > 0.0 { speed.min(cruise) } else { speed };

        let target_lead = &side.lead;
        let target = if !target_lead.is_present() {
            if cruise > 0.0 {
                cruise
            } else {
                snapshot.v_ego + 10.0
            }
        } else if target_lead.relative_speed > 5.0 {
            capped(target_lead.speed)
        } else {
            target_lead.speed
        };

        let lead = &snapshot.lead;
        let current = if !lead.is_present() {
            if cruise > 0.0 {
                cruise
            } else {
                snapshot.v_ego
            }
        } else if lead.relative_speed > 5.0 {
            capped(lead.speed)
        } else {
            lead.speed
        };

        target - current
    }

    fn is_safe(side: &SideObservation, v_ego: f64) -> bool {
        if side.is_blocked() {
            return false;
        }
        let lead = &side.lead;
        if !lead.is_present() {
            return true;
        }
        if lead.relative_speed > 5.0 {
            return lead.distance > (v_ego * 0.4).max(30.0);
        }
        lead.distance > OVERTAKEN_DISTANCE
    }

    fn is_stable(snapshot: &VehicleSnapshot) -> bool {
        snapshot.v_ego < STABLE_SPEED
            || (snapshot.steering_angle.abs() <= MAX_STEERING_DEG
                && snapshot.lat_accel.abs() <= MAX_LAT_ACCEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overtake_model::{LaneTopology, LeadVehicle, RoadType};
    use proptest::prelude::*;

    fn highway_snapshot() -> VehicleSnapshot {
        VehicleSnapshot {
            v_ego: 100.0,
            v_cruise: 120.0,
            onroad: true,
            engaged: true,
            road_type: RoadType::Highway,
            lead: LeadVehicle {
                distance: 60.0,
                speed: 95.0,
                relative_speed: -5.0,
            },
            ..Default::default()
        }
    }

    /// One overtake to the left from lane 3 of 4
    fn after_overtake() -> ControlState {
        let mut state = ControlState::default();
        state.topology = LaneTopology {
            lane_count: 4,
            current_lane: 2,
        };
        state.lane_memory = Some(LaneMemory {
            original_lane: 3,
            started_ms: 0,
        });
        state.net_lane_changes = 1;
        state.is_auto_overtake = true;
        state
    }

    fn side_car(distance: f64, speed: f64) -> LeadVehicle {
        LeadVehicle {
            distance,
            speed,
            relative_speed: speed - 100.0,
        }
    }

    #[test]
    fn test_plan_two_lanes_right() {
        let mut state = ControlState::default();
        state.topology = LaneTopology {
            lane_count: 4,
            current_lane: 1,
        };
        state.lane_memory = Some(LaneMemory {
            original_lane: 3,
            started_ms: 0,
        });
        state.net_lane_changes = 2;
        let plan = ReturnStrategy::plan(&state);
        assert_eq!(
            plan,
            Some(ReturnPlan {
                direction: Direction::Right,
                required_changes: 2,
            })
        );
    }

    #[test]
    fn test_plan_from_net_counter() {
        let mut state = ControlState::default();
        state.net_lane_changes = -1;
        assert_eq!(
            ReturnStrategy::plan(&state),
            Some(ReturnPlan {
                direction: Direction::Left,
                required_changes: 1,
            })
        );
        state.net_lane_changes = 0;
        assert_eq!(ReturnStrategy::plan(&state), None);
    }

    #[test]
    fn test_gates() {
        let strategy = ReturnStrategy::default();
        let snap = highway_snapshot();

        let mut state = after_overtake();
        state.is_auto_overtake = false;
        assert_eq!(
            strategy.evaluate(&snap, &mut state, 1000),
            ReturnDecision::NotApplicable(ReturnBlock::NotAutoOvertake)
        );

        let mut state = after_overtake();
        state.return_attempts = 2;
        assert_eq!(
            strategy.evaluate(&snap, &mut state, 1000),
            ReturnDecision::NotApplicable(ReturnBlock::AttemptsExhausted)
        );

        let mut state = after_overtake();
        assert_eq!(
            strategy.evaluate(&snap, &mut state, 30_001),
            ReturnDecision::NotApplicable(ReturnBlock::MemoryExpired)
        );

        let mut normal = snap.clone();
        normal.road_type = RoadType::Normal;
        let mut state = after_overtake();
        assert_eq!(
            strategy.evaluate(&normal, &mut state, 1000),
            ReturnDecision::NotApplicable(ReturnBlock::Disabled)
        );
    }

    #[test]
    fn test_memory_reconstructed_from_net() {
        let strategy = ReturnStrategy::default();
        let snap = highway_snapshot();
        let mut state = after_overtake();
        state.lane_memory = None;
        strategy.evaluate(&snap, &mut state, 5000);
        assert_eq!(
            state.lane_memory,
            Some(LaneMemory {
                original_lane: 3,
                started_ms: 5000,
            })
        );
    }

    #[test]
    fn test_waits_while_target_alongside() {
        let strategy = ReturnStrategy::default();
        let mut snap = highway_snapshot();
        snap.right.lead = side_car(20.0, 90.0);
        let mut state = after_overtake();

        assert_eq!(
            strategy.evaluate(&snap, &mut state, 1000),
            ReturnDecision::Waiting(ReturnWait::NotOvertaken)
        );
        let tracker = state.target_vehicle.expect("target tracked");
        assert_eq!(tracker.side, Direction::Right);
        assert_eq!(tracker.initial_distance, 20.0);
        assert_eq!(tracker.advantage_since_ms, Some(1000));
    }

    #[test]
    fn test_sustained_advantage_counts_as_overtaken() {
        let strategy = ReturnStrategy::default();
        let mut snap = highway_snapshot();
        snap.right.lead = side_car(20.0, 85.0);
        let mut state = after_overtake();

        for tick in 0..80u64 {
            let decision = strategy.evaluate(&snap, &mut state, 1000 + tick * 100);
            assert_eq!(decision, ReturnDecision::Waiting(ReturnWait::NotOvertaken));
        }
        // 8000ms of holding a 15km/h advantage
        assert!(matches!(
            strategy.evaluate(&snap, &mut state, 9000),
            ReturnDecision::Waiting(ReturnWait::ConfirmHold { .. })
        ));
    }

    #[test]
    fn test_ready_after_hold() {
        let strategy = ReturnStrategy::default();
        let snap = highway_snapshot();
        let mut state = after_overtake();

        assert_eq!(
            strategy.evaluate(&snap, &mut state, 1000),
            ReturnDecision::Waiting(ReturnWait::ConfirmHold { remaining_ms: 5000 })
        );
        assert_eq!(
            strategy.evaluate(&snap, &mut state, 6000),
            ReturnDecision::Ready(ReturnPlan {
                direction: Direction::Right,
                required_changes: 1,
            })
        );
    }

    #[test]
    fn test_failed_check_restarts_hold() {
        let strategy = ReturnStrategy::default();
        let mut snap = highway_snapshot();
        let mut state = after_overtake();
        strategy.evaluate(&snap, &mut state, 1000);

        snap.steering_angle = 15.0;
        assert_eq!(
            strategy.evaluate(&snap, &mut state, 6000),
            ReturnDecision::Waiting(ReturnWait::Unstable)
        );
        assert_eq!(state.overtake_complete_timer, Some(6000));

        snap.steering_angle = 0.0;
        assert!(matches!(
            strategy.evaluate(&snap, &mut state, 7000),
            ReturnDecision::Waiting(ReturnWait::ConfirmHold { remaining_ms: 4000 })
        ));
    }

    #[test]
    fn test_inefficient_return_waits() {
        let strategy = ReturnStrategy::default();
        let mut snap = highway_snapshot();
        // current lane is clear, nothing to gain by moving back
        snap.lead = LeadVehicle::default();
        let mut state = after_overtake();
        strategy.evaluate(&snap, &mut state, 1000);
        assert!(matches!(
            strategy.evaluate(&snap, &mut state, 6000),
            ReturnDecision::Waiting(ReturnWait::Inefficient { .. })
        ));
    }

    #[test]
    fn test_safety_rules() {
        let mut side = SideObservation::default();
        assert!(ReturnStrategy::is_safe(&side, 100.0));

        side.lead = side_car(45.0, 110.0);
        assert!(ReturnStrategy::is_safe(&side, 100.0));
        side.lead = side_car(35.0, 110.0);
        assert!(!ReturnStrategy::is_safe(&side, 100.0));

        side.lead = side_car(55.0, 100.0);
        assert!(ReturnStrategy::is_safe(&side, 100.0));
        side.lead = side_car(45.0, 100.0);
        assert!(!ReturnStrategy::is_safe(&side, 100.0));

        side.lead = LeadVehicle::default();
        side.blindspot = true;
        assert!(!ReturnStrategy::is_safe(&side, 100.0));
    }

    proptest! {
        #[test]
        fn prop_plan_points_back_to_original(original in 1u8..=5, current in 1u8..=5) {
            let mut state = ControlState::default();
            state.topology = LaneTopology { lane_count: 5, current_lane: current };
            state.lane_memory = Some(LaneMemory { original_lane: original, started_ms: 0 });
            state.net_lane_changes = i32::from(original) - i32::from(current);

            match ReturnStrategy::plan(&state) {
                None => prop_assert_eq!(original, current),
                Some(plan) => {
                    let landed = i32::from(current) - plan.direction.net_delta() * plan.required_changes as i32;
                    prop_assert_eq!(landed, i32::from(original));
                }
            }
        }
    }
}
