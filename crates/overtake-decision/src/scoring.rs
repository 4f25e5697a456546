//! Direction scoring
//!
//! Each geometrically available direction gets a safety score (penalty
//! based, 0..=100) and an effectiveness score (expected speed gain,
//! 0..=100). Ineffective directions are dropped before combining.

use crate::reasons::{NoOvertakeReason, RejectionCause};
use overtake_model::{Direction, LaneTopology, OvertakeConfig, RoadType, VehicleSnapshot};
use serde::Serialize;
use tracing::debug;

const EMPTY_LANE_EFFECTIVENESS: f64 = 95.0;
const SHORTFALL_WEIGHT: f64 = 8.0;
const HIGHWAY_RIGHT_PENALTY: f64 = 8.0;

/// Expected speed gain of moving into one lane
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Effectiveness {
    pub score: f64,
    /// Minimum score for the direction to be considered at all
    pub floor: f64,
    /// Expected speed in the target lane (km/h)
    pub expected_target: f64,
    /// Expected speed staying put (km/h)
    pub expected_current: f64,
    pub reasons: Vec<String>,
    pub effective: bool,
}

/// Scores for one candidate direction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionAssessment {
    pub direction: Direction,
    pub safety: f64,
    pub effectiveness: Effectiveness,
    /// Safety weighted by effectiveness plus lane-position adjustments,
    /// zero for ineffective directions
    pub combined: f64,
    pub reasons: Vec<String>,
}

/// Result of direction selection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionDecision {
    Execute {
        direction: Direction,
        score: f64,
        speed_advantage: f64,
        assessments: Vec<DirectionAssessment>,
    },
    NoOvertake {
        reasons: Vec<NoOvertakeReason>,
        assessments: Vec<DirectionAssessment>,
    },
}

impl DirectionDecision {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            DirectionDecision::Execute { direction, .. } => Some(*direction),
            DirectionDecision::NoOvertake { .. } => None,
        }
    }

    pub fn assessments(&self) -> &[DirectionAssessment] {
        match self {
            DirectionDecision::Execute { assessments, .. }
            | DirectionDecision::NoOvertake { assessments, .. } => assessments,
        }
    }
}

/// Shoulder or too-narrow outer lane that must never be targeted
fn is_emergency_lane(
    config: &OvertakeConfig,
    snapshot: &VehicleSnapshot,
    topology: &LaneTopology,
    lane: u8,
) -> bool {
    let outermost = lane == topology.lane_count;
    (snapshot.road_type.is_highway() && outermost)
        || (outermost && snapshot.right.lane_width < config.lane_safety.safe_lane_width)
}

/// Rightmost lane actually used for driving on a highway
fn highway_rightmost_driving_lane(topology: &LaneTopology) -> u8 {
    topology.lane_count.saturating_sub(1)
}

fn target_lane(topology: &LaneTopology, direction: Direction) -> u8 {
    match direction {
        Direction::Left => topology.current_lane.saturating_sub(1),
        Direction::Right => topology.current_lane.saturating_add(1),
    }
}

/// Directions with a lane to move into
pub fn available_directions(
    config: &OvertakeConfig,
    snapshot: &VehicleSnapshot,
    topology: &LaneTopology,
) -> Vec<Direction> {
    if !topology.is_known() {
        return Vec::new();
    }
    let lane = topology.current_lane;
    let count = topology.lane_count;
    let mut directions = Vec::with_capacity(2);

    match snapshot.road_type {
        RoadType::Highway => {
            let rightmost = highway_rightmost_driving_lane(topology);
            if lane >= count {
                return directions;
            }
            if lane > 1 {
                directions.push(Direction::Left);
            }
            if lane < rightmost {
                directions.push(Direction::Right);
            }
        }
        RoadType::Normal => {
            if lane > 1 {
                directions.push(Direction::Left);
            }
            if lane < count && !is_emergency_lane(config, snapshot, topology, lane + 1) {
                directions.push(Direction::Right);
            }
        }
    }
    directions
}

/// Safety of moving into the lane on `direction`, 0..=100
pub fn safety_score(
    config: &OvertakeConfig,
    snapshot: &VehicleSnapshot,
    topology: &LaneTopology,
    direction: Direction,
    reasons: &mut Vec<String>,
) -> f64 {
    let target = target_lane(topology, direction);
    if is_emergency_lane(config, snapshot, topology, target) {
        reasons.push("target is an emergency lane".to_string());
        return 0.0;
    }
    let side = snapshot.side(direction);
    if side.is_blocked() {
        reasons.push("vehicle in blind spot".to_string());
        return 0.0;
    }

    let safety = &config.lane_safety;
    let weights = &config.penalty_weights;
    let mut penalty = 0.0;

    if side.lane_width < safety.min_lane_width {
        penalty += 80.0;
        reasons.push(format!("lane too narrow ({:.1}m)", side.lane_width));
    } else if side.lane_width < safety.safe_lane_width {
        penalty += (safety.safe_lane_width - side.lane_width) * weights.lane_width * 10.0;
        reasons.push(format!("narrow lane ({:.1}m)", side.lane_width));
    }

    if snapshot.road_type.is_highway() {
        if direction == Direction::Left && target == 1 {
            penalty -= config.highway.fast_lane_bonus;
        }
        if direction == Direction::Right && target == highway_rightmost_driving_lane(topology) {
            penalty += config.highway.slow_lane_penalty;
        }
    }

    let lead = &side.lead;
    if lead.distance <= 0.0 {
        penalty -= 25.0;
    } else if lead.distance < safety.side_lead_distance_min {
        penalty += (safety.side_lead_distance_min - lead.distance) * weights.side_lead_distance;
        reasons.push(format!("side vehicle close ({:.0}m)", lead.distance));
    } else {
        penalty -= ((lead.distance - safety.side_lead_distance_min) * 0.5).min(20.0);
    }

    let margin = weights.min_speed_advantage;
    if lead.is_present() && lead.relative_speed != 0.0 {
        if lead.relative_speed < -margin {
            penalty += lead.relative_speed.abs() * weights.side_relative_speed;
            reasons.push(format!("side vehicle slower ({:+.0}km/h)", lead.relative_speed));
        } else if lead.relative_speed > margin {
            penalty -= (lead.relative_speed * 0.8).min(25.0);
        }
    }

    (100.0 - penalty.max(0.0)).max(0.0)
}

/// Whether moving into the lane on `direction` actually gains speed
pub fn effectiveness(config: &OvertakeConfig, snapshot: &VehicleSnapshot, direction: Direction) -> Effectiveness {
    let side = &snapshot.side(direction).lead;
    let lead = &snapshot.lead;
    let ego = snapshot.v_ego;
    let mut reasons = Vec::new();

    let (mut score, expected_target, min_advantage) = if side.distance <= 0.0 {
        let target = if snapshot.v_cruise > 0.0 {
            snapshot.v_cruise
        } else {
            ego + 15.0
        };
        (EMPTY_LANE_EFFECTIVENESS, target, 0.0)
    } else {
        let mut score = 100.0;
        if side.speed > 0.0 && lead.is_present() && side.speed < lead.speed - 2.0 {
            score -= 50.0;
            reasons.push("target lane slower than current lead".to_string());
        }
        if side.speed > 0.0 && side.speed < ego - 8.0 {
            score -= 60.0;
            reasons.push("target lane slower than ego".to_string());
        }
        if side.distance < 25.0 && side.relative_speed < -10.0 {
            score -= 40.0;
            reasons.push("close target vehicle decelerating".to_string());
        }
        if side.distance < 40.0 && side.relative_speed < -15.0 {
            score -= 35.0;
            reasons.push("target vehicle closing fast".to_string());
        }

        let mut target = if side.speed > 0.0 { side.speed } else { ego + 10.0 };
        if side.relative_speed < 0.0 {
            target = target.min(ego + side.relative_speed);
        }
        (score, target, config.min_speed_advantage)
    };

    let expected_current = if lead.is_present() { lead.speed } else { ego };
    let advantage = expected_target - expected_current;
    if advantage < min_advantage {
        score -= (min_advantage - advantage) * SHORTFALL_WEIGHT;
        reasons.push(format!("speed advantage {:+.1}km/h below {:.0}", advantage, min_advantage));
    }

    if snapshot.road_type.is_highway() && direction == Direction::Right {
        score -= HIGHWAY_RIGHT_PENALTY;
    }
    let score = score.clamp(0.0, 100.0);

    let floor = if side.is_present() && side.relative_speed < -10.0 {
        75.0
    } else if snapshot.road_type.is_highway() {
        70.0
    } else {
        65.0
    };

    Effectiveness {
        score,
        floor,
        expected_target,
        expected_current,
        reasons,
        effective: score >= floor,
    }
}

/// Expected speed gain used by the final go/no-go check
fn speed_advantage(snapshot: &VehicleSnapshot, direction: Direction) -> f64 {
    let side = &snapshot.side(direction).lead;
    let target = if side.is_present() && side.speed > 0.0 {
        side.speed
    } else {
        snapshot.v_ego + 10.0
    };
    let current = if snapshot.lead.is_present() {
        snapshot.lead.speed
    } else {
        snapshot.v_ego
    };
    target - current
}

fn assess(
    config: &OvertakeConfig,
    snapshot: &VehicleSnapshot,
    topology: &LaneTopology,
    direction: Direction,
) -> DirectionAssessment {
    let mut reasons = Vec::new();
    let safety = safety_score(config, snapshot, topology, direction, &mut reasons);
    let effectiveness = effectiveness(config, snapshot, direction);

    let mut combined = 0.0;
    if effectiveness.effective {
        combined = safety * effectiveness.score / 100.0;
        if snapshot.road_type.is_highway() {
            let lane = topology.current_lane;
            if direction == Direction::Left && lane == highway_rightmost_driving_lane(topology) {
                combined += config.highway.fast_lane_bonus;
            }
            if direction == Direction::Right && lane == 1 {
                combined -= config.highway.slow_lane_penalty;
            }
        }
    }

    debug!(
        "{}: safety {:.1}, effectiveness {:.1}/{:.0}, combined {:.1}",
        direction, safety, effectiveness.score, effectiveness.floor, combined
    );
    DirectionAssessment {
        direction,
        safety,
        effectiveness,
        combined,
        reasons,
    }
}

/// Pick the best direction or explain why none qualifies
pub fn select_direction(
    config: &OvertakeConfig,
    snapshot: &VehicleSnapshot,
    topology: &LaneTopology,
) -> DirectionDecision {
    let assessments: Vec<DirectionAssessment> = available_directions(config, snapshot, topology)
        .into_iter()
        .map(|direction| assess(config, snapshot, topology, direction))
        .collect();

    if assessments.is_empty() {
        return DirectionDecision::NoOvertake {
            reasons: vec![NoOvertakeReason {
                direction: None,
                cause: None,
            }],
            assessments,
        };
    }

    let best = assessments
        .iter()
        .filter(|a| a.effectiveness.effective && a.combined > config.penalty_threshold)
        .max_by(|a, b| a.combined.total_cmp(&b.combined));

    let Some(best) = best else {
        let reasons = assessments
            .iter()
            .map(|a| {
                let cause = if !a.effectiveness.effective {
                    RejectionCause::Ineffective {
                        effectiveness: a.effectiveness.score,
                        floor: a.effectiveness.floor,
                    }
                } else {
                    RejectionCause::InsufficientSafety { score: a.combined }
                };
                NoOvertakeReason {
                    direction: Some(a.direction),
                    cause: Some(cause),
                }
            })
            .collect();
        return DirectionDecision::NoOvertake {
            reasons,
            assessments,
        };
    };

    let direction = best.direction;
    let score = best.combined;
    let advantage = speed_advantage(snapshot, direction);
    if advantage < config.highway.min_advantage_threshold {
        debug!("{} rejected, speed advantage {:+.1}km/h", direction, advantage);
        let reasons = assessments
            .iter()
            .map(|a| NoOvertakeReason {
                direction: Some(a.direction),
                cause: Some(if a.direction == direction {
                    RejectionCause::NoSpeedAdvantage { advantage }
                } else {
                    RejectionCause::NotSelected
                }),
            })
            .collect();
        return DirectionDecision::NoOvertake {
            reasons,
            assessments,
        };
    }

    DirectionDecision::Execute {
        direction,
        score,
        speed_advantage: advantage,
        assessments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overtake_model::LeadVehicle;
    use proptest::prelude::*;

    fn highway(lane: u8, lanes: u8) -> (VehicleSnapshot, LaneTopology) {
        let snap = VehicleSnapshot {
            v_ego: 100.0,
            v_cruise: 130.0,
            onroad: true,
            engaged: true,
            road_type: RoadType::Highway,
            lead: LeadVehicle {
                distance: 40.0,
                speed: 80.0,
                relative_speed: -20.0,
            },
            ..Default::default()
        };
        let topology = LaneTopology {
            lane_count: lanes,
            current_lane: lane,
        };
        (snap, topology)
    }

    fn side_vehicle(distance: f64, speed: f64, ego: f64) -> LeadVehicle {
        LeadVehicle {
            distance,
            speed,
            relative_speed: speed - ego,
        }
    }

    #[test]
    fn test_empty_lane_is_ideal() {
        let config = OvertakeConfig::default();
        let (snap, _) = highway(2, 3);
        let eff = effectiveness(&config, &snap, Direction::Left);
        assert!(eff.score >= 95.0);
        assert!(eff.effective);
        assert!(eff.reasons.is_empty());
        assert_eq!(eff.expected_target, 130.0);
    }

    #[test]
    fn test_available_directions_highway() {
        let config = OvertakeConfig::default();
        let (snap, _) = highway(1, 4);
        let at = |lane| LaneTopology {
            lane_count: 4,
            current_lane: lane,
        };
        assert_eq!(available_directions(&config, &snap, &at(1)), vec![Direction::Right]);
        assert_eq!(
            available_directions(&config, &snap, &at(2)),
            vec![Direction::Left, Direction::Right]
        );
        assert_eq!(available_directions(&config, &snap, &at(3)), vec![Direction::Left]);
        assert!(available_directions(&config, &snap, &at(4)).is_empty());
        assert!(available_directions(&config, &snap, &at(0)).is_empty());
    }

    #[test]
    fn test_available_directions_normal() {
        let config = OvertakeConfig::default();
        let (mut snap, _) = highway(1, 3);
        snap.road_type = RoadType::Normal;
        let topology = LaneTopology {
            lane_count: 3,
            current_lane: 2,
        };
        assert_eq!(
            available_directions(&config, &snap, &topology),
            vec![Direction::Left, Direction::Right]
        );

        // narrow outer lane is treated as a shoulder
        snap.right.lane_width = 2.5;
        assert_eq!(available_directions(&config, &snap, &topology), vec![Direction::Left]);
    }

    #[test]
    fn test_blind_spot_zeroes_safety() {
        let config = OvertakeConfig::default();
        let (mut snap, topology) = highway(2, 3);
        snap.left.blindspot = true;
        let mut reasons = Vec::new();
        assert_eq!(safety_score(&config, &snap, &topology, Direction::Left, &mut reasons), 0.0);
        assert_eq!(reasons, vec!["vehicle in blind spot".to_string()]);
    }

    #[test]
    fn test_close_slow_side_vehicle_penalised() {
        let config = OvertakeConfig::default();
        let (mut snap, topology) = highway(2, 4);
        snap.right.lead = side_vehicle(15.0, 85.0, 100.0);
        let mut reasons = Vec::new();
        // slow lane +10, (25-15)*1.5 = 15, 15*1.8 = 27
        let score = safety_score(&config, &snap, &topology, Direction::Right, &mut reasons);
        assert!((score - 48.0).abs() < 1e-9);
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn test_side_speed_margin_follows_weight() {
        let mut config = OvertakeConfig::default();
        let (mut snap, topology) = highway(2, 4);
        snap.right.lead = side_vehicle(25.0, 96.0, 100.0);

        let mut reasons = Vec::new();
        // slow lane +10 only
        let lenient = safety_score(&config, &snap, &topology, Direction::Right, &mut reasons);
        assert!((lenient - 90.0).abs() < 1e-9);
        assert!(reasons.is_empty());

        config.penalty_weights.min_speed_advantage = 2.0;
        let mut reasons = Vec::new();
        let strict = safety_score(&config, &snap, &topology, Direction::Right, &mut reasons);
        // 4 km/h slower now exceeds the margin: 4 * 1.8
        assert!((lenient - strict - 7.2).abs() < 1e-9);
        assert_eq!(reasons, vec!["side vehicle slower (-4km/h)".to_string()]);
    }

    #[test]
    fn test_selects_left_from_middle_lane() {
        let config = OvertakeConfig::default();
        let (snap, topology) = highway(2, 3);
        match select_direction(&config, &snap, &topology) {
            DirectionDecision::Execute {
                direction,
                score,
                speed_advantage,
                ..
            } => {
                assert_eq!(direction, Direction::Left);
                assert!(score > 100.0);
                assert!((speed_advantage - 30.0).abs() < 1e-9);
            }
            other => panic!("expected execute, got {:?}", other),
        }
    }

    #[test]
    fn test_slow_side_lane_is_ineffective() {
        let config = OvertakeConfig::default();
        let (mut snap, topology) = highway(3, 4);
        snap.left.lead = side_vehicle(60.0, 70.0, 100.0);
        match select_direction(&config, &snap, &topology) {
            DirectionDecision::NoOvertake { reasons, .. } => {
                assert_eq!(reasons.len(), 1);
                assert_eq!(reasons[0].direction, Some(Direction::Left));
                assert!(matches!(
                    reasons[0].cause,
                    Some(RejectionCause::Ineffective { floor, .. }) if floor == 75.0
                ));
            }
            other => panic!("expected no overtake, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_lane_reports_no_direction() {
        let config = OvertakeConfig::default();
        let (snap, mut topology) = highway(2, 3);
        topology.current_lane = 0;
        match select_direction(&config, &snap, &topology) {
            DirectionDecision::NoOvertake { reasons, assessments } => {
                assert!(assessments.is_empty());
                assert_eq!(reasons[0].direction, None);
                assert_eq!(reasons[0].to_string(), "no lane available in either direction");
            }
            other => panic!("expected no overtake, got {:?}", other),
        }
    }

    #[test]
    fn test_blocked_side_insufficient_safety() {
        let config = OvertakeConfig::default();
        let (mut snap, topology) = highway(3, 4);
        snap.left.front_blind = true;
        match select_direction(&config, &snap, &topology) {
            DirectionDecision::NoOvertake { reasons, .. } => {
                assert!(matches!(
                    reasons[0].cause,
                    Some(RejectionCause::InsufficientSafety { .. })
                ));
            }
            other => panic!("expected no overtake, got {:?}", other),
        }
    }

    #[test]
    fn test_final_speed_check() {
        let config = OvertakeConfig::default();
        let (mut snap, topology) = highway(2, 3);
        // lead already faster than ego + 10
        snap.lead = side_vehicle(50.0, 112.0, 100.0);
        snap.v_cruise = 140.0;
        match select_direction(&config, &snap, &topology) {
            DirectionDecision::NoOvertake { reasons, .. } => {
                assert!(matches!(
                    reasons[0].cause,
                    Some(RejectionCause::NoSpeedAdvantage { .. })
                ));
            }
            other => panic!("expected no overtake, got {:?}", other),
        }
    }

    proptest! {
        #[test]
        fn prop_executed_direction_is_effective(
            lane in 1u8..=4,
            lead_speed in 30.0f64..120.0,
            side_distance in 0.0f64..120.0,
            side_speed in 30.0f64..140.0,
            width in 2.0f64..4.0,
            highway_road in any::<bool>(),
        ) {
            let config = OvertakeConfig::default();
            let (mut snap, topology) = highway(lane, 4);
            snap.road_type = if highway_road { RoadType::Highway } else { RoadType::Normal };
            snap.lead = side_vehicle(40.0, lead_speed, snap.v_ego);
            for direction in [Direction::Left, Direction::Right] {
                let side = snap.side_mut(direction);
                side.lane_width = width;
                side.lead = if side_distance < 5.0 {
                    LeadVehicle::default()
                } else {
                    side_vehicle(side_distance, side_speed, 100.0)
                };
            }

            let decision = select_direction(&config, &snap, &topology);
            if let DirectionDecision::Execute { direction, score, assessments, .. } = &decision {
                let chosen = assessments.iter().find(|a| a.direction == *direction);
                prop_assert!(chosen.is_some());
                let chosen = chosen.unwrap();
                prop_assert!(chosen.effectiveness.score >= chosen.effectiveness.floor);
                prop_assert!(*score > config.penalty_threshold);
            }
        }
    }
}
