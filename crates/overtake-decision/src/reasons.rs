//! Structured reasons for not overtaking

use overtake_model::{Direction, OvertakeResult, RoadType, TriggerKind};
use serde::Serialize;
use std::fmt;

/// Why the trigger did not fire this tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum TriggerBlock {
    Disabled { road: RoadType },
    AutoControlActive,
    Tunnel,
    AutoControlCooldown { remaining_ms: u64 },
    NotOnroad,
    NotEngaged,
    LeadTooSlow { speed: f64, min: f64 },
    NoLead,
    CruiseReached { ratio: f64 },
    EgoTooSlow { speed: f64, min: f64 },
    Cooldown { remaining_ms: u64, last_result: OvertakeResult },
    AwaitingStability { kind: TriggerKind, remaining_ms: u64, count: u32 },
    NoCondition,
}

impl fmt::Display for TriggerBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerBlock::Disabled { road } => write!(f, "auto overtake disabled on {} roads", road),
            TriggerBlock::AutoControlActive => f.write_str("external auto control active, overtaking paused"),
            TriggerBlock::Tunnel => f.write_str("in tunnel, overtaking paused"),
            TriggerBlock::AutoControlCooldown { remaining_ms } => write!(
                f,
                "auto control just released, waiting {:.1}s",
                *remaining_ms as f64 / 1000.0
            ),
            TriggerBlock::NotOnroad => f.write_str("vehicle not on road"),
            TriggerBlock::NotEngaged => f.write_str("cruise not engaged"),
            TriggerBlock::LeadTooSlow { speed, min } => write!(
                f,
                "lead at {:.0}km/h below {:.0}km/h, likely congestion",
                speed, min
            ),
            TriggerBlock::NoLead => f.write_str("no vehicle ahead"),
            TriggerBlock::CruiseReached { ratio } => {
                write!(f, "already at {:.0}% of cruise speed", ratio * 100.0)
            }
            TriggerBlock::EgoTooSlow { speed, min } => write!(
                f,
                "speed {:.0}km/h below overtake minimum {:.0}km/h",
                speed, min
            ),
            TriggerBlock::Cooldown {
                remaining_ms,
                last_result,
            } => {
                let suffix = match last_result {
                    OvertakeResult::Success => " (after success)",
                    OvertakeResult::Failed => " (quick retry after failure)",
                    OvertakeResult::Condition => " (conditions not met)",
                    OvertakeResult::None => "",
                };
                write!(f, "cooldown, {:.1}s left{}", *remaining_ms as f64 / 1000.0, suffix)
            }
            TriggerBlock::AwaitingStability {
                kind,
                remaining_ms,
                count,
            } => write!(
                f,
                "{} met, waiting for stability ({:.1}s, count {})",
                kind,
                *remaining_ms as f64 / 1000.0,
                count
            ),
            TriggerBlock::NoCondition => f.write_str("no overtake trigger condition met"),
        }
    }
}

/// Why a direction was not taken
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionCause {
    Ineffective { effectiveness: f64, floor: f64 },
    InsufficientSafety { score: f64 },
    NotSelected,
    NoSpeedAdvantage { advantage: f64 },
}

/// One entry of the "why not" list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoOvertakeReason {
    /// `None` when no direction was available at all
    pub direction: Option<Direction>,
    pub cause: Option<RejectionCause>,
}

impl fmt::Display for NoOvertakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(direction) = self.direction else {
            return f.write_str("no lane available in either direction");
        };
        match &self.cause {
            Some(RejectionCause::Ineffective {
                effectiveness,
                floor,
            }) => write!(
                f,
                "{}: ineffective ({:.1} < {:.0})",
                direction, effectiveness, floor
            ),
            Some(RejectionCause::InsufficientSafety { score }) => {
                write!(f, "{}: insufficient safety ({:.1})", direction, score)
            }
            Some(RejectionCause::NotSelected) | None => write!(f, "{}: acceptable but not selected", direction),
            Some(RejectionCause::NoSpeedAdvantage { advantage }) => write!(
                f,
                "{}: no real speed advantage ({:+.1}km/h)",
                direction, advantage
            ),
        }
    }
}

/// Hazard in a neighbouring lane, for the status surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneWarning {
    NarrowLane,
    BlindSpot,
    SideLeadTooClose,
    SideSpeedTooHigh,
}

impl fmt::Display for LaneWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LaneWarning::NarrowLane => "lane too narrow",
            LaneWarning::BlindSpot => "vehicle in blind spot",
            LaneWarning::SideLeadTooClose => "side vehicle too close",
            LaneWarning::SideSpeedTooHigh => "side relative speed too high",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_text() {
        let block = TriggerBlock::Cooldown {
            remaining_ms: 2500,
            last_result: OvertakeResult::Success,
        };
        assert_eq!(block.to_string(), "cooldown, 2.5s left (after success)");

        let reason = NoOvertakeReason {
            direction: Some(Direction::Left),
            cause: Some(RejectionCause::InsufficientSafety { score: 42.0 }),
        };
        assert_eq!(reason.to_string(), "LEFT: insufficient safety (42.0)");
    }
}
