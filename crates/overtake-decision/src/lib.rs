//! Overtake Decision Engine
//!
//! Decides per tick whether an overtake should start and in which
//! direction:
//! - Hard gates (auto-control, onroad, engaged, speed floors, cooldown)
//! - Trigger conditions with a stability debounce and quick-trigger window
//! - Long-range trigger for a markedly slow lead
//! - Dynamic cooldown from the last outcome and failure streak
//! - Per-direction safety and effectiveness scoring

mod cooldown;
mod engine;
mod reasons;
mod scoring;

pub use cooldown::{cooldown_remaining_ms, dynamic_cooldown_ms};
pub use engine::{OvertakeDecisionEngine, TriggerCondition, TriggerDecision};
pub use reasons::{LaneWarning, NoOvertakeReason, RejectionCause, TriggerBlock};
pub use scoring::{
    available_directions, effectiveness, safety_score, select_direction, DirectionAssessment,
    DirectionDecision, Effectiveness,
};
