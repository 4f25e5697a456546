//! Overtake Data Model
//!
//! Shared types for the overtake decision layer:
//! - Per-tick vehicle snapshot (ego, lead, neighbouring lanes)
//! - Control state carried between ticks
//! - Configuration with per-road-type policies
//! - Actuation commands and their wire format
//! - A reusable hysteresis filter for noisy condition streams

mod command;
mod config;
mod debounce;
mod error;
mod snapshot;
mod state;

pub use command::{Command, CommandKind, CommandSequencer};
pub use config::{
    CooldownTimings, CurveLimits, EarlyTrigger, HighwayStrategy, LaneCountMode, LaneSafety,
    OvertakeConfig, PenaltyWeights, ReturnPolicies, ReturnPolicy, SpeedLimits, Timings,
    TriggerThresholds,
};
pub use debounce::{DebounceSettings, Debouncer};
pub use error::ModelError;
pub use snapshot::{
    AutoControl, Blinker, Direction, LaneChangeState, LeadVehicle, RadarCandidate, RoadType,
    SideObservation, VehicleSnapshot,
};
pub use state::{
    AutoControlState, ControlState, CooldownState, FollowState, LaneMemory, LaneTopology, Maneuver,
    ManeuverKind, ManeuverOutcome, ManeuverPhase, OvertakeResult, StatusText, TargetVehicleTracker,
    TriggerKind, REASON_IDLE, STATUS_READY,
};

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
