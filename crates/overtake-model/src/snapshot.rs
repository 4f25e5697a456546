//! Per-tick vehicle snapshot
//!
//! Speeds are km/h, distances metres, steering in degrees and lateral
//! acceleration in m/s². A distance of zero or less means "nothing there".

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lateral direction of a lane change, also used to name a side of the car
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    /// Wire representation used by the actuation endpoint
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Contribution to the net-lane-change counter (left is positive)
    pub fn net_delta(self) -> i32 {
        match self {
            Direction::Left => 1,
            Direction::Right => -1,
        }
    }

    /// Direction that moves from `from` lane to `to` lane (1 = leftmost)
    pub fn between(from: u8, to: u8) -> Option<Self> {
        match to.cmp(&from) {
            std::cmp::Ordering::Less => Some(Direction::Left),
            std::cmp::Ordering::Greater => Some(Direction::Right),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LEFT" => Ok(Direction::Left),
            "RIGHT" => Ok(Direction::Right),
            _ => Err(ModelError::InvalidDirection(s.to_string())),
        }
    }
}

/// Turn signal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Blinker {
    #[default]
    None,
    Left,
    Right,
    Hazard,
}

impl Blinker {
    /// Direction signalled, hazard lights signal none
    pub fn direction(self) -> Option<Direction> {
        match self {
            Blinker::Left => Some(Direction::Left),
            Blinker::Right => Some(Direction::Right),
            Blinker::None | Blinker::Hazard => None,
        }
    }

    pub fn is_on(self) -> bool {
        self != Blinker::None
    }
}

/// Road classification, selects speed floors and return policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadType {
    Highway,
    #[default]
    Normal,
}

impl RoadType {
    pub fn is_highway(self) -> bool {
        self == RoadType::Highway
    }
}

impl fmt::Display for RoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoadType::Highway => f.write_str("highway"),
            RoadType::Normal => f.write_str("normal"),
        }
    }
}

/// External auto-control level reported by the navigation stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoControl {
    #[default]
    Off,
    Active,
    Tunnel,
}

impl AutoControl {
    /// Map the raw level (0 none, 1 active, 2 tunnel)
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => AutoControl::Off,
            2 => AutoControl::Tunnel,
            _ => AutoControl::Active,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            AutoControl::Off => 0,
            AutoControl::Active => 1,
            AutoControl::Tunnel => 2,
        }
    }

    pub fn is_engaged(self) -> bool {
        self != AutoControl::Off
    }
}

/// Lane-change progress as reported by the driving model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneChangeState {
    #[default]
    Off,
    Starting,
    Changing,
    Finishing,
}

/// A leading vehicle in some lane
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadVehicle {
    /// Longitudinal distance (m), zero when absent
    pub distance: f64,
    /// Absolute speed (km/h)
    pub speed: f64,
    /// Speed relative to ego (km/h), negative when the lead is slower
    pub relative_speed: f64,
}

impl LeadVehicle {
    pub fn is_present(&self) -> bool {
        self.distance > 0.0
    }
}

/// Raw radar candidate for one side
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarCandidate {
    /// Whether the radar reports the candidate as a live track
    pub tracked: bool,
    pub distance: f64,
    pub speed: f64,
    pub relative_speed: f64,
}

/// Everything observed about one neighbouring lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SideObservation {
    /// Width of the neighbouring lane (m)
    pub lane_width: f64,
    /// Distance to the road edge on this side (m)
    pub edge_distance: f64,
    /// Blind-spot monitor flag
    pub blindspot: bool,
    /// Front-corner blind flag
    pub front_blind: bool,
    /// Single-frame radar lead in that lane
    pub lead: LeadVehicle,
    /// Radar candidates for the tracker
    pub candidates: Vec<RadarCandidate>,
}

impl Default for SideObservation {
    fn default() -> Self {
        Self {
            lane_width: 3.5,
            edge_distance: 0.0,
            blindspot: false,
            front_blind: false,
            lead: LeadVehicle::default(),
            candidates: Vec::new(),
        }
    }
}

impl SideObservation {
    /// Blind spot or front blind occupied
    pub fn is_blocked(&self) -> bool {
        self.blindspot || self.front_blind
    }
}

/// Snapshot of the vehicle delivered once per tick
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleSnapshot {
    pub v_ego: f64,
    pub v_cruise: f64,
    pub steering_angle: f64,
    pub lat_accel: f64,
    /// Path curvature (1/m)
    pub road_curvature: f64,
    /// Maximum curvature ahead as reported by the planner
    pub max_curve: f64,
    pub blinker: Blinker,
    pub onroad: bool,
    pub engaged: bool,
    pub road_type: RoadType,
    pub auto_control: AutoControl,
    pub lead: LeadVehicle,
    pub left: SideObservation,
    pub right: SideObservation,
    pub lane_change_state: LaneChangeState,
}

impl VehicleSnapshot {
    /// Ego to cruise speed ratio, 1.0 when no cruise speed is set
    pub fn speed_ratio(&self) -> f64 {
        if self.v_cruise > 0.0 {
            self.v_ego / self.v_cruise
        } else {
            1.0
        }
    }

    /// Following time gap to the lead (s), zero when not computable
    pub fn time_gap(&self) -> f64 {
        if self.lead.distance <= 0.0 || self.v_ego <= 0.0 {
            return 0.0;
        }
        self.lead.distance / (self.v_ego / 3.6)
    }

    pub fn side(&self, direction: Direction) -> &SideObservation {
        match direction {
            Direction::Left => &self.left,
            Direction::Right => &self.right,
        }
    }

    pub fn side_mut(&mut self, direction: Direction) -> &mut SideObservation {
        match direction {
            Direction::Left => &mut self.left,
            Direction::Right => &mut self.right,
        }
    }
}
