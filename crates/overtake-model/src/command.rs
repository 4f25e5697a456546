//! Commands sent to the actuation endpoint

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command type understood by the actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    #[serde(rename = "OVERTAKE")]
    Overtake,
    #[serde(rename = "LANECHANGE")]
    LaneChange,
    #[serde(rename = "SPEED")]
    Speed,
    #[serde(rename = "CANCEL_OVERTAKE")]
    CancelOvertake,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Overtake => "OVERTAKE",
            CommandKind::LaneChange => "LANECHANGE",
            CommandKind::Speed => "SPEED",
            CommandKind::CancelOvertake => "CANCEL_OVERTAKE",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single fire-and-forget command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Strictly increasing per process
    pub index: u64,
    #[serde(rename = "cmd")]
    pub kind: CommandKind,
    /// Direction or value
    pub arg: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl Command {
    /// JSON datagram payload
    pub fn encode(&self) -> Result<Vec<u8>, ModelError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Hands out command indices
#[derive(Debug, Default)]
pub struct CommandSequencer {
    next_index: u64,
}

impl CommandSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, kind: CommandKind, arg: impl Into<String>, now_ms: u64) -> Command {
        self.next_index += 1;
        Command {
            index: self.next_index,
            kind,
            arg: arg.into(),
            timestamp: now_ms,
        }
    }

    /// Last index handed out, zero before the first command
    pub fn last_index(&self) -> u64 {
        self.next_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let mut seq = CommandSequencer::new();
        let cmd = seq.next(CommandKind::LaneChange, "LEFT", 1_700_000_000_000);
        let json: serde_json::Value = serde_json::from_slice(&cmd.encode().unwrap()).unwrap();
        assert_eq!(json["index"], 1);
        assert_eq!(json["cmd"], "LANECHANGE");
        assert_eq!(json["arg"], "LEFT");
        assert_eq!(json["timestamp"], 1_700_000_000_000u64);
    }

    #[test]
    fn test_indices_strictly_increase() {
        let mut seq = CommandSequencer::new();
        let a = seq.next(CommandKind::Overtake, "RIGHT", 10);
        let b = seq.next(CommandKind::CancelOvertake, "true", 10);
        assert!(b.index > a.index);
        assert_eq!(seq.last_index(), 2);
    }
}
