//! Multi-source lane change verifier

use overtake_model::{Blinker, ControlState, Direction, VehicleSnapshot};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{info, warn};

/// Score a candidate lane change must reach
const PASS_SCORE: i32 = 60;
const EVENT_CAPACITY: usize = 10;
/// Blinker prediction stays relevant this long (ms)
const PREDICTION_WINDOW_MS: u64 = 5000;
/// Minimum spacing between genuine lane changes (ms)
const MIN_CHANGE_SPACING_MS: u64 = 3000;

const CONFIDENCE_MAX: u8 = 100;
const CONFIDENCE_GAIN: u8 = 5;
const CONFIDENCE_LOSS_REJECTED: u8 = 10;
const CONFIDENCE_LOSS_JUMP: u8 = 20;

/// Evidence tally for one candidate lane change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub score: i32,
    pub reasons: Vec<String>,
}

/// A confirmed lane change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationEvent {
    pub time_ms: u64,
    pub from_lane: u8,
    pub to_lane: u8,
    pub direction: Direction,
    pub score: i32,
    pub reasons: Vec<String>,
}

/// Lane change anticipated from a fresh blinker
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BlinkerPrediction {
    pub pending: bool,
    pub start_ms: u64,
    pub expected: Option<Direction>,
    pub lane_before: u8,
}

/// What happened to this tick's lane candidate
#[derive(Debug, Clone, PartialEq)]
pub enum LaneChangeOutcome {
    /// First candidate seen, accepted as the confirmed lane
    Initialized(u8),
    /// Candidate equals the confirmed lane, or none offered
    Unchanged,
    Confirmed {
        from: u8,
        to: u8,
        direction: Direction,
        score: i32,
    },
    /// Single-lane change that failed verification
    Rejected {
        from: u8,
        attempted: u8,
        score: i32,
    },
    /// Multi-lane jump treated as sensor error
    RolledBack { from: u8, attempted: u8 },
}

/// Verification state: confirmed lane, confidence, recent events
#[derive(Debug, Clone)]
pub struct LaneVerifier {
    last_confirmed: u8,
    confidence: u8,
    events: VecDeque<VerificationEvent>,
    prediction: BlinkerPrediction,
    last_blinker: Blinker,
}

impl Default for LaneVerifier {
    fn default() -> Self {
        Self {
            last_confirmed: 0,
            confidence: CONFIDENCE_MAX,
            events: VecDeque::with_capacity(EVENT_CAPACITY),
            prediction: BlinkerPrediction::default(),
            last_blinker: Blinker::None,
        }
    }
}

impl LaneVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirmed_lane(&self) -> u8 {
        self.last_confirmed
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn events(&self) -> impl Iterator<Item = &VerificationEvent> {
        self.events.iter()
    }

    pub fn prediction(&self) -> BlinkerPrediction {
        self.prediction
    }

    /// Score the evidence that `from -> to` is a real lane change
    pub fn verify(&self, from: u8, to: u8, snapshot: &VehicleSnapshot, now_ms: u64) -> VerificationResult {
        let mut score = 0;
        let mut reasons = Vec::new();
        let expected = Direction::between(from, to);

        match (snapshot.blinker.direction(), snapshot.blinker.is_on()) {
            (Some(dir), _) if Some(dir) == expected => {
                score += 30;
                reasons.push("blinker matches".to_string());
            }
            (_, true) => {
                score -= 20;
                reasons.push(format!("blinker {:?} contradicts change", snapshot.blinker));
            }
            (_, false) => {
                score += 10;
                reasons.push("no blinker".to_string());
            }
        }

        if self.prediction.pending
            && now_ms.saturating_sub(self.prediction.start_ms) < PREDICTION_WINDOW_MS
            && self.prediction.expected.is_some()
            && self.prediction.expected == expected
        {
            score += 20;
            reasons.push("blinker prediction matches".to_string());
        }

        let steering = snapshot.steering_angle.abs();
        if (5.0..=30.0).contains(&steering) {
            score += 15;
            reasons.push("steering angle plausible".to_string());
        } else if steering > 45.0 {
            score -= 10;
            reasons.push("steering angle excessive".to_string());
        }

        let lat_accel = snapshot.lat_accel.abs();
        if (0.1..=0.8).contains(&lat_accel) {
            score += 15;
            reasons.push("lateral acceleration plausible".to_string());
        } else if lat_accel > 1.0 {
            score -= 10;
            reasons.push("lateral acceleration excessive".to_string());
        }

        let bonus = i32::from(self.confidence / 10).min(10);
        score += bonus;
        reasons.push(format!("confidence +{}", bonus));

        match self.events.back() {
            Some(last) if now_ms.saturating_sub(last.time_ms) > MIN_CHANGE_SPACING_MS => {
                score += 10;
                reasons.push("change spacing plausible".to_string());
            }
            Some(_) => {
                score -= 15;
                reasons.push("changes too close together".to_string());
            }
            None => {
                score += 10;
                reasons.push("first change".to_string());
            }
        }

        VerificationResult {
            passed: score >= PASS_SCORE,
            score,
            reasons,
        }
    }

    /// Offer this tick's lane candidate. The confirmed lane is written to
    /// `state.topology`; on a confirmed change the net-lane-change counter
    /// is updated and any target-vehicle tracker dropped.
    pub fn process(
        &mut self,
        candidate: Option<u8>,
        snapshot: &VehicleSnapshot,
        state: &mut ControlState,
        now_ms: u64,
    ) -> LaneChangeOutcome {
        let outcome = match candidate {
            None => LaneChangeOutcome::Unchanged,
            Some(lane) if self.last_confirmed == 0 => {
                self.last_confirmed = lane;
                LaneChangeOutcome::Initialized(lane)
            }
            Some(lane) => self.judge(lane, snapshot, state, now_ms),
        };

        if self.last_confirmed > 0 {
            state.topology.current_lane = self.last_confirmed;
        }
        self.update_prediction(snapshot, now_ms);
        outcome
    }

    fn judge(
        &mut self,
        lane: u8,
        snapshot: &VehicleSnapshot,
        state: &mut ControlState,
        now_ms: u64,
    ) -> LaneChangeOutcome {
        let from = self.last_confirmed;
        let delta = i32::from(lane) - i32::from(from);

        match delta.abs() {
            0 => LaneChangeOutcome::Unchanged,
            1 => {
                let result = self.verify(from, lane, snapshot, now_ms);
                let Some(direction) = Direction::between(from, lane) else {
                    return LaneChangeOutcome::Unchanged;
                };
                if !result.passed {
                    self.confidence = self.confidence.saturating_sub(CONFIDENCE_LOSS_REJECTED);
                    warn!(
                        "Lane change {} -> {} rejected (score {}): {}",
                        from,
                        lane,
                        result.score,
                        result.reasons.join(", ")
                    );
                    return LaneChangeOutcome::Rejected {
                        from,
                        attempted: lane,
                        score: result.score,
                    };
                }

                state.net_lane_changes = match state.lane_memory {
                    Some(memory) => i32::from(memory.original_lane) - i32::from(lane),
                    None => state.net_lane_changes + direction.net_delta(),
                };
                self.last_confirmed = lane;
                self.confidence = (self.confidence + CONFIDENCE_GAIN).min(CONFIDENCE_MAX);
                if self.events.len() == EVENT_CAPACITY {
                    self.events.pop_front();
                }
                self.events.push_back(VerificationEvent {
                    time_ms: now_ms,
                    from_lane: from,
                    to_lane: lane,
                    direction,
                    score: result.score,
                    reasons: result.reasons,
                });
                if state.target_vehicle.take().is_some() {
                    info!("Target vehicle tracking cleared after lane change");
                }
                info!(
                    "Lane change {} -> {} confirmed (score {}), net lane changes {}",
                    from, lane, result.score, state.net_lane_changes
                );
                LaneChangeOutcome::Confirmed {
                    from,
                    to: lane,
                    direction,
                    score: result.score,
                }
            }
            _ => {
                self.confidence = self.confidence.saturating_sub(CONFIDENCE_LOSS_JUMP);
                warn!("Lane jump {} -> {} treated as sensor error", from, lane);
                LaneChangeOutcome::RolledBack {
                    from,
                    attempted: lane,
                }
            }
        }
    }

    fn update_prediction(&mut self, snapshot: &VehicleSnapshot, now_ms: u64) {
        let blinker = snapshot.blinker;
        if blinker != self.last_blinker && blinker.is_on() {
            self.prediction = BlinkerPrediction {
                pending: true,
                start_ms: now_ms,
                expected: blinker.direction(),
                lane_before: self.last_confirmed,
            };
        } else if !blinker.is_on() && self.last_blinker.is_on() && self.prediction.pending {
            self.prediction.pending = false;
        }
        self.last_blinker = blinker;
    }

    /// Back to full confidence with no history; the next candidate
    /// re-initialises the confirmed lane
    pub fn reset(&mut self) {
        self.last_confirmed = 0;
        self.confidence = CONFIDENCE_MAX;
        self.events.clear();
        self.prediction = BlinkerPrediction::default();
        self.last_blinker = Blinker::None;
    }
}
