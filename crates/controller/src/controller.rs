//! Tick pipeline
//!
//! One `tick` per vehicle snapshot:
//! 1. Side leads resolved through the radar trackers
//! 2. Lane-change completion, auto-control and lane topology bookkeeping
//! 3. Curve cancellation of a running overtake
//! 4. Excursion timeouts
//! 5. Manoeuvre supervision, or in idle: return first, then overtake
//!
//! At most one automatic command leaves per tick.

use crate::error::{ControllerError, SinkError};
use crate::sink::CommandSink;
use crate::source::{SnapshotSource, SourceEvent};
use crate::status::{LaneWarnings, StatusReport};
use lane_verification::{LaneChangeOutcome, LaneEstimator, LaneVerifier};
use overtake_decision::{
    cooldown_remaining_ms, DirectionDecision, NoOvertakeReason, OvertakeDecisionEngine,
    TriggerCondition, TriggerDecision,
};
use overtake_model::{
    now_ms, Command, CommandKind, CommandSequencer, ControlState, Direction, LaneChangeState,
    Maneuver, ManeuverKind, ManeuverOutcome, ManeuverPhase, OvertakeConfig, VehicleSnapshot,
    REASON_IDLE, STATUS_READY,
};
use return_strategy::{ReturnDecision, ReturnStrategy};
use side_tracker::{SideVehicleTracker, TrackerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Owns the decision state and drives it one snapshot at a time
pub struct OvertakeController {
    config: OvertakeConfig,
    state: ControlState,
    decision: OvertakeDecisionEngine,
    returns: ReturnStrategy,
    verifier: LaneVerifier,
    estimator: LaneEstimator,
    left_tracker: SideVehicleTracker,
    right_tracker: SideVehicleTracker,
    sequencer: CommandSequencer,
    sink: Box<dyn CommandSink>,
    previous_lane_change: LaneChangeState,
    last_lane_count_ms: Option<u64>,
    last_snapshot: Option<VehicleSnapshot>,
    conditions: Vec<TriggerCondition>,
    no_overtake: Vec<NoOvertakeReason>,
    return_status: Option<String>,
    running: Arc<AtomicBool>,
}

impl OvertakeController {
    pub fn new(config: OvertakeConfig, sink: Box<dyn CommandSink>) -> Self {
        info!(
            "Overtake controller: highway={}, normal={}, return={}",
            config.auto_overtake_highway, config.auto_overtake_normal, config.should_return_to_lane
        );
        Self {
            state: ControlState::new(config.debounce),
            decision: OvertakeDecisionEngine::new(config.clone()),
            returns: ReturnStrategy::new(config.clone()),
            verifier: LaneVerifier::new(),
            estimator: LaneEstimator::new(),
            left_tracker: SideVehicleTracker::new(Direction::Left, TrackerConfig::default()),
            right_tracker: SideVehicleTracker::new(Direction::Right, TrackerConfig::default()),
            sequencer: CommandSequencer::new(),
            sink,
            previous_lane_change: LaneChangeState::Off,
            last_lane_count_ms: None,
            last_snapshot: None,
            conditions: Vec::new(),
            no_overtake: Vec::new(),
            return_status: None,
            running: Arc::new(AtomicBool::new(true)),
            config,
        }
    }

    pub fn config(&self) -> &OvertakeConfig {
        &self.config
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Flag checked by `run`; clear it to stop the loop
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Tick on a fixed interval until the source finishes or `stop` is called
    pub async fn run<S: SnapshotSource>(&mut self, source: &mut S) -> Result<(), ControllerError> {
        let mut ticker = interval(Duration::from_millis(self.config.timings.tick_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Tick loop started ({}ms)", self.config.timings.tick_interval_ms);

        while self.is_running() {
            ticker.tick().await;
            match source.poll_snapshot()? {
                SourceEvent::Snapshot(snapshot) => {
                    self.tick(&snapshot, now_ms());
                }
                SourceEvent::Idle => {}
                SourceEvent::Finished => {
                    info!("Snapshot source finished");
                    break;
                }
            }
        }

        info!(
            "Tick loop stopped: {} overtakes, {} returns, {} commands",
            self.state.overtakes_completed,
            self.state.returns_completed,
            self.sequencer.last_index()
        );
        Ok(())
    }

    /// Run the pipeline for one snapshot, returning the command sent, if any
    pub fn tick(&mut self, raw: &VehicleSnapshot, now_ms: u64) -> Option<Command> {
        let snapshot = self.resolve_side_leads(raw, now_ms);
        self.count_finished_lane_changes(&snapshot);
        self.decision
            .update_auto_control(&snapshot, &mut self.state, now_ms);
        self.update_topology(&snapshot, now_ms);

        let issued = self.step(&snapshot, now_ms);

        metrics::gauge!("overtake_net_lane_changes").set(f64::from(self.state.net_lane_changes));
        self.last_snapshot = Some(snapshot);
        issued
    }

    fn step(&mut self, snapshot: &VehicleSnapshot, now_ms: u64) -> Option<Command> {
        if self.state.is_overtaking() {
            if let Some(reason) = self.curve_reason(snapshot) {
                return self.cancel_for_curve(&reason, now_ms);
            }
        }

        self.decision
            .update_following(snapshot, &mut self.state, now_ms);
        self.sweep_excursion(snapshot, now_ms);

        match self.state.phase {
            ManeuverPhase::InProgress(maneuver) => {
                self.supervise(maneuver, now_ms);
                None
            }
            ManeuverPhase::Settling { since_ms, .. } => {
                if now_ms.saturating_sub(since_ms) >= self.config.timings.completion_hold_ms {
                    self.state.phase = ManeuverPhase::Idle;
                    self.state.set_status(STATUS_READY, REASON_IDLE, now_ms);
                }
                None
            }
            ManeuverPhase::Idle => self.evaluate_idle(snapshot, now_ms),
        }
    }

    fn resolve_side_leads(&mut self, raw: &VehicleSnapshot, now_ms: u64) -> VehicleSnapshot {
        let mut snapshot = raw.clone();
        self.left_tracker.update(&raw.left.candidates, now_ms);
        self.right_tracker.update(&raw.right.candidates, now_ms);
        snapshot.left.lead = self.left_tracker.resolve_lead(raw.left.lead);
        snapshot.right.lead = self.right_tracker.resolve_lead(raw.right.lead);
        snapshot
    }

    /// The driving model signals a finished lane change by leaving `Finishing`
    fn count_finished_lane_changes(&mut self, snapshot: &VehicleSnapshot) {
        if self.previous_lane_change == LaneChangeState::Finishing
            && snapshot.lane_change_state != LaneChangeState::Finishing
        {
            self.state.lane_change_count += 1;
            debug!("Lane change finished (#{})", self.state.lane_change_count);
        }
        self.previous_lane_change = snapshot.lane_change_state;
    }

    fn update_topology(&mut self, snapshot: &VehicleSnapshot, now_ms: u64) {
        let due = self.last_lane_count_ms.map_or(true, |last| {
            now_ms.saturating_sub(last) >= self.config.timings.lane_count_interval_ms
        });
        if due {
            let count = self.estimator.estimate_lane_count(
                snapshot,
                self.config.lane_count_mode,
                self.config.manual_lane_count,
            );
            if count != self.state.topology.lane_count {
                info!("Lane count {} -> {}", self.state.topology.lane_count, count);
            }
            self.state.topology.lane_count = count;
            self.last_lane_count_ms = Some(now_ms);
        }

        let candidate = self
            .estimator
            .estimate_lane(snapshot, self.state.topology.lane_count);
        match self
            .verifier
            .process(candidate, snapshot, &mut self.state, now_ms)
        {
            LaneChangeOutcome::Rejected { .. } | LaneChangeOutcome::RolledBack { .. } => {
                metrics::counter!("lane_change_rejected_total").increment(1);
            }
            LaneChangeOutcome::Confirmed { from, to, .. } => {
                debug!("Lane {} -> {}, net {}", from, to, self.state.net_lane_changes);
            }
            LaneChangeOutcome::Initialized(_) | LaneChangeOutcome::Unchanged => {}
        }
    }

    fn curve_reason(&self, snapshot: &VehicleSnapshot) -> Option<String> {
        let limits = &self.config.curve;
        if snapshot.max_curve >= limits.max_curve {
            Some(format!("sharp curve ahead ({:.2})", snapshot.max_curve))
        } else if snapshot.road_curvature.abs() > limits.curvature_threshold {
            Some(format!("road curvature {:.3}", snapshot.road_curvature))
        } else if snapshot.steering_angle.abs() > limits.steering_threshold {
            Some(format!("steering angle {:.1}deg", snapshot.steering_angle))
        } else {
            None
        }
    }

    /// Abort without touching the excursion: the car may already be moving
    fn cancel_for_curve(&mut self, reason: &str, now_ms: u64) -> Option<Command> {
        warn!("Cancelling overtake: {}", reason);
        // still in progress until the cancel is out, retried next tick
        let command = self.send(CommandKind::CancelOvertake, "true", now_ms).ok()?;
        self.state.phase = ManeuverPhase::Settling {
            outcome: ManeuverOutcome::Cancelled,
            since_ms: now_ms,
        };
        self.state
            .set_status("cancelled", format!("overtake cancelled: {}", reason), now_ms);
        Some(command)
    }

    /// Expire stale excursions. Only runs between manoeuvres.
    fn sweep_excursion(&mut self, snapshot: &VehicleSnapshot, now_ms: u64) {
        if self.state.phase != ManeuverPhase::Idle {
            return;
        }
        let road = snapshot.road_type;
        let timeout_ms = self.config.return_policy(road).timeout_ms;

        if !self.config.return_enabled(road) {
            if self.state.net_lane_changes != 0 || self.state.lane_memory.is_some() {
                debug!("Return disabled on {} roads, clearing the excursion", road);
                self.reset_excursion();
            }
            return;
        }

        if let Some(memory) = self.state.lane_memory {
            if memory.expired(now_ms, timeout_ms) {
                info!("Lane memory expired, no return to lane {}", memory.original_lane);
                self.reset_excursion();
                return;
            }
            if self.state.net_lane_changes == 0
                && self.state.topology.current_lane == memory.original_lane
            {
                info!("Back in original lane {}", memory.original_lane);
                self.reset_excursion();
                return;
            }
        }

        let last = self.state.last_auto_overtake_ms;
        if last > 0 && now_ms.saturating_sub(last) > timeout_ms {
            info!("Return timed out {}ms after the overtake", now_ms - last);
            self.reset_excursion();
        }
    }

    fn supervise(&mut self, maneuver: Maneuver, now_ms: u64) {
        if self.state.lane_change_count > maneuver.start_count {
            self.complete(maneuver, now_ms);
        } else if now_ms.saturating_sub(maneuver.command_ms) > self.config.timings.maneuver_timeout_ms
        {
            self.time_out(maneuver, now_ms);
        }
    }

    fn complete(&mut self, maneuver: Maneuver, now_ms: u64) {
        let (status, reason) = match maneuver.kind {
            ManeuverKind::Overtake => {
                self.state.cooldown.record_success(now_ms);
                self.state.overtakes_completed += 1;
                metrics::counter!("overtake_completed_total").increment(1);
                info!("Overtake {} complete", maneuver.direction);
                ("overtake complete", format!("{} overtake finished", maneuver.direction))
            }
            ManeuverKind::Return => {
                let original = self.state.lane_memory.map(|memory| memory.original_lane);
                let current = self.state.topology.current_lane;
                match original {
                    Some(original) if original != current => {
                        self.state.net_lane_changes = i32::from(original) - i32::from(current);
                        self.state.return_attempts = 0;
                        info!("Return step done, lane {} of original {}", current, original);
                        ("returning", format!("lane {}, heading back to lane {}", current, original))
                    }
                    _ => {
                        self.state.returns_completed += 1;
                        self.reset_excursion();
                        self.state.cooldown.clear();
                        metrics::counter!("overtake_returns_total").increment(1);
                        info!("Returned to original lane {}", current);
                        ("returned", "back in original lane".to_string())
                    }
                }
            }
            ManeuverKind::Manual => {
                self.state.cooldown.record_success(now_ms);
                ("lane change complete", format!("{} lane change finished", maneuver.direction))
            }
        };

        self.state.phase = ManeuverPhase::Settling {
            outcome: ManeuverOutcome::Completed(maneuver.kind),
            since_ms: now_ms,
        };
        self.state.set_status(status, reason, now_ms);
    }

    fn time_out(&mut self, maneuver: Maneuver, now_ms: u64) {
        let timeout_ms = self.config.timings.maneuver_timeout_ms;
        warn!(
            "{:?} {} timed out after {}ms",
            maneuver.kind, maneuver.direction, timeout_ms
        );
        self.state.cooldown.record_failure(now_ms);
        metrics::counter!("overtake_timeouts_total").increment(1);

        // the car may not have moved at all; trust the verified lane
        if let Some(memory) = self.state.lane_memory {
            if self.state.topology.is_known() {
                self.state.net_lane_changes =
                    i32::from(memory.original_lane) - i32::from(self.state.topology.current_lane);
            }
        }

        self.state.phase = ManeuverPhase::Settling {
            outcome: ManeuverOutcome::TimedOut(maneuver.kind),
            since_ms: now_ms,
        };
        self.state.set_status(
            "failed",
            format!("{} lane change not completed within {}s", maneuver.direction, timeout_ms / 1000),
            now_ms,
        );
    }

    fn evaluate_idle(&mut self, snapshot: &VehicleSnapshot, now_ms: u64) -> Option<Command> {
        self.recover_status(now_ms);

        let decision = self.returns.evaluate(snapshot, &mut self.state, now_ms);
        self.return_status = match &decision {
            ReturnDecision::NotApplicable(_) => None,
            ReturnDecision::Waiting(wait) => Some(wait.to_string()),
            ReturnDecision::Ready(plan) => Some(format!(
                "returning {} x{}",
                plan.direction, plan.required_changes
            )),
        };
        if let ReturnDecision::Ready(plan) = decision {
            return self.start_return(plan.direction, now_ms);
        }

        let trigger = self
            .decision
            .evaluate_trigger(snapshot, &mut self.state, now_ms);
        self.conditions = self.decision.conditions(snapshot, &self.state, now_ms);

        let condition = match trigger {
            TriggerDecision::Fire { condition, early } => {
                debug!("Trigger fired: {} (early={})", condition, early);
                condition
            }
            TriggerDecision::Blocked(block) => {
                match &self.return_status {
                    Some(waiting) => self.state.set_reason(waiting.clone()),
                    None => self.state.set_reason(block.to_string()),
                }
                return None;
            }
        };

        match self.decision.select_direction(snapshot, &self.state.topology) {
            DirectionDecision::Execute {
                direction,
                score,
                speed_advantage,
                ..
            } => {
                self.no_overtake.clear();
                info!(
                    "Overtaking {} on {}: score {:.1}, advantage {:+.1}km/h",
                    direction, condition, score, speed_advantage
                );
                self.start_overtake(snapshot, direction, &condition, now_ms)
            }
            DirectionDecision::NoOvertake { reasons, .. } => {
                let summary = reasons
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                debug!("No overtake on {}: {}", condition, summary);
                self.state.set_reason(format!("{}: {}", condition, summary));
                self.no_overtake = reasons;
                None
            }
        }
    }

    fn start_return(&mut self, direction: Direction, now_ms: u64) -> Option<Command> {
        let command = match self.send(CommandKind::Overtake, direction.as_str(), now_ms) {
            Ok(command) => command,
            Err(_) => return None,
        };
        self.state.return_attempts += 1;
        self.state.phase = ManeuverPhase::InProgress(Maneuver {
            kind: ManeuverKind::Return,
            direction,
            start_count: self.state.lane_change_count,
            command_ms: now_ms,
        });
        let target = self
            .state
            .lane_memory
            .map_or_else(|| "original lane".to_string(), |m| format!("lane {}", m.original_lane));
        self.state.set_status(
            "returning",
            format!("returning {} to {} (attempt {})", direction, target, self.state.return_attempts),
            now_ms,
        );
        Some(command)
    }

    fn start_overtake(
        &mut self,
        snapshot: &VehicleSnapshot,
        direction: Direction,
        condition: &TriggerCondition,
        now_ms: u64,
    ) -> Option<Command> {
        let command = match self.send(CommandKind::Overtake, direction.as_str(), now_ms) {
            Ok(command) => command,
            Err(_) => return None,
        };

        if self.config.return_enabled(snapshot.road_type) {
            self.state.start_lane_memory(now_ms);
            self.state.net_lane_changes += direction.net_delta();
            self.state.is_auto_overtake = true;
            self.state.last_auto_overtake_ms = now_ms;
        } else if self.state.net_lane_changes != 0 {
            self.reset_excursion();
        }
        self.state.follow.reset();
        self.state.target_vehicle = None;
        self.state.overtake_complete_timer = None;

        self.state.phase = ManeuverPhase::InProgress(Maneuver {
            kind: ManeuverKind::Overtake,
            direction,
            start_count: self.state.lane_change_count,
            command_ms: now_ms,
        });
        self.state.overtakes_requested += 1;
        self.state
            .set_status("overtaking", format!("{} overtake: {}", direction, condition), now_ms);
        Some(command)
    }

    /// Fall back to "ready" once a non-ready status has gone stale
    fn recover_status(&mut self, now_ms: u64) {
        let status = &self.state.status;
        if status.status != STATUS_READY
            && now_ms.saturating_sub(status.updated_ms) >= self.config.timings.status_idle_ms
        {
            debug!("Status '{}' went stale", status.status);
            self.state.set_status(STATUS_READY, REASON_IDLE, now_ms);
        }
    }

    /// Clear the excursion together with the lane verification history
    fn reset_excursion(&mut self) {
        self.state.reset_net_lane_changes();
        self.verifier.reset();
        self.estimator.clear_lane_history();
    }

    /// On failure the state is left as it was and the next tick re-evaluates
    fn send(&mut self, kind: CommandKind, arg: &str, now_ms: u64) -> Result<Command, SinkError> {
        let command = self.sequencer.next(kind, arg, now_ms);
        match self.sink.send(&command) {
            Ok(()) => {
                metrics::counter!("overtake_commands_total", "cmd" => kind.as_str()).increment(1);
                info!("Command #{}: {} {}", command.index, kind, command.arg);
                Ok(command)
            }
            Err(e) => {
                metrics::counter!("overtake_command_failures_total").increment(1);
                warn!("Command #{} {} not delivered: {}", command.index, kind, e);
                Err(e)
            }
        }
    }

    /// Operator-requested single lane change, outside any excursion
    pub fn manual_lane_change(
        &mut self,
        direction: Direction,
        now_ms: u64,
    ) -> Result<Command, ControllerError> {
        if self.state.lane_change_in_progress() {
            return Err(ControllerError::Busy);
        }
        if self.state.topology.is_known() && !self.state.topology.has_lane(direction) {
            return Err(ControllerError::NoLane(direction.to_string()));
        }

        let command = self.send(CommandKind::LaneChange, direction.as_str(), now_ms)?;
        self.reset_excursion();
        self.state.phase = ManeuverPhase::InProgress(Maneuver {
            kind: ManeuverKind::Manual,
            direction,
            start_count: self.state.lane_change_count,
            command_ms: now_ms,
        });
        self.state
            .set_status("lane change", format!("manual {} lane change", direction), now_ms);
        Ok(command)
    }

    /// Forward a cruise speed request
    pub fn change_speed(&mut self, speed: &str, now_ms: u64) -> Result<Command, ControllerError> {
        let command = self.send(CommandKind::Speed, speed, now_ms)?;
        self.state
            .set_status("speed", format!("cruise speed {}", speed), now_ms);
        Ok(command)
    }

    /// Operator abort of whatever automatic manoeuvre is running
    pub fn cancel_overtake(&mut self, now_ms: u64) -> Result<Command, ControllerError> {
        let command = self.send(CommandKind::CancelOvertake, "true", now_ms)?;
        if self.state.is_overtaking() {
            self.state.phase = ManeuverPhase::Settling {
                outcome: ManeuverOutcome::Cancelled,
                since_ms: now_ms,
            };
            self.state
                .set_status("cancelled", "overtake cancelled by driver", now_ms);
        }
        Ok(command)
    }

    pub fn status(&self, now_ms: u64) -> StatusReport {
        let snapshot = self.last_snapshot.as_ref();
        let road = snapshot.map(|s| s.road_type).unwrap_or_default();
        let lane_warnings = snapshot
            .map(|s| LaneWarnings {
                left: self.decision.lane_warning(s, Direction::Left),
                right: self.decision.lane_warning(s, Direction::Right),
            })
            .unwrap_or_default();
        let return_timeout_ms = self.config.return_policy(road).timeout_ms;

        StatusReport {
            status: self.state.status.status.clone(),
            reason: self.state.status.reason.clone(),
            phase: self.state.phase,
            road_type: road,
            topology: self.state.topology,
            trigger_conditions: self.conditions.iter().map(ToString::to_string).collect(),
            no_overtake_reasons: self.no_overtake.clone(),
            return_status: self.return_status.clone(),
            lane_warnings,
            cooldown_remaining_s: cooldown_remaining_ms(&self.config, &self.state.cooldown, road, now_ms)
                as f64
                / 1000.0,
            return_timeout_remaining_s: self
                .state
                .lane_memory
                .as_ref()
                .map_or(0.0, |m| m.remaining_ms(now_ms, return_timeout_ms) as f64 / 1000.0),
            auto_control_cooldown_s: self
                .decision
                .auto_control_cooldown_remaining(&self.state, now_ms) as f64
                / 1000.0,
            last_result: self.state.cooldown.last_result,
            consecutive_failures: self.state.cooldown.consecutive_failures,
            net_lane_changes: self.state.net_lane_changes,
            original_lane: self.state.lane_memory.as_ref().map(|m| m.original_lane),
            return_attempts: self.state.return_attempts,
            lane_change_count: self.state.lane_change_count,
            overtakes_requested: self.state.overtakes_requested,
            overtakes_completed: self.state.overtakes_completed,
            returns_completed: self.state.returns_completed,
            verification_confidence: self.verifier.confidence(),
            last_command_index: self.sequencer.last_index(),
        }
    }
}
