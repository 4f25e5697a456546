//! Dynamic cooldown between overtakes

use overtake_model::{CooldownState, OvertakeConfig, OvertakeResult, RoadType};

/// Cooldown length for the current outcome history and road type (ms)
pub fn dynamic_cooldown_ms(config: &OvertakeConfig, cooldown: &CooldownState, road: RoadType) -> u64 {
    let timings = &config.cooldown;
    let mut base = match cooldown.last_result {
        OvertakeResult::Success => timings.success_ms,
        OvertakeResult::Failed => timings.failed_ms,
        OvertakeResult::Condition => timings.condition_ms,
        OvertakeResult::None => timings.base_ms,
    };

    if cooldown.consecutive_failures > 3 {
        let penalty = u64::from(cooldown.consecutive_failures) * timings.failure_step_ms;
        base += penalty.min(timings.max_failure_penalty_ms);
    }

    match road {
        RoadType::Highway => ((base as f64 * 0.8).round() as u64).max(timings.highway_floor_ms),
        RoadType::Normal => (base as f64 * 1.2).round() as u64,
    }
}

/// Time left before another overtake may start, zero when none was recorded
pub fn cooldown_remaining_ms(
    config: &OvertakeConfig,
    cooldown: &CooldownState,
    road: RoadType,
    now_ms: u64,
) -> u64 {
    if cooldown.last_maneuver_ms == 0 {
        return 0;
    }
    let elapsed = now_ms.saturating_sub(cooldown.last_maneuver_ms);
    dynamic_cooldown_ms(config, cooldown, road).saturating_sub(elapsed)
}
