use super::constants::{DIGESTION_GROWTH_STEPS, DIGESTION_TRAVEL_SPEED_MULT, NODE_QUEUE_SIZE};
use super::math::clamp;
use super::snake::add_snake_node_for_growth;
use super::types::{Digestion, Player};

/// Enqueues a digestion for one swallowed pellet. The travel window scales
/// with body length so the visible bulge moves at a constant angular speed;
/// the final `DIGESTION_GROWTH_STEPS` decrements are the growth phase.
pub fn add_digestion(player: &mut Player, growth_units: f64) {
    let growth_units = growth_units.max(0.0);
    if growth_units <= 0.0 {
        return;
    }
    let travel_steps = (((player.snake.len().saturating_sub(1)) * NODE_QUEUE_SIZE) as f64
        / DIGESTION_TRAVEL_SPEED_MULT)
        .round()
        .max(1.0) as i64;
    let total = travel_steps + DIGESTION_GROWTH_STEPS;
    let id = player.next_digestion_id;
    player.next_digestion_id = player.next_digestion_id.wrapping_add(1);
    player.digestions.push(Digestion {
        id,
        remaining: total,
        total,
        growth_steps: DIGESTION_GROWTH_STEPS,
        growth_units,
        applied_growth: 0.0,
    });
}

/// Advances every digestion by `steps` movement sub-steps. Growth-phase
/// digestions pay their units into the tail extension; at most one full node
/// is committed per sub-step, so a burst of arrivals grows the chain over
/// several steps instead of popping multiple nodes at once.
pub fn advance_digestions(player: &mut Player, steps: i32) {
    let step_count = steps.max(1);
    for _ in 0..step_count {
        for digestion in &mut player.digestions {
            digestion.remaining -= 1;
            if digestion.remaining < digestion.growth_steps {
                let per_step = digestion.growth_units / digestion.growth_steps.max(1) as f64;
                let residual = (digestion.growth_units - digestion.applied_growth).max(0.0);
                let delta = per_step.min(residual);
                digestion.applied_growth += delta;
                player.tail_extension += delta;
            }
        }

        player
            .digestions
            .retain(|digestion| {
                digestion.remaining > 0
                    || digestion.growth_units - digestion.applied_growth > 1e-9
            });

        // Tolerance covers payout rounding: N equal fractions of one unit
        // can sum to just under 1.0.
        if player.tail_extension >= 1.0 - 1e-9 {
            add_snake_node_for_growth(&mut player.snake, player.axis);
            player.tail_extension = (player.tail_extension - 1.0).max(0.0);
        }
    }
}

/// Travel progress in [0, 1]: 0 at the head, 1 when the bulge reaches the
/// tail and the growth phase begins.
pub fn digestion_progress(digestion: &Digestion) -> f64 {
    let travel_total = (digestion.total - digestion.growth_steps).max(1) as f64;
    let travel_remaining = (digestion.remaining - digestion.growth_steps).max(0) as f64;
    clamp(1.0 - travel_remaining / travel_total, 0.0, 1.0)
}
