use super::command_buffer::PredictionCommand;
use super::diagnostics::Diagnostics;
use crate::game::constants::{
    BOOST_MULTIPLIER, STAMINA_DRAIN_PER_SEC, STAMINA_MAX, STAMINA_RECHARGE_PER_SEC, TICK_MS,
};
use crate::game::environment::{Environment, SNAKE_ANGULAR_RADIUS};
use crate::game::history::HistoryRing;
use crate::game::math::{normalize, rotate_around_axis, rotation_between};
use crate::game::physics::{advance_snake_with_collisions, movement_plan, steer_axis};
use crate::game::types::{PlayerView, Point, SnakeNode};
use std::sync::Arc;

/// Hard cap on replayed ticks; a stalled clock or network must not let the
/// replay window grow without bound.
pub const MAX_REPLAY_TICKS: usize = 4;

/// Client-side mirror of the local snake: chain nodes with their history
/// rings plus the movement state the authoritative loop would carry.
#[derive(Debug, Clone)]
pub struct SnakeParityState {
    pub nodes: Vec<SnakeNode>,
    pub axis: Point,
    pub target_axis: Point,
    pub stamina: f64,
    pub boost: bool,
    pub received_at: i64,
}

pub fn parity_state_from_points(points: &[Point], axis: Point, received_at: i64) -> SnakeParityState {
    let nodes = points
        .iter()
        .map(|point| {
            let unit = normalize(*point);
            SnakeNode {
                x: unit.x,
                y: unit.y,
                z: unit.z,
                history: HistoryRing::new(),
            }
        })
        .collect();
    let axis = normalize(axis);
    SnakeParityState {
        nodes,
        axis,
        target_axis: axis,
        stamina: STAMINA_MAX,
        boost: false,
        received_at,
    }
}

pub fn points_from_parity_state(state: &SnakeParityState) -> Vec<Point> {
    state.nodes.iter().map(|node| node.position()).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReplayStats {
    pub ticks_replayed: usize,
    pub ticks_dropped: usize,
    pub commands_coalesced: usize,
}

#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub points: Vec<Point>,
    pub axis: Point,
    pub stats: ReplayStats,
}

/// Replays unacknowledged inputs on top of the latest authoritative base
/// using the exact movement kernel the server runs, so the divergence the
/// reconciler sees is normally just network timing, not physics drift.
#[derive(Debug)]
pub struct PredictionEngine {
    state: Option<SnakeParityState>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl PredictionEngine {
    pub fn new(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            state: None,
            diagnostics,
        }
    }

    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&SnakeParityState> {
        self.state.as_ref()
    }

    pub fn reset(&mut self) {
        self.state = None;
    }

    /// Rebase onto a fresh authoritative view of the local snake.
    ///
    /// When the chain length is unchanged, each node and its history ring is
    /// carried over by the minimal rotation that maps the old position onto
    /// the new one, preserving sub-tick phase. On a length change (growth,
    /// death, first snapshot) the parity state is rebuilt from the points.
    pub fn rebase(&mut self, view: &PlayerView, received_at: i64) {
        let fresh: Vec<Point> = view.snake.iter().map(|point| normalize(*point)).collect();

        match &mut self.state {
            Some(state) if !fresh.is_empty() && state.nodes.len() == fresh.len() => {
                for (node, new_point) in state.nodes.iter_mut().zip(&fresh) {
                    if let Some((axis, angle)) = rotation_between(node.position(), *new_point) {
                        for slot in node.history.iter_mut() {
                            let Some(mut queued) = slot.take() else {
                                continue;
                            };
                            rotate_around_axis(&mut queued, axis, angle);
                            *slot = Some(normalize(queued));
                        }
                    }
                    node.set_position(*new_point);
                }
                state.axis = normalize(view.axis);
                state.target_axis = state.axis;
                state.stamina = view.stamina;
                state.boost = view.boosting;
                state.received_at = received_at;
            }
            _ => {
                let mut state = parity_state_from_points(&fresh, view.axis, received_at);
                state.stamina = view.stamina;
                state.boost = view.boosting;
                self.state = Some(state);
            }
        }
    }

    /// Computes the best-guess current chain by replaying buffered commands
    /// over the rebased state. Pure in its inputs and deterministic: calling
    /// it again with the same commands, clock, and environment returns a
    /// bit-identical result, which is exactly what the render loop does
    /// every frame until the next snapshot arrives.
    pub fn predict(
        &self,
        commands: &[PredictionCommand],
        local_now: i64,
        env: &Environment,
    ) -> Option<PredictionResult> {
        let state = self.state.as_ref()?;
        let mut nodes = state.nodes.clone();
        let mut axis = state.axis;
        let mut target_axis = state.target_axis;
        let mut stamina = state.stamina;
        let mut boost = state.boost;

        if nodes.is_empty() {
            return Some(PredictionResult {
                points: Vec::new(),
                axis,
                stats: ReplayStats::default(),
            });
        }

        let elapsed = (local_now - state.received_at).max(0) as u64;
        let total_ticks = (elapsed / TICK_MS) as usize;
        let ticks_replayed = total_ticks.min(MAX_REPLAY_TICKS);
        let ticks_dropped = total_ticks - ticks_replayed;

        let dt_seconds = TICK_MS as f64 / 1000.0;
        let mut commands_coalesced = 0usize;
        let mut command_index = 0usize;

        for tick_index in 0..ticks_replayed {
            // Coalesce every command whose send time falls inside this tick
            // window; the last one wins.
            let window_end = state.received_at + (tick_index as i64 + 1) * TICK_MS as i64;
            let mut in_window = 0usize;
            while command_index < commands.len() && commands[command_index].sent_at < window_end {
                let command = commands[command_index];
                if let Some(axis_target) = command.target_axis {
                    target_axis = normalize(axis_target);
                }
                boost = command.boost;
                in_window += 1;
                command_index += 1;
            }
            if in_window > 1 {
                commands_coalesced += in_window - 1;
            }

            // Identical sub-stepping to the authoritative tick.
            let is_boosting = boost && stamina > 0.0;
            if is_boosting {
                stamina = (stamina - STAMINA_DRAIN_PER_SEC * dt_seconds).max(0.0);
            } else if !boost {
                stamina = (stamina + STAMINA_RECHARGE_PER_SEC * dt_seconds).min(STAMINA_MAX);
            }
            let speed_factor = if is_boosting { BOOST_MULTIPLIER } else { 1.0 };
            axis = steer_axis(axis, target_axis, nodes.len(), speed_factor);
            let (steps, step_velocity) = movement_plan(speed_factor);
            advance_snake_with_collisions(
                &mut nodes,
                &mut axis,
                SNAKE_ANGULAR_RADIUS,
                step_velocity,
                steps,
                env,
            );
        }

        self.diagnostics
            .record("prediction.ticks_replayed", ticks_replayed as f64);
        if commands_coalesced > 0 {
            self.diagnostics
                .record("prediction.commands_coalesced", commands_coalesced as f64);
        }
        if ticks_dropped > 0 {
            self.diagnostics
                .record("prediction.ticks_dropped", ticks_dropped as f64);
        }

        Some(PredictionResult {
            points: nodes.iter().map(|node| node.position()).collect(),
            axis,
            stats: ReplayStats {
                ticks_replayed,
                ticks_dropped,
                commands_coalesced,
            },
        })
    }
}
