pub mod command_buffer;
pub mod diagnostics;
pub mod interpolate;
pub mod prediction;
pub mod reconcile;

use crate::game::environment::Environment;
use crate::game::types::{GameStateSnapshot, Point};
use crate::protocol::{decode_server_message, ServerMessage};
use self::command_buffer::{CommandBuffer, PredictionCommand};
use self::diagnostics::Diagnostics;
use self::interpolate::{RenderState, SnapshotInterpolator};
use self::prediction::{PredictionEngine, ReplayStats};
use self::reconcile::Reconciler;
use std::sync::Arc;

/// Low-latency view of the local snake for this frame.
#[derive(Debug, Clone)]
pub struct LocalView {
    pub points: Vec<Point>,
    pub axis: Point,
    pub stats: ReplayStats,
}

#[derive(Debug)]
pub struct FrameSample {
    /// Smoothed state for every player, from the interpolator.
    pub remote: Option<RenderState>,
    /// Predicted-and-reconciled local snake, when seeded.
    pub local: Option<LocalView>,
}

/// Client-side sync pipeline for one room connection: command buffer,
/// parity prediction, reconciliation, and snapshot interpolation, wired the
/// way the render loop consumes them once per display refresh.
#[derive(Debug)]
pub struct ClientSync {
    local_player_id: Option<[u8; 16]>,
    environment: Option<Environment>,
    commands: CommandBuffer,
    prediction: PredictionEngine,
    reconciler: Reconciler,
    interpolator: SnapshotInterpolator,
    last_ack: Option<u16>,
    local_alive: Option<bool>,
    force_hard_correction: bool,
}

impl ClientSync {
    pub fn new(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            local_player_id: None,
            environment: None,
            commands: CommandBuffer::new(),
            prediction: PredictionEngine::new(Arc::clone(&diagnostics)),
            reconciler: Reconciler::new(Arc::clone(&diagnostics)),
            interpolator: SnapshotInterpolator::new(diagnostics),
            last_ack: None,
            local_alive: None,
            force_hard_correction: false,
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.environment.is_some() && !self.interpolator.is_empty()
    }

    /// Feeds one server payload. Returns false when the payload was
    /// malformed or stale (both are dropped, never errors).
    pub fn handle_server_message(&mut self, data: &[u8], received_at: i64) -> bool {
        match decode_server_message(data) {
            Some(ServerMessage::Init {
                player_id,
                environment,
                state,
                ..
            }) => {
                self.local_player_id = Some(*player_id.as_bytes());
                self.environment = Some(environment);
                self.ingest_state(state, received_at)
            }
            Some(ServerMessage::State(state)) => self.ingest_state(state, received_at),
            None => false,
        }
    }

    fn ingest_state(&mut self, state: GameStateSnapshot, received_at: i64) -> bool {
        let ack = state.ack_input_seq;
        let local_view = self.local_player_id.and_then(|local_id| {
            state
                .players
                .iter()
                .find(|player| player.id == local_id)
                .cloned()
        });

        // The interpolator owns staleness: a snapshot it rejects must not
        // touch the command buffer or the prediction base either.
        if !self.interpolator.ingest(state, received_at) {
            return false;
        }

        if let Some(ack) = ack {
            self.commands.prune_acked(ack);
            self.last_ack = Some(ack);
        }

        if let Some(view) = local_view {
            // A death or respawn edge is a structural change; the next
            // reconciliation must not try to blend across it.
            if self.local_alive.is_some() && self.local_alive != Some(view.alive) {
                self.force_hard_correction = true;
            }
            self.local_alive = Some(view.alive);
            self.prediction.rebase(&view, received_at);
        }

        true
    }

    /// Records a locally issued input. Returns how many old commands were
    /// dropped to make room.
    pub fn push_input(&mut self, command: PredictionCommand) -> usize {
        self.commands.enqueue(command)
    }

    /// Produces this frame's render inputs. Invoked once per display
    /// refresh on the same single-threaded loop as `push_input`.
    pub fn sample_frame(&mut self, local_now: i64) -> FrameSample {
        let remote = self.interpolator.sample(local_now);

        let local = match &self.environment {
            Some(environment) => {
                let pending = match self.last_ack {
                    Some(ack) => self.commands.pending_after_ack(ack),
                    None => self.commands.pending_all(),
                };
                self.prediction
                    .predict(&pending, local_now, environment)
                    .map(|result| {
                        let force_hard = std::mem::take(&mut self.force_hard_correction);
                        self.reconciler.observe(&result.points, local_now, force_hard);
                        let points = self
                            .reconciler
                            .sample(local_now)
                            .unwrap_or_else(|| result.points.clone());
                        LocalView {
                            points,
                            axis: result.axis,
                            stats: result.stats,
                        }
                    })
            }
            None => None,
        };

        FrameSample { remote, local }
    }

    /// Disconnect/room-leave: every buffer is cleared and prediction state
    /// returns to unseeded.
    pub fn reset(&mut self) {
        self.local_player_id = None;
        self.environment = None;
        self.commands.clear();
        self.prediction.reset();
        self.reconciler.reset();
        self.interpolator.reset();
        self.last_ack = None;
        self.local_alive = None;
        self.force_hard_correction = false;
    }
}
