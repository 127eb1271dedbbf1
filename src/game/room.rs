use super::constants::{
    BASE_PELLET_COUNT, BOOST_MULTIPLIER, COLOR_POOL, DEATH_PELLET_STRIDE, MAX_PELLETS,
    MAX_SPAWN_ATTEMPTS, PELLET_COLOR_COUNT, PLAYER_TIMEOUT_MS, RESPAWN_COOLDOWN_MS,
    SELF_COLLISION_SKIP_NODES, SNAKE_WIRE_NODE_CAP, SPAWN_CONE_ANGLE, STAMINA_DRAIN_PER_SEC,
    STAMINA_MAX, STAMINA_RECHARGE_PER_SEC, TICK_MS,
};
use super::digestion::{add_digestion, advance_digestions, digestion_progress};
use super::environment::{lake_boundary, Environment, LAKE_EXCLUSION_THRESHOLD, SNAKE_ANGULAR_RADIUS};
use super::math::{clamp, collision, normalize, point_from_spherical, random_axis, rotate_y, rotate_z};
use super::physics::{advance_snake_with_collisions, movement_plan, steer_axis};
use super::snake::{create_snake, rotate_snake};
use super::types::{
    DigestionView, GameStateSnapshot, Pellet, Player, PlayerView, Point, SnakeNode,
};
use crate::app::time::now_millis;
use crate::protocol::{self, seq_newer_than};
use crate::shared::names::sanitize_player_name;
use rand::Rng;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub mod session;
#[cfg(test)]
mod tests;

use self::session::{LatestFrame, SessionInbound, SessionInboundState, SessionIo};

/// One game room: a single authoritative simulation advanced by one
/// fixed-rate task. All mutation goes through the state mutex, so nothing
/// inside a room ever runs concurrently with a tick.
#[derive(Debug)]
pub struct Room {
    state: Mutex<RoomState>,
    running: AtomicBool,
}

#[derive(Debug)]
struct SessionEntry {
    ctl: mpsc::UnboundedSender<Vec<u8>>,
    state_frame: Arc<LatestFrame>,
    inbound: Arc<SessionInbound>,
    player_id: Option<String>,
}

#[derive(Debug)]
struct RoomState {
    sessions: HashMap<String, SessionEntry>,
    players: HashMap<String, Player>,
    pellets: Vec<Pellet>,
    next_pellet_id: u32,
    next_state_seq: u32,
    environment: Environment,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum JsonClientMessage {
    #[serde(rename = "join")]
    Join {
        name: Option<String>,
        #[serde(rename = "playerId")]
        player_id: Option<String>,
        #[serde(rename = "deferSpawn")]
        defer_spawn: Option<bool>,
    },
    #[serde(rename = "respawn")]
    Respawn,
    #[serde(rename = "input")]
    Input {
        seq: u16,
        axis: Option<Point>,
        boost: Option<bool>,
        view: Option<Point>,
    },
}

impl Room {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RoomState::new()),
            running: AtomicBool::new(false),
        }
    }

    pub async fn add_session(&self) -> SessionIo {
        let session_id = Uuid::new_v4().to_string();
        let (ctl_tx, ctl_rx) = mpsc::unbounded_channel();
        let state_frame = Arc::new(LatestFrame::new());
        let inbound = Arc::new(SessionInbound::new());
        let mut state = self.state.lock().await;
        state.sessions.insert(
            session_id.clone(),
            SessionEntry {
                ctl: ctl_tx,
                state_frame: Arc::clone(&state_frame),
                inbound: Arc::clone(&inbound),
                player_id: None,
            },
        );
        SessionIo {
            session_id,
            inbound,
            outbound_state: state_frame,
            outbound_ctl_rx: ctl_rx,
        }
    }

    pub async fn remove_session(&self, session_id: &str) {
        let mut state = self.state.lock().await;
        state.disconnect_session(session_id);
    }

    pub async fn handle_text_message(
        self: &Arc<Self>,
        session_id: &str,
        inbound: &Arc<SessionInbound>,
        text: &str,
    ) {
        let Ok(message) = serde_json::from_str::<JsonClientMessage>(text) else {
            return;
        };
        let message = match message {
            JsonClientMessage::Join {
                name,
                player_id,
                defer_spawn,
            } => {
                let player_id = player_id.and_then(|value| Uuid::parse_str(&value).ok());
                protocol::ClientMessage::Join {
                    name,
                    player_id,
                    defer_spawn: defer_spawn.unwrap_or(false),
                }
            }
            JsonClientMessage::Respawn => protocol::ClientMessage::Respawn,
            JsonClientMessage::Input {
                seq,
                axis,
                boost,
                view,
            } => protocol::ClientMessage::Input {
                seq,
                axis,
                boost: boost.unwrap_or(false),
                view_center: view,
            },
        };
        self.handle_client_message(session_id, inbound, message).await;
    }

    pub async fn handle_binary_message(
        self: &Arc<Self>,
        session_id: &str,
        inbound: &Arc<SessionInbound>,
        data: &[u8],
    ) {
        let Some(message) = protocol::decode_client_message(data) else {
            return;
        };
        self.handle_client_message(session_id, inbound, message).await;
    }

    async fn handle_client_message(
        self: &Arc<Self>,
        session_id: &str,
        inbound: &Arc<SessionInbound>,
        message: protocol::ClientMessage,
    ) {
        match message {
            protocol::ClientMessage::Join {
                name,
                player_id,
                defer_spawn,
            } => {
                let mut state = self.state.lock().await;
                state.handle_join(session_id, name, player_id, defer_spawn);
                drop(state);
                self.ensure_loop();
            }
            protocol::ClientMessage::Respawn => {
                let mut state = self.state.lock().await;
                state.handle_respawn(session_id);
            }
            protocol::ClientMessage::Input {
                seq,
                axis,
                boost,
                view_center,
            } => {
                // Inputs never touch room state directly: they land in the
                // session slot and are applied at the start of the next tick.
                inbound.update_input(seq, axis, boost, view_center);
            }
        }
    }

    fn ensure_loop(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let room = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(TICK_MS));
            loop {
                interval.tick().await;
                let mut state = room.state.lock().await;
                if state.sessions.is_empty() {
                    room.running.store(false, Ordering::SeqCst);
                    break;
                }
                state.tick();
            }
        });
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_score_gain(player: &mut Player, units: f64) {
    player.score_fraction += units.max(0.0);
    while player.score_fraction >= 1.0 {
        player.score += 1;
        player.score_fraction -= 1.0;
    }
}

impl RoomState {
    fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            players: HashMap::new(),
            pellets: Vec::new(),
            next_pellet_id: 0,
            next_state_seq: 1,
            environment: Environment::generate(),
        }
    }

    fn disconnect_session(&mut self, session_id: &str) {
        let Some(entry) = self.sessions.remove(session_id) else {
            return;
        };
        if let Some(player_id) = entry.player_id {
            if let Some(player) = self.players.get_mut(&player_id) {
                player.connected = false;
                player.last_seen = now_millis();
            }
        }
    }

    fn handle_join(
        &mut self,
        session_id: &str,
        name: Option<String>,
        player_id: Option<Uuid>,
        defer_spawn: bool,
    ) {
        let raw_name = name.unwrap_or_else(|| "Player".to_string());
        let sanitized_name = sanitize_player_name(&raw_name, "Player");
        let view_center = self
            .sessions
            .get(session_id)
            .map(|session| session.inbound.snapshot().view_center)
            .unwrap_or(None);

        let player_id = if let Some(id) = player_id {
            let id_string = id.to_string();
            if let Some(player) = self.players.get_mut(&id_string) {
                player.name = sanitized_name;
                player.connected = true;
                player.last_seen = now_millis();
                id_string
            } else {
                let new_player = self.create_player(id, sanitized_name, defer_spawn, view_center);
                self.players.insert(id_string.clone(), new_player);
                id_string
            }
        } else {
            let id = Uuid::new_v4();
            let id_string = id.to_string();
            let new_player = self.create_player(id, sanitized_name, defer_spawn, view_center);
            self.players.insert(id_string.clone(), new_player);
            id_string
        };

        tracing::debug!(player_id = player_id.as_str(), session_id, "player joined");
        let payload = self.build_init_payload(&player_id);
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.player_id = Some(player_id);
            let _ = session.ctl.send(payload);
        }
    }

    fn handle_respawn(&mut self, session_id: &str) {
        let Some(player_id) = self.session_player_id(session_id) else {
            return;
        };
        let should_respawn = match self.players.get(&player_id) {
            Some(player) => {
                if player.alive {
                    false
                } else if let Some(respawn_at) = player.respawn_at {
                    now_millis() >= respawn_at
                } else {
                    true
                }
            }
            None => false,
        };
        if should_respawn {
            self.respawn_player(&player_id);
        }
    }

    fn session_player_id(&self, session_id: &str) -> Option<String> {
        self.sessions
            .get(session_id)
            .and_then(|entry| entry.player_id.clone())
    }

    fn create_player(
        &self,
        id: Uuid,
        name: String,
        defer_spawn: bool,
        view_center: Option<Point>,
    ) -> Player {
        let base_axis = random_axis();
        let (alive, axis, snake, respawn_at) = if defer_spawn {
            (false, base_axis, Vec::new(), Some(now_millis()))
        } else {
            let spawned = self.spawn_snake(base_axis, view_center);
            (true, spawned.axis, spawned.snake, None)
        };

        let id_string = id.to_string();

        Player {
            id: id_string,
            id_bytes: *id.as_bytes(),
            name,
            color: COLOR_POOL[self.players.len() % COLOR_POOL.len()].to_string(),
            skin: (self.players.len() % COLOR_POOL.len()) as u8,
            axis,
            target_axis: axis,
            boost: false,
            is_boosting: false,
            stamina: STAMINA_MAX,
            score: 0,
            score_fraction: 0.0,
            alive,
            connected: true,
            last_seen: now_millis(),
            last_input_seq: None,
            respawn_at,
            snake,
            tail_extension: 0.0,
            next_digestion_id: 0,
            digestions: Vec::new(),
        }
    }

    /// Bounded-retry spawn placement. A candidate is rejected while it
    /// overlaps a living snake or sits inside a lake; after the retry budget
    /// the last candidate is accepted as-is so a join can never stall.
    fn spawn_snake(&self, base_axis: Point, view_center: Option<Point>) -> SpawnedSnake {
        let mut rng = rand::thread_rng();
        let mut fallback: Option<SpawnedSnake> = None;

        for attempt in 0..MAX_SPAWN_ATTEMPTS {
            let axis_seed = if attempt == 0 { base_axis } else { random_axis() };
            let mut snake = create_snake(axis_seed);

            // Early attempts bias toward the joining client's camera view so
            // the spawn lands somewhere the player is already looking.
            let (theta, phi) = match view_center {
                Some(center) if attempt < MAX_SPAWN_ATTEMPTS / 2 => {
                    let theta = (-center.y).atan2(-center.x)
                        + (rng.gen::<f64>() - 0.5) * SPAWN_CONE_ANGLE;
                    let phi = clamp(
                        clamp(center.z, -1.0, 1.0).acos()
                            + (rng.gen::<f64>() - 0.5) * SPAWN_CONE_ANGLE,
                        0.1,
                        std::f64::consts::PI - 0.1,
                    );
                    (theta, phi)
                }
                _ => {
                    let theta = rng.gen::<f64>() * std::f64::consts::PI * 2.0;
                    let phi = std::f64::consts::PI - rng.gen::<f64>() * SPAWN_CONE_ANGLE;
                    (theta, phi)
                }
            };
            let rotate_y_angle = std::f64::consts::PI - phi;

            rotate_snake(&mut snake, theta, rotate_y_angle);
            let mut rotated_axis = axis_seed;
            rotate_y(&mut rotated_axis, rotate_y_angle);
            rotate_z(&mut rotated_axis, theta);
            let axis = normalize(rotated_axis);

            let head_in_lake = snake
                .first()
                .map(|node| {
                    lake_boundary(normalize(node.position()), &self.environment.lakes)
                        > LAKE_EXCLUSION_THRESHOLD
                })
                .unwrap_or(false);

            let candidate = SpawnedSnake { snake, axis };
            if !head_in_lake && !self.is_snake_too_close(&candidate.snake) {
                return candidate;
            }
            fallback = Some(candidate);
        }

        fallback.unwrap_or_else(|| SpawnedSnake {
            snake: create_snake(base_axis),
            axis: base_axis,
        })
    }

    fn is_snake_too_close(&self, snake: &[SnakeNode]) -> bool {
        if snake.is_empty() {
            return false;
        }

        let candidate_points: Vec<Point> =
            snake.iter().map(|node| node.position()).collect();

        for player in self.players.values() {
            if !player.alive {
                continue;
            }
            for node in &player.snake {
                let node_point = node.position();
                for candidate in &candidate_points {
                    if collision(*candidate, node_point) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn spawn_pellet(&mut self, size: f64) {
        let mut rng = rand::thread_rng();
        let theta = rng.gen::<f64>() * std::f64::consts::PI * 2.0;
        let phi = rng.gen::<f64>() * std::f64::consts::PI;
        let id = self.next_pellet_id;
        self.next_pellet_id = self.next_pellet_id.wrapping_add(1);
        self.pellets.push(Pellet {
            id,
            normal: point_from_spherical(theta, phi),
            color_index: (id % PELLET_COLOR_COUNT as u32) as u8,
            size,
        });
    }

    fn ensure_pellets(&mut self) {
        while self.pellets.len() < BASE_PELLET_COUNT {
            self.spawn_pellet(1.0);
        }
    }

    fn apply_queued_inputs(&mut self) {
        let inputs: Vec<(String, SessionInboundState)> = self
            .sessions
            .values()
            .filter_map(|session| {
                session
                    .player_id
                    .as_ref()
                    .map(|player_id| (player_id.clone(), session.inbound.snapshot()))
            })
            .collect();

        for (player_id, input) in inputs {
            let Some(player) = self.players.get_mut(&player_id) else {
                continue;
            };
            if let Some(seq) = input.input_seq {
                let newer = player
                    .last_input_seq
                    .map_or(true, |current| seq_newer_than(seq, current));
                if newer {
                    player.last_input_seq = Some(seq);
                    if let Some(axis) = input.input_axis {
                        player.target_axis = axis;
                    }
                    player.boost = input.boost;
                }
            }
            if input.last_input_at > player.last_seen {
                player.last_seen = input.last_input_at;
            }
        }
    }

    fn tick(&mut self) {
        let now = now_millis();
        let dt_seconds = TICK_MS as f64 / 1000.0;
        self.ensure_pellets();

        self.players.retain(|_, player| {
            player.connected || now - player.last_seen <= PLAYER_TIMEOUT_MS
        });

        self.apply_queued_inputs();

        let mut move_steps: HashMap<String, i32> = HashMap::new();
        let player_ids: Vec<String> = self.players.keys().cloned().collect();
        for id in &player_ids {
            let Some(player) = self.players.get_mut(id) else {
                continue;
            };
            if !player.alive {
                continue;
            }
            let wants_boost = player.boost;
            let is_boosting = wants_boost && player.stamina > 0.0;
            player.is_boosting = is_boosting;
            if is_boosting {
                player.stamina = (player.stamina - STAMINA_DRAIN_PER_SEC * dt_seconds).max(0.0);
            } else if !wants_boost {
                player.stamina =
                    (player.stamina + STAMINA_RECHARGE_PER_SEC * dt_seconds).min(STAMINA_MAX);
            }
            let speed_factor = if is_boosting { BOOST_MULTIPLIER } else { 1.0 };
            player.axis = steer_axis(
                player.axis,
                player.target_axis,
                player.snake.len(),
                speed_factor,
            );
            let (steps, step_velocity) = movement_plan(speed_factor);
            let mut axis = player.axis;
            advance_snake_with_collisions(
                &mut player.snake,
                &mut axis,
                SNAKE_ANGULAR_RADIUS,
                step_velocity,
                steps,
                &self.environment,
            );
            player.axis = axis;
            move_steps.insert(id.clone(), steps);
        }

        let position_snapshots: Vec<(String, bool, Vec<Point>)> = self
            .players
            .values()
            .map(|player| {
                let points = player.snake.iter().map(|node| node.position()).collect();
                (player.id.clone(), player.alive, points)
            })
            .collect();

        let mut dead: HashSet<String> = HashSet::new();
        for (id, alive, snake) in &position_snapshots {
            if !*alive || snake.len() <= SELF_COLLISION_SKIP_NODES {
                continue;
            }
            let head = snake[0];
            for node in snake.iter().skip(SELF_COLLISION_SKIP_NODES) {
                if collision(head, *node) {
                    dead.insert(id.clone());
                    break;
                }
            }
            if dead.contains(id) {
                continue;
            }
            for (other_id, other_alive, other_snake) in &position_snapshots {
                if !*other_alive || other_id == id {
                    continue;
                }
                for node in other_snake {
                    if collision(head, *node) {
                        dead.insert(id.clone());
                        break;
                    }
                }
                if dead.contains(id) {
                    break;
                }
            }
        }

        for id in dead {
            self.handle_death(&id);
        }

        // Digestions enqueued by this tick's feeding start counting next
        // tick, so advance the existing ones first.
        for id in &player_ids {
            let Some(player) = self.players.get_mut(id) else {
                continue;
            };
            if !player.alive {
                continue;
            }
            let steps = *move_steps.get(id).unwrap_or(&1);
            advance_digestions(player, steps);
        }

        for id in &player_ids {
            let Some(player) = self.players.get_mut(id) else {
                continue;
            };
            if !player.alive || player.snake.is_empty() {
                continue;
            }
            let head = player.snake[0].position();
            let mut eaten = 0usize;
            let mut i = self.pellets.len();
            while i > 0 {
                i -= 1;
                if !collision(head, self.pellets[i].normal) {
                    continue;
                }
                let pellet = self.pellets.remove(i);
                apply_score_gain(player, pellet.size);
                add_digestion(player, pellet.size);
                eaten += 1;
            }
            for _ in 0..eaten {
                if self.pellets.len() < MAX_PELLETS {
                    self.spawn_pellet(1.0);
                }
            }
        }

        self.broadcast_state(now);
    }

    fn handle_death(&mut self, player_id: &str) {
        let Some(player) = self.players.get_mut(player_id) else {
            return;
        };
        if !player.alive {
            return;
        }
        tracing::debug!(player_id, score = player.score, "player died");
        player.alive = false;
        player.respawn_at = Some(now_millis() + RESPAWN_COOLDOWN_MS);
        player.digestions.clear();
        player.tail_extension = 0.0;

        let scattered: Vec<Point> = player
            .snake
            .iter()
            .skip(1)
            .step_by(DEATH_PELLET_STRIDE)
            .map(|node| node.position())
            .collect();
        player.snake.clear();
        player.score = 0;
        player.score_fraction = 0.0;

        for normal in scattered {
            let id = self.next_pellet_id;
            self.next_pellet_id = self.next_pellet_id.wrapping_add(1);
            self.pellets.push(Pellet {
                id,
                normal,
                color_index: (id % PELLET_COLOR_COUNT as u32) as u8,
                size: 0.75,
            });
        }

        let pellet_cap = u16::MAX as usize;
        if self.pellets.len() > pellet_cap {
            let excess = self.pellets.len() - pellet_cap;
            self.pellets.drain(0..excess);
        }
    }

    fn respawn_player(&mut self, player_id: &str) {
        let view_center = self
            .sessions
            .values()
            .find(|session| session.player_id.as_deref() == Some(player_id))
            .map(|session| session.inbound.snapshot().view_center)
            .unwrap_or(None);
        let spawned = self.spawn_snake(random_axis(), view_center);
        let Some(player) = self.players.get_mut(player_id) else {
            return;
        };
        player.axis = spawned.axis;
        player.target_axis = spawned.axis;
        player.score = 0;
        player.score_fraction = 0.0;
        player.alive = true;
        player.boost = false;
        player.is_boosting = false;
        player.stamina = STAMINA_MAX;
        player.respawn_at = None;
        player.snake = spawned.snake;
        player.tail_extension = 0.0;
        player.digestions.clear();
        tracing::debug!(player_id, "player respawned");
    }

    fn player_view(player: &Player) -> PlayerView {
        let window_len = player.snake.len().min(SNAKE_WIRE_NODE_CAP);
        PlayerView {
            id: player.id_bytes,
            name: player.name.clone(),
            color: player.color.clone(),
            skin: player.skin,
            score: player.score,
            score_fraction: player.score_fraction,
            stamina: player.stamina,
            boosting: player.is_boosting,
            alive: player.alive,
            axis: player.axis,
            snake: player
                .snake
                .iter()
                .take(window_len)
                .map(|node| node.position())
                .collect(),
            total_snake_len: player.snake.len() as u32,
            tail_extension: player.tail_extension,
            digestions: player
                .digestions
                .iter()
                .map(|digestion| DigestionView {
                    id: digestion.id,
                    progress: digestion_progress(digestion),
                })
                .collect(),
        }
    }

    fn build_snapshot(&self, now: i64, seq: u32, ack_input_seq: Option<u16>) -> GameStateSnapshot {
        GameStateSnapshot {
            now,
            seq,
            ack_input_seq,
            pellets: self.pellets.clone(),
            players: self.players.values().map(Self::player_view).collect(),
        }
    }

    fn build_init_payload(&mut self, player_id: &str) -> Vec<u8> {
        // Consumes a state sequence number so the init snapshot orders
        // cleanly against the tick broadcasts around it.
        let seq = self.next_state_seq;
        self.next_state_seq = self.next_state_seq.wrapping_add(1);
        let player = self.players.get(player_id);
        let id_bytes = player.map(|player| player.id_bytes).unwrap_or([0u8; 16]);
        let ack = player.and_then(|player| player.last_input_seq);
        let snapshot = self.build_snapshot(now_millis(), seq, ack);
        protocol::encode_init(&id_bytes, &self.environment, &snapshot)
    }

    fn broadcast_state(&mut self, now: i64) {
        let seq = self.next_state_seq;
        self.next_state_seq = self.next_state_seq.wrapping_add(1);
        for session in self.sessions.values() {
            let ack = session
                .player_id
                .as_ref()
                .and_then(|player_id| self.players.get(player_id))
                .and_then(|player| player.last_input_seq);
            let snapshot = self.build_snapshot(now, seq, ack);
            session.state_frame.store(protocol::encode_state(&snapshot));
        }
    }
}

#[derive(Debug)]
struct SpawnedSnake {
    snake: Vec<SnakeNode>,
    axis: Point,
}
