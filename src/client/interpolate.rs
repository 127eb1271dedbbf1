use super::diagnostics::Diagnostics;
use crate::game::constants::TICK_MS;
use crate::game::math::{normalize, slerp};
use crate::game::types::{GameStateSnapshot, PlayerView, Point};
use std::collections::VecDeque;
use std::sync::Arc;

pub const SNAPSHOT_BUFFER_CAPACITY: usize = 20;
/// The playout delay never drops below this floor, whatever the measured
/// tick interval says.
pub const PLAYOUT_DELAY_FLOOR_MS: f64 = 40.0;
/// Past the newest snapshot the blend factor extends linearly for at most
/// this long before freezing.
pub const EXTRAPOLATION_WINDOW_MS: f64 = 150.0;

const OFFSET_SMOOTHING: f64 = 0.1;
const INTERVAL_SMOOTHING: f64 = 0.1;
const PLAYOUT_INTERVAL_MULT: f64 = 1.5;

#[derive(Debug, Clone)]
struct BufferedSnapshot {
    received_at: i64,
    state: GameStateSnapshot,
}

#[derive(Debug, Clone)]
pub struct RenderDigestion {
    pub id: u32,
    pub progress: f64,
    pub alpha: f64,
}

#[derive(Debug, Clone)]
pub struct RenderPellet {
    pub id: u32,
    pub normal: Point,
    pub color_index: u8,
    pub size: f64,
    pub alpha: f64,
}

#[derive(Debug, Clone)]
pub struct RenderPlayer {
    pub id: [u8; 16],
    pub name: String,
    pub color: String,
    pub skin: u8,
    pub alive: bool,
    pub boosting: bool,
    pub score: i64,
    pub score_fraction: f64,
    pub stamina: f64,
    pub axis: Point,
    pub points: Vec<Point>,
    pub tail_extension: f64,
    pub alpha: f64,
    pub digestions: Vec<RenderDigestion>,
}

/// One consistent view of the whole room at an arbitrary render timestamp.
#[derive(Debug, Clone)]
pub struct RenderState {
    pub render_time: f64,
    pub players: Vec<RenderPlayer>,
    pub pellets: Vec<RenderPellet>,
}

/// Turns the sparse stream of authoritative snapshots into a smooth render
/// feed for every player. Keeps a short ring of timestamped snapshots, a
/// smoothed server-clock offset, and renders at a playout delay behind the
/// estimated server time, extrapolating briefly across gaps.
#[derive(Debug)]
pub struct SnapshotInterpolator {
    buffer: VecDeque<BufferedSnapshot>,
    clock_offset_ms: Option<f64>,
    smoothed_interval_ms: f64,
    last_server_time: Option<i64>,
    latest_seq: Option<u32>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl SnapshotInterpolator {
    pub fn new(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            buffer: VecDeque::with_capacity(SNAPSHOT_BUFFER_CAPACITY),
            clock_offset_ms: None,
            smoothed_interval_ms: TICK_MS as f64,
            last_server_time: None,
            latest_seq: None,
            diagnostics,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.clock_offset_ms = None;
        self.smoothed_interval_ms = TICK_MS as f64;
        self.last_server_time = None;
        self.latest_seq = None;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffers a snapshot. Stale or duplicate deliveries (by sequence) are
    /// discarded and return false.
    pub fn ingest(&mut self, state: GameStateSnapshot, received_at: i64) -> bool {
        if let Some(latest) = self.latest_seq {
            if state.seq <= latest {
                self.diagnostics.record("interpolate.stale_dropped", 1.0);
                return false;
            }
        }
        self.latest_seq = Some(state.seq);

        let offset_sample = (state.now - received_at) as f64;
        self.clock_offset_ms = Some(match self.clock_offset_ms {
            None => offset_sample,
            Some(previous) => previous + (offset_sample - previous) * OFFSET_SMOOTHING,
        });

        if let Some(previous_time) = self.last_server_time {
            let interval = (state.now - previous_time) as f64;
            if interval > 0.0 {
                self.smoothed_interval_ms +=
                    (interval - self.smoothed_interval_ms) * INTERVAL_SMOOTHING;
            }
        }
        self.last_server_time = Some(state.now);

        self.buffer.push_back(BufferedSnapshot { received_at, state });
        while self.buffer.len() > SNAPSHOT_BUFFER_CAPACITY {
            self.buffer.pop_front();
        }

        // Drop history that has fallen more than one extrapolation window
        // behind the current render time.
        let render = self.render_time(received_at);
        while self.buffer.len() > 2 {
            let Some(front) = self.buffer.front() else {
                break;
            };
            if (front.state.now as f64) < render - EXTRAPOLATION_WINDOW_MS {
                self.buffer.pop_front();
            } else {
                break;
            }
        }

        true
    }

    pub fn playout_delay_ms(&self) -> f64 {
        PLAYOUT_DELAY_FLOOR_MS.max(self.smoothed_interval_ms * PLAYOUT_INTERVAL_MULT)
    }

    /// Server-timeline timestamp this client should be rendering right now.
    pub fn render_time(&self, local_now: i64) -> f64 {
        local_now as f64 + self.clock_offset_ms.unwrap_or(0.0) - self.playout_delay_ms()
    }

    /// Blended state for `local_now`, or None before the first snapshot.
    pub fn sample(&self, local_now: i64) -> Option<RenderState> {
        let newest = self.buffer.back()?;
        if self.buffer.len() == 1 {
            return Some(blend_states(&newest.state, &newest.state, 0.0, newest.state.now as f64));
        }

        let render = self.render_time(local_now);
        let newest_time = newest.state.now as f64;

        if render >= newest_time {
            // Beyond the newest snapshot: extend the last observed interval
            // linearly for a bounded window, then freeze.
            let previous = &self.buffer[self.buffer.len() - 2];
            let interval = (newest_time - previous.state.now as f64).max(1.0);
            let beyond = render - newest_time;
            if beyond <= EXTRAPOLATION_WINDOW_MS {
                let t = 1.0 + beyond / interval;
                return Some(blend_states(&previous.state, &newest.state, t, render));
            }
            self.diagnostics.record("interpolate.frozen", beyond);
            return Some(blend_states(&previous.state, &newest.state, 1.0, render));
        }

        let front = self.buffer.front()?;
        if render <= front.state.now as f64 {
            return Some(blend_states(&front.state, &front.state, 0.0, render));
        }

        for pair in 0..self.buffer.len() - 1 {
            let a = &self.buffer[pair];
            let b = &self.buffer[pair + 1];
            let a_time = a.state.now as f64;
            let b_time = b.state.now as f64;
            if render >= a_time && render <= b_time {
                let t = if b_time > a_time {
                    (render - a_time) / (b_time - a_time)
                } else {
                    0.0
                };
                return Some(blend_states(&a.state, &b.state, t, render));
            }
        }

        Some(blend_states(&newest.state, &newest.state, 0.0, render))
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Blends two snapshots at factor `t` (past 1.0 while extrapolating).
/// Identity-matched by id throughout; one-sided entries fade in or out.
pub(crate) fn blend_states(a: &GameStateSnapshot, b: &GameStateSnapshot, t: f64, render_time: f64) -> RenderState {
    let fade_in = t.clamp(0.0, 1.0);
    let fade_out = 1.0 - fade_in;

    let mut pellets = Vec::with_capacity(b.pellets.len());
    for pellet_b in &b.pellets {
        match a.pellets.iter().find(|pellet| pellet.id == pellet_b.id) {
            Some(pellet_a) => pellets.push(RenderPellet {
                id: pellet_b.id,
                normal: slerp(pellet_a.normal, pellet_b.normal, t),
                color_index: pellet_b.color_index,
                size: lerp(pellet_a.size, pellet_b.size, t),
                alpha: 1.0,
            }),
            None => pellets.push(RenderPellet {
                id: pellet_b.id,
                normal: normalize(pellet_b.normal),
                color_index: pellet_b.color_index,
                size: pellet_b.size,
                alpha: fade_in,
            }),
        }
    }
    if fade_out > 0.0 {
        for pellet_a in &a.pellets {
            if b.pellets.iter().all(|pellet| pellet.id != pellet_a.id) {
                pellets.push(RenderPellet {
                    id: pellet_a.id,
                    normal: normalize(pellet_a.normal),
                    color_index: pellet_a.color_index,
                    size: pellet_a.size,
                    alpha: fade_out,
                });
            }
        }
    }

    let mut players = Vec::with_capacity(b.players.len());
    for player_b in &b.players {
        match a.players.iter().find(|player| player.id == player_b.id) {
            Some(player_a) => players.push(blend_players(player_a, player_b, t)),
            None => players.push(player_snapshot_view(player_b, fade_in)),
        }
    }
    if fade_out > 0.0 {
        for player_a in &a.players {
            if b.players.iter().all(|player| player.id != player_a.id) {
                players.push(player_snapshot_view(player_a, fade_out));
            }
        }
    }

    RenderState {
        render_time,
        players,
        pellets,
    }
}

fn player_snapshot_view(view: &PlayerView, alpha: f64) -> RenderPlayer {
    RenderPlayer {
        id: view.id,
        name: view.name.clone(),
        color: view.color.clone(),
        skin: view.skin,
        alive: view.alive,
        boosting: view.boosting,
        score: view.score,
        score_fraction: view.score_fraction,
        stamina: view.stamina,
        axis: normalize(view.axis),
        points: view.snake.iter().map(|point| normalize(*point)).collect(),
        tail_extension: view.tail_extension,
        alpha,
        digestions: view
            .digestions
            .iter()
            .map(|digestion| RenderDigestion {
                id: digestion.id,
                progress: digestion.progress,
                alpha: 1.0,
            })
            .collect(),
    }
}

fn blend_players(a: &PlayerView, b: &PlayerView, t: f64) -> RenderPlayer {
    // Score blends as one fractional quantity so crossing an integer
    // boundary never reads as a backward wrap on the HUD.
    let score_units = lerp(
        a.score as f64 + a.score_fraction,
        b.score as f64 + b.score_fraction,
        t,
    )
    .max(0.0);
    let score = score_units.floor() as i64;
    let score_fraction = score_units - score as f64;

    // Chain length blends in length-units (node count + fractional tail
    // extension) and is only then re-split, so an integer node-count change
    // between the two snapshots cannot pop.
    let length_units = lerp(
        a.total_snake_len as f64 + a.tail_extension,
        b.total_snake_len as f64 + b.tail_extension,
        t.clamp(0.0, 1.0),
    )
    .max(0.0);
    let node_count = length_units.floor() as usize;
    let tail_extension = length_units - node_count as f64;

    let drawn_nodes = node_count.min(a.snake.len().max(b.snake.len()));
    let mut points = Vec::with_capacity(drawn_nodes);
    for index in 0..drawn_nodes {
        let from = sample_node(&a.snake, index);
        let to = sample_node(&b.snake, index);
        match (from, to) {
            (Some(from), Some(to)) => points.push(slerp(from, to, t)),
            (None, Some(to)) => points.push(normalize(to)),
            (Some(from), None) => points.push(normalize(from)),
            (None, None) => {}
        }
    }

    let mut digestions = Vec::with_capacity(b.digestions.len());
    for digestion_b in &b.digestions {
        match a
            .digestions
            .iter()
            .find(|digestion| digestion.id == digestion_b.id)
        {
            Some(digestion_a) => digestions.push(RenderDigestion {
                id: digestion_b.id,
                progress: lerp(digestion_a.progress, digestion_b.progress, t).clamp(0.0, 1.0),
                alpha: 1.0,
            }),
            None => digestions.push(RenderDigestion {
                id: digestion_b.id,
                progress: digestion_b.progress,
                alpha: t.clamp(0.0, 1.0),
            }),
        }
    }
    let fade_out = 1.0 - t.clamp(0.0, 1.0);
    if fade_out > 0.0 {
        for digestion_a in &a.digestions {
            if b.digestions
                .iter()
                .all(|digestion| digestion.id != digestion_a.id)
            {
                digestions.push(RenderDigestion {
                    id: digestion_a.id,
                    progress: digestion_a.progress,
                    alpha: fade_out,
                });
            }
        }
    }

    RenderPlayer {
        id: b.id,
        name: b.name.clone(),
        color: b.color.clone(),
        skin: b.skin,
        alive: b.alive,
        boosting: b.boosting,
        score,
        score_fraction,
        stamina: lerp(a.stamina, b.stamina, t).clamp(0.0, 1.0),
        axis: slerp(a.axis, b.axis, t),
        points,
        tail_extension,
        alpha: 1.0,
        digestions,
    }
}

fn sample_node(snake: &[Point], index: usize) -> Option<Point> {
    if snake.is_empty() {
        return None;
    }
    Some(snake[index.min(snake.len() - 1)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::diagnostics::NoopDiagnostics;
    use crate::game::math::{angular_distance, length};
    use crate::game::types::{DigestionView, Pellet};

    fn interpolator() -> SnapshotInterpolator {
        SnapshotInterpolator::new(Arc::new(NoopDiagnostics))
    }

    fn player_at(theta: f64, score: i64, score_fraction: f64, len: u32, tail: f64) -> PlayerView {
        PlayerView {
            id: [1u8; 16],
            name: "p".to_string(),
            color: "#fff".to_string(),
            skin: 0,
            score,
            score_fraction,
            stamina: 1.0,
            boosting: false,
            alive: true,
            axis: Point {
                x: 0.0,
                y: 0.0,
                z: 1.0,
            },
            snake: (0..len)
                .map(|index| {
                    let angle = theta - index as f64 * 0.05;
                    Point {
                        x: angle.cos(),
                        y: angle.sin(),
                        z: 0.0,
                    }
                })
                .collect(),
            total_snake_len: len,
            tail_extension: tail,
            digestions: vec![DigestionView {
                id: 1,
                progress: 0.5,
            }],
        }
    }

    fn snapshot(now: i64, seq: u32, player_theta: f64, pellet: Point) -> GameStateSnapshot {
        GameStateSnapshot {
            now,
            seq,
            ack_input_seq: None,
            pellets: vec![Pellet {
                id: 7,
                normal: pellet,
                color_index: 1,
                size: 1.0,
            }],
            players: vec![player_at(player_theta, 1, 0.8, 8, 0.0)],
        }
    }

    #[test]
    fn midpoint_blend_is_exact() {
        let mut interpolator = interpolator();
        let a = {
            let mut snapshot = snapshot(
                1000,
                1,
                0.0,
                Point {
                    x: 1.0,
                    y: 0.0,
                    z: 0.0,
                },
            );
            snapshot.players[0].score = 1;
            snapshot.players[0].score_fraction = 0.8;
            snapshot
        };
        let b = {
            let mut snapshot = snapshot(
                1050,
                2,
                0.1,
                Point {
                    x: 0.0,
                    y: 1.0,
                    z: 0.0,
                },
            );
            snapshot.players[0].score = 2;
            snapshot.players[0].score_fraction = 0.2;
            snapshot
        };
        assert!(interpolator.ingest(a, 2000));
        assert!(interpolator.ingest(b, 2050));

        // Pick local_now so render time lands exactly halfway: offset is
        // -1000 ms, playout delay is 75 ms (1.5 × 50 ms tick interval).
        let local_now = 2100;
        assert!((interpolator.render_time(local_now) - 1025.0).abs() < 1e-9);
        let state = interpolator.sample(local_now).expect("state");

        // Pellet position is the exact spherical midpoint.
        let pellet = &state.pellets[0];
        let expected = (0.5f64).sqrt();
        assert!((pellet.normal.x - expected).abs() < 1e-9);
        assert!((pellet.normal.y - expected).abs() < 1e-9);

        // Player head is the spherical midpoint of the two head samples.
        let player = &state.players[0];
        let expected_head = Point {
            x: 0.05f64.cos(),
            y: 0.05f64.sin(),
            z: 0.0,
        };
        assert!(angular_distance(player.points[0], expected_head) < 1e-9);

        // Score blends as fractional units: (1.8 + 2.2) / 2 = 2.0 exactly,
        // with no backward wrap at the integer boundary.
        assert_eq!(player.score, 2);
        assert!(player.score_fraction.abs() < 1e-9);
    }

    #[test]
    fn stale_and_duplicate_sequences_are_discarded() {
        let mut interpolator = interpolator();
        let origin = Point {
            x: 1.0,
            y: 0.0,
            z: 0.0,
        };
        assert!(interpolator.ingest(snapshot(1000, 5, 0.0, origin), 2000));
        assert!(!interpolator.ingest(snapshot(1050, 5, 0.1, origin), 2050));
        assert!(!interpolator.ingest(snapshot(950, 4, 0.2, origin), 2060));
        assert_eq!(interpolator.len(), 1);
    }

    #[test]
    fn extrapolates_briefly_then_freezes() {
        let mut interpolator = interpolator();
        let origin = Point {
            x: 1.0,
            y: 0.0,
            z: 0.0,
        };
        interpolator.ingest(snapshot(1000, 1, 0.0, origin), 2000);
        interpolator.ingest(snapshot(1050, 2, 0.1, origin), 2050);

        // Past the newest snapshot but inside the window: the head keeps
        // moving along the last observed arc.
        let state = interpolator.sample(2175).expect("state");
        let newest_head = player_at(0.1, 1, 0.8, 8, 0.0).snake[0];
        let extrapolated = &state.players[0];
        assert!(angular_distance(extrapolated.points[0], newest_head) > 1e-6);
        for point in &extrapolated.points {
            assert!((length(*point) - 1.0).abs() <= 1e-6);
        }

        // Far past the window: frozen on the newest snapshot.
        let frozen = interpolator.sample(2175 + EXTRAPOLATION_WINDOW_MS as i64 + 500).expect("state");
        assert!(angular_distance(frozen.players[0].points[0], newest_head) < 1e-9);
    }

    #[test]
    fn buffer_is_bounded() {
        let mut interpolator = interpolator();
        let origin = Point {
            x: 1.0,
            y: 0.0,
            z: 0.0,
        };
        for index in 0..(SNAPSHOT_BUFFER_CAPACITY as i64 + 15) {
            interpolator.ingest(
                snapshot(1000 + index * 50, 1 + index as u32, 0.0, origin),
                2000 + index * 50,
            );
        }
        assert!(interpolator.len() <= SNAPSHOT_BUFFER_CAPACITY);
    }

    #[test]
    fn length_change_blends_in_length_units() {
        let a = GameStateSnapshot {
            now: 1000,
            seq: 1,
            ack_input_seq: None,
            pellets: Vec::new(),
            players: vec![player_at(0.0, 0, 0.0, 8, 0.9)],
        };
        let b = GameStateSnapshot {
            now: 1050,
            seq: 2,
            ack_input_seq: None,
            pellets: Vec::new(),
            players: vec![player_at(0.0, 0, 0.0, 9, 0.1)],
        };
        // 8.9 → 9.1 length units: halfway is exactly 9.0, so the blended
        // chain shows 9 nodes with no fractional tail, not an 8→9 pop.
        let state = blend_states(&a, &b, 0.5, 1025.0);
        let player = &state.players[0];
        assert_eq!(player.points.len(), 9);
        assert!(player.tail_extension.abs() < 1e-9);
    }

    #[test]
    fn one_sided_entries_fade() {
        let mut a = snapshot(
            1000,
            1,
            0.0,
            Point {
                x: 1.0,
                y: 0.0,
                z: 0.0,
            },
        );
        let mut b = snapshot(
            1050,
            2,
            0.0,
            Point {
                x: 1.0,
                y: 0.0,
                z: 0.0,
            },
        );
        a.pellets[0].id = 1;
        b.pellets[0].id = 2;
        a.players[0].digestions = vec![DigestionView {
            id: 10,
            progress: 0.9,
        }];
        b.players[0].digestions = vec![DigestionView {
            id: 11,
            progress: 0.1,
        }];

        let state = blend_states(&a, &b, 0.25, 1012.5);
        let fading_out = state.pellets.iter().find(|p| p.id == 1).expect("pellet");
        let fading_in = state.pellets.iter().find(|p| p.id == 2).expect("pellet");
        assert!((fading_out.alpha - 0.75).abs() < 1e-9);
        assert!((fading_in.alpha - 0.25).abs() < 1e-9);

        let digestions = &state.players[0].digestions;
        let out = digestions.iter().find(|d| d.id == 10).expect("digestion");
        let inn = digestions.iter().find(|d| d.id == 11).expect("digestion");
        assert!((out.alpha - 0.75).abs() < 1e-9);
        assert!((inn.alpha - 0.25).abs() < 1e-9);
    }
}
