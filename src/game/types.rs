use super::history::HistoryRing;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone)]
pub struct SnakeNode {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub history: HistoryRing,
}

impl SnakeNode {
    pub fn position(&self) -> Point {
        Point {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    pub fn set_position(&mut self, point: Point) {
        self.x = point.x;
        self.y = point.y;
        self.z = point.z;
    }
}

/// One swallowed pellet traveling down the body. `remaining` counts down in
/// movement sub-steps; the final `growth_steps` of the countdown are the
/// growth phase, during which the pending tail extension is paid out.
#[derive(Debug, Clone)]
pub struct Digestion {
    pub id: u32,
    pub remaining: i64,
    pub total: i64,
    pub growth_steps: i64,
    pub growth_units: f64,
    pub applied_growth: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pellet {
    pub id: u32,
    pub normal: Point,
    pub color_index: u8,
    pub size: f64,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub id_bytes: [u8; 16],
    pub name: String,
    pub color: String,
    pub skin: u8,
    pub axis: Point,
    pub target_axis: Point,
    pub boost: bool,
    pub is_boosting: bool,
    pub stamina: f64,
    pub score: i64,
    pub score_fraction: f64,
    pub alive: bool,
    pub connected: bool,
    pub last_seen: i64,
    pub last_input_seq: Option<u16>,
    pub respawn_at: Option<i64>,
    pub snake: Vec<SnakeNode>,
    pub tail_extension: f64,
    pub next_digestion_id: u32,
    pub digestions: Vec<Digestion>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigestionView {
    pub id: u32,
    pub progress: f64,
}

#[derive(Debug, Clone)]
pub struct PlayerView {
    pub id: [u8; 16],
    pub name: String,
    pub color: String,
    pub skin: u8,
    pub score: i64,
    pub score_fraction: f64,
    pub stamina: f64,
    pub boosting: bool,
    pub alive: bool,
    pub axis: Point,
    /// Length-bounded window of the body, head first. `total_snake_len` is
    /// the full authoritative chain length even when the window is shorter.
    pub snake: Vec<Point>,
    pub total_snake_len: u32,
    pub tail_extension: f64,
    pub digestions: Vec<DigestionView>,
}

/// Immutable per-tick view of the whole room, as sent to one session.
#[derive(Debug, Clone)]
pub struct GameStateSnapshot {
    pub now: i64,
    pub seq: u32,
    pub ack_input_seq: Option<u16>,
    pub pellets: Vec<Pellet>,
    pub players: Vec<PlayerView>,
}
