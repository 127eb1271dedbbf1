pub const WORLD_SCALE: f64 = 3.0;
pub const NODE_ANGLE: f64 = std::f64::consts::PI / 60.0 / WORLD_SCALE;
pub const NODE_QUEUE_SIZE: usize = 9;
pub const STARTING_LENGTH: usize = 8;
pub const BASE_SPEED: f64 = (NODE_ANGLE * 2.0) / ((NODE_QUEUE_SIZE + 1) as f64);
pub const BOOST_MULTIPLIER: f64 = 1.75;
pub const STAMINA_MAX: f64 = 1.0;
pub const STAMINA_DRAIN_PER_SEC: f64 = 0.6;
pub const STAMINA_RECHARGE_PER_SEC: f64 = 0.35;
pub const TURN_RATE: f64 = 0.3 / WORLD_SCALE;
pub const STEER_GAIN: f64 = 0.65;
pub const COLLISION_DISTANCE: f64 = 0.10467191248588766 / WORLD_SCALE;
pub const SELF_COLLISION_SKIP_NODES: usize = 2;
pub const BASE_PELLET_COUNT: usize = 24;
pub const MAX_PELLETS: usize = 96;
pub const DEATH_PELLET_STRIDE: usize = 2;
pub const TICK_MS: u64 = 50;
pub const RESPAWN_COOLDOWN_MS: i64 = 5000;
pub const RESPAWN_RETRY_MS: i64 = 500;
pub const PLAYER_TIMEOUT_MS: i64 = 15000;
pub const SPAWN_CONE_ANGLE: f64 = std::f64::consts::PI / 3.0;
pub const MAX_SPAWN_ATTEMPTS: usize = 32;
pub const DIGESTION_TRAVEL_SPEED_MULT: f64 = 3.0;
pub const DIGESTION_GROWTH_STEPS: i64 = NODE_QUEUE_SIZE as i64;
pub const SNAKE_WIRE_NODE_CAP: usize = 512;
pub const PELLET_COLOR_COUNT: u8 = 6;

pub const COLOR_POOL: [&str; 8] = [
    "#ff6b6b",
    "#ffd166",
    "#06d6a0",
    "#4dabf7",
    "#f06595",
    "#845ef7",
    "#20c997",
    "#fcc419",
];
