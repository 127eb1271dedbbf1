use crate::game::environment::Environment;
use crate::game::types::{DigestionView, GameStateSnapshot, Pellet, PlayerView, Point};
use uuid::Uuid;

pub const VERSION: u8 = 4;

pub const TYPE_JOIN: u8 = 0x01;
pub const TYPE_INPUT: u8 = 0x02;
pub const TYPE_RESPAWN: u8 = 0x03;

pub const TYPE_INIT: u8 = 0x10;
pub const TYPE_STATE: u8 = 0x11;

pub const FLAG_JOIN_PLAYER_ID: u16 = 1 << 0;
pub const FLAG_JOIN_NAME: u16 = 1 << 1;
pub const FLAG_JOIN_DEFER_SPAWN: u16 = 1 << 2;

pub const FLAG_INPUT_AXIS: u16 = 1 << 0;
pub const FLAG_INPUT_BOOST: u16 = 1 << 1;
pub const FLAG_INPUT_VIEW: u16 = 1 << 2;

pub const FLAG_STATE_ACK: u16 = 1 << 0;

/// Half-open modular ordering over wrapping 16-bit sequence numbers:
/// `seq` is newer than `baseline` when the forward distance is positive and
/// less than half the modulus.
pub fn seq_newer_than(seq: u16, baseline: u16) -> bool {
    let forward = seq.wrapping_sub(baseline);
    forward != 0 && forward < 0x8000
}

#[derive(Debug)]
pub enum ClientMessage {
    Join {
        name: Option<String>,
        player_id: Option<Uuid>,
        defer_spawn: bool,
    },
    Respawn,
    Input {
        seq: u16,
        axis: Option<Point>,
        boost: bool,
        view_center: Option<Point>,
    },
}

#[derive(Debug)]
pub enum ServerMessage {
    Init {
        player_id: Uuid,
        now: i64,
        environment: Environment,
        state: GameStateSnapshot,
    },
    State(GameStateSnapshot),
}

pub fn decode_client_message(data: &[u8]) -> Option<ClientMessage> {
    let mut reader = Reader::new(data);
    let version = reader.read_u8()?;
    if version != VERSION {
        return None;
    }
    let message_type = reader.read_u8()?;
    let flags = reader.read_u16()?;
    match message_type {
        TYPE_JOIN => {
            let player_id = if flags & FLAG_JOIN_PLAYER_ID != 0 {
                Some(reader.read_uuid()?)
            } else {
                None
            };
            let name = if flags & FLAG_JOIN_NAME != 0 {
                Some(reader.read_string()?)
            } else {
                None
            };
            Some(ClientMessage::Join {
                name,
                player_id,
                defer_spawn: flags & FLAG_JOIN_DEFER_SPAWN != 0,
            })
        }
        TYPE_RESPAWN => Some(ClientMessage::Respawn),
        TYPE_INPUT => {
            let seq = reader.read_u16()?;
            let axis = if flags & FLAG_INPUT_AXIS != 0 {
                Some(reader.read_point()?)
            } else {
                None
            };
            let view_center = if flags & FLAG_INPUT_VIEW != 0 {
                Some(reader.read_point()?)
            } else {
                None
            };
            let boost = flags & FLAG_INPUT_BOOST != 0;
            Some(ClientMessage::Input {
                seq,
                axis,
                boost,
                view_center,
            })
        }
        _ => None,
    }
}

pub fn encode_input(seq: u16, axis: Option<Point>, boost: bool, view_center: Option<Point>) -> Vec<u8> {
    let mut flags = 0u16;
    if axis.is_some() {
        flags |= FLAG_INPUT_AXIS;
    }
    if boost {
        flags |= FLAG_INPUT_BOOST;
    }
    if view_center.is_some() {
        flags |= FLAG_INPUT_VIEW;
    }
    let mut encoder = Encoder::with_capacity(4 + 2 + 24);
    encoder.write_header(TYPE_INPUT, flags);
    encoder.write_u16(seq);
    if let Some(axis) = axis {
        encoder.write_point(axis);
    }
    if let Some(view_center) = view_center {
        encoder.write_point(view_center);
    }
    encoder.into_vec()
}

fn state_body_len(state: &GameStateSnapshot) -> usize {
    let mut len = 8 + 4 + 2 + state.pellets.len() * (4 + 12 + 1 + 4) + 2;
    for player in &state.players {
        len += 16;
        len += 1 + player.name.len().min(u8::MAX as usize);
        len += 1 + player.color.len().min(u8::MAX as usize);
        len += 1 + 1 + 1 + 4 + 4 + 4 + 12 + 4;
        len += 2 + player.snake.len() * 12 + 4;
        len += 1 + player.digestions.len() * 8;
    }
    len
}

fn write_state_body(encoder: &mut Encoder, state: &GameStateSnapshot) {
    encoder.write_i64(state.now);
    encoder.write_u32(state.seq);
    encoder.write_u16(state.pellets.len().min(u16::MAX as usize) as u16);
    for pellet in &state.pellets {
        encoder.write_u32(pellet.id);
        encoder.write_point(pellet.normal);
        encoder.write_u8(pellet.color_index);
        encoder.write_f32(pellet.size as f32);
    }
    encoder.write_u16(state.players.len().min(u16::MAX as usize) as u16);
    for player in &state.players {
        encoder.write_uuid(&player.id);
        encoder.write_string(&player.name);
        encoder.write_string(&player.color);
        encoder.write_u8(player.skin);
        encoder.write_u8(if player.alive { 1 } else { 0 });
        encoder.write_u8(if player.boosting { 1 } else { 0 });
        encoder.write_i32(player.score as i32);
        encoder.write_f32(player.score_fraction as f32);
        encoder.write_f32(player.stamina as f32);
        encoder.write_point(player.axis);
        encoder.write_u32(player.total_snake_len);
        let window_len = player.snake.len().min(u16::MAX as usize) as u16;
        encoder.write_u16(window_len);
        for point in player.snake.iter().take(window_len as usize) {
            encoder.write_point(*point);
        }
        encoder.write_f32(player.tail_extension as f32);
        let digestion_len = player.digestions.len().min(u8::MAX as usize) as u8;
        encoder.write_u8(digestion_len);
        for digestion in player.digestions.iter().take(digestion_len as usize) {
            encoder.write_u32(digestion.id);
            encoder.write_f32(digestion.progress as f32);
        }
    }
}

fn read_state_body(reader: &mut Reader, ack_input_seq: Option<u16>) -> Option<GameStateSnapshot> {
    let now = reader.read_i64()?;
    let seq = reader.read_u32()?;
    let pellet_count = reader.read_u16()? as usize;
    let mut pellets = Vec::with_capacity(pellet_count);
    for _ in 0..pellet_count {
        pellets.push(Pellet {
            id: reader.read_u32()?,
            normal: reader.read_point()?,
            color_index: reader.read_u8()?,
            size: reader.read_f32()? as f64,
        });
    }
    let player_count = reader.read_u16()? as usize;
    let mut players = Vec::with_capacity(player_count);
    for _ in 0..player_count {
        let id = *reader.read_uuid()?.as_bytes();
        let name = reader.read_string()?;
        let color = reader.read_string()?;
        let skin = reader.read_u8()?;
        let alive = reader.read_u8()? != 0;
        let boosting = reader.read_u8()? != 0;
        let score = reader.read_i32()? as i64;
        let score_fraction = reader.read_f32()? as f64;
        let stamina = reader.read_f32()? as f64;
        let axis = reader.read_point()?;
        let total_snake_len = reader.read_u32()?;
        let window_len = reader.read_u16()? as usize;
        let mut snake = Vec::with_capacity(window_len);
        for _ in 0..window_len {
            snake.push(reader.read_point()?);
        }
        let tail_extension = reader.read_f32()? as f64;
        let digestion_count = reader.read_u8()? as usize;
        let mut digestions = Vec::with_capacity(digestion_count);
        for _ in 0..digestion_count {
            digestions.push(DigestionView {
                id: reader.read_u32()?,
                progress: reader.read_f32()? as f64,
            });
        }
        players.push(PlayerView {
            id,
            name,
            color,
            skin,
            score,
            score_fraction,
            stamina,
            boosting,
            alive,
            axis,
            snake,
            total_snake_len,
            tail_extension,
            digestions,
        });
    }
    Some(GameStateSnapshot {
        now,
        seq,
        ack_input_seq,
        pellets,
        players,
    })
}

pub fn encode_state(state: &GameStateSnapshot) -> Vec<u8> {
    let mut flags = 0u16;
    if state.ack_input_seq.is_some() {
        flags |= FLAG_STATE_ACK;
    }
    let mut encoder = Encoder::with_capacity(4 + 2 + state_body_len(state));
    encoder.write_header(TYPE_STATE, flags);
    if let Some(ack) = state.ack_input_seq {
        encoder.write_u16(ack);
    }
    write_state_body(&mut encoder, state);
    encoder.into_vec()
}

pub fn encode_init(player_id: &[u8; 16], environment: &Environment, state: &GameStateSnapshot) -> Vec<u8> {
    let mut flags = 0u16;
    if state.ack_input_seq.is_some() {
        flags |= FLAG_STATE_ACK;
    }
    let capacity = 4 + 16 + 2 + environment.encoded_len() + state_body_len(state);
    let mut encoder = Encoder::with_capacity(capacity);
    encoder.write_header(TYPE_INIT, flags);
    encoder.write_uuid(player_id);
    if let Some(ack) = state.ack_input_seq {
        encoder.write_u16(ack);
    }
    environment.write_to(&mut encoder);
    write_state_body(&mut encoder, state);
    encoder.into_vec()
}

pub fn decode_server_message(data: &[u8]) -> Option<ServerMessage> {
    let mut reader = Reader::new(data);
    let version = reader.read_u8()?;
    if version != VERSION {
        return None;
    }
    let message_type = reader.read_u8()?;
    let flags = reader.read_u16()?;
    match message_type {
        TYPE_INIT => {
            let player_id = reader.read_uuid()?;
            let ack = if flags & FLAG_STATE_ACK != 0 {
                Some(reader.read_u16()?)
            } else {
                None
            };
            let environment = Environment::read_from(&mut reader)?;
            let state = read_state_body(&mut reader, ack)?;
            let now = state.now;
            Some(ServerMessage::Init {
                player_id,
                now,
                environment,
                state,
            })
        }
        TYPE_STATE => {
            let ack = if flags & FLAG_STATE_ACK != 0 {
                Some(reader.read_u16()?)
            } else {
                None
            };
            Some(ServerMessage::State(read_state_body(&mut reader, ack)?))
        }
        _ => None,
    }
}

pub struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_header(&mut self, message_type: u8, flags: u16) {
        self.write_u8(VERSION);
        self.write_u8(message_type);
        self.write_u16(flags);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_uuid(&mut self, value: &[u8; 16]) {
        self.buffer.extend_from_slice(value);
    }

    pub fn write_point(&mut self, point: Point) {
        self.write_f32(point.x as f32);
        self.write_f32(point.y as f32);
        self.write_f32(point.z as f32);
    }

    pub fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let mut end = bytes.len().min(u8::MAX as usize);
        while !value.is_char_boundary(end) {
            end = end.saturating_sub(1);
        }
        self.write_u8(end as u8);
        self.buffer.extend_from_slice(&bytes[..end]);
    }
}

pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let value = *self.data.get(self.offset)?;
        self.offset += 1;
        Some(value)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        let bytes = self.read_bytes::<2>()?;
        Some(u16::from_le_bytes(bytes))
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        let bytes = self.read_bytes::<4>()?;
        Some(i32::from_le_bytes(bytes))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.read_bytes::<4>()?;
        Some(u32::from_le_bytes(bytes))
    }

    pub fn read_i64(&mut self) -> Option<i64> {
        let bytes = self.read_bytes::<8>()?;
        Some(i64::from_le_bytes(bytes))
    }

    pub fn read_f32(&mut self) -> Option<f32> {
        let bytes = self.read_bytes::<4>()?;
        Some(f32::from_le_bytes(bytes))
    }

    pub fn read_uuid(&mut self) -> Option<Uuid> {
        let bytes = self.read_bytes::<16>()?;
        Some(Uuid::from_bytes(bytes))
    }

    pub fn read_point(&mut self) -> Option<Point> {
        Some(Point {
            x: self.read_f32()? as f64,
            y: self.read_f32()? as f64,
            z: self.read_f32()? as f64,
        })
    }

    pub fn read_string(&mut self) -> Option<String> {
        let len = self.read_u8()? as usize;
        if self.offset + len > self.data.len() {
            return None;
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Some(String::from_utf8_lossy(slice).into_owned())
    }

    fn read_bytes<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.offset + N > self.data.len() {
            return None;
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.offset..self.offset + N]);
        self.offset += N;
        Some(out)
    }
}
