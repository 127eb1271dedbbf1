use super::*;
use crate::game::constants::{BASE_SPEED, STARTING_LENGTH};
use crate::game::history::HistoryRing;

fn make_state() -> RoomState {
    RoomState {
        sessions: HashMap::new(),
        players: HashMap::new(),
        pellets: Vec::new(),
        next_pellet_id: 0,
        next_state_seq: 1,
        environment: Environment {
            lakes: Vec::new(),
            trees: Vec::new(),
            mountains: Vec::new(),
        },
    }
}

fn node_at_angle(theta: f64) -> SnakeNode {
    SnakeNode {
        x: theta.cos(),
        y: theta.sin(),
        z: 0.0,
        history: HistoryRing::new(),
    }
}

fn make_player(id: &str, snake: Vec<SnakeNode>) -> Player {
    let axis = Point {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };
    Player {
        id: id.to_string(),
        id_bytes: [0u8; 16],
        name: "Test".to_string(),
        color: "#ffffff".to_string(),
        skin: 0,
        axis,
        target_axis: axis,
        boost: false,
        is_boosting: false,
        stamina: STAMINA_MAX,
        score: 0,
        score_fraction: 0.0,
        alive: true,
        connected: true,
        last_seen: now_millis(),
        last_input_seq: None,
        respawn_at: None,
        snake,
        tail_extension: 0.0,
        next_digestion_id: 0,
        digestions: Vec::new(),
    }
}

fn far_pellets(count: usize) -> Vec<Pellet> {
    (0..count)
        .map(|index| Pellet {
            id: index as u32,
            normal: Point {
                x: 0.0,
                y: 0.0,
                z: 1.0,
            },
            color_index: 0,
            size: 1.0,
        })
        .collect()
}

fn make_session(state: &mut RoomState, session_id: &str, player_id: Option<&str>) -> Arc<SessionInbound> {
    let (ctl_tx, ctl_rx) = mpsc::unbounded_channel();
    drop(ctl_rx);
    let inbound = Arc::new(SessionInbound::new());
    state.sessions.insert(
        session_id.to_string(),
        SessionEntry {
            ctl: ctl_tx,
            state_frame: Arc::new(LatestFrame::new()),
            inbound: Arc::clone(&inbound),
            player_id: player_id.map(|id| id.to_string()),
        },
    );
    inbound
}

#[test]
fn boosting_head_consumes_pellet_one_tick_away() {
    let mut state = make_state();
    let snake = vec![
        node_at_angle(0.0),
        node_at_angle(-0.05),
        node_at_angle(-0.10),
        node_at_angle(-0.15),
    ];
    let mut player = make_player("p1", snake);
    player.boost = true;
    state.players.insert("p1".to_string(), player);
    state.pellets = far_pellets(BASE_PELLET_COUNT);

    let travel = BASE_SPEED * BOOST_MULTIPLIER;
    state.pellets.push(Pellet {
        id: 999,
        normal: Point {
            x: travel.cos(),
            y: travel.sin(),
            z: 0.0,
        },
        color_index: 0,
        size: 1.0,
    });

    state.tick();

    let player = &state.players["p1"];
    assert_eq!(player.score, 1);
    assert!(player.score_fraction.abs() < 1e-9);
    assert_eq!(player.digestions.len(), 1);
    let digestion = &player.digestions[0];
    assert_eq!(digestion.remaining, digestion.total);
    assert!(state.pellets.iter().all(|pellet| pellet.id != 999));
}

#[test]
fn first_head_to_body_contact_kills_only_that_snake() {
    let mut state = make_state();
    state.pellets = far_pellets(BASE_PELLET_COUNT);

    // A travels along the equator toward B's crossing body. The gap starts
    // just over the collision radius, so one tick of travel closes it.
    let gap = 0.0355;
    let a = make_player(
        "a",
        vec![
            node_at_angle(0.0),
            node_at_angle(-0.06),
            node_at_angle(-0.12),
        ],
    );
    let mut b = make_player(
        "b",
        vec![
            node_at_angle(gap + 0.10),
            node_at_angle(gap + 0.05),
            node_at_angle(gap),
        ],
    );
    // B drifts about another axis so it neither flees nor approaches.
    b.axis = Point {
        x: 1.0,
        y: 0.0,
        z: 0.0,
    };
    b.target_axis = b.axis;
    state.players.insert("a".to_string(), a);
    state.players.insert("b".to_string(), b);

    state.tick();

    assert!(!state.players["a"].alive);
    assert_eq!(state.players["a"].score, 0);
    assert!(state.players["a"].snake.is_empty());
    assert!(state.players["b"].alive);
    // A's 3-node body scatters every second node behind the head.
    assert_eq!(state.pellets.len(), BASE_PELLET_COUNT + 1);
}

#[test]
fn respawn_requests_respect_alive_state_and_cooldown() {
    let mut state = make_state();
    make_session(&mut state, "s1", Some("p1"));
    let mut player = make_player("p1", vec![node_at_angle(0.0)]);
    player.score = 7;
    state.players.insert("p1".to_string(), player);

    // Alive: ignored.
    state.handle_respawn("s1");
    assert!(state.players["p1"].alive);
    assert_eq!(state.players["p1"].score, 7);

    // Dead but still cooling down: ignored.
    {
        let player = state.players.get_mut("p1").expect("player");
        player.alive = false;
        player.respawn_at = Some(now_millis() + 60_000);
    }
    state.handle_respawn("s1");
    assert!(!state.players["p1"].alive);

    // Cooldown elapsed: a fresh snake comes back with zeroed score.
    state.players.get_mut("p1").expect("player").respawn_at = Some(now_millis() - 1);
    state.handle_respawn("s1");
    let player = &state.players["p1"];
    assert!(player.alive);
    assert_eq!(player.score, 0);
    assert_eq!(player.snake.len(), STARTING_LENGTH);
}

#[test]
fn tick_drops_players_disconnected_past_timeout() {
    let mut state = make_state();
    state.pellets = far_pellets(BASE_PELLET_COUNT);

    let mut gone = make_player("gone", vec![node_at_angle(0.0)]);
    gone.connected = false;
    gone.last_seen = now_millis() - PLAYER_TIMEOUT_MS - 1;
    let mut lingering = make_player("lingering", vec![node_at_angle(1.0)]);
    lingering.connected = false;
    lingering.last_seen = now_millis();
    state.players.insert("gone".to_string(), gone);
    state.players.insert("lingering".to_string(), lingering);

    state.tick();

    assert!(!state.players.contains_key("gone"));
    assert!(state.players.contains_key("lingering"));
}

#[test]
fn queued_inputs_apply_newest_sequence_only() {
    let mut state = make_state();
    let inbound = make_session(&mut state, "s1", Some("p1"));
    state
        .players
        .insert("p1".to_string(), make_player("p1", vec![node_at_angle(0.0)]));

    inbound.update_input(
        5,
        Some(Point {
            x: 0.0,
            y: 1.0,
            z: 0.0,
        }),
        true,
        None,
    );
    // A stale sequence arriving late must not clobber the newer input.
    inbound.update_input(
        3,
        Some(Point {
            x: 1.0,
            y: 0.0,
            z: 0.0,
        }),
        false,
        None,
    );

    state.apply_queued_inputs();

    let player = &state.players["p1"];
    assert_eq!(player.last_input_seq, Some(5));
    assert!(player.boost);
    assert!((player.target_axis.y - 1.0).abs() < 1e-9);
}

#[test]
fn snapshots_carry_per_session_acks_and_bounded_windows() {
    let mut state = make_state();
    let snake: Vec<SnakeNode> = (0..SNAKE_WIRE_NODE_CAP + 10)
        .map(|index| node_at_angle(index as f64 * 1e-3))
        .collect();
    state
        .players
        .insert("p1".to_string(), make_player("p1", snake));

    let snapshot = state.build_snapshot(1000, 7, Some(9));

    assert_eq!(snapshot.now, 1000);
    assert_eq!(snapshot.seq, 7);
    assert_eq!(snapshot.ack_input_seq, Some(9));
    let view = &snapshot.players[0];
    assert_eq!(view.snake.len(), SNAKE_WIRE_NODE_CAP);
    assert_eq!(view.total_snake_len as usize, SNAKE_WIRE_NODE_CAP + 10);
}

#[test]
fn spawn_placement_accepts_imperfect_spot_after_retries() {
    let mut state = make_state();

    // Blanket the whole spawn region with living snake so every candidate
    // overlaps something.
    let golden = std::f64::consts::PI * (3.0 - 5.0f64.sqrt());
    let total = 32_000usize;
    let blanket: Vec<SnakeNode> = (0..total)
        .filter_map(|index| {
            let z = 1.0 - 2.0 * (index as f64 + 0.5) / total as f64;
            if z > -0.4 {
                return None;
            }
            let r = (1.0 - z * z).max(0.0).sqrt();
            let theta = golden * index as f64;
            Some(SnakeNode {
                x: r * theta.cos(),
                y: r * theta.sin(),
                z,
                history: HistoryRing::new(),
            })
        })
        .collect();
    state
        .players
        .insert("wall".to_string(), make_player("wall", blanket));

    let spawned = state.spawn_snake(random_axis(), None);
    assert_eq!(spawned.snake.len(), STARTING_LENGTH);
    // The placement is imperfect by construction, but it is still accepted.
    assert!(state.is_snake_too_close(&spawned.snake));
}
