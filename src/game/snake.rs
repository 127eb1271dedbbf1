use super::constants::{NODE_ANGLE, NODE_QUEUE_SIZE, STARTING_LENGTH};
use super::history::HistoryRing;
use super::math::{clamp, cross, dot, length, normalize, rotate_around_axis, rotate_y, rotate_z};
use super::types::{Point, SnakeNode};

#[derive(Clone, Copy, Debug)]
struct TailContinuation {
    point: Point,
    history_axis: Option<Point>,
    history_spacing: Option<f64>,
    history_sign: f64,
}

fn new_node(point: Point) -> SnakeNode {
    SnakeNode {
        x: point.x,
        y: point.y,
        z: point.z,
        history: HistoryRing::new(),
    }
}

/// Component of `to - from` tangent to the sphere at `to`.
fn surface_tangent(from: Point, to: Point) -> Point {
    let delta = Point {
        x: to.x - from.x,
        y: to.y - from.y,
        z: to.z - from.z,
    };
    let radial = dot(delta, to);
    Point {
        x: delta.x - to.x * radial,
        y: delta.y - to.y * radial,
        z: delta.z - to.z * radial,
    }
}

fn collect_distinct_tail_points(snake: &[SnakeNode]) -> Vec<Point> {
    let mut distinct: Vec<Point> = Vec::with_capacity(3);
    for node in snake.iter().rev() {
        let point = normalize(node.position());
        let should_push = if let Some(last) = distinct.last() {
            let angular = clamp(dot(*last, point), -1.0, 1.0).acos();
            angular.is_finite() && angular > 1e-5
        } else {
            true
        };
        if should_push {
            distinct.push(point);
        }
        if distinct.len() >= 3 {
            break;
        }
    }
    distinct
}

fn resolve_tail_continuation(
    snake: &[SnakeNode],
    axis: Point,
    allow_queue_history: bool,
) -> Option<TailContinuation> {
    let last = snake.last()?;

    if allow_queue_history {
        if let Some(last_pos) = last.history.back() {
            return Some(TailContinuation {
                point: last_pos,
                history_axis: None,
                history_spacing: None,
                history_sign: 1.0,
            });
        }
    }

    let distinct = collect_distinct_tail_points(snake);
    if distinct.len() >= 2 {
        let tail = distinct[0];
        let prev = distinct[1];
        let raw_spacing = clamp(dot(prev, tail), -1.0, 1.0).acos();
        let spacing = if raw_spacing.is_finite() && raw_spacing > 1e-6 {
            clamp(raw_spacing, NODE_ANGLE * 0.75, NODE_ANGLE * 3.0)
        } else {
            NODE_ANGLE * 2.0
        };

        let mut tangent = surface_tangent(prev, tail);
        if length(tangent) <= 1e-8 && distinct.len() >= 3 {
            tangent = surface_tangent(distinct[2], prev);
        }
        let tangent_len = length(tangent);
        if tangent_len > 1e-8 {
            tangent = Point {
                x: tangent.x / tangent_len,
                y: tangent.y / tangent_len,
                z: tangent.z / tangent_len,
            };
            let local_axis = cross(tail, tangent);
            let axis_len = length(local_axis);
            if axis_len > 1e-8 && spacing.is_finite() {
                let axis_norm = Point {
                    x: local_axis.x / axis_len,
                    y: local_axis.y / axis_len,
                    z: local_axis.z / axis_len,
                };
                let mut point = tail;
                rotate_around_axis(&mut point, axis_norm, spacing);
                return Some(TailContinuation {
                    point: normalize(point),
                    history_axis: Some(axis_norm),
                    history_spacing: Some(spacing),
                    history_sign: 1.0,
                });
            }
        }
    }

    let mut point = last.position();
    rotate_around_axis(&mut point, axis, -NODE_ANGLE * 2.0);
    Some(TailContinuation {
        point: normalize(point),
        history_axis: Some(axis),
        history_spacing: Some(NODE_ANGLE * 2.0),
        history_sign: -1.0,
    })
}

fn apply_growth_history(
    snake: &mut [SnakeNode],
    appended: &mut SnakeNode,
    continuation: TailContinuation,
) {
    let (Some(axis), Some(spacing)) = (continuation.history_axis, continuation.history_spacing)
    else {
        return;
    };

    // Re-seed the old tail's history by continuing its arc, so the appended
    // node always finds a hand-off position on the very next step.
    if let Some(tail_node) = snake.last_mut() {
        let start = normalize(tail_node.position());
        let denom = (NODE_QUEUE_SIZE as f64).max(1.0);
        tail_node.history.fill(|offset| {
            let t = (offset as f64 + 1.0) / denom;
            let mut point = start;
            rotate_around_axis(&mut point, axis, continuation.history_sign * spacing * t);
            Some(normalize(point))
        });
    }

    let step_angle = (spacing / (NODE_QUEUE_SIZE as f64).max(1.0)).max(1e-6);
    let start = normalize(appended.position());
    appended.history.fill(|offset| {
        let mut point = start;
        rotate_around_axis(
            &mut point,
            axis,
            continuation.history_sign * step_angle * (offset as f64 + 1.0),
        );
        Some(normalize(point))
    });
}

pub fn add_snake_node(snake: &mut Vec<SnakeNode>, axis: Point) {
    let point = resolve_tail_continuation(snake, axis, true)
        .map(|continuation| continuation.point)
        .unwrap_or(Point {
            x: 0.0,
            y: 0.0,
            z: -1.0,
        });
    snake.push(new_node(point));
}

/// Appends a tail node committed by digestion growth. Unlike spawn-time
/// appends, the node's history is synthesized from the tail arc so rapid
/// growth never leaves a node without a hand-off position. The existing
/// tail's recorded history is intentionally not reused here: it can disagree
/// with the fractional tail extension the client renders, which shows up as
/// a pop exactly when the extension crosses 1.0.
pub fn add_snake_node_for_growth(snake: &mut Vec<SnakeNode>, axis: Point) {
    match resolve_tail_continuation(snake, axis, false) {
        Some(continuation) => {
            let mut appended = new_node(continuation.point);
            apply_growth_history(snake, &mut appended, continuation);
            snake.push(appended);
        }
        None => add_snake_node(snake, axis),
    }
}

/// One movement sub-step: the head rotates about `axis` by `velocity`; every
/// trailing node takes the position its predecessor held `NODE_QUEUE_SIZE`
/// steps ago, retracing the exact path instead of cutting the corner.
pub fn advance_chain_step(snake: &mut [SnakeNode], axis: Point, velocity: f64) {
    let mut hand_off: Option<Point> = None;

    for (index, node) in snake.iter_mut().enumerate() {
        let old_position = node.position();

        if index == 0 || hand_off.is_none() {
            let mut point = node.position();
            rotate_around_axis(&mut point, axis, velocity);
            node.set_position(normalize(point));
        } else if let Some(next) = hand_off {
            node.set_position(next);
        }

        hand_off = node.history.push_rotate(Some(old_position));
    }
}

pub fn create_snake(axis: Point) -> Vec<SnakeNode> {
    let mut snake = Vec::with_capacity(STARTING_LENGTH);
    for _ in 0..STARTING_LENGTH {
        add_snake_node(&mut snake, axis);
    }
    snake
}

pub fn rotate_snake(snake: &mut [SnakeNode], z_angle: f64, y_angle: f64) {
    for node in snake {
        let mut point = node.position();
        rotate_y(&mut point, y_angle);
        rotate_z(&mut point, z_angle);
        node.set_position(normalize(point));

        for queued in node.history.iter_mut() {
            let Some(mut queued_point) = queued.take() else {
                continue;
            };
            rotate_y(&mut queued_point, y_angle);
            rotate_z(&mut queued_point, z_angle);
            *queued = Some(normalize(queued_point));
        }
    }
}

pub fn rotate_snake_around_axis(snake: &mut [SnakeNode], axis: Point, angle: f64) {
    for node in snake {
        let mut point = node.position();
        rotate_around_axis(&mut point, axis, angle);
        node.set_position(normalize(point));

        for queued in node.history.iter_mut() {
            let Some(mut queued_point) = queued.take() else {
                continue;
            };
            rotate_around_axis(&mut queued_point, axis, angle);
            *queued = Some(normalize(queued_point));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::math::angular_distance;

    fn node_at(x: f64, y: f64, z: f64) -> SnakeNode {
        new_node(normalize(Point { x, y, z }))
    }

    #[test]
    fn add_snake_node_continues_tail_arc_when_queue_history_missing() {
        let angle = 0.2f64;
        let mut snake = vec![node_at(1.0, 0.0, 0.0), node_at(angle.cos(), angle.sin(), 0.0)];

        add_snake_node(
            &mut snake,
            Point {
                x: 0.0,
                y: 1.0,
                z: 0.0,
            },
        );

        let added = snake.last().expect("added node");
        let expected = Point {
            x: (angle * 2.0).cos(),
            y: (angle * 2.0).sin(),
            z: 0.0,
        };
        let alignment = added.x * expected.x + added.y * expected.y + added.z * expected.z;
        assert!(alignment > 0.98);
    }

    #[test]
    fn advance_keeps_every_node_on_the_sphere() {
        let axis = Point {
            x: 0.0,
            y: 1.0,
            z: 0.0,
        };
        let mut snake = create_snake(axis);
        for _ in 0..300 {
            advance_chain_step(&mut snake, axis, NODE_ANGLE / 3.0);
        }
        for node in &snake {
            assert!((length(node.position()) - 1.0).abs() <= 1e-6);
        }
    }

    #[test]
    fn trailing_nodes_retrace_the_head_path() {
        let axis = Point {
            x: 0.0,
            y: 1.0,
            z: 0.0,
        };
        let mut snake = create_snake(axis);
        // Enough steps for the hand-off pipeline to fill all rings.
        for _ in 0..(NODE_QUEUE_SIZE * (STARTING_LENGTH + 2)) {
            advance_chain_step(&mut snake, axis, NODE_ANGLE / 4.0);
        }
        // Adjacent spacing is near-constant once the pipeline is primed.
        let spacings: Vec<f64> = snake
            .windows(2)
            .map(|pair| angular_distance(pair[0].position(), pair[1].position()))
            .collect();
        let first = spacings[0];
        for spacing in &spacings {
            assert!((spacing - first).abs() < first * 0.25);
        }
    }

    #[test]
    fn growth_node_has_synthesized_history() {
        let axis = Point {
            x: 0.0,
            y: 1.0,
            z: 0.0,
        };
        let mut snake = create_snake(axis);
        for _ in 0..NODE_QUEUE_SIZE {
            advance_chain_step(&mut snake, axis, NODE_ANGLE / 3.0);
        }
        let before = snake.len();
        add_snake_node_for_growth(&mut snake, axis);
        assert_eq!(snake.len(), before + 1);
        assert!(snake.last().expect("tail").history.back().is_some());
    }
}
