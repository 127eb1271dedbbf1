use super::constants::{BASE_SPEED, BOOST_MULTIPLIER, STARTING_LENGTH, STEER_GAIN, TURN_RATE};
use super::environment::{Environment, MountainInstance, PLANET_RADIUS, TREE_TRUNK_RADIUS};
use super::geometry::{sample_outline_radius, tangent_basis};
use super::math::{angular_distance, clamp, cross, dot, length, normalize, rotate_toward};
use super::snake::{advance_chain_step, rotate_snake_around_axis};
use super::types::{Point, SnakeNode};
use std::f64::consts::PI;

const CONTACT_ITERATIONS: usize = 4;
const STICK_THRESHOLD: f64 = 0.01;

/// Effective per-tick turn-rate cap as a function of chain length and speed.
///
/// Saturating filter of (length agility × speed agility), normalized so the
/// starting baseline (fresh chain, no boost) yields exactly `TURN_RATE`.
/// Boost raises agility with diminishing returns; long chains lower it.
/// This is the single authoritative formula: the room tick and the client
/// parity replay both call it.
pub fn turn_rate_cap(chain_len: usize, speed_factor: f64) -> f64 {
    let length_agility = (STARTING_LENGTH as f64 / chain_len.max(STARTING_LENGTH) as f64).sqrt();
    let speed_agility = clamp(speed_factor, 1.0, BOOST_MULTIPLIER);
    TURN_RATE * (length_agility * speed_agility).tanh() / 1.0f64.tanh()
}

/// One steering update: rotate the heading axis toward the target by a
/// proportional step bounded by the turn-rate cap.
pub fn steer_axis(axis: Point, target_axis: Point, chain_len: usize, speed_factor: f64) -> Point {
    let cap = turn_rate_cap(chain_len, speed_factor);
    let error = angular_distance(axis, target_axis);
    let step = clamp(error * STEER_GAIN, 0.0, cap);
    rotate_toward(axis, target_axis, step)
}

/// Splits one tick of travel into sub-steps so the per-step rotation stays
/// bounded while boosting. Returns (step count, per-step angular velocity).
pub fn movement_plan(speed_factor: f64) -> (i32, f64) {
    let step_count = (speed_factor.round() as i32).max(1);
    let step_velocity = (BASE_SPEED * speed_factor) / step_count as f64;
    (step_count, step_velocity)
}

/// Advances the chain by `steps` sub-steps, resolving environment contacts
/// after each. When the head is pushed out of an obstacle the whole chain is
/// rotated by the correction so spacing is preserved, and the heading axis is
/// re-derived from the corrected tangent.
pub fn advance_snake_with_collisions(
    snake: &mut Vec<SnakeNode>,
    axis: &mut Point,
    snake_angular_radius: f64,
    step_velocity: f64,
    steps: i32,
    env: &Environment,
) {
    let step_count = steps.max(1);
    for _ in 0..step_count {
        advance_chain_step(snake, *axis, step_velocity);
        if snake.is_empty() {
            continue;
        }
        let raw_head = snake[0].position();
        let (corrected_head, corrected_axis) =
            resolve_head_collisions(raw_head, *axis, snake_angular_radius, env);
        let angle = angular_distance(raw_head, corrected_head);
        if angle > 1e-6 {
            let axis_vec = cross(raw_head, corrected_head);
            if length(axis_vec) > 1e-8 {
                let axis_norm = normalize(axis_vec);
                rotate_snake_around_axis(snake, axis_norm, angle);
            }
        }
        *axis = corrected_axis;
    }
}

/// Clamps a head position out of every overlapping obstacle. Iterates a few
/// passes since corrections can push the head into a neighboring obstacle.
pub fn resolve_head_collisions(
    head: Point,
    axis: Point,
    snake_angular_radius: f64,
    env: &Environment,
) -> (Point, Point) {
    let mut head = normalize(head);
    let mut tangent = cross(axis, head);
    if length(tangent) > 1e-6 {
        tangent = normalize(tangent);
    }

    for _ in 0..CONTACT_ITERATIONS {
        let mut any_contact = false;

        for tree in &env.trees {
            if tree.width_scale < 0.0 {
                continue;
            }
            let tree_radius = (TREE_TRUNK_RADIUS * tree.width_scale) / PLANET_RADIUS;
            if let Some((new_head, normal)) =
                resolve_circle_contact(head, tree.normal, tree_radius, snake_angular_radius)
            {
                head = new_head;
                tangent = clip_tangent(tangent, normal);
                any_contact = true;
            }
        }

        for mountain in &env.mountains {
            if let Some((new_head, normal)) =
                resolve_mountain_contact(head, mountain, snake_angular_radius)
            {
                head = new_head;
                tangent = clip_tangent(tangent, normal);
                any_contact = true;
            }
        }

        if !any_contact {
            break;
        }
    }

    let axis_out = if length(tangent) < 1e-6 {
        axis
    } else {
        normalize(cross(head, tangent))
    };

    (head, axis_out)
}

fn resolve_circle_contact(
    head: Point,
    center: Point,
    radius: f64,
    snake_angular_radius: f64,
) -> Option<(Point, Point)> {
    let dot_value = clamp(dot(head, center), -1.0, 1.0);
    let angle = dot_value.acos();
    let target_angle = radius + snake_angular_radius;
    if !angle.is_finite() || angle >= target_angle {
        return None;
    }
    let mut dir = Point {
        x: head.x - center.x * dot_value,
        y: head.y - center.y * dot_value,
        z: head.z - center.z * dot_value,
    };
    if length(dir) < 1e-6 {
        dir = fallback_tangent(center);
    }
    let dir = normalize(dir);
    let new_head = Point {
        x: center.x * target_angle.cos() + dir.x * target_angle.sin(),
        y: center.y * target_angle.cos() + dir.y * target_angle.sin(),
        z: center.z * target_angle.cos() + dir.z * target_angle.sin(),
    };
    Some((normalize(new_head), dir))
}

fn resolve_mountain_contact(
    head: Point,
    mountain: &MountainInstance,
    snake_angular_radius: f64,
) -> Option<(Point, Point)> {
    let dot_value = clamp(dot(head, mountain.normal), -1.0, 1.0);
    let angle = dot_value.acos();
    if !angle.is_finite() {
        return None;
    }

    let (tangent, bitangent) = tangent_basis(mountain.normal);
    let mut projection = Point {
        x: head.x - mountain.normal.x * dot_value,
        y: head.y - mountain.normal.y * dot_value,
        z: head.z - mountain.normal.z * dot_value,
    };
    let proj_len = length(projection);
    if proj_len < 1e-6 {
        projection = tangent;
    }
    let x = dot(projection, tangent);
    let y = dot(projection, bitangent);
    let mut theta = y.atan2(x);
    if theta < 0.0 {
        theta += PI * 2.0;
    }
    let outline_radius = sample_outline_radius(&mountain.outline, theta);
    let target_angle = outline_radius + snake_angular_radius;
    if angle >= target_angle {
        return None;
    }
    let dir = normalize(Point {
        x: tangent.x * x + bitangent.x * y,
        y: tangent.y * x + bitangent.y * y,
        z: tangent.z * x + bitangent.z * y,
    });
    let new_head = Point {
        x: mountain.normal.x * target_angle.cos() + dir.x * target_angle.sin(),
        y: mountain.normal.y * target_angle.cos() + dir.y * target_angle.sin(),
        z: mountain.normal.z * target_angle.cos() + dir.z * target_angle.sin(),
    };
    Some((normalize(new_head), dir))
}

/// Removes the inward component of the travel tangent at a contact, so the
/// head slides along the obstacle instead of grinding into it.
fn clip_tangent(mut tangent: Point, normal: Point) -> Point {
    if length(tangent) < 1e-6 {
        return tangent;
    }
    let inward = dot(tangent, normal);
    if inward < 0.0 {
        tangent = Point {
            x: tangent.x - normal.x * inward,
            y: tangent.y - normal.y * inward,
            z: tangent.z - normal.z * inward,
        };
    }
    if length(tangent) < STICK_THRESHOLD {
        Point {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    } else {
        normalize(tangent)
    }
}

fn fallback_tangent(normal: Point) -> Point {
    let (tangent, _) = tangent_basis(normal);
    tangent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::environment::TreeInstance;

    #[test]
    fn turn_rate_baseline_matches_configured_rate() {
        let cap = turn_rate_cap(STARTING_LENGTH, 1.0);
        assert!((cap - TURN_RATE).abs() < 1e-12);
    }

    #[test]
    fn boost_raises_and_length_lowers_agility() {
        let base = turn_rate_cap(STARTING_LENGTH, 1.0);
        assert!(turn_rate_cap(STARTING_LENGTH, BOOST_MULTIPLIER) > base);
        assert!(turn_rate_cap(STARTING_LENGTH * 8, 1.0) < base);
        // Saturation: boosting can never more than double the cap.
        assert!(turn_rate_cap(STARTING_LENGTH, BOOST_MULTIPLIER) < base * 2.0);
    }

    #[test]
    fn steering_is_proportional_and_capped() {
        let axis = Point {
            x: 1.0,
            y: 0.0,
            z: 0.0,
        };
        let target = Point {
            x: 0.0,
            y: 1.0,
            z: 0.0,
        };
        let stepped = steer_axis(axis, target, STARTING_LENGTH, 1.0);
        let moved = angular_distance(axis, stepped);
        let cap = turn_rate_cap(STARTING_LENGTH, 1.0);
        assert!(moved <= cap + 1e-12);
        assert!(moved > 0.0);
    }

    #[test]
    fn movement_plan_substeps_when_boosting() {
        let (steps, velocity) = movement_plan(1.0);
        assert_eq!(steps, 1);
        assert!((velocity - BASE_SPEED).abs() < 1e-12);
        let (steps, velocity) = movement_plan(BOOST_MULTIPLIER);
        assert_eq!(steps, 2);
        assert!((velocity * steps as f64 - BASE_SPEED * BOOST_MULTIPLIER).abs() < 1e-12);
    }

    #[test]
    fn circle_contact_clamps_head_to_obstacle_rim() {
        let center = Point {
            x: 0.0,
            y: 0.0,
            z: 1.0,
        };
        let head = Point {
            x: 0.01,
            y: 0.0,
            z: 1.0,
        };
        let env = Environment {
            lakes: Vec::new(),
            trees: vec![TreeInstance {
                normal: center,
                width_scale: 1.0,
                height_scale: 1.0,
                twist: 0.0,
            }],
            mountains: Vec::new(),
        };
        let radius = 0.02;
        let (corrected, _) = resolve_head_collisions(normalize(head), fallback_tangent(center), radius, &env);
        let rim = (TREE_TRUNK_RADIUS * 1.0) / PLANET_RADIUS + radius;
        assert!(angular_distance(corrected, center) >= rim - 1e-9);
    }
}
