use super::geometry::tangent_basis;
use super::math::{clamp, dot};
use super::types::Point;
use crate::protocol::{Encoder, Reader};
use std::f64::consts::PI;

pub const BASE_PLANET_RADIUS: f64 = 1.0;
pub const PLANET_RADIUS: f64 = 3.0;
pub const PLANET_SCALE: f64 = PLANET_RADIUS / BASE_PLANET_RADIUS;

pub const SNAKE_RADIUS: f64 = 0.045;
pub const SNAKE_ANGULAR_RADIUS: f64 = SNAKE_RADIUS / PLANET_SCALE;

pub const LAKE_COUNT: usize = 2;
pub const LAKE_MIN_ANGLE: f64 = 0.9 / PLANET_SCALE;
pub const LAKE_MAX_ANGLE: f64 = 1.3 / PLANET_SCALE;
pub const LAKE_MIN_DEPTH: f64 = BASE_PLANET_RADIUS * 0.07;
pub const LAKE_MAX_DEPTH: f64 = BASE_PLANET_RADIUS * 0.12;
pub const LAKE_EDGE_FALLOFF: f64 = 0.08;
pub const LAKE_NOISE_AMPLITUDE: f64 = 0.35;
pub const LAKE_EXCLUSION_THRESHOLD: f64 = 0.18;

pub const TREE_COUNT: usize = 28;
pub const TREE_HEIGHT: f64 = BASE_PLANET_RADIUS * 0.3;
pub const TREE_TRUNK_RADIUS: f64 = TREE_HEIGHT * 0.12;
pub const TREE_MIN_SCALE: f64 = 0.9;
pub const TREE_MAX_SCALE: f64 = 1.15;
pub const TREE_MIN_ANGLE: f64 = 0.42;

pub const MOUNTAIN_COUNT: usize = 8;
pub const MOUNTAIN_RADIUS_MIN: f64 = BASE_PLANET_RADIUS * 0.12;
pub const MOUNTAIN_RADIUS_MAX: f64 = BASE_PLANET_RADIUS * 0.22;
pub const MOUNTAIN_HEIGHT_MIN: f64 = BASE_PLANET_RADIUS * 0.12;
pub const MOUNTAIN_HEIGHT_MAX: f64 = BASE_PLANET_RADIUS * 0.26;
pub const MOUNTAIN_MIN_ANGLE: f64 = 0.55;
pub const MOUNTAIN_OUTLINE_SAMPLES: usize = 64;

const LAKE_SEED: u32 = 0x91fcae12;
const ENV_SEED: u32 = 0x6f35d2a1;
const MOUNTAIN_OUTLINE_SEED: u32 = 0x03f2a9b1;

#[derive(Debug, Clone)]
pub struct Lake {
    pub center: Point,
    pub radius: f64,
    pub depth: f64,
    pub noise_amplitude: f64,
    pub noise_frequency: f64,
    pub noise_phase: f64,
}

#[derive(Debug, Clone)]
pub struct TreeInstance {
    pub normal: Point,
    pub width_scale: f64,
    pub height_scale: f64,
    pub twist: f64,
}

#[derive(Debug, Clone)]
pub struct MountainInstance {
    pub normal: Point,
    pub radius: f64,
    pub height: f64,
    pub twist: f64,
    pub outline: Vec<f64>,
}

/// Static obstacle description shared verbatim by the authoritative
/// simulation and the client parity engine. Sent once in the init payload;
/// identical geometry on both sides is what makes collision parity possible.
#[derive(Debug, Clone)]
pub struct Environment {
    pub lakes: Vec<Lake>,
    pub trees: Vec<TreeInstance>,
    pub mountains: Vec<MountainInstance>,
}

impl Environment {
    pub fn generate() -> Self {
        let lakes = create_lakes(LAKE_SEED, LAKE_COUNT);
        let mut rng = SeededRng::new(ENV_SEED);
        let rand_range = |rng: &mut SeededRng, min: f64, max: f64| min + (max - min) * rng.next_f64();

        let is_in_lake =
            |candidate: Point| lake_boundary(candidate, &lakes) > LAKE_EXCLUSION_THRESHOLD;

        let min_dot = TREE_MIN_ANGLE.cos();
        let mut trees = Vec::with_capacity(TREE_COUNT);
        let mut tree_normals: Vec<Point> = Vec::with_capacity(TREE_COUNT);
        for _ in 0..TREE_COUNT {
            let candidate = pick_sparse_normal(&mut rng, min_dot, &tree_normals, &is_in_lake);
            let width_scale = rand_range(&mut rng, TREE_MIN_SCALE, TREE_MAX_SCALE);
            let height_scale = rand_range(&mut rng, TREE_MIN_SCALE, TREE_MAX_SCALE);
            let twist = rand_range(&mut rng, 0.0, PI * 2.0);
            tree_normals.push(candidate);
            trees.push(TreeInstance {
                normal: candidate,
                width_scale,
                height_scale,
                twist,
            });
        }

        let mountain_min_dot = MOUNTAIN_MIN_ANGLE.cos();
        let mut mountains = Vec::with_capacity(MOUNTAIN_COUNT);
        let mut mountain_normals: Vec<Point> = Vec::with_capacity(MOUNTAIN_COUNT);
        for index in 0..MOUNTAIN_COUNT {
            let candidate =
                pick_sparse_normal(&mut rng, mountain_min_dot, &mountain_normals, &is_in_lake);
            let radius = rand_range(&mut rng, MOUNTAIN_RADIUS_MIN, MOUNTAIN_RADIUS_MAX);
            let height = rand_range(&mut rng, MOUNTAIN_HEIGHT_MIN, MOUNTAIN_HEIGHT_MAX);
            let twist = rand_range(&mut rng, 0.0, PI * 2.0);
            let base_angle = radius / PLANET_RADIUS;
            let outline_seed = MOUNTAIN_OUTLINE_SEED.wrapping_add(index as u32 * 57);
            let outline = build_mountain_outline(outline_seed, base_angle);
            mountain_normals.push(candidate);
            mountains.push(MountainInstance {
                normal: candidate,
                radius,
                height,
                twist,
                outline,
            });
        }

        Environment {
            lakes,
            trees,
            mountains,
        }
    }

    pub fn encoded_len(&self) -> usize {
        let mut len = 0usize;
        len += 2 + self.lakes.len() * (12 + 5 * 4);
        len += 2 + self.trees.len() * (6 * 4);
        len += 2;
        for mountain in &self.mountains {
            len += 12 + 4 + 4 + 4 + 2 + mountain.outline.len() * 4;
        }
        len
    }

    pub fn write_to(&self, encoder: &mut Encoder) {
        encoder.write_u16(self.lakes.len().min(u16::MAX as usize) as u16);
        for lake in &self.lakes {
            encoder.write_point(lake.center);
            encoder.write_f32(lake.radius as f32);
            encoder.write_f32(lake.depth as f32);
            encoder.write_f32(lake.noise_amplitude as f32);
            encoder.write_f32(lake.noise_frequency as f32);
            encoder.write_f32(lake.noise_phase as f32);
        }

        encoder.write_u16(self.trees.len().min(u16::MAX as usize) as u16);
        for tree in &self.trees {
            encoder.write_point(tree.normal);
            encoder.write_f32(tree.width_scale as f32);
            encoder.write_f32(tree.height_scale as f32);
            encoder.write_f32(tree.twist as f32);
        }

        encoder.write_u16(self.mountains.len().min(u16::MAX as usize) as u16);
        for mountain in &self.mountains {
            encoder.write_point(mountain.normal);
            encoder.write_f32(mountain.radius as f32);
            encoder.write_f32(mountain.height as f32);
            encoder.write_f32(mountain.twist as f32);
            let outline_len = mountain.outline.len().min(u16::MAX as usize) as u16;
            encoder.write_u16(outline_len);
            for value in mountain.outline.iter().take(outline_len as usize) {
                encoder.write_f32(*value as f32);
            }
        }
    }

    pub fn read_from(reader: &mut Reader) -> Option<Self> {
        let lake_count = reader.read_u16()? as usize;
        let mut lakes = Vec::with_capacity(lake_count);
        for _ in 0..lake_count {
            lakes.push(Lake {
                center: reader.read_point()?,
                radius: reader.read_f32()? as f64,
                depth: reader.read_f32()? as f64,
                noise_amplitude: reader.read_f32()? as f64,
                noise_frequency: reader.read_f32()? as f64,
                noise_phase: reader.read_f32()? as f64,
            });
        }

        let tree_count = reader.read_u16()? as usize;
        let mut trees = Vec::with_capacity(tree_count);
        for _ in 0..tree_count {
            trees.push(TreeInstance {
                normal: reader.read_point()?,
                width_scale: reader.read_f32()? as f64,
                height_scale: reader.read_f32()? as f64,
                twist: reader.read_f32()? as f64,
            });
        }

        let mountain_count = reader.read_u16()? as usize;
        let mut mountains = Vec::with_capacity(mountain_count);
        for _ in 0..mountain_count {
            let normal = reader.read_point()?;
            let radius = reader.read_f32()? as f64;
            let height = reader.read_f32()? as f64;
            let twist = reader.read_f32()? as f64;
            let outline_len = reader.read_u16()? as usize;
            let mut outline = Vec::with_capacity(outline_len);
            for _ in 0..outline_len {
                outline.push(reader.read_f32()? as f64);
            }
            mountains.push(MountainInstance {
                normal,
                radius,
                height,
                twist,
                outline,
            });
        }

        Some(Environment {
            lakes,
            trees,
            mountains,
        })
    }
}

/// Strength of lake coverage at `normal`, 0 outside any lake, rising to 1 at
/// a lake core. Used for spawn/placement exclusion.
pub fn lake_boundary(normal: Point, lakes: &[Lake]) -> f64 {
    let mut max_boundary: f64 = 0.0;

    for lake in lakes {
        let dot_value = clamp(dot(lake.center, normal), -1.0, 1.0);
        let angle = dot_value.acos();
        if !angle.is_finite() || angle >= lake.radius + LAKE_EDGE_FALLOFF {
            continue;
        }

        let (tangent, bitangent) = tangent_basis(lake.center);
        let temp = Point {
            x: normal.x - lake.center.x * dot_value,
            y: normal.y - lake.center.y * dot_value,
            z: normal.z - lake.center.z * dot_value,
        };
        let x = dot(temp, tangent);
        let y = dot(temp, bitangent);
        let wobble = ((x + y) * lake.noise_frequency + lake.noise_phase).sin();
        let edge_radius = clamp(
            lake.radius * (1.0 + lake.noise_amplitude * wobble),
            lake.radius * 0.65,
            lake.radius * 1.35,
        );
        if angle >= edge_radius {
            continue;
        }

        let edge_t = clamp((edge_radius - angle) / LAKE_EDGE_FALLOFF, 0.0, 1.0);
        max_boundary = max_boundary.max(edge_t * edge_t);
    }

    max_boundary
}

fn create_lakes(seed: u32, count: usize) -> Vec<Lake> {
    let mut rng = SeededRng::new(seed);
    let mut lakes = Vec::with_capacity(count);
    let rand_range = |rng: &mut SeededRng, min: f64, max: f64| min + (max - min) * rng.next_f64();

    for _ in 0..count {
        let radius = rand_range(&mut rng, LAKE_MIN_ANGLE, LAKE_MAX_ANGLE);
        let depth = rand_range(&mut rng, LAKE_MIN_DEPTH, LAKE_MAX_DEPTH);
        let center = pick_lake_center(radius, &lakes, &mut rng);
        let noise_frequency = rand_range(&mut rng, 3.0, 6.0);
        let noise_phase = rng.next_f64() * PI * 2.0;

        lakes.push(Lake {
            center,
            radius,
            depth,
            noise_amplitude: LAKE_NOISE_AMPLITUDE,
            noise_frequency,
            noise_phase,
        });
    }

    lakes
}

fn pick_lake_center(radius: f64, lakes: &[Lake], rng: &mut SeededRng) -> Point {
    for _ in 0..80 {
        let candidate = random_on_sphere(rng);
        let mut ok = true;
        for lake in lakes {
            let min_sep = (radius + lake.radius) * 0.75;
            if dot(candidate, lake.center) > min_sep.cos() {
                ok = false;
                break;
            }
        }
        if ok {
            return candidate;
        }
    }
    random_on_sphere(rng)
}

fn pick_sparse_normal(
    rng: &mut SeededRng,
    min_dot: f64,
    existing: &[Point],
    is_in_lake: &dyn Fn(Point) -> bool,
) -> Point {
    for _ in 0..60 {
        let candidate = random_on_sphere(rng);
        if is_in_lake(candidate) {
            continue;
        }
        let mut ok = true;
        for other in existing {
            if dot(*other, candidate) > min_dot {
                ok = false;
                break;
            }
        }
        if ok {
            return candidate;
        }
    }
    for _ in 0..40 {
        let candidate = random_on_sphere(rng);
        if !is_in_lake(candidate) {
            return candidate;
        }
    }
    random_on_sphere(rng)
}

fn build_mountain_outline(seed: u32, base_angle: f64) -> Vec<f64> {
    let mut rng = SeededRng::new(seed);
    let variance = 0.18 + rng.next_f64() * 0.06;
    let mut outline = vec![0.0; MOUNTAIN_OUTLINE_SAMPLES];
    for (index, slot) in outline.iter_mut().enumerate() {
        let theta = (index as f64 / MOUNTAIN_OUTLINE_SAMPLES as f64) * PI * 2.0;
        let qx = (theta.cos() * 1024.0).round() as i32;
        let qz = (theta.sin() * 1024.0).round() as i32;
        let jitter = hash3(seed, qx, 0, qz) * 2.0 - 1.0;
        let scale = 1.0 + jitter * variance;
        *slot = (base_angle * scale).max(base_angle * 0.5);
    }

    // Box-smooth so the clamped collision boundary has no sharp steps.
    let mut smoothed = vec![0.0; MOUNTAIN_OUTLINE_SAMPLES];
    for (index, slot) in smoothed.iter_mut().enumerate() {
        let mut sum = 0.0;
        for offset in -2isize..=2 {
            let neighbor =
                (index as isize + offset).rem_euclid(MOUNTAIN_OUTLINE_SAMPLES as isize) as usize;
            sum += outline[neighbor];
        }
        *slot = sum / 5.0;
    }

    smoothed
}

fn hash3(seed: u32, x: i32, y: i32, z: i32) -> f64 {
    let mut h = seed ^ 0x9e3779b9;
    h = (h ^ x as u32).wrapping_mul(0x85ebca6b);
    h = (h ^ y as u32).wrapping_mul(0xc2b2ae35);
    h = (h ^ z as u32).wrapping_mul(0x27d4eb2f);
    h ^= h >> 16;
    (h as f64) / 4294967296.0
}

fn random_on_sphere(rng: &mut SeededRng) -> Point {
    let theta = rng.next_f64() * PI * 2.0;
    let z = rng.next_f64() * 2.0 - 1.0;
    let r = (1.0 - z * z).max(0.0).sqrt();
    Point {
        x: r * theta.cos(),
        y: z,
        z: r * theta.sin(),
    }
}

/// Deterministic generator: the environment must come out identical on every
/// run and across client/server builds, so no external RNG is used here.
#[derive(Debug, Clone)]
struct SeededRng {
    state: u32,
}

impl SeededRng {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6d2b79f5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(1 | t);
        let t2 = (t ^ (t >> 7)).wrapping_mul(61 | t);
        t ^= t.wrapping_add(t2);
        let value = t ^ (t >> 14);
        (value as f64) / 4294967296.0
    }
}
