use super::diagnostics::Diagnostics;
use crate::game::math::{angular_distance, normalize, slerp};
use crate::game::types::Point;
use std::sync::Arc;

/// Below this head error the visible and predicted chains are treated as
/// equal and no correction runs.
pub const SOFT_ERROR_DEG: f64 = 1.5;
/// Above this head error the correction is always the fixed hard blend.
pub const HARD_ERROR_DEG: f64 = 6.0;
pub const SOFT_BLEND_MIN_MS: f64 = 60.0;
pub const SOFT_BLEND_MAX_MS: f64 = 120.0;
pub const HARD_BLEND_MS: f64 = 120.0;

/// Tail nodes converge slower than the head, lagging with the square of
/// their position down the chain, so corrections read as elastic catch-up.
const TAIL_LAG_STRENGTH: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionClass {
    None,
    Soft,
    Hard,
}

/// Classifies a head divergence (in degrees) into a correction class and a
/// blend duration in milliseconds. Soft corrections scale linearly from
/// 60 ms to 120 ms across the soft band.
pub fn classify_divergence(error_deg: f64, force_hard: bool) -> (CorrectionClass, f64) {
    if force_hard || error_deg > HARD_ERROR_DEG {
        return (CorrectionClass::Hard, HARD_BLEND_MS);
    }
    if error_deg < SOFT_ERROR_DEG {
        return (CorrectionClass::None, 0.0);
    }
    let band = (error_deg - SOFT_ERROR_DEG) / (HARD_ERROR_DEG - SOFT_ERROR_DEG);
    (
        CorrectionClass::Soft,
        SOFT_BLEND_MIN_MS + band * (SOFT_BLEND_MAX_MS - SOFT_BLEND_MIN_MS),
    )
}

#[derive(Debug, Clone)]
struct BlendState {
    from: Vec<Point>,
    to: Vec<Point>,
    started_at: i64,
    duration_ms: f64,
}

/// Smooths the seam between the previously displayed chain and a freshly
/// predicted one. Divergence is the expected steady state here, never an
/// error: it is classified, blended over a bounded window, and forgotten.
#[derive(Debug)]
pub struct Reconciler {
    displayed: Option<Vec<Point>>,
    blend: Option<BlendState>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Reconciler {
    pub fn new(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            displayed: None,
            blend: None,
            diagnostics,
        }
    }

    pub fn reset(&mut self) {
        self.displayed = None;
        self.blend = None;
    }

    /// Feeds the freshly predicted chain for this frame. With no prior state
    /// the chain is displayed directly; otherwise the head divergence picks
    /// the correction class and a blend window when needed.
    pub fn observe(&mut self, fresh: &[Point], now_ms: i64, force_hard: bool) {
        let fresh: Vec<Point> = fresh.iter().map(|point| normalize(*point)).collect();

        if let Some(blend) = &mut self.blend {
            // A window is already running: retarget it, and only restart on
            // a new hard divergence.
            let current = evaluate_blend(blend, now_ms);
            let error_deg = head_error_deg(&current, &fresh);
            let (class, duration_ms) = classify_divergence(error_deg, force_hard);
            blend.to = fresh;
            if class == CorrectionClass::Hard {
                self.diagnostics.record("reconcile.hard", error_deg);
                blend.from = current;
                blend.started_at = now_ms;
                blend.duration_ms = duration_ms;
            }
            return;
        }

        let Some(current) = self.displayed.clone() else {
            self.displayed = Some(fresh);
            return;
        };

        let error_deg = head_error_deg(&current, &fresh);
        let (class, duration_ms) = classify_divergence(error_deg, force_hard);
        match class {
            CorrectionClass::None => {
                self.displayed = Some(fresh);
            }
            CorrectionClass::Soft | CorrectionClass::Hard => {
                self.diagnostics.record(
                    match class {
                        CorrectionClass::Soft => "reconcile.soft",
                        _ => "reconcile.hard",
                    },
                    error_deg,
                );
                self.displayed = None;
                self.blend = Some(BlendState {
                    from: current,
                    to: fresh,
                    started_at: now_ms,
                    duration_ms,
                });
            }
        }
    }

    /// The chain to draw at `now_ms`. Completed blends collapse into the
    /// plain displayed chain.
    pub fn sample(&mut self, now_ms: i64) -> Option<Vec<Point>> {
        if let Some(blend) = &self.blend {
            if blend_progress(blend, now_ms) >= 1.0 {
                let settled = blend.to.clone();
                self.displayed = Some(settled.clone());
                self.blend = None;
                return Some(settled);
            }
            return Some(evaluate_blend(blend, now_ms));
        }
        self.displayed.clone()
    }

    pub fn is_blending(&self) -> bool {
        self.blend.is_some()
    }
}

fn head_error_deg(current: &[Point], fresh: &[Point]) -> f64 {
    match (current.first(), fresh.first()) {
        (Some(a), Some(b)) => angular_distance(*a, *b).to_degrees(),
        // A chain appearing or vanishing is a structural change: force hard.
        _ => HARD_ERROR_DEG * 2.0,
    }
}

fn blend_progress(blend: &BlendState, now_ms: i64) -> f64 {
    if blend.duration_ms <= 0.0 {
        return 1.0;
    }
    ((now_ms - blend.started_at) as f64 / blend.duration_ms).clamp(0.0, 1.0)
}

fn evaluate_blend(blend: &BlendState, now_ms: i64) -> Vec<Point> {
    let t = blend_progress(blend, now_ms);
    let len = blend.to.len();
    let mut out = Vec::with_capacity(len);
    for (index, target) in blend.to.iter().enumerate() {
        let start = blend
            .from
            .get(index)
            .copied()
            .unwrap_or(*target);
        let tail_frac = if len > 1 {
            index as f64 / (len - 1) as f64
        } else {
            0.0
        };
        let node_t = t.powf(1.0 + TAIL_LAG_STRENGTH * tail_frac * tail_frac);
        out.push(normalize(slerp(start, *target, node_t)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::diagnostics::NoopDiagnostics;
    use crate::game::math::length;

    fn chain_at(theta: f64, len: usize) -> Vec<Point> {
        (0..len)
            .map(|index| {
                let angle = theta - index as f64 * 0.05;
                Point {
                    x: angle.cos(),
                    y: angle.sin(),
                    z: 0.0,
                }
            })
            .collect()
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(Arc::new(NoopDiagnostics))
    }

    #[test]
    fn ten_degree_divergence_is_hard_with_fixed_window() {
        let (class, duration) = classify_divergence(10.0, false);
        assert_eq!(class, CorrectionClass::Hard);
        assert_eq!(duration, HARD_BLEND_MS);
    }

    #[test]
    fn sub_threshold_divergence_needs_no_correction() {
        let (class, duration) = classify_divergence(1.0, false);
        assert_eq!(class, CorrectionClass::None);
        assert_eq!(duration, 0.0);
    }

    #[test]
    fn soft_duration_scales_linearly_across_the_band() {
        let (class, at_low) = classify_divergence(SOFT_ERROR_DEG, false);
        assert_eq!(class, CorrectionClass::Soft);
        assert_eq!(at_low, SOFT_BLEND_MIN_MS);
        let (_, at_high) = classify_divergence(HARD_ERROR_DEG, false);
        assert_eq!(at_high, SOFT_BLEND_MAX_MS);
        let (_, at_mid) = classify_divergence((SOFT_ERROR_DEG + HARD_ERROR_DEG) / 2.0, false);
        assert!((at_mid - (SOFT_BLEND_MIN_MS + SOFT_BLEND_MAX_MS) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn force_hard_overrides_small_errors() {
        let (class, duration) = classify_divergence(0.1, true);
        assert_eq!(class, CorrectionClass::Hard);
        assert_eq!(duration, HARD_BLEND_MS);
    }

    #[test]
    fn first_observation_displays_directly() {
        let mut reconciler = reconciler();
        assert!(reconciler.sample(0).is_none());
        let chain = chain_at(0.0, 4);
        reconciler.observe(&chain, 0, false);
        assert!(!reconciler.is_blending());
        let displayed = reconciler.sample(0).expect("chain");
        assert_eq!(displayed.len(), 4);
    }

    #[test]
    fn hard_divergence_blends_head_faster_than_tail() {
        let mut reconciler = reconciler();
        reconciler.observe(&chain_at(0.0, 8), 0, false);
        // 10 degrees of divergence starts a hard blend.
        reconciler.observe(&chain_at(10f64.to_radians(), 8), 0, false);
        assert!(reconciler.is_blending());

        let halfway = reconciler.sample(60).expect("chain");
        let target = chain_at(10f64.to_radians(), 8);
        let start = chain_at(0.0, 8);
        let head_progress = angular_distance(start[0], halfway[0])
            / angular_distance(start[0], target[0]);
        let tail_progress = angular_distance(start[7], halfway[7])
            / angular_distance(start[7], target[7]);
        assert!(head_progress > tail_progress);
        for point in &halfway {
            assert!((length(*point) - 1.0).abs() <= 1e-6);
        }

        // At the end of the window the blend settles on the target exactly.
        let settled = reconciler.sample(120).expect("chain");
        assert!(!reconciler.is_blending());
        for (a, b) in settled.iter().zip(&target) {
            assert!(angular_distance(*a, normalize(*b)) < 1e-9);
        }
    }

    #[test]
    fn tiny_frame_to_frame_drift_snaps_without_blending() {
        let mut reconciler = reconciler();
        reconciler.observe(&chain_at(0.0, 4), 0, false);
        reconciler.observe(&chain_at(0.5f64.to_radians(), 4), 16, false);
        assert!(!reconciler.is_blending());
        let displayed = reconciler.sample(16).expect("chain");
        assert!(angular_distance(displayed[0], chain_at(0.5f64.to_radians(), 4)[0]) < 1e-9);
    }
}
