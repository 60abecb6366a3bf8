//! Collision-aware target placement

use glam::Vec3;
use rand::Rng;

use super::target::{Target, TargetSpec};

/// Random candidates tried before falling back
pub const MAX_ATTEMPTS: usize = 50;
/// Candidates sampled by the fallback
pub const FALLBACK_CANDIDATES: usize = 20;
/// Gap kept between the edges of two targets
pub const SPACING_BUFFER: f32 = 1.0;
/// Minimum centre distance as a multiple of the new target's size
pub const MIN_DISTANCE_FACTOR: f32 = 3.0;

/// Spawn volume in front of the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementBounds {
    /// Half width of the spawn rectangle
    pub max_x: f32,
    /// Half height of the spawn rectangle
    pub max_y: f32,
    /// Z coordinate of the spawn plane
    pub depth: f32,
    pub fallback_max_x: f32,
    pub fallback_max_y: f32,
}

impl Default for PlacementBounds {
    fn default() -> Self {
        Self {
            max_x: 5.0,
            max_y: 4.0,
            depth: -8.0,
            fallback_max_x: 2.0,
            fallback_max_y: 1.5,
        }
    }
}

/// Chosen spawn position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Vec3,
    /// True when no candidate met the spacing rule
    pub fallback: bool,
}

/// Pick a spawn position for a target of the given spec.
///
/// Every target in `existing` counts, including targets whose removal animation is
/// still running. Never fails: when all attempts violate the spacing rule, the
/// best-spread of a smaller set of candidates is used instead.
pub fn place_target<R: Rng + ?Sized>(
    existing: &[Target],
    spec: &TargetSpec,
    bounds: &PlacementBounds,
    rng: &mut R,
) -> Placement {
    let size = spec.effective_size();

    for _ in 0..MAX_ATTEMPTS {
        let candidate = sample(rng, bounds.max_x, bounds.max_y, bounds.depth);
        if is_valid_position(candidate, size, existing) {
            return Placement {
                position: candidate,
                fallback: false,
            };
        }
    }

    let candidates: Vec<Vec3> = (0..FALLBACK_CANDIDATES)
        .map(|_| sample(rng, bounds.fallback_max_x, bounds.fallback_max_y, bounds.depth))
        .collect();

    Placement {
        position: best_spread(&candidates, existing).unwrap_or(Vec3::new(0.0, 0.0, bounds.depth)),
        fallback: true,
    }
}

/// Spacing rule between a candidate and every existing target
pub fn is_valid_position(candidate: Vec3, candidate_size: f32, existing: &[Target]) -> bool {
    let min_distance = candidate_size * MIN_DISTANCE_FACTOR;

    existing.iter().all(|target| {
        let required = (candidate_size + target.effective_size()) / 2.0 + SPACING_BUFFER;
        candidate.distance(target.position) >= required.max(min_distance)
    })
}

/// Distance from a point to the closest existing target
pub fn min_distance_to(point: Vec3, existing: &[Target]) -> f32 {
    existing
        .iter()
        .map(|target| point.distance(target.position))
        .fold(f32::INFINITY, f32::min)
}

/// Candidate maximising the minimum distance to any existing target.
/// Ties keep the earliest candidate.
pub fn best_spread(candidates: &[Vec3], existing: &[Target]) -> Option<Vec3> {
    let mut best: Option<(Vec3, f32)> = None;

    for &candidate in candidates {
        let spread = min_distance_to(candidate, existing);
        match best {
            Some((_, best_spread)) if spread <= best_spread => {}
            _ => best = Some((candidate, spread)),
        }
    }

    best.map(|(position, _)| position)
}

fn sample<R: Rng + ?Sized>(rng: &mut R, max_x: f32, max_y: f32, depth: f32) -> Vec3 {
    let x = (rng.gen::<f32>() - 0.5) * max_x * 2.0;
    let y = (rng.gen::<f32>() - 0.5) * max_y * 2.0;
    Vec3::new(x, y, depth)
}
