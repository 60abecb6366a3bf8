//! Hit resolution - ray test against target primitives with an angular fallback

use glam::Vec3;

use crate::ws::protocol::TargetShape;

use super::target::{Target, TargetId};

/// Closest distance a ray can register a hit at
pub const RAY_NEAR: f32 = 0.1;
pub const RAY_FAR: f32 = 500.0;
/// Targets further than this are ignored by the angular fallback
pub const FALLBACK_RANGE: f32 = 15.0;
/// Half-angle of the fallback cone in degrees
pub const FALLBACK_CONE_DEGREES: f32 = 5.0;

/// Geometric intersection against the live target set.
///
/// The rendering side can supply its own implementation when it owns the scene
/// geometry; [`PrimitiveCaster`] intersects the engine's own primitives.
pub trait RayCaster: Send {
    /// Nearest target hit by the ray, skipping targets being removed
    fn cast(&self, origin: Vec3, direction: Vec3, targets: &[Target]) -> Option<TargetId>;
}

/// Ray caster over sphere and axis-aligned box volumes
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveCaster;

impl RayCaster for PrimitiveCaster {
    fn cast(&self, origin: Vec3, direction: Vec3, targets: &[Target]) -> Option<TargetId> {
        targets
            .iter()
            .filter(|t| !t.being_removed)
            .filter_map(|t| {
                let distance = match t.shape {
                    TargetShape::Sphere => ray_sphere(origin, direction, t.position, t.hit_extent()),
                    TargetShape::Box => ray_box(origin, direction, t.position, t.hit_extent()),
                }?;
                (RAY_NEAR..=RAY_FAR).contains(&distance).then_some((t.id, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}

/// Which test registered the hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitMethod {
    Ray,
    /// Angular fallback
    Cone,
}

/// Outcome of a single fire event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitResult {
    Hit { target_id: TargetId, method: HitMethod },
    Miss,
}

#[cfg(test)]
impl HitResult {
    pub fn target_id(&self) -> Option<TargetId> {
        match self {
            HitResult::Hit { target_id, .. } => Some(*target_id),
            HitResult::Miss => None,
        }
    }
}

/// Decide which target, if any, a click at `direction` eliminates.
///
/// Targets being removed are never selected, so firing again at a target that
/// was just hit resolves to another target or a miss.
pub fn resolve_fire(
    origin: Vec3,
    direction: Vec3,
    targets: &[Target],
    caster: &dyn RayCaster,
) -> HitResult {
    let direction = direction.normalize_or_zero();
    if direction == Vec3::ZERO {
        return HitResult::Miss;
    }

    let ray_hit = caster
        .cast(origin, direction, targets)
        .filter(|id| targets.iter().any(|t| t.id == *id && !t.being_removed));

    if let Some(target_id) = ray_hit {
        return HitResult::Hit {
            target_id,
            method: HitMethod::Ray,
        };
    }

    let max_angle = FALLBACK_CONE_DEGREES.to_radians();
    for target in targets.iter().filter(|t| !t.being_removed) {
        let to_target = target.position - origin;
        let distance = to_target.length();
        if distance >= FALLBACK_RANGE || distance <= f32::EPSILON {
            continue;
        }

        let cos = direction.dot(to_target / distance).clamp(-1.0, 1.0);
        if cos.acos() < max_angle {
            return HitResult::Hit {
                target_id: target.id,
                method: HitMethod::Cone,
            };
        }
    }

    HitResult::Miss
}

/// Distance along a normalized ray to a sphere surface
pub fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let origin_to_center = center - origin;
    let projection = origin_to_center.dot(direction);
    let distance_sq = origin_to_center.length_squared() - projection * projection;
    let radius_sq = radius * radius;

    if distance_sq > radius_sq {
        return None;
    }

    let half_chord = (radius_sq - distance_sq).sqrt();
    let near = projection - half_chord;
    let far = projection + half_chord;

    if near > 1e-6 {
        Some(near)
    } else if far > 1e-6 {
        // origin inside the sphere
        Some(far)
    } else {
        None
    }
}

/// Distance along a ray to an axis-aligned cube (slab test)
pub fn ray_box(origin: Vec3, direction: Vec3, center: Vec3, half_extent: f32) -> Option<f32> {
    let min = center - Vec3::splat(half_extent);
    let max = center + Vec3::splat(half_extent);
    let inv = direction.recip();

    let t1 = (min - origin) * inv;
    let t2 = (max - origin) * inv;
    let t_near = t1.min(t2).max_element();
    let t_far = t1.max(t2).min_element();

    if t_near > t_far || t_far < 0.0 {
        return None;
    }

    Some(if t_near > 0.0 { t_near } else { t_far })
}
