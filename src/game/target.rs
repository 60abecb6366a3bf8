//! Targets and the shape/size policy used when spawning them

use glam::Vec3;

use crate::ws::protocol::{GameMode, TargetShape, TargetView};

pub type TargetId = u32;

/// Nominal target size before mode and shape scaling
pub const BASE_TARGET_SIZE: f32 = 1.2;
/// Score from which boxes replace spheres
pub const BOX_SCORE_THRESHOLD: u32 = 15;
/// Boxes are drawn larger than spheres of the same nominal size
pub const BOX_SIZE_SCALE: f32 = 1.6;
/// Footprint of a box relative to its size, used for spacing
pub const BOX_FOOTPRINT_SCALE: f32 = 1.6;
pub const PRECISION_SIZE_SCALE: f32 = 0.67;
/// Duration of the removal animation after a hit
pub const REMOVAL_ANIMATION_MS: u64 = 180;

/// Shape and size of the next target to spawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSpec {
    pub shape: TargetShape,
    pub size: f32,
}

impl TargetSpec {
    /// Spheres until the player reaches the box threshold, then boxes
    pub fn for_score(score: u32, mode: GameMode, size_scale: f32) -> Self {
        let shape = if score < BOX_SCORE_THRESHOLD {
            TargetShape::Sphere
        } else {
            TargetShape::Box
        };

        let mut size = BASE_TARGET_SIZE * size_scale;
        if mode == GameMode::Precision {
            size *= PRECISION_SIZE_SCALE;
        }
        if shape == TargetShape::Box {
            size *= BOX_SIZE_SCALE;
        }

        Self { shape, size }
    }

    /// Size used by placement spacing checks
    pub fn effective_size(&self) -> f32 {
        effective_size(self.shape, self.size)
    }
}

pub fn effective_size(shape: TargetShape, size: f32) -> f32 {
    match shape {
        TargetShape::Sphere => size,
        TargetShape::Box => size * BOX_FOOTPRINT_SCALE,
    }
}

/// Live target in a session
#[derive(Debug, Clone)]
pub struct Target {
    pub id: TargetId,
    pub shape: TargetShape,
    pub base_size: f32,
    pub position: Vec3,
    /// Spawn time in milliseconds, reaction times are measured from here
    pub spawned_at: u64,
    pub being_removed: bool,
    pub removed_at: Option<u64>,
}

impl Target {
    pub fn new(id: TargetId, spec: TargetSpec, position: Vec3, now: u64) -> Self {
        Self {
            id,
            shape: spec.shape,
            base_size: spec.size,
            position,
            spawned_at: now,
            being_removed: false,
            removed_at: None,
        }
    }

    pub fn effective_size(&self) -> f32 {
        effective_size(self.shape, self.base_size)
    }

    /// Radius of a sphere, half edge length of a box
    pub fn hit_extent(&self) -> f32 {
        match self.shape {
            TargetShape::Sphere => self.base_size,
            TargetShape::Box => self.base_size / 2.0,
        }
    }

    /// Start the removal animation. Returns false if it was already started.
    pub fn mark_removed(&mut self, now: u64) -> bool {
        if self.being_removed {
            return false;
        }
        self.being_removed = true;
        self.removed_at = Some(now);
        true
    }

    /// Whether the removal animation has completed
    pub fn removal_finished(&self, now: u64) -> bool {
        self.removed_at
            .map(|at| now.saturating_sub(at) >= REMOVAL_ANIMATION_MS)
            .unwrap_or(false)
    }

    pub fn view(&self, current: bool) -> TargetView {
        TargetView {
            id: self.id,
            shape: self.shape,
            size: self.base_size,
            position: self.position,
            being_removed: self.being_removed,
            current,
        }
    }
}
