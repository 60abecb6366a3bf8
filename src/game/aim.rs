//! First-person aim: camera orientation from mouse movement, sensitivity conversion

use std::f32::consts::{FRAC_PI_2, TAU};

use glam::Vec3;

use crate::ws::protocol::GamePreset;

/// Camera eye position, all aim rays start here
pub const AIM_ORIGIN: Vec3 = Vec3::new(0.0, 0.0, 5.0);
/// Largest mouse movement accepted per event, in pixels
pub const MAX_MOUSE_DELTA: f32 = 100.0;
/// Radians per pixel when nothing was configured
pub const DEFAULT_SENSITIVITY: f32 = 0.002;

/// Mouse sensitivity in radians per pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sensitivity {
    pub horizontal: f32,
    pub vertical: f32,
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self::uniform(DEFAULT_SENSITIVITY)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensitivityError {
    #[error("Sensitivity must be a positive number, got {0}")]
    NotPositive(f32),
}

impl Sensitivity {
    pub fn uniform(radians_per_pixel: f32) -> Self {
        Self {
            horizontal: radians_per_pixel,
            vertical: radians_per_pixel,
        }
    }

    /// Convert an in-game sensitivity to radians per pixel.
    /// `vertical` is only given by players with separate axis settings.
    pub fn convert(
        game: GamePreset,
        horizontal: f32,
        vertical: Option<f32>,
    ) -> Result<Self, SensitivityError> {
        let check = |value: f32| {
            if value.is_finite() && value > 0.0 {
                Ok(value)
            } else {
                Err(SensitivityError::NotPositive(value))
            }
        };

        let horizontal = check(horizontal)?;
        let vertical = vertical.map(check).transpose()?;

        let scale = |value: f32| match game {
            GamePreset::Fortnite => value * 0.0008,
            // 0.01 in-game = one degree per turn
            GamePreset::Valorant => (value * 100.0 / 360.0) * TAU * 0.001,
            GamePreset::Overwatch => (value / 360.0) * TAU * 0.0008,
            _ => value * 0.001,
        };

        let horizontal = scale(horizontal);
        Ok(Self {
            horizontal,
            vertical: vertical.map(scale).unwrap_or(horizontal),
        })
    }
}

/// Camera orientation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AimState {
    /// Rotation around Y in radians, positive turns left
    pub yaw: f32,
    /// Rotation around X in radians, positive looks up
    pub pitch: f32,
}

impl AimState {
    /// Apply a relative mouse movement
    pub fn apply_mouse_delta(&mut self, dx: f32, dy: f32, sensitivity: &Sensitivity) {
        if !(dx.is_finite() && dy.is_finite()) {
            return;
        }

        let dx = dx.clamp(-MAX_MOUSE_DELTA, MAX_MOUSE_DELTA);
        let dy = dy.clamp(-MAX_MOUSE_DELTA, MAX_MOUSE_DELTA);

        self.set(
            self.yaw - dx * sensitivity.horizontal,
            self.pitch - dy * sensitivity.vertical,
        );
    }

    /// Set an absolute orientation; pitch is clamped, yaw wrapped
    pub fn set(&mut self, yaw: f32, pitch: f32) {
        self.pitch = pitch.clamp(-FRAC_PI_2, FRAC_PI_2);
        self.yaw = yaw % TAU;

        if !(self.yaw.is_finite() && self.pitch.is_finite()) {
            *self = Self::default();
        }
    }

    /// Orient the camera at `origin` towards `point`
    #[cfg(test)]
    pub fn look_at(&mut self, origin: Vec3, point: Vec3) {
        let d = point - origin;
        let horizontal = (d.x * d.x + d.z * d.z).sqrt();
        self.set((-d.x).atan2(-d.z), d.y.atan2(horizontal));
    }

    /// Unit forward vector (yaw applied before pitch, -Z is straight ahead)
    pub fn direction(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(-sin_yaw * cos_pitch, sin_pitch, -cos_yaw * cos_pitch)
    }
}
