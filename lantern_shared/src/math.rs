//! Math types.
//!
//! Everything the simulation needs lives on the ground plane: distances and
//! directions ignore `y`. Kept small and deterministic.

use serde::{Deserialize, Serialize};

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Offset from `self` to `to` on the `x,z` plane.
    pub fn planar_delta(self, to: Self) -> (f32, f32) {
        (to.x - self.x, to.z - self.z)
    }

    /// Euclidean distance on the `x,z` plane.
    pub fn planar_distance(self, to: Self) -> f32 {
        let (dx, dz) = self.planar_delta(to);
        (dx * dx + dz * dz).sqrt()
    }

    /// Moves `step` units from `self` toward `to` on the `x,z` plane.
    ///
    /// `y` is preserved. Returns `self` unchanged when the two points share
    /// the same planar position. The step is not clamped, so a step longer
    /// than the remaining distance overshoots.
    pub fn planar_step_toward(self, to: Self, step: f32) -> Self {
        let dist = self.planar_distance(to);
        if dist <= 0.0 {
            return self;
        }
        let (dx, dz) = self.planar_delta(to);
        Self::new(self.x + dx / dist * step, self.y, self.z + dz / dist * step)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 100.0, 4.0);
        assert_eq!(a.planar_distance(b), 5.0);
    }

    #[test]
    fn step_toward_keeps_height_and_moves_by_step() {
        let a = Vec3::new(0.0, 1.0, 0.0);
        let b = Vec3::new(3.0, 9.0, 4.0);
        let moved = a.planar_step_toward(b, 0.5);
        assert_eq!(moved.y, 1.0);
        assert!((a.planar_distance(moved) - 0.5).abs() < 1e-6);
        assert!((moved.x - 0.3).abs() < 1e-6);
        assert!((moved.z - 0.4).abs() < 1e-6);
    }

    #[test]
    fn step_toward_same_point_is_noop() {
        let a = Vec3::new(2.0, 1.0, 2.0);
        assert_eq!(a.planar_step_toward(Vec3::new(2.0, 5.0, 2.0), 1.0), a);
    }

    #[test]
    fn step_overshoots_short_targets() {
        let a = Vec3::ZERO;
        let moved = a.planar_step_toward(Vec3::new(0.1, 0.0, 0.0), 1.0);
        assert!((moved.x - 1.0).abs() < 1e-6);
    }
}
