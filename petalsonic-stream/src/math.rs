//! Math types for PetalSonic

pub use glam::{Quat, Vec3};

/// World transform of an emitter or the listener.
///
/// Forward is `-Z` and up is `+Y` in the local frame, matching Steam Audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.position.distance(other.position)
    }

    /// Rotates the pose so that it faces `target`, keeping `up` as close as possible.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        if forward == Vec3::ZERO {
            return;
        }
        let right = forward.cross(up).normalize_or_zero();
        if right == Vec3::ZERO {
            self.rotation = Quat::from_rotation_arc(-Vec3::Z, forward);
            return;
        }
        let up = right.cross(forward);
        self.rotation = Quat::from_mat3(&glam::Mat3::from_cols(right, up, -forward));
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}
