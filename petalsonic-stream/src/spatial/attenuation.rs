use crate::error::{PetalSonicError, Result};
use crate::math::{Pose, Vec3};

/// Distance falloff applied to the direct path after binaural filtering.
///
/// Mirrors Steam Audio's distance attenuation models: inverse distance, with no falloff
/// inside a minimum distance.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DistanceAttenuationModel {
    /// Inverse distance with a 1 unit minimum distance.
    #[default]
    Default,
    /// Inverse distance: `1 / max(d, min_distance)`.
    InverseDistance { min_distance: f32 },
    /// No distance falloff.
    None,
}

/// Minimum distance of [`DistanceAttenuationModel::Default`].
pub const DEFAULT_MIN_DISTANCE: f32 = 1.0;

impl DistanceAttenuationModel {
    /// Gain for an emitter at `emitter` heard from `listener`.
    pub fn evaluate(&self, emitter: Vec3, listener: Vec3) -> f32 {
        self.evaluate_distance(emitter.distance(listener))
    }

    /// Gain at a given emitter-listener distance. Never increases with distance.
    pub fn evaluate_distance(&self, distance: f32) -> f32 {
        match *self {
            Self::Default => 1.0 / distance.max(DEFAULT_MIN_DISTANCE),
            Self::InverseDistance { min_distance } => 1.0 / distance.max(min_distance),
            Self::None => 1.0,
        }
    }

    pub fn min_distance(&self) -> Option<f32> {
        match *self {
            Self::Default => Some(DEFAULT_MIN_DISTANCE),
            Self::InverseDistance { min_distance } => Some(min_distance),
            Self::None => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Self::InverseDistance { min_distance } = *self {
            if !min_distance.is_finite() || min_distance <= 0.0 {
                return Err(PetalSonicError::Configuration(format!(
                    "minimum attenuation distance must be positive, got {}",
                    min_distance
                )));
            }
        }
        Ok(())
    }
}

/// Direction from the listener to the emitter, expressed in the listener's frame.
///
/// Components are (right, up, backward): a source straight ahead yields `(0, 0, -1)`, the
/// convention Steam Audio uses for HRTF lookup. A source sitting on the listener is treated
/// as straight ahead.
pub fn relative_direction(emitter: Vec3, listener: &Pose) -> Vec3 {
    let forward = listener.forward();
    let up = listener.up();
    let right = forward.cross(up);

    let to_emitter = (emitter - listener.position).normalize_or_zero();
    if to_emitter == Vec3::ZERO {
        return Vec3::new(0.0, 0.0, -1.0);
    }

    Vec3::new(
        to_emitter.dot(right),
        to_emitter.dot(up),
        -to_emitter.dot(forward),
    )
}
