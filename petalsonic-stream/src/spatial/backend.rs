use super::attenuation::{self, DistanceAttenuationModel};
use crate::error::{PetalSonicError, Result};
use crate::math::{Pose, Vec3};

/// Sample rate and frame length shared by every effect of one emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSettings {
    pub sample_rate: u32,
    pub frame_size: usize,
}

/// How HRTF data is normalized when it is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HrtfNormalization {
    #[default]
    None,
    RootMeanSquared,
}

/// Settings for creating an HRTF instance.
#[derive(Debug, Clone, PartialEq)]
pub struct HrtfConfig {
    pub volume: f32,
    pub normalization: HrtfNormalization,
    /// Custom SOFA file; `None` selects the library's default HRTF
    pub sofa_path: Option<String>,
}

impl Default for HrtfConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            normalization: HrtfNormalization::None,
            sofa_path: None,
        }
    }
}

/// HRTF sampling used when the direction falls between measured points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HrtfInterpolation {
    #[default]
    Nearest,
    Bilinear,
}

/// Per-frame parameters for the binaural effect.
pub struct BinauralParams<'a, H> {
    pub hrtf: &'a H,
    /// Listener-space direction from [`SpatialBackend::relative_direction`]
    pub direction: Vec3,
    pub interpolation: HrtfInterpolation,
    /// 0.0 = unspatialized, 1.0 = fully spatialized
    pub spatial_blend: f32,
}

/// Geometry, binaural and direct-path effects consumed by the streaming pipeline.
///
/// Handles are owned values: dropping one releases it in the underlying library. Buffers
/// passed to the `apply_*` methods are channel-planar (`[L..., R...]` for stereo) and exactly
/// `channels * frame_size` samples long.
pub trait SpatialBackend {
    type Hrtf;
    type BinauralEffect;
    type DirectEffect;

    /// Direction from the listener to the emitter in the listener's frame, `(0, 0, -1)` being
    /// straight ahead.
    fn relative_direction(&self, emitter: Vec3, listener: &Pose) -> Vec3 {
        attenuation::relative_direction(emitter, listener)
    }

    /// Direct-path gain for an emitter heard from `listener` under `model`.
    fn distance_attenuation(
        &self,
        emitter: Vec3,
        listener: Vec3,
        model: &DistanceAttenuationModel,
    ) -> f32 {
        model.evaluate(emitter, listener)
    }

    fn create_hrtf(&mut self, settings: &FrameSettings, config: &HrtfConfig) -> Result<Self::Hrtf>;

    fn create_binaural_effect(
        &mut self,
        settings: &FrameSettings,
        hrtf: &Self::Hrtf,
    ) -> Result<Self::BinauralEffect>;

    fn create_direct_effect(
        &mut self,
        settings: &FrameSettings,
        num_channels: usize,
    ) -> Result<Self::DirectEffect>;

    /// Filters a mono frame into a full stereo frame of the same length.
    fn apply_binaural(
        &mut self,
        effect: &mut Self::BinauralEffect,
        params: &BinauralParams<'_, Self::Hrtf>,
        input: &[f32],
        output: &mut [f32],
    ) -> Result<()>;

    /// Applies distance attenuation to a planar frame in place.
    fn apply_direct(
        &mut self,
        effect: &mut Self::DirectEffect,
        distance_attenuation: f32,
        frame: &mut [f32],
        num_channels: usize,
    ) -> Result<()>;

    /// Converts a channel-planar frame into channel-interleaved samples.
    fn interleave(&mut self, planar: &[f32], num_channels: usize, output: &mut [f32]) -> Result<()> {
        interleave_planar(planar, num_channels, output)
    }
}

/// Reference interleaving: `[L0, L1, .., R0, R1, ..]` into `[L0, R0, L1, R1, ..]`.
pub fn interleave_planar(planar: &[f32], num_channels: usize, output: &mut [f32]) -> Result<()> {
    if num_channels == 0 || planar.len() != output.len() || planar.len() % num_channels != 0 {
        return Err(PetalSonicError::Spatialization(format!(
            "cannot interleave {} planar samples into {} samples with {} channels",
            planar.len(),
            output.len(),
            num_channels
        )));
    }

    let frames = planar.len() / num_channels;
    if frames == 0 {
        return Ok(());
    }
    for (channel, plane) in planar.chunks_exact(frames).enumerate() {
        for (frame, sample) in plane.iter().enumerate() {
            output[frame * num_channels + channel] = *sample;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestBackend;

    #[test]
    fn test_attenuation_is_clamped_below_min_distance() {
        let backend = TestBackend::new();
        for model in [
            DistanceAttenuationModel::Default,
            DistanceAttenuationModel::InverseDistance { min_distance: 0.1 },
        ] {
            let min_distance = model.min_distance().unwrap();
            let at_min =
                backend.distance_attenuation(Vec3::new(min_distance, 0.0, 0.0), Vec3::ZERO, &model);
            let inside = backend.distance_attenuation(
                Vec3::new(min_distance * 0.5, 0.0, 0.0),
                Vec3::ZERO,
                &model,
            );
            assert_eq!(at_min, inside);
        }
    }

    #[test]
    fn test_attenuation_is_monotonic() {
        let backend = TestBackend::new();
        let listener = Vec3::new(1.0, 0.0, 1.0);
        for model in [
            DistanceAttenuationModel::Default,
            DistanceAttenuationModel::InverseDistance { min_distance: 0.1 },
            DistanceAttenuationModel::None,
        ] {
            let mut previous = f32::INFINITY;
            for step in 1..200 {
                let emitter = listener + Vec3::new(0.0, 0.0, -(step as f32) * 0.05);
                let gain = backend.distance_attenuation(emitter, listener, &model);
                assert!(gain <= previous, "{:?} gain rose at step {}", model, step);
                previous = gain;
            }
        }
    }

    #[test]
    fn test_default_relative_direction_is_listener_space() {
        let backend = TestBackend::new();
        let listener = Pose::from_position(Vec3::new(0.0, 0.0, 5.0));
        let dir = backend.relative_direction(Vec3::new(3.0, 0.0, 5.0), &listener);
        assert!(dir.distance(Vec3::X) < 1e-6);
    }

    #[test]
    fn test_interleave_stereo() {
        let planar = [1.0, 2.0, 3.0, -1.0, -2.0, -3.0];
        let mut out = [0.0; 6];
        interleave_planar(&planar, 2, &mut out).unwrap();
        assert_eq!(out, [1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }

    #[test]
    fn test_interleave_rejects_mismatched_lengths() {
        let mut out = [0.0; 4];
        assert!(interleave_planar(&[0.0; 6], 2, &mut out).is_err());
        assert!(interleave_planar(&[0.0; 4], 0, &mut out).is_err());
    }
}
