use super::attenuation::DistanceAttenuationModel;
use super::backend::{BinauralParams, FrameSettings, HrtfConfig, HrtfInterpolation, SpatialBackend};
use super::hrtf;
use crate::error::{PetalSonicError, Result};
use crate::math::{Pose, Vec3};
use audionimbus::{
    AudioBufferSettings, AudioSettings, BinauralEffect, BinauralEffectParams,
    BinauralEffectSettings, Context, DirectEffect, DirectEffectParams, DirectEffectSettings,
    Direction, Hrtf, Point, audio_buffer::AudioBuffer as AudioNimbusAudioBuffer,
};

/// [`SpatialBackend`] backed by Steam Audio through `audionimbus`.
///
/// Owns the Steam Audio context shared by every emitter's HRTF and effects. The context must
/// outlive all handles created from it, so drop the scheduler (and with it every emitter)
/// before the backend.
pub struct SteamAudioBackend {
    context: Context,
}

impl SteamAudioBackend {
    pub fn new() -> Result<Self> {
        let context = Context::try_new(&audionimbus::ContextSettings::default()).map_err(|e| {
            PetalSonicError::Spatialization(format!("Failed to create Steam Audio context: {}", e))
        })?;

        log::info!("Steam Audio context created");

        Ok(Self { context })
    }

    fn audio_settings(settings: &FrameSettings) -> AudioSettings {
        AudioSettings {
            sampling_rate: settings.sample_rate,
            frame_size: settings.frame_size as u32,
        }
    }
}

fn channel_count(num_channels: usize) -> Result<u32> {
    u32::try_from(num_channels).map_err(|_| {
        PetalSonicError::Spatialization(format!("unsupported channel count: {}", num_channels))
    })
}

fn buffer_settings(num_channels: usize) -> Result<AudioBufferSettings> {
    Ok(AudioBufferSettings {
        num_channels: Some(channel_count(num_channels)?),
        ..Default::default()
    })
}

fn to_point(v: Vec3) -> Point {
    Point::new(v.x, v.y, v.z)
}

fn to_direction(v: Vec3) -> Direction {
    Direction::new(v.x, v.y, v.z)
}

fn to_model(model: &DistanceAttenuationModel) -> Option<audionimbus::DistanceAttenuationModel> {
    match *model {
        DistanceAttenuationModel::Default => Some(audionimbus::DistanceAttenuationModel::Default),
        DistanceAttenuationModel::InverseDistance { min_distance } => {
            Some(audionimbus::DistanceAttenuationModel::InverseDistance { min_distance })
        }
        DistanceAttenuationModel::None => None,
    }
}

impl SpatialBackend for SteamAudioBackend {
    type Hrtf = Hrtf;
    type BinauralEffect = BinauralEffect;
    type DirectEffect = DirectEffect;

    fn relative_direction(&self, emitter: Vec3, listener: &Pose) -> Vec3 {
        // A source sitting on the listener has no direction; treat it as straight ahead
        if emitter.distance_squared(listener.position) <= f32::EPSILON * f32::EPSILON {
            return Vec3::new(0.0, 0.0, -1.0);
        }

        let direction = audionimbus::geometry::relative_direction(
            &self.context,
            to_point(emitter),
            to_point(listener.position),
            to_direction(listener.forward()),
            to_direction(listener.up()),
        );
        Vec3::new(direction.x, direction.y, direction.z)
    }

    fn distance_attenuation(
        &self,
        emitter: Vec3,
        listener: Vec3,
        model: &DistanceAttenuationModel,
    ) -> f32 {
        match to_model(model) {
            Some(model) => audionimbus::distance_attenuation(
                &self.context,
                to_point(emitter),
                to_point(listener),
                &model,
            ),
            None => 1.0,
        }
    }

    fn create_hrtf(&mut self, settings: &FrameSettings, config: &HrtfConfig) -> Result<Hrtf> {
        hrtf::create_hrtf(&self.context, &Self::audio_settings(settings), config)
    }

    fn create_binaural_effect(
        &mut self,
        settings: &FrameSettings,
        hrtf: &Hrtf,
    ) -> Result<BinauralEffect> {
        BinauralEffect::try_new(
            &self.context,
            &Self::audio_settings(settings),
            &BinauralEffectSettings { hrtf },
        )
        .map_err(|e| {
            PetalSonicError::Spatialization(format!("Failed to create BinauralEffect: {}", e))
        })
    }

    fn create_direct_effect(
        &mut self,
        settings: &FrameSettings,
        num_channels: usize,
    ) -> Result<DirectEffect> {
        DirectEffect::try_new(
            &self.context,
            &Self::audio_settings(settings),
            &DirectEffectSettings {
                num_channels: channel_count(num_channels)?,
            },
        )
        .map_err(|e| {
            PetalSonicError::Spatialization(format!("Failed to create DirectEffect: {}", e))
        })
    }

    fn apply_binaural(
        &mut self,
        effect: &mut BinauralEffect,
        params: &BinauralParams<'_, Hrtf>,
        input: &[f32],
        output: &mut [f32],
    ) -> Result<()> {
        let input_buf = AudioNimbusAudioBuffer::try_with_data_and_settings(
            input,
            buffer_settings(1)?,
        )
        .map_err(|e| {
            PetalSonicError::Spatialization(format!("Failed to create input buffer: {}", e))
        })?;

        let output_buf = AudioNimbusAudioBuffer::try_with_data_and_settings(
            output,
            buffer_settings(2)?,
        )
        .map_err(|e| {
            PetalSonicError::Spatialization(format!("Failed to create output buffer: {}", e))
        })?;

        let interpolation = match params.interpolation {
            HrtfInterpolation::Nearest => audionimbus::HrtfInterpolation::Nearest,
            HrtfInterpolation::Bilinear => audionimbus::HrtfInterpolation::Bilinear,
        };

        let binaural_effect_params = BinauralEffectParams {
            direction: to_direction(params.direction),
            interpolation,
            spatial_blend: params.spatial_blend,
            hrtf: params.hrtf,
            peak_delays: None,
        };

        effect.apply(&binaural_effect_params, &input_buf, &output_buf);
        Ok(())
    }

    fn apply_direct(
        &mut self,
        effect: &mut DirectEffect,
        distance_attenuation: f32,
        frame: &mut [f32],
        num_channels: usize,
    ) -> Result<()> {
        let frame_buf =
            AudioNimbusAudioBuffer::try_with_data_and_settings(frame, buffer_settings(num_channels)?)
                .map_err(|e| {
                    PetalSonicError::Spatialization(format!(
                        "Failed to create direct buffer: {}",
                        e
                    ))
                })?;

        let direct_effect_params = DirectEffectParams {
            distance_attenuation: Some(distance_attenuation),
            air_absorption: None,
            directivity: None,
            occlusion: None,
            transmission: None,
        };

        // In place: the direct effect supports aliased input and output
        effect.apply(&direct_effect_params, &frame_buf, &frame_buf);
        Ok(())
    }

    fn interleave(&mut self, planar: &[f32], num_channels: usize, output: &mut [f32]) -> Result<()> {
        let planar_buf = AudioNimbusAudioBuffer::try_with_data_and_settings(
            planar,
            buffer_settings(num_channels)?,
        )
        .map_err(|e| {
            PetalSonicError::Spatialization(format!("Failed to create planar buffer: {}", e))
        })?;

        planar_buf.interleave(&self.context, output);
        Ok(())
    }
}
