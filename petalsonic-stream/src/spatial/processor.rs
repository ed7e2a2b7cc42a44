use super::backend::{BinauralParams, HrtfConfig, HrtfInterpolation, SpatialBackend};
use crate::emitter::EmitterResource;
use crate::error::Result;
use crate::math::{Pose, Vec3};

/// Output channels produced by the binaural stage.
pub const STEREO_CHANNELS: usize = 2;

/// Per-frame spatialization pipeline on top of a [`SpatialBackend`].
///
/// For one emitter and one frame the processor runs, in order:
///
/// 1. relative direction of the emitter in the listener's frame
/// 2. binaural effect, mono input frame to stereo output frame
/// 3. distance attenuation from the emitter's attenuation model
/// 4. direct effect on the stereo frame, in place
/// 5. interleave into the emitter's device-ready scratch buffer
///
/// Attenuation comes after the binaural stage: the HRTF filter expects normalized-loudness
/// input.
pub struct SpatialProcessor<B: SpatialBackend> {
    backend: B,
    hrtf_path: Option<String>,
}

impl<B: SpatialBackend> SpatialProcessor<B> {
    /// Create a new spatial processor
    ///
    /// # Arguments
    /// * `backend` - Binaural / direct-effect implementation
    /// * `hrtf_path` - Optional path to a custom HRTF SOFA file (None uses the default HRTF)
    pub fn new(backend: B, hrtf_path: Option<String>) -> Self {
        Self { backend, hrtf_path }
    }

    /// HRTF settings for an emitter playing at `volume`.
    pub fn hrtf_config(&self, volume: f32) -> HrtfConfig {
        HrtfConfig {
            volume,
            sofa_path: self.hrtf_path.clone(),
            ..Default::default()
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Spatializes the mono frame currently held in `resource`'s input buffer.
    ///
    /// Returns the interleaved stereo frame, `2 * frame_size` samples long. On error the
    /// returned slice is never produced, so a half-written frame cannot reach the device.
    pub fn process_frame<'r>(
        &mut self,
        resource: &'r mut EmitterResource<B>,
        emitter_position: Vec3,
        listener: &Pose,
    ) -> Result<&'r [f32]> {
        let handles = resource.handles_mut()?;

        let direction = self.backend.relative_direction(emitter_position, listener);

        let params = BinauralParams {
            hrtf: &handles.hrtf,
            direction,
            interpolation: HrtfInterpolation::Nearest,
            spatial_blend: 1.0,
        };
        self.backend.apply_binaural(
            &mut handles.binaural_effect,
            &params,
            &handles.input_buf,
            &mut handles.output_buf,
        )?;

        let attenuation = self.backend.distance_attenuation(
            emitter_position,
            listener.position,
            &handles.attenuation,
        );
        self.backend.apply_direct(
            &mut handles.direct_effect,
            attenuation,
            &mut handles.output_buf,
            STEREO_CHANNELS,
        )?;

        self.backend.interleave(
            &handles.output_buf,
            STEREO_CHANNELS,
            &mut handles.interleave_buf,
        )?;

        Ok(&handles.interleave_buf)
    }
}
