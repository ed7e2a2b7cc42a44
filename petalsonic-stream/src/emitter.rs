//! Emitters and their native resource bundles.
//!
//! - [`EmitterId`]: handle returned when an emitter joins the scheduler
//! - [`EmitterResource`]: HRTF, effects and frame buffers of one emitter, with an explicit
//!   `Uninitialized -> Ready -> Disposed` lifecycle
//! - [`Emitter`]: an active emitter (configuration, pose, source stream, resources, queue)

use crate::config::EmitterDesc;
use crate::error::{PetalSonicError, Result};
use crate::math::Pose;
use crate::queue::{PlaybackQueue, PlaybackQueueState};
use crate::source::AudioSource;
use crate::spatial::{
    DistanceAttenuationModel, FrameSettings, STEREO_CHANNELS, SpatialBackend, SpatialProcessor,
};
use std::time::Duration;

/// Lightweight, type-safe handle for emitters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(pub(crate) u64);

impl EmitterId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EmitterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EmitterId({})", self.0)
    }
}

/// Lifecycle state of an [`EmitterResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Uninitialized,
    Ready,
    Disposed,
}

/// Native handles and fixed-size frame buffers owned by a ready resource.
pub(crate) struct EmitterHandles<B: SpatialBackend> {
    /// Interleaved stereo frame handed to the device, `2 * frame_size`
    pub(crate) interleave_buf: Vec<f32>,
    /// Mono input frame, `frame_size`
    pub(crate) input_buf: Vec<f32>,
    /// Planar stereo output frame, `2 * frame_size`
    pub(crate) output_buf: Vec<f32>,
    pub(crate) direct_effect: B::DirectEffect,
    pub(crate) binaural_effect: B::BinauralEffect,
    pub(crate) hrtf: B::Hrtf,
    pub(crate) attenuation: DistanceAttenuationModel,
    pub(crate) settings: FrameSettings,
}

/// Per-emitter bundle of spatialization handles and frame buffers.
///
/// Handles exist only while the resource is [`ResourceState::Ready`]. Disposal is idempotent
/// and also runs on drop, so the handles are released exactly once on every exit path.
pub struct EmitterResource<B: SpatialBackend> {
    state: ResourceState,
    handles: Option<EmitterHandles<B>>,
}

impl<B: SpatialBackend> EmitterResource<B> {
    pub fn new() -> Self {
        Self {
            state: ResourceState::Uninitialized,
            handles: None,
        }
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ResourceState::Ready
    }

    /// `Uninitialized -> Ready`: validates `desc` and acquires every handle and buffer.
    ///
    /// If any step fails, whatever was acquired so far is released before returning and the
    /// resource stays `Uninitialized`.
    pub fn activate(
        &mut self,
        processor: &mut SpatialProcessor<B>,
        desc: &EmitterDesc,
    ) -> Result<()> {
        match self.state {
            ResourceState::Uninitialized => {}
            ResourceState::Ready => {
                return Err(PetalSonicError::Configuration(
                    "emitter resource is already active".to_string(),
                ));
            }
            ResourceState::Disposed => {
                return Err(PetalSonicError::Configuration(
                    "emitter resource was disposed and cannot be reactivated".to_string(),
                ));
            }
        }

        desc.validate()?;

        let frame_size = desc.frame_size;
        let settings = FrameSettings {
            sample_rate: desc.sample_rate,
            frame_size,
        };

        let interleave_buf = vec![0.0; frame_size * STEREO_CHANNELS];

        let hrtf_config = processor.hrtf_config(desc.volume);
        let backend = processor.backend_mut();
        let hrtf = backend.create_hrtf(&settings, &hrtf_config)?;
        let binaural_effect = backend.create_binaural_effect(&settings, &hrtf)?;

        let input_buf = vec![0.0; frame_size];
        let output_buf = vec![0.0; frame_size * STEREO_CHANNELS];

        let direct_effect = backend.create_direct_effect(&settings, STEREO_CHANNELS)?;

        self.handles = Some(EmitterHandles {
            interleave_buf,
            input_buf,
            output_buf,
            direct_effect,
            binaural_effect,
            hrtf,
            attenuation: desc.attenuation,
            settings,
        });
        self.state = ResourceState::Ready;

        log::debug!(
            "Emitter resources ready (sample_rate: {} Hz, frame_size: {}, volume: {})",
            desc.sample_rate,
            frame_size,
            desc.volume
        );
        Ok(())
    }

    /// `Ready -> Disposed`: releases every handle. Returns `false` if there was nothing to
    /// release (already disposed, or never activated).
    pub fn dispose(&mut self) -> bool {
        let previous = self.state;
        self.state = ResourceState::Disposed;

        let Some(handles) = self.handles.take() else {
            return false;
        };

        let EmitterHandles {
            interleave_buf,
            input_buf,
            output_buf,
            direct_effect,
            binaural_effect,
            hrtf,
            ..
        } = handles;

        drop(interleave_buf);
        drop(input_buf);
        drop(output_buf);
        drop(direct_effect);
        // The binaural effect holds the HRTF; release it first.
        drop(binaural_effect);
        drop(hrtf);

        log::debug!("Emitter resources released (was {:?})", previous);
        true
    }

    /// Mono input frame to fill before [`SpatialProcessor::process_frame`].
    pub fn input_frame_mut(&mut self) -> Result<&mut [f32]> {
        Ok(&mut self.handles_mut()?.input_buf)
    }

    pub fn frame_settings(&self) -> Option<FrameSettings> {
        self.handles.as_ref().map(|h| h.settings)
    }

    pub(crate) fn handles_mut(&mut self) -> Result<&mut EmitterHandles<B>> {
        let state = self.state;
        self.handles.as_mut().ok_or_else(|| {
            PetalSonicError::Spatialization(format!(
                "emitter resource is not ready (state: {:?})",
                state
            ))
        })
    }
}

impl<B: SpatialBackend> Default for EmitterResource<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: SpatialBackend> Drop for EmitterResource<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// An active emitter: configuration, world pose, source stream, resources and device queue.
pub struct Emitter<B: SpatialBackend> {
    pub(crate) id: EmitterId,
    pub(crate) desc: EmitterDesc,
    pub(crate) pose: Pose,
    pub(crate) source: AudioSource,
    pub(crate) resource: EmitterResource<B>,
    pub(crate) queue: PlaybackQueue,
}

impl<B: SpatialBackend> Emitter<B> {
    pub fn id(&self) -> EmitterId {
        self.id
    }

    pub fn desc(&self) -> &EmitterDesc {
        &self.desc
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// Playback position derived from the source stream. Observability only.
    pub fn current_stream_position(&self) -> Duration {
        self.source.current_stream_position()
    }

    pub fn total_stream_duration(&self) -> Duration {
        self.source.total_duration()
    }

    pub fn resource_state(&self) -> ResourceState {
        self.resource.state()
    }

    /// Queue counts as of this emitter's last tick.
    pub fn queue_state(&self) -> PlaybackQueueState {
        self.queue.last_state()
    }
}
