//! Buffer-queue output devices.
//!
//! The streaming pipeline talks to the output device through [`PlaybackDevice`], a small
//! voice/buffer API in the style of OpenAL sources: buffers are filled with
//! [`buffer_data`](PlaybackDevice::buffer_data), queued on a voice, played in order, and
//! reported back as *processed* once consumed so they can be unqueued and refilled.
//!
//! Operations do not return errors. Like OpenAL they latch a device error which the caller
//! collects with [`take_error`](PlaybackDevice::take_error) after a batch of operations.
//!
//! - [`CpalDevice`]: real-time output through `cpal`
//! - [`OfflineDevice`]: headless device advanced by hand, for simulation and tests

mod mixer;
mod cpal_device;
mod offline;

pub use cpal_device::CpalDevice;
pub use offline::{OfflineDevice, SubmissionRecord};

use crate::error::Result;

/// Handle of a device voice (one independently queued playback stream).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u32);

impl VoiceId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Handle of a device buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u32);

impl BufferId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Sample layout of a buffer's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFormat {
    MonoF32,
    /// Interleaved `L, R, L, R, ..`
    StereoF32,
}

impl BufferFormat {
    pub fn channels(&self) -> usize {
        match self {
            Self::MonoF32 => 1,
            Self::StereoF32 => 2,
        }
    }
}

/// Playback state of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Created but never played
    Initial,
    Playing,
    Paused,
    /// Ran out of queued buffers, or was stopped
    Stopped,
}

/// Output device consumed by the streaming scheduler.
///
/// `buffers_queued` counts every buffer attached to the voice, processed ones included, so the
/// number still waiting to play is `buffers_queued - buffers_processed`.
pub trait PlaybackDevice {
    fn create_voice(&mut self) -> Result<VoiceId>;

    /// Stops the voice and detaches every buffer still queued on it.
    fn destroy_voice(&mut self, voice: VoiceId);

    fn generate_buffer(&mut self) -> Result<BufferId>;

    fn delete_buffer(&mut self, buffer: BufferId);

    /// Replaces the contents of a buffer that is not currently queued.
    fn buffer_data(&mut self, buffer: BufferId, format: BufferFormat, data: &[f32], sample_rate: u32);

    fn queue_buffer(&mut self, voice: VoiceId, buffer: BufferId);

    /// Detaches the oldest processed buffer. `None` (and a latched error) if none is processed.
    fn unqueue_buffer(&mut self, voice: VoiceId) -> Option<BufferId>;

    fn buffers_processed(&self, voice: VoiceId) -> usize;

    fn buffers_queued(&self, voice: VoiceId) -> usize;

    fn voice_state(&self, voice: VoiceId) -> VoiceState;

    fn play(&mut self, voice: VoiceId);

    /// Returns and clears the latched device error, if any.
    fn take_error(&mut self) -> Option<String>;
}
