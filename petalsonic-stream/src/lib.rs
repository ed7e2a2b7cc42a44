//! # PetalSonic Stream
//!
//! Tick-driven binaural streaming for Rust, using Steam Audio for 3D spatialization.
//!
//! Each emitter streams raw mono `f32` PCM from a seekable source, and the stream loops when
//! it reaches the end. Emitters are spatialized against a moving listener and fed into a
//! buffer-queue output device. There is no audio-thread pipeline: the host calls
//! [`StreamingScheduler::tick`] once per frame and the scheduler keeps every emitter's device
//! queue topped up to a fixed depth.
//!
//! ## Quick Start
//!
//! ```no_run
//! use petalsonic_stream::*;
//!
//! let scheduler_desc = StreamDesc::default();
//! let mut scheduler = StreamingScheduler::new(
//!     scheduler_desc,
//!     SteamAudioBackend::new()?,
//!     CpalDevice::new(44100)?,
//!     FileStreamProvider::new("assets"),
//! )?;
//!
//! // Stream `assets/ambience.raw` from two metres to the right
//! let emitter = scheduler.add_emitter(
//!     EmitterDesc::new("ambience.raw").sample_rate(44100),
//!     Pose::from_position(Vec3::new(2.0, 0.0, 0.0)),
//! )?;
//!
//! let listener = PetalSonicAudioListener::default();
//! loop {
//!     // Once per frame, after the listener has been updated
//!     scheduler.tick(&listener);
//!
//!     for event in scheduler.poll_events() {
//!         if event.is_error() {
//!             eprintln!("{:?}", event);
//!         }
//!     }
//!     # break;
//! }
//!
//! scheduler.remove_emitter(emitter)?;
//! # Ok::<(), PetalSonicError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`StreamingScheduler`]**: per-tick driver owning the emitter registry
//! - **[`EmitterDesc`]** / **[`StreamDesc`]**: emitter and scheduler configuration
//! - **[`AudioSource`](source::AudioSource)**: looping reader over a seekable stream
//! - **[`SpatialProcessor`](spatial::SpatialProcessor)**: binaural, attenuation and
//!   interleave pipeline over a [`SpatialBackend`](spatial::SpatialBackend)
//! - **[`PlaybackDevice`](device::PlaybackDevice)**: buffer-queue output API, implemented by
//!   [`CpalDevice`] and [`OfflineDevice`]
//! - **[`PetalSonicEvent`]**: lifecycle notifications and downgraded errors
//!
//! ## Per-tick pipeline
//!
//! For every emitter: query the device's queued and processed counts, then produce
//! `target_depth - queued + processed` frames. Each frame is read from the source, filtered
//! through the HRTF, attenuated by distance and interleaved. Finally the voice is restarted
//! if it ran dry.

pub mod config;
pub mod device;
pub mod emitter;
pub mod error;
pub mod events;
pub mod math;
pub mod queue;
pub mod scheduler;
pub mod source;
pub mod spatial;

#[cfg(test)]
mod test_support;

pub use config::{EmitterDesc, StreamDesc};
pub use device::{CpalDevice, OfflineDevice, PlaybackDevice};
pub use emitter::{Emitter, EmitterId, ResourceState};
pub use error::PetalSonicError;
pub use events::PetalSonicEvent;
pub use math::{Pose, Quat, Vec3};
pub use queue::PlaybackQueueState;
pub use scheduler::{PetalSonicAudioListener, StreamingScheduler, TickReport};
pub use source::{FileStreamProvider, MemoryStreamProvider, StreamProvider};
pub use spatial::{DistanceAttenuationModel, SteamAudioBackend};
