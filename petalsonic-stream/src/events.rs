//! Event types for PetalSonic streaming

use crate::emitter::EmitterId;

/// Events emitted by the [`StreamingScheduler`](crate::StreamingScheduler).
///
/// Drain them once per frame with
/// [`StreamingScheduler::poll_events`](crate::StreamingScheduler::poll_events).
#[derive(Debug, Clone, PartialEq)]
pub enum PetalSonicEvent {
    /// Resources were created and the emitter joined the active set.
    EmitterActivated { emitter_id: EmitterId },
    /// The emitter left the active set and its resources were released.
    EmitterDeactivated { emitter_id: EmitterId },
    /// The source stream reached its end and wrapped to the start.
    SourceLooped { emitter_id: EmitterId },
    /// The voice had drained and stopped; playback was restarted this tick.
    BufferUnderrun { emitter_id: EmitterId },
    /// The output device reported an error; the emitter's work for this tick was skipped.
    DeviceError {
        emitter_id: Option<EmitterId>,
        error: String,
    },
    /// Spatialization failed; no buffer was submitted for the affected slot.
    SpatializationError { emitter_id: EmitterId, error: String },
    /// Reading the source stream failed mid-stream.
    StreamError { emitter_id: EmitterId, error: String },
}

impl PetalSonicEvent {
    pub fn emitter_id(&self) -> Option<EmitterId> {
        match self {
            Self::EmitterActivated { emitter_id }
            | Self::EmitterDeactivated { emitter_id }
            | Self::SourceLooped { emitter_id }
            | Self::BufferUnderrun { emitter_id }
            | Self::SpatializationError { emitter_id, .. }
            | Self::StreamError { emitter_id, .. } => Some(*emitter_id),
            Self::DeviceError { emitter_id, .. } => *emitter_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::BufferUnderrun { .. }
                | Self::DeviceError { .. }
                | Self::SpatializationError { .. }
                | Self::StreamError { .. }
        )
    }
}
