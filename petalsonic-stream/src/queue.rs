//! Per-emitter device queue: one voice plus a fixed pool of buffer ids.

use crate::device::{BufferFormat, BufferId, PlaybackDevice, VoiceId, VoiceState};
use crate::error::{PetalSonicError, Result};

/// Buffer counts reported by the device for one voice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackQueueState {
    /// Every buffer attached to the voice, processed ones included
    pub queued: usize,
    /// Buffers already played and waiting to be reclaimed
    pub processed: usize,
}

impl PlaybackQueueState {
    /// Buffers still waiting to play.
    pub fn pending(&self) -> usize {
        self.queued.saturating_sub(self.processed)
    }

    /// Buffers to produce this tick so that `target_depth` are pending again.
    pub fn deficit(&self, target_depth: usize) -> usize {
        (target_depth + self.processed).saturating_sub(self.queued)
    }
}

/// What [`PlaybackQueue::ensure_playing`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    AlreadyPlaying,
    /// First play of this voice
    Started,
    /// The voice had played before and ran dry
    Restarted,
}

/// A device voice and the buffer ids it cycles through.
///
/// Exactly `target_depth` buffer ids are generated at creation, so no more than
/// `target_depth` buffers can ever be attached to the voice. An id is either attached to the
/// voice or sitting in the free list.
pub struct PlaybackQueue {
    voice: VoiceId,
    buffers: Vec<BufferId>,
    free: Vec<BufferId>,
    target_depth: usize,
    last_state: PlaybackQueueState,
    started: bool,
}

impl PlaybackQueue {
    /// Creates the voice and its buffer pool.
    pub fn new<D: PlaybackDevice>(device: &mut D, target_depth: usize) -> Result<Self> {
        if target_depth == 0 {
            return Err(PetalSonicError::Configuration(
                "target queue depth must be at least 1".to_string(),
            ));
        }

        let voice = device.create_voice()?;
        let mut buffers = Vec::with_capacity(target_depth);
        for _ in 0..target_depth {
            match device.generate_buffer() {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    Self::release_handles(device, voice, &buffers);
                    return Err(e);
                }
            }
        }

        if let Some(error) = device.take_error() {
            Self::release_handles(device, voice, &buffers);
            return Err(PetalSonicError::Device(error));
        }

        // Popped from the back: hand out ids in generation order
        let free = buffers.iter().rev().copied().collect();

        Ok(Self {
            voice,
            buffers,
            free,
            target_depth,
            last_state: PlaybackQueueState::default(),
            started: false,
        })
    }

    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    pub fn target_depth(&self) -> usize {
        self.target_depth
    }

    /// Counts recorded by the last [`query`](Self::query).
    pub fn last_state(&self) -> PlaybackQueueState {
        self.last_state
    }

    /// Ids not attached to the voice.
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Reads the voice's queued and processed counts from the device.
    pub fn query<D: PlaybackDevice>(&mut self, device: &D) -> PlaybackQueueState {
        self.last_state = PlaybackQueueState {
            queued: device.buffers_queued(self.voice),
            processed: device.buffers_processed(self.voice),
        };
        self.last_state
    }

    /// Picks the id for the next buffer: a processed buffer reclaimed from the device when
    /// one is available, otherwise a never-queued id from the free list.
    ///
    /// `state` is updated to reflect the reclaim.
    pub fn acquire_slot<D: PlaybackDevice>(
        &mut self,
        device: &mut D,
        state: &mut PlaybackQueueState,
    ) -> Option<BufferId> {
        if state.processed > 0 {
            if let Some(buffer) = device.unqueue_buffer(self.voice) {
                state.processed -= 1;
                state.queued -= 1;
                return Some(buffer);
            }
        }
        self.free.pop()
    }

    /// Returns an acquired id that ended up not being submitted.
    pub fn release_slot(&mut self, buffer: BufferId) {
        debug_assert!(self.buffers.contains(&buffer));
        self.free.push(buffer);
    }

    /// Fills `buffer` with an interleaved stereo frame and appends it to the voice.
    pub fn submit<D: PlaybackDevice>(
        &mut self,
        device: &mut D,
        buffer: BufferId,
        frame: &[f32],
        sample_rate: u32,
        state: &mut PlaybackQueueState,
    ) {
        device.buffer_data(buffer, BufferFormat::StereoF32, frame, sample_rate);
        device.queue_buffer(self.voice, buffer);
        state.queued += 1;
    }

    /// Issues play if the voice is not currently playing.
    pub fn ensure_playing<D: PlaybackDevice>(&mut self, device: &mut D) -> PlayOutcome {
        let state = device.voice_state(self.voice);
        if state == VoiceState::Playing {
            return PlayOutcome::AlreadyPlaying;
        }

        device.play(self.voice);
        if self.started {
            PlayOutcome::Restarted
        } else {
            self.started = true;
            PlayOutcome::Started
        }
    }

    /// Destroys the voice and deletes every buffer id.
    pub fn release<D: PlaybackDevice>(self, device: &mut D) {
        Self::release_handles(device, self.voice, &self.buffers);
        if let Some(error) = device.take_error() {
            log::warn!(
                "Device reported an error while releasing voice {}: {}",
                self.voice.raw(),
                error
            );
        }
    }

    fn release_handles<D: PlaybackDevice>(device: &mut D, voice: VoiceId, buffers: &[BufferId]) {
        device.destroy_voice(voice);
        for buffer in buffers {
            device.delete_buffer(*buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::OfflineDevice;

    fn submit_silence(
        queue: &mut PlaybackQueue,
        device: &mut OfflineDevice,
        state: &mut PlaybackQueueState,
    ) -> bool {
        match queue.acquire_slot(device, state) {
            Some(buffer) => {
                queue.submit(device, buffer, &[0.0; 8], 44100, state);
                true
            }
            None => false,
        }
    }

    #[test]
    fn test_deficit() {
        let empty = PlaybackQueueState::default();
        assert_eq!(empty.deficit(4), 4);

        let steady = PlaybackQueueState {
            queued: 4,
            processed: 1,
        };
        assert_eq!(steady.deficit(4), 1);
        assert_eq!(steady.pending(), 3);

        let full = PlaybackQueueState {
            queued: 4,
            processed: 0,
        };
        assert_eq!(full.deficit(4), 0);
    }

    #[test]
    fn test_new_generates_depth_buffers() {
        let mut device = OfflineDevice::new();
        let queue = PlaybackQueue::new(&mut device, 3).unwrap();
        assert_eq!(queue.free_slots(), 3);
        assert_eq!(queue.target_depth(), 3);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let mut device = OfflineDevice::new();
        assert!(matches!(
            PlaybackQueue::new(&mut device, 0),
            Err(PetalSonicError::Configuration(_))
        ));
        assert!(device.voices().is_empty());
    }

    #[test]
    fn test_fill_never_exceeds_depth() {
        let mut device = OfflineDevice::new();
        let mut queue = PlaybackQueue::new(&mut device, 2).unwrap();
        let mut state = queue.query(&device);

        assert!(submit_silence(&mut queue, &mut device, &mut state));
        assert!(submit_silence(&mut queue, &mut device, &mut state));
        assert!(!submit_silence(&mut queue, &mut device, &mut state));
        assert_eq!(device.buffers_queued(queue.voice()), 2);
        assert!(device.take_error().is_none());
    }

    #[test]
    fn test_processed_buffers_are_reclaimed_first() {
        let mut device = OfflineDevice::new();
        let mut queue = PlaybackQueue::new(&mut device, 2).unwrap();
        let mut state = queue.query(&device);
        submit_silence(&mut queue, &mut device, &mut state);
        queue.ensure_playing(&mut device);

        device.consume(queue.voice(), 1);
        let mut state = queue.query(&device);
        assert_eq!(state.deficit(2), 2);

        // One reclaimed from the device, one fresh from the pool
        let first = queue.acquire_slot(&mut device, &mut state).unwrap();
        assert_eq!(state.processed, 0);
        assert_eq!(queue.free_slots(), 1);
        queue.submit(&mut device, first, &[0.0; 8], 44100, &mut state);
        assert!(submit_silence(&mut queue, &mut device, &mut state));
        assert_eq!(state.queued, 2);
        assert_eq!(queue.query(&device), state);
        assert!(device.take_error().is_none());
    }

    #[test]
    fn test_release_slot_returns_id_to_pool() {
        let mut device = OfflineDevice::new();
        let mut queue = PlaybackQueue::new(&mut device, 1).unwrap();
        let mut state = queue.query(&device);

        let buffer = queue.acquire_slot(&mut device, &mut state).unwrap();
        assert_eq!(queue.free_slots(), 0);
        queue.release_slot(buffer);
        assert_eq!(queue.free_slots(), 1);
    }

    #[test]
    fn test_ensure_playing_reports_restart() {
        let mut device = OfflineDevice::new();
        let mut queue = PlaybackQueue::new(&mut device, 1).unwrap();
        let mut state = queue.query(&device);
        submit_silence(&mut queue, &mut device, &mut state);

        assert_eq!(queue.ensure_playing(&mut device), PlayOutcome::Started);
        assert_eq!(queue.ensure_playing(&mut device), PlayOutcome::AlreadyPlaying);

        device.consume(queue.voice(), 1);
        let mut state = queue.query(&device);
        submit_silence(&mut queue, &mut device, &mut state);
        assert_eq!(queue.ensure_playing(&mut device), PlayOutcome::Restarted);
        assert_eq!(device.voice_state(queue.voice()), VoiceState::Playing);
    }

    #[test]
    fn test_release_frees_device_handles() {
        let mut device = OfflineDevice::new();
        let mut queue = PlaybackQueue::new(&mut device, 2).unwrap();
        let mut state = queue.query(&device);
        submit_silence(&mut queue, &mut device, &mut state);

        queue.release(&mut device);
        assert!(device.voices().is_empty());
        assert!(device.take_error().is_none());
    }
}
