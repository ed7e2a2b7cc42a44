//! Voice and buffer bookkeeping shared by the bundled devices.

use super::{BufferFormat, BufferId, VoiceId, VoiceState};
use std::collections::{HashMap, VecDeque};

struct StoredBuffer {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    /// Voice the buffer is currently queued on
    attached_to: Option<VoiceId>,
}

struct Voice {
    /// Every attached buffer in play order; the first `processed` entries have been consumed
    queue: VecDeque<BufferId>,
    processed: usize,
    /// Read offset, in frames, inside the first pending buffer
    cursor: usize,
    state: VoiceState,
}

impl Voice {
    fn pending(&self) -> usize {
        self.queue.len() - self.processed
    }

    fn mark_current_processed(&mut self) {
        self.processed += 1;
        self.cursor = 0;
        if self.pending() == 0 {
            self.state = VoiceState::Stopped;
        }
    }
}

/// OpenAL-style voice/buffer state machine.
///
/// Invalid operations latch the first error message until [`VoiceMixer::take_error`] is called;
/// later errors are dropped while one is pending.
pub(crate) struct VoiceMixer {
    /// Rate every buffer must match, when the output runs at a fixed rate
    required_sample_rate: Option<u32>,
    next_name: u32,
    buffers: HashMap<BufferId, StoredBuffer>,
    voices: HashMap<VoiceId, Voice>,
    error: Option<String>,
}

impl VoiceMixer {
    pub(crate) fn new(required_sample_rate: Option<u32>) -> Self {
        Self {
            required_sample_rate,
            next_name: 1,
            buffers: HashMap::new(),
            voices: HashMap::new(),
            error: None,
        }
    }

    pub(crate) fn latch_error(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    pub(crate) fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }

    fn next_name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name = self.next_name.wrapping_add(1).max(1);
        name
    }

    pub(crate) fn create_voice(&mut self) -> VoiceId {
        let voice = VoiceId::from_raw(self.next_name());
        self.voices.insert(
            voice,
            Voice {
                queue: VecDeque::new(),
                processed: 0,
                cursor: 0,
                state: VoiceState::Initial,
            },
        );
        voice
    }

    pub(crate) fn destroy_voice(&mut self, voice: VoiceId) {
        let Some(removed) = self.voices.remove(&voice) else {
            self.latch_error(format!("invalid voice name {}", voice.raw()));
            return;
        };
        for buffer in removed.queue {
            if let Some(stored) = self.buffers.get_mut(&buffer) {
                stored.attached_to = None;
            }
        }
    }

    pub(crate) fn generate_buffer(&mut self) -> BufferId {
        let buffer = BufferId::from_raw(self.next_name());
        self.buffers.insert(
            buffer,
            StoredBuffer {
                samples: Vec::new(),
                channels: 2,
                sample_rate: 0,
                attached_to: None,
            },
        );
        buffer
    }

    pub(crate) fn delete_buffer(&mut self, buffer: BufferId) {
        match self.buffers.get(&buffer) {
            None => self.latch_error(format!("invalid buffer name {}", buffer.raw())),
            Some(stored) if stored.attached_to.is_some() => {
                self.latch_error(format!("buffer {} is still queued", buffer.raw()))
            }
            Some(_) => {
                self.buffers.remove(&buffer);
            }
        }
    }

    pub(crate) fn buffer_data(
        &mut self,
        buffer: BufferId,
        format: BufferFormat,
        data: &[f32],
        sample_rate: u32,
    ) {
        let channels = format.channels();
        if data.len() % channels != 0 {
            self.latch_error(format!(
                "{} samples is not a whole number of {}-channel frames",
                data.len(),
                channels
            ));
            return;
        }
        if let Some(required) = self.required_sample_rate {
            if required != sample_rate {
                self.latch_error(format!(
                    "buffer sample rate {} Hz does not match output rate {} Hz",
                    sample_rate, required
                ));
                return;
            }
        }

        let message = match self.buffers.get_mut(&buffer) {
            None => format!("invalid buffer name {}", buffer.raw()),
            Some(stored) if stored.attached_to.is_some() => {
                format!("buffer {} is queued and cannot be refilled", buffer.raw())
            }
            Some(stored) => {
                stored.samples.clear();
                stored.samples.extend_from_slice(data);
                stored.channels = channels;
                stored.sample_rate = sample_rate;
                return;
            }
        };
        self.latch_error(message);
    }

    /// Samples currently stored in `buffer`.
    pub(crate) fn buffer_samples(&self, buffer: BufferId) -> Option<&[f32]> {
        self.buffers.get(&buffer).map(|b| b.samples.as_slice())
    }

    pub(crate) fn buffer_sample_rate(&self, buffer: BufferId) -> Option<u32> {
        self.buffers.get(&buffer).map(|b| b.sample_rate)
    }

    pub(crate) fn queue_buffer(&mut self, voice: VoiceId, buffer: BufferId) {
        let message = match (self.voices.get_mut(&voice), self.buffers.get_mut(&buffer)) {
            (None, _) => format!("invalid voice name {}", voice.raw()),
            (_, None) => format!("invalid buffer name {}", buffer.raw()),
            (Some(_), Some(stored)) if stored.attached_to.is_some() => {
                format!("buffer {} is already queued", buffer.raw())
            }
            (Some(target), Some(stored)) => {
                stored.attached_to = Some(voice);
                target.queue.push_back(buffer);
                return;
            }
        };
        self.latch_error(message);
    }

    pub(crate) fn unqueue_buffer(&mut self, voice: VoiceId) -> Option<BufferId> {
        let message = match self.voices.get_mut(&voice) {
            None => format!("invalid voice name {}", voice.raw()),
            Some(target) if target.processed == 0 => {
                format!("voice {} has no processed buffers", voice.raw())
            }
            Some(target) => {
                target.processed -= 1;
                let buffer = target.queue.pop_front();
                if let Some(stored) = buffer.and_then(|b| self.buffers.get_mut(&b)) {
                    stored.attached_to = None;
                }
                return buffer;
            }
        };
        self.latch_error(message);
        None
    }

    pub(crate) fn buffers_processed(&self, voice: VoiceId) -> usize {
        self.voices.get(&voice).map_or(0, |v| v.processed)
    }

    pub(crate) fn buffers_queued(&self, voice: VoiceId) -> usize {
        self.voices.get(&voice).map_or(0, |v| v.queue.len())
    }

    pub(crate) fn voice_state(&self, voice: VoiceId) -> VoiceState {
        self.voices
            .get(&voice)
            .map_or(VoiceState::Stopped, |v| v.state)
    }

    /// Starts (or resumes) the voice at its first pending buffer. A voice with nothing pending
    /// stops immediately.
    pub(crate) fn play(&mut self, voice: VoiceId) {
        let Some(target) = self.voices.get_mut(&voice) else {
            self.latch_error(format!("invalid voice name {}", voice.raw()));
            return;
        };
        if target.state != VoiceState::Paused {
            target.cursor = 0;
        }
        target.state = if target.pending() > 0 {
            VoiceState::Playing
        } else {
            VoiceState::Stopped
        };
    }

    /// Marks up to `count` pending buffers of a playing voice as processed. Returns how many
    /// were consumed.
    pub(crate) fn consume(&mut self, voice: VoiceId, count: usize) -> usize {
        let Some(target) = self.voices.get_mut(&voice) else {
            return 0;
        };
        let mut consumed = 0;
        while consumed < count && target.state == VoiceState::Playing {
            target.mark_current_processed();
            consumed += 1;
        }
        consumed
    }

    pub(crate) fn voice_ids(&self) -> Vec<VoiceId> {
        let mut ids: Vec<_> = self.voices.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Mixes every playing voice into `out` (interleaved, `out_channels` wide), overwriting
    /// its contents.
    pub(crate) fn render(&mut self, out: &mut [f32], out_channels: usize) {
        out.fill(0.0);
        if out_channels == 0 {
            return;
        }
        let frames = out.len() / out_channels;

        for voice in self.voices.values_mut() {
            let mut frame = 0;
            while frame < frames && voice.state == VoiceState::Playing {
                let Some(stored) = voice
                    .queue
                    .get(voice.processed)
                    .and_then(|b| self.buffers.get(b))
                else {
                    voice.state = VoiceState::Stopped;
                    break;
                };

                let buffer_frames = stored.samples.len() / stored.channels;
                while frame < frames && voice.cursor < buffer_frames {
                    let src = &stored.samples[voice.cursor * stored.channels..];
                    let dst = &mut out[frame * out_channels..(frame + 1) * out_channels];
                    for (channel, sample) in dst.iter_mut().enumerate() {
                        *sample += src[channel.min(stored.channels - 1)];
                    }
                    voice.cursor += 1;
                    frame += 1;
                }

                if voice.cursor >= buffer_frames {
                    voice.mark_current_processed();
                }
            }
        }
    }
}
