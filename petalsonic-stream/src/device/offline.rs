use super::mixer::VoiceMixer;
use super::{BufferFormat, BufferId, PlaybackDevice, VoiceId, VoiceState};
use crate::error::Result;

/// A buffer handed to the device, as recorded by [`OfflineDevice`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub voice: VoiceId,
    pub buffer: BufferId,
    /// Sample count of the buffer's contents, all channels included
    pub len: usize,
    pub sample_rate: u32,
    /// Largest absolute sample value
    pub peak: f32,
}

/// Headless [`PlaybackDevice`] that only advances when told to.
///
/// Buffers are consumed with [`consume`](Self::consume) / [`consume_all`](Self::consume_all)
/// or rendered with [`render`](Self::render), so tests and offline simulations can drive the
/// streaming pipeline deterministically. Every queued buffer is recorded until drained with
/// [`take_submissions`](Self::take_submissions).
pub struct OfflineDevice {
    mixer: VoiceMixer,
    submissions: Vec<SubmissionRecord>,
    injected_error: Option<String>,
    queue_error: Option<String>,
}

impl OfflineDevice {
    pub fn new() -> Self {
        Self {
            mixer: VoiceMixer::new(None),
            submissions: Vec::new(),
            injected_error: None,
            queue_error: None,
        }
    }

    /// Marks up to `count` pending buffers of `voice` as played. Returns how many were consumed.
    pub fn consume(&mut self, voice: VoiceId, count: usize) -> usize {
        self.mixer.consume(voice, count)
    }

    /// Consumes up to `count` buffers on every voice.
    pub fn consume_all(&mut self, count: usize) -> usize {
        self.mixer
            .voice_ids()
            .into_iter()
            .map(|voice| self.mixer.consume(voice, count))
            .sum()
    }

    /// Mixes playing voices into `out` as a real-time device would.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        self.mixer.render(out, channels);
    }

    /// Makes the next [`take_error`](PlaybackDevice::take_error) report `message`.
    pub fn inject_error(&mut self, message: impl Into<String>) {
        self.injected_error = Some(message.into());
    }

    /// Latches `message` during the next [`queue_buffer`](PlaybackDevice::queue_buffer),
    /// in the middle of a refill batch. The buffer is still queued.
    pub fn inject_error_on_queue(&mut self, message: impl Into<String>) {
        self.queue_error = Some(message.into());
    }

    pub fn submissions(&self) -> &[SubmissionRecord] {
        &self.submissions
    }

    /// Returns the records gathered so far and starts a new list.
    pub fn take_submissions(&mut self) -> Vec<SubmissionRecord> {
        std::mem::take(&mut self.submissions)
    }

    pub fn voices(&self) -> Vec<VoiceId> {
        self.mixer.voice_ids()
    }
}

impl Default for OfflineDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackDevice for OfflineDevice {
    fn create_voice(&mut self) -> Result<VoiceId> {
        Ok(self.mixer.create_voice())
    }

    fn destroy_voice(&mut self, voice: VoiceId) {
        self.mixer.destroy_voice(voice);
    }

    fn generate_buffer(&mut self) -> Result<BufferId> {
        Ok(self.mixer.generate_buffer())
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.mixer.delete_buffer(buffer);
    }

    fn buffer_data(&mut self, buffer: BufferId, format: BufferFormat, data: &[f32], sample_rate: u32) {
        self.mixer.buffer_data(buffer, format, data, sample_rate);
    }

    fn queue_buffer(&mut self, voice: VoiceId, buffer: BufferId) {
        let queued_before = self.mixer.buffers_queued(voice);
        self.mixer.queue_buffer(voice, buffer);
        if let Some(message) = self.queue_error.take() {
            self.mixer.latch_error(message);
        }
        if self.mixer.buffers_queued(voice) == queued_before {
            return;
        }

        let samples = self.mixer.buffer_samples(buffer).unwrap_or_default();
        let peak = samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
        self.submissions.push(SubmissionRecord {
            voice,
            buffer,
            len: samples.len(),
            sample_rate: self.mixer.buffer_sample_rate(buffer).unwrap_or(0),
            peak,
        });
    }

    fn unqueue_buffer(&mut self, voice: VoiceId) -> Option<BufferId> {
        self.mixer.unqueue_buffer(voice)
    }

    fn buffers_processed(&self, voice: VoiceId) -> usize {
        self.mixer.buffers_processed(voice)
    }

    fn buffers_queued(&self, voice: VoiceId) -> usize {
        self.mixer.buffers_queued(voice)
    }

    fn voice_state(&self, voice: VoiceId) -> VoiceState {
        self.mixer.voice_state(voice)
    }

    fn play(&mut self, voice: VoiceId) {
        self.mixer.play(voice);
    }

    fn take_error(&mut self) -> Option<String> {
        self.injected_error.take().or_else(|| self.mixer.take_error())
    }
}
