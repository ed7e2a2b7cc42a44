use super::mixer::VoiceMixer;
use super::{BufferFormat, BufferId, PlaybackDevice, VoiceId, VoiceState};
use crate::error::{PetalSonicError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::{Arc, Mutex, MutexGuard};

/// Stereo output on the default `cpal` device.
///
/// Voices and buffers live behind a mutex shared with the audio callback. The callback only
/// ever `try_lock`s it: if the control thread holds the lock, that callback block is silent
/// rather than blocking the audio thread.
pub struct CpalDevice {
    mixer: Arc<Mutex<VoiceMixer>>,
    sample_rate: u32,
    channels: u16,
    // Dropping the stream stops output
    _stream: cpal::Stream,
}

impl CpalDevice {
    /// Opens the default output device at `sample_rate` and starts the stream.
    ///
    /// Every buffer submitted later must use the same rate.
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            PetalSonicError::Device("No default output device available".into())
        })?;

        let channels = 2;
        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let default_config = device.default_output_config().map_err(|e| {
            PetalSonicError::Device(format!("Failed to get default config: {}", e))
        })?;

        let mixer = Arc::new(Mutex::new(VoiceMixer::new(Some(sample_rate))));

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => Self::create_stream::<f32>(&device, &config, &mixer)?,
            cpal::SampleFormat::I16 => Self::create_stream::<i16>(&device, &config, &mixer)?,
            cpal::SampleFormat::U16 => Self::create_stream::<u16>(&device, &config, &mixer)?,
            other => {
                return Err(PetalSonicError::Device(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| PetalSonicError::Device(format!("Failed to start stream: {}", e)))?;

        log::info!(
            "Output stream started ({} Hz, {} channels, {:?})",
            sample_rate,
            channels,
            default_config.sample_format()
        );

        Ok(Self {
            mixer,
            sample_rate,
            channels,
            _stream: stream,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn create_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mixer: &Arc<Mutex<VoiceMixer>>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        let render_mixer = Arc::clone(mixer);
        let error_mixer = Arc::clone(mixer);
        let mut mix_buffer: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // Grows once to the device block size, then stays put
                    mix_buffer.resize(data.len(), 0.0);

                    match render_mixer.try_lock() {
                        Ok(mut mixer) => mixer.render(&mut mix_buffer, channels),
                        Err(_) => mix_buffer.fill(0.0),
                    }

                    for (out, sample) in data.iter_mut().zip(mix_buffer.iter()) {
                        *out = T::from_sample(*sample);
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    if let Ok(mut mixer) = error_mixer.lock() {
                        mixer.latch_error(format!("stream error: {}", err));
                    }
                },
                None,
            )
            .map_err(|e| PetalSonicError::Device(format!("Failed to build stream: {}", e)))
    }

    fn mixer(&self) -> MutexGuard<'_, VoiceMixer> {
        // Bookkeeping stays valid across a poisoning panic
        self.mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PlaybackDevice for CpalDevice {
    fn create_voice(&mut self) -> Result<VoiceId> {
        Ok(self.mixer().create_voice())
    }

    fn destroy_voice(&mut self, voice: VoiceId) {
        self.mixer().destroy_voice(voice);
    }

    fn generate_buffer(&mut self) -> Result<BufferId> {
        Ok(self.mixer().generate_buffer())
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.mixer().delete_buffer(buffer);
    }

    fn buffer_data(&mut self, buffer: BufferId, format: BufferFormat, data: &[f32], sample_rate: u32) {
        self.mixer().buffer_data(buffer, format, data, sample_rate);
    }

    fn queue_buffer(&mut self, voice: VoiceId, buffer: BufferId) {
        self.mixer().queue_buffer(voice, buffer);
    }

    fn unqueue_buffer(&mut self, voice: VoiceId) -> Option<BufferId> {
        self.mixer().unqueue_buffer(voice)
    }

    fn buffers_processed(&self, voice: VoiceId) -> usize {
        self.mixer().buffers_processed(voice)
    }

    fn buffers_queued(&self, voice: VoiceId) -> usize {
        self.mixer().buffers_queued(voice)
    }

    fn voice_state(&self, voice: VoiceId) -> VoiceState {
        self.mixer().voice_state(voice)
    }

    fn play(&mut self, voice: VoiceId) {
        self.mixer().play(voice);
    }

    fn take_error(&mut self) -> Option<String> {
        self.mixer().take_error()
    }
}
