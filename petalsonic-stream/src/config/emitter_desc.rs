use crate::error::{PetalSonicError, Result};
use crate::spatial::DistanceAttenuationModel;

/// Configuration descriptor for a streaming emitter.
///
/// The source stream must hold raw little-endian mono `f32` PCM at `sample_rate`.
///
/// # Examples
///
/// ```
/// # use petalsonic_stream::config::EmitterDesc;
/// let desc = EmitterDesc::new("music/ambience.raw")
///     .sample_rate(48000)
///     .volume(0.8);
/// assert_eq!(desc.frame_size, 4096);
/// ```
#[derive(Debug, Clone)]
pub struct EmitterDesc {
    /// Reference handed to the stream provider. Required, there is no default.
    pub source: Option<String>,
    /// Sample rate of the raw source stream in Hz
    pub sample_rate: u32,
    /// Number of samples spatialized and submitted per device buffer
    pub frame_size: usize,
    /// Volume handed to the HRTF (1.0 = unity)
    pub volume: f32,
    /// Distance falloff applied after binaural filtering
    pub attenuation: DistanceAttenuationModel,
}

impl Default for EmitterDesc {
    fn default() -> Self {
        Self {
            source: None,
            sample_rate: 44100,
            frame_size: 4096,
            volume: 1.0,
            attenuation: DistanceAttenuationModel::default(),
        }
    }
}

impl EmitterDesc {
    /// Creates a descriptor with default settings reading from `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Default::default()
        }
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn frame_size(mut self, size: usize) -> Self {
        self.frame_size = size;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn attenuation(mut self, model: DistanceAttenuationModel) -> Self {
        self.attenuation = model;
        self
    }

    /// Size of one mono frame in bytes.
    pub fn frame_size_in_bytes(&self) -> usize {
        self.frame_size * std::mem::size_of::<f32>()
    }

    /// Checks the descriptor before any resource is acquired.
    ///
    /// # Errors
    ///
    /// Returns [`PetalSonicError::Configuration`] when the source reference is missing or
    /// a numeric setting is out of range.
    pub fn validate(&self) -> Result<()> {
        match self.source.as_deref() {
            None => {
                return Err(PetalSonicError::Configuration(
                    "source reference is not set".to_string(),
                ));
            }
            Some(s) if s.trim().is_empty() => {
                return Err(PetalSonicError::Configuration(
                    "source reference is empty".to_string(),
                ));
            }
            Some(_) => {}
        }

        if self.sample_rate == 0 {
            return Err(PetalSonicError::Configuration(
                "sample rate must be greater than 0".to_string(),
            ));
        }

        if self.frame_size == 0 {
            return Err(PetalSonicError::Configuration(
                "frame size must be greater than 0".to_string(),
            ));
        }

        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(PetalSonicError::Configuration(format!(
                "volume must be a finite non-negative number, got {}",
                self.volume
            )));
        }

        self.attenuation.validate()
    }
}
