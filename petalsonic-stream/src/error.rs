//! Error types for PetalSonic streaming

use crate::emitter::EmitterId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PetalSonicError {
    /// A required emitter or scheduler setting is missing or out of range.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The source stream could not be opened, measured or read.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// The output device reported a non-success error code.
    #[error("Audio device error: {0}")]
    Device(String),

    /// The binaural / attenuation library failed.
    #[error("Spatialization error: {0}")]
    Spatialization(String),

    #[error("Unknown emitter: {0}")]
    UnknownEmitter(EmitterId),
}

pub type Result<T> = std::result::Result<T, PetalSonicError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmitterDesc;
    use crate::source::{AudioSource, FileStreamProvider, StreamProvider};

    #[test]
    fn test_io_failures_surface_as_resource_unavailable() {
        let provider = FileStreamProvider::new(std::env::temp_dir());
        let error = provider.open("petalsonic-missing-source.raw").err().unwrap();
        assert!(matches!(error, PetalSonicError::ResourceUnavailable(_)));
        assert!(error.to_string().starts_with("Resource unavailable: "));

        let error = AudioSource::new(Box::new(std::io::Cursor::new(Vec::<u8>::new())), 44100)
            .err()
            .unwrap();
        assert!(matches!(error, PetalSonicError::ResourceUnavailable(_)));
    }

    #[test]
    fn test_configuration_message() {
        let error = EmitterDesc::new("").validate().unwrap_err();
        assert!(error.to_string().starts_with("Configuration error: "));
    }
}
