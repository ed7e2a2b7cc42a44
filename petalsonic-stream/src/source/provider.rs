use super::{ReadSeek, samples_to_bytes};
use crate::error::{PetalSonicError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolves an emitter's source reference into a seekable byte stream.
///
/// This trait lets hosts plug in their own content system (archives, asset databases,
/// network caches). PetalSonic ships a filesystem provider and an in-memory provider.
///
/// # Example
///
/// ```ignore
/// use petalsonic_stream::source::{ReadSeek, StreamProvider};
/// use petalsonic_stream::error::Result;
///
/// struct PackFileProvider;
///
/// impl StreamProvider for PackFileProvider {
///     fn open(&self, reference: &str) -> Result<Box<dyn ReadSeek>> {
///         // Look up `reference` in your pack file here
///         todo!()
///     }
/// }
/// ```
pub trait StreamProvider {
    /// Opens the stream behind `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`PetalSonicError::ResourceUnavailable`] if nothing can be opened for the reference.
    fn open(&self, reference: &str) -> Result<Box<dyn ReadSeek>>;
}

impl<P: StreamProvider + ?Sized> StreamProvider for Box<P> {
    fn open(&self, reference: &str) -> Result<Box<dyn ReadSeek>> {
        (**self).open(reference)
    }
}

/// Opens references as file paths relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileStreamProvider {
    root: PathBuf,
}

impl FileStreamProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for FileStreamProvider {
    fn default() -> Self {
        Self::new(".")
    }
}

impl StreamProvider for FileStreamProvider {
    fn open(&self, reference: &str) -> Result<Box<dyn ReadSeek>> {
        let path = self.root.join(reference);
        let file = File::open(&path).map_err(|e| {
            PetalSonicError::ResourceUnavailable(format!(
                "failed to open '{}': {}",
                path.display(),
                e
            ))
        })?;
        log::debug!("Opened source stream {}", path.display());
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Serves streams from byte buffers held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStreamProvider {
    streams: HashMap<String, Arc<[u8]>>,
}

impl MemoryStreamProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers raw bytes under `reference`, replacing any previous entry.
    pub fn insert(&mut self, reference: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        self.streams.insert(reference.into(), Arc::from(bytes));
    }

    /// Registers mono samples under `reference`, encoded as raw little-endian `f32`.
    pub fn insert_samples(&mut self, reference: impl Into<String>, samples: &[f32]) {
        self.insert(reference, samples_to_bytes(samples));
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.streams.contains_key(reference)
    }
}

impl StreamProvider for MemoryStreamProvider {
    fn open(&self, reference: &str) -> Result<Box<dyn ReadSeek>> {
        let bytes = self.streams.get(reference).ok_or_else(|| {
            PetalSonicError::ResourceUnavailable(format!("no stream registered for '{}'", reference))
        })?;
        Ok(Box::new(Cursor::new(bytes.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_memory_provider_round_trip() {
        let mut provider = MemoryStreamProvider::new();
        provider.insert("clip", vec![1u8, 2, 3]);

        let mut stream = provider.open("clip").unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_reference_is_unavailable() {
        let provider = MemoryStreamProvider::new();
        assert!(matches!(
            provider.open("nope"),
            Err(PetalSonicError::ResourceUnavailable(_))
        ));

        let files = FileStreamProvider::new("/definitely/not/here");
        assert!(matches!(
            files.open("clip.raw"),
            Err(PetalSonicError::ResourceUnavailable(_))
        ));
    }
}
