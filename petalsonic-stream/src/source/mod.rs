//! Seekable raw PCM sources.
//!
//! An [`AudioSource`] reads fixed-size chunks of little-endian mono `f32` PCM from a
//! seekable byte stream and wraps back to the start of the stream when it runs out, so an
//! emitter never starves. Streams are obtained from a [`StreamProvider`].

mod provider;

pub use provider::{FileStreamProvider, MemoryStreamProvider, StreamProvider};

use crate::error::{PetalSonicError, Result};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::time::Duration;

const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

/// Byte stream that can be both read and repositioned.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Looping reader over a raw mono `f32` stream.
pub struct AudioSource {
    stream: Box<dyn ReadSeek>,
    sample_rate: u32,
    /// Current read offset in bytes
    position: u64,
    /// Stream length in bytes, measured once at construction
    length: u64,
    byte_scratch: Vec<u8>,
}

impl AudioSource {
    /// Wraps a stream, checking up front that it is seekable and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`PetalSonicError::ResourceUnavailable`] if the stream cannot be seeked or holds
    /// no data, so the failure surfaces before the first read rather than mid-stream.
    pub fn new(mut stream: Box<dyn ReadSeek>, sample_rate: u32) -> Result<Self> {
        let length = stream.seek(SeekFrom::End(0)).map_err(|e| {
            PetalSonicError::ResourceUnavailable(format!("source stream is not seekable: {}", e))
        })?;
        stream.seek(SeekFrom::Start(0)).map_err(|e| {
            PetalSonicError::ResourceUnavailable(format!("source stream is not seekable: {}", e))
        })?;

        if length == 0 {
            return Err(PetalSonicError::ResourceUnavailable(
                "source stream is empty".to_string(),
            ));
        }

        if length % BYTES_PER_SAMPLE as u64 != 0 {
            log::warn!(
                "Source stream length {} is not a multiple of {} bytes; samples will straddle the loop point",
                length,
                BYTES_PER_SAMPLE
            );
        }

        Ok(Self {
            stream,
            sample_rate,
            position: 0,
            length,
            byte_scratch: Vec::new(),
        })
    }

    /// Fills `dest` from the current position, wrapping to the start of the stream as many
    /// times as needed.
    ///
    /// Returns the number of times the stream wrapped during this read.
    pub fn read_chunk(&mut self, dest: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        let mut wraps = 0;

        while filled < dest.len() {
            let read = self.read_until_eof(&mut dest[filled..])?;
            filled += read;
            self.position += read as u64;

            if filled < dest.len() {
                if read == 0 && self.position == 0 {
                    return Err(PetalSonicError::ResourceUnavailable(
                        "source stream returned no data after rewinding".to_string(),
                    ));
                }
                self.rewind()?;
                wraps += 1;
            }
        }

        Ok(wraps)
    }

    /// Fills `frame` with decoded samples. Returns the number of wraps, as [`Self::read_chunk`].
    pub fn read_frame(&mut self, frame: &mut [f32]) -> Result<usize> {
        let mut bytes = std::mem::take(&mut self.byte_scratch);
        bytes.resize(frame.len() * BYTES_PER_SAMPLE, 0);

        let result = self.read_chunk(&mut bytes);
        if result.is_ok() {
            for (sample, raw) in frame.iter_mut().zip(bytes.chunks_exact(BYTES_PER_SAMPLE)) {
                *sample = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
        }

        self.byte_scratch = bytes;
        result
    }

    /// Playback position derived from the read offset. Observability only.
    pub fn current_stream_position(&self) -> Duration {
        self.bytes_to_duration(self.position)
    }

    /// Duration of one pass over the whole stream.
    pub fn total_duration(&self) -> Duration {
        self.bytes_to_duration(self.length)
    }

    /// Current read offset in bytes.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Stream length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn rewind(&mut self) -> Result<()> {
        self.stream.seek(SeekFrom::Start(0)).map_err(|e| {
            PetalSonicError::ResourceUnavailable(format!("failed to rewind source stream: {}", e))
        })?;
        self.position = 0;
        Ok(())
    }

    /// Reads until `buf` is full or the stream reports end of file.
    fn read_until_eof(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.stream.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(PetalSonicError::ResourceUnavailable(format!(
                        "failed to read source stream: {}",
                        e
                    )));
                }
            }
        }
        Ok(total)
    }

    fn bytes_to_duration(&self, bytes: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(
            bytes as f64 / BYTES_PER_SAMPLE as f64 / self.sample_rate as f64,
        )
    }
}

/// Encodes samples as the raw little-endian `f32` layout an [`AudioSource`] reads.
pub fn samples_to_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
