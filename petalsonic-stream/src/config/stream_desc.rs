use crate::error::{PetalSonicError, Result};

/// Configuration descriptor for the streaming scheduler.
#[derive(Debug, Clone)]
pub struct StreamDesc {
    /// Number of buffers each emitter keeps queued on its device voice.
    /// Shared by every emitter; small on purpose (3-4 buffers).
    pub target_queue_depth: usize,
    /// Optional path to a custom HRTF SOFA file (None uses Steam Audio's default HRTF)
    pub hrtf_path: Option<String>,
}

impl Default for StreamDesc {
    fn default() -> Self {
        Self {
            target_queue_depth: 4,
            hrtf_path: None,
        }
    }
}

impl StreamDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_queue_depth(mut self, depth: usize) -> Self {
        self.target_queue_depth = depth;
        self
    }

    pub fn hrtf_path(mut self, path: impl Into<String>) -> Self {
        self.hrtf_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_queue_depth == 0 {
            return Err(PetalSonicError::Configuration(
                "target queue depth must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
