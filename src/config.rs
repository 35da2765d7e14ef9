//! Pipeline-wide defaults

use crate::node::Format;

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
pub const DEFAULT_CHANNELS: u32 = 1;
/// Frames per source chunk
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Defaults applied to blocks as they are added to a [`Pipeline`](crate::Pipeline).
///
/// ```
/// use dspblock::{Format, Pipeline, PipelineConfig};
///
/// let config = PipelineConfig::default()
///     .with_format(Format::new(2_048_000, 2))
///     .with_chunk_size(16384)
///     .with_profiling(true);
/// let pipeline = Pipeline::with_config(config);
/// # let _ = pipeline;
/// ```
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    /// Input format of a freshly added block
    pub default_format: Format,
    /// Chunk size of a freshly added source
    pub default_chunk_size: usize,
    /// Whether new blocks collect timing counters
    pub profiling: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_format: Format::new(DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS),
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            profiling: false,
        }
    }
}

impl PipelineConfig {
    pub fn with_format(mut self, format: Format) -> Self {
        self.default_format = format;
        self
    }

    pub fn with_chunk_size(mut self, frames: usize) -> Self {
        self.default_chunk_size = frames;
        self
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }
}
