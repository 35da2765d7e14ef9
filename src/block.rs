//! Per-block state owned by the pipeline arena

use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::error::{PipelineError, Result};
use crate::node::{DspNode, Format, InitContext, ProcessContext, Sample};

/// Decimation and interpolation factors relating `input` to `output`.
///
/// Only pure N:1 or 1:N conversions are representable. Returns `None` when
/// either rate is zero or the rates are not integer related that way.
///
/// ```
/// use dspblock::rate_ratio;
///
/// assert_eq!(rate_ratio(48000, 16000), Some((3, 1)));
/// assert_eq!(rate_ratio(8000, 48000), Some((1, 6)));
/// assert_eq!(rate_ratio(48000, 32000), None);
/// ```
pub fn rate_ratio(input: u32, output: u32) -> Option<(u32, u32)> {
    if input == 0 || output == 0 {
        return None;
    }

    let (decimation, interpolation) = if input >= output {
        (input / output, 1)
    } else {
        (1, output / input)
    };

    // exact, so a truncated quotient never passes
    let exact = u64::from(input) * u64::from(interpolation)
        == u64::from(output) * u64::from(decimation);
    if exact {
        Some((decimation, interpolation))
    } else {
        None
    }
}

/// Frames produced from `in_frames` input frames. Any remainder is dropped.
#[inline]
pub fn output_frames(in_frames: usize, interpolation: u32, decimation: u32) -> usize {
    in_frames * interpolation as usize / decimation.max(1) as usize
}

/// Timing counters collected while profiling is enabled, reset on every start.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct BlockProfile {
    /// Wall time spent inside the node's `process` hook
    pub total_ns: u64,
    pub frames_in: u64,
    pub frames_out: u64,
}

impl BlockProfile {
    /// Processing cost per input frame, or 0 before any frame was seen.
    pub fn ns_per_frame(&self) -> u64 {
        if self.frames_in == 0 {
            0
        } else {
            self.total_ns / self.frames_in
        }
    }

    fn record(&mut self, elapsed: Duration, in_frames: usize, out_frames: usize) {
        self.total_ns = self
            .total_ns
            .saturating_add(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX));
        self.frames_in += in_frames as u64;
        self.frames_out += out_frames as u64;
    }
}

pub(crate) struct Block {
    /// Stamp distinguishing this block from later occupants of the same arena slot
    pub(crate) serial: u64,
    name: String,
    kind: String,
    node: Box<dyn DspNode>,

    input: Format,
    output: Format,
    decimation: u32,
    interpolation: u32,
    running: bool,

    /// Output of the last `process` call, lent to consumers while they run
    pub(crate) buffer: Vec<Sample>,

    /// Only sources carry a chunk size
    chunk_size: Option<usize>,

    profiling: bool,
    profile: BlockProfile,
}

impl Block {
    pub(crate) fn new(
        serial: u64,
        name: String,
        kind: String,
        node: Box<dyn DspNode>,
        format: Format,
        chunk_size: Option<usize>,
        profiling: bool,
    ) -> Self {
        Self {
            serial,
            name,
            kind,
            node,
            input: format,
            output: format,
            decimation: 1,
            interpolation: 1,
            running: false,
            buffer: Vec::new(),
            chunk_size,
            profiling,
            profile: BlockProfile::default(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> &str {
        &self.kind
    }

    pub(crate) fn input(&self) -> Format {
        self.input
    }

    pub(crate) fn output(&self) -> Format {
        self.output
    }

    pub(crate) fn decimation(&self) -> u32 {
        self.decimation
    }

    pub(crate) fn interpolation(&self) -> u32 {
        self.interpolation
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    pub(crate) fn profile(&self) -> BlockProfile {
        self.profile
    }

    pub(crate) fn set_profiling(&mut self, enabled: bool) {
        self.profiling = enabled;
    }

    pub(crate) fn set_sample_rate(&mut self, rate: u32) {
        if self.running {
            return;
        }

        debug!(block = %self.name, kind = %self.kind, rate, "setting input sample rate");
        self.input.sample_rate = rate;
    }

    pub(crate) fn set_channels(&mut self, channels: u32) {
        if self.running {
            return;
        }

        debug!(block = %self.name, kind = %self.kind, channels, "setting input channel count");
        self.input.channels = channels;
    }

    pub(crate) fn set_input_format(&mut self, format: Format) {
        self.set_sample_rate(format.sample_rate);
        self.set_channels(format.channels);
    }

    /// Returns `false` for a plain block, which has no chunk size to set.
    pub(crate) fn set_chunk_size(&mut self, frames: usize) -> bool {
        if self.chunk_size.is_none() {
            return false;
        }
        if !self.running {
            debug!(block = %self.name, kind = %self.kind, frames, "setting source chunk size");
            self.chunk_size = Some(frames);
        }
        true
    }

    /// Initialise this block alone. Consumers are the pipeline's business.
    pub(crate) fn activate(&mut self) -> Result<()> {
        // defaults, primarily for sinks
        self.output = self.input;

        debug!(block = %self.name, kind = %self.kind, input = %self.input, "starting block");
        if !self.input.is_valid() {
            error!(block = %self.name, kind = %self.kind, input = %self.input, "invalid input format");
            return Err(PipelineError::InvalidFormat {
                block: self.name.clone(),
                format: self.input,
            });
        }

        let mut ctx = InitContext {
            input: self.input,
            output: self.output,
        };
        if let Err(source) = self.node.init(&mut ctx) {
            error!(block = %self.name, kind = %self.kind, %source, "block failed to initialise");
            return Err(PipelineError::AcquireFailed {
                block: self.name.clone(),
                source,
            });
        }
        self.output = ctx.output;

        if !self.output.is_valid() {
            error!(block = %self.name, kind = %self.kind, output = %self.output, "invalid output format");
            self.node.deinit();
            return Err(PipelineError::InvalidFormat {
                block: self.name.clone(),
                format: self.output,
            });
        }

        match rate_ratio(self.input.sample_rate, self.output.sample_rate) {
            Some((decimation, interpolation)) => {
                self.decimation = decimation;
                self.interpolation = interpolation;
            }
            None => {
                error!(
                    block = %self.name,
                    kind = %self.kind,
                    input = self.input.sample_rate,
                    output = self.output.sample_rate,
                    "sample rates must be integer related"
                );
                self.node.deinit();
                return Err(PipelineError::InvalidRateRelationship {
                    block: self.name.clone(),
                    input: self.input.sample_rate,
                    output: self.output.sample_rate,
                });
            }
        }

        self.profile = BlockProfile::default();
        self.running = true;
        Ok(())
    }

    /// Release the node if it was running and always free the output buffer.
    pub(crate) fn deactivate(&mut self) {
        if self.running {
            debug!(block = %self.name, kind = %self.kind, "stopping block");
            self.running = false;
            self.node.deinit();
        }

        self.buffer = Vec::new();
    }

    /// Run the node over `input`, leaving the result in `self.buffer`.
    pub(crate) fn process(&mut self, input: &[Sample]) -> Result<()> {
        if !self.running {
            error!(block = %self.name, kind = %self.kind, "pipeline not started");
            return Err(PipelineError::NotRunning(self.name.clone()));
        }

        let in_frames = input.len() / self.input.channels as usize;
        let out_frames = output_frames(in_frames, self.interpolation, self.decimation);
        let out_len = out_frames * self.output.channels as usize;
        if self.buffer.len() != out_len {
            debug!(
                block = %self.name,
                kind = %self.kind,
                frames = out_frames,
                channels = self.output.channels,
                "resizing buffer"
            );
            self.buffer.resize(out_len, 0.0);
        }

        let ctx = ProcessContext {
            input: self.input,
            output: self.output,
            decimation: self.decimation,
            interpolation: self.interpolation,
            in_frames,
            out_frames,
        };

        let started = if self.profiling { Some(Instant::now()) } else { None };

        if let Err(source) = self.node.process(&ctx, input, &mut self.buffer) {
            error!(block = %self.name, kind = %self.kind, %source, "pipeline failed at block");
            return Err(PipelineError::TransformFailed {
                block: self.name.clone(),
                source,
            });
        }

        if let Some(started) = started {
            self.profile.record(started.elapsed(), in_frames, out_frames);
        }

        Ok(())
    }
}
