//! Core node trait and context types.

use core::fmt;

/// One interleaved sample. A frame is one `Sample` per channel.
pub type Sample = f32;

/// Sample rate and channel count of a stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Format {
    /// Frames per second
    pub sample_rate: u32,
    /// Samples per frame
    pub channels: u32,
}

impl Format {
    pub const fn new(sample_rate: u32, channels: u32) -> Self {
        Self { sample_rate, channels }
    }

    /// Both the rate and the channel count are non-zero.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz x{}", self.sample_rate, self.channels)
    }
}

/// Format negotiation passed to [`DspNode::init`].
///
/// `output` starts out equal to `input`, so pass-through nodes and sinks
/// don't need to touch it. Resamplers and channel mappers overwrite it.
#[derive(Clone, Copy, Debug)]
pub struct InitContext {
    pub input: Format,
    pub output: Format,
}

/// Information available during processing.
///
/// Passed to every [`DspNode::process`] call. The output buffer handed to
/// the node is always exactly `out_frames * output.channels` samples long.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    pub input: Format,
    pub output: Format,
    pub decimation: u32,
    pub interpolation: u32,
    /// Whole frames in the input buffer
    pub in_frames: usize,
    /// Frames the node is expected to write
    pub out_frames: usize,
}

/// Failure reported by a node hook.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("{0}")]
    Failed(String),

    #[error("unsupported format: expected {expected}, got {got}")]
    Format { expected: Format, got: Format },
}

impl NodeError {
    pub fn failed(msg: impl Into<String>) -> Self {
        NodeError::Failed(msg.into())
    }
}

/// The processing hooks a concrete block supplies.
///
/// A [`Pipeline`](crate::Pipeline) owns the output buffer, the rate
/// bookkeeping and the wiring; the node only does the transform.
///
/// ```
/// use dspblock::{DspNode, NodeError, ProcessContext, Sample};
///
/// struct Invert;
///
/// impl DspNode for Invert {
///     fn process(
///         &mut self,
///         _ctx: &ProcessContext,
///         input: &[Sample],
///         output: &mut [Sample],
///     ) -> Result<(), NodeError> {
///         for (o, i) in output.iter_mut().zip(input) {
///             *o = -*i;
///         }
///         Ok(())
///     }
///
///     fn kind(&self) -> &str { "invert" }
/// }
/// ```
pub trait DspNode: Send + 'static {
    /// Acquire resources before the block starts running.
    ///
    /// May change `ctx.output` to declare a different output rate or
    /// channel count. Returning an error leaves the block stopped.
    fn init(&mut self, _ctx: &mut InitContext) -> Result<(), NodeError> {
        Ok(())
    }

    /// Release whatever `init` acquired.
    ///
    /// Also called when `init` succeeded but the negotiated rates turned out
    /// not to be integer related, so it must cope with a partial setup.
    fn deinit(&mut self) {}

    /// Transform one input buffer into the block's output buffer.
    fn process(
        &mut self,
        ctx: &ProcessContext,
        input: &[Sample],
        output: &mut [Sample],
    ) -> Result<(), NodeError>;

    /// Category label used in diagnostics.
    fn kind(&self) -> &str {
        "block"
    }
}
