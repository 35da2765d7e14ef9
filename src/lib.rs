//! dspblock - synchronous block pipeline for SDR signal chains
//!
//! Design principles:
//! - The pipeline owns every block; edges are ids into it, never references
//! - Sample rates and channel counts are negotiated at start and cascade
//!   downstream, with integer decimation or interpolation per block
//! - Start is all or nothing, stop tears down consumers before producers
//! - One `run` call pushes a buffer through the whole subtree, depth first,
//!   on the calling thread
//!
//! Concrete transforms implement [`DspNode`]; see [`nodes`] for the built-in
//! plumbing blocks.

mod block;
mod config;
mod error;
mod graph;
mod node;
mod registry;
mod source;
pub mod nodes;

pub use block::{output_frames, rate_ratio, BlockProfile};
pub use config::{PipelineConfig, DEFAULT_CHANNELS, DEFAULT_CHUNK_SIZE, DEFAULT_SAMPLE_RATE};
pub use error::{PipelineError, Result};
pub use graph::{BlockId, Pipeline};
pub use node::{DspNode, Format, InitContext, NodeError, ProcessContext, Sample};
pub use registry::NodeRegistry;
pub use source::Pump;
