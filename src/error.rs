//! Error types for pipeline operations

use crate::graph::BlockId;
use crate::node::{Format, NodeError};

/// Error type for topology, lifecycle and execution
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("block {0:?} is not part of this pipeline")]
    UnknownBlock(BlockId),

    #[error("no block kind registered as {0:?}")]
    UnknownKind(String),

    #[error("block {0} is not a source")]
    NotASource(String),

    #[error("block {consumer} already connected to {producer}")]
    DuplicateEdge { producer: String, consumer: String },

    #[error("block {consumer} already has a producer, cannot also connect it to {producer}")]
    FanIn { producer: String, consumer: String },

    #[error("connecting {consumer} to {producer} would create a cycle")]
    WouldCycle { producer: String, consumer: String },

    #[error("block {block} failed to initialise")]
    AcquireFailed {
        block: String,
        #[source]
        source: NodeError,
    },

    #[error("block {consumer} is running at {got}, {producer} produces {expected}")]
    FormatMismatch {
        producer: String,
        consumer: String,
        expected: Format,
        got: Format,
    },

    #[error("block {block} has an invalid format ({format})")]
    InvalidFormat { block: String, format: Format },

    #[error("sample rates must be integer related ({block}: {input} Hz -> {output} Hz)")]
    InvalidRateRelationship { block: String, input: u32, output: u32 },

    #[error("pipeline not started at block {0}")]
    NotRunning(String),

    #[error("pipeline failed at block {block}")]
    TransformFailed {
        block: String,
        #[source]
        source: NodeError,
    },

    #[error("downstream of {block} failed to start")]
    DownstreamStartFailed {
        block: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("downstream of {block} failed to run")]
    DownstreamRunFailed {
        block: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// The innermost pipeline error, following downstream wrappers.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::DownstreamStartFailed { source, .. }
            | PipelineError::DownstreamRunFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T, E = PipelineError> = core::result::Result<T, E>;
