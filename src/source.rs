//! Feeding sources from another thread
//!
//! A source block has no producer inside the pipeline. Whatever captures
//! samples (a radio front end, a file reader) pushes interleaved samples into
//! an `rtrb` ring buffer; the pipeline thread drains it in whole chunks with
//! a [`Pump`].

use rtrb::Consumer;
use tracing::{debug, error};

use crate::error::{PipelineError, Result};
use crate::graph::{BlockId, Pipeline};
use crate::node::Sample;

/// Drains a ring buffer into a source block, one chunk per `run`.
///
/// ```
/// use dspblock::nodes::PassThrough;
/// use dspblock::{Pipeline, Pump};
///
/// let (mut producer, consumer) = rtrb::RingBuffer::new(4096);
/// let mut pipeline = Pipeline::new();
/// let source = pipeline.add_source("capture", PassThrough);
/// pipeline.set_chunk_size(source, 256)?;
/// pipeline.start(source)?;
///
/// for _ in 0..600 {
///     producer.push(0.0).unwrap();
/// }
///
/// let mut pump = Pump::new(consumer);
/// assert_eq!(pump.pump(&mut pipeline, source)?, 2);
/// assert_eq!(pump.queued(), 88);
/// # Ok::<(), dspblock::PipelineError>(())
/// ```
pub struct Pump {
    consumer: Consumer<Sample>,
    chunk: Vec<Sample>,
}

impl Pump {
    pub fn new(consumer: Consumer<Sample>) -> Self {
        Self {
            consumer,
            chunk: Vec::new(),
        }
    }

    /// Samples waiting in the ring buffer
    #[inline]
    pub fn queued(&self) -> usize {
        self.consumer.slots()
    }

    /// Run `source` once for every complete chunk currently queued.
    ///
    /// Returns the number of chunks run. A partial chunk stays queued for the
    /// next call. The first failing run ends the call; the chunk it was given
    /// is consumed.
    pub fn pump(&mut self, pipeline: &mut Pipeline, source: BlockId) -> Result<usize> {
        let frames = match pipeline.chunk_size(source)? {
            Some(frames) => frames,
            None => {
                let name = pipeline.name(source)?.to_string();
                error!(block = %name, "pump attached to a block that is not a source");
                return Err(PipelineError::NotASource(name));
            }
        };
        let samples = frames * pipeline.input_format(source)?.channels as usize;
        if samples == 0 {
            return Ok(0);
        }

        let mut chunks = 0;
        while self.consumer.slots() >= samples {
            let read = match self.consumer.read_chunk(samples) {
                Ok(read) => read,
                Err(_) => break,
            };
            let (first, second) = read.as_slices();
            self.chunk.clear();
            self.chunk.extend_from_slice(first);
            self.chunk.extend_from_slice(second);
            read.commit_all();

            pipeline.run(source, &self.chunk)?;
            chunks += 1;
        }

        if chunks > 0 {
            debug!(block = %pipeline.name(source)?, chunks, "pumped source");
        }
        Ok(chunks)
    }
}
