//! Ring buffer sink for handing samples to another thread

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::Producer;
use tracing::warn;

use crate::node::{DspNode, NodeError, ProcessContext, Sample};

/// A sink that pushes interleaved input into an rtrb ring buffer
///
/// Useful for:
/// - Feeding an audio device callback
/// - Sending samples to a network or recording thread
/// - Inspecting pipeline output in tests
///
/// A chunk that doesn't fit is dropped whole. Grab [`RtrbSink::drop_counter`]
/// before adding the sink to a pipeline to keep an eye on overruns.
pub struct RtrbSink {
    producer: Producer<Sample>,
    dropped: Arc<AtomicU64>,
}

impl RtrbSink {
    pub fn new(producer: Producer<Sample>) -> Self {
        Self {
            producer,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns how many sample slots are free
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.slots()
    }

    /// Shared count of samples discarded because the ring buffer was full
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}

impl DspNode for RtrbSink {
    fn process(
        &mut self,
        _ctx: &ProcessContext,
        input: &[Sample],
        _output: &mut [Sample],
    ) -> Result<(), NodeError> {
        // Skip if buffer is full
        if self.producer.slots() < input.len() {
            self.dropped.fetch_add(input.len() as u64, Ordering::Relaxed);
            warn!(samples = input.len(), "ring buffer full, dropping chunk");
            return Ok(());
        }

        for &sample in input {
            let _ = self.producer.push(sample);
        }
        Ok(())
    }

    fn kind(&self) -> &str {
        "rtrb_sink"
    }
}
