//! Channel downmix - averages all input channels into one

use crate::node::{DspNode, InitContext, NodeError, ProcessContext, Sample};

/// Averages each frame's channels into a mono output
#[derive(Clone, Copy, Default, Debug)]
pub struct Downmix;

impl DspNode for Downmix {
    fn init(&mut self, ctx: &mut InitContext) -> Result<(), NodeError> {
        ctx.output.channels = 1;
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        input: &[Sample],
        output: &mut [Sample],
    ) -> Result<(), NodeError> {
        let channels = ctx.input.channels as usize;
        let scale = 1.0 / channels as f32;
        for (out_sample, frame) in output.iter_mut().zip(input.chunks_exact(channels)) {
            *out_sample = frame.iter().sum::<f32>() * scale;
        }
        Ok(())
    }

    fn kind(&self) -> &str {
        "downmix"
    }
}
