use crate::node::{DspNode, InitContext, NodeError, ProcessContext, Sample};

/// Multiplies the sample rate by `factor`, holding each frame
#[derive(Clone, Copy, Debug)]
pub struct Upsampler {
    factor: u32,
}

impl Upsampler {
    pub fn new(factor: u32) -> Self {
        Self { factor }
    }
}

impl DspNode for Upsampler {
    fn init(&mut self, ctx: &mut InitContext) -> Result<(), NodeError> {
        ctx.output.sample_rate = ctx
            .input
            .sample_rate
            .checked_mul(self.factor)
            .filter(|&rate| rate > 0)
            .ok_or_else(|| NodeError::failed("interpolation factor out of range"))?;
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        input: &[Sample],
        output: &mut [Sample],
    ) -> Result<(), NodeError> {
        let channels = ctx.input.channels as usize;
        let step = channels * ctx.interpolation as usize;
        for (out_group, in_frame) in output
            .chunks_exact_mut(step)
            .zip(input.chunks_exact(channels))
        {
            for out_frame in out_group.chunks_exact_mut(channels) {
                out_frame.copy_from_slice(in_frame);
            }
        }
        Ok(())
    }

    fn kind(&self) -> &str {
        "upsampler"
    }
}
