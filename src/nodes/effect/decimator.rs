use crate::node::{DspNode, Format, InitContext, NodeError, ProcessContext, Sample};

/// Divides the sample rate by `factor`, keeping the first frame of every
/// group. No anti-alias filtering; put a low-pass in front of it.
#[derive(Clone, Copy, Debug)]
pub struct Decimator {
    factor: u32,
}

impl Decimator {
    pub fn new(factor: u32) -> Self {
        Self { factor }
    }
}

impl DspNode for Decimator {
    fn init(&mut self, ctx: &mut InitContext) -> Result<(), NodeError> {
        if self.factor == 0 {
            return Err(NodeError::failed("decimation factor must be at least 1"));
        }
        let rate = ctx.input.sample_rate;
        if rate % self.factor != 0 {
            // nearest rate below that does divide
            let usable = (rate / self.factor).max(1) * self.factor;
            return Err(NodeError::Format {
                expected: Format::new(usable, ctx.input.channels),
                got: ctx.input,
            });
        }
        ctx.output.sample_rate = rate / self.factor;
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        input: &[Sample],
        output: &mut [Sample],
    ) -> Result<(), NodeError> {
        let channels = ctx.input.channels as usize;
        let step = channels * ctx.decimation as usize;
        for (out_frame, in_frame) in output
            .chunks_exact_mut(channels)
            .zip(input.chunks_exact(step))
        {
            out_frame.copy_from_slice(&in_frame[..channels]);
        }
        Ok(())
    }

    fn kind(&self) -> &str {
        "decimator"
    }
}
