use crate::node::{DspNode, NodeError, ProcessContext, Sample};

/// Copies its input unchanged. Handy as a source or a tap point.
#[derive(Clone, Copy, Default, Debug)]
pub struct PassThrough;

impl DspNode for PassThrough {
    fn process(
        &mut self,
        ctx: &ProcessContext,
        input: &[Sample],
        output: &mut [Sample],
    ) -> Result<(), NodeError> {
        // only whole frames are copied
        let len = ctx.out_frames * ctx.output.channels as usize;
        output.copy_from_slice(&input[..len]);
        Ok(())
    }

    fn kind(&self) -> &str {
        "passthrough"
    }
}
