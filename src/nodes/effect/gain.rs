//! Gain/volume control

use crate::node::{DspNode, NodeError, ProcessContext, Sample};

/// Multiplies every sample by a fixed gain (1.0 = unity, 0.0 = silence)
#[derive(Clone, Copy, Debug)]
pub struct Gain {
    gain: f32,
}

impl Gain {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl DspNode for Gain {
    fn process(
        &mut self,
        _ctx: &ProcessContext,
        input: &[Sample],
        output: &mut [Sample],
    ) -> Result<(), NodeError> {
        for (out_sample, &in_sample) in output.iter_mut().zip(input.iter()) {
            *out_sample = in_sample * self.gain;
        }
        Ok(())
    }

    fn kind(&self) -> &str {
        "gain"
    }
}
