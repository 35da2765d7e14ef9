//! Built-in blocks.
//!
//! These are plumbing, not signal processing: enough to wire, test and
//! benchmark a pipeline without a real demodulator in the chain.
//!
//! ## Effects ([`effect`])
//!
//! - [`PassThrough`] - Copy input to output
//! - [`Gain`] - Scale every sample
//! - [`Decimator`] - Keep one frame in N, dividing the rate by N
//! - [`Upsampler`] - Repeat every frame N times, multiplying the rate by N
//! - [`Downmix`] - Average all channels into one
//!
//! ## Sinks ([`sink`])
//!
//! - [`RtrbSink`] - Write interleaved samples to a ring buffer

pub mod effect;
pub mod sink;

pub use effect::{Decimator, Downmix, Gain, PassThrough, Upsampler};
pub use sink::RtrbSink;
