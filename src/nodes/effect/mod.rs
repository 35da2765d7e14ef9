mod decimator;
mod downmix;
mod gain;
mod passthrough;
mod upsampler;

pub use decimator::Decimator;
pub use downmix::Downmix;
pub use gain::Gain;
pub use passthrough::PassThrough;
pub use upsampler::Upsampler;
