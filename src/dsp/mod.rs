pub mod biquad;
pub mod compressor;
pub mod limiter;
pub mod utils;

pub use biquad::{Biquad, BUTTERWORTH_Q};
pub use compressor::{CompressorSettings, DynamicsCompressor};
pub use limiter::BrickwallLimiter;
