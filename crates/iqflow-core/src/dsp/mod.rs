//! Sample-path building blocks
//!
//! - [`fifo`]: multi-stream ring buffer between producer and consumer threads
//! - [`filter`]: single-sample filter contract and concrete filters
//! - [`interpolator`]: power-of-two upsampler built from half-band stages

pub mod fifo;
pub mod filter;
pub mod interpolator;

pub use fifo::{AsyncRead, FifoEvent, ReadSpan, SampleMiFifo, SyncRead};
pub use filter::{
    lowpass_taps, AnyFilter, DcBlocker, Filter, FilterChain, FilterKind, FilterSample, FirFilter,
    IqFilterChain, OnePoleLowpass,
};
pub use interpolator::Interpolator;
