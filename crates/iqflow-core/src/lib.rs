//! iqflow Core - sample plumbing for SDR output devices
//!
//! - [`dsp`]: the multi-stream FIFO, filters and interpolator
//! - [`output`]: the streaming output driver, its worker, sinks and control messages
//! - [`config`]: YAML pipeline configuration

pub mod config;
pub mod dsp;
pub mod output;
pub mod types;

pub use types::*;
