//! Pipeline configuration
//!
//! One YAML document describes a whole output pipeline:
//!
//! ```yaml
//! fifo:
//!   streams: 2
//!   capacity: 96000
//! worker:
//!   tick_ms: 20
//! output:
//!   center_frequency: 435000000
//!   sample_rate: 48000
//!   log2_interp: 0
//! filters:
//!   - kind: dc_block
//!     pole: 0.995
//! sink:
//!   kind: raw_file
//!   path: /tmp/out.iq
//! ```
//!
//! Every section is optional and falls back to its defaults.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dsp::{FilterKind, SampleMiFifo};
use crate::output::{OutputDriver, OutputSettings, SinkKind, WorkerConfig};
use crate::types::{IqSample, DEFAULT_SAMPLE_RATE};

/// FIFO layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FifoConfig {
    /// Number of synchronized streams
    pub streams: usize,
    /// Samples per stream
    pub capacity: usize,
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self {
            streams: 1,
            // One second at the default rate
            capacity: DEFAULT_SAMPLE_RATE as usize,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fifo: FifoConfig,
    pub worker: WorkerConfig,
    pub output: OutputSettings,
    pub filters: Vec<FilterKind>,
    pub sink: SinkKind,
}

impl PipelineConfig {
    pub fn build_fifo(&self) -> Arc<SampleMiFifo<IqSample>> {
        Arc::new(SampleMiFifo::with_streams(self.fifo.streams, self.fifo.capacity))
    }

    /// Build a stopped driver over `fifo` with this config's sink and settings
    pub fn build_driver(&self, fifo: Arc<SampleMiFifo<IqSample>>) -> Result<OutputDriver> {
        let sink = self
            .sink
            .build()
            .with_context(|| format!("Failed to open sink {:?}", self.sink))?;
        let driver = OutputDriver::new(fifo, sink)
            .with_worker_config(self.worker.clone())
            .with_filters(self.filters.clone())
            .with_settings(self.output)
            .context("Invalid output settings in config")?;
        Ok(driver)
    }
}
