//! Configuration
//!
//! YAML config loading and saving, standard paths, and the
//! [`PipelineConfig`] that ties FIFO, worker, settings, filters and sink
//! together.
//!
//! ```ignore
//! use iqflow_core::config::{default_config_path, load_config, PipelineConfig};
//!
//! let config: PipelineConfig = load_config(&default_config_path("pipeline.yaml"));
//! let driver = config.build_driver(config.build_fifo())?;
//! ```

mod io;
mod paths;
mod pipeline;

pub use io::{load_config, read_config, save_config};
pub use paths::{default_config_dir, default_config_path};
pub use pipeline::{FifoConfig, PipelineConfig};
