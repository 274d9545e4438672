//! Test sink configuration
//!
//! Stored as YAML at `~/.config/iqflow/testsink.yaml` unless a path is given
//! on the command line.

use std::path::PathBuf;

use iqflow_core::config::{default_config_path, PipelineConfig};
use serde::{Deserialize, Serialize};

/// Default config file name
pub const CONFIG_FILENAME: &str = "testsink.yaml";

pub fn default_config_file() -> PathBuf {
    default_config_path(CONFIG_FILENAME)
}

/// Tone generator feeding the FIFO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    /// Tone offset from center per stream, in Hz; the last entry repeats
    pub offsets_hz: Vec<f32>,
    /// Peak amplitude (full scale is 1.0)
    pub amplitude: f32,
    /// Producer wakeup period in milliseconds
    pub period_ms: u64,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            offsets_hz: vec![1000.0],
            amplitude: 0.5,
            period_ms: 10,
        }
    }
}

impl ToneConfig {
    /// Offset used for `stream`
    pub fn offset_for(&self, stream: usize) -> f32 {
        self.offsets_hz
            .get(stream)
            .or_else(|| self.offsets_hz.last())
            .copied()
            .unwrap_or(0.0)
    }
}

/// Run length and status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Stop after this many seconds; run until killed when unset
    pub duration_secs: Option<u64>,
    /// Status timer period in milliseconds
    pub status_ms: u64,
    /// Status ticks between stream timing requests
    pub timing_interval_ticks: u64,
    /// Settings debounce period in milliseconds
    pub update_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_secs: Some(10),
            status_ms: 50,
            timing_interval_ticks: 20,
            update_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSinkConfig {
    pub pipeline: PipelineConfig,
    pub tone: ToneConfig,
    pub run: RunConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use iqflow_core::config::{load_config, save_config};

    #[test]
    fn test_offset_repeats_last_entry() {
        let tone = ToneConfig {
            offsets_hz: vec![100.0, -250.0],
            ..Default::default()
        };
        assert_eq!(tone.offset_for(0), 100.0);
        assert_eq!(tone.offset_for(1), -250.0);
        assert_eq!(tone.offset_for(5), -250.0);

        let silent = ToneConfig {
            offsets_hz: Vec::new(),
            ..Default::default()
        };
        assert_eq!(silent.offset_for(0), 0.0);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);

        let mut config = TestSinkConfig::default();
        config.pipeline.fifo.streams = 2;
        config.tone.offsets_hz = vec![500.0, 1500.0];
        config.run.duration_secs = None;
        save_config(&config, &path).unwrap();

        let loaded: TestSinkConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_default_file_location() {
        assert!(default_config_file().ends_with("iqflow/testsink.yaml"));
    }
}
