//! Output device settings
//!
//! [`OutputSettings`] is the value object the driver owns. It only changes
//! through `apply_settings`, which diffs it field by field against the new
//! snapshot ([`OutputSettings::diff`]) to decide what the live pipeline needs.

use serde::{Deserialize, Serialize};

use super::error::{OutputError, OutputResult};
use crate::types::{DEFAULT_CENTER_FREQUENCY, DEFAULT_SAMPLE_RATE, MAX_LOG2_INTERP};

/// Settings snapshot for a streaming output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Center frequency in Hz
    pub center_frequency: u64,
    /// Device-side sample rate in Hz (after interpolation)
    pub sample_rate: u32,
    /// Interpolation exponent: the baseband is upsampled by `2^log2_interp`
    pub log2_interp: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            center_frequency: DEFAULT_CENTER_FREQUENCY,
            sample_rate: DEFAULT_SAMPLE_RATE,
            log2_interp: 0,
        }
    }
}

impl OutputSettings {
    /// Rate at which the worker consumes samples from the FIFO
    pub fn baseband_rate(&self) -> u32 {
        self.sample_rate >> self.log2_interp.min(MAX_LOG2_INTERP)
    }

    /// Check the ranges the driver relies on
    pub fn validate(&self) -> OutputResult<()> {
        if self.sample_rate == 0 {
            return Err(OutputError::InvalidSettings(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.log2_interp > MAX_LOG2_INTERP {
            return Err(OutputError::InvalidSettings(format!(
                "log2 interpolation {} exceeds maximum {}",
                self.log2_interp, MAX_LOG2_INTERP
            )));
        }
        if self.baseband_rate() == 0 {
            return Err(OutputError::InvalidSettings(format!(
                "sample rate {} too low for interpolation x{}",
                self.sample_rate,
                1u32 << self.log2_interp
            )));
        }
        Ok(())
    }

    /// Fields of `new` that differ from `self` (all of them when `force`)
    pub fn diff(&self, new: &OutputSettings, force: bool) -> SettingsChanges {
        SettingsChanges {
            center_frequency: force || self.center_frequency != new.center_frequency,
            sample_rate: force || self.sample_rate != new.sample_rate,
            log2_interp: force || self.log2_interp != new.log2_interp,
        }
    }
}

/// Which fields an `apply_settings` call changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChanges {
    pub center_frequency: bool,
    pub sample_rate: bool,
    pub log2_interp: bool,
}

impl SettingsChanges {
    pub fn any(&self) -> bool {
        self.center_frequency || self.sample_rate || self.log2_interp
    }

    /// Whether the worker's pacing or interpolation must be updated
    pub fn affects_worker(&self) -> bool {
        self.sample_rate || self.log2_interp
    }
}
