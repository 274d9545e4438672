//! Output driver error types

use thiserror::Error;

use super::driver::DriverState;

/// Errors surfaced by the output driver
#[derive(Error, Debug)]
pub enum OutputError {
    /// `start()` called while not stopped
    #[error("Output already started (state: {0:?})")]
    AlreadyStarted(DriverState),

    /// The worker thread could not be created
    #[error("Failed to spawn output worker thread: {0}")]
    ResourceExhausted(#[source] std::io::Error),

    /// Settings snapshot outside the supported ranges
    #[error("Invalid output settings: {0}")]
    InvalidSettings(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
