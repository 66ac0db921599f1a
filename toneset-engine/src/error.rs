//! Error types for toneset-engine
//!
//! Defines engine error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the threshold-estimation engine
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid session configuration, detected before a session starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tone parameters outside the playable range
    #[error("Invalid tone: {0}")]
    InvalidTone(String),

    /// Invalid argument to a model or statistics query
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Audibility model queried without any calibration data
    #[error("Model not initialized: {0}")]
    ModelNotInitialized(String),

    /// Statistical analysis requested for a tone absent from confidence results
    #[error("Pair not tested: {0}")]
    PairNotTested(String),

    /// A hypothesis test over zero trials
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Bounded critical-region search failed to find a bound
    #[error("Critical region search did not converge: {0}")]
    NonConvergent(String),

    /// Stimulus playback fault
    #[error("Playback error: {0}")]
    Playback(String),

    /// Subject response channel fault
    #[error("Response channel error: {0}")]
    ResponseChannel(String),

    /// Result sink write failure
    #[error("Result sink error: {0}")]
    Sink(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Another test session is still running
    #[error("Session already active: {0}")]
    SessionActive(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors from the shared common crate
    #[error(transparent)]
    Common(#[from] toneset_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Faults that pause the session instead of aborting it
    pub fn is_fault(&self) -> bool {
        matches!(self, Error::Playback(_) | Error::ResponseChannel(_))
    }
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_classification() {
        assert!(Error::Playback("device lost".into()).is_fault());
        assert!(Error::ResponseChannel("closed".into()).is_fault());
        assert!(!Error::Sink("disk full".into()).is_fault());
        assert!(!Error::Config("bad".into()).is_fault());
    }

    #[test]
    fn test_common_error_is_transparent() {
        let err: Error = toneset_common::Error::Config("bad level".into()).into();
        assert_eq!(err.to_string(), "Configuration error: bad level");
    }
}
