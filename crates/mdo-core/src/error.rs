//! Unified error types for the mdo workspace
//!
//! [`MdoError`] is the common error currency between the problem model, the
//! coloring algorithms and the case-sweep driver. The variants double as the
//! failure taxonomy the driver uses to decide what happens to a sweep:
//!
//! - [`MdoError::Config`] is fatal and raised before any work is performed.
//! - [`MdoError::Analysis`] is a recoverable, per-case model failure.
//! - Everything else is treated as unexpected by the sweep driver.
//!
//! # Example
//!
//! ```ignore
//! use mdo_core::{MdoError, MdoResult};
//!
//! fn check_repeats(repeats: usize) -> MdoResult<()> {
//!     if repeats == 0 {
//!         return Err(MdoError::Config("repeats must be at least 1".into()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all mdo operations.
#[derive(Error, Debug)]
pub enum MdoError {
    /// I/O errors (file access, output streams)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors (shapes, unknown names, bad indices)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors; never recoverable
    #[error("Configuration error: {0}")]
    Config(String),

    /// A known analysis failure inside the model (non-convergence, singular
    /// state equations). Sweeps record it and move on to the next case.
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Linear solver errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl MdoError {
    /// True for failures a case sweep may record and step past.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MdoError::Analysis(_))
    }
}

/// Convenience type alias for Results using MdoError.
pub type MdoResult<T> = Result<T, MdoError>;

impl From<anyhow::Error> for MdoError {
    fn from(err: anyhow::Error) -> Self {
        MdoError::Other(format!("{err:#}"))
    }
}

impl From<String> for MdoError {
    fn from(s: String) -> Self {
        MdoError::Other(s)
    }
}

impl From<&str> for MdoError {
    fn from(s: &str) -> Self {
        MdoError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for MdoError {
    fn from(err: serde_json::Error) -> Self {
        MdoError::Parse(err.to_string())
    }
}
