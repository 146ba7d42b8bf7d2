//! Error types for the dedup control surface.

use thiserror::Error;

/// Result type alias for control operations.
pub type Result<T> = std::result::Result<T, CtlError>;

/// Every way an invocation can fail. All variants are terminal.
#[derive(Debug, Error)]
pub enum CtlError {
    /// Wrong argument count or shape.
    #[error("{0}")]
    Usage(String),

    /// Malformed or unrecognized option value.
    #[error("{0}")]
    Parse(String),

    /// Well-formed but illegal configuration.
    #[error("{0}")]
    Validation(String),

    /// The target path could not be opened.
    #[error("failed to open file or directory: {path}")]
    Resource {
        /// Path given on the command line.
        path: String,
        /// Underlying open error.
        #[source]
        source: std::io::Error,
    },

    /// The backend rejected or failed the control exchange.
    #[error("failed to {action}: {reason}")]
    Transport {
        /// What was being attempted, e.g. "enable cbs".
        action: String,
        /// OS error text or a tailored remediation message.
        reason: String,
    },

    /// Configuration file could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Status output could not be written.
    #[error("failed to write output")]
    Output(#[from] std::io::Error),
}

impl CtlError {
    /// Process exit code for this error. Every failure maps to 1.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
