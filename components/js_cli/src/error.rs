//! Error types for the CLI

use bytecode_system::DecodeError;
use interpreter::VmError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// A snapshot or configuration file could not be read
    #[error("cannot read '{}': {source}", .path.display())]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Writing the listing or result failed
    #[error("cannot write output: {0}")]
    Output(#[source] std::io::Error),

    /// The configuration file is not valid JSON for a `VmConfig`
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The snapshot is malformed
    #[error("invalid snapshot: {0}")]
    Decode(#[from] DecodeError),

    /// The program threw and nothing caught it
    #[error("Uncaught {0}")]
    Uncaught(String),

    /// The engine stopped for a reason scripts cannot observe
    #[error("VM error: {0}")]
    Vm(VmError),
}

impl From<VmError> for CliError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::Decode(decode) => CliError::Decode(decode),
            other => CliError::Vm(other),
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
