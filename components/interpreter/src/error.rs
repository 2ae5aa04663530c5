//! Interpreter error type.

use bytecode_system::DecodeError;
use core_types::Value;
use memory_manager::MemoryError;
use thiserror::Error;

/// Errors leaving the interpreter.
///
/// Only [`VmError::Throw`] is visible to scripts: it is the one variant the
/// exception-context stack can catch. Every other variant aborts all pending
/// `try` contexts and unwinds straight to the embedder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// A script exception carrying the thrown value
    #[error("uncaught exception {0:?}")]
    Throw(Value),
    /// The heap is exhausted after every free-unused-memory severity ran
    #[error("out of memory")]
    OutOfMemory,
    /// Corrupt bytecode or engine state detected at run time
    #[error("internal invariant violated: {0}")]
    Invariant(String),
    /// The host's stop callback requested termination
    #[error("execution terminated")]
    Terminated,
    /// A snapshot could not be loaded
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl VmError {
    /// Shorthand for [`VmError::Invariant`].
    pub fn invariant(message: impl Into<String>) -> Self {
        VmError::Invariant(message.into())
    }

    /// Whether a script `catch` can observe this error.
    pub fn is_catchable(&self) -> bool {
        matches!(self, VmError::Throw(_))
    }
}

impl From<MemoryError> for VmError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::OutOfMemory { .. } => VmError::OutOfMemory,
            other => VmError::Invariant(other.to_string()),
        }
    }
}

/// Result alias used throughout the interpreter.
pub type VmResult<T> = Result<T, VmError>;
