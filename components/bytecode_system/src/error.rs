//! Snapshot decoding errors.

use thiserror::Error;

/// Why a snapshot could not be loaded. Nothing decoded before the error is
/// kept.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The input is empty.
    #[error("file length zero error")]
    Empty,
    /// The header carries the wrong magic number.
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    /// The snapshot requires a newer loader.
    #[error("snapshot needs format version {required}, loader supports {supported}")]
    IncompatibleVersion {
        /// Compatible version recorded in the snapshot
        required: u32,
        /// Version this loader implements
        supported: u32,
    },
    /// Encrypted snapshots are not supported.
    #[error("encrypted snapshots are not supported")]
    Encrypted,
    /// A record or section ends before its declared length.
    #[error("truncated {0}")]
    Truncated(&'static str),
    /// A record carries an unexpected key.
    #[error("unexpected key {found} in {context}, expected {expected}")]
    UnexpectedKey {
        /// Where the key was read
        context: &'static str,
        /// Key the format requires here
        expected: u16,
        /// Key found in the stream
        found: u16,
    },
    /// The instruction bit stream is malformed.
    #[error("malformed instruction stream: {0}")]
    MalformedInstruction(String),
    /// A string, regex flag, function or closure index is out of range.
    #[error("{kind} index {index} out of range (count {count})")]
    IndexOutOfRange {
        /// Table being indexed
        kind: &'static str,
        /// Offending index
        index: i64,
        /// Table size
        count: usize,
    },
    /// A constant payload could not be decoded or materialised.
    #[error("invalid constant: {0}")]
    InvalidConstant(String),
    /// Any other structural problem.
    #[error("malformed snapshot: {0}")]
    Malformed(String),
}
