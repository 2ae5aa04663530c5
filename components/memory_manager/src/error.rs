//! Allocator error type.

use thiserror::Error;

/// Errors reported by the heap, the pools and the managed cell arena.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// No block of the requested size is available after every
    /// free-unused-memory severity ran.
    #[error("out of memory: {requested} bytes requested")]
    OutOfMemory {
        /// Requested size in bytes
        requested: usize,
    },
    /// Zero-sized allocations are not supported.
    #[error("zero-sized allocation")]
    ZeroSize,
    /// A compressed pointer or offset does not address a live block.
    #[error("invalid heap pointer {0:#x}")]
    InvalidPointer(u32),
    /// A free that does not match an allocated block (misaligned, out of
    /// range or already free).
    #[error("invalid free of {size} bytes at offset {offset:#x}")]
    InvalidFree {
        /// Offset passed to free
        offset: u32,
        /// Size passed to free
        size: usize,
    },
    /// The free list violates one of its structural invariants.
    #[error("heap integrity violation: {0}")]
    Integrity(String),
}
