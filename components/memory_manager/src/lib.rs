//! Memory Manager - heap allocator and property storage
//!
//! This component provides:
//! - A segregated free-list heap over one byte region with compressed pointers
//! - 8 and 16 byte chunk pools for small cells
//! - A typed cell arena whose compressed pointers index payload slots
//! - Insertion-ordered property tables indexed by an open-addressing hash map
//!   stored on the heap
//!
//! Collection policy is left to the embedder: the heap only calls the
//! free-unused-memory callback when an allocation cannot be satisfied.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cells;
pub mod error;
pub mod heap;
pub mod pool;
pub mod property;
pub mod property_hashmap;

pub use cells::{ManagedHeap, Reclaim};
pub use error::MemoryError;
pub use heap::{
    FreeUnusedMemoryCallback, HeapOffset, HeapStats, JmemHeap, Severity, DEFAULT_DESIRED_LIMIT,
    DEFAULT_HEAP_SIZE, JMEM_ALIGNMENT,
};
pub use pool::{POOL_CHUNK_LARGE, POOL_CHUNK_SMALL};
pub use property::{name_hash, Property, PropertyFlags, PropertyName, PropertyTable};
pub use property_hashmap::{PairSlot, PropertyHashmap};
