//! Fixed-size chunk pools for 8 and 16 byte requests.
//!
//! Freed chunks are kept on a per-size intrusive list instead of going back
//! to the heap, so the many small cells a script creates do not fragment the
//! free list. The list link is stored in the first word of each chunk.
//! [`JmemHeap::collect_empty_pools`] hands every pooled chunk back to the
//! heap; the allocator does this itself before retrying a failed request.

use tracing::{error, trace};

use crate::error::MemoryError;
use crate::heap::{HeapOffset, JmemHeap, JMEM_ALIGNMENT};

/// Largest request served by the 8 byte pool.
pub const POOL_CHUNK_SMALL: usize = 8;
/// Largest request served by the 16 byte pool.
pub const POOL_CHUNK_LARGE: usize = 16;

const EMPTY_POOL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolClass {
    Small,
    Large,
}

impl PoolClass {
    fn for_size(size: usize) -> Option<Self> {
        match size {
            0 => None,
            s if s <= POOL_CHUNK_SMALL => Some(PoolClass::Small),
            s if s <= POOL_CHUNK_LARGE => Some(PoolClass::Large),
            _ => None,
        }
    }

    fn chunk_size(self) -> usize {
        match self {
            PoolClass::Small => POOL_CHUNK_SMALL,
            PoolClass::Large => POOL_CHUNK_LARGE,
        }
    }
}

/// Heads of the two chunk lists.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PoolLists {
    small: u32,
    large: u32,
    small_count: usize,
    large_count: usize,
}

impl Default for PoolLists {
    fn default() -> Self {
        PoolLists {
            small: EMPTY_POOL,
            large: EMPTY_POOL,
            small_count: 0,
            large_count: 0,
        }
    }
}

impl PoolLists {
    fn head(&self, class: PoolClass) -> u32 {
        match class {
            PoolClass::Small => self.small,
            PoolClass::Large => self.large,
        }
    }

    fn push(&mut self, class: PoolClass, head: u32) {
        match class {
            PoolClass::Small => {
                self.small = head;
                self.small_count += 1;
            }
            PoolClass::Large => {
                self.large = head;
                self.large_count += 1;
            }
        }
    }

    fn pop(&mut self, class: PoolClass, next: u32) {
        match class {
            PoolClass::Small => {
                self.small = next;
                self.small_count = self.small_count.saturating_sub(1);
            }
            PoolClass::Large => {
                self.large = next;
                self.large_count = self.large_count.saturating_sub(1);
            }
        }
    }
}

impl JmemHeap {
    /// Allocates `size` bytes, serving small requests from the chunk pools.
    ///
    /// Requests above 16 bytes go straight to [`JmemHeap::alloc_block`].
    ///
    /// # Errors
    ///
    /// Same as [`JmemHeap::alloc_block`].
    pub fn alloc_pooled(&mut self, size: usize) -> Result<HeapOffset, MemoryError> {
        let class = match PoolClass::for_size(size) {
            Some(class) => class,
            None => return self.alloc_block(size),
        };
        let head = self.pools.head(class);
        if head != EMPTY_POOL {
            let next = self.read_u32(head);
            self.pools.pop(class, next);
            trace!(offset = head, ?class, "pool hit");
            return Ok(HeapOffset::new(head));
        }
        self.alloc_block(class.chunk_size())
    }

    /// Returns a chunk obtained from [`JmemHeap::alloc_pooled`].
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidFree`] when the offset cannot be a chunk.
    pub fn free_pooled(&mut self, offset: HeapOffset, size: usize) -> Result<(), MemoryError> {
        let class = match PoolClass::for_size(size) {
            Some(class) => class,
            None => return self.free_block(offset, size),
        };
        let chunk = offset.get();
        if chunk % JMEM_ALIGNMENT != 0 || chunk as usize + class.chunk_size() > self.area_size() {
            return Err(MemoryError::InvalidFree {
                offset: chunk,
                size,
            });
        }
        let head = self.pools.head(class);
        self.write_u32(chunk, head);
        self.pools.push(class, chunk);
        Ok(())
    }

    /// Number of chunks currently parked in the 8 and 16 byte pools.
    pub fn pooled_chunk_count(&self) -> (usize, usize) {
        (self.pools.small_count, self.pools.large_count)
    }

    /// Gives every pooled chunk back to the heap free list.
    pub fn collect_empty_pools(&mut self) {
        for class in [PoolClass::Small, PoolClass::Large] {
            let mut chunk = self.pools.head(class);
            while chunk != EMPTY_POOL {
                let next = self.read_u32(chunk);
                if let Err(err) = self.free_block(HeapOffset::new(chunk), class.chunk_size()) {
                    error!(%err, "pooled chunk could not be returned to the heap");
                }
                chunk = next;
            }
        }
        self.pools = PoolLists::default();
    }
}
