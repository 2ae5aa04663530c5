//! Segregated free-list heap over a single byte region.
//!
//! The heap hands out 8-byte aligned blocks addressed by [`HeapOffset`].
//! Free blocks form a singly linked list in increasing address order whose
//! nodes live in-band: the first eight bytes of a free block hold
//! `{size: u32, next_offset: u32}`. The list head is a sentinel kept outside
//! the region, so offset `0` is a valid block address.
//!
//! A skip pointer remembers the free block nearest the last operation;
//! frees that land past it start their search there instead of at the head.
//!
//! Two allocation entry points exist with different failure contracts:
//! [`JmemHeap::alloc_block`] reports exhaustion as an error the engine treats
//! as fatal, [`JmemHeap::alloc_block_null_on_error`] returns `None` for
//! callers that can do without the memory.

use core_types::CompressedPointer;
use tracing::{debug, error};

use crate::error::MemoryError;
use crate::pool::PoolLists;

/// Allocation granularity in bytes.
pub const JMEM_ALIGNMENT: u32 = 8;
/// `log2(JMEM_ALIGNMENT)`
pub const JMEM_ALIGNMENT_LOG: u32 = 3;
/// Default heap region size (4 MiB).
pub const DEFAULT_HEAP_SIZE: usize = 4 * 1024 * 1024;
/// Default step by which the soft limit grows and shrinks.
pub const DEFAULT_DESIRED_LIMIT: usize = 8 * 1024;

const END_OF_LIST: u32 = u32::MAX;
const HEADER_SIZE: usize = 8;

/// Byte offset of a block inside the heap region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapOffset(u32);

impl HeapOffset {
    /// Wraps a raw offset.
    pub fn new(offset: u32) -> Self {
        HeapOffset(offset)
    }

    /// Raw offset.
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Severity passed to the free-unused-memory callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// First attempt: release caches and cheap garbage
    Low,
    /// Last attempt before the allocation fails
    High,
}

impl Severity {
    /// Severities in escalation order.
    pub const ESCALATION: [Severity; 2] = [Severity::Low, Severity::High];
}

/// Callback invoked under memory pressure, typically to run a collector.
pub type FreeUnusedMemoryCallback = Box<dyn FnMut(Severity, &mut JmemHeap)>;

/// Allocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Size of the heap region
    pub size: usize,
    /// Bytes currently handed out (aligned)
    pub allocated_bytes: usize,
    /// High-water mark of `allocated_bytes`
    pub peak_allocated_bytes: usize,
    /// Bytes lost to alignment padding
    pub waste_bytes: usize,
    /// High-water mark of `waste_bytes`
    pub peak_waste_bytes: usize,
    /// Number of successful block allocations
    pub alloc_count: usize,
    /// Number of block frees
    pub free_count: usize,
    /// Frees that started from the skip pointer
    pub skip_count: usize,
    /// Frees that started from the list head
    pub nonskip_count: usize,
    /// Free-list nodes visited by allocations
    pub alloc_iter_count: usize,
    /// Free-list nodes visited by frees
    pub free_iter_count: usize,
}

/// The free-list heap.
///
/// # Examples
///
/// ```
/// use memory_manager::JmemHeap;
///
/// let mut heap = JmemHeap::new(1024);
/// let a = heap.alloc_block(24).unwrap();
/// let b = heap.alloc_block(8).unwrap();
/// heap.free_block(a, 24).unwrap();
/// heap.free_block(b, 8).unwrap();
/// assert_eq!(heap.allocated_size(), 0);
/// assert_eq!(heap.free_region_count(), 1);
/// ```
pub struct JmemHeap {
    area: Vec<u8>,
    /// `next_offset` of the out-of-band list head.
    first_next: u32,
    /// Free block to resume searches from; `None` is the list head.
    skip: Option<u32>,
    allocated_size: usize,
    limit: usize,
    desired_limit: usize,
    pub(crate) pools: PoolLists,
    callback: Option<FreeUnusedMemoryCallback>,
    stats: HeapStats,
}

impl std::fmt::Debug for JmemHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JmemHeap")
            .field("size", &self.area.len())
            .field("allocated_size", &self.allocated_size)
            .field("limit", &self.limit)
            .field("free_regions", &self.free_region_count())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

fn align_up(size: usize) -> usize {
    let alignment = JMEM_ALIGNMENT as usize;
    (size + alignment - 1) / alignment * alignment
}

impl JmemHeap {
    /// Creates a heap managing `area_size` bytes (rounded up to the alignment).
    pub fn new(area_size: usize) -> Self {
        Self::with_desired_limit(area_size, DEFAULT_DESIRED_LIMIT)
    }

    /// Creates a heap with a custom soft-limit step.
    pub fn with_desired_limit(area_size: usize, desired_limit: usize) -> Self {
        let max_area = (END_OF_LIST - JMEM_ALIGNMENT) as usize;
        let size = align_up(area_size.clamp(HEADER_SIZE, max_area));
        let desired_limit = desired_limit.max(JMEM_ALIGNMENT as usize);
        let mut heap = JmemHeap {
            area: vec![0; size],
            first_next: 0,
            skip: None,
            allocated_size: 0,
            limit: desired_limit,
            desired_limit,
            pools: PoolLists::default(),
            callback: None,
            stats: HeapStats {
                size,
                ..HeapStats::default()
            },
        };
        heap.write_header(0, size as u32, END_OF_LIST);
        debug!(size, "heap initialised");
        heap
    }

    /// Size of the managed region in bytes.
    pub fn area_size(&self) -> usize {
        self.area.len()
    }

    /// Bytes currently handed out.
    pub fn allocated_size(&self) -> usize {
        self.allocated_size
    }

    /// Current soft limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Snapshot of the allocation counters.
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Installs the free-unused-memory callback. Only one is supported; a
    /// previous callback is returned.
    pub fn set_free_unused_memory_callback(
        &mut self,
        callback: FreeUnusedMemoryCallback,
    ) -> Option<FreeUnusedMemoryCallback> {
        self.callback.replace(callback)
    }

    /// Removes the free-unused-memory callback.
    pub fn clear_free_unused_memory_callback(&mut self) -> Option<FreeUnusedMemoryCallback> {
        self.callback.take()
    }

    /// Allocates a block, treating exhaustion as fatal for the caller.
    ///
    /// # Errors
    ///
    /// [`MemoryError::ZeroSize`] for empty requests and
    /// [`MemoryError::OutOfMemory`] when no block fits after every
    /// severity of the free-unused-memory callback ran.
    pub fn alloc_block(&mut self, size: usize) -> Result<HeapOffset, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        match self.gc_and_alloc_block(size) {
            Some(offset) => Ok(offset),
            None => {
                error!(size, allocated = self.allocated_size, "heap exhausted");
                Err(MemoryError::OutOfMemory { requested: size })
            }
        }
    }

    /// Allocates a block, returning `None` on exhaustion or for empty requests.
    pub fn alloc_block_null_on_error(&mut self, size: usize) -> Option<HeapOffset> {
        if size == 0 {
            return None;
        }
        self.gc_and_alloc_block(size)
    }

    fn gc_and_alloc_block(&mut self, size: usize) -> Option<HeapOffset> {
        if let Some(offset) = self.alloc_block_internal(size) {
            return Some(offset);
        }
        for severity in Severity::ESCALATION {
            self.run_free_unused_memory_callbacks(severity);
            if let Some(offset) = self.alloc_block_internal(size) {
                return Some(offset);
            }
        }
        None
    }

    /// Runs the registered callback at `severity`, then returns pooled chunks
    /// to the free list.
    pub fn run_free_unused_memory_callbacks(&mut self, severity: Severity) {
        debug!(?severity, "freeing unused memory");
        if let Some(mut callback) = self.callback.take() {
            callback(severity, self);
            if self.callback.is_none() {
                self.callback = Some(callback);
            }
        }
        self.collect_empty_pools();
    }

    fn alloc_block_internal(&mut self, size: usize) -> Option<HeapOffset> {
        let required = align_up(size);
        if required > u32::MAX as usize {
            return None;
        }
        let required = required as u32;
        let mut data = None;

        if required == JMEM_ALIGNMENT && self.first_next != END_OF_LIST {
            // Any free block is at least one alignment unit.
            let offset = self.first_next;
            let (block_size, block_next) = self.read_header(offset);
            self.stats.alloc_iter_count += 1;
            if block_size == JMEM_ALIGNMENT {
                self.first_next = block_next;
            } else {
                let remaining = offset + JMEM_ALIGNMENT;
                self.write_header(remaining, block_size - JMEM_ALIGNMENT, block_next);
                self.first_next = remaining;
            }
            if self.skip == Some(offset) {
                self.skip = self.head_as_skip();
            }
            data = Some(offset);
        } else {
            let mut prev: Option<u32> = None;
            let mut current = self.first_next;
            while current != END_OF_LIST {
                self.stats.alloc_iter_count += 1;
                let (block_size, block_next) = self.read_header(current);
                if block_size >= required {
                    if block_size > required {
                        let remaining = current + required;
                        self.write_header(remaining, block_size - required, block_next);
                        self.set_next(prev, remaining);
                    } else {
                        self.set_next(prev, block_next);
                    }
                    self.skip = prev;
                    data = Some(current);
                    break;
                }
                prev = Some(current);
                current = block_next;
            }
        }

        let offset = data?;
        self.allocated_size += required as usize;
        while self.allocated_size >= self.limit {
            self.limit += self.desired_limit;
        }
        self.stat_alloc(size, required as usize);
        Some(HeapOffset(offset))
    }

    /// Returns a block to the free list, merging it with adjacent free blocks.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidFree`] when the block is misaligned, outside the
    /// region, or overlaps memory that is already free.
    pub fn free_block(&mut self, offset: HeapOffset, size: usize) -> Result<(), MemoryError> {
        let block = offset.0;
        let aligned = align_up(size);
        let invalid = MemoryError::InvalidFree {
            offset: block,
            size,
        };
        if size == 0
            || block % JMEM_ALIGNMENT != 0
            || block as usize + aligned > self.area.len()
            || aligned > self.allocated_size
        {
            return Err(invalid);
        }
        let aligned = aligned as u32;

        let mut prev = match self.skip {
            Some(skip) if block > skip => {
                self.stats.skip_count += 1;
                Some(skip)
            }
            _ => {
                self.stats.nonskip_count += 1;
                None
            }
        };
        loop {
            let next = self.next_of(prev);
            if next != END_OF_LIST && next < block {
                prev = Some(next);
                self.stats.free_iter_count += 1;
            } else {
                break;
            }
        }
        let next = self.next_of(prev);

        // Overlap with a neighbouring free block means a double free.
        if let Some(p) = prev {
            if p + self.read_header(p).0 > block {
                return Err(invalid);
            }
        }
        if next != END_OF_LIST && block + aligned > next {
            return Err(invalid);
        }

        let merged_start = match prev {
            Some(p) if self.region_end(p) == block => {
                let (prev_size, prev_next) = self.read_header(p);
                self.write_header(p, prev_size + aligned, prev_next);
                p
            }
            _ => {
                self.write_header(block, aligned, next);
                self.set_next(prev, block);
                block
            }
        };

        if next != END_OF_LIST && self.region_end(merged_start) == next {
            let (start_size, _) = self.read_header(merged_start);
            let (next_size, next_next) = self.read_header(next);
            self.write_header(merged_start, start_size + next_size, next_next);
        } else {
            let (start_size, _) = self.read_header(merged_start);
            self.write_header(merged_start, start_size, next);
        }

        self.skip = prev;
        self.allocated_size -= aligned as usize;
        while self.limit > self.desired_limit
            && self.allocated_size + self.desired_limit <= self.limit
        {
            self.limit -= self.desired_limit;
        }
        self.stat_free(size, aligned as usize);
        Ok(())
    }

    /// Whether `offset` addresses a byte of the heap region.
    pub fn is_heap_pointer(&self, offset: HeapOffset) -> bool {
        (offset.0 as usize) < self.area.len()
    }

    /// Compresses a block offset into a nonzero pointer value.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidPointer`] for misaligned or out-of-region offsets.
    pub fn compress(&self, offset: HeapOffset) -> Result<CompressedPointer, MemoryError> {
        if offset.0 % JMEM_ALIGNMENT != 0 || !self.is_heap_pointer(offset) {
            return Err(MemoryError::InvalidPointer(offset.0));
        }
        CompressedPointer::new((offset.0 >> JMEM_ALIGNMENT_LOG) + 1)
            .ok_or(MemoryError::InvalidPointer(offset.0))
    }

    /// Expands a compressed pointer back into a block offset, bounds checked.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidPointer`] if the pointer lies outside the region.
    pub fn decompress(&self, cp: CompressedPointer) -> Result<HeapOffset, MemoryError> {
        let offset = ((cp.get() - 1) as u64) << JMEM_ALIGNMENT_LOG;
        if offset >= self.area.len() as u64 {
            return Err(MemoryError::InvalidPointer(cp.get()));
        }
        Ok(HeapOffset(offset as u32))
    }

    /// Number of blocks on the free list.
    pub fn free_region_count(&self) -> usize {
        let mut count = 0;
        let mut current = self.first_next;
        while current != END_OF_LIST {
            count += 1;
            current = self.read_header(current).1;
        }
        count
    }

    /// Total bytes on the free list.
    pub fn free_bytes(&self) -> usize {
        let mut total = 0usize;
        let mut current = self.first_next;
        while current != END_OF_LIST {
            let (size, next) = self.read_header(current);
            total += size as usize;
            current = next;
        }
        total
    }

    /// Walks the free list and verifies its invariants.
    ///
    /// Blocks must be in bounds, aligned, sorted by address and never
    /// adjacent (adjacent blocks would have been merged). Pooled chunks are
    /// counted as allocated.
    ///
    /// # Errors
    ///
    /// [`MemoryError::Integrity`] describing the first violation found.
    pub fn check_integrity(&self) -> Result<(), MemoryError> {
        let mut previous_end: Option<u32> = None;
        let mut free_total = 0usize;
        let mut current = self.first_next;
        while current != END_OF_LIST {
            if current % JMEM_ALIGNMENT != 0 || current as usize + HEADER_SIZE > self.area.len() {
                return Err(MemoryError::Integrity(format!(
                    "free block at {:#x} is out of bounds",
                    current
                )));
            }
            let (size, next) = self.read_header(current);
            if size == 0 || size % JMEM_ALIGNMENT != 0 {
                return Err(MemoryError::Integrity(format!(
                    "free block at {:#x} has bad size {}",
                    current, size
                )));
            }
            if let Some(end) = previous_end {
                if current < end {
                    return Err(MemoryError::Integrity(format!(
                        "free block at {:#x} overlaps or is out of order",
                        current
                    )));
                }
                if current == end {
                    return Err(MemoryError::Integrity(format!(
                        "free block at {:#x} was not merged with its left neighbour",
                        current
                    )));
                }
            }
            free_total += size as usize;
            previous_end = Some(current + size);
            current = next;
        }
        if free_total + self.allocated_size != self.area.len() {
            return Err(MemoryError::Integrity(format!(
                "free {} + allocated {} != heap size {}",
                free_total,
                self.allocated_size,
                self.area.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn read_u32(&self, offset: u32) -> u32 {
        let start = offset as usize;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.area[start..start + 4]);
        u32::from_le_bytes(word)
    }

    pub(crate) fn write_u32(&mut self, offset: u32, value: u32) {
        let start = offset as usize;
        self.area[start..start + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn read_u8(&self, offset: u32) -> u8 {
        self.area[offset as usize]
    }

    pub(crate) fn write_u8(&mut self, offset: u32, value: u8) {
        self.area[offset as usize] = value;
    }

    pub(crate) fn zero_fill(&mut self, offset: HeapOffset, len: usize) {
        let start = offset.0 as usize;
        self.area[start..start + len].fill(0);
    }

    fn read_header(&self, offset: u32) -> (u32, u32) {
        (self.read_u32(offset), self.read_u32(offset + 4))
    }

    fn write_header(&mut self, offset: u32, size: u32, next: u32) {
        self.write_u32(offset, size);
        self.write_u32(offset + 4, next);
    }

    fn next_of(&self, node: Option<u32>) -> u32 {
        match node {
            Some(offset) => self.read_u32(offset + 4),
            None => self.first_next,
        }
    }

    fn set_next(&mut self, node: Option<u32>, next: u32) {
        match node {
            Some(offset) => self.write_u32(offset + 4, next),
            None => self.first_next = next,
        }
    }

    fn region_end(&self, offset: u32) -> u32 {
        offset + self.read_u32(offset)
    }

    fn head_as_skip(&self) -> Option<u32> {
        if self.first_next == END_OF_LIST {
            None
        } else {
            Some(self.first_next)
        }
    }

    fn stat_alloc(&mut self, size: usize, aligned: usize) {
        let stats = &mut self.stats;
        stats.allocated_bytes += aligned;
        stats.waste_bytes += aligned - size;
        stats.alloc_count += 1;
        stats.peak_allocated_bytes = stats.peak_allocated_bytes.max(stats.allocated_bytes);
        stats.peak_waste_bytes = stats.peak_waste_bytes.max(stats.waste_bytes);
    }

    fn stat_free(&mut self, size: usize, aligned: usize) {
        let stats = &mut self.stats;
        stats.free_count += 1;
        stats.allocated_bytes -= aligned;
        stats.waste_bytes = stats.waste_bytes.saturating_sub(aligned - size);
    }
}

impl Default for JmemHeap {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_SIZE)
    }
}
