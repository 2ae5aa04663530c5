//! Open-addressing index over an object's property pairs.
//!
//! The map lives in a single heap block laid out as
//!
//! ```text
//! +----------------+---------------------------+----------------+
//! | header (16 B)  | pair refs (max x u32)      | bits (max / 8) |
//! +----------------+---------------------------+----------------+
//! ```
//!
//! A pair ref is the 1-based index of a property pair in the owning
//! [`PropertyTable`](crate::PropertyTable); `0` is a null slot. For an
//! occupied slot the bit selects which half of the pair the slot names. For a
//! null slot the bit tells a deleted entry apart from one that was never used,
//! so lookups can skip over deletions and stop at the first never-used slot.
//!
//! `max` is a power of two and every probe step is odd, so a probe sequence
//! visits each slot once before repeating.

use tracing::{debug, error};

use crate::heap::{HeapOffset, JmemHeap};

/// Smallest table size.
pub const MINIMUM_SIZE: u32 = 32;
/// Hashes are 16 bits wide; larger tables spread them by shifting.
pub const HASH_LIMIT: u32 = 0x10000;
/// Probe step table, indexed by the low three hash bits.
pub const STEPS: [u32; 8] = [3, 5, 7, 11, 13, 17, 19, 23];

const HEADER_SIZE: u32 = 16;
const NULL_REF: u32 = 0;

/// Number of bytes a map with `max` slots occupies on the heap.
pub fn storage_size(max: u32) -> usize {
    HEADER_SIZE as usize + max as usize * 4 + (max as usize >> 3)
}

/// Where a property is stored: a 1-based pair ref and the half of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairSlot {
    /// 1-based pair index
    pub pair: u32,
    /// 0 or 1
    pub half: u8,
}

/// Outcome of [`PropertyHashmap::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStatus {
    /// The entry was added.
    Inserted,
    /// Fewer than 1/8 of the slots are null; the caller must rebuild the map.
    Recreate,
}

/// Outcome of [`PropertyHashmap::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// The entry was removed.
    HasHashmap,
    /// More than 3/4 of the slots are unused; the caller must rebuild the map.
    Recreate,
}

/// Handle to a hash map block on the heap.
#[derive(Debug)]
pub struct PropertyHashmap {
    block: HeapOffset,
    max: u32,
    null_count: u32,
    unused_count: u32,
    shift: u32,
}

impl PropertyHashmap {
    /// Builds a map over `entries` (`(hash, slot)` for every named property).
    ///
    /// Returns `None` when there are too few properties to warrant a map or the
    /// heap cannot supply the block; the owner then keeps using list lookups.
    pub fn create<I>(heap: &mut JmemHeap, count: u32, entries: I) -> Option<Self>
    where
        I: IntoIterator<Item = (u16, PairSlot)>,
    {
        if count < MINIMUM_SIZE / 2 {
            return None;
        }
        let mut max = MINIMUM_SIZE;
        // At least a third of the slots stay null.
        while max < count + (count >> 1) {
            max <<= 1;
        }
        let size = storage_size(max);
        let block = heap.alloc_block_null_on_error(size)?;
        heap.zero_fill(block, size);

        let mut shift = 0;
        let mut reduced = max;
        while reduced > HASH_LIMIT {
            shift += 1;
            reduced >>= 1;
        }

        let map = PropertyHashmap {
            block,
            max,
            null_count: max - count,
            unused_count: max - count,
            shift,
        };
        for (hash, slot) in entries {
            let step = step_for(hash);
            let mut index = map.start_index(hash);
            while map.pair_ref(heap, index) != NULL_REF {
                index = (index + step) & map.mask();
            }
            map.set_pair_ref(heap, index, slot.pair);
            if slot.half != 0 {
                map.set_bit(heap, index, true);
            }
        }
        debug!(max, count, "property hashmap created");
        Some(map)
    }

    /// Releases the heap block.
    pub fn free(self, heap: &mut JmemHeap) {
        if let Err(err) = heap.free_block(self.block, storage_size(self.max)) {
            error!(%err, "property hashmap block could not be freed");
        }
    }

    /// Slot count.
    pub fn max_property_count(&self) -> u32 {
        self.max
    }

    /// Slots that are neither live nor deleted.
    pub fn null_count(&self) -> u32 {
        self.null_count
    }

    /// Slots without a live entry.
    pub fn unused_count(&self) -> u32 {
        self.unused_count
    }

    /// Records a property that was just added to pair `slot`.
    pub fn insert(&mut self, heap: &mut JmemHeap, hash: u16, slot: PairSlot) -> InsertStatus {
        if self.null_count < (self.max >> 3) {
            return InsertStatus::Recreate;
        }
        let step = step_for(hash);
        let mut index = self.start_index(hash);
        while self.pair_ref(heap, index) != NULL_REF {
            index = (index + step) & self.mask();
        }
        self.set_pair_ref(heap, index, slot.pair);
        if !self.bit(heap, index) {
            // Deleted slots also hold a null ref but are not null entries.
            self.null_count -= 1;
        }
        self.unused_count -= 1;
        self.set_bit(heap, index, slot.half != 0);
        InsertStatus::Inserted
    }

    /// Removes the entry for `slot`.
    pub fn delete(&mut self, heap: &mut JmemHeap, hash: u16, slot: PairSlot) -> DeleteStatus {
        self.unused_count += 1;
        if self.unused_count > (self.max * 3) >> 2 {
            return DeleteStatus::Recreate;
        }
        let step = step_for(hash);
        let start = self.start_index(hash);
        let mut index = start;
        loop {
            let pair = self.pair_ref(heap, index);
            if pair != NULL_REF {
                let half = u8::from(self.bit(heap, index));
                if pair == slot.pair && half == slot.half {
                    self.set_pair_ref(heap, index, NULL_REF);
                    self.set_bit(heap, index, true);
                    return DeleteStatus::HasHashmap;
                }
            }
            index = (index + step) & self.mask();
            if index == start {
                // Entry was never indexed; the map no longer mirrors the list.
                return DeleteStatus::Recreate;
            }
        }
    }

    /// Looks up a property, asking `matches` whether a candidate slot holds
    /// the wanted name.
    pub fn find<F>(&self, heap: &JmemHeap, hash: u16, mut matches: F) -> Option<PairSlot>
    where
        F: FnMut(PairSlot) -> bool,
    {
        let step = step_for(hash);
        let start = self.start_index(hash);
        let mut index = start;
        loop {
            let pair = self.pair_ref(heap, index);
            if pair != NULL_REF {
                let slot = PairSlot {
                    pair,
                    half: u8::from(self.bit(heap, index)),
                };
                if matches(slot) {
                    return Some(slot);
                }
            } else if !self.bit(heap, index) {
                return None;
            }
            index = (index + step) & self.mask();
            if index == start {
                return None;
            }
        }
    }

    fn mask(&self) -> u32 {
        self.max - 1
    }

    fn start_index(&self, hash: u16) -> u32 {
        let hash = u32::from(hash);
        if self.mask() < HASH_LIMIT {
            hash & self.mask()
        } else {
            hash << self.shift
        }
    }

    fn refs_base(&self) -> u32 {
        self.block.get() + HEADER_SIZE
    }

    fn bits_base(&self) -> u32 {
        self.refs_base() + self.max * 4
    }

    fn pair_ref(&self, heap: &JmemHeap, index: u32) -> u32 {
        heap.read_u32(self.refs_base() + index * 4)
    }

    fn set_pair_ref(&self, heap: &mut JmemHeap, index: u32, pair: u32) {
        heap.write_u32(self.refs_base() + index * 4, pair);
    }

    fn bit(&self, heap: &JmemHeap, index: u32) -> bool {
        heap.read_u8(self.bits_base() + (index >> 3)) & (1 << (index & 7)) != 0
    }

    fn set_bit(&self, heap: &mut JmemHeap, index: u32, set: bool) {
        let at = self.bits_base() + (index >> 3);
        let byte = heap.read_u8(at);
        let mask = 1u8 << (index & 7);
        heap.write_u8(at, if set { byte | mask } else { byte & !mask });
    }
}

fn step_for(hash: u16) -> u32 {
    STEPS[usize::from(hash & 7)]
}
