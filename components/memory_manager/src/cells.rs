//! Typed cells addressed by compressed pointer.
//!
//! [`ManagedHeap`] pairs the byte heap with a slot table so that every engine
//! value (boxed float, string, object) reserves real heap bytes while its
//! payload stays an ordinary Rust value. A cell's compressed pointer doubles as
//! its slot index, so decompressing is a bounds-checked table lookup.

use core_types::CompressedPointer;
use tracing::{error, trace};

use crate::error::MemoryError;
use crate::heap::{HeapOffset, HeapStats, JmemHeap, JMEM_ALIGNMENT_LOG};

/// Payloads that own secondary heap blocks release them here before their
/// cell is freed.
pub trait Reclaim {
    /// Frees any blocks the payload allocated from `heap`.
    fn reclaim(&mut self, _heap: &mut JmemHeap) {}
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    size: usize,
}

/// Arena of heap-backed cells.
///
/// # Examples
///
/// ```
/// use memory_manager::{JmemHeap, ManagedHeap, Reclaim};
///
/// struct Boxed(f64);
/// impl Reclaim for Boxed {}
///
/// let mut cells = ManagedHeap::new(JmemHeap::new(1024));
/// let cp = cells.alloc(Boxed(1.5), 8).unwrap();
/// assert_eq!(cells.get(cp).unwrap().0, 1.5);
/// cells.free(cp).unwrap();
/// assert!(cells.get(cp).is_err());
/// ```
pub struct ManagedHeap<T> {
    heap: JmemHeap,
    slots: Vec<Option<Slot<T>>>,
    live: usize,
}

impl<T: Reclaim> ManagedHeap<T> {
    /// Wraps a heap.
    pub fn new(heap: JmemHeap) -> Self {
        ManagedHeap {
            heap,
            slots: Vec::new(),
            live: 0,
        }
    }

    /// Stores `value` in a fresh cell reserving `byte_size` heap bytes.
    ///
    /// # Errors
    ///
    /// [`MemoryError::OutOfMemory`] when the heap is exhausted.
    pub fn alloc(&mut self, value: T, byte_size: usize) -> Result<CompressedPointer, MemoryError> {
        let size = byte_size.max(1);
        let offset = self.heap.alloc_pooled(size)?;
        let cp = self.heap.compress(offset)?;
        let index = Self::index(cp);
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(Slot { value, size });
        self.live += 1;
        trace!(cp = cp.get(), size, "cell allocated");
        Ok(cp)
    }

    /// Payload of a live cell.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidPointer`] for pointers that do not name a live cell.
    pub fn get(&self, cp: CompressedPointer) -> Result<&T, MemoryError> {
        self.heap.decompress(cp)?;
        self.slots
            .get(Self::index(cp))
            .and_then(Option::as_ref)
            .map(|slot| &slot.value)
            .ok_or(MemoryError::InvalidPointer(cp.get()))
    }

    /// Mutable payload of a live cell.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidPointer`] for pointers that do not name a live cell.
    pub fn get_mut(&mut self, cp: CompressedPointer) -> Result<&mut T, MemoryError> {
        self.split_mut(cp).map(|(value, _)| value)
    }

    /// Payload and allocator together, for payloads that grow through the heap.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidPointer`] for pointers that do not name a live cell.
    pub fn split_mut(
        &mut self,
        cp: CompressedPointer,
    ) -> Result<(&mut T, &mut JmemHeap), MemoryError> {
        self.heap.decompress(cp)?;
        let slot = self
            .slots
            .get_mut(Self::index(cp))
            .and_then(Option::as_mut)
            .ok_or(MemoryError::InvalidPointer(cp.get()))?;
        Ok((&mut slot.value, &mut self.heap))
    }

    /// Releases a cell and returns its payload.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidPointer`] for pointers that do not name a live cell.
    pub fn free(&mut self, cp: CompressedPointer) -> Result<T, MemoryError> {
        let offset = self.heap.decompress(cp)?;
        let mut slot = self
            .slots
            .get_mut(Self::index(cp))
            .and_then(Option::take)
            .ok_or(MemoryError::InvalidPointer(cp.get()))?;
        slot.value.reclaim(&mut self.heap);
        self.heap.free_pooled(offset, slot.size)?;
        self.live -= 1;
        Ok(slot.value)
    }

    /// Frees every cell.
    pub fn clear(&mut self) {
        for index in 0..self.slots.len() {
            if let Some(slot) = self.slots[index].take() {
                self.release(index, slot);
            }
        }
        self.slots.clear();
        self.live = 0;
    }

    /// Frees every live cell that `keep` rejects and returns how many went.
    pub fn sweep<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(CompressedPointer) -> bool,
    {
        let mut freed = 0;
        for index in 0..self.slots.len() {
            let Some(cp) = CompressedPointer::new(index as u32 + 1) else {
                continue;
            };
            if self.slots[index].is_none() || keep(cp) {
                continue;
            }
            if let Some(slot) = self.slots[index].take() {
                self.release(index, slot);
                freed += 1;
            }
        }
        self.live -= freed;
        freed
    }

    fn release(&mut self, index: usize, mut slot: Slot<T>) {
        slot.value.reclaim(&mut self.heap);
        let offset = HeapOffset::new((index as u32) << JMEM_ALIGNMENT_LOG);
        if let Err(err) = self.heap.free_pooled(offset, slot.size) {
            error!(%err, "cell block could not be freed");
        }
    }

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no cell is live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live cells with their pointers.
    pub fn iter(&self) -> impl Iterator<Item = (CompressedPointer, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let slot = slot.as_ref()?;
            let cp = CompressedPointer::new(index as u32 + 1)?;
            Some((cp, &slot.value))
        })
    }

    /// The underlying allocator.
    pub fn heap(&self) -> &JmemHeap {
        &self.heap
    }

    /// The underlying allocator, mutably.
    pub fn heap_mut(&mut self) -> &mut JmemHeap {
        &mut self.heap
    }

    /// Allocator counters.
    pub fn stats(&self) -> HeapStats {
        self.heap.stats()
    }

    fn index(cp: CompressedPointer) -> usize {
        cp.get() as usize - 1
    }
}

impl<T> std::fmt::Debug for ManagedHeap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedHeap")
            .field("heap", &self.heap)
            .field("live", &self.live)
            .finish()
    }
}
