//! Signatures and failure contracts of the exported allocator API.

use core_types::{CompressedPointer, Value};
use memory_manager::{
    HeapOffset, JmemHeap, ManagedHeap, MemoryError, Property, PropertyTable, Reclaim,
    JMEM_ALIGNMENT,
};

struct Cell(u32);
impl Reclaim for Cell {}

/// alloc_block(size) -> Result<HeapOffset, MemoryError>
#[test]
fn contract_alloc_block_is_fatal_variant() {
    let mut heap = JmemHeap::new(16);
    let result: Result<HeapOffset, MemoryError> = heap.alloc_block(32);
    assert!(matches!(result, Err(MemoryError::OutOfMemory { .. })));
}

/// alloc_block_null_on_error(size) -> Option<HeapOffset>
#[test]
fn contract_alloc_block_null_on_error() {
    let mut heap = JmemHeap::new(16);
    let result: Option<HeapOffset> = heap.alloc_block_null_on_error(32);
    assert!(result.is_none());
}

/// Offsets are always aligned.
#[test]
fn contract_offsets_are_aligned() {
    let mut heap = JmemHeap::new(1024);
    for size in 1..40 {
        let offset = heap.alloc_block(size).unwrap();
        assert_eq!(offset.get() % JMEM_ALIGNMENT, 0);
    }
}

/// compress never yields zero and decompress is bounds checked.
#[test]
fn contract_compressed_pointer_round_trip() {
    let mut heap = JmemHeap::new(1024);
    let first = heap.alloc_block(8).unwrap();
    let cp: CompressedPointer = heap.compress(first).unwrap();
    assert_eq!(cp.get(), 1);
    assert_eq!(heap.decompress(cp), Ok(first));
    let outside = CompressedPointer::new(1024 / 8 + 1).unwrap();
    assert_eq!(
        heap.decompress(outside),
        Err(MemoryError::InvalidPointer(outside.get()))
    );
}

/// Cells are addressed by the pointer a tagged value can carry.
#[test]
fn contract_managed_heap_pointer_fits_value() {
    let mut cells = ManagedHeap::new(JmemHeap::new(1024));
    let cp = cells.alloc(Cell(7), 16).unwrap();
    let value = Value::from_pointer(core_types::PointerKind::Object, cp);
    assert_eq!(value.compressed_pointer(), Some(cp));
    assert_eq!(cells.get(cp).unwrap().0, 7);
}

/// PropertyTable::insert returns the replaced property.
#[test]
fn contract_property_table_insert_replace() {
    let mut heap = JmemHeap::new(1024);
    let mut table = PropertyTable::new();
    assert!(table
        .insert(&mut heap, "a".into(), Property::data(Value::NULL))
        .is_none());
    assert_eq!(
        table.insert(&mut heap, "a".into(), Property::data(Value::TRUE)),
        Some(Property::data(Value::NULL))
    );
}
