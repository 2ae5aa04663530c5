//! Heap integration for script values
//!
//! Boxed numbers, strings and objects are cells of one [`ManagedHeap`]; the
//! compressed pointer in a [`Value`] names the cell. Object properties are
//! [`PropertyTable`](memory_manager::PropertyTable)s whose hash maps are
//! allocated from the same byte heap.

use std::rc::Rc;

use core_types::{CompressedPointer, PointerKind, Value};
use memory_manager::{
    HeapStats, JmemHeap, ManagedHeap, Property, PropertyName, Reclaim, JMEM_ALIGNMENT,
};
use tracing::error;

use crate::error::{VmError, VmResult};
use crate::object::{JsObject, OBJECT_CELL_SIZE};

/// Payload of one heap cell.
#[derive(Debug)]
pub enum HeapCell {
    /// String contents
    String(Rc<str>),
    /// Boxed number
    Float(f64),
    /// Object
    Object(JsObject),
}

impl Reclaim for HeapCell {
    fn reclaim(&mut self, heap: &mut JmemHeap) {
        if let HeapCell::Object(object) = self {
            object.properties.release(heap);
        }
    }
}

/// The VM's managed heap.
#[derive(Debug)]
pub struct VmHeap {
    cells: ManagedHeap<HeapCell>,
}

impl VmHeap {
    /// Heap over a region of `size` bytes growing its limit in `desired_limit` steps.
    pub fn new(size: usize, desired_limit: usize) -> Self {
        Self {
            cells: ManagedHeap::new(JmemHeap::with_desired_limit(size, desired_limit)),
        }
    }

    fn alloc(&mut self, kind: PointerKind, cell: HeapCell, size: usize) -> VmResult<Value> {
        match self.cells.alloc(cell, size) {
            Ok(cp) => Ok(Value::from_pointer(kind, cp)),
            Err(err) => {
                error!(%err, size, "heap cell allocation failed");
                Err(err.into())
            }
        }
    }

    /// Boxes a number.
    pub fn alloc_float(&mut self, number: f64) -> VmResult<Value> {
        self.alloc(PointerKind::Float, HeapCell::Float(number), 8)
    }

    /// Stores a string.
    pub fn alloc_string(&mut self, text: Rc<str>) -> VmResult<Value> {
        let align = JMEM_ALIGNMENT as usize;
        let size = (text.len() + 4 + align - 1) / align * align;
        self.alloc(PointerKind::String, HeapCell::String(text), size)
    }

    /// Stores an object.
    pub fn alloc_object(&mut self, object: JsObject) -> VmResult<Value> {
        self.alloc(PointerKind::Object, HeapCell::Object(object), OBJECT_CELL_SIZE)
    }

    fn cell(&self, value: Value) -> Option<&HeapCell> {
        self.cells.get(value.compressed_pointer()?).ok()
    }

    /// Number stored in a boxed float cell.
    pub fn float(&self, value: Value) -> Option<f64> {
        if !value.is_float() {
            return None;
        }
        match self.cell(value)? {
            HeapCell::Float(number) => Some(*number),
            _ => None,
        }
    }

    /// Text of a heap string cell.
    pub fn string(&self, value: Value) -> Option<Rc<str>> {
        if !value.is_heap_string() {
            return None;
        }
        match self.cell(value)? {
            HeapCell::String(text) => Some(Rc::clone(text)),
            _ => None,
        }
    }

    fn object_pointer(value: Value) -> VmResult<CompressedPointer> {
        value
            .compressed_pointer()
            .filter(|_| value.is_object())
            .ok_or_else(|| VmError::invariant(format!("{value:?} is not an object")))
    }

    /// The object a value points at.
    ///
    /// # Errors
    ///
    /// [`VmError::Invariant`] when `value` is not a live object.
    pub fn object(&self, value: Value) -> VmResult<&JsObject> {
        match self.cells.get(Self::object_pointer(value)?)? {
            HeapCell::Object(object) => Ok(object),
            _ => Err(VmError::invariant("object pointer names a non-object cell")),
        }
    }

    /// The object a value points at, mutably.
    ///
    /// # Errors
    ///
    /// [`VmError::Invariant`] when `value` is not a live object.
    pub fn object_mut(&mut self, value: Value) -> VmResult<&mut JsObject> {
        self.object_and_heap(value).map(|(object, _)| object)
    }

    fn object_and_heap(&mut self, value: Value) -> VmResult<(&mut JsObject, &mut JmemHeap)> {
        match self.cells.split_mut(Self::object_pointer(value)?)? {
            (HeapCell::Object(object), heap) => Ok((object, heap)),
            _ => Err(VmError::invariant("object pointer names a non-object cell")),
        }
    }

    /// Own property `name` of `object`.
    pub fn own_property(&self, object: Value, name: &str) -> VmResult<Option<Property>> {
        let target = self.object(object)?;
        Ok(target.properties.get(self.cells.heap(), name).copied())
    }

    /// Adds or replaces an own property.
    pub fn define_own(&mut self, object: Value, name: &str, property: Property) -> VmResult<()> {
        let (target, heap) = self.object_and_heap(object)?;
        target
            .properties
            .insert(heap, PropertyName::new(name), property);
        Ok(())
    }

    /// Removes an own property.
    pub fn remove_own(&mut self, object: Value, name: &str) -> VmResult<Option<Property>> {
        let (target, heap) = self.object_and_heap(object)?;
        Ok(target.properties.remove(heap, name))
    }

    /// Own property names with their enumerable attribute, in insertion order.
    pub fn own_names(&self, object: Value) -> VmResult<Vec<(PropertyName, bool)>> {
        Ok(self
            .object(object)?
            .properties
            .iter()
            .map(|(name, property)| (name.clone(), property.is_enumerable()))
            .collect())
    }

    /// Prototype of `object`.
    pub fn proto(&self, object: Value) -> VmResult<Value> {
        Ok(self.object(object)?.proto)
    }

    /// Replaces the prototype of `object`.
    pub fn set_proto(&mut self, object: Value, proto: Value) -> VmResult<()> {
        self.object_mut(object)?.proto = proto;
        Ok(())
    }

    /// Number of live cells.
    pub fn live_cells(&self) -> usize {
        self.cells.len()
    }

    /// Allocator counters.
    pub fn stats(&self) -> HeapStats {
        self.cells.stats()
    }

    /// The byte heap, for free-unused-memory callbacks and integrity checks.
    pub fn allocator(&self) -> &JmemHeap {
        self.cells.heap()
    }

    /// The byte heap, mutably.
    pub fn allocator_mut(&mut self) -> &mut JmemHeap {
        self.cells.heap_mut()
    }

    /// Frees the cells `keep` rejects, then returns emptied pool chunks to
    /// the free list. Returns the number of freed cells.
    pub fn sweep<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(CompressedPointer) -> bool,
    {
        let freed = self.cells.sweep(keep);
        self.cells.heap_mut().collect_empty_pools();
        freed
    }

    /// Bytes currently handed out by the byte heap.
    pub fn allocated_bytes(&self) -> usize {
        self.cells.heap().allocated_size()
    }

    /// Frees every cell.
    pub fn clear(&mut self) {
        self.cells.clear();
    }
}
