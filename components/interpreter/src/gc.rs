//! Mark-and-sweep reclamation of heap cells
//!
//! Cells are traced from the context roots: the global object, the
//! intrinsics, the literals of every loaded snapshot, values pinned by the
//! engine and each live frame's registers, scopes and pending `finally`
//! values. Unmarked cells are freed.
//!
//! Collection runs between two instructions of the innermost frame. Every
//! outer frame must be suspended in a `CALL` or `CONSTRUCTOR` that recorded
//! its state; while a getter, setter or conversion is running, its caller
//! may hold values only in host locals and the collection is deferred.

use std::collections::HashSet;

use bytecode_system::FunctionState;
use core_types::{CompressedPointer, Value};
use memory_manager::{Property, Severity};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::object::{JsObject, ObjectClass};
use crate::vm::VmContext;

/// Mark state of one collection.
#[derive(Debug, Default)]
struct Marker {
    marked: Vec<bool>,
    gray: Vec<Value>,
    functions: HashSet<*const FunctionState>,
}

impl Marker {
    fn mark(&mut self, value: Value) {
        let Some(cp) = value.compressed_pointer() else {
            return;
        };
        let index = cp.get() as usize - 1;
        if index >= self.marked.len() {
            self.marked.resize(index + 1, false);
        }
        if !self.marked[index] {
            self.marked[index] = true;
            if value.is_object() {
                self.gray.push(value);
            }
        }
    }

    fn is_marked(&self, cp: CompressedPointer) -> bool {
        self.marked
            .get(cp.get() as usize - 1)
            .copied()
            .unwrap_or(false)
    }

    /// Constants of `state` and of every nested function.
    fn mark_function(&mut self, state: &FunctionState) {
        if !self.functions.insert(state as *const FunctionState) {
            return;
        }
        for constant in &state.constants {
            self.mark(*constant);
        }
        for child in &state.children {
            self.mark_function(child);
        }
    }

    fn mark_frame(&mut self, ctx: &ExecutionContext) {
        self.mark_function(&ctx.function);
        self.mark(ctx.this_function);
        for value in ctx.registers.values() {
            self.mark(value);
        }
        for scope in &ctx.scopes {
            self.mark(*scope);
        }
        for value in ctx.contexts.pending_values() {
            self.mark(value);
        }
    }

    fn trace(&mut self, object: &JsObject) {
        self.mark(object.proto);
        for (_, property) in object.properties.iter() {
            match *property {
                Property::Data { value, .. } => self.mark(value),
                Property::Accessor { getter, setter, .. } => {
                    self.mark(getter);
                    self.mark(setter);
                }
            }
        }
        match &object.class {
            ObjectClass::Function(function) => {
                self.mark_function(&function.state);
                for cell in &function.captured {
                    self.mark(*cell.borrow());
                }
                if let Some(this) = function.bound_this {
                    self.mark(this);
                }
            }
            ObjectClass::BoundConstructor { target } => self.mark(*target),
            ObjectClass::RegExp { source, flags } => {
                self.mark(*source);
                self.mark(*flags);
            }
            _ => {}
        }
    }
}

impl VmContext {
    /// Frees every cell the context can no longer reach and returns how
    /// many were freed.
    ///
    /// Only the context roots survive: values the host holds outside the
    /// global object are reclaimed. Does nothing while a script is running.
    ///
    /// # Examples
    ///
    /// ```
    /// use interpreter::VmContext;
    ///
    /// let mut vm = VmContext::new().unwrap();
    /// vm.collect_garbage();
    /// let before = vm.live_cells();
    /// vm.new_number(0.5).unwrap();
    /// assert_eq!(vm.collect_garbage(), 1);
    /// assert_eq!(vm.live_cells(), before);
    /// ```
    pub fn collect_garbage(&mut self) -> usize {
        if !self.call_stack.is_empty() {
            return 0;
        }
        self.collect(None)
    }

    /// Number of collections run so far.
    pub fn collections(&self) -> usize {
        self.collections
    }

    /// Collects at an instruction boundary of `ctx` when the allocation
    /// threshold was crossed or the heap reported pressure.
    pub(crate) fn collect_if_due(&mut self, ctx: &ExecutionContext) {
        let due = self.heap.allocated_bytes() >= self.gc_threshold || self.pressure.get().is_some();
        if due && self.can_collect() {
            self.collect(Some(ctx));
        }
    }

    /// Collects after `ctx` failed an allocation. Returns whether the
    /// failed instruction may run again.
    pub(crate) fn collect_for_retry(&mut self, ctx: &ExecutionContext) -> bool {
        if !self.can_collect() {
            return false;
        }
        self.collect(Some(ctx)) > 0
    }

    /// Whether every outer frame recorded its state on suspension.
    fn can_collect(&self) -> bool {
        self.suspended.len() + 1 == self.call_stack.len()
    }

    fn collect(&mut self, innermost: Option<&ExecutionContext>) -> usize {
        let severity = self.pressure.take().unwrap_or(Severity::Low);
        let mut marker = Marker::default();

        marker.mark(self.global);
        let intrinsics = self.intrinsics;
        for value in [
            intrinsics.object_prototype,
            intrinsics.function_prototype,
            intrinsics.array_prototype,
            intrinsics.string_prototype,
            intrinsics.number_prototype,
            intrinsics.boolean_prototype,
            intrinsics.regexp_prototype,
        ]
        .into_iter()
        .chain(intrinsics.error_prototypes)
        {
            marker.mark(value);
        }
        for function in &self.loaded {
            marker.mark_function(function);
        }
        for value in &self.pinned {
            marker.mark(*value);
        }
        for frame in self.suspended.iter().chain(innermost) {
            marker.mark_frame(frame);
        }

        while let Some(value) = marker.gray.pop() {
            if let Ok(object) = self.heap.object(value) {
                marker.trace(object);
            }
        }

        let freed = self.heap.sweep(|cp| marker.is_marked(cp));
        let allocated = self.heap.allocated_bytes();
        self.gc_threshold = allocated + self.config.gc_step();
        self.collections += 1;
        debug!(
            ?severity,
            freed,
            live = self.heap.live_cells(),
            allocated,
            "garbage collected"
        );
        freed
    }
}
