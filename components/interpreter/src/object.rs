//! Script objects stored in heap cells.

use std::fmt;
use std::rc::Rc;

use bytecode_system::FunctionState;
use core_types::{ErrorKind, Value};
use memory_manager::PropertyTable;

use crate::closure::ClosureCell;

/// Heap bytes reserved for an object cell. Properties live in the table's
/// own blocks.
pub const OBJECT_CELL_SIZE: usize = 16;

/// A function created by `NEW FUNCTION` or `NEW CONSTRUCTOR`.
#[derive(Clone)]
pub struct ScriptFunction {
    /// Compiled code
    pub state: Rc<FunctionState>,
    /// Cells captured at creation, parallel to `state.in_closure`
    pub captured: Vec<ClosureCell>,
    /// `this` of the creating frame, for arrow functions
    pub bound_this: Option<Value>,
    /// Created as a class constructor
    pub is_class_constructor: bool,
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("function", &self.state.id)
            .field("captured", &self.captured.len())
            .field("bound_this", &self.bound_this)
            .finish()
    }
}

impl ScriptFunction {
    /// The captured cell for closure table slot `slot`.
    pub fn captured_cell(&self, slot: u32) -> Option<&ClosureCell> {
        self.state
            .in_closure
            .iter()
            .position(|entry| entry.slot == slot)
            .and_then(|index| self.captured.get(index))
    }
}

/// What an object is, beyond its properties.
#[derive(Debug, Clone)]
pub enum ObjectClass {
    /// Plain object (`NEW OBJECT`, `NEW MAP`, prototypes)
    Ordinary,
    /// Array; `length` is kept as a data property
    Array,
    /// `arguments` object
    Arguments,
    /// Script function
    Function(ScriptFunction),
    /// Constructor of a class without an explicit `constructor`
    ImplicitConstructor,
    /// Implicit constructor of a derived class, forwarding to `target`
    BoundConstructor {
        /// The super class constructor
        target: Value,
    },
    /// Host function, an index into the external table
    External(usize),
    /// Error instance
    Error(ErrorKind),
    /// Regular expression literal
    RegExp {
        /// Pattern string
        source: Value,
        /// Flag string
        flags: Value,
    },
    /// Lexical environment record of a `catch` block
    Declarative,
}

/// An object cell.
#[derive(Debug)]
pub struct JsObject {
    /// Prototype, an object or `null`
    pub proto: Value,
    /// Own properties
    pub properties: PropertyTable,
    /// Kind of object
    pub class: ObjectClass,
}

impl JsObject {
    /// Empty object of `class` with prototype `proto`.
    pub fn new(class: ObjectClass, proto: Value) -> Self {
        Self {
            proto,
            properties: PropertyTable::new(),
            class,
        }
    }

    /// Whether `CALL` accepts the object as a callee.
    pub fn is_callable(&self) -> bool {
        matches!(
            self.class,
            ObjectClass::Function(_)
                | ObjectClass::ImplicitConstructor
                | ObjectClass::BoundConstructor { .. }
                | ObjectClass::External(_)
        )
    }

    /// Whether `CONSTRUCTOR` accepts the object as a callee.
    pub fn is_constructor(&self) -> bool {
        match &self.class {
            ObjectClass::Function(function) => function.bound_this.is_none(),
            ObjectClass::ImplicitConstructor
            | ObjectClass::BoundConstructor { .. }
            | ObjectClass::External(_) => true,
            _ => false,
        }
    }

    /// Whether the object can be spread into an argument list.
    pub fn is_array_like(&self) -> bool {
        matches!(self.class, ObjectClass::Array | ObjectClass::Arguments)
    }
}
