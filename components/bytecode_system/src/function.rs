//! Loaded function states
//!
//! A [`FunctionState`] is the immutable, shareable result of loading one
//! function record: its code, its materialised constants, its nested
//! functions and its closure linkage. Function objects created at run time
//! hold an `Rc` to the state they instantiate.

use std::fmt::Write as _;
use std::ops::BitOr;
use std::rc::Rc;

use core_types::Value;

use crate::closure::{InClosure, OutClosure};
use crate::instruction::Instruction;

/// Status flags of a function record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FunctionFlags(u16);

impl FunctionFlags {
    /// Record describes a function (always set by the compiler)
    pub const FUNCTION: FunctionFlags = FunctionFlags(1 << 0);
    /// Strict mode code
    pub const STRICT_MODE: FunctionFlags = FunctionFlags(1 << 3);
    /// Body references `arguments`
    pub const ARGUMENTS_NEEDED: FunctionFlags = FunctionFlags(1 << 4);
    /// Arrow function: `this` is taken from the creating frame
    pub const ARROW_FUNCTION: FunctionFlags = FunctionFlags(1 << 6);
    /// Debugger never stops inside this function
    pub const DEBUGGER_IGNORE: FunctionFlags = FunctionFlags(1 << 8);
    /// Class constructor body
    pub const CONSTRUCTOR: FunctionFlags = FunctionFlags(1 << 9);

    /// Wraps raw flag bits; unknown bits are preserved.
    pub const fn from_bits(bits: u16) -> Self {
        FunctionFlags(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether every flag of `other` is set.
    pub const fn contains(self, other: FunctionFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FunctionFlags {
    type Output = FunctionFlags;

    fn bitor(self, rhs: FunctionFlags) -> FunctionFlags {
        FunctionFlags(self.0 | rhs.0)
    }
}

/// One loaded function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionState {
    /// Index of the function in its snapshot
    pub id: usize,
    /// Declared parameter count
    pub argc: u8,
    /// Register window size, including `this` in r0
    pub stack_size: u16,
    /// Maximum depth of nested protected regions
    pub context_size: u16,
    /// Status flags
    pub flags: FunctionFlags,
    /// Decoded code
    pub instructions: Vec<Instruction>,
    /// Materialised constant pool
    pub constants: Vec<Value>,
    /// Nested functions, indexed by the operand of `NEW FUNCTION`
    pub children: Vec<Rc<FunctionState>>,
    /// Variables read from enclosing functions
    pub in_closure: Vec<InClosure>,
    /// Variables captured by inner functions
    pub out_closure: Vec<OutClosure>,
}

impl FunctionState {
    /// Whether `this` is lexically captured.
    pub fn is_arrow(&self) -> bool {
        self.flags.contains(FunctionFlags::ARROW_FUNCTION)
    }

    /// Whether the body is strict mode code.
    pub fn is_strict(&self) -> bool {
        self.flags.contains(FunctionFlags::STRICT_MODE)
    }

    /// Whether the debugger should skip this function.
    pub fn is_debugger_ignored(&self) -> bool {
        self.flags.contains(FunctionFlags::DEBUGGER_IGNORE)
    }

    /// Nested function `index`.
    pub fn child(&self, index: usize) -> Option<&Rc<FunctionState>> {
        self.children.get(index)
    }

    /// Constant `index`.
    pub fn constant(&self, index: usize) -> Option<Value> {
        self.constants.get(index).copied()
    }

    /// The in-closure entry for a table slot.
    pub fn in_closure_by_slot(&self, slot: u32) -> Option<&InClosure> {
        self.in_closure.iter().find(|entry| entry.slot == slot)
    }

    /// Whether inner functions capture `register`.
    pub fn captures_register(&self, register: u32) -> bool {
        self.out_closure
            .iter()
            .any(|entry| entry.source.function == self.id && entry.source.register == register)
    }

    /// This function and every nested function, depth first.
    pub fn walk(self: &Rc<Self>) -> Vec<Rc<FunctionState>> {
        let mut out = Vec::new();
        let mut stack = vec![Rc::clone(self)];
        while let Some(function) = stack.pop() {
            stack.extend(function.children.iter().rev().cloned());
            out.push(function);
        }
        out
    }

    /// Human readable listing of this function alone.
    ///
    /// `describe` renders constant values; the loader cannot do that itself
    /// because heap values are owned by the embedding context.
    pub fn disassemble(&self, describe: &dyn Fn(Value) -> String) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "function #{} (argc {}, registers {}, contexts {}, flags {:#06x})",
            self.id,
            self.argc,
            self.stack_size,
            self.context_size,
            self.flags.bits()
        );
        for (index, value) in self.constants.iter().enumerate() {
            let _ = writeln!(out, "  k{index:<4} {}", describe(*value));
        }
        for entry in &self.in_closure {
            let _ = writeln!(
                out,
                "  in   slot {} -> r{} (function #{} r{})",
                entry.slot, entry.register, entry.source.function, entry.source.register
            );
        }
        for entry in &self.out_closure {
            let _ = writeln!(
                out,
                "  out  slot {} (function #{} r{})",
                entry.slot, entry.source.function, entry.source.register
            );
        }
        for (index, child) in self.children.iter().enumerate() {
            let _ = writeln!(out, "  child {index} -> function #{}", child.id);
        }
        for (pc, instruction) in self.instructions.iter().enumerate() {
            let _ = writeln!(out, "  {pc:04}  {instruction}");
        }
        out
    }
}
