//! Execution context of one call

use std::rc::Rc;

use bytecode_system::{FunctionState, Instruction};
use core_types::Value;

use crate::closure::{ClosureCell, RegisterWindow};
use crate::error::{VmError, VmResult};
use crate::exception::ContextStack;

/// State of one activation: the function being run, its register window,
/// its pending `try` regions and its lexical scopes.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Code being executed
    pub function: Rc<FunctionState>,
    /// Function object being run, or `undefined` for a bare state
    pub this_function: Value,
    /// Register window
    pub registers: RegisterWindow,
    /// Pending `try`/`catch`/`finally` regions
    pub contexts: ContextStack,
    /// Lexical environment records pushed by `catch` blocks, innermost last
    pub scopes: Vec<Value>,
    /// Index of the next instruction
    pub pc: usize,
}

impl ExecutionContext {
    /// Lays out a window for `function`: `this` in r0, then at most `argc`
    /// arguments, then `undefined`. In-closure registers are bound to
    /// `captured` (parallel to `function.in_closure`) after the arguments.
    ///
    /// # Errors
    ///
    /// [`VmError::Invariant`] when `captured` does not cover the in-closure
    /// table.
    pub fn new(
        function: Rc<FunctionState>,
        this_function: Value,
        this: Value,
        args: &[Value],
        captured: &[ClosureCell],
    ) -> VmResult<Self> {
        let mut registers = RegisterWindow::new(usize::from(function.stack_size));
        registers.set(0, this)?;
        let loaded = args
            .len()
            .min(usize::from(function.argc))
            .min(registers.len() - 1);
        for (index, arg) in args.iter().take(loaded).enumerate() {
            registers.set(index as u32 + 1, *arg)?;
        }

        if captured.len() != function.in_closure.len() {
            return Err(VmError::invariant(format!(
                "function #{} expects {} captured cells, got {}",
                function.id,
                function.in_closure.len(),
                captured.len()
            )));
        }
        for (entry, cell) in function.in_closure.iter().zip(captured) {
            registers.bind(entry.register, Rc::clone(cell))?;
        }

        let contexts = ContextStack::new(usize::from(function.context_size));
        Ok(Self {
            function,
            this_function,
            registers,
            contexts,
            scopes: Vec::new(),
            pc: 0,
        })
    }

    /// Next instruction, advancing the program counter.
    pub fn fetch(&mut self) -> Option<Instruction> {
        let instruction = self.function.instructions.get(self.pc).copied()?;
        self.pc += 1;
        Some(instruction)
    }

    /// Moves the program counter to `target`.
    ///
    /// # Errors
    ///
    /// [`VmError::Invariant`] for targets past the end of the function.
    pub fn jump(&mut self, target: usize) -> VmResult<()> {
        if target > self.function.instructions.len() {
            return Err(VmError::invariant(format!(
                "jump to {target} outside function #{}",
                self.function.id
            )));
        }
        self.pc = target;
        Ok(())
    }

    /// Constant `index` of the running function.
    pub fn constant(&self, index: u32) -> VmResult<Value> {
        self.function.constant(index as usize).ok_or_else(|| {
            VmError::invariant(format!(
                "constant k{index} outside function #{}",
                self.function.id
            ))
        })
    }
}
