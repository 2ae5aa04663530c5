//! Closure cells and register windows
//!
//! A captured variable lives in a [`ClosureCell`] shared by every register
//! that aliases it: the owning register of the activation that created the
//! cell and the in-closure registers of each function that captured it.
//! Bound registers read and write through the cell, so a write through any
//! alias is observed by all of them.

use std::cell::RefCell;
use std::rc::Rc;

use core_types::Value;

use crate::error::{VmError, VmResult};

/// Shared storage of one captured variable.
pub type ClosureCell = Rc<RefCell<Value>>;

/// Creates a cell holding `value`.
pub fn new_cell(value: Value) -> ClosureCell {
    Rc::new(RefCell::new(value))
}

/// One slot of a register window.
#[derive(Debug, Clone, Default)]
pub struct Register {
    value: Value,
    cell: Option<ClosureCell>,
}

impl Register {
    /// Current value, read through the cell when bound.
    pub fn get(&self) -> Value {
        match &self.cell {
            Some(cell) => *cell.borrow(),
            None => self.value,
        }
    }

    /// Stores `value` in the register and in its cell.
    pub fn set(&mut self, value: Value) {
        self.value = value;
        if let Some(cell) = &self.cell {
            *cell.borrow_mut() = value;
        }
    }

    /// Binds the register to `cell`. The register takes the cell's value.
    pub fn bind(&mut self, cell: ClosureCell) {
        self.value = *cell.borrow();
        self.cell = Some(cell);
    }

    /// The bound cell, if any.
    pub fn cell(&self) -> Option<&ClosureCell> {
        self.cell.as_ref()
    }
}

/// The registers of one call.
///
/// Register 0 holds `this`, registers `1..=argc` the arguments.
#[derive(Debug, Clone)]
pub struct RegisterWindow {
    registers: Vec<Register>,
}

impl RegisterWindow {
    /// Window of `size` registers, all `undefined`.
    pub fn new(size: usize) -> Self {
        let register = Register {
            value: Value::UNDEFINED,
            cell: None,
        };
        Self {
            registers: vec![register; size.max(1)],
        }
    }

    /// Number of registers.
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Whether the window is empty. Windows always hold at least `this`.
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    fn slot(&self, index: u32) -> VmResult<&Register> {
        self.registers
            .get(index as usize)
            .ok_or_else(|| out_of_window(index, self.registers.len()))
    }

    fn slot_mut(&mut self, index: u32) -> VmResult<&mut Register> {
        let len = self.registers.len();
        self.registers
            .get_mut(index as usize)
            .ok_or_else(|| out_of_window(index, len))
    }

    /// Reads register `index`.
    ///
    /// # Errors
    ///
    /// [`VmError::Invariant`] when the index lies outside the window.
    pub fn get(&self, index: u32) -> VmResult<Value> {
        self.slot(index).map(Register::get)
    }

    /// Writes register `index`, propagating to its cell.
    ///
    /// # Errors
    ///
    /// [`VmError::Invariant`] when the index lies outside the window.
    pub fn set(&mut self, index: u32, value: Value) -> VmResult<()> {
        self.slot_mut(index)?.set(value);
        Ok(())
    }

    /// Binds register `index` to `cell`.
    pub fn bind(&mut self, index: u32, cell: ClosureCell) -> VmResult<()> {
        self.slot_mut(index)?.bind(cell);
        Ok(())
    }

    /// Binds register `index` to a fresh cell holding its current value and
    /// returns the cell.
    pub fn bind_fresh(&mut self, index: u32) -> VmResult<ClosureCell> {
        let register = self.slot_mut(index)?;
        let cell = new_cell(register.get());
        register.bind(Rc::clone(&cell));
        Ok(cell)
    }

    /// The cell bound to register `index`.
    pub fn cell(&self, index: u32) -> VmResult<Option<ClosureCell>> {
        Ok(self.slot(index)?.cell().cloned())
    }

    /// Current value of every register, read through bound cells.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.registers.iter().map(Register::get)
    }
}

fn out_of_window(index: u32, len: usize) -> VmError {
    VmError::invariant(format!("register r{index} outside a window of {len}"))
}
