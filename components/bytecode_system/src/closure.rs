//! Load-time closure linkage tables.
//!
//! A snapshot names every captured variable once in its VALUEREF table as a
//! `(function, register)` pair. Functions then refer to those entries by
//! index ("slot"): the owner lists the slot among its out-closures, every
//! function reading the variable lists it among its in-closures together
//! with the local register the variable is visible in.

/// A captured variable: the function that declares it and its register there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureRef {
    /// Index of the owning function in the snapshot
    pub function: usize,
    /// Register of the variable in the owner's frame
    pub register: u32,
}

/// A variable a function reads from an enclosing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InClosure {
    /// Slot in the [`ClosureTable`]
    pub slot: u32,
    /// Where the variable lives
    pub source: ClosureRef,
    /// Local register the variable is bound to on entry
    pub register: u32,
}

/// A variable of this function that inner functions capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutClosure {
    /// Slot in the [`ClosureTable`]
    pub slot: u32,
    /// The variable itself
    pub source: ClosureRef,
}

/// The VALUEREF table of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureTable {
    refs: Vec<ClosureRef>,
}

impl ClosureTable {
    /// Table over the given entries.
    pub fn new(refs: Vec<ClosureRef>) -> Self {
        ClosureTable { refs }
    }

    /// Entry for `slot`.
    pub fn get(&self, slot: u32) -> Option<ClosureRef> {
        self.refs.get(slot as usize).copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Whether the snapshot captures nothing.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &ClosureRef> {
        self.refs.iter()
    }
}
