//! Exception-context stack
//!
//! `try`/`catch`/`finally` regions are tracked by an explicit stack instead
//! of host unwinding. Each entry records the instruction index that ends its
//! region. When control leaves a region abnormally (a `return`, a throw, or a
//! jump out of the region) [`ContextStack::find_finally`] walks the stack
//! outwards, discarding regions that have nothing to run and stopping at the
//! first `catch` (throws only) or `finally` block.
//!
//! Region layout produced by the compiler:
//!
//! ```text
//! TRY end            ; end names the CATCH or FINALLY below
//!   ...protected...
//! CATCH r, skip      ; normal flow jumps to CATCH + skip
//!   ...handler...
//! FINALLY skip       ; or POP_CONTEXT END when there is no finally
//!   ...finally...
//! POP_CONTEXT END    ; FINALLY + skip points just past this instruction
//! ```

use bytecode_system::{Instruction, OpCode};
use core_types::Value;

use crate::error::{VmError, VmResult};

/// One pending region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Context {
    /// Inside a `try` block; `end` is the CATCH or FINALLY instruction
    Try {
        /// Index of the instruction ending the region
        end: usize,
    },
    /// Inside a `catch` block
    Catch {
        /// Index of the instruction ending the region
        end: usize,
    },
    /// Running a `finally` block entered normally or by a jump
    FinallyJump {
        /// Index just past the block
        end: usize,
        /// Where control goes when the block completes
        target: usize,
    },
    /// Running a `finally` block entered by a throw
    FinallyThrow {
        /// Index just past the block
        end: usize,
        /// The pending exception
        error: Value,
    },
    /// Running a `finally` block entered by a `return`
    FinallyReturn {
        /// Index just past the block
        end: usize,
        /// The pending return value
        value: Value,
    },
}

impl Context {
    /// Index of the instruction ending the region.
    pub fn end(&self) -> usize {
        match *self {
            Context::Try { end }
            | Context::Catch { end }
            | Context::FinallyJump { end, .. }
            | Context::FinallyThrow { end, .. }
            | Context::FinallyReturn { end, .. } => end,
        }
    }
}

/// Why control is leaving a region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Search {
    /// Jump to an absolute instruction index
    Jump(usize),
    /// A thrown value
    Throw(Value),
    /// A returned value
    Return(Value),
}

/// Where a search resumes execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    /// First instruction of a `catch` block whose CATCH names `register`
    Catch {
        /// Resume index
        pc: usize,
        /// Register receiving the exception
        register: u32,
    },
    /// First instruction of a `finally` block
    Finally {
        /// Resume index
        pc: usize,
    },
}

/// The per-frame stack of pending regions.
///
/// `scopes` arguments are the frame's lexical environment chain; a `catch`
/// region owns the innermost scope while it is active.
#[derive(Debug, Clone, Default)]
pub struct ContextStack {
    entries: Vec<Context>,
    capacity: usize,
}

impl ContextStack {
    /// Stack for at most `capacity` nested regions.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of pending regions.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Whether no region is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Innermost region.
    pub fn top(&self) -> Option<&Context> {
        self.entries.last()
    }

    /// Exceptions and return values held by `finally` blocks in progress.
    pub fn pending_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.iter().filter_map(|context| match *context {
            Context::FinallyThrow { error, .. } => Some(error),
            Context::FinallyReturn { value, .. } => Some(value),
            _ => None,
        })
    }

    /// Enters a region.
    ///
    /// # Errors
    ///
    /// [`VmError::Invariant`] when the function declared fewer context slots.
    pub fn push(&mut self, context: Context) -> VmResult<()> {
        if self.entries.len() >= self.capacity {
            return Err(VmError::invariant(format!(
                "context stack overflow (capacity {})",
                self.capacity
            )));
        }
        self.entries.push(context);
        Ok(())
    }

    /// Leaves the innermost region.
    pub fn pop(&mut self) -> Option<Context> {
        self.entries.pop()
    }

    /// Replaces the innermost region.
    pub fn replace_top(&mut self, context: Context) -> VmResult<()> {
        let top = self
            .entries
            .last_mut()
            .ok_or_else(|| VmError::invariant("no pending context"))?;
        *top = context;
        Ok(())
    }

    /// Discards the innermost region without running anything.
    pub fn abort_top<T>(&mut self, scopes: &mut Vec<T>) {
        if let Some(Context::Catch { .. }) = self.entries.pop() {
            scopes.pop();
        }
    }

    /// Discards every region.
    pub fn abort_all<T>(&mut self, scopes: &mut Vec<T>) {
        while !self.entries.is_empty() {
            self.abort_top(scopes);
        }
    }

    /// Finds the handler that runs next when control leaves by `search`.
    ///
    /// Regions that end before a jump target are left alone: the jump stays
    /// inside them. Regions with nothing to run are discarded. On a throw a
    /// `try` with a `catch` turns into a [`Context::Catch`]; otherwise the
    /// innermost `finally` becomes the matching `Finally*` context carrying
    /// the pending value.
    ///
    /// # Errors
    ///
    /// [`VmError::Invariant`] when region ends do not name the expected
    /// instructions.
    pub fn find_finally<T>(
        &mut self,
        code: &[Instruction],
        search: Search,
        scopes: &mut Vec<T>,
    ) -> VmResult<Option<Landing>> {
        let limit = match search {
            Search::Jump(target) => target,
            Search::Throw(_) | Search::Return(_) => usize::MAX,
        };

        while let Some(top) = self.entries.last().copied() {
            let end = top.end();
            if limit < end {
                return Ok(None);
            }

            let mut at = end;
            match top {
                Context::Try { .. } => {
                    if limit == end {
                        return Ok(None);
                    }
                    let boundary = instruction_at(code, at)?;
                    if boundary.opcode == OpCode::Catch {
                        let skip = boundary.arg_bx() as usize;
                        if let Search::Throw(_) = search {
                            self.replace_top(Context::Catch { end: at + skip })?;
                            return Ok(Some(Landing::Catch {
                                pc: at + 1,
                                register: boundary.a,
                            }));
                        }
                        at += skip;
                        if instruction_at(code, at)?.opcode == OpCode::PopContext {
                            self.entries.pop();
                            continue;
                        }
                    }
                }
                Context::Catch { .. } => {
                    if limit == end {
                        return Ok(None);
                    }
                    scopes.pop();
                    if instruction_at(code, at)?.opcode == OpCode::PopContext {
                        self.entries.pop();
                        continue;
                    }
                }
                _ => {
                    self.abort_top(scopes);
                    continue;
                }
            }

            let finally = instruction_at(code, at)?;
            if finally.opcode != OpCode::Finally {
                return Err(VmError::invariant(format!(
                    "region ending at {at} has {} instead of FINALLY",
                    finally.opcode
                )));
            }
            let finally_end = at + finally.arg_ax() as usize;
            let entered = match search {
                Search::Jump(target) => Context::FinallyJump {
                    end: finally_end,
                    target,
                },
                Search::Throw(error) => Context::FinallyThrow {
                    end: finally_end,
                    error,
                },
                Search::Return(value) => Context::FinallyReturn {
                    end: finally_end,
                    value,
                },
            };
            self.replace_top(entered)?;
            return Ok(Some(Landing::Finally { pc: at + 1 }));
        }
        Ok(None)
    }
}

fn instruction_at(code: &[Instruction], index: usize) -> VmResult<Instruction> {
    code.get(index)
        .copied()
        .ok_or_else(|| VmError::invariant(format!("region end {index} outside the function")))
}
