//! Call frame records for backtraces

use core_types::StackFrame;

/// One entry of the VM's call stack.
///
/// The register window itself lives in the executing
/// [`ExecutionContext`](crate::ExecutionContext); the call stack only keeps
/// what a debugger backtrace reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    /// Load-order index of the running function
    pub function_id: usize,
    /// Index of the instruction being executed
    pub pc: usize,
    /// Declared argument count
    pub argc: u8,
}

impl CallFrame {
    /// Frame entering `function_id` at its first instruction.
    pub fn new(function_id: usize, argc: u8) -> Self {
        Self {
            function_id,
            pc: 0,
            argc,
        }
    }
}

impl From<CallFrame> for StackFrame {
    fn from(frame: CallFrame) -> Self {
        StackFrame {
            function_id: frame.function_id as u32,
            pc: frame.pc as u32,
            argc: u32::from(frame.argc),
        }
    }
}
