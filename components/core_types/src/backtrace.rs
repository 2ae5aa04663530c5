//! Call stack snapshots handed to debugger collaborators.

/// One active frame of the interpreter.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame { function_id: 2, pc: 14, argc: 1 };
/// assert_eq!(frame.to_string(), "fn#2 @14 (argc 1)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    /// Load-order index of the executing function
    pub function_id: u32,
    /// Index of the instruction being executed
    pub pc: u32,
    /// Declared argument count of the function
    pub argc: u32,
}

impl std::fmt::Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn#{} @{} (argc {})", self.function_id, self.pc, self.argc)
    }
}

/// Frames from innermost to outermost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backtrace {
    /// Active frames, innermost first
    pub frames: Vec<StackFrame>,
}

impl Backtrace {
    /// Number of frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The innermost frame.
    pub fn top(&self) -> Option<&StackFrame> {
        self.frames.first()
    }
}
