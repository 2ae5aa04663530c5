//! Register VM executing loaded bytecode snapshots
//!
//! This crate provides the execution half of the engine:
//! - [`VmContext`]: heap, global object, intrinsics and host functions
//! - A dispatch loop over the compact instruction set, one register window
//!   per call
//! - `try`/`catch`/`finally` through an explicit per-frame context stack
//! - Closures sharing captured variables through reference cells
//! - Mark-and-sweep reclamation of unreachable heap cells
//! - Stop callback and debugger hooks polled between instructions
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Constant, FunctionRecord, Instruction, OpCode, SnapshotWriter};
//! use core_types::Value;
//! use interpreter::VmContext;
//!
//! let mut writer = SnapshotWriter::new();
//! writer.add_function(FunctionRecord {
//!     stack_size: 3,
//!     constants: vec![Constant::Integer(40), Constant::Integer(2)],
//!     instructions: vec![
//!         Instruction::abx(OpCode::LoadK, 1, 0),
//!         Instruction::abx(OpCode::LoadK, 2, 1),
//!         Instruction::abc(OpCode::Add, 1, 1, 2),
//!         Instruction::abc(OpCode::Return1, 1, 0, 0),
//!     ],
//!     ..FunctionRecord::root()
//! });
//!
//! let mut vm = VmContext::new().unwrap();
//! let program = vm.load(&writer.finish()).unwrap();
//! assert_eq!(vm.execute(&program).unwrap(), Value::make_integer(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call;
pub mod call_frame;
pub mod closure;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod exception;
pub mod gc;
pub mod heap;
pub mod hooks;
pub mod object;
pub mod operations;
pub mod properties;
pub mod vm;

// Re-export main types at crate root
pub use call::CallKind;
pub use call_frame::CallFrame;
pub use closure::{new_cell, ClosureCell, RegisterWindow};
pub use config::VmConfig;
pub use context::ExecutionContext;
pub use dispatch::Completion;
pub use error::{VmError, VmResult};
pub use exception::{Context, ContextStack, Landing, Search};
pub use heap::{HeapCell, VmHeap};
pub use hooks::{DebuggerHooks, StopCallback};
pub use object::{JsObject, ObjectClass, ScriptFunction};
pub use operations::{number_to_int32, string_to_number, Arithmetic, Bitwise, Hint, Relation};
pub use properties::AccessorKind;
pub use vm::{number_to_string, External, Intrinsics, NativeFunction, VmContext};
