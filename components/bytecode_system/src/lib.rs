//! Bytecode system for the register VM
//!
//! This crate provides the instruction set and the binary snapshot format:
//!
//! - [`OpCode`] and the flat [`Instruction`] record the interpreter dispatches on
//! - [`decode`], the section-based snapshot loader producing shared
//!   [`FunctionState`]s linked into a function tree
//! - [`ClosureTable`] and the per-function in/out closure lists
//! - [`SnapshotWriter`], an encoder for the same format
//! - Disassembly through `Display` on instructions and
//!   [`FunctionState::disassemble`]
//!
//! # Example
//!
//! ```
//! use bytecode_system::{
//!     decode, Constant, FunctionRecord, Instruction, LiteralPool, OpCode, SnapshotWriter,
//! };
//!
//! let mut writer = SnapshotWriter::new();
//! writer.add_function(FunctionRecord {
//!     stack_size: 2,
//!     constants: vec![Constant::Integer(42)],
//!     instructions: vec![
//!         Instruction::abx(OpCode::LoadK, 1, 0),
//!         Instruction::abc(OpCode::Return1, 1, 0, 0),
//!     ],
//!     ..FunctionRecord::root()
//! });
//!
//! let mut pool = LiteralPool::new();
//! let program = decode(&writer.finish(), &mut pool).unwrap();
//! assert_eq!(program.root.constants[0].as_integer(), 42);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bits;
pub mod closure;
pub mod constant;
pub mod decoder;
pub mod error;
pub mod format;
pub mod function;
pub mod instruction;
pub mod literal;
pub mod opcode;
pub mod reader;
pub mod writer;

pub use closure::{ClosureRef, ClosureTable, InClosure, OutClosure};
pub use constant::{Constant, ConstantType};
pub use decoder::{decode, decode_instructions, DecodedProgram};
pub use error::DecodeError;
pub use function::{FunctionFlags, FunctionState};
pub use instruction::{Instruction, NARROW_OPERAND_MAX, WIDE_OPERAND_MAX};
pub use literal::{integral_value, LiteralAllocator, LiteralPool};
pub use opcode::{
    NewKind, OpCode, OperandFormat, PopContextKind, SuperKind, NUM_OPCODES, OP_BITS, OP_HALF_BITS,
};
pub use writer::{encode_instructions, FunctionRecord, SnapshotWriter};
