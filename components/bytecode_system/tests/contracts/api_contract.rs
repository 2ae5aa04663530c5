//! Signatures and failure contracts of the exported loader API.

use std::rc::Rc;

use bytecode_system::{
    decode, ClosureTable, DecodeError, DecodedProgram, FunctionRecord, FunctionState, Instruction,
    LiteralAllocator, LiteralPool, OpCode, SnapshotWriter, OP_BITS,
};
use core_types::Value;

fn minimal() -> Vec<u8> {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        instructions: vec![Instruction::bare(OpCode::Return0)],
        ..FunctionRecord::root()
    });
    writer.finish()
}

/// decode(bytes, &mut dyn LiteralAllocator) -> Result<DecodedProgram, DecodeError>
#[test]
fn contract_decode_signature() {
    let mut pool = LiteralPool::new();
    let allocator: &mut dyn LiteralAllocator = &mut pool;
    let result: Result<DecodedProgram, DecodeError> = decode(&minimal(), allocator);
    let program = result.unwrap();
    let root: &Rc<FunctionState> = &program.root;
    assert!(Rc::ptr_eq(root, &program.functions[0]));
    let _: &ClosureTable = &program.closures;
}

/// Function states are shared, not copied, between parent and function table.
#[test]
fn contract_children_are_shared() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        instructions: vec![Instruction::bare(OpCode::Return0)],
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        instructions: vec![Instruction::bare(OpCode::Return0)],
        ..FunctionRecord::child(0)
    });
    let program = decode(&writer.finish(), &mut LiteralPool::new()).unwrap();
    assert!(Rc::ptr_eq(&program.root.children[0], &program.functions[1]));
}

/// The opcode field width follows the opcode count.
#[test]
fn contract_opcode_width() {
    assert_eq!(OP_BITS, 6);
    assert_eq!(OpCode::Invalid as u8, 57);
}

/// Allocator failures abort the load.
#[test]
fn contract_allocator_errors_propagate() {
    struct Failing;
    impl LiteralAllocator for Failing {
        fn number(&mut self, _value: f64) -> Result<Value, DecodeError> {
            Err(DecodeError::InvalidConstant("no heap".into()))
        }
        fn string(&mut self, _text: &str) -> Result<Value, DecodeError> {
            Err(DecodeError::InvalidConstant("no heap".into()))
        }
        fn regexp(&mut self, _source: Value, _flags: Value) -> Result<Value, DecodeError> {
            Err(DecodeError::InvalidConstant("no heap".into()))
        }
    }
    let mut writer = SnapshotWriter::new();
    writer.add_string("x");
    writer.add_function(FunctionRecord {
        instructions: vec![Instruction::bare(OpCode::Return0)],
        ..FunctionRecord::root()
    });
    assert_eq!(
        decode(&writer.finish(), &mut Failing).unwrap_err(),
        DecodeError::InvalidConstant("no heap".into())
    );
}
