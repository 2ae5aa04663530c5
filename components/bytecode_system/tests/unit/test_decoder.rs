//! Snapshot loading: linkage, constants and rejection of malformed input.

use bytecode_system::writer::write_record;
use bytecode_system::{
    decode, decode_instructions, encode_instructions, format, Constant, DecodeError,
    FunctionFlags, FunctionRecord, Instruction, LiteralPool, OpCode, SnapshotWriter,
};
use core_types::{DirectStringKind, Value};

fn ret0() -> Vec<Instruction> {
    vec![Instruction::bare(OpCode::Return0)]
}

/// Root declaring `r1` as a captured variable and one child reading it as `r1`.
fn closure_program() -> SnapshotWriter {
    let mut writer = SnapshotWriter::new();
    let root = writer.add_function(FunctionRecord {
        stack_size: 3,
        instructions: vec![
            Instruction::abc(OpCode::OutClosure, 1, 0, 0),
            Instruction::abc(OpCode::New, 2, 2, 0),
            Instruction::bare(OpCode::Return0),
        ],
        ..FunctionRecord::root()
    });
    let slot = writer.add_value_ref(root, 1);
    writer
        .function_mut(root)
        .expect("root exists")
        .out_closure
        .push(slot);
    writer.add_function(FunctionRecord {
        stack_size: 2,
        argc: 1,
        in_closure: vec![(slot, 1)],
        instructions: ret0(),
        ..FunctionRecord::child(root)
    });
    writer
}

// ============================================================================
// Linkage
// ============================================================================

#[test]
fn test_children_and_closures_are_linked() {
    let program = decode(&closure_program().finish(), &mut LiteralPool::new()).unwrap();
    assert_eq!(program.functions.len(), 2);
    assert_eq!(program.root.children.len(), 1);
    assert_eq!(program.root.children[0].id, 1);
    assert_eq!(program.closures.len(), 1);

    let root = &program.root;
    assert_eq!(root.out_closure.len(), 1);
    assert!(root.captures_register(1));

    let child = &root.children[0];
    assert_eq!(child.argc, 1);
    let entry = child.in_closure[0];
    assert_eq!(entry.slot, 0);
    assert_eq!(entry.register, 1);
    assert_eq!(entry.source.function, 0);
    assert_eq!(entry.source.register, 1);
}

#[test]
fn test_children_keep_index_order() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        instructions: ret0(),
        ..FunctionRecord::root()
    });
    for _ in 0..3 {
        writer.add_function(FunctionRecord {
            instructions: ret0(),
            ..FunctionRecord::child(0)
        });
    }
    writer.add_function(FunctionRecord {
        instructions: ret0(),
        ..FunctionRecord::child(2)
    });
    let program = decode(&writer.finish(), &mut LiteralPool::new()).unwrap();
    let ids: Vec<usize> = program.root.children.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(program.functions[2].children[0].id, 4);
    assert!(program.disassemble(&|v| format!("{v:?}")).contains("function #4"));
}

#[test]
fn test_status_flags_survive() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        flags: FunctionFlags::FUNCTION | FunctionFlags::STRICT_MODE | FunctionFlags::ARROW_FUNCTION,
        context_size: 2,
        instructions: ret0(),
        ..FunctionRecord::root()
    });
    let program = decode(&writer.finish(), &mut LiteralPool::new()).unwrap();
    assert!(program.root.is_strict());
    assert!(program.root.is_arrow());
    assert_eq!(program.root.context_size, 2);
}

// ============================================================================
// Constants
// ============================================================================

#[test]
fn test_constants_are_materialised() {
    let mut writer = SnapshotWriter::new();
    let hello = writer.add_string("hello");
    let pattern = writer.add_string("a+b");
    let global = writer.add_regex_flag("g");
    let direct = Value::make_direct_string(DirectStringKind::Uint, 17).unwrap();
    writer.add_function(FunctionRecord {
        constants: vec![
            Constant::Integer(7),
            Constant::Integer(i32::MAX),
            Constant::Number(0.25),
            Constant::String(hello),
            Constant::StringDirect(direct.raw()),
            Constant::Regex {
                flags: global,
                source: pattern,
            },
            Constant::Boolean(true),
        ],
        instructions: ret0(),
        ..FunctionRecord::root()
    });

    let mut pool = LiteralPool::new();
    let program = decode(&writer.finish(), &mut pool).unwrap();
    let k = &program.root.constants;
    assert_eq!(k.len(), 7);
    assert_eq!(k[0], Value::make_integer(7));
    assert!(k[1].is_float());
    assert_eq!(pool.number_value(k[1]), Some(f64::from(i32::MAX)));
    assert_eq!(pool.number_value(k[2]), Some(0.25));
    assert_eq!(pool.string_text(k[3]).as_deref(), Some("hello"));
    assert_eq!(k[4], direct);
    assert_eq!(pool.describe(k[5]), "/a+b/g");
    assert_eq!(k[6], Value::TRUE);
    assert_eq!(program.strings, vec!["hello".to_string(), "a+b".to_string()]);
    assert_eq!(program.regex_flags, vec!["g".to_string()]);
}

#[test]
fn test_string_index_out_of_range() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        constants: vec![Constant::String(3)],
        instructions: ret0(),
        ..FunctionRecord::root()
    });
    let err = decode(&writer.finish(), &mut LiteralPool::new()).unwrap_err();
    assert_eq!(
        err,
        DecodeError::IndexOutOfRange {
            kind: "string",
            index: 3,
            count: 0
        }
    );
}

#[test]
fn test_direct_string_must_be_inline_string() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        constants: vec![Constant::StringDirect(Value::UNDEFINED.raw())],
        instructions: ret0(),
        ..FunctionRecord::root()
    });
    let err = decode(&writer.finish(), &mut LiteralPool::new()).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidConstant(_)));
}

// ============================================================================
// Rejected input
// ============================================================================

fn header(magic: u32, compatible: u32) -> Vec<u8> {
    let mut body = Vec::new();
    write_record(&mut body, format::header_key::MAGIC, &magic.to_le_bytes());
    write_record(
        &mut body,
        format::header_key::COMPATIBLE_VERSION,
        &compatible.to_le_bytes(),
    );
    let mut out = Vec::new();
    write_record(&mut out, format::section::HEADER, &body);
    out
}

#[test]
fn test_empty_input() {
    assert_eq!(
        decode(&[], &mut LiteralPool::new()).unwrap_err(),
        DecodeError::Empty
    );
}

#[test]
fn test_bad_magic() {
    let err = decode(&header(0x1234_5678, 8), &mut LiteralPool::new()).unwrap_err();
    assert_eq!(err, DecodeError::BadMagic(0x1234_5678));
}

#[test]
fn test_newer_compatible_version_is_rejected() {
    let err = decode(&header(format::MAGIC, 9), &mut LiteralPool::new()).unwrap_err();
    assert_eq!(
        err,
        DecodeError::IncompatibleVersion {
            required: 9,
            supported: 8
        }
    );
}

#[test]
fn test_header_must_come_first() {
    let mut bytes = Vec::new();
    write_record(&mut bytes, format::section::STRING, &[0; 4]);
    bytes.extend(header(format::MAGIC, 8));
    assert!(matches!(
        decode(&bytes, &mut LiteralPool::new()),
        Err(DecodeError::Malformed(_))
    ));
}

#[test]
fn test_header_without_functions() {
    let err = decode(&header(format::MAGIC, 8), &mut LiteralPool::new()).unwrap_err();
    assert!(matches!(err, DecodeError::Malformed(_)));
}

#[test]
fn test_truncated_snapshot() {
    let bytes = closure_program().finish();
    for cut in [1, 5, bytes.len() / 2, bytes.len() - 1] {
        let result = decode(&bytes[..cut], &mut LiteralPool::new());
        assert!(
            matches!(result, Err(DecodeError::Truncated(_))),
            "cut at {cut}: {result:?}"
        );
    }
}

#[test]
fn test_unknown_sections_are_skipped() {
    let mut bytes = closure_program().finish();
    write_record(&mut bytes, 42, &[1, 2, 3]);
    let program = decode(&bytes, &mut LiteralPool::new()).unwrap();
    assert_eq!(program.functions.len(), 2);
}

#[test]
fn test_in_closure_slot_out_of_range() {
    let mut writer = closure_program();
    writer.function_mut(1).unwrap().in_closure = vec![(5, 1)];
    let err = decode(&writer.finish(), &mut LiteralPool::new()).unwrap_err();
    assert_eq!(
        err,
        DecodeError::IndexOutOfRange {
            kind: "closure",
            index: 5,
            count: 1
        }
    );
}

#[test]
fn test_in_closure_register_outside_frame() {
    let mut writer = closure_program();
    writer.function_mut(1).unwrap().in_closure = vec![(0, 9)];
    let err = decode(&writer.finish(), &mut LiteralPool::new()).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::IndexOutOfRange {
            kind: "in-closure register",
            ..
        }
    ));
}

#[test]
fn test_value_ref_register_outside_owner_frame() {
    let mut writer = closure_program();
    writer.add_value_ref(0, 40);
    let err = decode(&writer.finish(), &mut LiteralPool::new()).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::IndexOutOfRange {
            kind: "value-ref register",
            ..
        }
    ));
}

#[test]
fn test_nesting_cycle_is_rejected() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        instructions: ret0(),
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        instructions: ret0(),
        ..FunctionRecord::child(2)
    });
    writer.add_function(FunctionRecord {
        instructions: ret0(),
        ..FunctionRecord::child(1)
    });
    let err = decode(&writer.finish(), &mut LiteralPool::new()).unwrap_err();
    assert!(matches!(err, DecodeError::Malformed(message) if message.contains("cycle")));
}

#[test]
fn test_super_index_out_of_range() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        instructions: ret0(),
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        instructions: ret0(),
        ..FunctionRecord::child(7)
    });
    let err = decode(&writer.finish(), &mut LiteralPool::new()).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::IndexOutOfRange {
            kind: "super function",
            index: 7,
            ..
        }
    ));
}

#[test]
fn test_first_function_must_be_root() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        instructions: ret0(),
        ..FunctionRecord::child(1)
    });
    writer.add_function(FunctionRecord {
        instructions: ret0(),
        ..FunctionRecord::root()
    });
    assert!(matches!(
        decode(&writer.finish(), &mut LiteralPool::new()),
        Err(DecodeError::Malformed(_))
    ));
}

#[test]
fn test_invalid_opcode() {
    // count 1, full-width flag, opcode 57 (INVALID)
    let bytes = [1, 0, 0, 0, 0b1111_0010];
    assert!(matches!(
        decode_instructions(&bytes),
        Err(DecodeError::MalformedInstruction(_))
    ));
}

#[test]
fn test_trailing_instruction_bytes() {
    let mut bytes = encode_instructions(&ret0());
    assert!(decode_instructions(&bytes).is_ok());
    bytes.push(0);
    assert!(matches!(
        decode_instructions(&bytes),
        Err(DecodeError::MalformedInstruction(_))
    ));
}

#[test]
fn test_zero_instruction_count() {
    assert!(matches!(
        decode_instructions(&[0, 0, 0, 0]),
        Err(DecodeError::MalformedInstruction(_))
    ));
}
