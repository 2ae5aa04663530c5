//! Bit-packed instruction streams.

use bytecode_system::{
    decode_instructions, encode_instructions, Instruction, OpCode, OperandFormat, NUM_OPCODES,
    WIDE_OPERAND_MAX,
};
use proptest::prelude::*;

fn instruction() -> impl Strategy<Value = Instruction> {
    (0..NUM_OPCODES - 1, any::<u32>(), any::<u32>(), any::<u32>()).prop_map(|(code, a, b, c)| {
        let opcode = OpCode::ALL[code];
        match opcode.format() {
            OperandFormat::Ax => Instruction::ax(opcode, a & WIDE_OPERAND_MAX),
            OperandFormat::ABx => Instruction::abx(opcode, a & 0xff, b & WIDE_OPERAND_MAX),
            OperandFormat::Abc(arity) => {
                let mut operands = [a & 0xff, b & 0xff, c & 0xff];
                for operand in operands.iter_mut().skip(arity as usize) {
                    *operand = 0;
                }
                Instruction::abc(opcode, operands[0], operands[1], operands[2])
            }
        }
    })
}

#[test]
fn test_small_operands_use_short_encoding() {
    let small = encode_instructions(&[Instruction::abc(OpCode::Add, 1, 2, 3)]);
    let large = encode_instructions(&[Instruction::abc(OpCode::Add, 100, 200, 250)]);
    assert!(small.len() < large.len());
}

#[test]
fn test_wide_jump_targets() {
    let code = vec![
        Instruction::ax(OpCode::Goto, 0xfff),
        Instruction::ax(OpCode::Goto, 0x1000),
        Instruction::abx(OpCode::Catch, 3, WIDE_OPERAND_MAX),
    ];
    assert_eq!(decode_instructions(&encode_instructions(&code)).unwrap(), code);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_streams_decode_to_what_was_encoded(code in prop::collection::vec(instruction(), 1..64)) {
        let bytes = encode_instructions(&code);
        prop_assert_eq!(decode_instructions(&bytes).unwrap(), code);
    }
}
