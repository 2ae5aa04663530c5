//! Decoded instruction representation
//!
//! The snapshot packs operands into variable bit widths; once loaded every
//! instruction is a flat record so the dispatch loop reads operands without
//! any unpacking.

use std::fmt;

use crate::opcode::{OpCode, OperandFormat};

/// Largest value of a wide (`Ax`/`Bx`) operand.
pub const WIDE_OPERAND_MAX: u32 = (1 << 24) - 1;
/// Largest value of a narrow (`A`/`B`/`C`) operand.
pub const NARROW_OPERAND_MAX: u32 = (1 << 8) - 1;

/// A single instruction.
///
/// For [`OperandFormat::Ax`] the wide operand is stored in `a`; for
/// [`OperandFormat::ABx`] the wide operand is stored in `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Operation
    pub opcode: OpCode,
    /// First operand (or `Ax`)
    pub a: u32,
    /// Second operand (or `Bx`)
    pub b: u32,
    /// Third operand
    pub c: u32,
}

impl Instruction {
    /// Instruction with three narrow operands.
    pub fn abc(opcode: OpCode, a: u32, b: u32, c: u32) -> Self {
        Instruction { opcode, a, b, c }
    }

    /// Instruction with a single wide operand.
    pub fn ax(opcode: OpCode, ax: u32) -> Self {
        Instruction {
            opcode,
            a: ax,
            b: 0,
            c: 0,
        }
    }

    /// Instruction with a register and a wide operand.
    pub fn abx(opcode: OpCode, a: u32, bx: u32) -> Self {
        Instruction { opcode, a, b: bx, c: 0 }
    }

    /// Operand-less instruction.
    pub fn bare(opcode: OpCode) -> Self {
        Instruction::abc(opcode, 0, 0, 0)
    }

    /// Wide operand of an `Ax` instruction.
    pub fn arg_ax(&self) -> u32 {
        self.a
    }

    /// Wide operand of an `ABx` instruction.
    pub fn arg_bx(&self) -> u32 {
        self.b
    }

    /// The operands the instruction's format actually uses.
    pub fn operands(&self) -> Vec<u32> {
        match self.opcode.format() {
            OperandFormat::Ax => vec![self.a],
            OperandFormat::ABx => vec![self.a, self.b],
            OperandFormat::Abc(arity) => [self.a, self.b, self.c][..arity as usize].to_vec(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<22}", self.opcode.name())?;
        let operands: Vec<String> = match self.opcode.format() {
            OperandFormat::Ax => vec![format!("@{}", self.a)],
            OperandFormat::ABx => match self.opcode {
                OpCode::LoadK | OpCode::GetGlobal | OpCode::GetLocal => {
                    vec![format!("r{}", self.a), format!("k{}", self.b)]
                }
                OpCode::NJmp | OpCode::Catch => {
                    vec![format!("r{}", self.a), format!("+{}", self.b)]
                }
                _ => vec![format!("r{}", self.a), format!("@{}", self.b)],
            },
            OperandFormat::Abc(arity) => [self.a, self.b, self.c][..arity as usize]
                .iter()
                .map(|operand| operand.to_string())
                .collect(),
        };
        write!(f, "{}", operands.join(", "))
    }
}
