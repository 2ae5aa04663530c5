//! Snapshot writer
//!
//! Produces the exact format [`decode`](crate::decode) reads, always
//! choosing the narrowest encoding for each field. Used by tooling and by
//! tests that need known-good snapshots.

use crate::bits::BitWriter;
use crate::closure::ClosureRef;
use crate::constant::Constant;
use crate::format::{
    function_key, header_key, section, string_key, value_ref_key, COMPATIBLE_VERSION,
    FINISHED_MARK, FORMAT_VERSION, MAGIC,
};
use crate::function::FunctionFlags;
use crate::instruction::{Instruction, NARROW_OPERAND_MAX, WIDE_OPERAND_MAX};
use crate::opcode::{OperandFormat, OP_BITS, OP_HALF_BITS};
use crate::reader::{FLAG_LEN_SHIFT, FLAG_WIDE_TAG};

/// One function to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRecord {
    /// Index of the enclosing function, `-1` for a root
    pub super_index: i32,
    /// Declared parameter count
    pub argc: u8,
    /// Register window size
    pub stack_size: u16,
    /// Maximum nesting of protected regions
    pub context_size: u16,
    /// Status flags
    pub flags: FunctionFlags,
    /// Code
    pub instructions: Vec<Instruction>,
    /// Constant pool
    pub constants: Vec<Constant>,
    /// `(value-ref slot, local register)` pairs
    pub in_closure: Vec<(i32, i32)>,
    /// Value-ref slots this function owns
    pub out_closure: Vec<i32>,
}

impl FunctionRecord {
    /// An empty root function.
    pub fn root() -> Self {
        FunctionRecord {
            super_index: -1,
            argc: 0,
            stack_size: 1,
            context_size: 0,
            flags: FunctionFlags::FUNCTION,
            instructions: Vec::new(),
            constants: Vec::new(),
            in_closure: Vec::new(),
            out_closure: Vec::new(),
        }
    }

    /// An empty function nested in `parent`.
    pub fn child(parent: usize) -> Self {
        FunctionRecord {
            super_index: parent as i32,
            ..FunctionRecord::root()
        }
    }
}

/// Builds a snapshot.
#[derive(Debug, Default)]
pub struct SnapshotWriter {
    strings: Vec<String>,
    regex_flags: Vec<String>,
    functions: Vec<FunctionRecord>,
    value_refs: Vec<ClosureRef>,
}

impl SnapshotWriter {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string and returns its table index.
    pub fn add_string(&mut self, text: &str) -> u32 {
        intern(&mut self.strings, text)
    }

    /// Interns a regex flag string and returns its table index.
    pub fn add_regex_flag(&mut self, flags: &str) -> u32 {
        intern(&mut self.regex_flags, flags)
    }

    /// Appends a function and returns its index.
    pub fn add_function(&mut self, record: FunctionRecord) -> usize {
        debug_assert!(record.instructions.iter().all(fits_encoding));
        self.functions.push(record);
        self.functions.len() - 1
    }

    /// Mutable access to an added function.
    pub fn function_mut(&mut self, index: usize) -> Option<&mut FunctionRecord> {
        self.functions.get_mut(index)
    }

    /// Declares a captured variable and returns its value-ref slot.
    pub fn add_value_ref(&mut self, function: usize, register: u32) -> i32 {
        self.value_refs.push(ClosureRef { function, register });
        self.value_refs.len() as i32 - 1
    }

    /// Serialises the snapshot.
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::new();

        let mut header = Vec::new();
        write_record(&mut header, header_key::MAGIC, &MAGIC.to_le_bytes());
        write_record(&mut header, header_key::VERSION, &FORMAT_VERSION.to_le_bytes());
        write_record(
            &mut header,
            header_key::COMPATIBLE_VERSION,
            &COMPATIBLE_VERSION.to_le_bytes(),
        );
        write_record(&mut header, header_key::ENCRYPT, &0u32.to_le_bytes());
        write_record(&mut out, section::HEADER, &header);

        let mut strings = Vec::new();
        write_string_table(&mut strings, string_key::COUNT, string_key::PAYLOAD, &self.strings);
        write_string_table(
            &mut strings,
            string_key::FLAG_COUNT,
            string_key::FLAG_PAYLOAD,
            &self.regex_flags,
        );
        write_record(&mut out, section::STRING, &strings);

        let mut functions = Vec::new();
        write_record(
            &mut functions,
            function_key::COUNT,
            &(self.functions.len() as u32).to_le_bytes(),
        );
        for function in &self.functions {
            write_function(&mut functions, function);
        }
        write_record(&mut out, section::FUNCTION, &functions);

        if !self.value_refs.is_empty() {
            let mut refs = Vec::new();
            write_record(
                &mut refs,
                value_ref_key::COUNT,
                &(self.value_refs.len() as u32).to_le_bytes(),
            );
            for entry in &self.value_refs {
                write_record(
                    &mut refs,
                    value_ref_key::FUNCTION,
                    &(entry.function as u32).to_le_bytes(),
                );
                write_record(
                    &mut refs,
                    value_ref_key::REGISTER,
                    &(entry.register as i32).to_le_bytes(),
                );
                write_record(&mut refs, value_ref_key::FINISHED, &[FINISHED_MARK]);
            }
            write_record(&mut out, section::VALUEREF, &refs);
        }
        out
    }
}

fn intern(table: &mut Vec<String>, text: &str) -> u32 {
    match table.iter().position(|entry| entry == text) {
        Some(index) => index as u32,
        None => {
            table.push(text.to_owned());
            table.len() as u32 - 1
        }
    }
}

fn write_function(out: &mut Vec<u8>, function: &FunctionRecord) {
    write_record(out, function_key::SUPER, &function.super_index.to_le_bytes());
    write_record(out, function_key::ARGC, &[function.argc]);
    write_record(out, function_key::STACK_SIZE, &function.stack_size.to_le_bytes());
    write_record(out, function_key::CONTEXT_SIZE, &function.context_size.to_le_bytes());
    write_record(out, function_key::STATUS_FLAGS, &function.flags.bits().to_le_bytes());
    if !function.in_closure.is_empty() {
        let bytes: Vec<u8> = function
            .in_closure
            .iter()
            .flat_map(|(slot, register)| {
                slot.to_le_bytes().into_iter().chain(register.to_le_bytes())
            })
            .collect();
        write_record(out, function_key::IN_CLOSURE, &bytes);
    }
    if !function.out_closure.is_empty() {
        let bytes: Vec<u8> = function
            .out_closure
            .iter()
            .flat_map(|slot| slot.to_le_bytes())
            .collect();
        write_record(out, function_key::OUT_CLOSURE, &bytes);
    }
    write_record(
        out,
        function_key::INSTRUCTIONS,
        &encode_instructions(&function.instructions),
    );
    if !function.constants.is_empty() {
        write_record(
            out,
            function_key::CONSTANT_COUNT,
            &(function.constants.len() as u32).to_le_bytes(),
        );
        let mut payload = Vec::new();
        for constant in &function.constants {
            constant.encode(&mut payload);
        }
        write_record(out, function_key::CONSTANT_PAYLOAD, &payload);
    }
    write_record(out, function_key::FINISHED, &[FINISHED_MARK]);
}

fn write_string_table(out: &mut Vec<u8>, count_key: u16, payload_key: u16, table: &[String]) {
    write_record(out, count_key, &(table.len() as u32).to_le_bytes());
    for entry in table {
        write_record(out, payload_key, entry.as_bytes());
    }
}

/// Appends one record with the narrowest header that describes it.
pub fn write_record(out: &mut Vec<u8>, tag: u16, value: &[u8]) {
    let mut flags = 0u8;
    if tag > 0xff {
        flags |= FLAG_WIDE_TAG;
    }
    let len = value.len();
    let length_width = match len {
        1 | 2 | 4 | 8 => {
            flags |= len.trailing_zeros() as u8;
            0
        }
        0..=0xff => 1,
        0x100..=0xffff => 2,
        _ => 4,
    };
    let width_code = if length_width == 4 { 3 } else { length_width as u8 };
    flags |= width_code << FLAG_LEN_SHIFT;
    out.push(flags);
    if tag > 0xff {
        out.extend_from_slice(&tag.to_le_bytes());
    } else {
        out.push(tag as u8);
    }
    out.extend_from_slice(&(len as u32).to_le_bytes()[..length_width]);
    out.extend_from_slice(value);
}

/// Whether every operand fits the wire encoding.
pub fn fits_encoding(instruction: &Instruction) -> bool {
    let narrow = |v: u32| v <= NARROW_OPERAND_MAX;
    let wide = |v: u32| v <= WIDE_OPERAND_MAX;
    match instruction.opcode.format() {
        OperandFormat::Ax => wide(instruction.a),
        OperandFormat::ABx => narrow(instruction.a) && wide(instruction.b),
        OperandFormat::Abc(_) => instruction.operands().into_iter().all(narrow),
    }
}

/// Encodes an instruction stream: a little-endian `u32` count followed by
/// bit-packed instructions.
pub fn encode_instructions(instructions: &[Instruction]) -> Vec<u8> {
    let mut bits = BitWriter::new();
    bits.write_bytes(&(instructions.len() as u32).to_le_bytes());
    for instruction in instructions {
        let code = instruction.opcode as u32;
        let full = code >= 1 << OP_HALF_BITS;
        bits.write_flag(full);
        bits.write_bits(code, if full { OP_BITS } else { OP_HALF_BITS });
        match instruction.opcode.format() {
            OperandFormat::Ax => write_wide(&mut bits, instruction.a),
            OperandFormat::ABx => {
                write_narrow(&mut bits, instruction.a);
                write_wide(&mut bits, instruction.b);
            }
            OperandFormat::Abc(_) => {
                for operand in instruction.operands() {
                    write_narrow(&mut bits, operand);
                }
            }
        }
    }
    bits.finish()
}

fn write_narrow(bits: &mut BitWriter, value: u32) {
    let wide = value > 0xf;
    bits.write_flag(wide);
    bits.write_bits(value, if wide { 8 } else { 4 });
}

fn write_wide(bits: &mut BitWriter, value: u32) {
    let wide = value > 0xfff;
    bits.write_flag(wide);
    bits.write_bits(value, if wide { 24 } else { 12 });
}
