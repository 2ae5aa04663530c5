//! Snapshot loader
//!
//! Decoding runs in two phases. Sections are first read into an index arena
//! of raw function records, then the records are linked (children by their
//! super index, closures against the value-ref table) and frozen bottom-up
//! into shared [`FunctionState`]s. Any error aborts the whole load; values
//! already handed to the [`LiteralAllocator`] are left for the embedder to
//! reclaim.

use std::rc::Rc;

use core_types::Value;
use tracing::{debug, trace, warn};

use crate::bits::BitReader;
use crate::closure::{ClosureRef, ClosureTable, InClosure, OutClosure};
use crate::constant::{direct_string, Constant};
use crate::error::DecodeError;
use crate::format::{
    function_key, header_key, section, string_key, value_ref_key, COMPATIBLE_VERSION,
    FINISHED_MARK, FORMAT_VERSION, MAGIC,
};
use crate::function::{FunctionFlags, FunctionState};
use crate::instruction::Instruction;
use crate::literal::LiteralAllocator;
use crate::opcode::{OpCode, OperandFormat, OP_BITS, OP_HALF_BITS};
use crate::reader::{le_uint, SectionReader, Target};

/// Everything a snapshot defines.
#[derive(Debug, Clone)]
pub struct DecodedProgram {
    /// Function 0, the program body
    pub root: Rc<FunctionState>,
    /// Every function by snapshot index
    pub functions: Vec<Rc<FunctionState>>,
    /// The value-ref table
    pub closures: ClosureTable,
    /// The string table
    pub strings: Vec<String>,
    /// The regex flag table
    pub regex_flags: Vec<String>,
}

impl DecodedProgram {
    /// Listing of every function.
    pub fn disassemble(&self, describe: &dyn Fn(Value) -> String) -> String {
        self.functions
            .iter()
            .map(|function| function.disassemble(describe))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Loads a snapshot.
///
/// # Errors
///
/// Any [`DecodeError`]; nothing decoded before the error is returned.
///
/// # Examples
///
/// ```
/// use bytecode_system::{decode, FunctionRecord, Instruction, LiteralPool, OpCode, SnapshotWriter};
///
/// let mut writer = SnapshotWriter::new();
/// writer.add_function(FunctionRecord {
///     stack_size: 1,
///     instructions: vec![Instruction::bare(OpCode::Return0)],
///     ..FunctionRecord::root()
/// });
/// let bytes = writer.finish();
///
/// let program = decode(&bytes, &mut LiteralPool::new()).unwrap();
/// assert_eq!(program.root.instructions.len(), 1);
/// ```
pub fn decode(
    bytes: &[u8],
    literals: &mut dyn LiteralAllocator,
) -> Result<DecodedProgram, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let mut decoder = Decoder::new(literals);
    let mut reader = SectionReader::new(bytes);
    let mut first = true;
    while !reader.is_at_end() {
        let target = reader.read_target("section header")?;
        if target.len == 0 {
            return Err(DecodeError::Malformed(format!(
                "section {} has zero length",
                target.tag
            )));
        }
        let body = reader.take(target.len, "section")?;
        if first && target.tag != section::HEADER {
            return Err(DecodeError::Malformed(
                "snapshot does not start with a header section".into(),
            ));
        }
        first = false;
        debug!(section = target.tag, size = target.len, "decoding section");
        match target.tag {
            section::HEADER => decoder.header(body)?,
            section::STRING => decoder.strings(body)?,
            section::FUNCTION => decoder.functions(body)?,
            section::VALUEREF => decoder.value_refs(body)?,
            other => warn!(section = other, size = target.len, "skipping unknown section"),
        }
    }
    decoder.link()
}

#[derive(Debug, Default)]
struct RawFunction {
    super_index: i32,
    argc: u8,
    stack_size: u16,
    context_size: u16,
    flags: FunctionFlags,
    instructions: Vec<Instruction>,
    constants: Vec<Value>,
    in_refs: Vec<(i32, i32)>,
    out_refs: Vec<i32>,
}

struct Decoder<'a> {
    literals: &'a mut dyn LiteralAllocator,
    magic_seen: bool,
    strings: Vec<String>,
    string_values: Vec<Value>,
    regex_flags: Vec<String>,
    flag_values: Vec<Value>,
    functions: Vec<RawFunction>,
    refs: Vec<ClosureRef>,
}

impl<'a> Decoder<'a> {
    fn new(literals: &'a mut dyn LiteralAllocator) -> Self {
        Decoder {
            literals,
            magic_seen: false,
            strings: Vec::new(),
            string_values: Vec::new(),
            regex_flags: Vec::new(),
            flag_values: Vec::new(),
            functions: Vec::new(),
            refs: Vec::new(),
        }
    }

    fn header(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        const CONTEXT: &str = "header section";
        let mut reader = SectionReader::new(body);
        let mut version = FORMAT_VERSION;
        while !reader.is_at_end() {
            let target = reader.read_target(CONTEXT)?;
            match target.tag {
                header_key::MAGIC => {
                    let magic = reader.read_uint(target.len, CONTEXT)?;
                    if magic != MAGIC {
                        return Err(DecodeError::BadMagic(magic));
                    }
                    self.magic_seen = true;
                }
                header_key::VERSION => version = reader.read_uint(target.len, CONTEXT)?,
                header_key::COMPATIBLE_VERSION => {
                    let required = reader.read_uint(target.len, CONTEXT)?;
                    if required > COMPATIBLE_VERSION {
                        return Err(DecodeError::IncompatibleVersion {
                            required,
                            supported: COMPATIBLE_VERSION,
                        });
                    }
                }
                header_key::ENCRYPT => {
                    if reader.read_uint(target.len, CONTEXT)? != 0 {
                        return Err(DecodeError::Encrypted);
                    }
                }
                _ => reader.skip(target.len, CONTEXT)?,
            }
        }
        if !self.magic_seen {
            return Err(DecodeError::BadMagic(0));
        }
        debug!(version, "snapshot header accepted");
        Ok(())
    }

    fn strings(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        let mut reader = SectionReader::new(body);
        self.strings = read_string_table(
            &mut reader,
            string_key::COUNT,
            string_key::PAYLOAD,
            "string table",
        )?;
        self.regex_flags = read_string_table(
            &mut reader,
            string_key::FLAG_COUNT,
            string_key::FLAG_PAYLOAD,
            "regex flag table",
        )?;
        self.string_values = self
            .strings
            .iter()
            .map(|text| self.literals.string(text))
            .collect::<Result<_, _>>()?;
        self.flag_values = self
            .regex_flags
            .iter()
            .map(|text| self.literals.string(text))
            .collect::<Result<_, _>>()?;
        debug!(
            strings = self.strings.len(),
            regex_flags = self.regex_flags.len(),
            "string section decoded"
        );
        Ok(())
    }

    fn functions(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        const CONTEXT: &str = "function section";
        let mut reader = SectionReader::new(body);
        let count = read_count(&mut reader, function_key::COUNT, CONTEXT)?;
        if count == 0 {
            return Err(DecodeError::Malformed("function count is zero".into()));
        }
        self.functions = Vec::with_capacity(count.min(body.len()));
        for index in 0..count {
            let function = self.function(&mut reader)?;
            debug!(
                index,
                super_index = function.super_index,
                argc = function.argc,
                stack_size = function.stack_size,
                context_size = function.context_size,
                instructions = function.instructions.len(),
                constants = function.constants.len(),
                "function decoded"
            );
            self.functions.push(function);
        }
        if !reader.is_at_end() {
            warn!(
                trailing = reader.remaining(),
                "ignoring bytes after the last function record"
            );
        }
        Ok(())
    }

    fn function(&mut self, reader: &mut SectionReader<'_>) -> Result<RawFunction, DecodeError> {
        const CONTEXT: &str = "function record";
        let mut function = RawFunction {
            super_index: -1,
            ..RawFunction::default()
        };
        let mut constant_count = 0usize;
        loop {
            if reader.is_at_end() {
                return Err(DecodeError::Truncated(CONTEXT));
            }
            let target = reader.read_target(CONTEXT)?;
            match target.tag {
                function_key::SUPER => function.super_index = reader.read_int(target.len, CONTEXT)?,
                function_key::ARGC => {
                    function.argc = narrow(reader.read_uint(target.len, CONTEXT)?, "argc")?
                }
                function_key::STACK_SIZE => {
                    function.stack_size = narrow(reader.read_uint(target.len, CONTEXT)?, "stack size")?
                }
                function_key::CONTEXT_SIZE => {
                    function.context_size =
                        narrow(reader.read_uint(target.len, CONTEXT)?, "context size")?
                }
                function_key::STATUS_FLAGS => {
                    let bits = narrow(reader.read_uint(target.len, CONTEXT)?, "status flags")?;
                    function.flags = FunctionFlags::from_bits(bits);
                }
                function_key::IN_CLOSURE => {
                    if target.len % 8 != 0 {
                        return Err(DecodeError::Malformed(format!(
                            "in-closure table of {} bytes",
                            target.len
                        )));
                    }
                    function.in_refs = (0..target.len / 8)
                        .map(|_| Ok((reader.read_i32(CONTEXT)?, reader.read_i32(CONTEXT)?)))
                        .collect::<Result<_, DecodeError>>()?;
                }
                function_key::OUT_CLOSURE => {
                    if target.len % 4 != 0 {
                        return Err(DecodeError::Malformed(format!(
                            "out-closure table of {} bytes",
                            target.len
                        )));
                    }
                    function.out_refs = (0..target.len / 4)
                        .map(|_| reader.read_i32(CONTEXT))
                        .collect::<Result<_, _>>()?;
                }
                function_key::INSTRUCTIONS => {
                    function.instructions = decode_instructions(reader.take(target.len, CONTEXT)?)?
                }
                function_key::CONSTANT_COUNT => {
                    constant_count = reader.read_uint(target.len, CONTEXT)? as usize
                }
                function_key::CONSTANT_PAYLOAD => {
                    if constant_count == 0 {
                        return Err(DecodeError::InvalidConstant(
                            "constant payload without a constant count".into(),
                        ));
                    }
                    let payload = reader.take(target.len, CONTEXT)?;
                    function.constants = self.constants(payload, constant_count)?;
                }
                function_key::FINISHED => {
                    if reader.read_uint(target.len, CONTEXT)? != u32::from(FINISHED_MARK) {
                        return Err(DecodeError::Malformed("bad function terminator".into()));
                    }
                    return Ok(function);
                }
                other => {
                    trace!(key = other, "skipping unknown function key");
                    reader.skip(target.len, CONTEXT)?
                }
            }
        }
    }

    fn constants(&mut self, payload: &[u8], count: usize) -> Result<Vec<Value>, DecodeError> {
        let mut reader = SectionReader::new(payload);
        let mut values = Vec::with_capacity(count.min(payload.len()));
        for _ in 0..count {
            let constant = Constant::decode(&mut reader)?;
            values.push(self.materialise(&constant)?);
        }
        if !reader.is_at_end() {
            return Err(DecodeError::InvalidConstant(format!(
                "{} bytes left after {count} constants",
                reader.remaining()
            )));
        }
        Ok(values)
    }

    fn materialise(&mut self, constant: &Constant) -> Result<Value, DecodeError> {
        match *constant {
            Constant::Integer(value) => match Value::try_integer(i64::from(value)) {
                Some(inline) => Ok(inline),
                None => self.literals.number(f64::from(value)),
            },
            Constant::Number(value) => self.literals.number(value),
            Constant::String(index) => lookup(&self.string_values, index, "string"),
            Constant::StringDirect(raw) => direct_string(raw),
            Constant::Regex { flags, source } => {
                let flags = lookup(&self.flag_values, flags, "regex flag")?;
                let source = lookup(&self.string_values, source, "string")?;
                self.literals.regexp(source, flags)
            }
            Constant::RegexDirect { flags, source } => {
                let flags = lookup(&self.flag_values, flags, "regex flag")?;
                self.literals.regexp(direct_string(source)?, flags)
            }
            Constant::Boolean(value) => Ok(Value::make_boolean(value)),
        }
    }

    fn value_refs(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        const CONTEXT: &str = "value-ref section";
        let mut reader = SectionReader::new(body);
        let count = read_count(&mut reader, value_ref_key::COUNT, CONTEXT)?;
        if count == 0 {
            return Err(DecodeError::Malformed("value-ref count is zero".into()));
        }
        let mut refs = Vec::with_capacity(count.min(body.len()));
        for _ in 0..count {
            let mut function = None;
            let mut register = None;
            loop {
                if reader.is_at_end() {
                    return Err(DecodeError::Truncated("value-ref record"));
                }
                let target = reader.read_target(CONTEXT)?;
                match target.tag {
                    value_ref_key::FUNCTION => {
                        let index = reader.read_uint(target.len, CONTEXT)? as usize;
                        if index >= self.functions.len() {
                            return Err(DecodeError::IndexOutOfRange {
                                kind: "value-ref function",
                                index: index as i64,
                                count: self.functions.len(),
                            });
                        }
                        function = Some(index);
                    }
                    value_ref_key::REGISTER => {
                        let value = reader.read_int(target.len, CONTEXT)?;
                        register = Some(u32::try_from(value).map_err(|_| {
                            DecodeError::Malformed(format!("negative value-ref register {value}"))
                        })?);
                    }
                    value_ref_key::FINISHED => {
                        if reader.read_uint(target.len, CONTEXT)? != u32::from(FINISHED_MARK) {
                            return Err(DecodeError::Malformed("bad value-ref terminator".into()));
                        }
                        break;
                    }
                    _ => reader.skip(target.len, CONTEXT)?,
                }
            }
            match (function, register) {
                (Some(function), Some(register)) => refs.push(ClosureRef { function, register }),
                _ => {
                    return Err(DecodeError::Malformed(
                        "value-ref record without function or register".into(),
                    ))
                }
            }
        }
        debug!(count = refs.len(), "value-ref section decoded");
        self.refs = refs;
        Ok(())
    }

    fn link(self) -> Result<DecodedProgram, DecodeError> {
        let count = self.functions.len();
        if count == 0 {
            return Err(DecodeError::Malformed("snapshot has no functions".into()));
        }
        if self.functions[0].super_index >= 0 {
            return Err(DecodeError::Malformed(
                "function 0 is not a root function".into(),
            ));
        }

        let table = ClosureTable::new(self.refs);
        for (slot, entry) in table.iter().enumerate() {
            let owner = &self.functions[entry.function];
            if entry.register >= u32::from(owner.stack_size) {
                return Err(DecodeError::IndexOutOfRange {
                    kind: "value-ref register",
                    index: i64::from(entry.register),
                    count: usize::from(owner.stack_size),
                });
            }
            trace!(slot, function = entry.function, register = entry.register, "value-ref");
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (index, function) in self.functions.iter().enumerate() {
            let parent = function.super_index;
            if parent < 0 {
                if index != 0 {
                    warn!(index, "function has no parent and is unreachable");
                }
                continue;
            }
            let parent = parent as usize;
            if parent >= count {
                return Err(DecodeError::IndexOutOfRange {
                    kind: "super function",
                    index: i64::from(function.super_index),
                    count,
                });
            }
            if parent == index {
                return Err(DecodeError::Malformed(format!(
                    "function {index} is its own parent"
                )));
            }
            children[parent].push(index);
        }

        let linked = self
            .functions
            .iter()
            .enumerate()
            .map(|(index, function)| link_closures(index, function, &table))
            .collect::<Result<Vec<_>, _>>()?;
        let mut raw: Vec<Option<_>> = self
            .functions
            .into_iter()
            .zip(linked)
            .map(|(function, (in_closure, out_closure))| Some((function, in_closure, out_closure)))
            .collect();

        // Leaves first, so every parent sees its children already frozen.
        let mut pending: Vec<usize> = children.iter().map(Vec::len).collect();
        let mut ready: Vec<usize> = (0..count).filter(|i| pending[*i] == 0).collect();
        let mut frozen: Vec<Option<Rc<FunctionState>>> = vec![None; count];
        while let Some(index) = ready.pop() {
            let Some((function, in_closure, out_closure)) = raw[index].take() else {
                continue;
            };
            let state = FunctionState {
                id: index,
                argc: function.argc,
                stack_size: function.stack_size,
                context_size: function.context_size,
                flags: function.flags,
                instructions: function.instructions,
                constants: function.constants,
                children: children[index]
                    .iter()
                    .filter_map(|child| frozen[*child].clone())
                    .collect(),
                in_closure,
                out_closure,
            };
            frozen[index] = Some(Rc::new(state));
            if function.super_index >= 0 {
                let parent = function.super_index as usize;
                pending[parent] -= 1;
                if pending[parent] == 0 {
                    ready.push(parent);
                }
            }
        }

        let functions = frozen
            .into_iter()
            .enumerate()
            .map(|(index, state)| {
                state.ok_or_else(|| {
                    DecodeError::Malformed(format!("function {index} is part of a nesting cycle"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let root = Rc::clone(&functions[0]);
        debug!(functions = functions.len(), closures = table.len(), "snapshot linked");
        Ok(DecodedProgram {
            root,
            functions,
            closures: table,
            strings: self.strings,
            regex_flags: self.regex_flags,
        })
    }
}

fn link_closures(
    index: usize,
    function: &RawFunction,
    table: &ClosureTable,
) -> Result<(Vec<InClosure>, Vec<OutClosure>), DecodeError> {
    let resolve = |slot: i32| -> Result<(u32, ClosureRef), DecodeError> {
        u32::try_from(slot)
            .ok()
            .and_then(|slot| table.get(slot).map(|source| (slot, source)))
            .ok_or(DecodeError::IndexOutOfRange {
                kind: "closure",
                index: i64::from(slot),
                count: table.len(),
            })
    };
    let in_closure = function
        .in_refs
        .iter()
        .map(|&(slot, register)| {
            let (slot, source) = resolve(slot)?;
            let register = u32::try_from(register)
                .ok()
                .filter(|r| *r < u32::from(function.stack_size))
                .ok_or(DecodeError::IndexOutOfRange {
                    kind: "in-closure register",
                    index: i64::from(register),
                    count: usize::from(function.stack_size),
                })?;
            trace!(function = index, slot, register, "in-closure linked");
            Ok(InClosure {
                slot,
                source,
                register,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;
    let out_closure = function
        .out_refs
        .iter()
        .map(|&slot| {
            let (slot, source) = resolve(slot)?;
            Ok(OutClosure { slot, source })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;
    Ok((in_closure, out_closure))
}

fn read_count(
    reader: &mut SectionReader<'_>,
    key: u16,
    context: &'static str,
) -> Result<usize, DecodeError> {
    let target = reader.read_target(context)?;
    expect_key(target, key, context)?;
    Ok(reader.read_uint(target.len, context)? as usize)
}

fn read_string_table(
    reader: &mut SectionReader<'_>,
    count_key: u16,
    payload_key: u16,
    context: &'static str,
) -> Result<Vec<String>, DecodeError> {
    let count = read_count(reader, count_key, context)?;
    let mut table = Vec::with_capacity(count.min(reader.remaining()));
    for index in 0..count {
        let target = reader.read_target(context)?;
        expect_key(target, payload_key, context)?;
        let bytes = reader.take(target.len, context)?;
        let text = std::str::from_utf8(bytes).map_err(|_| {
            DecodeError::InvalidConstant(format!("{context} entry {index} is not valid UTF-8"))
        })?;
        table.push(text.to_owned());
    }
    Ok(table)
}

fn expect_key(target: Target, expected: u16, context: &'static str) -> Result<(), DecodeError> {
    if target.tag != expected {
        return Err(DecodeError::UnexpectedKey {
            context,
            expected,
            found: target.tag,
        });
    }
    Ok(())
}

fn narrow<T: TryFrom<u32>>(value: u32, what: &str) -> Result<T, DecodeError> {
    T::try_from(value).map_err(|_| DecodeError::Malformed(format!("{what} {value} out of range")))
}

fn lookup(table: &[Value], index: u32, kind: &'static str) -> Result<Value, DecodeError> {
    table
        .get(index as usize)
        .copied()
        .ok_or(DecodeError::IndexOutOfRange {
            kind,
            index: i64::from(index),
            count: table.len(),
        })
}

/// Decodes an instruction stream: a little-endian `u32` count followed by
/// bit-packed instructions.
pub fn decode_instructions(bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut reader = BitReader::new(bytes);
    let count = le_uint(reader.read_bytes(4)?) as usize;
    if count == 0 {
        return Err(DecodeError::MalformedInstruction(
            "instruction count is zero".into(),
        ));
    }
    let mut instructions = Vec::with_capacity(count.min(bytes.len() * 2));
    for pc in 0..count {
        let full = reader.next_flag()?;
        let code = reader.next_bits(if full { OP_BITS } else { OP_HALF_BITS })?;
        let opcode = u8::try_from(code)
            .ok()
            .and_then(OpCode::from_u8)
            .ok_or_else(|| {
                DecodeError::MalformedInstruction(format!("invalid opcode {code} at pc {pc}"))
            })?;
        let instruction = match opcode.format() {
            OperandFormat::Ax => Instruction::ax(opcode, wide_operand(&mut reader)?),
            OperandFormat::ABx => {
                let a = narrow_operand(&mut reader)?;
                Instruction::abx(opcode, a, wide_operand(&mut reader)?)
            }
            OperandFormat::Abc(arity) => {
                let mut operands = [0u32; 3];
                for operand in operands.iter_mut().take(arity as usize) {
                    *operand = narrow_operand(&mut reader)?;
                }
                Instruction::abc(opcode, operands[0], operands[1], operands[2])
            }
        };
        trace!(pc, %instruction, "decoded");
        instructions.push(instruction);
    }
    if reader.remaining_bytes() != 0 {
        return Err(DecodeError::MalformedInstruction(format!(
            "{} bytes left after {count} instructions",
            reader.remaining_bytes()
        )));
    }
    Ok(instructions)
}

fn narrow_operand(reader: &mut BitReader<'_>) -> Result<u32, DecodeError> {
    let width = if reader.next_flag()? { 8 } else { 4 };
    reader.next_bits(width)
}

fn wide_operand(reader: &mut BitReader<'_>) -> Result<u32, DecodeError> {
    let width = if reader.next_flag()? { 24 } else { 12 };
    reader.next_bits(width)
}
