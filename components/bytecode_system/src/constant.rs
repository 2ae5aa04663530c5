//! Constant pool entries as they appear in a snapshot.

use core_types::Value;

use crate::error::DecodeError;
use crate::reader::SectionReader;

/// Payload type byte of an encoded constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConstantType {
    /// 32-bit signed integer
    Integer = 0,
    /// 64-bit float
    Number = 1,
    /// Index into the string table
    String = 2,
    /// Inline string value word
    StringDirect = 3,
    /// Regex flag index and source string index
    Regex = 4,
    /// Regex flag index and inline source value word
    RegexDirect = 5,
    /// Single byte boolean
    Boolean = 6,
}

impl TryFrom<u8> for ConstantType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ConstantType::Integer,
            1 => ConstantType::Number,
            2 => ConstantType::String,
            3 => ConstantType::StringDirect,
            4 => ConstantType::Regex,
            5 => ConstantType::RegexDirect,
            6 => ConstantType::Boolean,
            other => {
                return Err(DecodeError::InvalidConstant(format!(
                    "unknown constant type {other}"
                )))
            }
        })
    }
}

/// One encoded constant, before it is materialised as a [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Integer literal
    Integer(i32),
    /// Floating point literal
    Number(f64),
    /// String literal from the string table
    String(u32),
    /// Inline string literal, stored as its value word
    StringDirect(u32),
    /// Regular expression literal with a table source
    Regex {
        /// Index into the regex flag table
        flags: u32,
        /// Index into the string table
        source: u32,
    },
    /// Regular expression literal with an inline source
    RegexDirect {
        /// Index into the regex flag table
        flags: u32,
        /// Inline string value word
        source: u32,
    },
    /// Boolean literal
    Boolean(bool),
}

impl Constant {
    /// Wire type of this constant.
    pub fn constant_type(&self) -> ConstantType {
        match self {
            Constant::Integer(_) => ConstantType::Integer,
            Constant::Number(_) => ConstantType::Number,
            Constant::String(_) => ConstantType::String,
            Constant::StringDirect(_) => ConstantType::StringDirect,
            Constant::Regex { .. } => ConstantType::Regex,
            Constant::RegexDirect { .. } => ConstantType::RegexDirect,
            Constant::Boolean(_) => ConstantType::Boolean,
        }
    }

    /// Decodes one constant from a constant payload.
    pub fn decode(reader: &mut SectionReader<'_>) -> Result<Self, DecodeError> {
        const CONTEXT: &str = "constant payload";
        let ty = ConstantType::try_from(reader.read_u8(CONTEXT)?)?;
        Ok(match ty {
            ConstantType::Integer => Constant::Integer(reader.read_i32(CONTEXT)?),
            ConstantType::Number => Constant::Number(reader.read_f64(CONTEXT)?),
            ConstantType::String => Constant::String(reader.read_u32(CONTEXT)?),
            ConstantType::StringDirect => Constant::StringDirect(reader.read_u32(CONTEXT)?),
            ConstantType::Regex => Constant::Regex {
                flags: reader.read_u32(CONTEXT)?,
                source: reader.read_u32(CONTEXT)?,
            },
            ConstantType::RegexDirect => Constant::RegexDirect {
                flags: reader.read_u32(CONTEXT)?,
                source: reader.read_u32(CONTEXT)?,
            },
            ConstantType::Boolean => Constant::Boolean(reader.read_u8(CONTEXT)? != 0),
        })
    }

    /// Appends the wire form of this constant.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.constant_type() as u8);
        match *self {
            Constant::Integer(value) => out.extend_from_slice(&value.to_le_bytes()),
            Constant::Number(value) => out.extend_from_slice(&value.to_le_bytes()),
            Constant::String(index) | Constant::StringDirect(index) => {
                out.extend_from_slice(&index.to_le_bytes())
            }
            Constant::Regex { flags, source } | Constant::RegexDirect { flags, source } => {
                out.extend_from_slice(&flags.to_le_bytes());
                out.extend_from_slice(&source.to_le_bytes());
            }
            Constant::Boolean(value) => out.push(u8::from(value)),
        }
    }
}

/// Checks that a raw value word read from a snapshot is an inline string.
pub(crate) fn direct_string(raw: u32) -> Result<Value, DecodeError> {
    let value = Value::from_raw(raw);
    if value.direct_string_kind().is_none() {
        return Err(DecodeError::InvalidConstant(format!(
            "{raw:#x} is not an inline string"
        )));
    }
    Ok(value)
}
