//! Materialising constants.
//!
//! The loader does not own a heap. Numbers that do not fit the inline
//! integer range, strings and regular expressions are handed to a
//! [`LiteralAllocator`], which the embedding context implements on top of
//! its managed heap.

use core_types::{
    magic_string, CompressedPointer, DirectStringKind, PointerKind, Value, ValueType,
};

use crate::error::DecodeError;

/// Creates heap values for constants.
pub trait LiteralAllocator {
    /// A number value. Implementations may return an inline integer.
    fn number(&mut self, value: f64) -> Result<Value, DecodeError>;

    /// A string value.
    fn string(&mut self, text: &str) -> Result<Value, DecodeError>;

    /// A regular expression object from string `source` and `flags` values.
    fn regexp(&mut self, source: Value, flags: Value) -> Result<Value, DecodeError>;
}

/// Inline integer for `value` when it is integral and in range.
///
/// Negative zero is never folded.
pub fn integral_value(value: f64) -> Option<Value> {
    if value.fract() != 0.0 || (value == 0.0 && value.is_sign_negative()) {
        return None;
    }
    if !value.is_finite() || value.abs() > f64::from(i32::MAX) {
        return None;
    }
    Value::try_integer(value as i64)
}

/// A self-contained [`LiteralAllocator`] for tools that load snapshots
/// without running them, such as disassemblers and tests.
///
/// Pointer values it hands out index its own tables and are meaningless to
/// any other heap.
#[derive(Debug, Default)]
pub struct LiteralPool {
    strings: Vec<String>,
    numbers: Vec<f64>,
    regexps: Vec<(Value, Value)>,
}

impl LiteralPool {
    /// Empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    fn pointer(kind: PointerKind, index: usize) -> Result<Value, DecodeError> {
        u32::try_from(index + 1)
            .ok()
            .and_then(CompressedPointer::new)
            .map(|cp| Value::from_pointer(kind, cp))
            .ok_or_else(|| DecodeError::InvalidConstant("literal pool exhausted".into()))
    }

    fn slot(value: Value) -> Option<usize> {
        value.compressed_pointer().map(|cp| cp.get() as usize - 1)
    }

    /// Text of a string value created by this pool or of an inline string.
    pub fn string_text(&self, value: Value) -> Option<String> {
        match value.value_type() {
            ValueType::String => Self::slot(value).and_then(|i| self.strings.get(i).cloned()),
            ValueType::DirectString => match value.direct_string_kind()? {
                DirectStringKind::Magic => {
                    magic_string(value.direct_string_payload()).map(str::to_owned)
                }
                DirectStringKind::Uint => Some(value.direct_string_payload().to_string()),
            },
            _ => None,
        }
    }

    /// Numeric value of an inline integer or a number created by this pool.
    pub fn number_value(&self, value: Value) -> Option<f64> {
        if value.is_integer() {
            return Some(f64::from(value.as_integer()));
        }
        if value.is_float() {
            return Self::slot(value).and_then(|i| self.numbers.get(i).copied());
        }
        None
    }

    /// Renders a constant for listings.
    pub fn describe(&self, value: Value) -> String {
        if let Some(number) = self.number_value(value) {
            return number.to_string();
        }
        if let Some(text) = self.string_text(value) {
            return format!("{text:?}");
        }
        if value.is_object() {
            if let Some((source, flags)) = Self::slot(value).and_then(|i| self.regexps.get(i)) {
                return format!(
                    "/{}/{}",
                    self.string_text(*source).unwrap_or_default(),
                    self.string_text(*flags).unwrap_or_default()
                );
            }
        }
        match value {
            Value::TRUE => "true".into(),
            Value::FALSE => "false".into(),
            Value::UNDEFINED => "undefined".into(),
            Value::NULL => "null".into(),
            other => format!("{other:?}"),
        }
    }
}

impl LiteralAllocator for LiteralPool {
    fn number(&mut self, value: f64) -> Result<Value, DecodeError> {
        if let Some(inline) = integral_value(value) {
            return Ok(inline);
        }
        self.numbers.push(value);
        Self::pointer(PointerKind::Float, self.numbers.len() - 1)
    }

    fn string(&mut self, text: &str) -> Result<Value, DecodeError> {
        self.strings.push(text.to_owned());
        Self::pointer(PointerKind::String, self.strings.len() - 1)
    }

    fn regexp(&mut self, source: Value, flags: Value) -> Result<Value, DecodeError> {
        self.regexps.push((source, flags));
        Self::pointer(PointerKind::Object, self.regexps.len() - 1)
    }
}
