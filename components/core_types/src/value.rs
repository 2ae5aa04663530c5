//! Tagged 32-bit value word.
//!
//! Every script value fits in a single `u32`. The low three bits select the
//! type; the remaining bits are either inline data (integers, simple values,
//! direct strings) or a compressed heap pointer.
//!
//! ```text
//!  31                                   4   3   2..0
//! +--------------------------------------+---+------+
//! | integer payload (signed)             | 0 | 000  |  integer
//! | simple value id                      | 1 | 000  |  undefined/null/true/...
//! | compressed pointer             (29 bits)  | tag  |  string/float/object
//! | direct string payload (27) | kind(2)      | 101  |  direct string
//! +--------------------------------------+---+------+
//! ```
//!
//! Integer arithmetic helpers operate on the inline encoding and report
//! `None` when the result must be boxed instead.

use std::fmt;
use std::num::NonZeroU32;

/// Mask selecting the type tag bits.
pub const VALUE_TYPE_MASK: u32 = 0x7;
/// Number of tag bits below a compressed pointer.
pub const VALUE_SHIFT: u32 = 3;
/// Shift of the payload in direct (inline) values.
pub const DIRECT_SHIFT: u32 = 4;
/// Mask of the bits that classify a direct value.
pub const DIRECT_TYPE_MASK: u32 = (1 << DIRECT_SHIFT) - 1;
/// Low bits of an inline integer.
pub const DIRECT_TYPE_INTEGER: u32 = 0;
/// Low bits of a simple value.
pub const DIRECT_TYPE_SIMPLE: u32 = 1 << VALUE_SHIFT;
/// Shift of the payload in a direct string.
pub const DIRECT_STRING_SHIFT: u32 = VALUE_SHIFT + 2;
/// Largest payload a direct string can carry.
pub const DIRECT_STRING_MAX_PAYLOAD: u32 = u32::MAX >> DIRECT_STRING_SHIFT;

/// Largest integer stored inline.
pub const INTEGER_NUMBER_MAX: i32 = 0x7ff_ffff;
/// Smallest integer stored inline.
pub const INTEGER_NUMBER_MIN: i32 = -0x7ff_ffff;
/// Operand bound for the multiplication fast path.
///
/// Products of two operands within this bound always fit the inline range.
pub const INTEGER_MULTIPLY_MAX: i32 = 0x2d41;

const _: () = assert!(INTEGER_MULTIPLY_MAX * INTEGER_MULTIPLY_MAX <= INTEGER_NUMBER_MAX);

/// The type selected by the low tag bits of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// Inline integer or simple value
    Direct = 0,
    /// Heap string
    String = 1,
    /// Boxed floating point number
    Float = 2,
    /// Heap object
    Object = 3,
    /// Symbol (reserved, never produced by this engine)
    Symbol = 4,
    /// String stored inline
    DirectString = 5,
    /// Error reference
    Error = 7,
}

impl ValueType {
    /// Classifies a raw tag, returning `None` for the unassigned tag 6.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag & VALUE_TYPE_MASK {
            0 => Some(ValueType::Direct),
            1 => Some(ValueType::String),
            2 => Some(ValueType::Float),
            3 => Some(ValueType::Object),
            4 => Some(ValueType::Symbol),
            5 => Some(ValueType::DirectString),
            7 => Some(ValueType::Error),
            _ => None,
        }
    }
}

/// Heap-pointer flavours a [`Value`] can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// A heap string cell
    String,
    /// A boxed number cell
    Float,
    /// An object cell
    Object,
}

impl PointerKind {
    fn tag(self) -> u32 {
        match self {
            PointerKind::String => ValueType::String as u32,
            PointerKind::Float => ValueType::Float as u32,
            PointerKind::Object => ValueType::Object as u32,
        }
    }
}

/// Kinds of inline strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DirectStringKind {
    /// Index into the well-known name table (see [`crate::magic_string`])
    Magic = 1,
    /// A canonical unsigned integer string such as `"42"`
    Uint = 2,
}

impl DirectStringKind {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(DirectStringKind::Magic),
            2 => Some(DirectStringKind::Uint),
            _ => None,
        }
    }
}

/// A heap-relative pointer shifted right by the allocation alignment.
///
/// The value is never zero; zero is reserved for "no pointer" in the
/// surrounding data structures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompressedPointer(NonZeroU32);

impl CompressedPointer {
    /// Largest compressed pointer that still fits a [`Value`].
    pub const MAX: u32 = u32::MAX >> VALUE_SHIFT;

    /// Wraps a raw compressed pointer.
    ///
    /// Returns `None` for zero and for values too large to be tagged.
    pub fn new(raw: u32) -> Option<Self> {
        if raw > Self::MAX {
            return None;
        }
        NonZeroU32::new(raw).map(CompressedPointer)
    }

    /// Raw compressed value.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for CompressedPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cp#{}", self.0)
    }
}

/// A script value packed into 32 bits.
///
/// `Value` is `Copy`; heap cells referenced by pointer values are owned by the
/// managed heap of the VM context that produced them.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let n = Value::make_integer(21);
/// let sum = n.int_add(n).unwrap();
/// assert_eq!(sum.as_integer(), 42);
/// assert!(Value::UNDEFINED.is_undefined());
/// assert!(!Value::FALSE.is_true());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u32);

const fn simple(id: u32) -> Value {
    Value((id << DIRECT_SHIFT) | DIRECT_TYPE_SIMPLE)
}

impl Value {
    /// Marker for "no value" (empty completion, uninitialised slot).
    pub const EMPTY: Value = simple(0);
    /// Marker for an error completion.
    pub const ERROR: Value = simple(1);
    /// `false`
    pub const FALSE: Value = simple(2);
    /// `true`
    pub const TRUE: Value = simple(3);
    /// `undefined`
    pub const UNDEFINED: Value = simple(4);
    /// `null`
    pub const NULL: Value = simple(5);
    /// A hole in a sparse array.
    pub const ARRAY_HOLE: Value = simple(6);
    /// Result of a failed property lookup.
    pub const NOT_FOUND: Value = simple(7);
    /// Marker for a register reference.
    pub const REGISTER_REF: Value = simple(8);
    /// `this` placeholder of an implicit constructor.
    pub const IMPLICIT_CONSTRUCTOR: Value = simple(9);

    /// Reinterprets a raw word without validation.
    pub const fn from_raw(raw: u32) -> Self {
        Value(raw)
    }

    /// Raw encoded word.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Type selected by the tag bits. The unassigned tag is reported as [`ValueType::Error`].
    pub fn value_type(self) -> ValueType {
        ValueType::from_tag(self.0).unwrap_or(ValueType::Error)
    }

    /// Whether the value is stored inline (integer or simple value).
    pub fn is_direct(self) -> bool {
        self.0 & VALUE_TYPE_MASK == ValueType::Direct as u32
    }

    /// Whether the value is an inline integer.
    pub fn is_integer(self) -> bool {
        self.0 & DIRECT_TYPE_MASK == DIRECT_TYPE_INTEGER
    }

    /// Whether the value is a simple value (undefined, null, booleans, markers).
    pub fn is_simple(self) -> bool {
        self.0 & DIRECT_TYPE_MASK == DIRECT_TYPE_SIMPLE
    }

    /// Whether the value references a boxed float.
    pub fn is_float(self) -> bool {
        self.0 & VALUE_TYPE_MASK == ValueType::Float as u32
    }

    /// Whether the value is a number (inline integer or boxed float).
    pub fn is_number(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Whether the value references a heap string.
    pub fn is_heap_string(self) -> bool {
        self.0 & VALUE_TYPE_MASK == ValueType::String as u32
    }

    /// Whether the value is an inline string.
    pub fn is_direct_string(self) -> bool {
        self.0 & VALUE_TYPE_MASK == ValueType::DirectString as u32
    }

    /// Whether the value is a string of either representation.
    pub fn is_string(self) -> bool {
        self.is_heap_string() || self.is_direct_string()
    }

    /// Whether the value references an object.
    pub fn is_object(self) -> bool {
        self.0 & VALUE_TYPE_MASK == ValueType::Object as u32
    }

    /// Whether the value is `true` or `false`.
    pub fn is_boolean(self) -> bool {
        (self.0 & !(1 << DIRECT_SHIFT)) == Value::FALSE.0
    }

    /// Whether the value is exactly `true`.
    pub fn is_true(self) -> bool {
        self == Value::TRUE
    }

    /// Whether the value is `undefined`.
    pub fn is_undefined(self) -> bool {
        self == Value::UNDEFINED
    }

    /// Whether the value is `null`.
    pub fn is_null(self) -> bool {
        self == Value::NULL
    }

    /// Whether the value is `undefined` or `null`.
    pub fn is_nullish(self) -> bool {
        self.is_undefined() || self.is_null()
    }

    /// Whether the value is the empty marker.
    pub fn is_empty(self) -> bool {
        self == Value::EMPTY
    }

    /// Builds a boolean value.
    pub fn make_boolean(b: bool) -> Self {
        if b {
            Value::TRUE
        } else {
            Value::FALSE
        }
    }

    /// Builds an inline integer.
    ///
    /// The caller guarantees the value lies in
    /// `[INTEGER_NUMBER_MIN, INTEGER_NUMBER_MAX]`; use [`Value::try_integer`]
    /// when that is not known.
    pub fn make_integer(value: i32) -> Self {
        debug_assert!((INTEGER_NUMBER_MIN..=INTEGER_NUMBER_MAX).contains(&value));
        Value((value << DIRECT_SHIFT) as u32)
    }

    /// Builds an inline integer when `value` is inside the inline range.
    pub fn try_integer(value: i64) -> Option<Self> {
        if (INTEGER_NUMBER_MIN as i64..=INTEGER_NUMBER_MAX as i64).contains(&value) {
            Some(Value::make_integer(value as i32))
        } else {
            None
        }
    }

    /// Decodes an inline integer. Meaningless for non-integer values.
    pub fn as_integer(self) -> i32 {
        debug_assert!(self.is_integer());
        (self.0 as i32) >> DIRECT_SHIFT
    }

    /// Builds a pointer value.
    pub fn from_pointer(kind: PointerKind, cp: CompressedPointer) -> Self {
        Value((cp.get() << VALUE_SHIFT) | kind.tag())
    }

    /// Compressed pointer of string, float and object values.
    pub fn compressed_pointer(self) -> Option<CompressedPointer> {
        match self.value_type() {
            ValueType::String | ValueType::Float | ValueType::Object => {
                CompressedPointer::new(self.0 >> VALUE_SHIFT)
            }
            _ => None,
        }
    }

    /// Builds an inline string. Returns `None` when the payload does not fit.
    pub fn make_direct_string(kind: DirectStringKind, payload: u32) -> Option<Self> {
        if payload > DIRECT_STRING_MAX_PAYLOAD {
            return None;
        }
        Some(Value(
            (payload << DIRECT_STRING_SHIFT)
                | ((kind as u32) << VALUE_SHIFT)
                | ValueType::DirectString as u32,
        ))
    }

    /// Kind of an inline string, or `None` for other values and unsupported kinds.
    pub fn direct_string_kind(self) -> Option<DirectStringKind> {
        if !self.is_direct_string() {
            return None;
        }
        DirectStringKind::from_bits((self.0 >> VALUE_SHIFT) & 0x3)
    }

    /// Payload of an inline string.
    pub fn direct_string_payload(self) -> u32 {
        self.0 >> DIRECT_STRING_SHIFT
    }

    /// Integer addition on the inline encoding.
    ///
    /// Returns `None` when either operand is not an inline integer or the sum
    /// leaves the inline range.
    pub fn int_add(self, other: Value) -> Option<Value> {
        if !(self.is_integer() && other.is_integer()) {
            return None;
        }
        Value::try_integer(self.as_integer() as i64 + other.as_integer() as i64)
    }

    /// Integer subtraction on the inline encoding.
    pub fn int_sub(self, other: Value) -> Option<Value> {
        if !(self.is_integer() && other.is_integer()) {
            return None;
        }
        Value::try_integer(self.as_integer() as i64 - other.as_integer() as i64)
    }

    /// Integer multiplication on the inline encoding.
    ///
    /// Only taken when both operands are nonzero and bounded by
    /// [`INTEGER_MULTIPLY_MAX`], which keeps `-0` off the fast path.
    pub fn int_mul(self, other: Value) -> Option<Value> {
        if !(self.is_integer() && other.is_integer()) {
            return None;
        }
        let (a, b) = (self.as_integer(), other.as_integer());
        if a == 0 || b == 0 || a.abs() > INTEGER_MULTIPLY_MAX || b.abs() > INTEGER_MULTIPLY_MAX {
            return None;
        }
        Value::try_integer(i64::from(a) * i64::from(b))
    }

    /// Integer remainder on the inline encoding.
    ///
    /// Declines a zero divisor and results that would be `-0`.
    pub fn int_mod(self, other: Value) -> Option<Value> {
        if !(self.is_integer() && other.is_integer()) {
            return None;
        }
        let (a, b) = (self.as_integer(), other.as_integer());
        if b == 0 {
            return None;
        }
        let r = a % b;
        if r == 0 && a < 0 {
            return None;
        }
        Some(Value::make_integer(r))
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::UNDEFINED
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value_type() {
            ValueType::Direct if self.is_integer() => {
                f.debug_tuple("Integer").field(&self.as_integer()).finish()
            }
            ValueType::Direct => {
                let name = match *self {
                    Value::EMPTY => "empty",
                    Value::ERROR => "error",
                    Value::FALSE => "false",
                    Value::TRUE => "true",
                    Value::UNDEFINED => "undefined",
                    Value::NULL => "null",
                    Value::ARRAY_HOLE => "hole",
                    Value::NOT_FOUND => "not_found",
                    Value::REGISTER_REF => "register_ref",
                    Value::IMPLICIT_CONSTRUCTOR => "implicit_constructor",
                    _ => "simple?",
                };
                write!(f, "Simple({})", name)
            }
            ValueType::DirectString => f
                .debug_struct("DirectString")
                .field("kind", &self.direct_string_kind())
                .field("payload", &self.direct_string_payload())
                .finish(),
            other => write!(f, "{:?}({:#x})", other, self.0 >> VALUE_SHIFT),
        }
    }
}
