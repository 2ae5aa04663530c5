//! Type conversions and operators
//!
//! Integer operands take the inline fast paths of [`Value`]; everything else
//! goes through the ECMAScript conversion routines here. Conversions that
//! may run script code (`valueOf`/`toString` on objects) take `&mut self`.

use std::rc::Rc;

use bytecode_system::integral_value;
use core_types::{magic_string, magic_string_id, DirectStringKind, JsError, Value, ValueType};

use crate::error::{VmError, VmResult};
use crate::object::ObjectClass;
use crate::vm::{number_to_string, VmContext};

/// Preferred type of [`VmContext::to_primitive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    /// No preference; numbers first
    Default,
    /// Numeric context
    Number,
    /// String context
    String,
}

/// Numeric binary operators sharing one evaluation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
}

/// Integer binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitwise {
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<`
    LeftShift,
    /// `>>`
    RightShift,
    /// `>>>`
    ZeroRightShift,
}

/// Relational operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
}

/// Array index denoted by `text`, if it is a canonical one.
pub(crate) fn canonical_index(text: &str) -> Option<u32> {
    let bytes = text.as_bytes();
    if bytes.is_empty() || bytes.len() > 10 || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    text.parse::<u32>().ok().filter(|index| *index != u32::MAX)
}

/// `StringToNumber`: whitespace-trimmed decimal, hex or `Infinity` literal.
pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    let (sign, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (-1.0, &trimmed[1..]),
        b'+' => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }
    let well_formed = unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !well_formed || !unsigned.bytes().any(|b| b.is_ascii_digit()) {
        return f64::NAN;
    }
    unsigned.parse::<f64>().map(|n| sign * n).unwrap_or(f64::NAN)
}

/// `ToInt32` of a number.
pub fn number_to_int32(number: f64) -> i32 {
    if !number.is_finite() || number == 0.0 {
        return 0;
    }
    let wrapped = number.trunc().rem_euclid(4_294_967_296.0);
    wrapped as u32 as i32
}

impl VmContext {
    /// Number value, inline when integral and in range.
    pub fn new_number(&mut self, number: f64) -> VmResult<Value> {
        match integral_value(number) {
            Some(inline) => Ok(inline),
            None => self.heap.alloc_float(number),
        }
    }

    /// String value. Well-known names and canonical indices are stored
    /// inline.
    pub fn new_string(&mut self, text: &str) -> VmResult<Value> {
        let inline = magic_string_id(text)
            .and_then(|id| Value::make_direct_string(DirectStringKind::Magic, id))
            .or_else(|| {
                canonical_index(text)
                    .and_then(|index| Value::make_direct_string(DirectStringKind::Uint, index))
            });
        match inline {
            Some(value) => Ok(value),
            None => self.heap.alloc_string(Rc::from(text)),
        }
    }

    /// Text of a string value.
    pub fn string_text(&self, value: Value) -> Option<Rc<str>> {
        match value.value_type() {
            ValueType::String => self.heap.string(value),
            ValueType::DirectString => match value.direct_string_kind()? {
                DirectStringKind::Magic => magic_string(value.direct_string_payload()).map(Rc::from),
                DirectStringKind::Uint => Some(Rc::from(value.direct_string_payload().to_string())),
            },
            _ => None,
        }
    }

    /// Numeric value of a number value.
    pub fn number_value(&self, value: Value) -> Option<f64> {
        if value.is_integer() {
            Some(f64::from(value.as_integer()))
        } else {
            self.heap.float(value)
        }
    }

    /// `ToBoolean`.
    pub fn to_boolean(&self, value: Value) -> bool {
        match value {
            Value::TRUE => true,
            Value::FALSE | Value::UNDEFINED | Value::NULL => false,
            _ if value.is_integer() => value.as_integer() != 0,
            _ if value.is_float() => self
                .number_value(value)
                .map_or(false, |n| n != 0.0 && !n.is_nan()),
            _ if value.is_string() => self.string_text(value).map_or(false, |t| !t.is_empty()),
            _ => value.is_object(),
        }
    }

    /// `ToPrimitive`: tries `valueOf` and `toString` in hint order, then
    /// falls back to the object's built-in rendering.
    pub fn to_primitive(&mut self, value: Value, hint: Hint) -> VmResult<Value> {
        if !value.is_object() {
            return Ok(value);
        }
        let order = match hint {
            Hint::String => ["toString", "valueOf"],
            Hint::Default | Hint::Number => ["valueOf", "toString"],
        };
        for name in order {
            let method = self.get(value, name, value)?;
            if self.is_callable(method) {
                let result = self.call(method, value, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        let text = self.default_rendering(value)?;
        self.new_string(&text)
    }

    fn default_rendering(&mut self, value: Value) -> VmResult<String> {
        let class = self.heap.object(value)?.class.clone();
        Ok(match class {
            ObjectClass::Array | ObjectClass::Arguments => {
                let mut parts = Vec::new();
                for element in self.array_elements(value)? {
                    parts.push(if element.is_nullish() {
                        String::new()
                    } else {
                        self.to_js_string(element)?.to_string()
                    });
                }
                parts.join(",")
            }
            ObjectClass::Error(_) => {
                let name = self.get(value, "name", value)?;
                let message = self.get(value, "message", value)?;
                let name = self.to_js_string(name)?;
                let message = self.to_js_string(message)?;
                if message.is_empty() {
                    name.to_string()
                } else {
                    format!("{name}: {message}")
                }
            }
            ObjectClass::Function(_)
            | ObjectClass::ImplicitConstructor
            | ObjectClass::BoundConstructor { .. }
            | ObjectClass::External(_) => "function () { [native code] }".into(),
            ObjectClass::RegExp { source, flags } => {
                let source = self.to_js_string(source)?;
                let flags = self.to_js_string(flags)?;
                format!("/{source}/{flags}")
            }
            ObjectClass::Ordinary | ObjectClass::Declarative => "[object Object]".into(),
        })
    }

    /// `ToNumber`.
    pub fn to_number(&mut self, value: Value) -> VmResult<f64> {
        if let Some(number) = self.number_value(value) {
            return Ok(number);
        }
        Ok(match value {
            Value::UNDEFINED => f64::NAN,
            Value::NULL | Value::FALSE => 0.0,
            Value::TRUE => 1.0,
            _ if value.is_string() => self
                .string_text(value)
                .map_or(f64::NAN, |text| string_to_number(&text)),
            _ if value.is_object() => {
                let primitive = self.to_primitive(value, Hint::Number)?;
                return self.to_number(primitive);
            }
            _ => f64::NAN,
        })
    }

    /// `ToNumber` returning a number value.
    pub fn to_number_value(&mut self, value: Value) -> VmResult<Value> {
        if value.is_number() {
            return Ok(value);
        }
        let number = self.to_number(value)?;
        self.new_number(number)
    }

    /// `ToString`.
    pub fn to_js_string(&mut self, value: Value) -> VmResult<Rc<str>> {
        if let Some(text) = self.string_text(value) {
            return Ok(text);
        }
        if value.is_integer() {
            return Ok(Rc::from(value.as_integer().to_string()));
        }
        if let Some(number) = self.number_value(value) {
            return Ok(Rc::from(number_to_string(number)));
        }
        let fixed = match value {
            Value::TRUE => "true",
            Value::FALSE => "false",
            Value::NULL => "null",
            Value::UNDEFINED => "undefined",
            _ if value.is_object() => {
                let primitive = self.to_primitive(value, Hint::String)?;
                return self.to_js_string(primitive);
            }
            _ => "undefined",
        };
        Ok(Rc::from(fixed))
    }

    /// `ToString` returning a string value.
    pub fn to_string_value(&mut self, value: Value) -> VmResult<Value> {
        if value.is_string() {
            return Ok(value);
        }
        let text = self.to_js_string(value)?;
        self.new_string(&text)
    }

    /// Property key of `value`.
    pub fn to_property_key(&mut self, value: Value) -> VmResult<Rc<str>> {
        if value.is_integer() && value.as_integer() >= 0 {
            return Ok(Rc::from(value.as_integer().to_string()));
        }
        self.to_js_string(value)
    }

    /// `ToInt32`.
    pub fn to_int32(&mut self, value: Value) -> VmResult<i32> {
        if value.is_integer() {
            return Ok(value.as_integer());
        }
        Ok(number_to_int32(self.to_number(value)?))
    }

    /// `ToUint32`.
    pub fn to_uint32(&mut self, value: Value) -> VmResult<u32> {
        Ok(self.to_int32(value)? as u32)
    }

    /// Result of the `typeof` operator.
    pub fn type_of(&self, value: Value) -> VmResult<Value> {
        let name = match value {
            Value::UNDEFINED => "undefined",
            Value::NULL => "object",
            Value::TRUE | Value::FALSE => "boolean",
            _ if value.is_number() => "number",
            _ if value.is_string() => "string",
            _ if self.is_callable(value) => "function",
            _ => "object",
        };
        let id = magic_string_id(name)
            .and_then(|id| Value::make_direct_string(DirectStringKind::Magic, id));
        id.ok_or_else(|| VmError::invariant(format!("{name} is not a magic string")))
    }

    /// Whether `value` is a callable object.
    pub fn is_callable(&self, value: Value) -> bool {
        value.is_object() && self.heap.object(value).map_or(false, |o| o.is_callable())
    }

    /// `===`.
    pub fn strict_equals(&self, left: Value, right: Value) -> bool {
        if left.is_number() && right.is_number() {
            return self.number_value(left) == self.number_value(right);
        }
        if left.is_string() && right.is_string() {
            return left == right || self.string_text(left) == self.string_text(right);
        }
        left == right
    }

    /// `==`.
    pub fn loose_equals(&mut self, left: Value, right: Value) -> VmResult<bool> {
        if left.is_nullish() || right.is_nullish() {
            return Ok(left.is_nullish() && right.is_nullish());
        }
        let same_type = (left.is_number() && right.is_number())
            || (left.is_string() && right.is_string())
            || (left.is_boolean() && right.is_boolean())
            || (left.is_object() && right.is_object());
        if same_type {
            return Ok(self.strict_equals(left, right));
        }
        if left.is_boolean() {
            let left = self.to_number_value(left)?;
            return self.loose_equals(left, right);
        }
        if right.is_boolean() {
            let right = self.to_number_value(right)?;
            return self.loose_equals(left, right);
        }
        if left.is_object() {
            let left = self.to_primitive(left, Hint::Default)?;
            return self.loose_equals(left, right);
        }
        if right.is_object() {
            let right = self.to_primitive(right, Hint::Default)?;
            return self.loose_equals(left, right);
        }
        // number against string
        Ok(self.to_number(left)? == self.to_number(right)?)
    }

    /// Abstract relational comparison `left < right`; `None` when a NaN is
    /// involved.
    fn less_than(&mut self, left: Value, right: Value, left_first: bool) -> VmResult<Option<bool>> {
        let (left, right) = if left_first {
            let left = self.to_primitive(left, Hint::Number)?;
            (left, self.to_primitive(right, Hint::Number)?)
        } else {
            let right = self.to_primitive(right, Hint::Number)?;
            (self.to_primitive(left, Hint::Number)?, right)
        };
        if left.is_string() && right.is_string() {
            let left = self.to_js_string(left)?;
            let right = self.to_js_string(right)?;
            return Ok(Some(left.encode_utf16().lt(right.encode_utf16())));
        }
        if left.is_integer() && right.is_integer() {
            return Ok(Some(left.as_integer() < right.as_integer()));
        }
        let left = self.to_number(left)?;
        let right = self.to_number(right)?;
        if left.is_nan() || right.is_nan() {
            return Ok(None);
        }
        Ok(Some(left < right))
    }

    /// Evaluates a relational operator.
    pub fn compare(&mut self, relation: Relation, left: Value, right: Value) -> VmResult<bool> {
        Ok(match relation {
            Relation::Less => self.less_than(left, right, true)? == Some(true),
            Relation::Greater => self.less_than(right, left, false)? == Some(true),
            Relation::LessEqual => self.less_than(right, left, false)? == Some(false),
            Relation::GreaterEqual => self.less_than(left, right, true)? == Some(false),
        })
    }

    /// `+`: integer fast path, then numbers, then string concatenation.
    pub fn add(&mut self, left: Value, right: Value) -> VmResult<Value> {
        if let Some(sum) = left.int_add(right) {
            return Ok(sum);
        }
        if let (Some(l), Some(r)) = (self.number_value(left), self.number_value(right)) {
            return self.new_number(l + r);
        }
        let left = self.to_primitive(left, Hint::Default)?;
        let right = self.to_primitive(right, Hint::Default)?;
        if left.is_string() || right.is_string() {
            let mut text = self.to_js_string(left)?.to_string();
            text.push_str(&self.to_js_string(right)?);
            return self.new_string(&text);
        }
        let sum = self.to_number(left)? + self.to_number(right)?;
        self.new_number(sum)
    }

    /// `-`, `*`, `/` and `%`.
    pub fn arithmetic(&mut self, op: Arithmetic, left: Value, right: Value) -> VmResult<Value> {
        let fast = match op {
            Arithmetic::Sub => left.int_sub(right),
            Arithmetic::Mul => left.int_mul(right),
            Arithmetic::Mod => left.int_mod(right),
            Arithmetic::Div => None,
        };
        if let Some(result) = fast {
            return Ok(result);
        }
        let l = self.to_number(left)?;
        let r = self.to_number(right)?;
        let result = match op {
            Arithmetic::Sub => l - r,
            Arithmetic::Mul => l * r,
            Arithmetic::Div => l / r,
            Arithmetic::Mod => l % r,
        };
        self.new_number(result)
    }

    /// Bitwise and shift operators.
    pub fn bitwise(&mut self, op: Bitwise, left: Value, right: Value) -> VmResult<Value> {
        let l = self.to_int32(left)?;
        let r = self.to_int32(right)?;
        let shift = (r as u32) & 31;
        let result = match op {
            Bitwise::And => f64::from(l & r),
            Bitwise::Or => f64::from(l | r),
            Bitwise::Xor => f64::from(l ^ r),
            Bitwise::LeftShift => f64::from(l.wrapping_shl(shift)),
            Bitwise::RightShift => f64::from(l >> shift),
            Bitwise::ZeroRightShift => f64::from((l as u32) >> shift),
        };
        self.new_number(result)
    }

    /// `~`.
    pub fn bit_not(&mut self, value: Value) -> VmResult<Value> {
        let operand = self.to_int32(value)?;
        self.new_number(f64::from(!operand))
    }

    /// `value instanceof constructor`.
    pub fn instance_of(&mut self, value: Value, constructor: Value) -> VmResult<bool> {
        if !constructor.is_object() {
            return Err(self.throw_error(JsError::type_error(
                "Expected an object in 'instanceof' check.",
            )));
        }
        let mut target = constructor;
        if let ObjectClass::BoundConstructor { target: bound } = self.heap.object(constructor)?.class {
            target = bound;
        }
        if !self.is_callable(target) {
            return Err(self.throw_error(JsError::type_error(
                "Expected a function object in 'instanceof' check.",
            )));
        }
        if !value.is_object() {
            return Ok(false);
        }
        let prototype = self.get(target, "prototype", target)?;
        if !prototype.is_object() {
            return Err(self.throw_error(JsError::type_error(
                "Function has non-object prototype in instanceof check",
            )));
        }
        let mut current = self.heap.proto(value)?;
        while current.is_object() {
            if current == prototype {
                return Ok(true);
            }
            current = self.heap.proto(current)?;
        }
        Ok(false)
    }

    /// `key in object`.
    pub fn has_in(&mut self, key: Value, object: Value) -> VmResult<bool> {
        if !object.is_object() {
            return Err(self.throw_error(JsError::type_error("Expected an object in 'in' check.")));
        }
        let name = self.to_property_key(key)?;
        self.has_property(object, &name)
    }
}
