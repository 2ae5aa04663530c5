//! Well-known names addressable by inline (magic) strings.

/// Table of names a [`DirectStringKind::Magic`](crate::DirectStringKind::Magic) value can index.
pub const MAGIC_STRINGS: &[&str] = &[
    "",
    "length",
    "prototype",
    "constructor",
    "undefined",
    "null",
    "true",
    "false",
    "number",
    "string",
    "boolean",
    "object",
    "function",
    "symbol",
    "arguments",
    "caller",
    "callee",
    "name",
    "message",
    "toString",
    "valueOf",
    "get",
    "set",
    "value",
    "writable",
    "enumerable",
    "configurable",
    "__proto__",
    "NaN",
    "Infinity",
    "Error",
    "TypeError",
    "ReferenceError",
    "RangeError",
    "SyntaxError",
    "EvalError",
    "URIError",
    "Object",
    "Array",
    "Function",
    "String",
    "Number",
    "Boolean",
    "RegExp",
    "Math",
    "JSON",
    "source",
    "flags",
    "global",
    "index",
    "input",
    "lastIndex",
];

/// Name stored at `id`, if any.
pub fn magic_string(id: u32) -> Option<&'static str> {
    MAGIC_STRINGS.get(id as usize).copied()
}

/// Table index of `name`, if it is a well-known name.
pub fn magic_string_id(name: &str) -> Option<u32> {
    MAGIC_STRINGS
        .iter()
        .position(|candidate| *candidate == name)
        .map(|index| index as u32)
}
