//! Contract compliance tests for core_types
//!
//! The raw encoding is part of the bytecode wire format (direct string
//! constants are stored as raw words), so these values must not change.

use core_types::{DirectStringKind, Value};

#[test]
fn test_simple_value_raw_words() {
    assert_eq!(Value::EMPTY.raw(), 0x08);
    assert_eq!(Value::FALSE.raw(), 0x28);
    assert_eq!(Value::TRUE.raw(), 0x38);
    assert_eq!(Value::UNDEFINED.raw(), 0x48);
    assert_eq!(Value::NULL.raw(), 0x58);
}

#[test]
fn test_direct_string_raw_word() {
    let v = Value::make_direct_string(DirectStringKind::Magic, 3).unwrap();
    assert_eq!(v.raw(), (3 << 5) | (1 << 3) | 5);
    assert_eq!(Value::from_raw(v.raw()), v);
}
