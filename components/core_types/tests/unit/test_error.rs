//! Unit tests for error kinds and native errors

use core_types::{ErrorKind, JsError};

#[test]
fn test_error_kind_display_matches_constructor_name() {
    assert_eq!(ErrorKind::TypeError.to_string(), "TypeError");
    assert_eq!(ErrorKind::Error.to_string(), "Error");
}

#[test]
fn test_shorthand_constructors() {
    assert_eq!(JsError::common("x").kind, ErrorKind::Error);
    assert_eq!(JsError::type_error("x").kind, ErrorKind::TypeError);
    assert_eq!(JsError::reference_error("x").kind, ErrorKind::ReferenceError);
    assert_eq!(JsError::range_error("x").kind, ErrorKind::RangeError);
}

#[test]
fn test_js_error_is_std_error() {
    let error: Box<dyn std::error::Error> = Box::new(JsError::range_error("too deep"));
    assert_eq!(error.to_string(), "RangeError: too deep");
}
