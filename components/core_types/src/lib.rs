//! Core value encoding and error types for the bytecode VM.
//!
//! This crate provides the foundational types shared by every other
//! component: the tagged 32-bit value word, compressed heap pointers,
//! script error kinds and call stack snapshots.
//!
//! # Overview
//!
//! - [`Value`] - Tagged 32-bit value word
//! - [`CompressedPointer`] - Heap-relative pointer carried by values
//! - [`JsError`] - Error raised by a native operation
//! - [`ErrorKind`] - Types of script errors
//! - [`Backtrace`] - Active frames reported to a debugger
//!
//! # Examples
//!
//! ```
//! use core_types::{Value, JsError, ErrorKind};
//!
//! let answer = Value::make_integer(6).int_mul(Value::make_integer(7)).unwrap();
//! assert_eq!(answer.as_integer(), 42);
//!
//! let error = JsError::type_error("undefined is not a function");
//! assert_eq!(error.kind, ErrorKind::TypeError);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod backtrace;
mod error;
mod magic;
mod value;

pub use backtrace::{Backtrace, StackFrame};
pub use error::{ErrorKind, JsError};
pub use magic::{magic_string, magic_string_id, MAGIC_STRINGS};
pub use value::{
    CompressedPointer, DirectStringKind, PointerKind, Value, ValueType, DIRECT_SHIFT,
    DIRECT_STRING_MAX_PAYLOAD, INTEGER_MULTIPLY_MAX, INTEGER_NUMBER_MAX, INTEGER_NUMBER_MIN,
    VALUE_SHIFT,
};
