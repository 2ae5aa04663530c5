//! Contract tests for interpreter API
//!
//! These tests pin the embedding surface: construction, loading, host
//! functions, globals and value rendering.

use bytecode_system::{Constant, DecodeError, FunctionRecord, Instruction, OpCode, SnapshotWriter};
use core_types::{ErrorKind, JsError, Value};
use interpreter::{CallKind, Hint, VmConfig, VmContext, VmError};

/// Test VmContext::new() installs the global environment
#[test]
fn test_vm_new_contract() {
    let mut vm = VmContext::new().unwrap();
    assert!(vm.global().is_object());
    assert_eq!(vm.get_global("undefined").unwrap(), Some(Value::UNDEFINED));
    assert_eq!(vm.get_global("globalThis").unwrap(), Some(vm.global()));
    for kind in ErrorKind::ALL {
        let constructor = vm.get_global(kind.name()).unwrap();
        assert!(constructor.is_some(), "{} is installed", kind.name());
    }
    assert_eq!(vm.call_depth(), 0);
}

/// Test VmContext::load() rejects input that is not a snapshot
#[test]
fn test_vm_load_rejects_garbage_contract() {
    let mut vm = VmContext::new().unwrap();
    let err = vm.load(&[]).unwrap_err();
    assert!(matches!(err, VmError::Decode(DecodeError::Empty)));
    assert!(!err.is_catchable());
}

/// Test VmContext::execute() returns the program's completion value
#[test]
fn test_vm_execute_contract() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        stack_size: 2,
        constants: vec![Constant::Number(2.5)],
        instructions: vec![
            Instruction::abx(OpCode::LoadK, 1, 0),
            Instruction::abc(OpCode::Return1, 1, 0, 0),
        ],
        ..FunctionRecord::root()
    });
    let mut vm = VmContext::new().unwrap();
    let program = vm.load(&writer.finish()).unwrap();
    let result = vm.execute(&program).unwrap();
    assert_eq!(vm.number_value(result), Some(2.5));
    // a program can run more than once
    let again = vm.execute(&program).unwrap();
    assert_eq!(vm.number_value(again), Some(2.5));
}

/// Test VmContext::set_global() and get_global() round trip
#[test]
fn test_vm_globals_contract() {
    let mut vm = VmContext::new().unwrap();
    assert_eq!(vm.get_global("missing").unwrap(), None);
    vm.set_global("answer", Value::make_integer(42)).unwrap();
    assert_eq!(vm.get_global("answer").unwrap(), Some(Value::make_integer(42)));
}

/// Test register_external() returns a callable global
#[test]
fn test_register_external_contract() {
    let mut vm = VmContext::new().unwrap();
    let function = vm
        .register_external("argc", |_vm, _this, args| Ok(Value::make_integer(args.len() as i32)))
        .unwrap();
    assert_eq!(vm.get_global("argc").unwrap(), Some(function));
    assert!(vm.is_callable(function));
    assert_eq!(vm.describe(function), "[function argc]");
    let result = vm
        .invoke(CallKind::Call, function, Value::UNDEFINED, &[Value::TRUE, Value::NULL])
        .unwrap();
    assert_eq!(result, Value::make_integer(2));
}

/// Test errors raised by host functions reach the embedder as Throw
#[test]
fn test_external_errors_contract() {
    let mut vm = VmContext::new().unwrap();
    let failing = vm
        .register_external("fail", |vm, _this, _args| {
            Err(vm.throw_error(JsError::range_error("out of range")))
        })
        .unwrap();
    let err = vm.call(failing, Value::UNDEFINED, &[]).unwrap_err();
    assert!(err.is_catchable());
    assert_eq!(vm.describe_thrown(&err), "RangeError: out of range");
}

/// Test describe() renders without running scripts
#[test]
fn test_describe_contract() {
    let mut vm = VmContext::new().unwrap();
    let text = vm.new_string("text").unwrap();
    let array = vm.new_array(&[Value::make_integer(1), Value::UNDEFINED, Value::TRUE]).unwrap();
    let object = vm.new_object().unwrap();
    let error = vm.new_error(JsError::type_error("bad")).unwrap();
    let half = vm.new_number(0.5).unwrap();

    assert_eq!(vm.describe(text), "text");
    assert_eq!(vm.describe(array), "[1,,true]");
    assert_eq!(vm.describe(object), "[object Object]");
    assert_eq!(vm.describe(error), "TypeError: bad");
    assert_eq!(vm.describe(half), "0.5");
    assert_eq!(vm.describe(Value::NULL), "null");
}

/// Test to_primitive() on built-in objects
#[test]
fn test_to_primitive_contract() {
    let mut vm = VmContext::new().unwrap();
    let array = vm.new_array(&[Value::make_integer(1), Value::make_integer(2)]).unwrap();
    let primitive = vm.to_primitive(array, Hint::String).unwrap();
    assert_eq!(vm.string_text(primitive).as_deref(), Some("1,2"));
    let object = vm.new_object().unwrap();
    assert_eq!(vm.to_js_string(object).unwrap().as_ref(), "[object Object]");
}

/// Test VmConfig limits are honoured
#[test]
fn test_config_contract() {
    let config = VmConfig {
        max_call_depth: 8,
        ..VmConfig::default()
    };
    let vm = VmContext::with_config(config.clone()).unwrap();
    assert_eq!(vm.config(), &config);

    let tiny = VmConfig {
        heap_size: 64,
        heap_desired_limit: 64,
        ..VmConfig::default()
    };
    assert!(matches!(VmContext::with_config(tiny), Err(VmError::OutOfMemory)));
}

/// Test heap statistics grow with allocation
#[test]
fn test_heap_stats_contract() {
    let mut vm = VmContext::new().unwrap();
    let before = vm.heap_stats();
    let cells = vm.live_cells();
    vm.new_string("a string long enough to live on the heap").unwrap();
    vm.new_object().unwrap();
    assert_eq!(vm.live_cells(), cells + 2);
    assert!(vm.heap_stats().allocated_bytes > before.allocated_bytes);
    assert_eq!(vm.heap_stats().size, VmConfig::default().heap_size);
}

/// Test backtrace() is empty outside of script execution
#[test]
fn test_backtrace_contract() {
    let vm = VmContext::new().unwrap();
    assert_eq!(vm.backtrace().depth(), 0);
    assert!(vm.backtrace().top().is_none());
}
