//! Integration tests for interpreter
//!
//! Whole programs built with the snapshot writer: closures across frames,
//! exception regions, calls into script and host functions, classes, and
//! the host polling hooks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bytecode_system::{Constant, FunctionFlags, FunctionRecord, Instruction, OpCode, SnapshotWriter};
use core_types::{Backtrace, Value};
use interpreter::{DebuggerHooks, VmConfig, VmContext, VmError, VmResult};
use proptest::prelude::*;

fn eval_in(vm: &mut VmContext, writer: SnapshotWriter) -> VmResult<Value> {
    let program = vm.load(&writer.finish()).unwrap();
    vm.execute(&program)
}

fn eval(writer: SnapshotWriter) -> (VmContext, VmResult<Value>) {
    let mut vm = VmContext::new().unwrap();
    let result = eval_in(&mut vm, writer);
    (vm, result)
}

fn load(a: u32, k: u32) -> Instruction {
    Instruction::abx(OpCode::LoadK, a, k)
}

fn ret(a: u32) -> Instruction {
    Instruction::abc(OpCode::Return1, a, 0, 0)
}

/// `CALL` with the callee in `base`, `this` in `base + 1` and the unfold
/// marker in `base + 2`.
fn call(result: u32, argc: u32, base: u32) -> Instruction {
    Instruction::abc(OpCode::Call, result, argc, base)
}

fn pop_end() -> Instruction {
    Instruction::abc(OpCode::PopContext, 0, 0, 0)
}

// ============================================================================
// Closures
// ============================================================================

/// Root keeps a counter in captured r1 and calls a child `calls` times; the
/// child increments the counter through its own binding of the cell.
fn counter_program(start: i32, calls: usize) -> SnapshotWriter {
    let mut writer = SnapshotWriter::new();
    let mut code = vec![
        Instruction::abc(OpCode::OutClosure, 1, 0, 0),
        load(1, 0),
        Instruction::abc(OpCode::New, 2, 2, 0),
    ];
    for _ in 0..calls {
        code.push(call(5, 0, 2));
    }
    code.push(ret(1));
    let root = writer.add_function(FunctionRecord {
        stack_size: 6,
        constants: vec![Constant::Integer(start)],
        instructions: code,
        ..FunctionRecord::root()
    });
    let slot = writer.add_value_ref(root, 1);
    writer.function_mut(root).unwrap().out_closure.push(slot);
    writer.add_function(FunctionRecord {
        stack_size: 3,
        in_closure: vec![(slot, 1)],
        instructions: vec![Instruction::abc(OpCode::PreIncr, 1, 2, 0), ret(2)],
        ..FunctionRecord::child(root)
    });
    writer
}

#[test]
fn test_closure_writes_are_seen_by_creator() {
    let (_, result) = eval(counter_program(10, 2));
    assert_eq!(result.unwrap(), Value::make_integer(12));
}

#[test]
fn test_closure_reads_through_intermediate_function() {
    // root: r1 captured; outer (child 0) binds it as r1 and creates inner,
    // which binds the same variable as r2 and doubles it.
    let mut writer = SnapshotWriter::new();
    let root = writer.add_function(FunctionRecord {
        stack_size: 6,
        constants: vec![Constant::Integer(21)],
        instructions: vec![
            Instruction::abc(OpCode::OutClosure, 1, 0, 0),
            load(1, 0),
            Instruction::abc(OpCode::New, 2, 2, 0),
            call(5, 0, 2),
            ret(1),
        ],
        ..FunctionRecord::root()
    });
    let slot = writer.add_value_ref(root, 1);
    writer.function_mut(root).unwrap().out_closure.push(slot);
    let outer = writer.add_function(FunctionRecord {
        stack_size: 6,
        in_closure: vec![(slot, 1)],
        instructions: vec![
            Instruction::abc(OpCode::New, 2, 2, 0),
            call(5, 0, 2),
            ret(5),
        ],
        ..FunctionRecord::child(root)
    });
    writer.add_function(FunctionRecord {
        stack_size: 3,
        in_closure: vec![(slot, 2)],
        instructions: vec![Instruction::abc(OpCode::Add, 2, 2, 2), Instruction::bare(OpCode::Return0)],
        ..FunctionRecord::child(outer)
    });
    let (_, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::make_integer(42));
}

#[test]
fn test_each_instantiation_shares_the_declaring_frame_cell() {
    // Two function objects created from the same child see one variable.
    let mut writer = SnapshotWriter::new();
    let root = writer.add_function(FunctionRecord {
        stack_size: 8,
        constants: vec![Constant::Integer(0)],
        instructions: vec![
            load(1, 0),
            Instruction::abc(OpCode::New, 2, 2, 0),
            call(5, 0, 2),
            Instruction::abc(OpCode::New, 2, 2, 0),
            call(5, 0, 2),
            ret(1),
        ],
        ..FunctionRecord::root()
    });
    let slot = writer.add_value_ref(root, 1);
    writer.function_mut(root).unwrap().out_closure.push(slot);
    writer.add_function(FunctionRecord {
        stack_size: 3,
        in_closure: vec![(slot, 1)],
        instructions: vec![Instruction::abc(OpCode::PostIncr, 1, 2, 0), ret(2)],
        ..FunctionRecord::child(root)
    });
    let (_, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::make_integer(2));
}

#[test]
fn test_arrow_function_keeps_creator_this() {
    let mut writer = SnapshotWriter::new();
    let tag = writer.add_string("tag");
    let root = writer.add_function(FunctionRecord {
        stack_size: 6,
        constants: vec![Constant::String(tag), Constant::Integer(5)],
        instructions: vec![
            load(1, 0),
            load(2, 1),
            Instruction::abc(OpCode::SetProperty, 0, 1, 2), // this.tag = 5
            Instruction::abc(OpCode::New, 2, 2, 0),
            Instruction::abc(OpCode::New, 3, 3, 0),          // unrelated receiver
            call(5, 0, 2),
            ret(5),
        ],
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        stack_size: 3,
        flags: FunctionFlags::FUNCTION | FunctionFlags::ARROW_FUNCTION,
        constants: vec![Constant::String(tag)],
        instructions: vec![load(1, 0), Instruction::abc(OpCode::GetProperty, 2, 0, 1), ret(2)],
        ..FunctionRecord::child(root)
    });
    let (_, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::make_integer(5));
}

// ============================================================================
// Exception regions
// ============================================================================

#[test]
fn test_catch_receives_thrown_value() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        stack_size: 3,
        context_size: 1,
        constants: vec![Constant::Integer(7)],
        instructions: vec![
            Instruction::ax(OpCode::Try, 4),         // 0: region ends at 4
            load(1, 0),                              // 1
            Instruction::abc(OpCode::Throw, 1, 0, 0), // 2
            Instruction::bare(OpCode::Return0),      // 3
            Instruction::abx(OpCode::Catch, 2, 2),   // 4: normal flow to 6
            ret(2),                                  // 5
            pop_end(),                               // 6
            Instruction::bare(OpCode::Return0),      // 7
        ],
        ..FunctionRecord::root()
    });
    let (_, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::make_integer(7));
}

#[test]
fn test_try_without_throw_skips_catch() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        stack_size: 3,
        context_size: 1,
        constants: vec![Constant::Integer(1), Constant::Integer(2)],
        instructions: vec![
            Instruction::ax(OpCode::Try, 2),       // 0
            load(1, 0),                            // 1
            Instruction::abx(OpCode::Catch, 2, 2), // 2: to 4
            load(1, 1),                            // 3: handler
            pop_end(),                             // 4
            ret(1),                                // 5
        ],
        ..FunctionRecord::root()
    });
    let (_, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::make_integer(1));
}

#[test]
fn test_script_errors_are_catchable() {
    let mut writer = SnapshotWriter::new();
    let missing = writer.add_string("missing");
    writer.add_function(FunctionRecord {
        stack_size: 3,
        context_size: 1,
        constants: vec![Constant::String(missing)],
        instructions: vec![
            Instruction::ax(OpCode::Try, 3),          // 0
            Instruction::abx(OpCode::GetGlobal, 1, 0), // 1
            Instruction::bare(OpCode::Return0),       // 2
            Instruction::abx(OpCode::Catch, 2, 2),    // 3
            ret(2),                                   // 4
            pop_end(),                                // 5
        ],
        ..FunctionRecord::root()
    });
    let (vm, result) = eval(writer);
    let error = result.unwrap();
    assert_eq!(vm.describe(error), "ReferenceError: missing is not defined");
}

/// try { throw 1 } finally { <finally> }
fn throw_then_finally(finally: Vec<Instruction>, strings: &[&str]) -> SnapshotWriter {
    let mut writer = SnapshotWriter::new();
    let mut constants = vec![Constant::Integer(1), Constant::Integer(2)];
    for text in strings {
        constants.push(Constant::String(writer.add_string(text)));
    }
    let skip = finally.len() as u32 + 2;
    let mut code = vec![
        Instruction::ax(OpCode::Try, 3),
        load(1, 0),
        Instruction::abc(OpCode::Throw, 1, 0, 0),
        Instruction::ax(OpCode::Finally, skip),
    ];
    code.extend(finally);
    code.push(pop_end());
    code.push(Instruction::bare(OpCode::Return0));
    writer.add_function(FunctionRecord {
        stack_size: 4,
        context_size: 1,
        constants,
        instructions: code,
        ..FunctionRecord::root()
    });
    writer
}

#[test]
fn test_return_in_finally_overrides_throw() {
    let writer = throw_then_finally(vec![load(2, 1), ret(2)], &[]);
    let (_, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::make_integer(2));
}

#[test]
fn test_plain_finally_rethrows_after_running() {
    let writer = throw_then_finally(
        vec![
            load(2, 1),
            load(3, 2),
            Instruction::abc(OpCode::SetProperty, 0, 3, 2), // ran = 2
        ],
        &["ran"],
    );
    let (mut vm, result) = eval(writer);
    assert!(matches!(result, Err(VmError::Throw(v)) if v == Value::make_integer(1)));
    assert_eq!(vm.get_global("ran").unwrap(), Some(Value::make_integer(2)));
}

#[test]
fn test_finally_runs_before_return() {
    let mut writer = SnapshotWriter::new();
    let ran = writer.add_string("ran");
    writer.add_function(FunctionRecord {
        stack_size: 3,
        context_size: 1,
        constants: vec![Constant::Integer(1), Constant::String(ran)],
        instructions: vec![
            Instruction::ax(OpCode::Try, 3),                  // 0
            load(1, 0),                                       // 1
            ret(1),                                           // 2
            Instruction::ax(OpCode::Finally, 4),              // 3: ends at 7
            load(2, 1),                                       // 4
            Instruction::abc(OpCode::SetProperty, 0, 2, 1),   // 5
            pop_end(),                                        // 6
            Instruction::bare(OpCode::Return0),               // 7
        ],
        ..FunctionRecord::root()
    });
    let (mut vm, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::make_integer(1));
    assert_eq!(vm.get_global("ran").unwrap(), Some(Value::make_integer(1)));
}

#[test]
fn test_pending_return_survives_collection_in_finally() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        stack_size: 6,
        context_size: 1,
        constants: vec![
            Constant::Number(0.25),
            Constant::Number(0.5),
            Constant::Integer(0),
            Constant::Integer(5000),
        ],
        instructions: vec![
            Instruction::ax(OpCode::Try, 4),                // 0
            load(1, 0),                                     // 1
            Instruction::abc(OpCode::Add, 1, 1, 1),         // 2: a fresh 0.5
            ret(1),                                         // 3
            Instruction::ax(OpCode::Finally, 10),           // 4: ends at 14
            load(1, 1),                                     // 5: only the region holds it now
            load(2, 2),                                     // 6
            load(3, 3),                                     // 7
            Instruction::abc(OpCode::Less, 4, 2, 3),        // 8
            Instruction::abx(OpCode::NJmp, 4, 3),           // 9: exit to 13
            Instruction::abc(OpCode::Add, 5, 1, 2),         // 10: garbage float
            Instruction::abc(OpCode::PreIncr, 2, 4, 0),     // 11
            Instruction::ax(OpCode::Goto, 8),               // 12
            pop_end(),                                      // 13
            Instruction::bare(OpCode::Return0),             // 14
        ],
        ..FunctionRecord::root()
    });
    let mut vm = VmContext::with_config(VmConfig {
        gc_limit: 1024,
        ..VmConfig::default()
    })
    .unwrap();
    let result = eval_in(&mut vm, writer).unwrap();
    assert!(vm.collections() > 0);
    assert_eq!(vm.number_value(result), Some(0.5));
}

#[test]
fn test_throw_in_catch_runs_finally_then_propagates() {
    let mut writer = SnapshotWriter::new();
    let ran = writer.add_string("ran");
    writer.add_function(FunctionRecord {
        stack_size: 4,
        context_size: 1,
        constants: vec![Constant::Integer(1), Constant::Integer(2), Constant::String(ran)],
        instructions: vec![
            Instruction::ax(OpCode::Try, 3),                // 0
            load(1, 0),                                     // 1
            Instruction::abc(OpCode::Throw, 1, 0, 0),       // 2
            Instruction::abx(OpCode::Catch, 2, 3),          // 3: normal flow to 6
            load(1, 1),                                     // 4
            Instruction::abc(OpCode::Throw, 1, 0, 0),       // 5: throw 2
            Instruction::ax(OpCode::Finally, 4),            // 6: ends at 10
            load(3, 2),                                     // 7
            Instruction::abc(OpCode::SetProperty, 0, 3, 2), // 8: ran = caught value
            pop_end(),                                      // 9
            Instruction::bare(OpCode::Return0),             // 10
        ],
        ..FunctionRecord::root()
    });
    let (mut vm, result) = eval(writer);
    assert!(matches!(result, Err(VmError::Throw(v)) if v == Value::make_integer(2)));
    assert_eq!(vm.get_global("ran").unwrap(), Some(Value::make_integer(1)));
}

#[test]
fn test_jump_out_of_try_runs_finally() {
    let mut writer = SnapshotWriter::new();
    let ran = writer.add_string("ran");
    writer.add_function(FunctionRecord {
        stack_size: 3,
        context_size: 1,
        constants: vec![Constant::Integer(3), Constant::String(ran)],
        instructions: vec![
            Instruction::ax(OpCode::Try, 3),                  // 0
            load(1, 0),                                       // 1
            Instruction::abc(OpCode::PopContext, 1, 8, 0),    // 2: break to 8
            Instruction::ax(OpCode::Finally, 4),              // 3: ends at 7
            load(2, 1),                                       // 4
            Instruction::abc(OpCode::SetProperty, 0, 2, 1),   // 5
            pop_end(),                                        // 6
            Instruction::bare(OpCode::Return0),               // 7
            ret(1),                                           // 8
        ],
        ..FunctionRecord::root()
    });
    let (mut vm, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::make_integer(3));
    assert_eq!(vm.get_global("ran").unwrap(), Some(Value::make_integer(3)));
}

#[test]
fn test_exception_crosses_frames() {
    let mut writer = SnapshotWriter::new();
    let root = writer.add_function(FunctionRecord {
        stack_size: 6,
        context_size: 1,
        instructions: vec![
            Instruction::ax(OpCode::Try, 3),         // 0
            Instruction::abc(OpCode::New, 2, 2, 0),  // 1
            call(5, 0, 2),                           // 2
            Instruction::abx(OpCode::Catch, 1, 2),   // 3
            ret(1),                                  // 4
            pop_end(),                               // 5
            Instruction::bare(OpCode::Return0),      // 6
        ],
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        stack_size: 2,
        constants: vec![Constant::Integer(99)],
        instructions: vec![load(1, 0), Instruction::abc(OpCode::Throw, 1, 0, 0)],
        ..FunctionRecord::child(root)
    });
    let (vm, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::make_integer(99));
    assert_eq!(vm.call_depth(), 0);
}

// ============================================================================
// Calls
// ============================================================================

fn register_sum(vm: &mut VmContext) {
    vm.register_external("sum", |vm, _this, args| {
        let mut total = 0.0;
        for arg in args {
            total += vm.to_number(*arg)?;
        }
        let count = args.len() as f64;
        vm.new_number(total * 100.0 + count)
    })
    .unwrap();
}

/// sum(5, ...spread) where `spread` is built by `build` into r1.
fn spread_program(build: Vec<Instruction>) -> SnapshotWriter {
    let mut writer = SnapshotWriter::new();
    let count = writer.add_string("sum");
    let constants = vec![
        Constant::Integer(0),
        Constant::Integer(7),
        Constant::Integer(1),
        Constant::String(count),
        Constant::Integer(5),
    ];
    let mut code = build;
    code.extend([
        Instruction::abc(OpCode::New, 6, 1, 0), // unfold marker
        load(2, 0),
        load(3, 2),
        Instruction::abc(OpCode::SetProperty, 6, 2, 3), // marker[0] = 1
        Instruction::abx(OpCode::GetGlobal, 4, 3),
        Instruction::abc(OpCode::LoadUndefined, 5, 0, 0),
        load(7, 4),
        Instruction::abc(OpCode::Move, 8, 1, 0),
        call(9, 2, 4),
        ret(9),
    ]);
    writer.add_function(FunctionRecord {
        stack_size: 10,
        constants,
        instructions: code,
        ..FunctionRecord::root()
    });
    writer
}

#[test]
fn test_spread_argument_is_expanded() {
    let writer = spread_program(vec![
        Instruction::abc(OpCode::New, 1, 1, 0),
        load(2, 0),
        load(3, 1),
        Instruction::abc(OpCode::SetProperty, 1, 2, 3), // [7]
        load(2, 2),
        Instruction::abc(OpCode::SetProperty, 1, 2, 3), // [7, 7]
    ]);
    let mut vm = VmContext::new().unwrap();
    register_sum(&mut vm);
    let result = eval_in(&mut vm, writer).unwrap();
    // 5 + 7 + 7 over three arguments
    assert_eq!(result, Value::make_integer(1903));
}

#[test]
fn test_spreading_a_non_array_is_type_error() {
    let writer = spread_program(vec![load(1, 1)]);
    let mut vm = VmContext::new().unwrap();
    register_sum(&mut vm);
    let err = eval_in(&mut vm, writer).unwrap_err();
    assert_eq!(vm.describe_thrown(&err), "TypeError: Found non-callable @@iterator");
}

#[test]
fn test_calling_non_function_is_type_error() {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        stack_size: 5,
        constants: vec![Constant::Integer(3)],
        instructions: vec![load(1, 0), call(4, 0, 1), ret(4)],
        ..FunctionRecord::root()
    });
    let (vm, result) = eval(writer);
    assert_eq!(vm.describe_thrown(&result.unwrap_err()), "TypeError: Expected a function.");
}

#[test]
fn test_extra_arguments_visible_through_arguments_object() {
    let mut writer = SnapshotWriter::new();
    let arguments = writer.add_string("arguments");
    let length = writer.add_string("length");
    let root = writer.add_function(FunctionRecord {
        stack_size: 8,
        constants: vec![Constant::Integer(1)],
        instructions: vec![
            Instruction::abc(OpCode::New, 1, 2, 0),
            load(4, 0),
            load(5, 0),
            load(6, 0),
            call(7, 3, 1),
            ret(7),
        ],
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        stack_size: 4,
        argc: 1,
        flags: FunctionFlags::FUNCTION | FunctionFlags::ARGUMENTS_NEEDED,
        constants: vec![Constant::String(arguments), Constant::String(length)],
        instructions: vec![
            Instruction::abx(OpCode::GetLocal, 2, 0),
            load(3, 1),
            Instruction::abc(OpCode::GetProperty, 2, 2, 3),
            ret(2),
        ],
        ..FunctionRecord::child(root)
    });
    let (_, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::make_integer(3));
}

#[test]
fn test_recursion_limit_is_range_error() {
    let mut writer = SnapshotWriter::new();
    let name = writer.add_string("again");
    let root = writer.add_function(FunctionRecord {
        stack_size: 6,
        constants: vec![Constant::String(name)],
        instructions: vec![
            Instruction::abc(OpCode::New, 1, 2, 0),
            load(4, 0),
            Instruction::abc(OpCode::SetProperty, 0, 4, 1),
            call(5, 0, 1),
            ret(5),
        ],
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        stack_size: 5,
        constants: vec![Constant::String(name)],
        instructions: vec![Instruction::abx(OpCode::GetGlobal, 1, 0), call(4, 0, 1), ret(4)],
        ..FunctionRecord::child(root)
    });
    let mut vm = VmContext::with_config(VmConfig {
        max_call_depth: 32,
        ..VmConfig::default()
    })
    .unwrap();
    let err = eval_in(&mut vm, writer).unwrap_err();
    assert_eq!(vm.describe_thrown(&err), "RangeError: Maximum call stack size exceeded");
    assert_eq!(vm.call_depth(), 0);
}

#[test]
fn test_host_calls_script_function() {
    let mut writer = SnapshotWriter::new();
    let name = writer.add_string("double");
    let root = writer.add_function(FunctionRecord {
        stack_size: 3,
        constants: vec![Constant::String(name)],
        instructions: vec![
            Instruction::abc(OpCode::New, 1, 2, 0),
            load(2, 0),
            Instruction::abc(OpCode::SetProperty, 0, 2, 1),
            Instruction::bare(OpCode::Return0),
        ],
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        stack_size: 2,
        argc: 1,
        instructions: vec![Instruction::abc(OpCode::Add, 1, 1, 1), ret(1)],
        ..FunctionRecord::child(root)
    });
    let mut vm = VmContext::new().unwrap();
    eval_in(&mut vm, writer).unwrap();
    let double = vm.get_global("double").unwrap().unwrap();
    let result = vm.call(double, Value::UNDEFINED, &[Value::make_integer(21)]).unwrap();
    assert_eq!(result, Value::make_integer(42));
}

// ============================================================================
// Classes
// ============================================================================

#[test]
fn test_derived_class_without_constructor() {
    let mut writer = SnapshotWriter::new();
    let tag = writer.add_string("tag");
    let instance = writer.add_string("instance");
    let root = writer.add_function(FunctionRecord {
        stack_size: 8,
        constants: vec![Constant::String(instance)],
        instructions: vec![
            Instruction::abc(OpCode::New, 1, 4, 0),          // class Parent
            Instruction::abc(OpCode::New, 2, 6, 1),          // class Child extends Parent
            Instruction::abc(OpCode::Inheritance, 2, 1, 0),
            Instruction::abc(OpCode::Constructor, 5, 0, 2),  // new Child()
            Instruction::abc(OpCode::InstanceOf, 6, 5, 1),
            load(7, 0),
            Instruction::abc(OpCode::SetProperty, 0, 7, 5),
            ret(6),
        ],
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        stack_size: 3,
        flags: FunctionFlags::FUNCTION | FunctionFlags::CONSTRUCTOR,
        constants: vec![Constant::String(tag), Constant::Integer(1)],
        instructions: vec![
            load(1, 0),
            load(2, 1),
            Instruction::abc(OpCode::SetProperty, 0, 1, 2),
            Instruction::bare(OpCode::Return0),
        ],
        ..FunctionRecord::child(root)
    });
    let (mut vm, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::TRUE);
    let object = vm.get_global("instance").unwrap().unwrap();
    assert_eq!(vm.get(object, "tag", object).unwrap(), Value::make_integer(1));
}

#[test]
fn test_get_super_prototype() {
    // Parent.prototype is reachable from a Child instance through GET_SUPER.
    let mut writer = SnapshotWriter::new();
    let prototype = writer.add_string("prototype");
    let root = writer.add_function(FunctionRecord {
        stack_size: 8,
        constants: vec![Constant::String(prototype)],
        instructions: vec![
            Instruction::abc(OpCode::New, 1, 4, 0),
            Instruction::abc(OpCode::New, 2, 4, 1),
            Instruction::abc(OpCode::Inheritance, 2, 1, 0),
            Instruction::abc(OpCode::Constructor, 5, 0, 2),
            load(7, 0),
            Instruction::abc(OpCode::GetProperty, 6, 1, 7),
            Instruction::abc(OpCode::StrictEqual, 6, 5, 6),
            ret(6),
        ],
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        stack_size: 2,
        flags: FunctionFlags::FUNCTION | FunctionFlags::CONSTRUCTOR,
        instructions: vec![Instruction::bare(OpCode::Return0)],
        ..FunctionRecord::child(root)
    });
    // Child's constructor returns the super prototype instead of `this`.
    writer.add_function(FunctionRecord {
        stack_size: 2,
        flags: FunctionFlags::FUNCTION | FunctionFlags::CONSTRUCTOR,
        instructions: vec![Instruction::abc(OpCode::GetSuper, 1, 1, 0), ret(1)],
        ..FunctionRecord::child(root)
    });
    let (_, result) = eval(writer);
    assert_eq!(result.unwrap(), Value::TRUE);
}

#[test]
fn test_extending_a_non_constructor_throws() {
    let mut writer = SnapshotWriter::new();
    let root = writer.add_function(FunctionRecord {
        stack_size: 3,
        constants: vec![Constant::Integer(4)],
        instructions: vec![
            Instruction::abc(OpCode::New, 1, 4, 0),
            load(2, 0),
            Instruction::abc(OpCode::Inheritance, 1, 2, 0),
            Instruction::bare(OpCode::Return0),
        ],
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        instructions: vec![Instruction::bare(OpCode::Return0)],
        ..FunctionRecord::child(root)
    });
    let (vm, result) = eval(writer);
    assert_eq!(
        vm.describe_thrown(&result.unwrap_err()),
        "Error: super isn't a constructor OP_INHERITANCE"
    );
}

// ============================================================================
// Host polling
// ============================================================================

fn endless_loop() -> SnapshotWriter {
    let mut writer = SnapshotWriter::new();
    writer.add_function(FunctionRecord {
        stack_size: 2,
        instructions: vec![Instruction::ax(OpCode::Goto, 0)],
        ..FunctionRecord::root()
    });
    writer
}

#[test]
fn test_stop_callback_terminates_execution() {
    let mut vm = VmContext::with_config(VmConfig {
        stop_check_interval: 16,
        ..VmConfig::default()
    })
    .unwrap();
    let polls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&polls);
    vm.set_stop_callback(move || {
        seen.set(seen.get() + 1);
        seen.get() == 3
    });
    let err = eval_in(&mut vm, endless_loop()).unwrap_err();
    assert!(matches!(err, VmError::Terminated));
    assert!(!err.is_catchable());
    assert_eq!(polls.get(), 3);
    assert_eq!(vm.call_depth(), 0);
}

#[test]
fn test_termination_skips_finally_blocks() {
    let mut writer = SnapshotWriter::new();
    let ran = writer.add_string("ran");
    writer.add_function(FunctionRecord {
        stack_size: 3,
        context_size: 1,
        constants: vec![Constant::String(ran), Constant::Integer(1)],
        instructions: vec![
            Instruction::ax(OpCode::Try, 2),                // 0
            Instruction::ax(OpCode::Goto, 1),               // 1
            Instruction::ax(OpCode::Finally, 4),            // 2
            load(1, 0),                                     // 3
            load(2, 1),                                     // 4
            Instruction::abc(OpCode::SetProperty, 0, 1, 2), // 5
            pop_end(),                                      // 6
        ],
        ..FunctionRecord::root()
    });
    let mut vm = VmContext::with_config(VmConfig {
        stop_check_interval: 1,
        ..VmConfig::default()
    })
    .unwrap();
    let polls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&polls);
    // the fourth poll happens inside the protected loop
    vm.set_stop_callback(move || {
        seen.set(seen.get() + 1);
        seen.get() == 4
    });
    let err = eval_in(&mut vm, writer).unwrap_err();
    assert!(matches!(err, VmError::Terminated));
    assert_eq!(vm.get_global("ran").unwrap(), None);
}

struct Recorder {
    stops_left: usize,
    hits: Rc<RefCell<Vec<Backtrace>>>,
}

impl DebuggerHooks for Recorder {
    fn should_stop(&mut self) -> bool {
        if self.stops_left == 0 {
            return false;
        }
        self.stops_left -= 1;
        true
    }

    fn breakpoint_hit(&mut self, backtrace: &Backtrace) {
        self.hits.borrow_mut().push(backtrace.clone());
    }

    fn send_backtrace(&mut self, backtrace: &Backtrace) {
        self.hits.borrow_mut().push(backtrace.clone());
    }
}

#[test]
fn test_debugger_sees_innermost_frame_first() {
    let mut writer = SnapshotWriter::new();
    let root = writer.add_function(FunctionRecord {
        stack_size: 6,
        instructions: vec![Instruction::abc(OpCode::New, 2, 2, 0), call(5, 0, 2), ret(5)],
        ..FunctionRecord::root()
    });
    writer.add_function(FunctionRecord {
        stack_size: 2,
        argc: 1,
        instructions: vec![Instruction::bare(OpCode::Return0)],
        ..FunctionRecord::child(root)
    });

    let hits = Rc::new(RefCell::new(Vec::new()));
    let mut vm = VmContext::new().unwrap();
    vm.set_debugger_hooks(Box::new(Recorder {
        stops_left: 3,
        hits: Rc::clone(&hits),
    }));
    eval_in(&mut vm, writer).unwrap();

    let hits = hits.borrow();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].depth(), 1);
    // third stop is the first instruction of the callee
    let inner = &hits[2];
    assert_eq!(inner.depth(), 2);
    assert_eq!(inner.top().unwrap().function_id, 1);
    assert_eq!(inner.top().unwrap().pc, 0);
    assert_eq!(inner.frames[1].function_id, 0);
    // the caller is reported at its CALL
    assert_eq!(inner.frames[1].pc, 1);
}

proptest! {
    #[test]
    fn prop_closure_cell_counts_every_call(start in -1000i32..1000, calls in 0usize..24) {
        let (_, result) = eval(counter_program(start, calls));
        prop_assert_eq!(result.unwrap(), Value::make_integer(start + calls as i32));
    }
}
