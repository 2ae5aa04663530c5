//! The dispatch loop
//!
//! [`VmContext::run_frame`] fetches and executes the instructions of one
//! activation. Instructions that leave a region (`RETURN`, `THROW`, the end
//! of a `finally` block, `POP_CONTEXT JUMP`) complete with
//! [`Completion::Unwind`]; the loop then asks the frame's
//! [`ContextStack`](crate::exception::ContextStack) where execution resumes.
//! Script exceptions travel the same way. Any other error aborts the
//! pending regions without running their handlers and leaves the frame.

use std::rc::Rc;

use bytecode_system::{InClosure, Instruction, NewKind, OpCode, PopContextKind, SuperKind};
use core_types::{JsError, Value};
use memory_manager::{Property, PropertyFlags};
use tracing::{debug, info, trace, warn};

use crate::call::CallKind;
use crate::closure::ClosureCell;
use crate::context::ExecutionContext;
use crate::error::{VmError, VmResult};
use crate::exception::{Context, Landing, Search};
use crate::object::{JsObject, ObjectClass, ScriptFunction};
use crate::operations::{Arithmetic, Bitwise, Relation};
use crate::properties::AccessorKind;
use crate::vm::VmContext;

/// How an instruction finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion {
    /// Continue at the program counter
    Next,
    /// Leave the current region; pending `finally` blocks run first
    Unwind(Search),
}

impl VmContext {
    /// Runs `ctx` until its function returns or throws.
    pub(crate) fn run_frame(&mut self, ctx: &mut ExecutionContext) -> VmResult<Value> {
        let mut retried_at = None;
        loop {
            let at = ctx.pc;
            let invocations = self.invocations;
            let step = match self.poll_host(ctx) {
                Ok(()) => self.dispatch(ctx),
                Err(err) => Err(err),
            };
            let search = match step {
                Ok(Completion::Next) => {
                    retried_at = None;
                    continue;
                }
                Ok(Completion::Unwind(search)) => search,
                Err(VmError::Throw(error)) => Search::Throw(error),
                // an instruction that entered no function runs again once
                // a collection freed something
                Err(VmError::OutOfMemory)
                    if retried_at != Some(at)
                        && self.invocations == invocations
                        && self.collect_for_retry(ctx) =>
                {
                    debug!(function = ctx.function.id, pc = at, "instruction retried after collection");
                    retried_at = Some(at);
                    ctx.pc = at;
                    continue;
                }
                Err(err) => {
                    ctx.contexts.abort_all(&mut ctx.scopes);
                    return Err(err);
                }
            };
            match self.unwind(ctx, search) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) => {
                    ctx.contexts.abort_all(&mut ctx.scopes);
                    return Err(err);
                }
            }
        }
    }

    /// Resumes at the handler `search` selects. Returns the frame's result
    /// when no handler is left.
    fn unwind(&mut self, ctx: &mut ExecutionContext, search: Search) -> VmResult<Option<Value>> {
        let landing = ctx
            .contexts
            .find_finally(&ctx.function.instructions, search, &mut ctx.scopes)?;
        match (landing, search) {
            (Some(Landing::Catch { pc, register }), Search::Throw(error)) => {
                let scope = self.new_scope()?;
                ctx.scopes.push(scope);
                ctx.registers.set(register, error)?;
                ctx.jump(pc)?;
                Ok(None)
            }
            (Some(Landing::Catch { .. }), _) => {
                Err(VmError::invariant("catch block entered without an exception"))
            }
            (Some(Landing::Finally { pc }), _) => {
                ctx.jump(pc)?;
                Ok(None)
            }
            (None, Search::Jump(target)) => {
                ctx.jump(target)?;
                Ok(None)
            }
            (None, Search::Return(value)) => Ok(Some(value)),
            (None, Search::Throw(error)) => Err(VmError::Throw(error)),
        }
    }

    /// Polls the stop callback and the debugger between instructions, and
    /// collects garbage when it is due.
    fn poll_host(&mut self, ctx: &ExecutionContext) -> VmResult<()> {
        if let Some(frame) = self.call_stack.last_mut() {
            frame.pc = ctx.pc;
        }
        self.collect_if_due(ctx);
        if let Some(callback) = self.stop_callback.as_mut() {
            self.steps += 1;
            if self.steps >= self.config.stop_check_interval.max(1) {
                self.steps = 0;
                if callback() {
                    info!(function = ctx.function.id, pc = ctx.pc, "stop callback terminated execution");
                    return Err(VmError::Terminated);
                }
            }
        }
        let stop = self.hooks.as_mut().is_some_and(|hooks| hooks.should_stop());
        if stop {
            let backtrace = self.backtrace();
            if let Some(hooks) = self.hooks.as_mut() {
                hooks.breakpoint_hit(&backtrace);
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, ctx: &mut ExecutionContext) -> VmResult<Completion> {
        let Some(instruction) = ctx.fetch() else {
            return Ok(Completion::Unwind(Search::Return(Value::UNDEFINED)));
        };
        let at = ctx.pc - 1;
        trace!(function = ctx.function.id, pc = at, %instruction, "dispatch");
        let Instruction { opcode, a, b, c } = instruction;

        match opcode {
            OpCode::Move => {
                let value = ctx.registers.get(b)?;
                ctx.registers.set(a, value)?;
            }
            OpCode::LoadK => {
                let value = ctx.constant(b)?;
                ctx.registers.set(a, value)?;
            }
            OpCode::LoadUndefined => ctx.registers.set(a, Value::UNDEFINED)?,
            OpCode::LoadNull => ctx.registers.set(a, Value::NULL)?,

            OpCode::GetGlobal => {
                let name = self.constant_name(ctx, b)?;
                let global = self.global;
                if !self.has_property(global, &name)? {
                    let message = format!("{name} is not defined");
                    return Err(self.throw_error(JsError::reference_error(message)));
                }
                let value = self.get(global, &name, global)?;
                ctx.registers.set(a, value)?;
            }
            OpCode::GetByThisOrGlobal => {
                let this = ctx.registers.get(b)?;
                let key = ctx.registers.get(c)?;
                let mut value = Value::UNDEFINED;
                if this.is_object() {
                    value = self.get_value(this, key)?;
                }
                if value.is_undefined() {
                    let global = self.global;
                    value = self.get_value(global, key)?;
                }
                ctx.registers.set(a, value)?;
            }
            OpCode::GetLocal => {
                let name = self.constant_name(ctx, b)?;
                let value = self.lookup_local(ctx, &name)?;
                ctx.registers.set(a, value)?;
            }
            OpCode::GetProperty => {
                let base = ctx.registers.get(b)?;
                let key = ctx.registers.get(c)?;
                let value = self.get_value(base, key)?;
                ctx.registers.set(a, value)?;
            }
            OpCode::SetProperty => {
                let base = ctx.registers.get(a)?;
                let key = ctx.registers.get(b)?;
                let value = ctx.registers.get(c)?;
                self.put_value(base, key, value)?;
            }

            OpCode::Call | OpCode::Constructor => {
                let kind = if opcode == OpCode::Call {
                    CallKind::Call
                } else {
                    CallKind::Construct
                };
                let callee = ctx.registers.get(c)?;
                let this = ctx.registers.get(c + 1)?;
                let unfold = ctx.registers.get(c + 2)?;
                let mut args = Vec::with_capacity(b as usize);
                for index in 0..b {
                    args.push(ctx.registers.get(c + 3 + index)?);
                }
                if !self.is_callable(callee) {
                    return Err(self.throw_error(JsError::type_error("Expected a function.")));
                }
                let args = self.spread_arguments(unfold, args)?;
                self.suspended.push(ctx.clone());
                let result = self.invoke(kind, callee, this, &args);
                self.suspended.pop();
                ctx.registers.set(a, result?)?;
            }
            OpCode::New => {
                let value = self.create(ctx, b, c)?;
                ctx.registers.set(a, value)?;
            }
            OpCode::OutClosure => {
                ctx.registers.bind_fresh(a)?;
            }
            OpCode::Inheritance => {
                let child = ctx.registers.get(a)?;
                let parent = ctx.registers.get(b)?;
                self.inherit(child, parent)?;
            }
            OpCode::GetSuper => {
                let value = self.load_super(ctx, b)?;
                ctx.registers.set(a, value)?;
            }

            OpCode::TypeOf => {
                let value = ctx.registers.get(b)?;
                let name = self.type_of(value)?;
                ctx.registers.set(a, name)?;
            }
            OpCode::Add => {
                let (left, right) = (ctx.registers.get(b)?, ctx.registers.get(c)?);
                let result = self.add(left, right)?;
                ctx.registers.set(a, result)?;
            }
            OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod => {
                let op = match opcode {
                    OpCode::Sub => Arithmetic::Sub,
                    OpCode::Mul => Arithmetic::Mul,
                    OpCode::Div => Arithmetic::Div,
                    _ => Arithmetic::Mod,
                };
                let (left, right) = (ctx.registers.get(b)?, ctx.registers.get(c)?);
                let result = self.arithmetic(op, left, right)?;
                ctx.registers.set(a, result)?;
            }
            OpCode::BitAnd
            | OpCode::BitOr
            | OpCode::BitXor
            | OpCode::LeftShift
            | OpCode::RightShift
            | OpCode::ZeroRightShift
            | OpCode::Uns => {
                let op = match opcode {
                    OpCode::BitAnd => Bitwise::And,
                    OpCode::BitOr => Bitwise::Or,
                    OpCode::BitXor => Bitwise::Xor,
                    OpCode::LeftShift => Bitwise::LeftShift,
                    OpCode::RightShift => Bitwise::RightShift,
                    _ => Bitwise::ZeroRightShift,
                };
                let (left, right) = (ctx.registers.get(b)?, ctx.registers.get(c)?);
                let result = self.bitwise(op, left, right)?;
                ctx.registers.set(a, result)?;
            }
            OpCode::BitNot => {
                let value = ctx.registers.get(b)?;
                let result = self.bit_not(value)?;
                ctx.registers.set(a, result)?;
            }
            OpCode::PreIncr | OpCode::PreDecr | OpCode::PostIncr | OpCode::PostDecr => {
                let delta = match opcode {
                    OpCode::PreIncr | OpCode::PostIncr => 1,
                    _ => -1,
                };
                let old = self.to_number_value(ctx.registers.get(a)?)?;
                let new = match old.int_add(Value::make_integer(delta)) {
                    Some(fast) => fast,
                    None => {
                        let number = self.to_number(old)? + f64::from(delta);
                        self.new_number(number)?
                    }
                };
                let is_post = matches!(opcode, OpCode::PostIncr | OpCode::PostDecr);
                if is_post {
                    ctx.registers.set(b, old)?;
                    ctx.registers.set(a, new)?;
                } else {
                    ctx.registers.set(a, new)?;
                    ctx.registers.set(b, new)?;
                }
            }

            OpCode::Equal | OpCode::StrictEqual => {
                let (left, right) = (ctx.registers.get(b)?, ctx.registers.get(c)?);
                let equal = if opcode == OpCode::Equal {
                    self.loose_equals(left, right)?
                } else {
                    self.strict_equals(left, right)
                };
                ctx.registers.set(a, Value::make_boolean(equal))?;
            }
            OpCode::Less | OpCode::LessEqual | OpCode::Greater | OpCode::GreaterEqual => {
                let relation = match opcode {
                    OpCode::Less => Relation::Less,
                    OpCode::LessEqual => Relation::LessEqual,
                    OpCode::Greater => Relation::Greater,
                    _ => Relation::GreaterEqual,
                };
                let (left, right) = (ctx.registers.get(b)?, ctx.registers.get(c)?);
                let result = self.compare(relation, left, right)?;
                ctx.registers.set(a, Value::make_boolean(result))?;
            }
            OpCode::Not => {
                let value = ctx.registers.get(b)?;
                ctx.registers.set(a, Value::make_boolean(!self.to_boolean(value)))?;
            }
            OpCode::In => {
                let (key, object) = (ctx.registers.get(b)?, ctx.registers.get(c)?);
                let found = self.has_in(key, object)?;
                ctx.registers.set(a, Value::make_boolean(found))?;
            }
            OpCode::InstanceOf => {
                let (value, constructor) = (ctx.registers.get(b)?, ctx.registers.get(c)?);
                let result = self.instance_of(value, constructor)?;
                ctx.registers.set(a, Value::make_boolean(result))?;
            }
            OpCode::ForIn => {
                let more = self.for_in_step(ctx, b, c)?;
                ctx.registers.set(a, Value::make_boolean(more))?;
            }

            OpCode::NJmp => {
                let condition = ctx.registers.get(a)?;
                if !self.to_boolean(condition) {
                    ctx.jump(ctx.pc + b as usize)?;
                }
            }
            OpCode::JmpPc => {
                let condition = ctx.registers.get(a)?;
                if self.to_boolean(condition) {
                    ctx.jump(b as usize)?;
                }
            }
            OpCode::Goto => ctx.jump(instruction.arg_ax() as usize)?,

            OpCode::Delete => {
                let name = ctx.registers.get(b)?;
                let name = self.to_property_key(name)?;
                let deleted = self.delete_binding(ctx, &name)?;
                ctx.registers.set(a, Value::make_boolean(deleted))?;
            }
            OpCode::DeleteProperty => {
                let (base, key) = (ctx.registers.get(b)?, ctx.registers.get(c)?);
                let deleted = if base.is_undefined() {
                    true
                } else if base.is_null() {
                    return Err(self.throw_error(JsError::type_error(
                        "Cannot convert undefined or null to object",
                    )));
                } else {
                    let name = self.to_property_key(key)?;
                    !base.is_object() || self.delete_property(base, &name)?
                };
                ctx.registers.set(a, Value::make_boolean(deleted))?;
            }
            OpCode::SetGetter | OpCode::SetSetter => {
                let object = ctx.registers.get(a)?;
                if !object.is_object() {
                    return Err(VmError::invariant(format!("{opcode} on a non-object")));
                }
                let name = ctx.registers.get(b)?;
                let name = self.to_property_key(name)?;
                let function = ctx.registers.get(c)?;
                let kind = if opcode == OpCode::SetGetter {
                    AccessorKind::Getter
                } else {
                    AccessorKind::Setter
                };
                self.set_accessor(object, &name, function, kind)?;
            }

            OpCode::Return0 => return Ok(Completion::Unwind(Search::Return(Value::UNDEFINED))),
            OpCode::Return1 => {
                let value = ctx.registers.get(a)?;
                return Ok(Completion::Unwind(Search::Return(value)));
            }
            OpCode::Throw => {
                let error = ctx.registers.get(a)?;
                return Ok(Completion::Unwind(Search::Throw(error)));
            }
            OpCode::Try => {
                let end = at + instruction.arg_ax() as usize;
                ctx.contexts.push(Context::Try { end })?;
            }
            OpCode::Catch => ctx.jump(at + instruction.arg_bx() as usize)?,
            OpCode::Finally => {
                if let Some(Context::Catch { .. }) = ctx.contexts.top() {
                    ctx.scopes.pop();
                }
                let end = at + instruction.arg_ax() as usize;
                ctx.contexts
                    .replace_top(Context::FinallyJump { end, target: end })?;
            }
            OpCode::PopContext => return self.pop_context(ctx, a, b),

            OpCode::Invalid => return Err(self.throw_error(JsError::common("VM op_invalid"))),
        }
        Ok(Completion::Next)
    }

    fn pop_context(&mut self, ctx: &mut ExecutionContext, kind: u32, target: u32) -> VmResult<Completion> {
        match PopContextKind::try_from(kind) {
            Ok(PopContextKind::End) => {
                let Some(top) = ctx.contexts.top().copied() else {
                    return Err(VmError::invariant("POP_CONTEXT without a pending context"));
                };
                let resume = match top {
                    Context::FinallyJump { target, .. } => Search::Jump(target),
                    Context::FinallyThrow { error, .. } => Search::Throw(error),
                    Context::FinallyReturn { value, .. } => Search::Return(value),
                    Context::Try { .. } | Context::Catch { .. } => {
                        ctx.contexts.abort_top(&mut ctx.scopes);
                        return Ok(Completion::Next);
                    }
                };
                ctx.contexts.pop();
                Ok(Completion::Unwind(resume))
            }
            Ok(PopContextKind::Jump) => Ok(Completion::Unwind(Search::Jump(target as usize))),
            Err(other) => Err(VmError::invariant(format!("unknown POP_CONTEXT kind {other}"))),
        }
    }

    fn constant_name(&self, ctx: &ExecutionContext, index: u32) -> VmResult<Rc<str>> {
        let constant = ctx.constant(index)?;
        self.string_text(constant)
            .ok_or_else(|| VmError::invariant(format!("constant k{index} is not a name")))
    }

    /// Resolves `name` through the `catch`/`arguments` scopes, then the
    /// global object. Unresolved names read as `undefined`.
    fn lookup_local(&mut self, ctx: &ExecutionContext, name: &str) -> VmResult<Value> {
        for scope in ctx.scopes.iter().rev() {
            if let Some(Property::Data { value, .. }) = self.heap.own_property(*scope, name)? {
                return Ok(value);
            }
        }
        let global = self.global;
        self.get(global, name, global)
    }

    fn delete_binding(&mut self, ctx: &ExecutionContext, name: &str) -> VmResult<bool> {
        for scope in ctx.scopes.iter().rev() {
            if self.heap.own_property(*scope, name)?.is_some() {
                return self.delete_property(*scope, name);
            }
        }
        let global = self.global;
        self.delete_property(global, name)
    }

    /// Expands the arguments marked by the unfold array, whose integer
    /// elements name argument positions.
    fn spread_arguments(&mut self, unfold: Value, args: Vec<Value>) -> VmResult<Vec<Value>> {
        let is_marker = unfold.is_object()
            && matches!(self.heap.object(unfold)?.class, ObjectClass::Array);
        if !is_marker {
            return Ok(args);
        }
        let mut spread = vec![false; args.len()];
        for mark in self.array_elements(unfold)? {
            let position = if mark.is_integer() {
                usize::try_from(mark.as_integer()).ok()
            } else {
                None
            };
            match position.and_then(|index| spread.get_mut(index)) {
                Some(flag) => *flag = true,
                None => return Err(VmError::invariant(format!("bad spread marker {mark:?}"))),
            }
        }

        let mut expanded = Vec::with_capacity(args.len());
        for (arg, is_spread) in args.into_iter().zip(spread) {
            if !is_spread {
                expanded.push(arg);
                continue;
            }
            let array_like = arg.is_object() && self.heap.object(arg)?.is_array_like();
            if !array_like {
                return Err(self.throw_error(JsError::type_error("Found non-callable @@iterator")));
            }
            expanded.extend(self.array_elements(arg)?);
        }
        Ok(expanded)
    }

    /// `NEW`: operand B selects the kind, C its parameter.
    fn create(&mut self, ctx: &mut ExecutionContext, kind: u32, param: u32) -> VmResult<Value> {
        match NewKind::try_from(kind) {
            Ok(NewKind::Map) | Ok(NewKind::Object) => self.new_object(),
            Ok(NewKind::Array) => {
                let array = self.new_array(&[])?;
                if param > 0 {
                    self.store_length(array, param)?;
                }
                Ok(array)
            }
            Ok(NewKind::Function) => self.instantiate(ctx, param, false),
            Ok(NewKind::Constructor) => self.instantiate(ctx, param, true),
            Ok(NewKind::ImplConstructor) => self.new_class(ObjectClass::ImplicitConstructor),
            Ok(NewKind::ImplSuperConstructor) => {
                let target = ctx.registers.get(param)?;
                if !target.is_object() {
                    return Err(self.throw_error(JsError::type_error(
                        "Class extends value is not a constructor",
                    )));
                }
                self.new_class(ObjectClass::BoundConstructor { target })
            }
            Err(other) => {
                warn!(kind = other, "unknown NEW kind");
                Ok(Value::UNDEFINED)
            }
        }
    }

    fn new_class(&mut self, class: ObjectClass) -> VmResult<Value> {
        let proto = self.intrinsics.function_prototype;
        let constructor = self.heap.alloc_object(JsObject::new(class, proto))?;
        self.attach_prototype(constructor)?;
        Ok(constructor)
    }

    fn attach_prototype(&mut self, function: Value) -> VmResult<()> {
        let prototype = self.new_object()?;
        self.define_hidden(prototype, "constructor", function)?;
        self.heap.define_own(
            function,
            "prototype",
            Property::Data {
                value: prototype,
                flags: PropertyFlags::WRITABLE,
            },
        )
    }

    /// Function object for child `index` of the running function.
    fn instantiate(&mut self, ctx: &mut ExecutionContext, index: u32, is_class: bool) -> VmResult<Value> {
        let Some(state) = ctx.function.child(index as usize).cloned() else {
            return Err(self.throw_error(JsError::common("load func error")));
        };
        let captured = self.capture_cells(ctx, &state.in_closure)?;
        let bound_this = if state.is_arrow() && !is_class {
            Some(ctx.registers.get(0)?)
        } else {
            None
        };
        let has_prototype = bound_this.is_none();
        let proto = self.intrinsics.function_prototype;
        let function = self.heap.alloc_object(JsObject::new(
            ObjectClass::Function(ScriptFunction {
                state,
                captured,
                bound_this,
                is_class_constructor: is_class,
            }),
            proto,
        ))?;
        if has_prototype {
            self.attach_prototype(function)?;
        }
        Ok(function)
    }

    /// Cells for a new function's in-closure table.
    ///
    /// A variable of the running function is shared through its register,
    /// which gets a cell on demand when the function declares it captured.
    /// Variables of outer functions come from the running function's own
    /// in-closure registers, or from the cells its function object holds.
    fn capture_cells(
        &mut self,
        ctx: &mut ExecutionContext,
        entries: &[InClosure],
    ) -> VmResult<Vec<ClosureCell>> {
        let mut cells = Vec::with_capacity(entries.len());
        for entry in entries {
            let source = entry.source;
            let cell = if source.function == ctx.function.id {
                match ctx.registers.cell(source.register)? {
                    Some(cell) => Some(cell),
                    None if ctx.function.captures_register(source.register) => {
                        Some(ctx.registers.bind_fresh(source.register)?)
                    }
                    None => None,
                }
            } else {
                match ctx.function.in_closure_by_slot(entry.slot) {
                    Some(own) => ctx.registers.cell(own.register)?,
                    None => self.captured_by_running_function(ctx.this_function, entry.slot)?,
                }
            };
            let cell = cell.ok_or_else(|| {
                VmError::invariant(format!(
                    "function #{} cannot resolve closure slot {} (function #{}, r{})",
                    ctx.function.id, entry.slot, source.function, source.register
                ))
            })?;
            cells.push(cell);
        }
        Ok(cells)
    }

    fn captured_by_running_function(&self, function: Value, slot: u32) -> VmResult<Option<ClosureCell>> {
        if !function.is_object() {
            return Ok(None);
        }
        Ok(match &self.heap.object(function)?.class {
            ObjectClass::Function(script) => script.captured_cell(slot).cloned(),
            _ => None,
        })
    }

    /// `INHERITANCE child, parent`: links class `child` below `parent`.
    fn inherit(&mut self, child: Value, parent: Value) -> VmResult<()> {
        let parent = if parent.is_null() {
            self.heap
                .alloc_object(JsObject::new(ObjectClass::Ordinary, Value::NULL))?
        } else {
            let is_constructor = parent.is_object() && self.heap.object(parent)?.is_constructor();
            if !is_constructor {
                return Err(self.throw_error(JsError::common("super isn't a constructor OP_INHERITANCE")));
            }
            parent
        };
        if !child.is_object() {
            return Err(VmError::invariant("INHERITANCE on a non-object class"));
        }
        let child_prototype = self.get(child, "prototype", child)?;
        if !child_prototype.is_object() {
            return Err(VmError::invariant("class without a prototype object"));
        }
        self.heap.define_own(
            child_prototype,
            "constructor",
            Property::Data {
                value: child,
                flags: PropertyFlags::WRITABLE | PropertyFlags::CONFIGURABLE,
            },
        )?;

        if !self.heap.proto(parent)?.is_object() {
            return Ok(());
        }
        let parent_prototype = self.get(parent, "prototype", parent)?;
        let is_bound = matches!(
            self.heap.object(parent)?.class,
            ObjectClass::BoundConstructor { .. }
        );
        if is_bound && !parent_prototype.is_object() {
            return Err(self.throw_error(JsError::common(
                "class extends value does not have valid prototype property",
            )));
        }
        if parent_prototype.is_object() {
            self.heap.set_proto(child_prototype, parent_prototype)?;
            self.heap.set_proto(child, parent)?;
        }
        Ok(())
    }

    fn load_super(&mut self, ctx: &ExecutionContext, kind: u32) -> VmResult<Value> {
        match SuperKind::try_from(kind) {
            Ok(SuperKind::Constructor) => {
                if !ctx.this_function.is_object() {
                    return Ok(Value::NULL);
                }
                self.heap.proto(ctx.this_function)
            }
            Ok(SuperKind::Prototype) => {
                let this = ctx.registers.get(0)?;
                let child = if this.is_object() {
                    self.heap.proto(this)?
                } else {
                    Value::NULL
                };
                if !child.is_object() {
                    return Err(self.throw_error(JsError::common(
                        "can't get child prototype with OP_GET_SUPER",
                    )));
                }
                let parent = self.heap.proto(child)?;
                if !parent.is_object() {
                    return Err(self.throw_error(JsError::common(
                        "can't get super prototype with OP_GET_SUPER",
                    )));
                }
                Ok(parent)
            }
            Err(_) => Err(self.throw_error(JsError::common(
                "unknown get super type error with OP_GET_SUPER",
            ))),
        }
    }

    /// One `for-in` step: moves the iterator register to the next name.
    /// Returns `false` when the names are exhausted.
    fn for_in_step(&mut self, ctx: &mut ExecutionContext, iterator: u32, object: u32) -> VmResult<bool> {
        let target = ctx.registers.get(object)?;
        if target.is_nullish() {
            return Ok(false);
        }
        let names = if target.is_object() {
            self.enumerable_names(target)?
        } else {
            self.primitive_enumerable_names(target)?
        };
        let current = ctx.registers.get(iterator)?;
        let next = if current.is_nullish() {
            names.first()
        } else {
            let key = self.to_js_string(current)?;
            match names.iter().position(|name| *name == key) {
                Some(index) => names.get(index + 1),
                None => names.first(),
            }
        };
        match next {
            Some(name) => {
                let name = self.new_string(name)?;
                ctx.registers.set(iterator, name)?;
                Ok(true)
            }
            None => {
                ctx.registers.set(iterator, Value::UNDEFINED)?;
                Ok(false)
            }
        }
    }
}
