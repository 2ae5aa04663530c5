//! Calling and constructing
//!
//! Script functions, host functions and class constructors share one
//! protocol: a callee, a `this` value and an argument list. Script callees
//! get a fresh [`ExecutionContext`] on the call stack.

use std::rc::Rc;

use bytecode_system::{FunctionFlags, FunctionState};
use core_types::{JsError, Value};
use memory_manager::{Property, PropertyFlags};
use tracing::debug;

use crate::call_frame::CallFrame;
use crate::closure::ClosureCell;
use crate::context::ExecutionContext;
use crate::error::{VmError, VmResult};
use crate::object::{JsObject, ObjectClass};
use crate::vm::VmContext;

/// How a callee is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Plain call (`CALL`)
    Call,
    /// `new` call (`CONSTRUCTOR`)
    Construct,
}

impl VmContext {
    /// Invokes `callee` as `kind`.
    pub fn invoke(&mut self, kind: CallKind, callee: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        match kind {
            CallKind::Call => self.call(callee, this, args),
            CallKind::Construct => self.construct(callee, args),
        }
    }

    /// Calls `callee` with `this`.
    ///
    /// # Errors
    ///
    /// A thrown `TypeError` when `callee` is not callable, plus whatever the
    /// callee throws.
    pub fn call(&mut self, callee: Value, this: Value, args: &[Value]) -> VmResult<Value> {
        self.invocations += 1;
        if !self.is_callable(callee) {
            return Err(self.throw_error(JsError::type_error("Expected a function.")));
        }
        let class = self.heap.object(callee)?.class.clone();
        match class {
            ObjectClass::Function(function) => {
                let this = function.bound_this.unwrap_or(this);
                self.run_function(function.state, callee, this, args, &function.captured)
            }
            ObjectClass::External(index) => self.call_external(index, this, args),
            // `super(...)` into a class without its own constructor
            ObjectClass::ImplicitConstructor => Ok(Value::UNDEFINED),
            ObjectClass::BoundConstructor { target } => self.call(target, this, args),
            _ => Err(self.throw_error(JsError::type_error("Expected a function."))),
        }
    }

    /// `new callee(...args)`.
    ///
    /// # Errors
    ///
    /// A thrown `TypeError` when `callee` is not a constructor, plus whatever
    /// the constructor throws.
    pub fn construct(&mut self, callee: Value, args: &[Value]) -> VmResult<Value> {
        self.construct_for(callee, args, callee)
    }

    fn construct_for(&mut self, callee: Value, args: &[Value], new_target: Value) -> VmResult<Value> {
        self.invocations += 1;
        let is_constructor = callee.is_object() && self.heap.object(callee)?.is_constructor();
        if !is_constructor {
            return Err(self.throw_error(JsError::type_error("Expected a constructor.")));
        }
        let class = self.heap.object(callee)?.class.clone();
        match class {
            ObjectClass::BoundConstructor { target } => self.construct_for(target, args, new_target),
            ObjectClass::ImplicitConstructor => self.allocate_this(new_target),
            ObjectClass::Function(function) => {
                let this = self.allocate_this(new_target)?;
                let result =
                    self.run_function(function.state, callee, this, args, &function.captured)?;
                Ok(if result.is_object() { result } else { this })
            }
            ObjectClass::External(index) => {
                let this = self.allocate_this(new_target)?;
                self.pinned.push(this);
                let result = self.call_external(index, this, args);
                self.pinned.pop();
                let result = result?;
                Ok(if result.is_object() { result } else { this })
            }
            _ => Err(self.throw_error(JsError::type_error("Expected a constructor."))),
        }
    }

    /// Fresh object inheriting from `new_target.prototype`.
    fn allocate_this(&mut self, new_target: Value) -> VmResult<Value> {
        let mut proto = self.get(new_target, "prototype", new_target)?;
        if !proto.is_object() {
            proto = self.intrinsics.object_prototype;
        }
        self.heap.alloc_object(JsObject::new(ObjectClass::Ordinary, proto))
    }

    fn call_external(&mut self, index: usize, this: Value, args: &[Value]) -> VmResult<Value> {
        let func = self
            .externals
            .get(index)
            .map(|external| Rc::clone(&external.func))
            .ok_or_else(|| VmError::invariant(format!("external function #{index} is not registered")))?;
        func(self, this, args)
    }

    /// Runs compiled code in a new frame.
    ///
    /// `captured` binds the function's in-closure registers; bare states
    /// pass an empty slice.
    pub(crate) fn run_function(
        &mut self,
        state: Rc<FunctionState>,
        this_function: Value,
        this: Value,
        args: &[Value],
        captured: &[ClosureCell],
    ) -> VmResult<Value> {
        if self.call_stack.len() >= self.config.max_call_depth {
            return Err(self.throw_error(JsError::range_error("Maximum call stack size exceeded")));
        }
        let needs_arguments = state.flags.contains(FunctionFlags::ARGUMENTS_NEEDED);
        let mut ctx = ExecutionContext::new(state, this_function, this, args, captured)?;
        if needs_arguments {
            let scope = self.arguments_scope(this_function, args)?;
            ctx.scopes.push(scope);
        }

        let id = ctx.function.id;
        self.call_stack.push(CallFrame::new(id, ctx.function.argc));
        debug!(function = id, depth = self.call_stack.len(), "entering frame");
        let result = self.run_frame(&mut ctx);
        self.call_stack.pop();
        debug!(function = id, completed = result.is_ok(), "leaving frame");
        result
    }

    /// Lexical scope binding `arguments` to every passed argument, not only
    /// the declared ones.
    fn arguments_scope(&mut self, callee: Value, args: &[Value]) -> VmResult<Value> {
        let proto = self.intrinsics.object_prototype;
        let arguments = self
            .heap
            .alloc_object(JsObject::new(ObjectClass::Arguments, proto))?;
        for (index, arg) in args.iter().enumerate() {
            self.heap
                .define_own(arguments, &index.to_string(), Property::data(*arg))?;
        }
        let length = self.new_number(args.len() as f64)?;
        self.define_hidden(arguments, "length", length)?;
        self.define_hidden(arguments, "callee", callee)?;

        let scope = self.new_scope()?;
        self.heap.define_own(
            scope,
            "arguments",
            Property::Data {
                value: arguments,
                flags: PropertyFlags::WRITABLE,
            },
        )?;
        Ok(scope)
    }

    /// Empty lexical environment record.
    pub(crate) fn new_scope(&mut self) -> VmResult<Value> {
        self.heap
            .alloc_object(JsObject::new(ObjectClass::Declarative, Value::NULL))
    }
}
