//! The VM context
//!
//! [`VmContext`] owns everything a running script can reach: the managed
//! heap, the global object, the intrinsic prototypes and the host function
//! table. Snapshots are loaded into it with [`VmContext::load`] and run with
//! [`VmContext::execute`] or [`VmContext::run`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use bytecode_system::{decode, DecodeError, DecodedProgram, FunctionState, LiteralAllocator};
use core_types::{Backtrace, ErrorKind, JsError, StackFrame, Value};
use memory_manager::{HeapStats, Property, PropertyFlags, Severity};
use tracing::{debug, info};

use crate::call_frame::CallFrame;
use crate::config::VmConfig;
use crate::context::ExecutionContext;
use crate::error::{VmError, VmResult};
use crate::heap::VmHeap;
use crate::hooks::{DebuggerHooks, StopCallback};
use crate::object::{JsObject, ObjectClass};

/// Signature of a host function: `(context, this, arguments)`.
pub type NativeFunction = Rc<dyn Fn(&mut VmContext, Value, &[Value]) -> VmResult<Value>>;

/// A host function callable from scripts.
#[derive(Clone)]
pub struct External {
    /// Name it was registered under
    pub name: Rc<str>,
    /// The function
    pub func: NativeFunction,
}

impl fmt::Debug for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("External").field("name", &self.name).finish()
    }
}

/// Objects created once per context and shared by every script.
#[derive(Debug, Clone, Copy)]
pub struct Intrinsics {
    /// `Object.prototype`
    pub object_prototype: Value,
    /// Prototype of every function object
    pub function_prototype: Value,
    /// Prototype of arrays
    pub array_prototype: Value,
    /// Prototype consulted for properties of primitive strings
    pub string_prototype: Value,
    /// Prototype consulted for properties of primitive numbers
    pub number_prototype: Value,
    /// Prototype consulted for properties of primitive booleans
    pub boolean_prototype: Value,
    /// Prototype of regular expression literals
    pub regexp_prototype: Value,
    /// Error prototypes, indexed like [`ErrorKind::ALL`]
    pub error_prototypes: [Value; 7],
}

/// An embeddable script engine instance.
///
/// # Examples
///
/// ```
/// use bytecode_system::{FunctionRecord, Instruction, OpCode, SnapshotWriter, Constant};
/// use core_types::Value;
/// use interpreter::VmContext;
///
/// let mut writer = SnapshotWriter::new();
/// writer.add_function(FunctionRecord {
///     stack_size: 2,
///     constants: vec![Constant::Integer(42)],
///     instructions: vec![
///         Instruction::abx(OpCode::LoadK, 1, 0),
///         Instruction::abc(OpCode::Return1, 1, 0, 0),
///     ],
///     ..FunctionRecord::root()
/// });
///
/// let mut vm = VmContext::new().unwrap();
/// let program = vm.load(&writer.finish()).unwrap();
/// assert_eq!(vm.execute(&program).unwrap(), Value::make_integer(42));
/// ```
pub struct VmContext {
    pub(crate) heap: VmHeap,
    pub(crate) config: VmConfig,
    pub(crate) global: Value,
    pub(crate) intrinsics: Intrinsics,
    pub(crate) externals: Vec<External>,
    pub(crate) call_stack: Vec<CallFrame>,
    pub(crate) hooks: Option<Box<dyn DebuggerHooks>>,
    pub(crate) stop_callback: Option<StopCallback>,
    pub(crate) steps: u32,
    /// Functions of every loaded snapshot; their literals stay alive
    pub(crate) loaded: Vec<Rc<FunctionState>>,
    /// State of the frames suspended in a `CALL` or `CONSTRUCTOR`
    pub(crate) suspended: Vec<ExecutionContext>,
    /// Values held only by engine code across a call into a script
    pub(crate) pinned: Vec<Value>,
    /// Highest severity the heap reported since the last collection
    pub(crate) pressure: Rc<Cell<Option<Severity>>>,
    pub(crate) gc_threshold: usize,
    pub(crate) collections: usize,
    /// Functions entered so far, script or host
    pub(crate) invocations: u64,
}

impl fmt::Debug for VmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmContext")
            .field("config", &self.config)
            .field("live_cells", &self.heap.live_cells())
            .field("externals", &self.externals.len())
            .field("call_depth", &self.call_stack.len())
            .field("collections", &self.collections)
            .finish()
    }
}

impl VmContext {
    /// Context with the default configuration.
    ///
    /// # Errors
    ///
    /// [`VmError::OutOfMemory`] when the intrinsics do not fit the heap.
    pub fn new() -> VmResult<Self> {
        Self::with_config(VmConfig::default())
    }

    /// Context with `config`.
    ///
    /// # Errors
    ///
    /// [`VmError::OutOfMemory`] when the intrinsics do not fit the heap.
    pub fn with_config(config: VmConfig) -> VmResult<Self> {
        let mut heap = VmHeap::new(config.heap_size, config.heap_desired_limit);
        let pressure = Rc::new(Cell::new(None));
        let reported = Rc::clone(&pressure);
        heap.allocator_mut()
            .set_free_unused_memory_callback(Box::new(move |severity: Severity, _| {
                let highest = reported.get().map_or(severity, |seen: Severity| seen.max(severity));
                reported.set(Some(highest));
            }));
        let object_prototype = heap.alloc_object(JsObject::new(ObjectClass::Ordinary, Value::NULL))?;
        let mut derived = |class: ObjectClass| {
            heap.alloc_object(JsObject::new(class, object_prototype))
        };
        let function_prototype = derived(ObjectClass::Ordinary)?;
        let array_prototype = derived(ObjectClass::Array)?;
        let string_prototype = derived(ObjectClass::Ordinary)?;
        let number_prototype = derived(ObjectClass::Ordinary)?;
        let boolean_prototype = derived(ObjectClass::Ordinary)?;
        let regexp_prototype = derived(ObjectClass::Ordinary)?;
        let global = derived(ObjectClass::Ordinary)?;

        // derived error prototypes are relinked to Error.prototype below
        let mut error_prototypes = [Value::UNDEFINED; 7];
        for slot in error_prototypes.iter_mut() {
            *slot = derived(ObjectClass::Ordinary)?;
        }

        let mut vm = Self {
            heap,
            config,
            global,
            intrinsics: Intrinsics {
                object_prototype,
                function_prototype,
                array_prototype,
                string_prototype,
                number_prototype,
                boolean_prototype,
                regexp_prototype,
                error_prototypes,
            },
            externals: Vec::new(),
            call_stack: Vec::new(),
            hooks: None,
            stop_callback: None,
            steps: 0,
            loaded: Vec::new(),
            suspended: Vec::new(),
            pinned: Vec::new(),
            pressure,
            gc_threshold: 0,
            collections: 0,
            invocations: 0,
        };
        vm.link_error_prototypes()?;
        vm.install_globals()?;
        vm.gc_threshold = vm.heap.allocated_bytes() + vm.config.gc_step();
        debug!(heap_size = vm.config.heap_size, "vm context created");
        Ok(vm)
    }

    fn link_error_prototypes(&mut self) -> VmResult<()> {
        let base = self.intrinsics.error_prototypes[0];
        for (proto, kind) in self.intrinsics.error_prototypes.into_iter().zip(ErrorKind::ALL) {
            if kind != ErrorKind::Error {
                self.heap.set_proto(proto, base)?;
            }
            let name = self.new_string(kind.name())?;
            self.define_hidden(proto, "name", name)?;
            let empty = self.new_string("")?;
            self.define_hidden(proto, "message", empty)?;
        }
        Ok(())
    }

    fn install_globals(&mut self) -> VmResult<()> {
        let global = self.global;
        self.define_hidden(global, "undefined", Value::UNDEFINED)?;
        let nan = self.new_number(f64::NAN)?;
        self.define_hidden(global, "NaN", nan)?;
        let infinity = self.new_number(f64::INFINITY)?;
        self.define_hidden(global, "Infinity", infinity)?;
        self.define_hidden(global, "globalThis", global)?;

        for kind in ErrorKind::ALL {
            let constructor = self.register_external(kind.name(), move |vm, _this, args| {
                let message = match args.first() {
                    Some(value) if !value.is_undefined() => vm.to_js_string(*value)?,
                    _ => Rc::from(""),
                };
                vm.new_error(JsError::new(kind, message.as_ref()))
            })?;
            let proto = self.intrinsics.error_prototypes[error_index(kind)];
            self.define_hidden(constructor, "prototype", proto)?;
            self.define_hidden(proto, "constructor", constructor)?;
        }
        Ok(())
    }

    /// Decodes a snapshot, allocating its literals on this context's heap.
    ///
    /// # Errors
    ///
    /// [`VmError::Decode`] for malformed snapshots.
    pub fn load(&mut self, bytes: &[u8]) -> VmResult<DecodedProgram> {
        let program = decode(bytes, self)?;
        self.loaded.extend(program.functions.iter().cloned());
        info!(functions = program.functions.len(), "snapshot loaded");
        Ok(program)
    }

    /// Runs the program body with the global object as `this`.
    pub fn execute(&mut self, program: &DecodedProgram) -> VmResult<Value> {
        let global = self.global;
        self.run(&program.root, global, &[])
    }

    /// Runs `function` as a bare state: no function object and no captured
    /// cells.
    ///
    /// # Errors
    ///
    /// [`VmError::Throw`] for an uncaught script exception, or any
    /// non-catchable error.
    pub fn run(&mut self, function: &Rc<FunctionState>, this: Value, args: &[Value]) -> VmResult<Value> {
        self.run_function(Rc::clone(function), Value::UNDEFINED, this, args, &[])
    }

    /// Installs a host function as a global binding and returns its function
    /// object.
    pub fn register_external<F>(&mut self, name: &str, func: F) -> VmResult<Value>
    where
        F: Fn(&mut VmContext, Value, &[Value]) -> VmResult<Value> + 'static,
    {
        let index = self.externals.len();
        self.externals.push(External {
            name: Rc::from(name),
            func: Rc::new(func),
        });
        let object = self.heap.alloc_object(JsObject::new(
            ObjectClass::External(index),
            self.intrinsics.function_prototype,
        ))?;
        let global = self.global;
        self.define_hidden(global, name, object)?;
        debug!(name, index, "external function registered");
        Ok(object)
    }

    /// The global object.
    pub fn global(&self) -> Value {
        self.global
    }

    /// The intrinsic objects.
    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// The active configuration.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Global binding `name`, or `None` when it does not exist.
    pub fn get_global(&mut self, name: &str) -> VmResult<Option<Value>> {
        let global = self.global;
        if !self.has_property(global, name)? {
            return Ok(None);
        }
        self.get(global, name, global).map(Some)
    }

    /// Creates or updates global binding `name`.
    pub fn set_global(&mut self, name: &str, value: Value) -> VmResult<()> {
        let global = self.global;
        self.set(global, name, value)
    }

    /// Plain object inheriting from `Object.prototype`.
    pub fn new_object(&mut self) -> VmResult<Value> {
        let proto = self.intrinsics.object_prototype;
        self.heap.alloc_object(JsObject::new(ObjectClass::Ordinary, proto))
    }

    /// Array holding `elements`.
    pub fn new_array(&mut self, elements: &[Value]) -> VmResult<Value> {
        let proto = self.intrinsics.array_prototype;
        let array = self.heap.alloc_object(JsObject::new(ObjectClass::Array, proto))?;
        for (index, element) in elements.iter().enumerate() {
            self.heap
                .define_own(array, &index.to_string(), Property::data(*element))?;
        }
        let length = self.new_number(elements.len() as f64)?;
        self.heap.define_own(
            array,
            "length",
            Property::Data {
                value: length,
                flags: PropertyFlags::WRITABLE,
            },
        )?;
        Ok(array)
    }

    /// Error object of `error.kind` carrying `error.message`.
    pub fn new_error(&mut self, error: JsError) -> VmResult<Value> {
        let proto = self.intrinsics.error_prototypes[error_index(error.kind)];
        let object = self
            .heap
            .alloc_object(JsObject::new(ObjectClass::Error(error.kind), proto))?;
        let message = self.new_string(&error.message)?;
        self.define_hidden(object, "message", message)?;
        Ok(object)
    }

    /// Materialises `error` and returns it as a thrown [`VmError::Throw`].
    pub fn throw_error(&mut self, error: JsError) -> VmError {
        debug!(%error, "raising script error");
        match self.new_error(error) {
            Ok(object) => VmError::Throw(object),
            Err(err) => err,
        }
    }

    pub(crate) fn define_hidden(&mut self, object: Value, name: &str, value: Value) -> VmResult<()> {
        self.heap.define_own(
            object,
            name,
            Property::Data {
                value,
                flags: PropertyFlags::HIDDEN,
            },
        )
    }

    /// The heap, for inspection.
    pub fn heap(&self) -> &VmHeap {
        &self.heap
    }

    /// Allocator counters.
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Number of live heap cells.
    pub fn live_cells(&self) -> usize {
        self.heap.live_cells()
    }

    /// Current call depth.
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Frames of the running scripts, innermost first.
    pub fn backtrace(&self) -> Backtrace {
        Backtrace {
            frames: self
                .call_stack
                .iter()
                .rev()
                .map(|frame| StackFrame::from(*frame))
                .collect(),
        }
    }

    /// Hands the current backtrace to the debugger hooks, if attached.
    pub fn send_backtrace(&mut self) {
        let backtrace = self.backtrace();
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.send_backtrace(&backtrace);
        }
    }

    /// Attaches a debugger.
    pub fn set_debugger_hooks(&mut self, hooks: Box<dyn DebuggerHooks>) {
        self.hooks = Some(hooks);
    }

    /// Detaches the debugger.
    pub fn clear_debugger_hooks(&mut self) -> Option<Box<dyn DebuggerHooks>> {
        self.hooks.take()
    }

    /// Installs the callback polled every `stop_check_interval` instructions.
    pub fn set_stop_callback<F>(&mut self, callback: F)
    where
        F: FnMut() -> bool + 'static,
    {
        self.stop_callback = Some(Box::new(callback));
        self.steps = 0;
    }

    /// Human-readable rendering of a value that never calls into scripts.
    pub fn describe(&self, value: Value) -> String {
        if let Some(text) = self.string_text(value) {
            return text.to_string();
        }
        if let Some(number) = self.number_value(value) {
            return number_to_string(number);
        }
        match value {
            Value::TRUE => return "true".into(),
            Value::FALSE => return "false".into(),
            Value::UNDEFINED => return "undefined".into(),
            Value::NULL => return "null".into(),
            _ => {}
        }
        let Ok(object) = self.heap.object(value) else {
            return format!("{value:?}");
        };
        match &object.class {
            ObjectClass::Error(kind) => match self.error_message(value) {
                Some(message) if !message.is_empty() => format!("{}: {message}", kind.name()),
                _ => kind.name().to_string(),
            },
            ObjectClass::Function(function) => format!("[function #{}]", function.state.id),
            ObjectClass::External(index) => match self.externals.get(*index) {
                Some(external) => format!("[function {}]", external.name),
                None => "[function]".into(),
            },
            ObjectClass::ImplicitConstructor | ObjectClass::BoundConstructor { .. } => {
                "[class]".into()
            }
            ObjectClass::Array => {
                let length = self
                    .heap
                    .own_property(value, "length")
                    .ok()
                    .flatten()
                    .and_then(|p| match p {
                        Property::Data { value, .. } => self.number_value(value),
                        Property::Accessor { .. } => None,
                    })
                    .unwrap_or(0.0) as usize;
                let items: Vec<String> = (0..length)
                    .map(|index| match self.heap.own_property(value, &index.to_string()) {
                        Ok(Some(Property::Data { value, .. })) if !value.is_nullish() => {
                            self.describe(value)
                        }
                        _ => String::new(),
                    })
                    .collect();
                format!("[{}]", items.join(","))
            }
            ObjectClass::RegExp { source, flags } => format!(
                "/{}/{}",
                self.string_text(*source).unwrap_or_default(),
                self.string_text(*flags).unwrap_or_default()
            ),
            _ => "[object Object]".into(),
        }
    }

    fn error_message(&self, error: Value) -> Option<String> {
        let mut current = error;
        while current.is_object() {
            if let Ok(Some(Property::Data { value, .. })) = self.heap.own_property(current, "message") {
                return self.string_text(value).map(|text| text.to_string());
            }
            current = self.heap.proto(current).ok()?;
        }
        None
    }

    /// Rendering of an uncaught exception, such as `TypeError: Expected a function.`.
    pub fn describe_thrown(&self, error: &VmError) -> String {
        match error {
            VmError::Throw(value) => self.describe(*value),
            other => other.to_string(),
        }
    }
}

/// Position of `kind` in [`ErrorKind::ALL`].
pub(crate) fn error_index(kind: ErrorKind) -> usize {
    ErrorKind::ALL
        .iter()
        .position(|candidate| *candidate == kind)
        .unwrap_or(0)
}

/// ECMAScript `Number::toString` for radix 10.
pub fn number_to_string(number: f64) -> String {
    if number.is_nan() {
        return "NaN".into();
    }
    if number == 0.0 {
        return "0".into();
    }
    if number.is_infinite() {
        return if number > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    let sign = if number < 0.0 { "-" } else { "" };

    let mut buffer = ryu::Buffer::new();
    let shortest = buffer.format_finite(number.abs());
    let (mantissa, exponent) = match shortest.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => (shortest, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let mut digits: String = format!("{int_part}{frac_part}");
    let mut point = int_part.len() as i32 + exponent;
    let leading = digits.len() - digits.trim_start_matches('0').len();
    digits.drain(..leading);
    point -= leading as i32;
    let trimmed = digits.trim_end_matches('0').len();
    digits.truncate(trimmed);

    let k = digits.len() as i32;
    let n = point;
    let body = if k <= n && n <= 21 {
        format!("{digits}{}", "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        format!("{}.{}", &digits[..n as usize], &digits[n as usize..])
    } else if -6 < n && n <= 0 {
        format!("0.{}{digits}", "0".repeat((-n) as usize))
    } else {
        let exponent = n - 1;
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{exp_sign}{}", exponent.abs())
        } else {
            format!("{first}.{rest}e{exp_sign}{}", exponent.abs())
        }
    };
    format!("{sign}{body}")
}

impl LiteralAllocator for VmContext {
    fn number(&mut self, value: f64) -> Result<Value, DecodeError> {
        self.new_number(value)
            .map_err(|err| DecodeError::InvalidConstant(err.to_string()))
    }

    fn string(&mut self, text: &str) -> Result<Value, DecodeError> {
        self.new_string(text)
            .map_err(|err| DecodeError::InvalidConstant(err.to_string()))
    }

    fn regexp(&mut self, source: Value, flags: Value) -> Result<Value, DecodeError> {
        let proto = self.intrinsics.regexp_prototype;
        let object = self
            .heap
            .alloc_object(JsObject::new(ObjectClass::RegExp { source, flags }, proto))
            .map_err(|err| DecodeError::InvalidConstant(err.to_string()))?;
        for (name, value) in [("source", source), ("flags", flags)] {
            self.define_hidden(object, name, value)
                .map_err(|err| DecodeError::InvalidConstant(err.to_string()))?;
        }
        Ok(object)
    }
}
