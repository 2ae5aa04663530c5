//! Runtime orchestration for snapshot execution
//!
//! The Runtime owns one [`VmContext`] with a `print` host function
//! installed, and turns engine errors into [`CliError`]s.

use crate::cli::Cli;
use crate::error::{CliError, CliResult};
use bytecode_system::DecodedProgram;
use core_types::Value;
use interpreter::{VmConfig, VmContext, VmError};
use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};

/// Runs snapshots against a single VM context
pub struct Runtime {
    vm: VmContext,
    printed: Rc<RefCell<Vec<String>>>,
}

impl Runtime {
    /// Create a runtime whose `print` writes to stdout
    ///
    /// # Example
    /// ```
    /// use interpreter::VmConfig;
    /// use js_cli::Runtime;
    ///
    /// let runtime = Runtime::new(VmConfig::default()).unwrap();
    /// assert!(runtime.printed().is_empty());
    /// ```
    pub fn new(config: VmConfig) -> CliResult<Self> {
        Self::build(config, true)
    }

    /// Create a runtime whose `print` only records its lines
    pub fn capturing(config: VmConfig) -> CliResult<Self> {
        Self::build(config, false)
    }

    fn build(config: VmConfig, echo: bool) -> CliResult<Self> {
        let mut vm = VmContext::with_config(config)?;
        let printed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&printed);
        vm.register_external("print", move |vm, _this, args| {
            let line = args
                .iter()
                .map(|arg| vm.describe(*arg))
                .collect::<Vec<_>>()
                .join(" ");
            if echo {
                println!("{line}");
            }
            sink.borrow_mut().push(line);
            Ok(Value::UNDEFINED)
        })?;
        Ok(Self { vm, printed })
    }

    /// Read and decode a snapshot file
    ///
    /// # Errors
    /// [`CliError::Io`] if the file cannot be read, [`CliError::Decode`] if
    /// it is not a valid snapshot
    pub fn load_file(&mut self, path: &Path) -> CliResult<DecodedProgram> {
        let bytes = std::fs::read(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "snapshot read");
        self.load(&bytes)
    }

    /// Decode a snapshot already in memory
    pub fn load(&mut self, bytes: &[u8]) -> CliResult<DecodedProgram> {
        Ok(self.vm.load(bytes)?)
    }

    /// Run the program body and return its completion value
    ///
    /// # Errors
    /// [`CliError::Uncaught`] carries the rendered exception when the
    /// program throws; other engine failures are [`CliError::Vm`]
    pub fn execute(&mut self, program: &DecodedProgram) -> CliResult<Value> {
        match self.vm.execute(program) {
            Ok(value) => {
                info!(result = %self.vm.describe(value), "program completed");
                Ok(value)
            }
            Err(err @ VmError::Throw(_)) => Err(CliError::Uncaught(self.vm.describe_thrown(&err))),
            Err(err) => Err(err.into()),
        }
    }

    /// Rendering of a value as the runner prints it
    pub fn describe(&self, value: Value) -> String {
        self.vm.describe(value)
    }

    /// Listing of every function in `program`
    pub fn disassemble(&self, program: &DecodedProgram) -> String {
        program.disassemble(&|value| self.vm.describe(value))
    }

    /// Heap statistics, one `name: value` per line
    pub fn stats(&self) -> String {
        let stats = self.vm.heap_stats();
        [
            ("heap size", stats.size),
            ("allocated bytes", stats.allocated_bytes),
            ("peak allocated bytes", stats.peak_allocated_bytes),
            ("waste bytes", stats.waste_bytes),
            ("peak waste bytes", stats.peak_waste_bytes),
            ("allocations", stats.alloc_count),
            ("frees", stats.free_count),
            ("skip frees", stats.skip_count),
            ("non-skip frees", stats.nonskip_count),
            ("alloc iterations", stats.alloc_iter_count),
            ("free iterations", stats.free_iter_count),
            ("live cells", self.vm.live_cells()),
            ("collections", self.vm.collections()),
        ]
        .iter()
        .map(|(name, value)| format!("{name}: {value}\n"))
        .collect()
    }

    /// Lines passed to `print` so far
    pub fn printed(&self) -> Vec<String> {
        self.printed.borrow().clone()
    }

    /// Get access to the VM for direct manipulation
    pub fn vm(&mut self) -> &mut VmContext {
        &mut self.vm
    }
}

/// Everything `qking-run` does for one invocation, writing to `out`.
///
/// # Errors
/// Any [`CliError`]; the binary maps all of them to exit code 1.
pub fn run(cli: &Cli, out: &mut dyn Write) -> CliResult<()> {
    let mut runtime = Runtime::new(cli.vm_config()?)?;
    let program = runtime.load_file(&cli.snapshot)?;
    if cli.disassemble {
        write!(out, "{}", runtime.disassemble(&program)).map_err(CliError::Output)?;
    }
    let result = runtime.execute(&program)?;
    writeln!(out, "{}", runtime.describe(result)).map_err(CliError::Output)?;
    if cli.stats {
        write!(out, "{}", runtime.stats()).map_err(CliError::Output)?;
    }
    Ok(())
}
