//! Command line arguments

use crate::error::{CliError, CliResult};
use clap::Parser;
use interpreter::VmConfig;
use std::path::PathBuf;

/// Runs a compiled bytecode snapshot and prints its completion value.
#[derive(Debug, Parser)]
#[command(name = "qking-run", version, about)]
pub struct Cli {
    /// Snapshot file to execute
    pub snapshot: PathBuf,

    /// Print every function's constants and instructions before running
    #[arg(long)]
    pub disassemble: bool,

    /// Print heap statistics after running
    #[arg(long)]
    pub stats: bool,

    /// Enable trace-level logging (RUST_LOG takes precedence)
    #[arg(long)]
    pub trace: bool,

    /// JSON file with `VmConfig` fields
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the heap size in bytes
    #[arg(long, value_name = "BYTES")]
    pub heap_size: Option<usize>,

    /// Override the nesting limit for calls
    #[arg(long, value_name = "DEPTH")]
    pub max_call_depth: Option<usize>,
}

impl Cli {
    /// The VM configuration: defaults, then the config file, then flags.
    ///
    /// # Errors
    ///
    /// [`CliError::Io`] when the file cannot be read and
    /// [`CliError::Config`] when it does not parse.
    pub fn vm_config(&self) -> CliResult<VmConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_str(&text)?
            }
            None => VmConfig::default(),
        };
        if let Some(heap_size) = self.heap_size {
            config.heap_size = heap_size;
        }
        if let Some(depth) = self.max_call_depth {
            config.max_call_depth = depth;
        }
        Ok(config)
    }
}
