//! Snapshot runner library
//!
//! Provides the argument parser, the Runtime wrapping a VM context and the
//! error type behind the `qking-run` binary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod runtime;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use runtime::{run, Runtime};
