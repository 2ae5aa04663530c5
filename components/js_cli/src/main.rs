//! qking-run
//!
//! Entry point for the snapshot runner. Parses CLI arguments, installs the
//! log subscriber and delegates to [`js_cli::run`].

use clap::Parser as ClapParser;
use js_cli::Cli;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn install_subscriber(trace: bool) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if trace => EnvFilter::new("trace"),
        Err(_) => return,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_subscriber(cli.trace);

    let stdout = std::io::stdout();
    match js_cli::run(&cli, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
