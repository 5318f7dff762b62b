//! # grip CLI
//!
//! Binary entry point for the `grip` command-line tool. Parses arguments
//! with `clap`, runs the selected command and maps failures to the exit
//! status of their error class. Usage errors are reported by `clap` itself
//! with status 2.
//!
//! The binary is a thin wrapper around the `grip` library.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Exit status for `err`: the class code of the first library error in its
/// chain, 1 for anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<grip::error::Error>())
        .map(grip::error::Error::exit_code)
        .unwrap_or(1)
}
