//! # nimp CLI
//!
//! Binary entry point. It parses arguments with `clap`, installs the Ctrl-C
//! handler and maps the command result onto the process exit code:
//!
//! - `0`: success
//! - `1`: the command failed, hit an error, or was interrupted
//! - `2`: invalid usage (reported by `clap`)
//!
//! All the work is done by the `nimp` library crate.

mod cli;
mod commands;

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    nimp::interrupt::install_handler();

    let succeeded = match cli.execute() {
        Ok(succeeded) => succeeded,
        Err(e) => {
            log::error!("{:#}", e);
            false
        }
    };

    if succeeded && !nimp::interrupt::requested() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
