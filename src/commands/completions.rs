//! `nimp completions [SHELL] [--output DIR]`
//!
//! Prints the completion script of `SHELL`, or of the shell named by
//! `$SHELL` when none is given. Build agents provisioning many machines use
//! `--output` to drop the script into a completion directory under its
//! conventional file name (`nimp.bash`, `_nimp`, `nimp.fish`...).

use anyhow::{Context as _, Result};
use clap::{Args, CommandFactory};
use clap_complete::{generate, generate_to, Shell};
use std::io;
use std::path::PathBuf;

use crate::cli::Cli;

const BIN_NAME: &str = "nimp";

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell; detected from $SHELL when omitted
    #[arg(value_enum)]
    pub shell: Option<Shell>,

    /// Write the script into DIR instead of stdout
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

pub fn execute(args: CompletionsArgs) -> Result<()> {
    let shell = args
        .shell
        .or_else(Shell::from_env)
        .context("Cannot detect the shell from $SHELL, pass it explicitly")?;
    let mut command = Cli::command();

    match args.output {
        Some(dir) => {
            let path = generate_to(shell, &mut command, BIN_NAME, &dir)
                .with_context(|| format!("Cannot write completions into {}", dir.display()))?;
            log::info!("Wrote {} completions to {}", shell, path.display());
        }
        None => generate(shell, &mut command, BIN_NAME, &mut io::stdout()),
    }
    Ok(())
}
