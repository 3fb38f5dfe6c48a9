//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

use crate::commands::{self, Context};
use nimp::logging::{self, LogFormat};
use nimp::output::OutputConfig;
use nimp::p4::P4Config;

/// nimp - Perforce changelist transactions and tool orchestration for game
/// content pipelines
#[derive(Parser, Debug)]
#[command(name = "nimp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Less output (-q warnings only, -qq errors only)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    quiet: u8,

    /// Set log level (off, error, warn, info, debug, trace); overrides -v/-q
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LevelFilter>,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value = "standard")]
    log_format: LogFormat,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Configuration file (default: closest .nimp.conf above the current directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,
}

/// Perforce connection overrides; they win over `.nimp.conf`.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// Perforce server address
    #[arg(long, global = true, env = "P4PORT", value_name = "PORT")]
    p4port: Option<String>,

    /// Perforce user
    #[arg(long, global = true, env = "P4USER", value_name = "USER")]
    p4user: Option<String>,

    /// Perforce password
    #[arg(long, global = true, env = "P4PASSWD", value_name = "PASSWORD", hide_env_values = true)]
    p4pass: Option<String>,

    /// Perforce workspace
    #[arg(long, global = true, env = "P4CLIENT", value_name = "WORKSPACE")]
    p4client: Option<String>,
}

impl From<ConnectionArgs> for P4Config {
    fn from(args: ConnectionArgs) -> Self {
        P4Config {
            port: args.p4port,
            user: args.p4user,
            password: args.p4pass,
            client: args.p4client,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Perforce workspace and changelist operations
    P4(commands::p4::P4Args),

    /// Inspect or delete the files of a configured fileset
    Fileset(commands::fileset::FilesetArgs),

    /// Run a tool, optionally inside a changelist transaction
    Run(commands::run::RunArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Sets up logging and runs the command. `Ok(false)` means the command
    /// ran but failed.
    pub fn execute(self) -> Result<bool> {
        let output = OutputConfig::from_env_and_flag(&self.color);
        let level = self
            .log_level
            .unwrap_or_else(|| logging::level_from_verbosity(self.verbose, self.quiet));
        if let Err(e) = logging::init(level, self.log_format, output.use_color) {
            eprintln!("Logger already initialized: {}", e);
        }

        if let Commands::Completions(args) = self.command {
            commands::completions::execute(args)?;
            return Ok(true);
        }

        let context = Context::load(self.config.as_deref(), self.connection.into(), output)?;
        match self.command {
            Commands::P4(args) => commands::p4::execute(&context, args),
            Commands::Fileset(args) => commands::fileset::execute(&context, args),
            Commands::Run(args) => commands::run::execute(&context, args),
            Commands::Completions(_) => Ok(true),
        }
    }
}
