//! # CLI Command Implementations
//!
//! Each subcommand lives in its own file with:
//! - An `Args` struct derived with `clap`.
//! - An `execute` function taking the shared [`Context`] and the parsed
//!   `Args`, returning `Ok(false)` when the command ran but failed.
//!
//! Commands only orchestrate; the work is done by the `nimp` library.

pub mod completions;
pub mod fileset;
pub mod p4;
pub mod run;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use nimp::config::Config;
use nimp::output::OutputConfig;
use nimp::p4::{P4Config, P4};

/// State shared by every command.
pub struct Context {
    pub config: Config,
    /// Directory holding `.nimp.conf`, or the current directory.
    pub root_dir: PathBuf,
    pub connection: P4Config,
    pub output: OutputConfig,
}

impl Context {
    /// Loads `config_path`, or discovers `.nimp.conf` from the current
    /// directory. Connection overrides win over configured values.
    pub fn load(config_path: Option<&Path>, overrides: P4Config, output: OutputConfig) -> Result<Self> {
        let cwd = std::env::current_dir().context("Cannot read the current directory")?;
        let config = match config_path {
            Some(path) => Config::load(path)
                .with_context(|| format!("Cannot load configuration {}", path.display()))?,
            None => Config::discover(&cwd)?,
        };
        let root_dir = config.root_dir(&cwd);
        let connection = P4Config::from_settings(&config.settings).merged_with(overrides);
        Ok(Self {
            config,
            root_dir,
            connection,
            output,
        })
    }

    pub fn p4(&self) -> P4 {
        P4::new(self.connection.clone()).with_cwd(&self.root_dir)
    }
}
