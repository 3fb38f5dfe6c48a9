//! # Fileset Command Implementation
//!
//! `fileset list` prints the `(source, destination)` pairs of a configured
//! fileset through a `{src}`/`{dst}` template. `fileset delete` removes the
//! source files from disk. Neither talks to Perforce.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use std::fs;

use super::p4::parse_binding;
use super::Context;
use nimp::format::interpolate;
use nimp::mapper::Bindings;
use nimp::output::emoji;
use nimp::path::standardize;

/// Inspect or delete the files of a configured fileset
#[derive(Args, Debug)]
pub struct FilesetArgs {
    #[command(subcommand)]
    pub command: FilesetCommand,
}

#[derive(Subcommand, Debug)]
pub enum FilesetCommand {
    /// Print the files of a fileset
    List {
        /// Fileset name, as declared in .nimp.conf
        fileset: String,
        /// Line template; `{src}` and `{dst}` are replaced
        #[arg(long, default_value = "{src} => {dst}")]
        format: String,
        /// Extra `{name}` bindings, as NAME=VALUE
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_binding)]
        bindings: Vec<(String, String)>,
    },

    /// Delete the source files of a fileset
    Delete {
        /// Fileset name, as declared in .nimp.conf
        fileset: String,
        /// Only print what would be deleted
        #[arg(long)]
        dry_run: bool,
        /// Extra `{name}` bindings, as NAME=VALUE
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_binding)]
        bindings: Vec<(String, String)>,
    },
}

/// Execute the `fileset` command.
pub fn execute(context: &Context, args: FilesetArgs) -> Result<bool> {
    match args.command {
        FilesetCommand::List {
            fileset,
            format,
            bindings,
        } => {
            let bindings: Bindings = bindings.into_iter().collect();
            let mapper = context.config.fileset(&fileset, &context.root_dir, &bindings)?;
            for (src, dst) in mapper.to_list()? {
                let line = interpolate(&format, |key| match key {
                    "src" => Some(src.clone()),
                    "dst" => Some(dst.clone()),
                    _ => None,
                })?;
                println!("{}", line);
            }
            Ok(true)
        }
        FilesetCommand::Delete {
            fileset,
            dry_run,
            bindings,
        } => {
            let bindings: Bindings = bindings.into_iter().collect();
            let mapper = context.config.fileset(&fileset, &context.root_dir, &bindings)?;
            let mut deleted = 0;
            for pair in mapper.iter()? {
                if !pair.src.is_file() {
                    continue;
                }
                if dry_run {
                    println!("{} {}", emoji(&context.output, "🗑️ ", "[DRY-RUN]"), standardize(&pair.src));
                    continue;
                }
                log::debug!("Deleting {}", pair.src.display());
                fs::remove_file(&pair.src)
                    .with_context(|| format!("Cannot delete {}", pair.src.display()))?;
                deleted += 1;
            }
            if !dry_run {
                log::info!("Deleted {} file(s) of fileset '{}'", deleted, fileset);
            }
            Ok(true)
        }
    }
}
