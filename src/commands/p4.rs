//! # P4 Command Implementation
//!
//! Workspace-level Perforce operations:
//!
//! - `p4 revert-workspace`: revert every opened file and delete every
//!   pending changelist of the workspace.
//! - `p4 submit <description>`: submit the pending changelist with that
//!   description.
//! - `p4 fileset <operation> <fileset> <description>`: check out, revert,
//!   reconcile or sync the sources of a configured fileset. The `default`
//!   description targets the default changelist.

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use super::Context;
use nimp::format::interpolate;
use nimp::mapper::Bindings;
use nimp::p4::{ChangelistId, P4};

/// Perforce workspace and changelist operations
#[derive(Args, Debug)]
pub struct P4Args {
    #[command(subcommand)]
    pub command: P4Command,
}

#[derive(Subcommand, Debug)]
pub enum P4Command {
    /// Revert all opened files and delete pending changelists
    RevertWorkspace,

    /// Submit the pending changelist with the given description
    Submit {
        /// Changelist description
        description: String,
    },

    /// Run an operation over the files of a fileset
    Fileset {
        /// Operation to run
        #[arg(value_enum)]
        operation: FilesetOperation,
        /// Fileset name, as declared in .nimp.conf
        fileset: String,
        /// Changelist description (`default` for the default changelist)
        description: String,
        /// Extra `{name}` bindings, as NAME=VALUE
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_binding)]
        bindings: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilesetOperation {
    /// Open the files for edit
    Checkout,
    /// Revert the files
    Revert,
    /// Reconcile the files with the working copy
    Reconcile,
    /// Sync the files to head
    Sync,
}

pub(crate) fn parse_binding(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))
}

/// Execute the `p4` command.
pub fn execute(context: &Context, args: P4Args) -> Result<bool> {
    let p4 = context.p4();
    match args.command {
        P4Command::RevertWorkspace => {
            log::info!("Reverting workspace");
            Ok(p4.clean_workspace())
        }
        P4Command::Submit { description } => {
            let changelist = p4.get_or_create_changelist(&description)?;
            Ok(p4.submit(&changelist))
        }
        P4Command::Fileset {
            operation,
            fileset,
            description,
            bindings,
        } => {
            let bindings: Bindings = bindings.into_iter().collect();
            let mapper = context.config.fileset(&fileset, &context.root_dir, &bindings)?;
            let files: Vec<PathBuf> = mapper.iter()?.into_iter().map(|pair| pair.src).collect();
            log::info!("{:?} {} file(s) of fileset '{}'", operation, files.len(), fileset);

            let description = expand_description(context, &bindings, &description)?;
            run_operation(&p4, operation, &files, &description)
        }
    }
}

/// Fills `{name}` placeholders of a changelist description from the
/// configuration settings, `root_dir` and `--set` bindings.
fn expand_description(context: &Context, extra: &Bindings, description: &str) -> Result<String> {
    let mut bindings = context.config.settings.bindings();
    bindings.insert(
        "root_dir".to_string(),
        context.root_dir.to_string_lossy().replace('\\', "/"),
    );
    bindings.extend(extra.clone());
    Ok(interpolate(description, |key| bindings.get(key).cloned())?)
}

fn run_operation(
    p4: &P4,
    operation: FilesetOperation,
    files: &[PathBuf],
    description: &str,
) -> Result<bool> {
    Ok(match operation {
        FilesetOperation::Checkout => p4.edit(&changelist(p4, description)?, files),
        FilesetOperation::Reconcile => p4.reconcile(&changelist(p4, description)?, files),
        FilesetOperation::Revert => p4.revert_files(files),
        FilesetOperation::Sync => p4.sync(files, None),
    })
}

fn changelist(p4: &P4, description: &str) -> Result<ChangelistId> {
    if description.eq_ignore_ascii_case("default") {
        Ok(ChangelistId::default_changelist())
    } else {
        Ok(p4.get_or_create_changelist(description)?)
    }
}
