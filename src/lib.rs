//! # nimp
//!
//! Building blocks for game content pipelines that run external tools and
//! record their results in Perforce.
//!
//! ## Quick Example
//!
//! ```no_run
//! use nimp::p4::{P4Config, P4};
//! use nimp::transaction::Transaction;
//! use std::path::Path;
//!
//! let p4 = P4::new(P4Config::default());
//! let builder = Transaction::builder(&p4, "[CI] Updated Banks").submit_on_success(true);
//! let (_, committed) = Transaction::run(builder, |tx| {
//!     tx.add(Path::new("Content/Banks/ps4/Music.bnk"));
//!     Ok::<_, nimp::error::Error>(())
//! })?;
//! assert!(committed);
//! # Ok::<(), nimp::error::Error>(())
//! ```
//!
//! ## Core Concepts
//!
//! - **Process runner (`process`)**: starts child processes, captures or
//!   streams their output line by line (stdout, stderr and the Windows
//!   debug channel), decodes console code pages.
//! - **Perforce client (`p4`)**: changelist-scoped mutations and workspace
//!   queries over the `p4` command line, with retries on server timeouts.
//! - **Transactions (`transaction`)**: a pending changelist that is either
//!   submitted or reverted and deleted, whatever happens inside the scope.
//! - **File mapper (`mapper`)**: declarative `(source, destination)`
//!   enumeration used to select the files an operation touches.
//! - **Configuration (`config`)**: `.nimp.conf` settings, environment and
//!   named filesets.
//!
//! ## Execution Flow
//!
//! A command builds a file mapper to compute the affected files, opens a
//! transaction for a description, runs tools through the process runner,
//! and ends the transaction with the outcome of that work.

pub mod config;
pub mod error;
pub mod format;
pub mod interrupt;
pub mod logging;
pub mod mapper;
pub mod output;
pub mod p4;
pub mod path;
pub mod process;
pub mod transaction;

#[cfg(test)]
mod path_proptest;
