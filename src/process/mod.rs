//! # Process Runner
//!
//! Everything nimp does with external tools goes through this module: the
//! Perforce client, build tools, cookers and packagers are all child
//! processes started from an [`Invocation`].
//!
//! ## Modes
//!
//! - **Capture** ([`ProcessRunner::capture`]): run to completion and return the
//!   exit code together with the decoded stdout and stderr.
//! - **Stream** ([`ProcessRunner::stream`]): forward every decoded line to a
//!   [`LineSink`] as it arrives. Stdout, stderr and (on Windows) the
//!   `OutputDebugString` channel are drained concurrently; lines within one
//!   stream keep their order, lines across streams do not.
//!
//! A non-zero exit code is data, not an error. The only error a runner
//! reports is [`Error::ProcessSpawnFailed`](crate::error::Error::ProcessSpawnFailed).
//!
//! ## Design
//!
//! [`ProcessRunner`] is a trait so the Perforce client and the transaction
//! layer can be exercised against a simulated server in tests. The
//! production implementation is [`SystemRunner`].

pub mod debug_channel;
pub mod encoding;
pub mod invocation;
pub mod sanitize;
pub mod sinks;
mod system;

pub use encoding::Encoding;
pub use invocation::Invocation;
pub use sinks::{escape_braces, CollectingSink, LineSink, LogLineSink, MultiSink, TemplateLineSink};
pub use system::SystemRunner;

use crate::error::Result;
use std::fmt;

/// Identifies which channel of a child process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamOrigin {
    Stdout,
    Stderr,
    /// Windows `OutputDebugString` messages emitted by the child.
    Debug,
}

impl fmt::Display for StreamOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamOrigin::Stdout => "stdout",
            StreamOrigin::Stderr => "stderr",
            StreamOrigin::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// Result of a captured process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CaptureOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// True when the child exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for running child processes - allows substituting a simulated
/// tool in tests.
pub trait ProcessRunner: Send + Sync {
    /// Runs the invocation to completion and returns its exit code and
    /// decoded output streams.
    fn capture(&self, invocation: &Invocation) -> Result<CaptureOutput>;

    /// Runs the invocation to completion, forwarding every decoded line to
    /// `sink`, and returns the exit code.
    fn stream(&self, invocation: &Invocation, sink: &dyn LineSink) -> Result<i32>;
}

/// Splits `text` into lines trimmed of trailing CR/LF.
///
/// Runners that only produce whole outputs (such as simulated tools) use
/// this to honor the streaming contract.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(|line| line.trim_end_matches(['\r', '\n']))
}
