//! # Run Command Implementation
//!
//! Runs an external tool with its output streamed to the log. Lines are
//! classified with the built-in compiler and SDK diagnostics plus the
//! `summary_error_patterns`, `summary_warning_patterns` and
//! `summary_ignore_patterns` settings.
//!
//! With `--description`, the tool runs inside a changelist transaction:
//! files it creates, modifies or removes under the working directory are
//! reconciled into the changelist when it exits with code 0, and the
//! changelist is rolled back otherwise. `--submit` submits it on success.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::Context;
use nimp::logging::DiagnosticClassifier;
use nimp::process::{Invocation, LineSink, LogLineSink, ProcessRunner, SystemRunner, TemplateLineSink};
use nimp::transaction::Transaction;

/// Run a tool, optionally inside a changelist transaction
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Working directory of the tool (default: the configuration root)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Record the tool's changes in the pending changelist with this description
    #[arg(long, value_name = "DESCRIPTION")]
    pub description: Option<String>,

    /// Submit the changelist when the tool succeeds
    #[arg(long, requires = "description")]
    pub submit: bool,

    /// Log a keepalive line every SECONDS while the tool runs
    #[arg(long, value_name = "SECONDS")]
    pub heartbeat: Option<u64>,

    /// Also capture OutputDebugString messages (Windows)
    #[arg(long)]
    pub debug_channel: bool,

    /// Template for forwarded lines; `{line}` and `{origin}` are replaced
    #[arg(long, value_name = "TEMPLATE")]
    pub line_format: Option<String>,

    /// Print the command instead of running it
    #[arg(long)]
    pub dry_run: bool,

    /// Program to run
    pub program: String,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Execute the `run` command.
pub fn execute(context: &Context, args: RunArgs) -> Result<bool> {
    let cwd = args.cwd.clone().unwrap_or_else(|| context.root_dir.clone());
    let settings = &context.config.settings;
    let classifier = DiagnosticClassifier::with_patterns(
        &settings.get_string_list("summary_error_patterns"),
        &settings.get_string_list("summary_warning_patterns"),
        &settings.get_string_list("summary_ignore_patterns"),
    );
    let log_sink = LogLineSink::new(Arc::new(classifier));
    let template_sink;
    let sink: &dyn LineSink = match &args.line_format {
        Some(template) => {
            template_sink = TemplateLineSink::new(template.clone(), &log_sink);
            &template_sink
        }
        None => &log_sink,
    };

    let mut invocation = Invocation::new(args.program.as_str())
        .args(args.args.iter().cloned())
        .cwd(&cwd)
        .envs(context.config.environment.clone())
        .capture_debug(args.debug_channel)
        .dry_run(args.dry_run);
    if let Some(seconds) = args.heartbeat {
        invocation = invocation.heartbeat(Duration::from_secs(seconds));
    }

    let runner = SystemRunner::new();
    let Some(description) = &args.description else {
        let code = runner.stream(&invocation, sink)?;
        return Ok(report(code));
    };

    let p4 = context.p4();
    let builder = Transaction::builder(&p4, description.as_str()).submit_on_success(args.submit);
    let (code, committed) = Transaction::run(builder, |transaction| -> Result<i32> {
        let code = runner.stream(&invocation, sink)?;
        if code == 0 {
            transaction.reconcile(&[cwd.clone()]);
        } else {
            transaction.abort();
        }
        Ok(code)
    })?;
    Ok(report(code) && committed)
}

fn report(code: i32) -> bool {
    if code != 0 {
        log::error!("Program exited with code {}", code);
    }
    code == 0
}
