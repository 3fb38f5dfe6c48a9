//! Description of a single child process run.

use super::Encoding;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything needed to start a child process.
///
/// Arguments are passed to the program verbatim, without any shell
/// interpretation.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
    stdin: Option<String>,
    env: Vec<(String, String)>,
    encoding: Encoding,
    capture_debug: bool,
    heartbeat: Option<Duration>,
    dry_run: bool,
}

impl Invocation {
    /// Creates an invocation of `program` in the current directory.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: PathBuf::from("."),
            stdin: None,
            env: Vec::new(),
            encoding: Encoding::default(),
            capture_debug: false,
            heartbeat: None,
            dry_run: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = cwd.as_ref().to_path_buf();
        self
    }

    /// Text written to the child's standard input before its output is read.
    pub fn stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Also forward the child's `OutputDebugString` messages (Windows only).
    pub fn capture_debug(mut self, enabled: bool) -> Self {
        self.capture_debug = enabled;
        self
    }

    /// Log a keepalive line at this interval while streaming.
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = Some(interval);
        self
    }

    /// Log the command instead of running it; the run reports exit code 0.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> &Path {
        &self.cwd
    }

    pub fn stdin_data(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn env_overrides(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn stream_encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn wants_debug_channel(&self) -> bool {
        self.capture_debug
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Human-readable command line, for logs.
    pub fn command_line(&self) -> String {
        self.argv()
            .iter()
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("\"{}\"", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
