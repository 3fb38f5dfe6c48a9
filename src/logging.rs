//! # Logging
//!
//! nimp logs through the `log` facade. The binary installs an `env_logger`
//! backend wrapped in a [`RedactingLogger`], which masks every registered
//! secret (the Perforce password, typically) before a record is written.
//!
//! Child process output is logged under the [`CHILD_TARGET`] target and is
//! printed without any prefix so tool output stays readable. Its severity
//! comes from a [`DiagnosticClassifier`], which recognizes compiler and
//! platform SDK diagnostics.

use log::{LevelFilter, Log, Metadata, Record};
use regex::Regex;
use std::borrow::Cow;
use std::io::Write;
use std::sync::RwLock;

/// Log target used for lines produced by child processes.
pub const CHILD_TARGET: &str = "child_process";

const REDACTED: &str = "*****";

static SECRETS: RwLock<Vec<String>> = RwLock::new(Vec::new());

/// Severity assigned to a line of child output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Verbose,
    Notification,
    Warning,
    Error,
}

impl Severity {
    pub fn level(self) -> log::Level {
        match self {
            Severity::Verbose => log::Level::Debug,
            Severity::Notification => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error => log::Level::Error,
        }
    }
}

const ERROR_PATTERNS: &[&str] = &[
    // GCC
    r".+:\d+:\d+: (fatal )?error: .*",
    r".+:\d+: undefined reference to .*",
    // Clang
    r".+\(\d+,\d+\): (fatal ?)error : .*",
    r".+ : error : [A-Z0-9]+: reference to undefined symbol.*",
    r"duplicate symbol \w+ in:",
    r".*: multiple definition of ",
    r"clang: error: no such file or directory:.*",
    // .NET / Mono
    r".+\(\d+,\d+\) : error [A-Z\d]+: .*",
    // MSVC
    r".+\(\d+\): error [A-Z\d]+: .*",
    r".+ : error [A-Z\d]+: unresolved external symbol .*",
    // PS4 SDK
    r"\[Error\]\t.*",
    // Xbox One SDK
    r" - Error Code: .*",
    r"Package was not created, error = .*",
    r"Chunk [0-9]+ is invalid: it contains 0 files\.",
    r"The layout contained an invalid chunk\.",
    r"Chunks must contain at least 1 non-empty file\.",
    r"FileGroup .* did not match any files\.",
];

const WARNING_PATTERNS: &[&str] = &[
    r".+\(\d+,\d+\) : warning [A-Z\d]+: .*",
    r".+:\d+:\d+: warning: .*",
    r".+\(\d+,\d+\): warning : .*",
    r".+\(\d+\): warning [A-Z\d]+: .*",
    r"\[Warn\]\t.*",
];

const IGNORE_PATTERNS: &[&str] =
    &[r"  WARNING - appdata.bin is being created automatically for this package"];

/// Promotes known diagnostic lines to warning or error severity.
///
/// Patterns are matched at the start of the line. Ignore patterns win over
/// error patterns, which win over warning patterns.
#[derive(Debug, Clone)]
pub struct DiagnosticClassifier {
    ignore: Vec<Regex>,
    errors: Vec<Regex>,
    warnings: Vec<Regex>,
}

impl DiagnosticClassifier {
    /// Built-in patterns extended with user supplied ones.
    ///
    /// Patterns that fail to compile are reported and skipped.
    pub fn with_patterns(errors: &[String], warnings: &[String], ignore: &[String]) -> Self {
        Self {
            ignore: compile(IGNORE_PATTERNS, ignore),
            errors: compile(ERROR_PATTERNS, errors),
            warnings: compile(WARNING_PATTERNS, warnings),
        }
    }

    pub fn classify(&self, line: &str) -> Severity {
        let matches = |set: &[Regex]| set.iter().any(|re| re.is_match(line));
        if matches(&self.ignore) {
            Severity::Notification
        } else if matches(&self.errors) {
            Severity::Error
        } else if matches(&self.warnings) {
            Severity::Warning
        } else {
            Severity::Notification
        }
    }
}

impl Default for DiagnosticClassifier {
    fn default() -> Self {
        Self::with_patterns(&[], &[], &[])
    }
}

fn compile(builtin: &[&str], extra: &[String]) -> Vec<Regex> {
    builtin
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
        .filter_map(|pattern| match Regex::new(&format!("^(?:{})", pattern)) {
            Ok(re) => Some(re),
            Err(err) => {
                log::error!("Error while compiling pattern {}: {}", pattern, err);
                None
            }
        })
        .collect()
}

/// Registers a value that must never appear in log output.
pub fn register_secret(secret: &str) {
    if secret.is_empty() {
        return;
    }
    let mut secrets = SECRETS.write().unwrap_or_else(|p| p.into_inner());
    if !secrets.iter().any(|s| s == secret) {
        secrets.push(secret.to_string());
    }
}

/// Removes every registered secret.
pub fn clear_secrets() {
    SECRETS.write().unwrap_or_else(|p| p.into_inner()).clear();
}

/// Masks registered secrets in `message`.
pub fn redact(message: &str) -> Cow<'_, str> {
    let secrets = SECRETS.read().unwrap_or_else(|p| p.into_inner());
    if !secrets.iter().any(|s| message.contains(s.as_str())) {
        return Cow::Borrowed(message);
    }
    let mut redacted = message.to_string();
    for secret in secrets.iter() {
        redacted = redacted.replace(secret.as_str(), REDACTED);
    }
    Cow::Owned(redacted)
}

/// Output layout for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// `<timestamp> [<LEVEL>] <message>`
    #[default]
    Standard,
    /// Message only.
    Plain,
}

/// A `log::Log` that redacts secrets before delegating.
pub struct RedactingLogger<L> {
    inner: L,
}

impl<L: Log> RedactingLogger<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

impl<L: Log> Log for RedactingLogger<L> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        let message = redact(&message);
        self.inner.log(
            &Record::builder()
                .args(format_args!("{}", message))
                .level(record.level())
                .target(record.target())
                .module_path(record.module_path())
                .file(record.file())
                .line(record.line())
                .build(),
        );
    }

    fn flush(&self) {
        self.inner.flush()
    }
}

/// Installs the global logger.
///
/// `NIMP_LOG` may carry additional `env_logger` directives.
pub fn init(
    level: LevelFilter,
    format: LogFormat,
    color: bool,
) -> std::result::Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .parse_env(env_logger::Env::new().filter("NIMP_LOG"))
        .write_style(if color {
            env_logger::WriteStyle::Always
        } else {
            env_logger::WriteStyle::Never
        })
        .format(move |buf, record| {
            if format == LogFormat::Plain || record.target() == CHILD_TARGET {
                writeln!(buf, "{}", record.args())
            } else {
                writeln!(
                    buf,
                    "{} [{}] {}",
                    buf.timestamp_seconds(),
                    record.level(),
                    record.args()
                )
            }
        });

    let logger = builder.build();
    let max_level = logger.filter();
    log::set_boxed_logger(Box::new(RedactingLogger::new(logger)))?;
    log::set_max_level(max_level);
    Ok(())
}

/// Maps `-v`/`-q` counts onto a level, starting from `info`.
pub fn level_from_verbosity(verbose: u8, quiet: u8) -> LevelFilter {
    const LEVELS: [LevelFilter; 6] = [
        LevelFilter::Off,
        LevelFilter::Error,
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];
    let index = (3 + verbose as i32 - quiet as i32).clamp(0, 5) as usize;
    LEVELS[index]
}
