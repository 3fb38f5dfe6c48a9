//! # Error Handling
//!
//! This module defines the centralized error type for `nimp`. It uses the
//! `thiserror` library to create an `Error` enum covering every failure mode
//! the core can surface, each with enough context to produce a single
//! actionable error line.
//!
//! ## Taxonomy
//!
//! - **`ConfigurationMissing`** / **`ConfigParse`**: a required setting is
//!   absent, or `.nimp.conf` could not be read. Fatal at command entry.
//! - **`ProcessSpawnFailed`**: an executable could not be started. Non-zero
//!   exit codes are *not* errors; they are returned as data by the process
//!   runner and classified by callers.
//! - **`VcsProtocol`**: tagged Perforce output lacked an expected field.
//! - **`VcsTransient`**: a retryable Perforce failure persisted through every
//!   retry attempt.
//! - **`VcsCommand`**: a Perforce command failed with a server message.
//! - **`TransactionAborted`** / **`InterruptRequested`**: a changelist scope
//!   was rolled back.
//! - **`Mapper`**: a file mapper pipeline was misused (missing binding, stage
//!   applied to an empty set).
//!
//! Wrapped library errors (`std::io`, `regex`, `glob`, `toml`) are converted
//! with `#[from]` so `?` works throughout the crate.

use thiserror::Error;

/// Main error type for nimp operations
#[derive(Error, Debug)]
pub enum Error {
    /// A required configuration value is absent.
    #[error("Missing configuration value '{key}'{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigurationMissing {
        key: String,
        /// Optional hint for how to provide the value
        hint: Option<String>,
    },

    /// The configuration file could not be parsed.
    #[error("Configuration parsing error in {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// An executable could not be spawned.
    #[error("Failed to start '{program}': {message}")]
    ProcessSpawnFailed { program: String, message: String },

    /// Tagged Perforce output is missing an expected field.
    #[error("Unexpected p4 output for '{command}': {message}")]
    VcsProtocol { command: String, message: String },

    /// A retryable Perforce failure persisted after every attempt.
    #[error("p4 command '{command}' kept timing out after {attempts} attempts")]
    VcsTransient { command: String, attempts: usize },

    /// A Perforce command failed.
    #[error("p4 command failed: {command} - {stderr}")]
    VcsCommand { command: String, stderr: String },

    /// A changelist transaction was rolled back.
    #[error("Transaction '{description}' was aborted")]
    TransactionAborted { description: String },

    /// The user interrupted the program.
    #[error("Interrupted by user")]
    InterruptRequested,

    /// A file mapper pipeline failed.
    #[error("File mapper error: {message}")]
    Mapper { message: String },

    /// A `{name}` template could not be expanded.
    #[error("Invalid template '{template}': {message}")]
    Template { template: String, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A TOML parsing error, wrapped from `toml::de::Error`.
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Shorthand for a missing configuration key without a hint.
    pub fn missing(key: impl Into<String>) -> Self {
        Error::ConfigurationMissing {
            key: key.into(),
            hint: None,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
