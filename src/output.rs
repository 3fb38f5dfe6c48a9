//! # Output Configuration
//!
//! Decides whether nimp writes colors and emoji, both in its own messages
//! and in log lines. The `--color=never|always|auto` flag wins; in `auto`
//! mode `NO_COLOR`, `CLICOLOR=0`, `CLICOLOR_FORCE=1`, `TERM=dumb` and the
//! terminal capabilities reported by `console` are consulted.

use std::env;

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolves the `--color` flag value (`always`, `never`, or `auto`).
    ///
    /// In auto mode, colors are disabled if:
    /// - `NO_COLOR` is set (any value, including empty)
    /// - `CLICOLOR=0` is set
    /// - `TERM=dumb` is set
    /// - stderr is not a color terminal (unless `CLICOLOR_FORCE=1`)
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // https://no-color.org/: presence alone disables colors
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        // Logs go to stderr.
        console::Term::stderr().features().colors_supported()
    }

    /// Colors on, regardless of the environment.
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    /// Colors off, regardless of the environment.
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// `emoji_str` when colors are enabled, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}
