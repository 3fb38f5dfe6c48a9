//! Line sinks receiving decoded child output.
//!
//! Sinks are called concurrently from the drainer threads of a streamed
//! process, so every implementation must tolerate parallel `line` calls.

use super::StreamOrigin;
use crate::format::interpolate;
use crate::logging::{DiagnosticClassifier, Severity, CHILD_TARGET};
use std::sync::{Arc, Mutex};

/// Receives one decoded line (without its line terminator) at a time.
pub trait LineSink: Send + Sync {
    fn line(&self, origin: StreamOrigin, line: &str);
}

impl<F> LineSink for F
where
    F: Fn(StreamOrigin, &str) + Send + Sync,
{
    fn line(&self, origin: StreamOrigin, line: &str) {
        self(origin, line)
    }
}

/// Doubles `{` and `}` so the text survives a later placeholder pass verbatim.
pub fn escape_braces(line: &str) -> String {
    line.replace('{', "{{").replace('}', "}}")
}

/// Forwards child output to the `log` facade under the `child_process`
/// target, with a severity picked by a [`DiagnosticClassifier`].
#[derive(Debug, Clone)]
pub struct LogLineSink {
    classifier: Arc<DiagnosticClassifier>,
    drop_empty: bool,
}

impl LogLineSink {
    pub fn new(classifier: Arc<DiagnosticClassifier>) -> Self {
        Self {
            classifier,
            drop_empty: true,
        }
    }

    /// Forward blank lines as well (they are dropped by default).
    pub fn keep_empty_lines(mut self) -> Self {
        self.drop_empty = false;
        self
    }
}

impl Default for LogLineSink {
    fn default() -> Self {
        Self::new(Arc::new(DiagnosticClassifier::default()))
    }
}

impl LineSink for LogLineSink {
    fn line(&self, _origin: StreamOrigin, line: &str) {
        if self.drop_empty && line.trim().is_empty() {
            return;
        }
        match self.classifier.classify(line) {
            Severity::Error => log::error!(target: CHILD_TARGET, "{}", line),
            Severity::Warning => log::warn!(target: CHILD_TARGET, "{}", line),
            Severity::Notification => log::info!(target: CHILD_TARGET, "{}", line),
            Severity::Verbose => log::debug!(target: CHILD_TARGET, "{}", line),
        }
    }
}

/// Keeps every line in memory, tagged with its origin.
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<(StreamOrigin, String)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far.
    pub fn lines(&self) -> Vec<(StreamOrigin, String)> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Lines received from `origin`, in arrival order.
    pub fn lines_from(&self, origin: StreamOrigin) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(o, _)| *o == origin)
            .map(|(_, line)| line)
            .collect()
    }
}

impl LineSink for CollectingSink {
    fn line(&self, origin: StreamOrigin, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((origin, line.to_string()));
    }
}

/// Renders each line into a template before handing it on.
///
/// The template may reference `{line}` and `{origin}`. The line is
/// brace-escaped before it is embedded, so placeholders that appear in the
/// child's output are never expanded by the second pass.
pub struct TemplateLineSink<'a> {
    template: String,
    inner: &'a dyn LineSink,
}

impl<'a> TemplateLineSink<'a> {
    pub fn new(template: impl Into<String>, inner: &'a dyn LineSink) -> Self {
        Self {
            template: template.into(),
            inner,
        }
    }

    pub fn render(&self, origin: StreamOrigin, line: &str) -> String {
        let embedded = self.template.replace("{line}", &escape_braces(line));
        interpolate(&embedded, |key| match key {
            "origin" => Some(origin.to_string()),
            _ => None,
        })
        .unwrap_or_else(|_| line.to_string())
    }
}

impl LineSink for TemplateLineSink<'_> {
    fn line(&self, origin: StreamOrigin, line: &str) {
        let rendered = self.render(origin, line);
        self.inner.line(origin, &rendered);
    }
}

/// Fans every line out to several sinks.
#[derive(Default)]
pub struct MultiSink<'a> {
    sinks: Vec<&'a dyn LineSink>,
}

impl<'a> MultiSink<'a> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: &'a dyn LineSink) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl LineSink for MultiSink<'_> {
    fn line(&self, origin: StreamOrigin, line: &str) {
        for sink in &self.sinks {
            sink.line(origin, line);
        }
    }
}
