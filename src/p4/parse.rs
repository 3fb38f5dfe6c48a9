//! Parsers for `p4 -z tag` output.
//!
//! Tagged output prints one `... key value` line per field. Records of
//! commands such as `fstat` are separated by blank lines.

use super::types::FileStatus;
use crate::error::{Error, Result};
use regex::Regex;
use std::path::PathBuf;

/// Server messages meaning a path is simply unknown to this workspace.
const UNKNOWN_FILE_MESSAGES: &[&str] = &[
    "no such file(s)",
    "file(s) not in client",
    "is not under client's root",
];

/// Runs every pattern over `output` and zips the first capture groups.
///
/// Patterns are matched per line (`^`/`$` anchor at line boundaries) and
/// captures are trimmed. The result is as long as the shortest capture
/// list.
pub fn zip_captures(output: &str, patterns: &[&str]) -> Result<Vec<Vec<String>>> {
    let columns = patterns
        .iter()
        .map(|pattern| {
            let regex = Regex::new(&format!("(?m){}", pattern))?;
            Ok(regex
                .captures_iter(output)
                .map(|c| {
                    c.get(1)
                        .map(|m| m.as_str().trim().to_string())
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>())
        })
        .collect::<Result<Vec<_>>>()?;

    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok((0..rows)
        .map(|row| columns.iter().map(|column| column[row].clone()).collect())
        .collect())
}

/// Captures of a single-field pattern.
pub fn captures(output: &str, pattern: &str) -> Result<Vec<String>> {
    Ok(zip_captures(output, &[pattern])?
        .into_iter()
        .filter_map(|mut row| row.pop())
        .collect())
}

/// First capture of `pattern`, or a protocol error naming `command`.
pub fn first_capture(output: &str, pattern: &str, command: &str) -> Result<String> {
    captures(output, pattern)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::VcsProtocol {
            command: command.to_string(),
            message: format!("no match for '{}' in {:?}", pattern, output.trim()),
        })
}

fn tagged_field(record: &str, key: &str) -> Option<String> {
    let prefix = format!("... {} ", key);
    record.lines().find_map(|line| {
        let line = line.trim_end();
        if line == format!("... {}", key) {
            Some(String::new())
        } else {
            line.strip_prefix(&prefix).map(|v| v.trim().to_string())
        }
    })
}

/// Parses `fstat` stdout and stderr into file statuses.
///
/// Records for paths unknown to the server are skipped.
pub fn parse_fstat(stdout: &str, stderr: &str) -> Result<Vec<FileStatus>> {
    let combined = format!("{}\n\n{}", stdout.trim(), stderr.trim()).replace('\r', "");
    let mut statuses = Vec::new();

    for record in combined.split("\n\n") {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        if UNKNOWN_FILE_MESSAGES.iter().any(|m| record.contains(m)) {
            log::debug!("Ignoring unknown file: {}", record);
            continue;
        }
        if !record.starts_with("...") {
            log::debug!("Ignoring fstat message: {}", record);
            continue;
        }

        let path = tagged_field(record, "clientFile").ok_or_else(|| Error::VcsProtocol {
            command: "fstat".to_string(),
            message: format!("record without clientFile: {}", record),
        })?;
        statuses.push(FileStatus {
            path: PathBuf::from(path),
            head_action: tagged_field(record, "headAction").and_then(|a| a.parse().ok()),
            action: tagged_field(record, "action").and_then(|a| a.parse().ok()),
        });
    }

    Ok(statuses)
}

/// Escapes characters that have a meaning in Perforce file specifications.
pub fn escape_filename(name: &str) -> String {
    name.replace('%', "%25")
        .replace('@', "%40")
        .replace('#', "%23")
        .replace('*', "%2A")
}

/// Inverse of [`escape_filename`].
pub fn unescape_filename(name: &str) -> String {
    name.replace("%40", "@")
        .replace("%23", "#")
        .replace("%2A", "*")
        .replace("%25", "%")
}
