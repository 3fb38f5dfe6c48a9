//! Path manipulation utilities for nimp

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};

/// Characters that make a path component a glob.
const GLOB_META: &[char] = &['*', '?', '['];

/// Match a path against a shell-style pattern.
///
/// `*` also matches path separators, so `*.tmp` matches a file in any
/// directory.
pub fn glob_match(pattern: &str, path: &str, case_sensitive: bool) -> Result<bool> {
    let pattern = Pattern::new(pattern).map_err(Error::Glob)?;
    let options = MatchOptions {
        case_sensitive,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    Ok(pattern.matches_with(path, options))
}

/// True if `component` contains a glob metacharacter.
pub fn has_glob_meta(component: &str) -> bool {
    component.contains(GLOB_META)
}

fn pattern_components(pattern: &str) -> Vec<&str> {
    pattern
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
        .collect()
}

/// Number of leading components of `pattern` that contain no glob
/// metacharacter.
///
/// A pattern without any metacharacter names a single path and has no
/// static prefix (0).
pub fn static_prefix_len(pattern: &str) -> usize {
    let components = pattern_components(pattern);
    if !components.iter().any(|c| has_glob_meta(c)) {
        return 0;
    }
    components.iter().take_while(|c| !has_glob_meta(c)).count()
}

/// Lexically normalizes a path: drops `.` components and folds `..` into
/// the preceding component when there is one.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(result.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    result.pop();
                } else if !result.has_root() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Makes `path` absolute against the current directory, then normalizes it.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    match std::path::absolute(path) {
        Ok(absolute) => normalize(&absolute),
        Err(_) => normalize(path),
    }
}

/// Normalized path with `/` separators, identical on every platform.
pub fn standardize(path: &Path) -> String {
    normalize(path).to_string_lossy().replace('\\', "/")
}
