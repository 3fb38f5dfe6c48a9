//! Argument sanitization for POSIX emulation layers.
//!
//! MSYS rewrites arguments that start with `/` into Windows paths before the
//! target program sees them, which turns flags such as `/nologo` into
//! `C:/msys64/nologo`. Doubling the leading slash makes MSYS pass the
//! intended value through.

use std::path::Path;

/// True when running under an MSYS/MinGW shell.
pub fn is_msys() -> bool {
    std::env::var_os("MSYSTEM").is_some()
}

/// Escapes every argument that MSYS would mistake for a path.
pub fn sanitize_args(args: &[String]) -> Vec<String> {
    if is_msys() {
        escape_leading_slashes(args)
    } else {
        args.to_vec()
    }
}

/// Unconditionally applies MSYS escaping to `args`.
///
/// Drive-style paths (`/c/...`) and arguments naming an existing file or
/// directory are left untouched; every other leading `/` is doubled.
pub fn escape_leading_slashes(args: &[String]) -> Vec<String> {
    args.iter().map(|arg| escape_argument(arg)).collect()
}

fn escape_argument(arg: &str) -> String {
    if !arg.starts_with('/') {
        return arg.to_string();
    }

    let bytes = arg.as_bytes();
    let drive_style = bytes.len() >= 3 && bytes[1].is_ascii_alphabetic() && bytes[2] == b'/';
    if drive_style {
        return arg.to_string();
    }

    if arg.len() > 5 && Path::new(arg).exists() {
        return arg.to_string();
    }

    format!("/{}", arg)
}
