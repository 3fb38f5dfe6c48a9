//! Shared test utilities for integration and E2E tests.
//!
//! - [`p4_sim`]: an in-memory Perforce server implementing
//!   `ProcessRunner`, for client and transaction tests.
//! - [`TestFixture`]: a temporary directory with an optional `.nimp.conf`,
//!   for tests driving the binary.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_config(configs::FILESETS);
//!     fixture.command().args(["fileset", "list", "sources"]).assert().success();
//! }
//! ```

#![allow(dead_code)]

pub mod p4_sim;

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    #[allow(unused_imports)]
    pub use super::p4_sim::P4Simulator;
    pub use super::TestFixture;
}

/// Configuration snippets.
pub mod configs {
    /// Two filesets over a small source tree.
    pub const FILESETS: &str = r#"
[config]
project = "Mercury"

[filesets.sources]
stages = [{ src = "{root_dir}/src" }, { to = "{project}" }, { glob = ["**/*.cpp"] }, "files"]

[filesets.logs]
stages = [{ src = "{root_dir}" }, { glob = ["*.log"] }, "files"]
"#;

    /// Syntactically broken TOML.
    pub const INVALID: &str = "[config\nproject = ";
}

/// A temporary directory with an optional `.nimp.conf`.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Adds a `.nimp.conf` with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child(".nimp.conf")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join(".nimp.conf")
    }

    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// A `nimp` command running in this fixture's directory, with the
    /// Perforce environment cleared.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("nimp");
        cmd.current_dir(self.path())
            .env_remove("P4PORT")
            .env_remove("P4USER")
            .env_remove("P4PASSWD")
            .env_remove("P4CLIENT")
            .env_remove("NIMP_LOG");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_with_config() {
        let fixture = TestFixture::new().with_config(configs::FILESETS);
        assert!(fixture.config_path().exists());
    }

    #[test]
    fn test_configs_parse_as_expected() {
        assert!(configs::FILESETS.parse::<toml::Table>().is_ok());
        assert!(configs::INVALID.parse::<toml::Table>().is_err());
    }
}
