//! # Configuration File
//!
//! nimp reads its settings from a `.nimp.conf` file, found by walking
//! upward from the current directory. The file is TOML:
//!
//! ```toml
//! [config]
//! project = "Mercury"
//! p4port = "ssl:perforce:1666"
//! p4client = "mercury-build-01"
//! summary_error_patterns = ["LogCook: Error: .*"]
//!
//! [environment]
//! SCE_ORBIS_SDK_DIR = "D:/SDK/Orbis"
//!
//! [filesets.banks]
//! bindings = { platform = "ps4" }
//! stages = [
//!     { src = "{root_dir}/Content/Banks/{platform}" },
//!     { glob = ["**/*.bnk"] },
//!     "files",
//! ]
//! ```
//!
//! - **`[config]`**: free-form settings, exposed through [`Settings`]. Every
//!   scalar value is also available as a `{name}` binding to filesets.
//! - **`[environment]`**: variables passed to child processes.
//! - **`[filesets.<name>]`**: file mapper pipelines, see
//!   [`StageSpec`](crate::mapper::StageSpec).
//!
//! A missing file is not an error: configuration is simply empty and commands
//! that need a value fail with [`Error::ConfigurationMissing`].

use crate::error::{Error, Result};
use crate::mapper::{Bindings, FileMapper, StageSpec};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = ".nimp.conf";

/// Returns the closest `.nimp.conf` in `start` or one of its ancestors.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Typed access to the `[config]` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    table: toml::Table,
}

impl Settings {
    pub fn new(table: toml::Table) -> Self {
        Self { table }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.table.get(key).and_then(toml::Value::as_str)
    }

    /// Like [`get_str`](Self::get_str) but missing keys are an error.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key).ok_or_else(|| Error::ConfigurationMissing {
            key: key.to_string(),
            hint: Some(format!("Add '{}' to the [config] table of {}", key, CONFIG_FILE_NAME)),
        })
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.table.get(key).and_then(toml::Value::as_bool)
    }

    /// A list of strings; a single string counts as a one-element list.
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.table.get(key) {
            Some(toml::Value::String(value)) => vec![value.clone()],
            Some(toml::Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Scalar settings rendered as strings, for `{name}` interpolation.
    pub fn bindings(&self) -> Bindings {
        self.table
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    _ => return None,
                };
                Some((key.clone(), text))
            })
            .collect()
    }
}

/// A named file mapper pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FilesetSpec {
    #[serde(default)]
    pub bindings: Bindings,
    pub stages: Vec<StageSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    config: toml::Table,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    #[serde(default)]
    filesets: BTreeMap<String, FilesetSpec>,
}

/// Loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// File the configuration was read from, if any.
    pub path: Option<PathBuf>,
    pub settings: Settings,
    pub environment: BTreeMap<String, String>,
    pub filesets: BTreeMap<String, FilesetSpec>,
}

impl Config {
    /// Parses configuration text; `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| Error::ConfigParse {
            path: origin.display().to_string(),
            message: e.message().to_string(),
        })?;
        Ok(Self {
            path: Some(origin.to_path_buf()),
            settings: Settings::new(raw.config),
            environment: raw.environment,
            filesets: raw.filesets,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Loads the closest configuration file above `start`, or an empty
    /// configuration when there is none.
    pub fn discover(start: &Path) -> Result<Self> {
        match find_config_file(start) {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => {
                log::debug!("No {} found above {}", CONFIG_FILE_NAME, start.display());
                Ok(Self::default())
            }
        }
    }

    /// Directory holding the configuration file, or `fallback` without one.
    pub fn root_dir(&self, fallback: &Path) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| fallback.to_path_buf())
    }

    /// Builds the file mapper of fileset `name`.
    ///
    /// Bindings come from, in increasing priority: scalar settings,
    /// `root_dir`, the fileset's own bindings and `extra`.
    pub fn fileset(&self, name: &str, root_dir: &Path, extra: &Bindings) -> Result<FileMapper> {
        let spec = self
            .filesets
            .get(name)
            .ok_or_else(|| Error::ConfigurationMissing {
                key: format!("filesets.{}", name),
                hint: Some(format!(
                    "Declare [filesets.{}] with a 'stages' list in {}",
                    name, CONFIG_FILE_NAME
                )),
            })?;

        let mut bindings = self.settings.bindings();
        bindings.insert(
            "root_dir".to_string(),
            root_dir.to_string_lossy().replace('\\', "/"),
        );
        bindings.extend(spec.bindings.clone());
        bindings.extend(extra.clone());
        Ok(FileMapper::from_specs(&spec.stages, bindings))
    }
}
