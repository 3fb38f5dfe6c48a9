//! # File Mapper
//!
//! A [`FileMapper`] is a declarative pipeline that enumerates
//! `(source, destination)` pairs for bulk operations such as checkout,
//! reconcile or copy.
//!
//! Every builder method returns a new mapper that shares the stages of the
//! one it was called on, so a partially built mapper can be reused as the
//! base of several pipelines:
//!
//! ```rust,ignore
//! let base = FileMapper::new().src("/build/root").to("out");
//! let binaries = base.glob(["bin/{platform}/*.exe"]).files();
//! let symbols = base.glob(["bin/{platform}/*.pdb"]).files().newer();
//! ```
//!
//! Materializing a mapper ([`FileMapper::iter`]) runs the stages in order.
//! The pipeline starts from a single empty pair; `src` and `to` set the
//! roots, `glob` expands them, and the remaining stages filter or rewrite the
//! pairs they receive. Pairs without a source are never emitted.

use crate::error::{Error, Result};
use crate::format::interpolate;
use crate::path::{
    absolutize, glob_match, has_glob_meta, normalize, standardize, static_prefix_len,
};
use glob::MatchOptions;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

/// Named values substituted into `{name}` placeholders of stage arguments.
pub type Bindings = BTreeMap<String, String>;

/// One `(source, destination)` pair produced by a mapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePair {
    /// Normalized absolute source path.
    pub src: PathBuf,
    /// Normalized destination path, relative to the destination root.
    pub dst: PathBuf,
}

impl FilePair {
    pub fn new(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

impl From<(PathBuf, PathBuf)> for FilePair {
    fn from((src, dst): (PathBuf, PathBuf)) -> Self {
        Self { src, dst }
    }
}

#[derive(Debug, Clone)]
enum Stage {
    Src(String),
    To(String),
    Glob(Vec<String>),
    Recursive,
    Files,
    Exclude {
        patterns: Vec<String>,
        case_sensitive: bool,
    },
    Replace {
        pattern: String,
        replacement: String,
    },
    Newer,
    Once(Arc<Mutex<HashSet<PathBuf>>>),
    Upper,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Src(_) => "src",
            Stage::To(_) => "to",
            Stage::Glob(_) => "glob",
            Stage::Recursive => "recursive",
            Stage::Files => "files",
            Stage::Exclude { .. } => "exclude",
            Stage::Replace { .. } => "replace",
            Stage::Newer => "newer",
            Stage::Once(_) => "once",
            Stage::Upper => "upper",
        }
    }
}

#[derive(Debug, Clone)]
struct Step {
    stage: Stage,
    bindings: Arc<Bindings>,
}

/// Pair flowing through the pipeline before it is emitted.
#[derive(Debug, Clone)]
struct Candidate {
    src: Option<PathBuf>,
    dst: PathBuf,
}

/// Immutable builder of file enumeration pipelines.
#[derive(Debug, Clone, Default)]
pub struct FileMapper {
    steps: Arc<Vec<Step>>,
    bindings: Arc<Bindings>,
}

impl FileMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mapper whose stages interpolate `bindings`.
    pub fn with_bindings(bindings: Bindings) -> Self {
        Self {
            steps: Arc::default(),
            bindings: Arc::new(bindings),
        }
    }

    fn push(&self, stage: Stage) -> Self {
        let mut steps = Vec::clone(&self.steps);
        steps.push(Step {
            stage,
            bindings: Arc::clone(&self.bindings),
        });
        Self {
            steps: Arc::new(steps),
            bindings: Arc::clone(&self.bindings),
        }
    }

    /// Adds or overrides bindings for the stages added after this call.
    pub fn format<I, K, V>(&self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut merged = Bindings::clone(&self.bindings);
        merged.extend(bindings.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self {
            steps: Arc::clone(&self.steps),
            bindings: Arc::new(merged),
        }
    }

    pub fn with_binding(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.format([(key.into(), value.into())])
    }

    /// Looks up a binding visible to the next stage.
    pub fn binding(&self, key: &str) -> Option<&str> {
        self.bindings.get(key).map(String::as_str)
    }

    /// Appends `path` to the current source root (or sets it).
    pub fn src(&self, path: impl Into<String>) -> Self {
        self.push(Stage::Src(path.into()))
    }

    /// Appends `path` to the current destination root (or sets it).
    pub fn to(&self, path: impl Into<String>) -> Self {
        self.push(Stage::To(path.into()))
    }

    /// Expands each pattern under the current source root.
    ///
    /// The destination of a match is its path relative to the source root
    /// and to the static prefix of the pattern, placed under the current
    /// destination root.
    pub fn glob<I, S>(&self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Stage::Glob(patterns.into_iter().map(Into::into).collect()))
    }

    /// `src(src).to(dst).glob([pattern])`.
    pub fn xglob(&self, src: &str, dst: &str, pattern: &str) -> Self {
        self.src(src).to(dst).glob([pattern])
    }

    /// Emits every directory followed by its whole subtree, depth first.
    pub fn recursive(&self) -> Self {
        self.push(Stage::Recursive)
    }

    /// Drops directories.
    pub fn files(&self) -> Self {
        self.push(Stage::Files)
    }

    /// Drops pairs whose source matches any pattern.
    pub fn exclude<I, S>(&self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Stage::Exclude {
            patterns: patterns.into_iter().map(Into::into).collect(),
            case_sensitive: true,
        })
    }

    /// Like [`exclude`](Self::exclude), ignoring case.
    pub fn exclude_ignore_case<I, S>(&self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Stage::Exclude {
            patterns: patterns.into_iter().map(Into::into).collect(),
            case_sensitive: false,
        })
    }

    /// Regex substitution on destinations (`$1` refers to capture groups).
    pub fn replace(&self, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.push(Stage::Replace {
            pattern: pattern.into(),
            replacement: replacement.into(),
        })
    }

    /// Keeps pairs whose destination is missing or older than the source.
    pub fn newer(&self) -> Self {
        self.push(Stage::Newer)
    }

    /// Emits each source at most once across every materialization of this
    /// mapper and of mappers built from it.
    pub fn once(&self) -> Self {
        self.push(Stage::Once(Arc::new(Mutex::new(HashSet::new()))))
    }

    /// Upper-cases destinations.
    pub fn upper(&self) -> Self {
        self.push(Stage::Upper)
    }

    /// Runs the pipeline and returns the emitted pairs in order.
    pub fn iter(&self) -> Result<Vec<FilePair>> {
        let mut candidates = vec![Candidate {
            src: None,
            dst: PathBuf::new(),
        }];

        for step in self.steps.iter() {
            let mut next = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                apply(step, candidate, &mut next)?;
            }
            candidates = next;
        }

        Ok(candidates
            .into_iter()
            .filter_map(|c| c.src.map(|src| FilePair { src, dst: c.dst }))
            .collect())
    }

    /// Sorted, deduplicated pairs with `/` separators.
    pub fn to_list(&self) -> Result<Vec<(String, String)>> {
        let mut list: Vec<(String, String)> = self
            .iter()?
            .into_iter()
            .map(|pair| (standardize(&pair.src), standardize(&pair.dst)))
            .collect();
        list.sort();
        list.dedup();
        Ok(list)
    }

    /// Calls `callback` for every pair, with a progress bar.
    ///
    /// Stops at the first pair for which the callback returns `false` and
    /// returns `Ok(false)`.
    pub fn process<F>(&self, mut callback: F) -> Result<bool>
    where
        F: FnMut(&Path, &Path) -> bool,
    {
        let pairs = self.iter()?;
        let progress = ProgressBar::new(pairs.len() as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {wide_msg}")
        {
            progress.set_style(style);
        }

        for pair in &pairs {
            progress.set_message(standardize(&pair.dst));
            if !callback(&pair.src, &pair.dst) {
                progress.abandon();
                log::error!("Failed while processing {}", pair.src.display());
                return Ok(false);
            }
            progress.inc(1);
        }

        progress.finish_and_clear();
        Ok(true)
    }

    /// Builds a mapper from configured stages.
    pub fn from_specs(specs: &[StageSpec], bindings: Bindings) -> Self {
        specs
            .iter()
            .fold(Self::with_bindings(bindings), |mapper, spec| spec.apply(&mapper))
    }
}

fn expand(step: &Step, text: &str) -> Result<String> {
    interpolate(text, |key| step.bindings.get(key).cloned()).map_err(|e| Error::Mapper {
        message: format!("{}(): {}", step.stage.name(), e),
    })
}

fn require_src<'a>(step: &Step, candidate: &'a Candidate) -> Result<&'a PathBuf> {
    candidate.src.as_ref().ok_or_else(|| Error::Mapper {
        message: format!("{}() called on empty fileset", step.stage.name()),
    })
}

fn apply(step: &Step, candidate: Candidate, out: &mut Vec<Candidate>) -> Result<()> {
    match &step.stage {
        Stage::Src(path) => {
            let path = expand(step, path)?;
            let src = match &candidate.src {
                Some(root) => root.join(&path),
                None => PathBuf::from(&path),
            };
            out.push(Candidate {
                src: Some(normalize(&src)),
                dst: candidate.dst,
            });
        }
        Stage::To(path) => {
            let path = expand(step, path)?;
            out.push(Candidate {
                src: candidate.src,
                dst: normalize(&candidate.dst.join(path)),
            });
        }
        Stage::Glob(patterns) => {
            for pattern in patterns {
                let pattern = expand(step, pattern)?;
                glob_into(&candidate, &pattern, out)?;
            }
        }
        Stage::Recursive => {
            let src = require_src(step, &candidate)?.clone();
            walk(src, candidate.dst, out)?;
        }
        Stage::Files => {
            if candidate.src.as_ref().is_some_and(|src| src.is_file()) {
                out.push(candidate);
            }
        }
        Stage::Exclude {
            patterns,
            case_sensitive,
        } => {
            let src = standardize(require_src(step, &candidate)?);
            for pattern in patterns {
                let pattern = expand(step, pattern)?;
                if glob_match(&pattern, &src, *case_sensitive)? {
                    log::debug!("Excluding file {}", src);
                    return Ok(());
                }
            }
            out.push(candidate);
        }
        Stage::Replace {
            pattern,
            replacement,
        } => {
            let regex = Regex::new(&expand(step, pattern)?)?;
            let replacement = expand(step, replacement)?;
            let dst = standardize(&candidate.dst);
            let replaced = regex.replace_all(&dst, replacement.as_str());
            out.push(Candidate {
                src: candidate.src,
                dst: PathBuf::from(replaced.as_ref()),
            });
        }
        Stage::Newer => {
            let src = require_src(step, &candidate)?;
            if is_newer(src, &candidate.dst)? {
                out.push(candidate);
            }
        }
        Stage::Once(seen) => {
            let src = require_src(step, &candidate)?.clone();
            let mut seen = seen.lock().map_err(|_| Error::LockPoisoned {
                context: "once() state".to_string(),
            })?;
            if seen.insert(src) {
                out.push(candidate);
            }
        }
        Stage::Upper => {
            out.push(Candidate {
                src: candidate.src,
                dst: PathBuf::from(candidate.dst.to_string_lossy().to_uppercase()),
            });
        }
    }
    Ok(())
}

fn glob_into(candidate: &Candidate, pattern: &str, out: &mut Vec<Candidate>) -> Result<()> {
    let skip = match &candidate.src {
        Some(root) if !Path::new(pattern).is_absolute() && !root.as_os_str().is_empty() => {
            root.components().count() + static_prefix_len(pattern)
        }
        _ => absolute_prefix_len(Path::new(pattern)),
    };
    let glob_path = match &candidate.src {
        Some(root) if !root.as_os_str().is_empty() => root.join(pattern),
        _ => PathBuf::from(pattern),
    };

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let mut matches: Vec<PathBuf> = glob::glob_with(&glob_path.to_string_lossy(), options)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(normalize(&path)),
            Err(e) => {
                log::debug!("Skipping unreadable glob entry: {}", e);
                None
            }
        })
        .collect();
    matches.sort();

    if matches.is_empty() {
        log::info!(
            "No match for \"{}\" in \"{}\"",
            pattern,
            candidate
                .src
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
    }

    for found in matches {
        let relative: PathBuf = found.components().skip(skip).collect();
        let relative = if relative.as_os_str().is_empty() {
            found.file_name().map(PathBuf::from).unwrap_or_default()
        } else {
            relative
        };
        out.push(Candidate {
            src: Some(absolutize(&found)),
            dst: normalize(&candidate.dst.join(relative)),
        });
    }
    Ok(())
}

/// Components of an absolute or rootless `pattern` to drop from its matches,
/// root and drive prefix included. Without metacharacters only the file name
/// is kept.
fn absolute_prefix_len(pattern: &Path) -> usize {
    let components: Vec<Component> = pattern.components().collect();
    let literal = |c: &Component| !has_glob_meta(&c.as_os_str().to_string_lossy());
    if components.iter().all(literal) {
        return usize::MAX;
    }
    components.iter().take_while(|c| literal(c)).count()
}

fn walk(src: PathBuf, dst: PathBuf, out: &mut Vec<Candidate>) -> Result<()> {
    for entry in WalkDir::new(&src).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry.path().strip_prefix(&src).unwrap_or(entry.path());
        out.push(Candidate {
            src: Some(entry.path().to_path_buf()),
            dst: normalize(&dst.join(relative)),
        });
    }
    Ok(())
}

fn is_newer(src: &Path, dst: &Path) -> Result<bool> {
    let dst_modified = match std::fs::metadata(dst) {
        Ok(meta) => meta.modified()?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };
    Ok(std::fs::metadata(src)?.modified()? > dst_modified)
}

/// A pipeline stage as written in `.nimp.conf`:
///
/// ```toml
/// [filesets.binaries]
/// stages = [
///     { src = "{root}/bin" },
///     { to = "Binaries" },
///     { glob = ["**/*.exe", "**/*.dll"] },
///     "files",
///     { exclude = ["*Test*"] },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSpec {
    Src(String),
    To(String),
    Glob(Vec<String>),
    Xglob {
        #[serde(default = "current_dir")]
        src: String,
        #[serde(default = "current_dir")]
        dst: String,
        #[serde(default = "all_files")]
        pattern: String,
    },
    Recursive,
    Files,
    Exclude(Vec<String>),
    ExcludeIgnoreCase(Vec<String>),
    Replace {
        pattern: String,
        with: String,
    },
    Newer,
    Once,
    Upper,
    Format(Bindings),
}

fn current_dir() -> String {
    ".".to_string()
}

fn all_files() -> String {
    "**".to_string()
}

impl StageSpec {
    fn apply(&self, mapper: &FileMapper) -> FileMapper {
        match self {
            StageSpec::Src(path) => mapper.src(path.as_str()),
            StageSpec::To(path) => mapper.to(path.as_str()),
            StageSpec::Glob(patterns) => mapper.glob(patterns.iter().map(String::as_str)),
            StageSpec::Xglob { src, dst, pattern } => mapper.xglob(src, dst, pattern),
            StageSpec::Recursive => mapper.recursive(),
            StageSpec::Files => mapper.files(),
            StageSpec::Exclude(patterns) => mapper.exclude(patterns.iter().map(String::as_str)),
            StageSpec::ExcludeIgnoreCase(patterns) => {
                mapper.exclude_ignore_case(patterns.iter().map(String::as_str))
            }
            StageSpec::Replace { pattern, with } => mapper.replace(pattern.as_str(), with.as_str()),
            StageSpec::Newer => mapper.newer(),
            StageSpec::Once => mapper.once(),
            StageSpec::Upper => mapper.upper(),
            StageSpec::Format(bindings) => mapper.format(bindings.clone()),
        }
    }
}
