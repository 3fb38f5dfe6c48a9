//! # Perforce Client
//!
//! A thin client over the `p4` command line. Every command runs as
//! `p4 -z tag [-p port] [-u user] [-P password] [-c client] <command>` and
//! its tagged output is parsed with the helpers in [`parse`].
//!
//! ## Failure Model
//!
//! - Commands whose stderr says `Operation took too long` are retried, up
//!   to five attempts in total, before failing with
//!   [`Error::VcsTransient`].
//! - A non-zero exit code, or stderr containing `can't update`,
//!   `can't clobber` or `can't overwrite`, is a [`Error::VcsCommand`].
//! - Mutating operations (`add`, `edit`, `submit`...) log the failure at
//!   error level and return `false`. Queries return a [`Result`].
//!
//! The client never keeps state between calls besides its connection
//! settings, so one [`P4`] can be shared freely.

pub mod parse;
pub mod types;

pub use types::{ChangelistId, FileAction, FileStatus};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::logging;
use crate::process::{CaptureOutput, Encoding, Invocation, ProcessRunner, SystemRunner};
use parse::{captures, escape_filename, first_capture, parse_fstat, zip_captures};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Total attempts for a command the server reports as timed out.
pub const MAX_ATTEMPTS: usize = 5;

/// Longest description `submit -d` accepts.
const MAX_DESCRIPTION_LEN: usize = 120_000;

const TIMEOUT_MESSAGE: &str = "Operation took too long";

const FATAL_FRAGMENTS: &[&str] = &["can't update", "can't clobber", "can't overwrite"];

const CHANGELIST_FORM: &str = "Change: new
User:   {user}
Client: {workspace}
Status: pending
Description:
        {description}
";

/// Connection settings. Unset values fall back to the `p4` defaults
/// (`P4PORT`, `P4USER`... and `.p4config` files).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct P4Config {
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub client: Option<String>,
}

impl P4Config {
    /// Reads `p4port`, `p4user`, `p4pass` and `p4client` from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let get = |key: &str| settings.get_str(key).map(str::to_string);
        Self {
            port: get("p4port"),
            user: get("p4user"),
            password: get("p4pass"),
            client: get("p4client"),
        }
    }

    /// Values set in `overrides` replace ours.
    pub fn merged_with(self, overrides: P4Config) -> Self {
        Self {
            port: overrides.port.or(self.port),
            user: overrides.user.or(self.user),
            password: overrides.password.or(self.password),
            client: overrides.client.or(self.client),
        }
    }
}

/// Perforce client.
pub struct P4 {
    config: P4Config,
    runner: Arc<dyn ProcessRunner>,
    cwd: PathBuf,
    encoding: Encoding,
}

impl P4 {
    /// Creates a client running the real `p4` executable.
    pub fn new(config: P4Config) -> Self {
        Self::with_runner(config, Arc::new(SystemRunner::new()))
    }

    /// Creates a client using `runner` to execute commands.
    pub fn with_runner(config: P4Config, runner: Arc<dyn ProcessRunner>) -> Self {
        if let Some(password) = &config.password {
            logging::register_secret(password);
        }
        Self {
            config,
            runner,
            cwd: PathBuf::from("."),
            encoding: Encoding::Cp437,
        }
    }

    /// Directory `p4` runs in, which matters for `.p4config` lookup.
    pub fn with_cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = cwd.as_ref().to_path_buf();
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn config(&self) -> &P4Config {
        &self.config
    }

    fn invocation(&self, args: &[String], stdin: Option<&str>) -> Invocation {
        let mut invocation = Invocation::new("p4")
            .args(["-z", "tag"])
            .cwd(&self.cwd)
            .encoding(self.encoding);
        let globals = [
            ("-p", &self.config.port),
            ("-u", &self.config.user),
            ("-P", &self.config.password),
            ("-c", &self.config.client),
        ];
        for (flag, value) in globals {
            if let Some(value) = value {
                invocation = invocation.arg(flag).arg(value.as_str());
            }
        }
        invocation = invocation.args(args.iter().cloned());
        match stdin {
            Some(data) => invocation.stdin(data),
            None => invocation,
        }
    }

    /// Runs a command, retrying server timeouts, without judging the result.
    fn run_raw(&self, args: &[String], stdin: Option<&str>) -> Result<CaptureOutput> {
        let invocation = self.invocation(args, stdin);
        let command = args.join(" ");
        for attempt in 1..=MAX_ATTEMPTS {
            let mut output = self.runner.capture(&invocation)?;
            output.stdout.retain(|c| c != '\r');
            output.stderr.retain(|c| c != '\r');
            if output.stderr.contains(TIMEOUT_MESSAGE) {
                log::warn!(
                    "p4 {} timed out (attempt {}/{})",
                    command,
                    attempt,
                    MAX_ATTEMPTS
                );
                continue;
            }
            return Ok(output);
        }
        Err(Error::VcsTransient {
            command,
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Runs a command and fails on a non-zero exit or a fatal message.
    fn run(&self, args: &[String], stdin: Option<&str>) -> Result<CaptureOutput> {
        let output = self.run_raw(args, stdin)?;
        let fatal = FATAL_FRAGMENTS.iter().any(|f| output.stderr.contains(f));
        if !output.success() || fatal {
            return Err(Error::VcsCommand {
                command: args.join(" "),
                stderr: output.stderr.trim().to_string(),
            });
        }
        if !output.stderr.trim().is_empty() {
            log::debug!("p4 {}: {}", args.join(" "), output.stderr.trim());
        }
        Ok(output)
    }

    /// [`run`](Self::run) for mutating operations: failures are logged.
    fn run_checked(&self, args: &[String], stdin: Option<&str>) -> bool {
        match self.run(args, stdin) {
            Ok(_) => true,
            Err(e) => {
                log::error!("{}", e);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Mutating operations
    // ------------------------------------------------------------------

    /// Opens `path` for add in `changelist`.
    pub fn add(&self, changelist: &ChangelistId, path: &Path) -> bool {
        self.run_checked(
            &args(["add", "-f", "-c", changelist.as_str()]).with(escaped(path)),
            None,
        )
    }

    /// Opens `paths` for edit in `changelist`.
    ///
    /// Files deleted at head are skipped. Unknown files are ignored.
    pub fn edit(&self, changelist: &ChangelistId, paths: &[PathBuf]) -> bool {
        let statuses = match self.get_files_status(paths) {
            Ok(statuses) => statuses,
            Err(e) => {
                log::error!("{}", e);
                return false;
            }
        };
        let to_edit: Vec<&Path> = statuses
            .iter()
            .filter(|status| !status.is_deleted_at_head())
            .map(|status| status.path.as_path())
            .collect();
        if to_edit.is_empty() {
            return true;
        }
        self.run_checked(
            &args(["-x", "-", "edit", "-c", changelist.as_str()]),
            Some(&file_list(&to_edit)),
        )
    }

    /// Opens `paths` for delete in `changelist`; the server removes the
    /// working copies.
    pub fn delete(&self, changelist: &ChangelistId, paths: &[PathBuf]) -> bool {
        if paths.is_empty() {
            return true;
        }
        let paths: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
        self.run_checked(
            &args(["-x", "-", "delete", "-c", changelist.as_str()]),
            Some(&file_list(&paths)),
        )
    }

    /// Brings `paths` in `changelist` in line with the working copy:
    /// new files are added, modified files edited and missing files
    /// deleted.
    ///
    /// Files already opened for edit but missing on disk are reverted and
    /// opened for delete first, since `p4 reconcile` leaves opened files
    /// alone.
    pub fn reconcile(&self, changelist: &ChangelistId, paths: &[PathBuf]) -> bool {
        let statuses = match self.get_files_status(paths) {
            Ok(statuses) => statuses,
            Err(e) => {
                log::error!("{}", e);
                return false;
            }
        };
        let vanished: Vec<&Path> = statuses
            .iter()
            .filter(|status| status.is_opened_for(&FileAction::Edit) && !status.path.exists())
            .map(|status| status.path.as_path())
            .collect();
        if !vanished.is_empty() {
            let list = file_list(&vanished);
            if !self.run_checked(&args(["-x", "-", "revert"]), Some(&list)) {
                return false;
            }
            if !self.run_checked(
                &args(["-x", "-", "delete", "-c", changelist.as_str()]),
                Some(&list),
            ) {
                return false;
            }
        }

        let specs: Vec<String> = paths.iter().map(|p| path_spec(p)).collect();
        if specs.is_empty() {
            return true;
        }
        self.run_checked(
            &args(["-x", "-", "reconcile", "-f", "-c", changelist.as_str()]),
            Some(&(specs.join("\n") + "\n")),
        )
    }

    /// Reverts `path`, optionally restricted to `changelist`.
    pub fn revert(&self, path: &Path, changelist: Option<&ChangelistId>) -> bool {
        let mut command = args(["revert"]);
        if let Some(changelist) = changelist {
            command = command.with_all(["-c", changelist.as_str()]);
        }
        self.run_checked(&command.with(path_spec(path)), None)
    }

    /// Reverts the paths among `paths` that are opened for edit, leaving
    /// adds and deletes alone.
    pub fn revert_files(&self, paths: &[PathBuf]) -> bool {
        let statuses = match self.get_files_status(paths) {
            Ok(statuses) => statuses,
            Err(e) => {
                log::error!("{}", e);
                return false;
            }
        };
        let edited: Vec<&Path> = statuses
            .iter()
            .filter(|status| status.is_opened_for(&FileAction::Edit))
            .map(|status| status.path.as_path())
            .collect();
        if edited.is_empty() {
            return true;
        }
        self.run_checked(&args(["-x", "-", "revert"]), Some(&file_list(&edited)))
    }

    /// Reverts every file opened in `changelist`.
    pub fn revert_changelist(&self, changelist: &ChangelistId) -> bool {
        self.run_checked(&args(["revert", "-c", changelist.as_str(), "//..."]), None)
    }

    /// Reverts files of `changelist` whose content did not change.
    pub fn revert_unchanged(&self, changelist: &ChangelistId) -> bool {
        self.run_checked(
            &args(["revert", "-a", "-c", changelist.as_str(), "//..."]),
            None,
        )
    }

    /// Submits `changelist`. An empty changelist is deleted instead, which
    /// counts as success.
    pub fn submit(&self, changelist: &ChangelistId) -> bool {
        log::info!("Submitting changelist {}", changelist);
        let command = args(["submit", "-f", "revertunchanged", "-c", changelist.as_str()]);
        match self.run(&command, None) {
            Ok(_) => true,
            Err(Error::VcsCommand { stderr, .. }) if stderr.contains("No files to submit") => {
                log::info!("Nothing to submit, deleting changelist {}", changelist);
                self.delete_changelist(changelist)
            }
            Err(e) => {
                log::error!("{}", e);
                false
            }
        }
    }

    /// Submits the default changelist.
    pub fn submit_default_changelist(
        &self,
        description: Option<&str>,
        revert_unchanged: bool,
        dry_run: bool,
    ) -> bool {
        let mut submit_args: Vec<String> = Vec::new();
        if revert_unchanged {
            submit_args.extend(["-f".to_string(), "revertunchanged".to_string()]);
        }
        if let Some(description) = description {
            let truncated: String = description.chars().take(MAX_DESCRIPTION_LEN).collect();
            submit_args.extend(["-d".to_string(), truncated]);
        }
        if dry_run {
            log::info!("[DRY-RUN] p4 submit {}", submit_args.join(" "));
            return true;
        }
        self.run_checked(
            &args(["-x", "-", "submit"]),
            Some(&(submit_args.join("\n") + "\n")),
        )
    }

    /// Syncs `paths` (the whole workspace when empty) to `changelist` or
    /// head, in one command.
    pub fn sync(&self, paths: &[PathBuf], changelist: Option<&ChangelistId>) -> bool {
        let mut specs: Vec<String> = paths.iter().map(|p| path_spec(p)).collect();
        if specs.is_empty() {
            specs.push("//...".to_string());
        }
        if let Some(changelist) = changelist {
            for spec in &mut specs {
                spec.push('@');
                spec.push_str(changelist.as_str());
            }
        }
        let mut command = args(["sync"]);
        command.extend(specs);
        match self.run(&command, None) {
            Ok(output) => {
                let stderr = output.stderr.trim();
                if stderr.is_empty() || stderr.contains("file(s) up-to-date") {
                    true
                } else {
                    log::error!("p4 sync failed: {}", stderr);
                    false
                }
            }
            Err(Error::VcsCommand { stderr, .. }) if stderr.contains("file(s) up-to-date") => true,
            Err(e) => {
                log::error!("{}", e);
                false
            }
        }
    }

    pub fn delete_changelist(&self, changelist: &ChangelistId) -> bool {
        self.run_checked(&args(["change", "-d", changelist.as_str()]), None)
    }

    /// Reverts everything opened in the workspace and deletes its pending
    /// changelists.
    pub fn clean_workspace(&self) -> bool {
        let mut result = self.run_checked(&args(["revert", "//..."]), None);
        match self.get_pending_changelists() {
            Ok(changelists) => {
                for changelist in changelists {
                    result &= self.delete_changelist(&changelist);
                }
            }
            Err(e) => {
                log::error!("{}", e);
                result = false;
            }
        }
        result
    }

    /// Reconciles `paths` (directories included recursively) into
    /// `changelist`, or the default changelist.
    pub fn reconcile_workspace(
        &self,
        paths: &[PathBuf],
        changelist: Option<&ChangelistId>,
        dry_run: bool,
    ) -> bool {
        let mut lines: Vec<String> = ["-f", "-e", "-a", "-d"].map(String::from).to_vec();
        if dry_run {
            lines.push("-n".to_string());
        }
        if let Some(changelist) = changelist {
            lines.extend(["-c".to_string(), changelist.to_string()]);
        }
        lines.extend(paths.iter().map(|p| path_spec(p)));
        self.run_checked(
            &args(["-x", "-", "reconcile"]),
            Some(&(lines.join("\n") + "\n")),
        )
    }

    /// Returns the pending changelist described as `description` (compared
    /// case-insensitively), creating it when none exists.
    pub fn get_or_create_changelist(&self, description: &str) -> Result<ChangelistId> {
        let wanted = description.to_lowercase();
        for changelist in self.get_pending_changelists()? {
            let existing = self.get_changelist_description(&changelist)?;
            if existing.to_lowercase() == wanted {
                log::debug!("Reusing changelist {} for '{}'", changelist, description);
                return Ok(changelist);
            }
        }

        let user = self.get_user()?;
        let workspace = self.require_workspace()?;
        let form = CHANGELIST_FORM
            .replace("{user}", &user)
            .replace("{workspace}", &workspace)
            .replace("{description}", description);
        let output = self.run(&args(["change", "-i"]), Some(&form))?;
        let id = first_capture(&output.stdout, r"Change (\d+) created\.", "change -i")?;
        log::info!("Created changelist {} '{}'", id, description);
        Ok(ChangelistId::new(id))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Server status of `paths`. Directories expand to the files beneath
    /// them; unknown files are left out.
    pub fn get_files_status(&self, paths: &[PathBuf]) -> Result<Vec<FileStatus>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let specs: Vec<String> = paths.iter().map(|p| path_spec(p)).collect();
        let output = self.run_raw(&args(["-x", "-", "fstat"]), Some(&(specs.join("\n") + "\n")))?;
        parse_fstat(&output.stdout, &output.stderr)
    }

    pub fn get_changelist_description(&self, changelist: &ChangelistId) -> Result<String> {
        let output = self.run(&args(["describe", changelist.as_str()]), None)?;
        first_capture(&output.stdout, r"^\.\.\. desc (.*)$", "describe")
    }

    /// Pending changelists of the current workspace.
    pub fn get_pending_changelists(&self) -> Result<Vec<ChangelistId>> {
        let workspace = self.require_workspace()?;
        let output = self.run(
            &args(["changes", "-c", workspace.as_str(), "-s", "pending"]),
            None,
        )?;
        Ok(captures(&output.stdout, r"^\.\.\. change (\d+)$")?
            .into_iter()
            .map(ChangelistId::new)
            .collect())
    }

    /// Most recent changelist submitted to the depot.
    pub fn get_last_synced_changelist(&self) -> Result<Option<ChangelistId>> {
        let output = self.run(&args(["changes", "-s", "submitted", "-m1"]), None)?;
        Ok(captures(&output.stdout, r"^\.\.\. change (\d+)$")?
            .into_iter()
            .next()
            .map(ChangelistId::new))
    }

    /// Latest changelist synced in the workspace, under `path` when given.
    pub fn get_current_changelist(&self, path: Option<&Path>) -> Result<Option<ChangelistId>> {
        let spec = match path {
            Some(path) => format!("{}/...#have", path.to_string_lossy().trim_end_matches(['/', '\\'])),
            None => "//...#have".to_string(),
        };
        let output = self.run(&args(["changes", "--max", "1"]).with(spec), None)?;
        Ok(captures(&output.stdout, r"^\.\.\. change (\d+)$")?
            .into_iter()
            .next()
            .map(ChangelistId::new))
    }

    pub fn get_user(&self) -> Result<String> {
        let output = self.run(&args(["user", "-o"]), None)?;
        first_capture(&output.stdout, r"^\.\.\. User (.*)$", "user -o")
    }

    /// Current workspace name, `None` when the server does not know it.
    pub fn get_workspace(&self) -> Result<Option<String>> {
        let output = self.run(&args(["info"]), None)?;
        let name = first_capture(&output.stdout, r"^\.\.\. clientName (.*)$", "info")?;
        Ok(if name == "*unknown*" { None } else { Some(name) })
    }

    fn require_workspace(&self) -> Result<String> {
        self.get_workspace()?.ok_or_else(|| Error::ConfigurationMissing {
            key: "p4client".to_string(),
            hint: Some("Set P4CLIENT, pass --p4client or add 'p4client' to .nimp.conf".to_string()),
        })
    }

    /// True when `path` exists in the depot and is not deleted at head.
    pub fn is_file_versioned(&self, path: &Path) -> Result<bool> {
        let output = self.run_raw(&args(["fstat"]).with(escaped(path)), None)?;
        if ["no such file(s)", "file(s) not in client", "is not under client's root"]
            .iter()
            .any(|m| output.stderr.contains(m))
        {
            return Ok(false);
        }
        let statuses = parse_fstat(&output.stdout, "")?;
        Ok(statuses
            .first()
            .map(|status| status.head_action.is_some() && !status.is_deleted_at_head())
            .unwrap_or(false))
    }

    /// Depot files touched by `changelists`, with their head action.
    pub fn get_modified_files(
        &self,
        changelists: &[ChangelistId],
        root: Option<&str>,
    ) -> Result<Vec<(String, FileAction)>> {
        let root = root.unwrap_or("//...");
        let mut files = Vec::new();
        for changelist in changelists {
            let output = self.run(&args(["fstat", "-e", changelist.as_str(), root]), None)?;
            let rows = zip_captures(
                &output.stdout,
                &[r"^\.\.\. depotFile (.*)$", r"^\.\.\. headAction (.*)$"],
            )?;
            for row in rows {
                if let [file, action] = row.as_slice() {
                    let Ok(action) = action.parse::<FileAction>();
                    files.push((file.clone(), action));
                }
            }
        }
        Ok(files)
    }
}

/// Small builder for argument vectors.
trait ArgsExt {
    fn with(self, arg: impl Into<String>) -> Self;
    fn with_all<const N: usize>(self, extra: [&str; N]) -> Self;
}

impl ArgsExt for Vec<String> {
    fn with(mut self, arg: impl Into<String>) -> Self {
        self.push(arg.into());
        self
    }

    fn with_all<const N: usize>(mut self, extra: [&str; N]) -> Self {
        self.extend(extra.iter().map(|s| s.to_string()));
        self
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn escaped(path: &Path) -> String {
    escape_filename(&path.to_string_lossy())
}

/// File spec for `path`: directories become `dir/...`.
fn path_spec(path: &Path) -> String {
    if path.is_dir() {
        format!(
            "{}/...",
            escaped(path).trim_end_matches(['/', '\\'])
        )
    } else {
        escaped(path)
    }
}

fn file_list(paths: &[&Path]) -> String {
    paths
        .iter()
        .map(|p| escaped(p) + "\n")
        .collect()
}
