//! # Changelist Transactions
//!
//! A [`Transaction`] groups file mutations under one pending changelist and
//! guarantees a terminal action when the scope ends:
//!
//! - **Commit**: files that did not change are reverted, then the
//!   changelist is submitted when `submit_on_success` is set. Submitting an
//!   empty changelist deletes it.
//! - **Rollback**: every file of the changelist is reverted and the
//!   changelist is deleted. This happens when the scope failed, when
//!   [`Transaction::abort`] or a failed `add`/`delete` marked the
//!   transaction unsuccessful, or when the user pressed Ctrl-C.
//!
//! The changelist is found by description (case-insensitively), so running
//! the same command twice resumes the same changelist instead of creating a
//! second one.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let builder = Transaction::builder(&p4, "[CI] Updated banks").submit_on_success(true);
//! let (_, committed) = Transaction::run(builder, |tx| {
//!     tx.add(Path::new("/ws/Content/Banks/ps4/Music.bnk"));
//!     Ok::<_, anyhow::Error>(())
//! })?;
//! ```
//!
//! [`Transaction::begin`] / [`Transaction::end`] are available when the
//! scope does not fit in a closure. A transaction dropped without `end`
//! rolls back.

use crate::error::{Error, Result};
use crate::interrupt;
use crate::p4::{ChangelistId, P4};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// How the scope of a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The work completed; commit unless the transaction was marked failed.
    Completed,
    /// The work failed; roll back.
    Failed,
}

/// Options of a transaction, consumed by [`begin`](Self::begin).
#[must_use]
pub struct TransactionBuilder<'a> {
    p4: &'a P4,
    description: String,
    submit_on_success: bool,
    revert_unchanged: bool,
    add_not_versioned_files: bool,
    paths: Vec<PathBuf>,
}

impl<'a> TransactionBuilder<'a> {
    /// Submit the changelist on success. Off by default.
    pub fn submit_on_success(mut self, enabled: bool) -> Self {
        self.submit_on_success = enabled;
        self
    }

    /// Revert unchanged files on success. On by default.
    pub fn revert_unchanged(mut self, enabled: bool) -> Self {
        self.revert_unchanged = enabled;
        self
    }

    /// Open unversioned files for add; when off, [`Transaction::add`]
    /// skips them. On by default.
    pub fn add_not_versioned_files(mut self, enabled: bool) -> Self {
        self.add_not_versioned_files = enabled;
        self
    }

    /// Files opened for edit right after the changelist is acquired.
    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Acquires the changelist and opens the initial paths.
    ///
    /// Fails with [`Error::TransactionAborted`] when no changelist could be
    /// found or created. A failure to open the initial paths does not fail
    /// `begin`; it marks the transaction so that it rolls back at the end.
    pub fn begin(self) -> Result<Transaction<'a>> {
        let changelist = match self.p4.get_or_create_changelist(&self.description) {
            Ok(changelist) => changelist,
            Err(e) => {
                log::error!("Cannot get a changelist for '{}': {}", self.description, e);
                return Err(Error::TransactionAborted {
                    description: self.description,
                });
            }
        };

        let mut transaction = Transaction {
            p4: self.p4,
            description: self.description,
            changelist,
            submit_on_success: self.submit_on_success,
            revert_unchanged: self.revert_unchanged,
            add_not_versioned_files: self.add_not_versioned_files,
            success: true,
            added: HashSet::new(),
            finished: false,
        };

        if !self.paths.is_empty() && !transaction.p4.edit(&transaction.changelist, &self.paths) {
            log::error!("Cannot check out files of '{}'", transaction.description);
            transaction.success = false;
        }
        Ok(transaction)
    }
}

/// An open changelist scope.
pub struct Transaction<'a> {
    p4: &'a P4,
    description: String,
    changelist: ChangelistId,
    submit_on_success: bool,
    revert_unchanged: bool,
    add_not_versioned_files: bool,
    success: bool,
    added: HashSet<PathBuf>,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn builder(p4: &'a P4, description: impl Into<String>) -> TransactionBuilder<'a> {
        TransactionBuilder {
            p4,
            description: description.into(),
            submit_on_success: false,
            revert_unchanged: true,
            add_not_versioned_files: true,
            paths: Vec::new(),
        }
    }

    /// Runs `body` inside a transaction.
    ///
    /// On `Err` the changelist is rolled back and the error returned. On
    /// `Ok` the transaction commits and the value is returned with the
    /// commit result, which is `false` when the transaction was marked
    /// failed or its commit failed.
    pub fn run<T, E, F>(builder: TransactionBuilder<'a>, body: F) -> std::result::Result<(T, bool), E>
    where
        F: FnOnce(&mut Transaction<'a>) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut transaction = builder.begin()?;
        match body(&mut transaction) {
            Ok(value) => {
                let committed = transaction.end(Outcome::Completed)?;
                Ok((value, committed))
            }
            Err(e) => {
                if let Err(end_error) = transaction.end(Outcome::Failed) {
                    log::warn!("{}", end_error);
                }
                Err(e)
            }
        }
    }

    pub fn changelist(&self) -> &ChangelistId {
        &self.changelist
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// False once anything inside the scope failed.
    pub fn is_successful(&self) -> bool {
        self.success
    }

    /// Opens `path` for edit when versioned, for add otherwise.
    ///
    /// Paths already handled by this transaction are ignored. Returns the
    /// success of the operation; a failure also marks the transaction.
    pub fn add(&mut self, path: &Path) -> bool {
        if !self.added.insert(path.to_path_buf()) {
            return true;
        }

        let result = match self.p4.is_file_versioned(path) {
            Ok(true) => self.p4.edit(&self.changelist, &[path.to_path_buf()]),
            Ok(false) if self.add_not_versioned_files => self.p4.add(&self.changelist, path),
            Ok(false) => {
                log::debug!("Skipping unversioned file {}", path.display());
                true
            }
            Err(e) => {
                log::error!("{}", e);
                false
            }
        };
        if !result {
            log::error!("Cannot add {} to changelist {}", path.display(), self.changelist);
            self.success = false;
        }
        result
    }

    /// Opens `paths` for delete. A failure marks the transaction.
    pub fn delete(&mut self, paths: &[PathBuf]) -> bool {
        let result = self.p4.delete(&self.changelist, paths);
        if !result {
            self.success = false;
        }
        result
    }

    /// Reconciles `paths` into the changelist. A failure marks the
    /// transaction.
    pub fn reconcile(&mut self, paths: &[PathBuf]) -> bool {
        let result = self.p4.reconcile(&self.changelist, paths);
        if !result {
            self.success = false;
        }
        result
    }

    /// Marks the transaction as failed; it rolls back when it ends.
    pub fn abort(&mut self) {
        log::warn!("Aborting changelist '{}'", self.description);
        self.success = false;
    }

    /// Ends the scope and performs its terminal action.
    ///
    /// Returns whether the transaction committed. An interrupt requested
    /// during the scope rolls back and returns [`Error::InterruptRequested`].
    pub fn end(mut self, outcome: Outcome) -> Result<bool> {
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: Outcome) -> Result<bool> {
        self.finished = true;

        let interrupted = interrupt::requested();
        if outcome == Outcome::Failed || !self.success || interrupted {
            self.rollback();
            return if interrupted {
                Err(Error::InterruptRequested)
            } else {
                Ok(false)
            };
        }

        if self.revert_unchanged && !self.p4.revert_unchanged(&self.changelist) {
            log::error!("Cannot revert unchanged files of changelist {}", self.changelist);
            return Ok(false);
        }
        if self.submit_on_success {
            return Ok(self.p4.submit(&self.changelist));
        }
        Ok(true)
    }

    fn rollback(&self) {
        log::info!(
            "Rolling back changelist {} '{}'",
            self.changelist,
            self.description
        );
        let reverted = self.p4.revert_changelist(&self.changelist);
        let deleted = self.p4.delete_changelist(&self.changelist);
        if !(reverted && deleted) {
            log::error!("Changelist {} may be left pending", self.changelist);
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("Changelist '{}' was not ended, rolling back", self.description);
            self.finished = true;
            self.rollback();
        }
    }
}
