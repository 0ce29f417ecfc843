//-
// Copyright (c) 2023, Jason Lingle
//
// This file is part of Aliasmap.
//
// Aliasmap is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Aliasmap is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Aliasmap. If not, see <http://www.gnu.org/licenses/>.

//! Applying batches of changes to a domain's tables on disk.
//!
//! A change goes through these steps:
//!
//! 1. Under the table's gate, read the current main and spam tables.
//! 2. Validate and normalise the requested changes. Any problem aborts here,
//!    before anything is written.
//! 3. Stage the new tables in temporary files next to the real ones.
//! 4. Swap the staged files in. The previous versions remain as `.old`.
//! 5. Compile the new tables. If the main table does not compile, both new
//!    tables are set aside as `.bad` and the previous versions are put back.
//! 6. Release the gate, then reload the mail service and run the domain's
//!    hook.
//!
//! Only failures up to and including compiling the main table fail the
//! request. Anything that goes wrong later is returned as a `Warning`, since
//! the main table is already committed at that point.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{debug, error, info, warn};
use tempfile::NamedTempFile;

use super::collaborator::*;
use super::gate::TableGate;
use super::model::*;
use super::record_store::{self, TablePaths};
use super::rewrite::{rewrite, RewriteBatch, RewrittenTables};
use crate::support::error::{Error, Warning};
use crate::support::file_ops::{self, IgnoreKinds};
use crate::support::system_config::{CommandsConfig, Domain};

pub struct RewriteEngine {
    gate: TableGate,
    compiler: Box<dyn TableCompiler>,
    notifier: Box<dyn ServiceNotifier>,
    hook: Box<dyn DomainHook>,
}

struct Staged {
    main: NamedTempFile,
    spam: NamedTempFile,
}

/// What `swap` did to the spam table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SpamOutcome {
    /// The new spam table could not be put in place.
    Kept,
    /// The new spam table was put in place, and there was none before.
    Created,
    /// The new spam table was put in place. The previous one is `.old`.
    Replaced,
    /// The new spam table was put in place, but the previous one could not
    /// be backed up.
    Unrecoverable,
}

impl RewriteEngine {
    pub fn new(
        compiler: Box<dyn TableCompiler>,
        notifier: Box<dyn ServiceNotifier>,
        hook: Box<dyn DomainHook>,
    ) -> Self {
        RewriteEngine {
            gate: TableGate::new(),
            compiler,
            notifier,
            hook,
        }
    }

    /// Create an engine which runs the configured external commands.
    pub fn from_config(commands: &CommandsConfig) -> Self {
        Self::new(
            Box::new(CommandCompiler::new(commands.compile.clone())),
            Box::new(CommandNotifier::new(commands.reload.clone())),
            Box::new(ScriptHook),
        )
    }

    /// Return the entries of `domain` from its main and spam tables.
    ///
    /// This does not wait for in-progress changes. Since tables are only ever
    /// replaced whole, the result reflects either the state before or after
    /// any concurrent change.
    pub fn list(&self, domain: &Domain) -> Result<Vec<AliasRecord>, Error> {
        let snapshot =
            record_store::read_snapshot(&TablePaths::new(&domain.table_file))?;
        Ok(snapshot.domain_records(&domain.name).cloned().collect())
    }

    /// Apply `changes` to the tables of `domain`.
    ///
    /// On success, returns the problems which did not prevent the change from
    /// being committed. On error, the tables are as they were before the
    /// call.
    pub fn change(
        &self,
        domain: &Domain,
        changes: &[ChangeRequest],
    ) -> Result<Vec<Warning>, Error> {
        info!("{} Received {} change(s)", domain.name, changes.len());

        let paths = TablePaths::new(&domain.table_file);
        let mut warnings = self
            .gate
            .hold(&paths, || self.commit(domain, &paths, changes))?;
        self.notify(domain, &mut warnings);

        for warning in &warnings {
            warn!("{} {}", domain.name, warning);
        }
        Ok(warnings)
    }

    fn commit(
        &self,
        domain: &Domain,
        paths: &TablePaths,
        changes: &[ChangeRequest],
    ) -> Result<Vec<Warning>, Error> {
        let snapshot = record_store::read_snapshot(paths)?;
        let batch =
            RewriteBatch::from_requests(&domain.name, &snapshot, changes)?;
        debug!("{} Normalised to {} change(s)", domain.name, batch.len());

        let tables = rewrite(&snapshot, batch);
        let staged = stage(paths, &tables)?;

        let mut warnings = Vec::new();
        let spam = swap(paths, staged, &mut warnings)?;
        self.compile(domain, paths, spam, &mut warnings)?;

        info!(
            "{} Committed '{}' ({} lines) and its spam table ({} lines)",
            domain.name,
            paths.main.display(),
            tables.main.len(),
            tables.spam.len(),
        );
        Ok(warnings)
    }

    fn compile(
        &self,
        domain: &Domain,
        paths: &TablePaths,
        spam: SpamOutcome,
        warnings: &mut Vec<Warning>,
    ) -> Result<(), Error> {
        if let Err(e) = self.compiler.compile(&paths.main) {
            error!(
                "{} Error compiling '{}', restoring previous version: {}",
                domain.name,
                paths.main.display(),
                e
            );
            if let Err(e2) =
                set_aside(&paths.main, &paths.main_bad, &paths.main_old)
            {
                error!(
                    "{} Failed to restore '{}' from '{}': {}",
                    domain.name,
                    paths.main.display(),
                    paths.main_old.display(),
                    e2
                );
            }

            if SpamOutcome::Unrecoverable == spam {
                error!(
                    "{} '{}' has no backup and keeps the rejected changes",
                    domain.name,
                    paths.spam.display()
                );
            } else if let Err(e2) = restore_spam(paths, spam) {
                error!(
                    "{} Failed to restore '{}': {}",
                    domain.name,
                    paths.spam.display(),
                    e2
                );
            }

            return Err(Error::Compile {
                path: paths.main.clone(),
                source: Box::new(e),
            });
        }

        if SpamOutcome::Kept == spam {
            return Ok(());
        }

        if let Err(e) = self.compiler.compile(&paths.spam) {
            if SpamOutcome::Replaced == spam {
                if let Err(e2) = restore_spam(paths, spam) {
                    error!(
                        "{} Failed to restore '{}' from '{}': {}",
                        domain.name,
                        paths.spam.display(),
                        paths.spam_old.display(),
                        e2
                    );
                }
            }
            warnings.push(Warning::SpamCompile(e));
        }

        Ok(())
    }

    fn notify(&self, domain: &Domain, warnings: &mut Vec<Warning>) {
        if let Err(e) = self.notifier.reload() {
            warnings.push(Warning::Reload(e));
        }

        if domain.post_hook.is_some() {
            if let Err(e) = self.hook.run_hook(domain) {
                warnings.push(Warning::Hook(e));
            }
        }
    }
}

/// Write the new tables into temporary files beside the real ones.
fn stage(
    paths: &TablePaths,
    tables: &RewrittenTables,
) -> Result<Staged, Error> {
    let mode = file_ops::mode_of(&paths.main, 0o644)?;
    Ok(Staged {
        main: stage_lines(paths.dir(), &tables.main, mode)?,
        spam: stage_lines(paths.dir(), &tables.spam, mode)?,
    })
}

fn stage_lines(
    dir: &Path,
    lines: &[String],
    mode: u32,
) -> io::Result<NamedTempFile> {
    let mut tf = NamedTempFile::new_in(dir)?;
    {
        let mut w = BufWriter::new(tf.as_file_mut());
        for line in lines {
            w.write_all(line.as_bytes())?;
            w.write_all(b"\n")?;
        }
        w.flush()?;
    }
    file_ops::chmod(tf.path(), mode)?;
    tf.as_file_mut().sync_all()?;
    Ok(tf)
}

/// Replace the live tables with the staged ones.
///
/// Failure to replace the main table is an error, and leaves the main table
/// untouched. Problems with the spam table only produce warnings.
fn swap(
    paths: &TablePaths,
    staged: Staged,
    warnings: &mut Vec<Warning>,
) -> Result<SpamOutcome, Error> {
    file_ops::link_backup(&paths.main, &paths.main_old)
        .map_err(|e| Error::Swap(paths.main_old.clone(), e))?;
    staged
        .main
        .persist(&paths.main)
        .map_err(|e| Error::Swap(paths.main.clone(), e.error))?;

    // A stale backup must not be restored over a table which had no
    // predecessor.
    let existed = paths.spam.is_file();
    let backup = if existed {
        file_ops::link_backup(&paths.spam, &paths.spam_old)
    } else {
        fs::remove_file(&paths.spam_old).ignore_not_found()
    };
    let outcome = match backup {
        Ok(()) if existed => SpamOutcome::Replaced,
        Ok(()) => SpamOutcome::Created,
        Err(e) => {
            warnings.push(Warning::SpamBackup(paths.spam_old.clone(), e));
            if existed {
                SpamOutcome::Unrecoverable
            } else {
                SpamOutcome::Created
            }
        }
    };

    match staged.spam.persist(&paths.spam) {
        Ok(_) => Ok(outcome),
        Err(e) => {
            warnings.push(Warning::SpamSwap(paths.spam.clone(), e.error));
            Ok(SpamOutcome::Kept)
        }
    }
}

/// Return the spam table to its state before `swap`, keeping the new one as
/// `.bad`.
fn restore_spam(paths: &TablePaths, spam: SpamOutcome) -> io::Result<()> {
    match spam {
        SpamOutcome::Kept | SpamOutcome::Unrecoverable => Ok(()),
        SpamOutcome::Created => fs::rename(&paths.spam, &paths.spam_bad),
        SpamOutcome::Replaced => {
            set_aside(&paths.spam, &paths.spam_bad, &paths.spam_old)
        }
    }
}

/// Keep the rejected file at `current` as `bad`, and move `old` back into
/// its place.
fn set_aside(current: &Path, bad: &Path, old: &Path) -> io::Result<()> {
    file_ops::link_backup(current, bad)?;
    fs::rename(old, current)
}
