//! Undoing a submitted change in the workspace.
//!
//! Opens the inverse of every file in the change so the result can be
//! reviewed and submitted as a new change. Nothing is submitted here.

use log::{error, info, warn};
use thiserror::Error;

use crate::guard::{self, AmbiguousRevision};
use crate::p4::{P4Command, Session, VcsError};
use crate::shelf::FileAction;

#[derive(Error, Debug)]
pub enum RevertError {
    #[error("P4 error: {0}")]
    Vcs(#[from] VcsError),

    #[error("Change {0} has no files")]
    EmptyChange(u32),

    #[error("Cannot revert '{action}' on {path}")]
    UnsupportedAction { path: String, action: String },
}

/// A file as it was submitted in a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedFile {
    pub depot_path: String,
    pub action: FileAction,
    pub revision: u32,
}

#[derive(Debug)]
pub struct RevertFailure {
    pub path: String,
    pub error: RevertError,
}

#[derive(Debug, Default)]
pub struct RevertReport {
    /// Mutating commands, in order; also filled in a dry run
    pub steps: Vec<P4Command>,
    pub ambiguous: Vec<AmbiguousRevision>,
    pub failures: Vec<RevertFailure>,
    /// Files left needing a manual resolve
    pub pending_resolve: Vec<String>,
}

/// Read the file list of a submitted change from `describe -s`.
///
/// Fails before anything is opened if any file has an action this tool
/// cannot invert.
pub fn describe_change(
    session: &Session<'_>,
    change: u32,
) -> Result<Vec<SubmittedFile>, RevertError> {
    let record = session.query_one(
        &P4Command::new("describe")
            .arg("-s")
            .arg(change.to_string()),
    )?;

    let mut files = Vec::new();
    for i in 0.. {
        let Some(path) = record.get(&format!("depotFile{}", i)) else {
            break;
        };
        let action = record.require(&format!("action{}", i))?;
        let action: FileAction = action.parse().map_err(|_| RevertError::UnsupportedAction {
            path: path.to_string(),
            action: action.to_string(),
        })?;
        files.push(SubmittedFile {
            depot_path: path.to_string(),
            action,
            revision: record.require_int(&format!("rev{}", i))?,
        });
    }

    if files.is_empty() {
        return Err(RevertError::EmptyChange(change));
    }
    Ok(files)
}

/// Open the inverse of submitted change `change` in the workspace.
pub fn revert_change(session: &Session<'_>, change: u32) -> Result<RevertReport, RevertError> {
    let files = describe_change(session, change)?;
    info!("Reverting {} file(s) of change {}", files.len(), change);

    let mut reverter = Reverter {
        session,
        report: RevertReport::default(),
    };
    for file in &files {
        if let Err(error) = reverter.revert_file(file) {
            error!("Failed to revert {}: {}", file.depot_path, error);
            reverter.report.failures.push(RevertFailure {
                path: file.depot_path.clone(),
                error,
            });
        }
    }

    let mut report = reverter.report;
    report.pending_resolve = pending_resolves(session);
    for path in &report.pending_resolve {
        warn!("{} still needs to be resolved", path);
    }
    Ok(report)
}

/// Files that `resolve -n` says still need resolving. A failed query means
/// there are none.
fn pending_resolves(session: &Session<'_>) -> Vec<String> {
    match session.query(&P4Command::new("resolve").arg("-n")) {
        Ok(records) => records
            .iter()
            .filter_map(|r| r.get("clientFile").or_else(|| r.get("toFile")))
            .map(str::to_string)
            .collect(),
        Err(e) => {
            info!("Nothing left to resolve ({})", e);
            Vec::new()
        }
    }
}

struct Reverter<'s, 'a> {
    session: &'s Session<'a>,
    report: RevertReport,
}

impl Reverter<'_, '_> {
    fn run(&mut self, command: P4Command) -> Result<(), RevertError> {
        self.report.steps.push(command.clone());
        self.session.mutate(&command)?;
        Ok(())
    }

    fn revert_file(&mut self, file: &SubmittedFile) -> Result<(), RevertError> {
        let path = file.depot_path.as_str();
        match file.action {
            FileAction::Add => self.run(P4Command::new("delete").arg(path)),
            FileAction::Edit => self.step_back(file),
            FileAction::Delete => {
                let previous = file.revision.saturating_sub(1);
                self.run(P4Command::new("sync").arg(format!("{}#{}", path, previous)))?;
                self.run(P4Command::new("add").arg(path))?;
                self.run(P4Command::new("sync").arg(path))?;
                self.guarded_resolve(file)
            }
            FileAction::Branch | FileAction::Integrate if file.revision == 1 => {
                self.run(P4Command::new("delete").arg(path))
            }
            FileAction::Branch | FileAction::Integrate => self.step_back(file),
        }
    }

    /// Reopen the file with the content of the revision before `file`.
    fn step_back(&mut self, file: &SubmittedFile) -> Result<(), RevertError> {
        let path = file.depot_path.as_str();
        let previous = format!("{}#{}", path, file.revision.saturating_sub(1));

        let record = self
            .session
            .query_one(&P4Command::new("fstat").arg(&previous))?;
        if record.get("headAction") == Some("delete") {
            if self.proceed(file, "delete")? {
                self.run(P4Command::new("delete").arg(path))?;
            }
            return Ok(());
        }

        self.run(P4Command::new("sync").arg(&previous))?;
        self.run(P4Command::new("edit").arg(path))?;
        self.run(P4Command::new("sync").arg(path))?;
        self.guarded_resolve(file)
    }

    fn guarded_resolve(&mut self, file: &SubmittedFile) -> Result<(), RevertError> {
        if self.proceed(file, "resolve")? {
            self.run(P4Command::new("resolve").arg("-ay").arg(&file.depot_path))?;
        }
        Ok(())
    }

    fn proceed(&mut self, file: &SubmittedFile, step: &'static str) -> Result<bool, RevertError> {
        match guard::check(self.session, &file.depot_path, file.revision, step)? {
            Some(ambiguity) => {
                self.report.ambiguous.push(ambiguity);
                Ok(false)
            }
            None => Ok(true),
        }
    }
}
