//! Catching the server up with work done while disconnected.
//!
//! Files missing locally are opened for delete, files changed locally for
//! edit, and every file on disk is offered for add (the server ignores the
//! ones it already tracks).

use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::p4::{P4Command, Session, VcsError};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("P4 error: {0}")]
    Vcs(#[from] VcsError),

    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: Vec<String>,
    pub edited: Vec<String>,
    /// Files offered for add
    pub offered: Vec<PathBuf>,
    /// Server output of the add
    pub add_output: String,
}

/// Open for delete, edit and add whatever changed under `root` offline.
pub fn reconcile(session: &Session<'_>, root: &Path) -> Result<ReconcileReport, ReconcileError> {
    let scope = format!(
        "{}/...",
        root.to_string_lossy().trim_end_matches(['/', '\\'])
    );
    let mut report = ReconcileReport::default();

    report.deleted = changed_files(session, "-sd", &scope)?;
    open_files(session, "delete", &report.deleted)?;

    report.edited = changed_files(session, "-se", &scope)?;
    open_files(session, "edit", &report.edited)?;

    let mut offered = Vec::new();
    collect_files(root, &mut offered)?;
    offered.sort();
    report.offered = offered;

    if !report.offered.is_empty() {
        let list = file_list(report.offered.iter().map(|p| p.to_string_lossy()));
        report.add_output = if session.is_dry_run() {
            let preview = P4Command::new("add").arg("-n").with_args_from_stdin();
            let output = session.query_raw(&preview, Some(&list))?;
            for line in output.lines().filter(|l| !l.trim().is_empty()) {
                info!("Would {}", line);
            }
            output
        } else {
            let add = P4Command::new("add").with_args_from_stdin();
            session.mutate_raw(&add, Some(&list))?
        };
    }

    info!(
        "Reconciled {}: {} deleted, {} edited, {} offered for add",
        root.display(),
        report.deleted.len(),
        report.edited.len(),
        report.offered.len()
    );
    Ok(report)
}

/// Local paths `diff <flag>` reports for `scope`.
fn changed_files(
    session: &Session<'_>,
    flag: &str,
    scope: &str,
) -> Result<Vec<String>, ReconcileError> {
    let records = session.query(&P4Command::new("diff").arg(flag).arg(scope))?;
    let mut files = Vec::with_capacity(records.len());
    for record in records {
        let path = match record.get("clientFile") {
            Some(path) => path,
            None => record.require("depotFile")?,
        };
        files.push(path.to_string());
    }
    Ok(files)
}

fn open_files(session: &Session<'_>, action: &str, files: &[String]) -> Result<(), ReconcileError> {
    if files.is_empty() {
        return Ok(());
    }
    if session.is_dry_run() {
        for file in files {
            info!("Would {} {}", action, file);
        }
        return Ok(());
    }
    let command = P4Command::new(action).with_args_from_stdin();
    session.mutate_raw(&command, Some(&file_list(files.iter().map(String::as_str))))?;
    Ok(())
}

fn file_list<S: AsRef<str>>(files: impl Iterator<Item = S>) -> String {
    let mut list = String::new();
    for file in files {
        list.push_str(file.as_ref());
        list.push('\n');
    }
    list
}

/// Every regular file below `dir`, recursively.
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReconcileError> {
    let scan_error = |source| ReconcileError::Scan {
        path: dir.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(scan_error)? {
        let entry = entry.map_err(scan_error)?;
        let file_type = entry.file_type().map_err(scan_error)?;
        let path = entry.path();

        if file_type.is_dir() {
            collect_files(&path, files)?;
        } else if file_type.is_file() {
            debug!("Found {}", path.display());
            files.push(path);
        }
    }
    Ok(())
}
