//! Restoring an archive onto the current workspace.
//!
//! Every file is replayed with its own sequence of server commands, picked
//! by its action and whether it has an integration source:
//!
//! | action            | with source                               | without source       |
//! |-------------------|-------------------------------------------|----------------------|
//! | branch, integrate | integrate                                 | nothing              |
//! | add, edit         | integrate, resolve -at, edit, write blob  | edit + write / write + add |
//! | delete            |                                           | delete               |
//!
//! Files are processed in archive order. A failing file is recorded and
//! skipped; the rest still get restored.

use std::fmt;
use std::path::PathBuf;

use log::{error, info};

use super::store::ContentStore;
use super::{codec, FileAction, OpenedFile, ShelfError, DESCRIPTION_ENTRY};
use crate::guard::{self, AmbiguousRevision};
use crate::p4::{P4Command, Session};

/// One planned action, reported whether or not it was carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Run(P4Command),
    WriteContent { blob: String, target: PathBuf },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Run(command) => write!(f, "p4 {}", command),
            Step::WriteContent { blob, target } => {
                write!(f, "write {} -> {}", blob, target.display())
            }
        }
    }
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: String,
    pub error: ShelfError,
}

#[derive(Debug, Default)]
pub struct RestoreReport {
    pub steps: Vec<Step>,
    pub ambiguous: Vec<AmbiguousRevision>,
    pub failures: Vec<FileFailure>,
}

impl RestoreReport {
    /// Mutating commands in the plan, in order.
    pub fn commands(&self) -> impl Iterator<Item = &P4Command> {
        self.steps.iter().filter_map(|step| match step {
            Step::Run(command) => Some(command),
            Step::WriteContent { .. } => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.ambiguous.is_empty() && self.failures.is_empty()
    }
}

/// Restore the archive in `store` onto the session's workspace.
pub fn restore(
    session: &Session<'_>,
    store: &mut dyn ContentStore,
) -> Result<RestoreReport, ShelfError> {
    let raw = store.read_entry(DESCRIPTION_ENTRY)?;
    let document = String::from_utf8_lossy(&raw);
    let current_client = if codec::records_origin_client(&document) {
        Some(session.client_name()?)
    } else {
        None
    };
    let description = codec::decode_for_workspace(&document, current_client.as_deref())?;

    info!(
        "Restoring {} file(s) archived {}",
        description.files.len(),
        description.timestamp
    );
    if let Some(comment) = &description.comment {
        info!("Comment: {}", comment);
    }

    let mut replayer = Replayer {
        session,
        report: RestoreReport::default(),
    };

    if let Some(change) = description.base_change {
        replayer.run(P4Command::new("sync").arg(format!("//...@{}", change)))?;
    }
    for drift in &description.drift {
        replayer.run(P4Command::new("sync").arg(format!("{}#{}", drift.depot_path, drift.revision)))?;
    }

    for file in &description.files {
        if let Err(error) = replayer.replay_file(file, store) {
            error!("Failed to restore {}: {}", file.depot_path, error);
            replayer.report.failures.push(FileFailure {
                path: file.depot_path.clone(),
                error,
            });
        }
    }

    let report = replayer.report;
    info!(
        "Restore finished: {} step(s), {} ambiguous, {} failed",
        report.steps.len(),
        report.ambiguous.len(),
        report.failures.len()
    );
    Ok(report)
}

struct Replayer<'s, 'a> {
    session: &'s Session<'a>,
    report: RestoreReport,
}

impl Replayer<'_, '_> {
    fn run(&mut self, command: P4Command) -> Result<(), ShelfError> {
        self.report.steps.push(Step::Run(command.clone()));
        self.session.mutate(&command)?;
        Ok(())
    }

    fn replay_file(
        &mut self,
        file: &OpenedFile,
        store: &mut dyn ContentStore,
    ) -> Result<(), ShelfError> {
        let path = file.depot_path.as_str();

        let sync_target = if self.session.config().sync_head {
            path.to_string()
        } else {
            format!("{}#{}", path, file.revision)
        };
        self.run(P4Command::new("sync").arg(sync_target))?;

        let source = file.source.as_ref().filter(|_| file.action.may_have_source());
        match (file.action, source) {
            (FileAction::Branch | FileAction::Integrate, Some(source)) => {
                self.run(P4Command::new("integrate").arg(source.to_string()).arg(path))?;
            }
            (FileAction::Branch | FileAction::Integrate, None) => {
                info!("No source recorded for {} {}; nothing to integrate", file.action, path);
            }
            (FileAction::Add | FileAction::Edit, Some(source)) => {
                self.run(P4Command::new("integrate").arg(source.to_string()).arg(path))?;
                if self.proceed(file, "resolve")? {
                    self.run(P4Command::new("resolve").arg("-at").arg(path))?;
                }
                self.run(P4Command::new("edit").arg(path))?;
                self.write_content(file, store)?;
            }
            (FileAction::Edit, None) => {
                self.run(P4Command::new("edit").arg(path))?;
                self.write_content(file, store)?;
            }
            (FileAction::Add, None) => {
                self.write_content(file, store)?;
                self.run(P4Command::new("add").arg(path))?;
            }
            (FileAction::Delete, _) => {
                if self.proceed(file, "delete")? {
                    self.run(P4Command::new("delete").arg(path))?;
                }
            }
        }
        Ok(())
    }

    /// Whether a guarded step may run. Syncing to head makes every file
    /// "newer" than its recorded revision, so that mode is not guarded.
    fn proceed(&mut self, file: &OpenedFile, step: &'static str) -> Result<bool, ShelfError> {
        if self.session.config().sync_head {
            return Ok(true);
        }
        match guard::check(self.session, &file.depot_path, file.revision, step)? {
            Some(ambiguity) => {
                self.report.ambiguous.push(ambiguity);
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn write_content(
        &mut self,
        file: &OpenedFile,
        store: &mut dyn ContentStore,
    ) -> Result<(), ShelfError> {
        let target = self.session.where_path(&file.depot_path)?;
        let blob = file.blob_name();
        let data = store.read_entry(&blob)?;
        self.report.steps.push(Step::WriteContent {
            blob,
            target: target.clone(),
        });

        if self.session.is_dry_run() {
            info!("[dry-run] write {} bytes to {}", data.len(), target.display());
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &data).map_err(|source| ShelfError::WriteContent {
            path: target.clone(),
            source,
        })?;
        info!("Wrote {}", target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_display() {
        let step = Step::Run(P4Command::new("sync").arg("//ws/a.txt#3"));
        assert_eq!(step.to_string(), "p4 sync //ws/a.txt#3");

        let step = Step::WriteContent {
            blob: "a.txt".to_string(),
            target: PathBuf::from("/ws/a.txt"),
        };
        assert_eq!(step.to_string(), "write a.txt -> /ws/a.txt");
    }

    #[test]
    fn test_report_commands_skip_writes() {
        let report = RestoreReport {
            steps: vec![
                Step::Run(P4Command::new("edit").arg("//ws/a.txt")),
                Step::WriteContent {
                    blob: "a.txt".to_string(),
                    target: PathBuf::from("/ws/a.txt"),
                },
            ],
            ..RestoreReport::default()
        };
        let names: Vec<&str> = report.commands().map(P4Command::name).collect();
        assert_eq!(names, vec!["edit"]);
        assert!(report.is_clean());
    }
}
