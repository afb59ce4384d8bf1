//! Moving a workspace, and the work in progress in it, to another branch.
//!
//! The opened files are shelved to an archive, the old workspace directory
//! is moved aside, the client view is pointed at the new location and the
//! archive is restored on top of a fresh sync. Optionally the currently
//! synced revisions are branched to the new location first.

use std::path::PathBuf;
use std::sync::OnceLock;

use log::info;
use regex::{NoExpand, Regex};
use thiserror::Error;

use crate::p4::{P4Command, Record, Session, VcsError};
use crate::shelf::{self, BuildOptions, BuildSummary, RestoreReport, ShelfError, ZipStore};

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("P4 error: {0}")]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Shelf(#[from] ShelfError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Client {client} has {views} view lines; only single line views can be migrated")]
    MultiLineView { client: String, views: usize },

    #[error("Cannot find the depot side of view line '{0}'")]
    UnparsableView(String),

    #[error("Failed to branch to {location} (does it already exist?): {source}")]
    Branch {
        location: String,
        #[source]
        source: VcsError,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Backup {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub client: String,
    /// Depot path the view should map, e.g. `//depot/rel1/...`
    pub new_location: String,
    /// Branch the synced revisions to the new location before switching
    pub branch: bool,
    /// Where to keep the work in progress; a temporary file when unset
    pub archive: Option<PathBuf>,
}

#[derive(Debug)]
pub struct MigrateReport {
    pub root: PathBuf,
    pub backup_dir: PathBuf,
    pub archive: PathBuf,
    pub shelved: BuildSummary,
    /// `None` in a dry run
    pub restored: Option<RestoreReport>,
}

fn view_depot_side() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(//.+)\s+//").expect("valid view pattern"))
}

fn view_mapping() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(//.+) //").expect("valid view pattern"))
}

/// Move `options.client` to `options.new_location`, keeping opened work.
pub fn migrate(
    session: &Session<'_>,
    options: &MigrateOptions,
) -> Result<MigrateReport, MigrateError> {
    let session = session.with_client(&options.client);

    let spec = session.client_spec()?;
    let views = view_count(&spec);
    if views != 1 {
        return Err(MigrateError::MultiLineView {
            client: options.client.clone(),
            views,
        });
    }

    let root = spec.require("Root")?.trim().to_string();
    info!("Workspace root is {}", root);
    let backup_dir = probe_backup_dir(&root);

    if options.branch {
        info!("Branching client files into {}", options.new_location);
        branch_current_view(&session, &spec, &options.new_location)?;
    }

    let archive = options.archive.clone().unwrap_or_else(|| {
        std::env::temp_dir().join(format!("p4migrate-{}.zip", uuid::Uuid::new_v4()))
    });
    info!("Shelving opened files to {}", archive.display());
    let shelved = shelf::build(
        &session,
        &archive,
        &BuildOptions {
            overwrite: true,
            relative_paths: true,
            ..BuildOptions::default()
        },
    )?;

    let root = PathBuf::from(root);
    info!("Moving {} to {}", root.display(), backup_dir.display());
    if !session.is_dry_run() {
        std::fs::rename(&root, &backup_dir).map_err(|source| MigrateError::Backup {
            from: root.clone(),
            to: backup_dir.clone(),
            source,
        })?;
    }

    unhook_opened_files(&session)?;
    session.mutate(&P4Command::new("sync").arg("-k").arg("//...#none"))?;

    info!("Switching {} to {}", options.client, options.new_location);
    switch_view(&session, &options.new_location)?;

    if !session.is_dry_run() {
        std::fs::create_dir_all(&root)?;
    }
    info!("Syncing the new location");
    session.mutate(&P4Command::new("sync").arg("//...#head"))?;

    let restored = if session.is_dry_run() {
        info!(
            "[dry-run] Would restore {} file(s) from {}",
            shelved.description.files.len(),
            archive.display()
        );
        None
    } else {
        info!("Restoring work from {}", archive.display());
        let mut store = ZipStore::open(&archive).map_err(ShelfError::from)?;
        Some(shelf::restore(&session.with_sync_head(), &mut store)?)
    };

    Ok(MigrateReport {
        root,
        backup_dir,
        archive,
        shelved,
        restored,
    })
}

fn view_count(spec: &Record) -> usize {
    spec.keys()
        .filter(|key| key.to_ascii_lowercase().starts_with("view"))
        .count()
}

/// First `<root><counter:08>.bak` that does not exist.
pub fn probe_backup_dir(root: &str) -> PathBuf {
    let root = root.trim_end_matches(['/', '\\']);
    (0u32..)
        .map(|counter| PathBuf::from(format!("{}{:08}.bak", root, counter)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| PathBuf::from(format!("{}.bak", root)))
}

/// Point the depot side of every view line in a client form at
/// `new_location`. Other fields of the form are left alone.
pub fn rewrite_view(form: &str, new_location: &str) -> String {
    let replacement = format!("{} //", new_location);
    let mut in_view = false;
    let mut out = String::with_capacity(form.len());

    for line in form.split_inclusive('\n') {
        if line.starts_with("View:") {
            in_view = true;
        } else if !line.starts_with(char::is_whitespace) {
            in_view = false;
        }

        if in_view {
            out.push_str(&view_mapping().replacen(line, 1, NoExpand(&replacement)));
        } else {
            out.push_str(line);
        }
    }
    out
}

/// Branch what the client has synced to `new_location` without copying any
/// content, through a temporary client that maps the new location.
pub fn branch_current_view(
    session: &Session<'_>,
    spec: &Record,
    new_location: &str,
) -> Result<(), MigrateError> {
    let view = spec.require("View0")?;
    let depot_path = view_depot_side()
        .captures(view)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| MigrateError::UnparsableView(view.to_string()))?;
    let client = spec.require("Client")?.trim().to_string();
    let temp_client = format!("{}_Tmp", client);

    let branch = || -> Result<(), VcsError> {
        let form = session.query_raw(&P4Command::new("client").arg("-o"), None)?;
        let form = rewrite_view(&form, new_location).replace(&client, &temp_client);

        let temp = session.with_client(&temp_client);
        temp.mutate_raw(&P4Command::new("client").arg("-i"), Some(&form))?;
        temp.mutate(
            &P4Command::new("integ")
                .arg("-v")
                .arg(format!("{}@{}", depot_path, client))
                .arg(new_location),
        )?;
        temp.mutate(
            &P4Command::new("submit")
                .arg("-d")
                .arg(format!("On the fly branching from clientspec {}", client)),
        )?;
        session.mutate(&P4Command::new("client").arg("-d").arg(&temp_client))?;
        Ok(())
    };

    branch().map_err(|source| MigrateError::Branch {
        location: new_location.to_string(),
        source,
    })
}

/// Forget every opened file on the server while keeping local content.
fn unhook_opened_files(session: &Session<'_>) -> Result<(), MigrateError> {
    for record in session.query(&P4Command::new("opened"))? {
        let depot_file = record.require("depotFile")?;
        session.mutate(&P4Command::new("revert").arg("-k").arg(depot_file))?;
    }
    Ok(())
}

fn switch_view(session: &Session<'_>, new_location: &str) -> Result<(), MigrateError> {
    let form = session.query_raw(&P4Command::new("client").arg("-o"), None)?;
    session.mutate_raw(
        &P4Command::new("client").arg("-i"),
        Some(&rewrite_view(&form, new_location)),
    )?;
    Ok(())
}
