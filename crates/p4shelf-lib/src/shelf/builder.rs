//! Writing archives.

use std::path::{Path, PathBuf};

use log::{debug, info};

use super::collector::{collect, CollectedFile};
use super::store::{ContentStore, ZipStore};
use super::{codec, ArchiveDescription, ShelfError, DESCRIPTION_ENTRY};
use crate::p4::{P4Command, Session};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Archive only this pending change instead of everything opened
    pub change: Option<u32>,
    pub comment: Option<String>,
    /// Replace an existing archive
    pub overwrite: bool,
    /// Record client paths so the archive restores onto another workspace
    pub relative_paths: bool,
}

/// What a build wrote (or, in a dry run, would have written).
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub target: PathBuf,
    pub description: ArchiveDescription,
    pub document: String,
    /// Content entries written; zero in a dry run
    pub written: usize,
}

/// Archive the opened files of the workspace to `target`.
///
/// Only reads from the server. The target is not touched in a dry run.
pub fn build(
    session: &Session<'_>,
    target: &Path,
    options: &BuildOptions,
) -> Result<BuildSummary, ShelfError> {
    let files = collect(session, options.change, options.relative_paths)?;

    let origin_client = if options.relative_paths {
        Some(session.client_name()?)
    } else {
        None
    };
    let comment = match (&options.comment, options.change) {
        (Some(comment), _) => comment.clone(),
        (None, Some(change)) => default_comment(session, change)?,
        (None, None) => String::new(),
    };

    let description = ArchiveDescription::stamped_now()
        .with_origin_client(origin_client)
        .with_comment(&comment)
        .with_files(files.iter().map(|f| f.file.clone()));
    let document = codec::encode(&description);
    codec::decode(&document)?;

    if target.exists() && !options.overwrite {
        return Err(ShelfError::AlreadyExists(target.to_path_buf()));
    }

    let mut summary = BuildSummary {
        target: target.to_path_buf(),
        description,
        document,
        written: 0,
    };

    if session.is_dry_run() {
        info!(
            "[dry-run] Would archive {} file(s) to {}",
            summary.description.files.len(),
            target.display()
        );
        for file in &summary.description.files {
            info!("[dry-run]   {} {}", file.action, file.depot_path);
        }
        return Ok(summary);
    }

    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    // An existing archive is only replaced once the new one is complete.
    let staging = tempfile::Builder::new()
        .prefix(".p4shelf-")
        .suffix(".part")
        .tempfile_in(dir)?;
    let mut store = ZipStore::create_in(staging.path(), staging.reopen()?);
    summary.written = write_archive(&mut store, &summary.document, &files)?;
    store.finish()?;
    staging.persist(target).map_err(|e| e.error)?;

    info!(
        "Archived {} file(s) to {}",
        summary.description.files.len(),
        target.display()
    );
    Ok(summary)
}

/// Fill `store` with the description and the content of every file that
/// carries content. Returns the number of content entries.
pub fn write_archive(
    store: &mut dyn ContentStore,
    document: &str,
    files: &[CollectedFile],
) -> Result<usize, ShelfError> {
    store.write_entry(DESCRIPTION_ENTRY, document.as_bytes())?;

    let mut written = 0;
    for collected in files.iter().filter(|f| f.file.action.carries_content()) {
        let data =
            std::fs::read(&collected.local_path).map_err(|source| ShelfError::ReadContent {
                path: collected.local_path.clone(),
                source,
            })?;
        debug!(
            "Storing {} ({} bytes)",
            collected.file.local_relative_path,
            data.len()
        );
        store.write_entry(&collected.file.blob_name(), &data)?;
        written += 1;
    }
    Ok(written)
}

/// The description of a pending change, used when no comment is given.
pub fn default_comment(session: &Session<'_>, change: u32) -> Result<String, ShelfError> {
    let spec = session.query_one(&P4Command::new("change").arg("-o").arg(change.to_string()))?;
    Ok(spec
        .get("Description")
        .unwrap_or_default()
        .trim_end()
        .to_string())
}
