//! Inventory of files open for work.

use std::path::PathBuf;

use log::{debug, warn};

use super::{FileAction, OpenedFile, ShelfError, SourceReference};
use crate::p4::{P4Command, Record, Session};

/// An opened file plus where its content lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    pub file: OpenedFile,
    pub local_path: PathBuf,
}

/// List the files open in the workspace, or in one pending change.
///
/// With `relative_paths` the files are identified by client path
/// (`//<client>/...`) instead of depot path.
pub fn collect(
    session: &Session<'_>,
    change: Option<u32>,
    relative_paths: bool,
) -> Result<Vec<CollectedFile>, ShelfError> {
    let mut command = P4Command::new("opened");
    if let Some(change) = change {
        command = command.arg("-c").arg(change.to_string());
    }

    let records = session.query(&command)?;
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let root = session.client_root()?;
    let mut files = Vec::with_capacity(records.len());

    for record in records {
        let depot_file = record.require("depotFile")?.to_string();
        let path = if relative_paths {
            record.require("clientFile")?.to_string()
        } else {
            depot_file.clone()
        };
        let revision = record.int("rev")?.unwrap_or(0);
        let action_name = record.require("action")?;
        let action: FileAction = action_name.parse().map_err(|_| ShelfError::UnknownAction {
            path: path.clone(),
            action: action_name.to_string(),
        })?;

        let local = session.local_path(&depot_file)?;
        let relative = local_relative_path(Some(&root), &local, &depot_file)?;

        let mut file = OpenedFile::new(path, revision, action, relative);
        if action.may_have_source() {
            if let Some(source) = resolve_source(session, &depot_file) {
                file = file.with_source(source);
            }
        }
        debug!("Collected {} {}#{}", file.action, file.depot_path, file.revision);

        files.push(CollectedFile {
            file,
            local_path: PathBuf::from(local),
        });
    }

    Ok(files)
}

/// Ask the server where an opened file was integrated from.
///
/// A failed query degrades to "no source".
pub fn resolve_source(session: &Session<'_>, depot_path: &str) -> Option<SourceReference> {
    let command = P4Command::new("fstat").arg("-Or").arg(depot_path);
    match session.query(&command) {
        Ok(records) => records.iter().find_map(source_from_record),
        Err(e) => {
            warn!("Could not resolve the source of {}: {}", depot_path, e);
            None
        }
    }
}

/// Read the integration source from an `fstat -Or` record.
pub fn source_from_record(record: &Record) -> Option<SourceReference> {
    let path = record.get("resolveBaseFile0")?;
    let revision = revision_field(record, "resolveEndFromRev0")
        .or_else(|| revision_field(record, "resolveBaseRev0"))?;
    Some(SourceReference::new(path, revision))
}

fn revision_field(record: &Record, key: &str) -> Option<u32> {
    record.int(key).ok().flatten().filter(|rev| *rev > 0)
}

/// Strip the workspace root from `local`.
///
/// Falls back to `fallback` (usually the depot path) when there is no usable
/// root or `local` is not below it. The result never starts with a separator.
pub fn local_relative_path(
    root: Option<&str>,
    local: &str,
    fallback: &str,
) -> Result<String, ShelfError> {
    let root = root
        .map(str::trim)
        .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case("null"));

    let stripped = root.and_then(|root| strip_root(root, local));
    let relative = match stripped {
        Some(rest) => rest,
        None => fallback.trim_start_matches(['/', '\\']).replace('\\', "/"),
    };

    if relative.is_empty() {
        return Err(ShelfError::InvalidPath(local.to_string()));
    }
    Ok(relative)
}

fn strip_root(root: &str, local: &str) -> Option<String> {
    let root = root.trim_end_matches(['/', '\\']);
    let rest = local.strip_prefix(root)?;
    // "/ws/rootdir" must not claim "/ws/root"
    if !root.is_empty() && !rest.is_empty() && !rest.starts_with(['/', '\\']) {
        return None;
    }
    let rest = rest.trim_start_matches(['/', '\\']).replace('\\', "/");
    (!rest.is_empty()).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_workspace_root() {
        assert_eq!(
            local_relative_path(Some("/home/jim/ws"), "/home/jim/ws/src/a.c", "//depot/src/a.c")
                .unwrap(),
            "src/a.c"
        );
    }

    #[test]
    fn test_strips_root_with_trailing_separator() {
        assert_eq!(
            local_relative_path(Some("/home/jim/ws/"), "/home/jim/ws/a.c", "//depot/a.c").unwrap(),
            "a.c"
        );
    }

    #[test]
    fn test_windows_separators_are_normalized() {
        assert_eq!(
            local_relative_path(Some("C:\\ws"), "C:\\ws\\src\\a.c", "//depot/src/a.c").unwrap(),
            "src/a.c"
        );
    }

    #[test]
    fn test_empty_or_null_root_falls_back_to_depot_path() {
        for root in [None, Some(""), Some("null"), Some("  ")] {
            assert_eq!(
                local_relative_path(root, "/tmp/a.c", "//depot/src/a.c").unwrap(),
                "depot/src/a.c"
            );
        }
    }

    #[test]
    fn test_file_outside_root_falls_back() {
        assert_eq!(
            local_relative_path(Some("/home/jim/ws"), "/home/jim/wsold/a.c", "//depot/a.c")
                .unwrap(),
            "depot/a.c"
        );
    }

    #[test]
    fn test_never_yields_empty_or_rooted_names() {
        let cases = [
            (Some("/ws"), "/ws/a"),
            (Some("/ws"), "/ws//b"),
            (Some("/"), "/c"),
            (Some("/ws"), "/elsewhere/d"),
        ];
        for (root, local) in cases {
            let relative = local_relative_path(root, local, "//depot/x").unwrap();
            assert!(!relative.is_empty());
            assert!(!relative.starts_with('/'));
            assert!(!relative.starts_with('\\'));
        }
    }

    #[test]
    fn test_root_itself_is_invalid_without_fallback() {
        assert!(matches!(
            local_relative_path(Some("/ws"), "/ws", "//"),
            Err(ShelfError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_source_prefers_end_from_revision() {
        let record = Record::new()
            .with("resolveBaseFile0", "//depot/main/a.c")
            .with("resolveBaseRev0", "3")
            .with("resolveEndFromRev0", "5");
        assert_eq!(
            source_from_record(&record),
            Some(SourceReference::new("//depot/main/a.c", 5))
        );

        let record = Record::new()
            .with("resolveBaseFile0", "//depot/main/a.c")
            .with("resolveBaseRev0", "3");
        assert_eq!(
            source_from_record(&record),
            Some(SourceReference::new("//depot/main/a.c", 3))
        );
    }

    #[test]
    fn test_source_missing_fields_mean_no_source() {
        assert_eq!(source_from_record(&Record::new()), None);
        let record = Record::new().with("resolveBaseFile0", "//depot/a.c");
        assert_eq!(source_from_record(&record), None);
        let record = Record::new()
            .with("resolveBaseFile0", "//depot/a.c")
            .with("resolveBaseRev0", "none");
        assert_eq!(source_from_record(&record), None);
    }
}
