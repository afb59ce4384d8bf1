//! Shelving: archive pending work and replay it onto a workspace.
//!
//! An archive is a zip file holding a description document (the inventory of
//! opened files, see [`codec`]) and one entry per file whose content has to
//! be restored. Files opened for delete carry no content.
//!
//! ## Modules
//!
//! - [`collector`]: asks the server what is opened and where it came from
//! - [`codec`]: the description document grammar
//! - [`builder`]: writes an archive
//! - [`replay`]: restores an archive onto the current workspace
//! - [`store`]: the named-blob container behind an archive
//! - [`naming`]: collision-free archive names

pub mod builder;
pub mod codec;
pub mod collector;
pub mod naming;
pub mod replay;
pub mod store;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::p4::VcsError;

pub use builder::{build, BuildOptions, BuildSummary};
pub use codec::{
    decode, decode_for_workspace, encode, records_origin_client, FormatError,
};
pub use collector::{collect, CollectedFile};
pub use replay::{restore, FileFailure, RestoreReport, Step};
pub use store::{ContentStore, MemoryStore, StoreError, ZipStore};

/// Reserved archive entry holding the description document.
pub const DESCRIPTION_ENTRY: &str = "___p4shelf_information___.txt";

#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("P4 error: {0}")]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Archive error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read {path}: {source}")]
    ReadContent {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteContent {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to overwrite existing file {0} (give -o to override)")]
    AlreadyExists(PathBuf),

    #[error("Unknown action '{action}' reported for {path}")]
    UnknownAction { path: String, action: String },

    #[error("Cannot derive an archive entry name for {0}")]
    InvalidPath(String),
}

/// What is pending on an opened file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileAction {
    Add,
    Edit,
    Delete,
    Branch,
    Integrate,
}

impl FileAction {
    pub const ALL: [FileAction; 5] = [
        FileAction::Add,
        FileAction::Edit,
        FileAction::Delete,
        FileAction::Branch,
        FileAction::Integrate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Add => "add",
            FileAction::Edit => "edit",
            FileAction::Delete => "delete",
            FileAction::Branch => "branch",
            FileAction::Integrate => "integrate",
        }
    }

    /// Whether the file may derive from another path.
    pub fn may_have_source(&self) -> bool {
        !matches!(self, FileAction::Delete)
    }

    /// Whether the archive stores content for the file.
    pub fn carries_content(&self) -> bool {
        !matches!(self, FileAction::Delete)
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown file action '{0}'")]
pub struct UnknownActionError(pub String);

impl FromStr for FileAction {
    type Err = UnknownActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownActionError(s.to_string()))
    }
}

/// The path and revision an opened file was integrated or branched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    pub depot_path: String,
    pub revision: u32,
}

impl SourceReference {
    pub fn new(depot_path: impl Into<String>, revision: u32) -> Self {
        Self {
            depot_path: depot_path.into(),
            revision,
        }
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.depot_path, self.revision)
    }
}

/// One file open for work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedFile {
    pub depot_path: String,
    pub revision: u32,
    pub action: FileAction,
    pub source: Option<SourceReference>,
    /// Path below the workspace root; also the archive entry name
    pub local_relative_path: String,
}

impl OpenedFile {
    pub fn new(
        depot_path: impl Into<String>,
        revision: u32,
        action: FileAction,
        local_relative_path: impl Into<String>,
    ) -> Self {
        Self {
            depot_path: depot_path.into(),
            revision,
            action,
            source: None,
            local_relative_path: local_relative_path.into(),
        }
    }

    pub fn with_source(mut self, source: SourceReference) -> Self {
        self.source = Some(source);
        self
    }

    /// Archive entry name; zip entries always use forward slashes.
    pub fn blob_name(&self) -> String {
        self.local_relative_path.replace('\\', "/")
    }
}

/// A file synced to a specific revision before replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftFile {
    pub depot_path: String,
    pub revision: u32,
}

/// Everything recorded in an archive's description document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveDescription {
    pub timestamp: String,
    /// Workspace the paths were recorded against, when they are client paths
    pub origin_client: Option<String>,
    pub comment: Option<String>,
    pub base_change: Option<u32>,
    pub drift: Vec<DriftFile>,
    pub files: Vec<OpenedFile>,
}

impl ArchiveDescription {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..Self::default()
        }
    }

    /// A description stamped with the current UTC time.
    pub fn stamped_now() -> Self {
        Self::new(chrono::Utc::now().to_rfc2822())
    }

    pub fn with_origin_client(mut self, client: Option<String>) -> Self {
        self.origin_client = client;
        self
    }

    /// Comments are stored trimmed; a blank comment is no comment.
    pub fn with_comment(mut self, comment: &str) -> Self {
        let comment = comment.trim();
        self.comment = (!comment.is_empty()).then(|| comment.to_string());
        self
    }

    pub fn with_base_change(mut self, change: Option<u32>) -> Self {
        self.base_change = change;
        self
    }

    pub fn with_drift(mut self, depot_path: impl Into<String>, revision: u32) -> Self {
        self.drift.push(DriftFile {
            depot_path: depot_path.into(),
            revision,
        });
        self
    }

    pub fn with_file(mut self, file: OpenedFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = OpenedFile>) -> Self {
        self.files.extend(files);
        self
    }

    /// Files with an archive entry.
    pub fn content_files(&self) -> impl Iterator<Item = &OpenedFile> {
        self.files.iter().filter(|f| f.action.carries_content())
    }

    /// Rewrite `//<origin>/...` paths to `//<current>/...` so an archive
    /// recorded with client paths restores onto a differently named client.
    pub fn rebase_onto(mut self, current_client: &str) -> Self {
        let origin = match &self.origin_client {
            Some(origin) if origin != current_client => origin.clone(),
            _ => return self,
        };
        let from = format!("//{}/", origin);
        let to = format!("//{}/", current_client);
        let rewrite = |path: &mut String| {
            if let Some(rest) = path.strip_prefix(&from) {
                *path = format!("{}{}", to, rest);
            }
        };

        for drift in &mut self.drift {
            rewrite(&mut drift.depot_path);
        }
        for file in &mut self.files {
            rewrite(&mut file.depot_path);
            if let Some(source) = &mut file.source {
                rewrite(&mut source.depot_path);
            }
        }
        self
    }
}
