//! Protection against silently overwriting later revisions.
//!
//! Before an automated resolve or delete, the server is asked for the head
//! revision of the file. If someone has submitted past the revision being
//! worked from, the step is skipped and reported for manual follow-up unless
//! the run is forced.

use std::fmt;

use log::warn;

use crate::p4::{Session, VcsError};

/// A later revision exists than the one being restored or reverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousRevision {
    pub path: String,
    pub revision: u32,
    pub head: u32,
    /// The automated step that was skipped (`resolve`, `delete`)
    pub step: &'static str,
}

impl fmt::Display for AmbiguousRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} has new edits since revision {} (head is #{}). Skipping automated {}; you must {} manually.",
            self.path, self.revision, self.head, self.step, self.step
        )
    }
}

/// Check whether `step` on `path` may proceed from `revision`.
///
/// Returns the ambiguity when the step must be skipped. Forced runs never
/// query the server.
pub fn check(
    session: &Session<'_>,
    path: &str,
    revision: u32,
    step: &'static str,
) -> Result<Option<AmbiguousRevision>, VcsError> {
    if session.config().force {
        return Ok(None);
    }

    match session.head_revision(path)? {
        Some(head) if head > revision => {
            let ambiguity = AmbiguousRevision {
                path: path.to_string(),
                revision,
                head,
                step,
            };
            warn!("{}", ambiguity);
            Ok(Some(ambiguity))
        }
        _ => Ok(None),
    }
}
