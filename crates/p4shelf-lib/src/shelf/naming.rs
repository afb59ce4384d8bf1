//! Archive names that never collide with an existing file.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

/// Characters of the comment that make it into a file name.
pub const MAX_COMMENT_CHARS: usize = 24;

const DEFAULT_EXTENSION: &str = "zip";

/// File-name-safe form of a comment: its first characters with anything
/// that is not alphanumeric replaced by `_`.
pub fn comment_slug(comment: &str) -> String {
    let slug: String = comment
        .chars()
        .take(MAX_COMMENT_CHARS)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

/// `<stem>_<YYYY-mm-dd_HH-MM>[_<slug>]_<n><ext>` for the first free `n`.
pub fn derive_target_name(base: &Path, now: NaiveDateTime, comment: Option<&str>) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "shelf".to_string());
    let extension = base
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    let dir = base.parent().unwrap_or_else(|| Path::new(""));

    let mut prefix = format!("{}_{}", stem, now.format("%Y-%m-%d_%H-%M"));
    let slug = comment.map(comment_slug).unwrap_or_default();
    if !slug.is_empty() {
        prefix.push('_');
        prefix.push_str(&slug);
    }

    (0u32..)
        .map(|n| dir.join(format!("{}_{}.{}", prefix, n, extension)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| dir.join(format!("{}.{}", prefix, extension)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at_ten() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(10, 5, 0)
            .unwrap()
    }

    #[test]
    fn test_slug_replaces_punctuation() {
        assert_eq!(comment_slug("fix bug #12, again!"), "fix_bug__12__again");
        assert_eq!(comment_slug("  "), "");
        assert_eq!(comment_slug("abcdefghijklmnopqrstuvwxyz"), "abcdefghijklmnopqrstuvwx");
    }

    #[test]
    fn test_first_name_uses_counter_zero() {
        let temp = TempDir::new().unwrap();
        let name = derive_target_name(&temp.path().join("work.zip"), at_ten(), Some("fix bug"));
        assert_eq!(name, temp.path().join("work_2026-10-18_10-05_fix_bug_0.zip"));
    }

    #[test]
    fn test_skips_existing_names() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("work_2026-10-18_10-05_0.zip"), "").unwrap();
        std::fs::write(temp.path().join("work_2026-10-18_10-05_1.zip"), "").unwrap();

        let name = derive_target_name(&temp.path().join("work.zip"), at_ten(), None);
        assert_eq!(name, temp.path().join("work_2026-10-18_10-05_2.zip"));
    }

    #[test]
    fn test_extension_defaults_to_zip() {
        let temp = TempDir::new().unwrap();
        let name = derive_target_name(&temp.path().join("work"), at_ten(), Some("!!"));
        assert_eq!(name, temp.path().join("work_2026-10-18_10-05_0.zip"));

        let name = derive_target_name(&temp.path().join("work.p4z"), at_ten(), None);
        assert_eq!(name, temp.path().join("work_2026-10-18_10-05_0.p4z"));
    }
}
