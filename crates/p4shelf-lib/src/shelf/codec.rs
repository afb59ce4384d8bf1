//! The archive description document.
//!
//! A flat, line-oriented text file that other tooling may parse, so the
//! layout is a stable contract:
//!
//! ```text
//! TIME: Sat, 18 Oct 2026 10:00:00 +0000
//! CLIENT: jim_laptop
//! INFO: """fix the build"""
//! BASE: 1234
//! DRFT:   7 "//depot/main/lib/x.h"
//!
//! OPEN:   3 edit "//jim_laptop/src/a.c" "" "src/a.c"
//! OPEN:   1 integrate "//jim_laptop/src/b.c" "//depot/rel/src/b.c#4" "src/b.c"
//! ```
//!
//! `CLIENT` is present only when paths were recorded in client syntax,
//! `INFO` only for a non-empty comment, `BASE`/`DRFT` only when a baseline
//! was recorded. Blank lines carry no meaning. The `INFO` body may span
//! lines; its closing `"""` must end a line.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::{ArchiveDescription, DriftFile, FileAction, OpenedFile, SourceReference};

/// A description line that does not follow the grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed archive description at line {line} ({reason}): {text}")]
pub struct FormatError {
    /// 1-based line number in the document
    pub line: usize,
    pub text: String,
    pub reason: String,
}

impl FormatError {
    fn new(line: usize, text: &str, reason: impl Into<String>) -> Self {
        Self {
            line,
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

struct Grammar {
    info: Regex,
    time: Regex,
    client: Regex,
    base: Regex,
    drift: Regex,
    open: Regex,
}

fn grammar() -> &'static Grammar {
    static GRAMMAR: OnceLock<Grammar> = OnceLock::new();
    GRAMMAR.get_or_init(|| Grammar {
        info: Regex::new(r#"(?ms)^INFO: """(.*)"""[ \t]*\r?$"#).expect("valid INFO pattern"),
        time: Regex::new(r"^TIME:\s*(.*)$").expect("valid TIME pattern"),
        client: Regex::new(r"^CLIENT:\s+(\S+)$").expect("valid CLIENT pattern"),
        base: Regex::new(r"^BASE:\s+(\d+)$").expect("valid BASE pattern"),
        drift: Regex::new(r#"^DRFT:\s+(\d+)\s+"(.+)"$"#).expect("valid DRFT pattern"),
        open: Regex::new(r#"^OPEN:\s+(\d+)\s+([a-z]+)\s+"(.+)"\s+"(.*)"\s+"(.+)"$"#)
            .expect("valid OPEN pattern"),
    })
}

/// Serialize a description.
pub fn encode(description: &ArchiveDescription) -> String {
    let mut out = format!("TIME: {}\n", description.timestamp);

    if let Some(client) = &description.origin_client {
        out.push_str(&format!("CLIENT: {}\n", client));
    }
    if let Some(comment) = &description.comment {
        out.push_str(&format!("INFO: \"\"\"{}\"\"\"\n", comment));
    }
    if let Some(change) = description.base_change {
        out.push_str(&format!("BASE: {:3}\n", change));
    }
    for drift in &description.drift {
        out.push_str(&format!("DRFT: {:3} \"{}\"\n", drift.revision, drift.depot_path));
    }

    out.push('\n');

    for file in &description.files {
        let source = file
            .source
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        out.push_str(&format!(
            "OPEN: {:3} {} \"{}\" \"{}\" \"{}\"\n",
            file.revision, file.action, file.depot_path, source, file.local_relative_path
        ));
    }

    out
}

/// Parse a description document.
///
/// Paths are returned exactly as recorded; see [`decode_for_workspace`] for
/// rewriting client paths onto the current workspace.
pub fn decode(document: &str) -> Result<ArchiveDescription, FormatError> {
    let g = grammar();
    let mut description = ArchiveDescription::default();

    // Cut the comment out first so its lines never parse as directives. The
    // newlines stay behind to keep line numbers right.
    let body = match g.info.captures(document) {
        Some(caps) => {
            let (whole, comment) = (&caps[0], &caps[1]);
            description.comment = Some(comment.trim().to_string()).filter(|c| !c.is_empty());
            let start = caps.get(0).map_or(0, |m| m.start());
            let end = start + whole.len();
            format!(
                "{}{}{}",
                &document[..start],
                "\n".repeat(whole.matches('\n').count()),
                &document[end..]
            )
        }
        None => document.to_string(),
    };

    for (index, raw) in body.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("OPEN:") {
            description.files.push(decode_open(line_no, line)?);
        } else if line.starts_with("TIME:") {
            let caps = g
                .time
                .captures(line)
                .ok_or_else(|| FormatError::new(line_no, line, "expected TIME: <timestamp>"))?;
            description.timestamp = caps[1].trim().to_string();
        } else if line.starts_with("CLIENT:") {
            let caps = g
                .client
                .captures(line)
                .ok_or_else(|| FormatError::new(line_no, line, "expected CLIENT: <name>"))?;
            description.origin_client = Some(caps[1].to_string());
        } else if line.starts_with("BASE:") {
            let caps = g
                .base
                .captures(line)
                .ok_or_else(|| FormatError::new(line_no, line, "expected BASE: <change>"))?;
            description.base_change = Some(parse_number(line_no, line, &caps[1])?);
        } else if line.starts_with("DRFT:") {
            let caps = g.drift.captures(line).ok_or_else(|| {
                FormatError::new(line_no, line, "expected DRFT: <rev> \"<path>\"")
            })?;
            description.drift.push(DriftFile {
                revision: parse_number(line_no, line, &caps[1])?,
                depot_path: caps[2].to_string(),
            });
        } else if line.starts_with("INFO:") {
            return Err(FormatError::new(line_no, line, "unterminated INFO block"));
        } else {
            return Err(FormatError::new(line_no, line, "unknown directive"));
        }
    }

    Ok(description)
}

/// Parse a description and move its client paths onto `current_client`.
///
/// Without a current client the description is returned as recorded.
pub fn decode_for_workspace(
    document: &str,
    current_client: Option<&str>,
) -> Result<ArchiveDescription, FormatError> {
    let description = decode(document)?;
    Ok(match current_client {
        Some(client) => description.rebase_onto(client),
        None => description,
    })
}

/// Whether the document carries a `CLIENT:` line outside its comment.
pub fn records_origin_client(document: &str) -> bool {
    let g = grammar();
    g.info
        .replace(document, "")
        .lines()
        .any(|line| g.client.is_match(line.trim()))
}

fn decode_open(line_no: usize, line: &str) -> Result<OpenedFile, FormatError> {
    let caps = grammar().open.captures(line).ok_or_else(|| {
        FormatError::new(
            line_no,
            line,
            "expected OPEN: <rev> <action> \"<path>\" \"<source>\" \"<local>\"",
        )
    })?;

    let revision = parse_number(line_no, line, &caps[1])?;
    let action: FileAction = caps[2]
        .parse()
        .map_err(|e| FormatError::new(line_no, line, format!("{}", e)))?;
    let local = caps[5].to_string();
    if local.starts_with('/') || local.starts_with('\\') {
        return Err(FormatError::new(line_no, line, "local path must be relative"));
    }

    let mut file = OpenedFile::new(&caps[3], revision, action, local);
    if !caps[4].is_empty() {
        file = file.with_source(decode_source(line_no, line, &caps[4])?);
    }
    Ok(file)
}

fn decode_source(line_no: usize, line: &str, text: &str) -> Result<SourceReference, FormatError> {
    let (path, revision) = text
        .rsplit_once('#')
        .filter(|(path, _)| !path.is_empty())
        .ok_or_else(|| FormatError::new(line_no, line, "source must be <path>#<rev>"))?;
    let revision = parse_number(line_no, line, revision)?;
    if revision == 0 {
        return Err(FormatError::new(line_no, line, "source revision must be at least 1"));
    }
    Ok(SourceReference::new(path, revision))
}

fn parse_number(line_no: usize, line: &str, digits: &str) -> Result<u32, FormatError> {
    digits
        .parse()
        .map_err(|_| FormatError::new(line_no, line, format!("'{}' is not a valid number", digits)))
}
