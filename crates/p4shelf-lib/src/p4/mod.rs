//! Perforce command adapter
//!
//! Everything the rest of the crate knows about the server goes through the
//! [`Vcs`] trait: run a named command and get back either a stream of tagged
//! records or the raw text of a form. [`P4Cli`] is the implementation that
//! drives the `p4` executable; [`Session`] pairs an adapter with the run
//! configuration and is what the shelving, revert and migration code receive.
//!
//! ## Modules
//!
//! - [`process`]: spawns `p4` and streams its tagged output
//! - [`session`]: dry-run gate and the handful of queries every tool needs
//! - [`ztag`]: parser for `p4 -ztag` output

pub mod process;
pub mod session;
pub mod ztag;

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

pub use process::P4Cli;
pub use session::Session;

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Failed to execute `{command}` ({status}): {stderr}")]
    ExecutionFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Field '{0}' missing from p4 output")]
    MissingField(String),

    #[error("Field '{field}' is not a number: {value}")]
    BadInteger { field: String, value: String },

    #[error("`{0}` returned no records")]
    EmptyResult(String),
}

/// A single p4 command: the command name, its arguments, and an optional
/// client override that takes precedence over the connection's client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P4Command {
    name: String,
    args: Vec<String>,
    client: Option<String>,
    args_from_stdin: bool,
}

impl P4Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            client: None,
            args_from_stdin: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command as `client` instead of the connection's client.
    pub fn as_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Read additional arguments from stdin, one per line (`p4 -x -`).
    pub fn with_args_from_stdin(mut self) -> Self {
        self.args_from_stdin = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    pub fn args_from_stdin(&self) -> bool {
        self.args_from_stdin
    }

    /// The command without any connection flags, e.g. `sync //ws/a.txt#3`.
    pub fn line(&self) -> String {
        let mut line = String::new();
        if self.args_from_stdin {
            line.push_str("-x - ");
        }
        line.push_str(&self.name);
        for arg in &self.args {
            line.push(' ');
            if arg.chars().any(char::is_whitespace) {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

impl fmt::Display for P4Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(client) = &self.client {
            write!(f, "-c {} ", client)?;
        }
        f.write_str(&self.line())
    }
}

/// One tagged record from p4: an ordered map of field name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly handy for canned records.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Append a continuation line to an existing value.
    pub fn append_line(&mut self, key: &str, line: &str) {
        if let Some(value) = self.fields.get_mut(key) {
            value.push('\n');
            value.push_str(line);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, VcsError> {
        self.get(key)
            .ok_or_else(|| VcsError::MissingField(key.to_string()))
    }

    /// Parse a numeric field. A missing field is `Ok(None)`.
    pub fn int(&self, key: &str) -> Result<Option<u32>, VcsError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| VcsError::BadInteger {
                    field: key.to_string(),
                    value: value.to_string(),
                }),
        }
    }

    pub fn require_int(&self, key: &str) -> Result<u32, VcsError> {
        self.int(key)?
            .ok_or_else(|| VcsError::MissingField(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Records produced while the command runs. A command that fails part way
/// through yields the records it printed and then the error.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record, VcsError>> + 'a>;

/// The seam between the tools and the version-control server.
pub trait Vcs {
    /// Run a command in tagged mode and stream its records.
    fn run(&self, command: &P4Command) -> Result<RecordStream<'_>, VcsError>;

    /// Run a form-based command and return its plain text output, feeding
    /// `input` on stdin when given.
    fn run_raw(&self, command: &P4Command, input: Option<&str>) -> Result<String, VcsError>;
}
