//! Shared test infrastructure: a scripted stand-in for the p4 server and a
//! temporary workspace harness.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use p4shelf_lib::p4::{ztag, RecordStream};
use p4shelf_lib::{P4Command, Record, Vcs, VcsError};
use tempfile::TempDir;

/// Commands that only read state.
const QUERIES: &[&str] = &[
    "fstat",
    "where",
    "info",
    "opened",
    "describe",
    "diff",
    "client -o",
    "change -o",
    "resolve -n",
    "add -n",
];

/// A command the stub received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub client: Option<String>,
    pub line: String,
    pub input: Option<String>,
}

impl Call {
    pub fn is_query(&self) -> bool {
        let line = self.line.trim_start_matches("-x - ");
        QUERIES
            .iter()
            .any(|q| line == *q || line.starts_with(&format!("{} ", q)))
    }

    /// The command as `p4` would show it, with the client override.
    pub fn display(&self) -> String {
        match &self.client {
            Some(client) => format!("-c {} {}", client, self.line),
            None => self.line.clone(),
        }
    }
}

/// Canned server responses keyed by command line (without connection
/// flags). Unknown commands succeed with no output.
#[derive(Default)]
pub struct StubVcs {
    records: HashMap<String, Vec<Record>>,
    raw: HashMap<String, String>,
    failing: HashSet<String>,
    calls: Mutex<Vec<Call>>,
}

impl StubVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the output of `line`.
    pub fn respond(mut self, line: &str, record: Record) -> Self {
        self.records.entry(line.to_string()).or_default().push(record);
        self
    }

    /// Append the records of `p4 -ztag` output to the output of `line`.
    pub fn respond_tagged(mut self, line: &str, output: &str) -> Self {
        self.records
            .entry(line.to_string())
            .or_default()
            .extend(ztag::parse(output));
        self
    }

    pub fn respond_raw(mut self, line: &str, output: &str) -> Self {
        self.raw.insert(line.to_string(), output.to_string());
        self
    }

    /// Make `line` exit non-zero.
    pub fn fail(mut self, line: &str) -> Self {
        self.failing.insert(line.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Every command received, formatted as `[-c client ]line`.
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(Call::display).collect()
    }

    /// Commands that change state, in order.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|c| !c.is_query())
            .map(Call::display)
            .collect()
    }

    /// Stdin fed to the first call of `line`.
    pub fn input_for(&self, line: &str) -> Option<String> {
        self.calls()
            .into_iter()
            .find(|c| c.line == line)
            .and_then(|c| c.input)
    }

    fn record_call(&self, command: &P4Command, input: Option<&str>) -> Result<String, VcsError> {
        let line = command.line();
        self.calls.lock().unwrap().push(Call {
            client: command.client().map(str::to_string),
            line: line.clone(),
            input: input.map(str::to_string),
        });
        if self.failing.contains(&line) {
            return Err(VcsError::ExecutionFailed {
                command: line,
                status: "exit status: 1".to_string(),
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(line)
    }
}

impl Vcs for StubVcs {
    fn run(&self, command: &P4Command) -> Result<RecordStream<'_>, VcsError> {
        let line = self.record_call(command, None)?;
        let records = self.records.get(&line).cloned().unwrap_or_default();
        Ok(Box::new(records.into_iter().map(Ok)))
    }

    fn run_raw(&self, command: &P4Command, input: Option<&str>) -> Result<String, VcsError> {
        let line = self.record_call(command, input)?;
        Ok(self.raw.get(&line).cloned().unwrap_or_default())
    }
}

/// A temporary workspace root named `ws` plus the server view of it.
pub struct WorkspaceHarness {
    pub dir: TempDir,
    pub client: String,
    pub vcs: StubVcs,
}

impl WorkspaceHarness {
    /// Workspace `client` rooted at `<tempdir>/ws`, known to `info` and
    /// `client -o`.
    pub fn new(client: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("ws");
        std::fs::create_dir_all(&root).unwrap();

        let vcs = StubVcs::new()
            .respond("info", Record::new().with("clientName", client))
            .respond(
                "client -o",
                Record::new()
                    .with("Client", client)
                    .with("Root", root.to_string_lossy())
                    .with("View0", format!("//depot/main/... //{}/...", client)),
            );

        Self {
            dir,
            client: client.to_string(),
            vcs,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("ws")
    }

    /// Write `content` to `<root>/<relative>`.
    pub fn with_file(self, relative: &str, content: &str) -> Self {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        self
    }

    /// A file opened for `action` at `revision`, at `<root>/<relative>`
    /// locally and `//<client>/<relative>` in client syntax.
    pub fn with_opened(self, depot_path: &str, revision: u32, action: &str, relative: &str) -> Self {
        let local = self.root().join(relative);
        let client_path = format!("//{}/{}", self.client, relative);
        self.map_vcs(|vcs| {
            vcs.respond(
                "opened",
                Record::new()
                    .with("depotFile", depot_path)
                    .with("clientFile", client_path)
                    .with("rev", revision.to_string())
                    .with("action", action),
            )
            .respond(
                &format!("fstat {}", depot_path),
                Record::new()
                    .with("depotFile", depot_path)
                    .with("clientFile", local.to_string_lossy())
                    .with("headRev", revision.to_string()),
            )
        })
    }

    /// Map `depot_path` to `<root>/<relative>` for `where`.
    pub fn with_mapping(self, depot_path: &str, relative: &str) -> Self {
        let local = self.root().join(relative);
        self.map_vcs(|vcs| {
            vcs.respond(
                &format!("where {}", depot_path),
                Record::new()
                    .with("depotFile", depot_path)
                    .with("path", local.to_string_lossy()),
            )
        })
    }

    pub fn map_vcs(self, f: impl FnOnce(StubVcs) -> StubVcs) -> Self {
        Self {
            vcs: f(self.vcs),
            dir: self.dir,
            client: self.client,
        }
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative)).unwrap()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }
}
