//! A [`Vcs`] adapter bound to the run configuration.
//!
//! Queries always run. Mutating commands go through [`Session::mutate`],
//! which only logs them when the configuration asks for a dry run.

use std::path::PathBuf;

use log::info;

use super::{P4Command, Record, RecordStream, Vcs, VcsError};
use crate::config::Config;

/// Adapter plus configuration, handed to every operation.
#[derive(Clone)]
pub struct Session<'a> {
    vcs: &'a dyn Vcs,
    config: Config,
    client: Option<String>,
}

impl<'a> Session<'a> {
    pub fn new(vcs: &'a dyn Vcs, config: Config) -> Self {
        Self {
            vcs,
            config,
            client: None,
        }
    }

    /// A session whose commands all run as `client`.
    pub fn with_client(&self, client: impl Into<String>) -> Self {
        Self {
            client: Some(client.into()),
            ..self.clone()
        }
    }

    /// A session that syncs restored files to head.
    pub fn with_sync_head(&self) -> Self {
        Self {
            config: self.config.clone().with_sync_head(true),
            ..self.clone()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    fn bind(&self, command: &P4Command) -> P4Command {
        match (&self.client, command.client()) {
            (Some(client), None) => command.clone().as_client(client.clone()),
            _ => command.clone(),
        }
    }

    /// Stream the records of a read-only command.
    pub fn records(&self, command: &P4Command) -> Result<RecordStream<'a>, VcsError> {
        let vcs: &'a dyn Vcs = self.vcs;
        vcs.run(&self.bind(command))
    }

    /// Run a read-only command and collect its records.
    pub fn query(&self, command: &P4Command) -> Result<Vec<Record>, VcsError> {
        self.records(command)?.collect()
    }

    /// Run a read-only command that must produce at least one record.
    pub fn query_one(&self, command: &P4Command) -> Result<Record, VcsError> {
        match self.records(command)?.next() {
            Some(record) => record,
            None => Err(VcsError::EmptyResult(command.line())),
        }
    }

    pub fn query_raw(&self, command: &P4Command, input: Option<&str>) -> Result<String, VcsError> {
        self.vcs.run_raw(&self.bind(command), input)
    }

    /// Run a command that changes server or workspace state.
    pub fn mutate(&self, command: &P4Command) -> Result<Vec<Record>, VcsError> {
        let command = self.bind(command);
        if self.config.dry_run {
            info!("[dry-run] p4 {}", command);
            return Ok(Vec::new());
        }
        info!("p4 {}", command);
        self.vcs.run(&command)?.collect()
    }

    pub fn mutate_raw(&self, command: &P4Command, input: Option<&str>) -> Result<String, VcsError> {
        let command = self.bind(command);
        if self.config.dry_run {
            info!("[dry-run] p4 {}", command);
            return Ok(String::new());
        }
        info!("p4 {}", command);
        self.vcs.run_raw(&command, input)
    }

    // === Common queries ===

    /// Name of the workspace commands run against.
    pub fn client_name(&self) -> Result<String, VcsError> {
        let info = self.query_one(&P4Command::new("info"))?;
        Ok(info.require("clientName")?.trim().to_string())
    }

    /// The workspace specification as a tagged record.
    pub fn client_spec(&self) -> Result<Record, VcsError> {
        self.query_one(&P4Command::new("client").arg("-o"))
    }

    pub fn client_root(&self) -> Result<String, VcsError> {
        Ok(self.client_spec()?.require("Root")?.trim().to_string())
    }

    /// Local path of a file as the server sees it (`fstat` → `clientFile`).
    pub fn local_path(&self, path: &str) -> Result<String, VcsError> {
        let record = self.query_one(&P4Command::new("fstat").arg(path))?;
        Ok(record.require("clientFile")?.to_string())
    }

    /// Where a depot path lands on disk under this workspace's mapping.
    pub fn where_path(&self, path: &str) -> Result<PathBuf, VcsError> {
        let record = self.query_one(&P4Command::new("where").arg(path))?;
        Ok(PathBuf::from(record.require("path")?))
    }

    pub fn head_revision(&self, path: &str) -> Result<Option<u32>, VcsError> {
        let record = self.query_one(&P4Command::new("fstat").arg(path))?;
        record.int("headRev")
    }
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
