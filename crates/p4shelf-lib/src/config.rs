//! Run configuration and the optional settings file.
//!
//! [`Config`] is the value every operation receives (through a
//! [`Session`](crate::p4::Session)); nothing in the crate reads global state.
//! [`Settings`] is the user's `p4shelf.toml`, which supplies defaults that
//! command line flags override.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV_VAR: &str = "P4SHELF_CONFIG";

/// Settings file name under the user's config directory.
pub const CONFIG_FILE: &str = "p4shelf.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// How to reach the server: the flags passed to every `p4` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Connection {
    pub client: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
    /// The p4 executable to run
    pub program: String,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            client: None,
            port: None,
            user: None,
            program: "p4".to_string(),
        }
    }
}

impl Connection {
    /// Overlay the flags that are set in `overrides`.
    pub fn merged(mut self, overrides: &Connection) -> Self {
        if overrides.client.is_some() {
            self.client = overrides.client.clone();
        }
        if overrides.port.is_some() {
            self.port = overrides.port.clone();
        }
        if overrides.user.is_some() {
            self.user = overrides.user.clone();
        }
        self
    }
}

/// Options shared by every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub connection: Connection,
    /// Log every mutating step instead of running it
    pub dry_run: bool,
    /// Proceed with resolves and deletes even when a later revision exists
    pub force: bool,
    /// Sync restored files to head instead of their recorded revision
    pub sync_head: bool,
}

impl Config {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            ..Self::default()
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_sync_head(mut self, sync_head: bool) -> Self {
        self.sync_head = sync_head;
        self
    }
}

/// Contents of `p4shelf.toml`.
///
/// ```toml
/// [connection]
/// port = "perforce:1666"
/// user = "jim"
///
/// [shelve]
/// archive_dir = "/home/jim/shelves"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connection: Connection,
    pub shelve: ShelveSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelveSettings {
    /// Directory for archives given without a directory component
    pub archive_dir: Option<PathBuf>,
}

impl Settings {
    /// Location of the settings file: `$P4SHELF_CONFIG`, or
    /// `~/.config/p4shelf/p4shelf.toml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("p4shelf").join(CONFIG_FILE))
    }

    /// Load the settings file if there is one, defaults otherwise.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Place a bare archive name in the configured archive directory.
    pub fn archive_path(&self, name: &Path) -> PathBuf {
        match &self.shelve.archive_dir {
            Some(dir) if !name.has_root() && name.parent() == Some(Path::new("")) => {
                dir.join(name)
            }
            _ => name.to_path_buf(),
        }
    }
}
