pub mod cli;
pub mod config;
pub mod guard;
pub mod migrate;
pub mod p4;
pub mod reconcile;
pub mod revert;
pub mod shelf;

pub use config::{Config, ConfigError, Connection, Settings};
pub use p4::{P4Cli, P4Command, Record, Session, Vcs, VcsError};
pub use shelf::{ArchiveDescription, FileAction, OpenedFile, ShelfError, SourceReference};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
