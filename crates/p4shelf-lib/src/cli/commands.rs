use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, Connection, Settings};

/// p4shelf - Archive, restore and move Perforce work in progress
///
/// Every command only previews what it would do unless given -y.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Optional log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log every p4 command
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Perforce client (workspace) to use
    #[arg(short = 'c', long, value_name = "CLIENT")]
    pub client: Option<String>,

    /// Perforce server address
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<String>,

    /// Perforce user
    #[arg(short = 'u', long, value_name = "USER")]
    pub user: Option<String>,

    /// Actually do the work (default is a dry run)
    #[arg(short = 'y', long = "yes")]
    pub execute: bool,

    /// Resolve and delete even when someone submitted a later revision
    #[arg(long)]
    pub force: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive the opened files of the workspace to a zip file
    ///
    /// Unless -f is given the file name gets a timestamp, a short form of
    /// the comment and a counter appended so earlier archives are kept.
    Shelve {
        /// Archive to write
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only archive this pending change
        #[arg(short = 's', long = "change", value_name = "CHANGE")]
        change: Option<u32>,

        /// Comment stored in the archive
        #[arg(short = 'm', long, value_name = "COMMENT")]
        comment: Option<String>,

        /// Use the file name exactly as given
        #[arg(short = 'f', long)]
        exact: bool,

        /// Overwrite an existing archive
        #[arg(short = 'o', long)]
        overwrite: bool,

        /// Record client paths so the archive restores onto another workspace
        #[arg(short = 'r', long)]
        relative: bool,
    },

    /// Restore an archive onto the current workspace
    Unshelve {
        /// Archive to restore
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Sync restored files to head instead of their archived revision
        #[arg(short = 'd', long)]
        head: bool,
    },

    /// Open the inverse of a submitted change
    Revert {
        /// Submitted change to undo
        #[arg(value_name = "CHANGE")]
        change: u32,
    },

    /// Move a workspace and its opened files to another depot location
    ///
    /// Only workspaces with a single view line are supported.
    Migrate {
        /// Workspace to move
        #[arg(value_name = "CLIENT")]
        client: String,

        /// New depot location, e.g. //depot/rel1/...
        #[arg(value_name = "NEW_LOCATION")]
        new_location: String,

        /// Switch only; don't branch the synced files to the new location first
        #[arg(short = 's', long)]
        switch_only: bool,

        /// Keep the shelved work in this archive instead of a temporary file
        #[arg(long, value_name = "FILE")]
        archive: Option<PathBuf>,
    },

    /// Open files changed while working offline for add, edit and delete
    Reconcile {
        /// Directory to reconcile (default: current directory)
        #[arg(value_name = "DIRECTORY")]
        directory: Option<PathBuf>,
    },
}

impl Cli {
    /// Filter for env_logger when RUST_LOG is not set.
    pub fn log_filter(&self) -> &str {
        match (&self.log_level, self.verbose, self.quiet) {
            (Some(level), _, _) => level.as_str(),
            (None, true, _) => "debug",
            (None, false, true) => "warn",
            (None, false, false) => "info",
        }
    }

    /// Connection flags given on the command line.
    pub fn connection(&self) -> Connection {
        Connection {
            client: self.client.clone(),
            port: self.port.clone(),
            user: self.user.clone(),
            ..Connection::default()
        }
    }

    /// Run configuration: the settings file overlaid with command line flags.
    pub fn config_with(&self, settings: &Settings) -> Config {
        Config::new(settings.connection.clone().merged(&self.connection()))
            .with_dry_run(!self.execute)
            .with_force(self.force)
    }
}
