//! fwup - device update agent
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Keeps an application tree on the latest package published for one branch.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.fwup/
//! ├── config.toml            # Device settings
//! ├── app/                   # Installed application (default root)
//! ├── state/installed.json   # Last successful install
//! └── tmp/                   # Downloads in flight
//! ```

pub mod cmd;
pub mod settings;
pub mod ui;

use clap::{Args, Parser, Subcommand, ValueEnum};
use fwup_core::io::extract::InstallMode;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "fwup")]
#[command(author, version, about = "fwup - over-the-air application updates")]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for `config.toml`. Flags win over environment, environment over the file.
#[derive(Debug, Default, Args)]
pub struct ConfigArgs {
    /// fwup home directory
    #[arg(long, global = true, env = "FWUP_HOME")]
    pub home: Option<PathBuf>,

    /// Config file (default: <home>/config.toml)
    #[arg(long, global = true, env = "FWUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// App root on the static host
    #[arg(long, global = true, env = "FWUP_BASE_URL")]
    pub base_url: Option<String>,

    /// Branch to track
    #[arg(long, global = true, env = "FWUP_BRANCH")]
    pub branch: Option<String>,

    /// Application tree to install into
    #[arg(long, global = true, env = "FWUP_ROOT")]
    pub root: Option<PathBuf>,

    /// Variant preference, most preferred first
    #[arg(long = "variant", global = true, env = "FWUP_VARIANTS", value_delimiter = ',')]
    pub variants: Vec<String>,

    /// How packages are written into the root
    #[arg(long, global = true, env = "FWUP_INSTALL_MODE")]
    pub install_mode: Option<ModeArg>,

    /// Seconds between polls
    #[arg(long, global = true, env = "FWUP_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Upper bound of the failure backoff, in seconds
    #[arg(long, global = true, env = "FWUP_BACKOFF_CAP")]
    pub backoff_cap: Option<u64>,

    /// Seconds one cycle waits for the link to come up
    #[arg(long, global = true, env = "FWUP_LINK_TIMEOUT")]
    pub link_timeout: Option<u64>,

    /// `host:port` that must accept TCP connections for the link to count as up
    #[arg(long, global = true, env = "FWUP_LINK_CHECK")]
    pub link_check: Option<String>,

    /// Command run after a successful install (split on whitespace)
    #[arg(long, global = true, env = "FWUP_RESTART_COMMAND")]
    pub restart_command: Option<String>,

    /// Where the installed state is kept (default: <home>/state)
    #[arg(long, global = true, env = "FWUP_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Where packages are downloaded to (default: <home>/tmp)
    #[arg(long, global = true, env = "FWUP_DOWNLOAD_DIR")]
    pub download_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Staged,
    InPlace,
}

impl From<ModeArg> for InstallMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Staged => InstallMode::Staged,
            ModeArg::InPlace => InstallMode::InPlace,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one update cycle
    Check {
        /// Only report whether an update is available
        #[arg(long)]
        dry_run: bool,
    },
    /// Poll until an update is installed or interrupted
    Run {
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Show the installed revision and settings
    Status,
    /// Finish or roll back an interrupted staged install
    Recover,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
