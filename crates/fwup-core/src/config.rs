//! Device configuration (`config.toml`).
//!
//! ```toml
//! base_url = "https://updates.example.com/web_downloads/app_a"
//! branch = "main"
//! root = "/srv/app"
//! variants = ["mpy_version/6.1", "src"]
//! install_mode = "staged"
//! poll_interval_secs = 60
//! backoff_cap_secs = 900
//! link_timeout_secs = 10
//! link_check = "updates.example.com:443"
//! restart_command = ["systemctl", "restart", "app"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use fwup_schema::{BranchName, VariantName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::extract::InstallMode;

/// Default variant preference: precompiled bytecode first, source as fallback.
pub const DEFAULT_VARIANTS: [&str; 2] = ["mpy_version/6.1", "src"];

/// Errors raised while loading or validating [`DeviceConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`DeviceConfig`].
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// A setting no update cycle could work with.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for one device agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// App root on the static host; manifests live under `<base_url>/latest/`.
    pub base_url: String,
    /// Branch (update channel) to track.
    pub branch: BranchName,
    /// Application tree updates are installed into. Defaults to `FWUP_HOME/app`.
    pub root: Option<PathBuf>,
    /// Variant preference, most preferred first.
    pub variants: Vec<VariantName>,
    /// How packages are written into `root`.
    pub install_mode: InstallMode,
    /// Delay between cycles when nothing failed.
    pub poll_interval_secs: u64,
    /// Upper bound for the failure backoff.
    pub backoff_cap_secs: u64,
    /// How long to wait for the network link before giving up on a cycle.
    pub link_timeout_secs: u64,
    /// `host:port` connected to over TCP to decide whether the link is up.
    pub link_check: Option<String>,
    /// Command run after a successful install to restart the application.
    pub restart_command: Option<Vec<String>>,
    /// Where the installed state is persisted. Defaults to `FWUP_HOME/state`.
    pub state_dir: Option<PathBuf>,
    /// Where downloads are staged. Defaults to `FWUP_HOME/tmp`.
    pub download_dir: Option<PathBuf>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            branch: BranchName::new("main"),
            root: None,
            variants: DEFAULT_VARIANTS.iter().map(|v| VariantName::new(*v)).collect(),
            install_mode: InstallMode::default(),
            poll_interval_secs: 60,
            backoff_cap_secs: 900,
            link_timeout_secs: 10,
            link_check: None,
            restart_command: None,
            state_dir: None,
            download_dir: None,
        }
    }
}

impl DeviceConfig {
    /// Parse a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config TOML.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check the settings that have no usable default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "base_url is not set (config file, --base-url or FWUP_BASE_URL)".to_string(),
            ));
        }
        if self.variants.is_empty() {
            return Err(ConfigError::Invalid(
                "variants must list at least one package variant".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay between cycles while nothing fails.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Never below the poll interval.
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(self.backoff_cap_secs.max(self.poll_interval_secs))
    }

    /// How long one cycle waits for the link to come up.
    pub fn link_timeout(&self) -> Duration {
        Duration::from_secs(self.link_timeout_secs)
    }

    /// Resolved application root.
    pub fn root_dir(&self, home: &Path) -> PathBuf {
        self.root.clone().unwrap_or_else(|| crate::paths::app_dir(home))
    }

    /// Resolved state directory.
    pub fn state_dir(&self, home: &Path) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| crate::paths::state_dir(home))
    }

    /// Resolved download staging directory.
    pub fn download_dir(&self, home: &Path) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| crate::paths::tmp_dir(home))
    }
}
