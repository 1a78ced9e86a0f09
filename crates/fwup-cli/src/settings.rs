//! Config loading and updater assembly shared by the commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fwup_core::config::DeviceConfig;
use fwup_core::io::fetch::{HttpFetcher, SchemeFetcher};
use fwup_core::updater::{
    AlwaysConnected, CommandRestart, NetworkLink, NoRestart, Restart, TcpLink, Updater,
};
use fwup_core::{Reporter, config_path, fwup_home};
use fwup_schema::{BranchName, VariantName};

use crate::ConfigArgs;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved settings for one invocation.
#[derive(Debug)]
pub struct Settings {
    pub home: PathBuf,
    pub config_file: PathBuf,
    pub config: DeviceConfig,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<Settings> {
        let home = self
            .home
            .clone()
            .or_else(fwup_home)
            .context("Cannot determine home directory; set FWUP_HOME")?;
        let config_file = self.config.clone().unwrap_or_else(|| config_path(&home));
        let mut config = DeviceConfig::load(&config_file)?;
        self.apply(&mut config);
        Ok(Settings {
            home,
            config_file,
            config,
        })
    }

    fn apply(&self, config: &mut DeviceConfig) {
        if let Some(url) = &self.base_url {
            config.base_url.clone_from(url);
        }
        if let Some(branch) = &self.branch {
            config.branch = BranchName::new(branch.as_str());
        }
        if let Some(root) = &self.root {
            config.root = Some(root.clone());
        }
        if !self.variants.is_empty() {
            config.variants = self
                .variants
                .iter()
                .map(|v| VariantName::new(v.as_str()))
                .collect();
        }
        if let Some(mode) = self.install_mode {
            config.install_mode = mode.into();
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        if let Some(secs) = self.backoff_cap {
            config.backoff_cap_secs = secs;
        }
        if let Some(secs) = self.link_timeout {
            config.link_timeout_secs = secs;
        }
        if let Some(addr) = &self.link_check {
            config.link_check = Some(addr.clone());
        }
        if let Some(command) = &self.restart_command {
            config.restart_command = Some(command.split_whitespace().map(String::from).collect());
        }
        if let Some(dir) = &self.state_dir {
            config.state_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir = Some(dir.clone());
        }
    }
}

impl Settings {
    /// Assemble the device agent. Fails on settings no cycle could work with.
    pub fn updater(&self, reporter: Arc<dyn Reporter>) -> Result<Updater> {
        self.config.validate()?;

        let fetcher = SchemeFetcher::new(HttpFetcher::with_timeout(CONNECT_TIMEOUT)?);
        let link: Arc<dyn NetworkLink> = match &self.config.link_check {
            Some(addr) => Arc::new(TcpLink::new(addr.as_str())),
            None => Arc::new(AlwaysConnected),
        };
        let restart: Arc<dyn Restart> = match &self.config.restart_command {
            Some(argv) => Arc::new(
                CommandRestart::new(argv.clone()).context("Invalid restart_command")?,
            ),
            None => Arc::new(NoRestart),
        };

        Ok(Updater::new(&self.config, &self.home, Arc::new(fetcher))
            .with_link(link)
            .with_restart(restart)
            .with_reporter(reporter))
    }
}
