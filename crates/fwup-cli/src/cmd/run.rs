//! Run command: the polling agent.

use std::sync::Arc;

use anyhow::Result;
use fwup_core::Reporter;
use fwup_core::updater::{self, Backoff, RunExit};

use crate::settings::Settings;

pub async fn run(settings: &Settings, cycles: Option<u64>, reporter: Arc<dyn Reporter>) -> Result<()> {
    let branch = settings.config.branch.clone();
    let mut updater = settings.updater(Arc::clone(&reporter))?;
    let backoff = Backoff::new(settings.config.poll_interval(), settings.config.backoff_cap());

    reporter.section(&format!(
        "Tracking {} every {}s",
        updater.manifest_url(&branch),
        settings.config.poll_interval_secs
    ));

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // no signal handler available: run until the cycle limit
            std::future::pending::<()>().await;
        }
    };

    match updater::run(&mut updater, &branch, backoff, cycles, shutdown).await {
        RunExit::Restarted(revision) => {
            reporter.done(branch.as_str(), &format!("installed {revision}, restarting"));
        }
        RunExit::Shutdown => reporter.info("interrupted"),
        RunExit::CycleLimit => reporter.info("cycle limit reached"),
    }
    Ok(())
}
