//! Check command: one update cycle, or a dry-run preview.

use std::sync::Arc;

use anyhow::{Context, Result};
use fwup_core::Reporter;
use fwup_core::updater::{Outcome, Preview};

use crate::settings::Settings;

pub async fn check(settings: &Settings, dry_run: bool, reporter: Arc<dyn Reporter>) -> Result<()> {
    let branch = settings.config.branch.clone();
    let mut updater = settings.updater(Arc::clone(&reporter))?;

    if dry_run {
        let preview = updater
            .preview(&branch)
            .await
            .with_context(|| format!("Failed to check {}", updater.manifest_url(&branch)))?;
        match preview {
            Preview::UpToDate(revision) => {
                reporter.done(branch.as_str(), &format!("up to date at {revision}"));
            }
            Preview::Available {
                installed,
                remote,
                variant,
            } => {
                let from = installed.map_or_else(|| "nothing".to_string(), |r| r.to_string());
                let via = variant.map_or_else(
                    || "no acceptable variant".to_string(),
                    |v| format!("variant {v}"),
                );
                reporter.info(&format!(
                    "update available: {from} -> {} ({via})",
                    remote.commit_sha
                ));
                reporter.info(&remote.commit_pretty);
            }
        }
        return Ok(());
    }

    updater.recover()?;
    match updater.check_and_update(&branch).await {
        Outcome::NoUpdate => {
            let at = updater
                .installed()
                .map_or_else(String::new, |s| format!(" at {}", s.revision()));
            reporter.done(branch.as_str(), &format!("up to date{at}"));
            Ok(())
        }
        Outcome::Updated { revision, variant } => {
            reporter.done(branch.as_str(), &format!("installed {revision} ({variant})"));
            Ok(())
        }
        Outcome::Failed(e) => Err(e).context("Update failed"),
    }
}
