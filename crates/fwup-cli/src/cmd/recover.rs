//! Recover command

use anyhow::{Context, Result};
use fwup_core::io::extract;
use fwup_core::Reporter;

use crate::settings::Settings;

/// Repair the install root after an interrupted staged swap.
pub fn recover(settings: &Settings, reporter: &dyn Reporter) -> Result<()> {
    let root = settings.config.root_dir(&settings.home);
    let recovery = extract::recover(&root)
        .with_context(|| format!("Failed to recover {}", root.display()))?;

    let subject = root.display().to_string();
    if recovery.is_clean() {
        reporter.done(&subject, "nothing to recover");
        return Ok(());
    }
    if recovery.restored_previous {
        reporter.done(&subject, "restored the previous tree");
    }
    if recovery.removed_previous {
        reporter.done(&subject, "removed the replaced tree");
    }
    if recovery.removed_staging {
        reporter.done(&subject, "discarded an unfinished staging tree");
    }
    Ok(())
}
