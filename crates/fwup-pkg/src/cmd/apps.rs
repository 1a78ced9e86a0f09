//! Apps command

use std::path::Path;

use anyhow::{Context, Result};
use fwup_core::packager::app::discover;

pub fn apps(repo: &Path) -> Result<()> {
    let apps = discover(repo, &[]).with_context(|| format!("Failed to scan {}", repo.display()))?;
    if apps.is_empty() {
        println!("no apps found under {}", repo.display());
        return Ok(());
    }
    for app in apps {
        let files = app.collect_files(repo)?.map_or(0, |f| f.len());
        println!(
            "{:<20} {:<30} {:<20} {files} files",
            app.name,
            app.directory.display(),
            app.globs.join(",")
        );
    }
    Ok(())
}
