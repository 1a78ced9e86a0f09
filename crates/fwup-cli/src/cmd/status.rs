//! Status command

use anyhow::Result;
use comfy_table::{Table, presets};
use crossterm::style::Stylize;
use fwup_core::io::extract;
use fwup_core::updater::InstalledStateStore;

use crate::settings::Settings;

/// Show settings and the installed revision.
pub fn status(settings: &Settings) -> Result<()> {
    let config = &settings.config;
    let root = config.root_dir(&settings.home);
    let store = InstalledStateStore::new(&config.state_dir(&settings.home));

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.add_row(vec!["Home".to_string(), settings.home.display().to_string()]);
    table.add_row(vec!["Config".to_string(), settings.config_file.display().to_string()]);
    table.add_row(vec![
        "Base URL".to_string(),
        if config.base_url.is_empty() {
            "(not set)".to_string()
        } else {
            config.base_url.clone()
        },
    ]);
    table.add_row(vec!["Branch".to_string(), config.branch.to_string()]);
    table.add_row(vec!["Root".to_string(), root.display().to_string()]);
    table.add_row(vec!["Install mode".to_string(), config.install_mode.to_string()]);
    table.add_row(vec![
        "Variants".to_string(),
        config
            .variants
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    ]);

    match store.load() {
        Ok(Some(state)) => {
            table.add_row(vec!["Installed".to_string(), state.revision().to_string()]);
            table.add_row(vec!["Variant".to_string(), state.variant.to_string()]);
            table.add_row(vec!["Summary".to_string(), state.manifest.commit_pretty.clone()]);
            table.add_row(vec!["Files".to_string(), state.files.len().to_string()]);
            if let Some(at) = &state.installed_at {
                table.add_row(vec!["Installed at".to_string(), at.clone()]);
            }
        }
        Ok(None) => {
            table.add_row(vec!["Installed".to_string(), "nothing yet".to_string()]);
        }
        Err(e) => {
            table.add_row(vec!["Installed".to_string(), format!("unreadable ({e})")]);
        }
    }

    println!();
    println!("{}", "Device status".dark_grey());
    println!("{table}");

    let staging = extract::staging_dir(&root)?;
    let previous = extract::previous_dir(&root)?;
    if staging.exists() || previous.exists() {
        println!();
        println!(
            "{}",
            "An interrupted install was found; run `fwup recover`.".yellow()
        );
    }
    Ok(())
}
