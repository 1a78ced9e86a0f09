//! Layout of the fwup home directory, plus URL joining.

use dirs::home_dir;
use std::path::PathBuf;

/// Returns the fwup home directory (`FWUP_HOME`, else `~/.fwup`), or None if
/// the user's home cannot be resolved.
pub fn fwup_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("FWUP_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".fwup"))
}

/// Device config path: ~/.fwup/config.toml
pub fn config_path(home: &std::path::Path) -> PathBuf {
    home.join("config.toml")
}

/// Persisted state directory: ~/.fwup/state
pub fn state_dir(home: &std::path::Path) -> PathBuf {
    home.join("state")
}

/// Download staging: ~/.fwup/tmp (same volume as the state)
pub fn tmp_dir(home: &std::path::Path) -> PathBuf {
    home.join("tmp")
}

/// Default application tree: ~/.fwup/app
pub fn app_dir(home: &std::path::Path) -> PathBuf {
    home.join("app")
}

/// Join a relative link onto a base URL with exactly one `/` between them.
///
/// # Example
///
/// ```
/// use fwup_core::join_url;
///
/// assert_eq!(join_url("https://host/app/", "/src/abc.tar"), "https://host/app/src/abc.tar");
/// ```
pub fn join_url(base: &str, link: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        link.trim_start_matches('/')
    )
}
