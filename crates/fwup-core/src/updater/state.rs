//! Persisted [`InstalledState`].
//!
//! Written with a temp file in the same directory plus rename, so a crash
//! leaves either the old record or the new one, never a torn file.

use std::io::Write;
use std::path::{Path, PathBuf};

use fwup_schema::InstalledState;
use tempfile::NamedTempFile;
use thiserror::Error;

const STATE_FILE: &str = "installed.json";

/// Errors raised while reading or writing the installed state.
#[derive(Error, Debug)]
pub enum StateError {
    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The state file is not a valid record.
    #[error("corrupt installed state {path}: {source}")]
    Corrupt {
        /// State file.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The record could not be encoded.
    #[error("failed to serialize installed state: {0}")]
    Serialize(serde_json::Error),

    /// The new record could not replace the old one.
    #[error("failed to persist installed state: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// The `installed.json` file in a state directory.
#[derive(Debug, Clone)]
pub struct InstalledStateStore {
    path: PathBuf,
}

impl InstalledStateStore {
    /// Store under `state_dir`, which is created on first save.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(STATE_FILE),
        }
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` on first boot.
    pub fn load(&self) -> Result<Option<InstalledState>, StateError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StateError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Like [`load`](Self::load), but an unreadable record counts as no
    /// install, which forces a fresh install on the next check.
    pub fn load_or_warn(&self) -> Option<InstalledState> {
        match self.load() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("ignoring installed state: {e}");
                None
            }
        }
    }

    /// Atomically replace the record.
    pub fn save(&self, state: &InstalledState) -> Result<(), StateError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_vec_pretty(state).map_err(StateError::Serialize)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        tracing::debug!(path = %self.path.display(), revision = %state.revision(), "installed state saved");
        Ok(())
    }

    /// Forget the installed state.
    pub fn clear(&self) -> Result<(), StateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
