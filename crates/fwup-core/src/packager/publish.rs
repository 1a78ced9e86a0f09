//! Publishing the per-branch "latest" pointer.
//!
//! The pointer is the only mutable file on the host. It is replaced with a
//! rename, and only after every artifact it references has been checked to
//! exist with the recorded non-zero size.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use fwup_schema::{BranchName, LATEST_DIR, ManifestError, PublishedManifest, Revision, TarEntry, VariantName};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors raised while publishing a latest pointer.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A referenced archive does not exist.
    #[error("artifact {0} is missing")]
    Missing(PathBuf),

    /// A referenced archive differs in size from its manifest entry.
    #[error("artifact {path} is {actual} bytes, manifest records {expected}")]
    SizeMismatch {
        /// Archive path.
        path: PathBuf,
        /// Size in the manifest.
        expected: u64,
        /// Size on disk.
        actual: u64,
    },

    /// A referenced archive is zero bytes.
    #[error("artifact {0} is empty")]
    Empty(PathBuf),

    /// No variant was built for the revision.
    #[error("nothing to publish for {0}")]
    NoVariants(String),

    /// The pointer could not be serialized.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The new pointer could not replace the old one.
    #[error("failed to replace latest pointer: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Path of the latest pointer for `branch` under an app's output directory.
pub fn latest_path(app_out: &Path, branch: &BranchName) -> PathBuf {
    app_out.join(LATEST_DIR).join(branch.as_str())
}

/// Check that every referenced artifact is complete.
pub fn verify_artifacts(
    app_out: &Path,
    dict_tars: &BTreeMap<VariantName, TarEntry>,
) -> Result<(), PublishError> {
    for entry in dict_tars.values() {
        let path = app_out.join(&entry.link);
        let actual = match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Err(PublishError::Missing(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PublishError::Missing(path));
            }
            Err(e) => return Err(e.into()),
        };
        if actual == 0 || entry.size_bytes == 0 {
            return Err(PublishError::Empty(path));
        }
        if actual != entry.size_bytes {
            return Err(PublishError::SizeMismatch {
                path,
                expected: entry.size_bytes,
                actual,
            });
        }
    }
    Ok(())
}

/// Point `branch` at `revision`. Returns the pointer's path.
pub fn publish_latest(
    app_out: &Path,
    branch: &BranchName,
    revision: &Revision,
    dict_tars: BTreeMap<VariantName, TarEntry>,
) -> Result<PathBuf, PublishError> {
    if dict_tars.is_empty() {
        return Err(PublishError::NoVariants(format!("{branch} @ {}", revision.id)));
    }
    verify_artifacts(app_out, &dict_tars)?;

    let mut manifest = PublishedManifest::new(revision, dict_tars);
    manifest.branch = Some(branch.clone());
    let json = manifest.to_json()?;

    let path = latest_path(app_out, branch);
    let parent = path.parent().unwrap_or(app_out);
    std::fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(&path)?;

    tracing::debug!(path = %path.display(), revision = %revision.id, "latest pointer replaced");
    Ok(path)
}
