//! Manifest wire formats.
//!
//! Three records share most of their fields:
//!
//! - [`PublishedManifest`]: the per-branch "latest" pointer served at
//!   `<base_url>/latest/<branch>`. The device's single source of truth for
//!   whether something newer exists.
//! - [`PackageManifest`]: embedded in every archive as
//!   [`EMBEDDED_MANIFEST_NAME`](crate::EMBEDDED_MANIFEST_NAME), scoped to that
//!   one package.
//! - [`InstalledState`]: persisted on the device after a successful install.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::Sha256Digest;
use crate::types::{BranchName, Revision, RevisionId, VariantName};

/// Errors raised while decoding a manifest body.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The body is not a well-formed manifest.
    #[error("malformed manifest: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The manifest lists no package variants at all.
    #[error("manifest for {0} lists no packages")]
    Empty(RevisionId),

    /// The revision id cannot be used as a file name.
    #[error("invalid revision id {0:?}")]
    InvalidRevision(RevisionId),
}

/// Location and integrity data for one package variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarEntry {
    /// Path of the archive relative to the app's base URL, e.g. `src/<sha>.tar`.
    pub link: String,
    /// SHA-256 over the complete archive bytes.
    pub sha256: Sha256Digest,
    /// Archive size in bytes.
    pub size_bytes: u64,
}

/// The published "latest" pointer for one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedManifest {
    /// Revision this pointer refers to.
    pub commit_sha: RevisionId,
    /// Human readable description of the revision.
    pub commit_pretty: String,
    /// Branch this pointer was published for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchName>,
    /// Every variant built for the revision.
    pub dict_tars: BTreeMap<VariantName, TarEntry>,
}

impl PublishedManifest {
    /// Create a manifest for `revision` with the given variants.
    pub fn new(revision: &Revision, dict_tars: BTreeMap<VariantName, TarEntry>) -> Self {
        Self {
            commit_sha: revision.id.clone(),
            commit_pretty: revision.summary.clone(),
            branch: Some(revision.branch.clone()),
            dict_tars,
        }
    }

    /// Decode a manifest body fetched from the host.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Malformed`] for invalid JSON or digests,
    /// [`ManifestError::InvalidRevision`] for an id that is not
    /// [file safe](RevisionId::is_file_safe) and [`ManifestError::Empty`]
    /// when no variant is listed.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_slice(bytes)?;
        if !manifest.commit_sha.is_file_safe() {
            return Err(ManifestError::InvalidRevision(manifest.commit_sha));
        }
        if manifest.dict_tars.is_empty() {
            return Err(ManifestError::Empty(manifest.commit_sha));
        }
        Ok(manifest)
    }

    /// Pretty JSON, four-space indented, as written to the host.
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(to_json_pretty(self)?)
    }

    /// First variant in `preference` order that this manifest provides.
    pub fn select_variant<'a>(
        &'a self,
        preference: &[VariantName],
    ) -> Option<(&'a VariantName, &'a TarEntry)> {
        preference
            .iter()
            .find_map(|name| self.dict_tars.get_key_value(name))
    }
}

/// Manifest embedded in a package archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Files contained in the package, relative to the install root, in archive order.
    pub files: Vec<String>,
    /// Branch the package was built from.
    pub branch: BranchName,
    /// Revision the package was built from.
    pub commit_sha: RevisionId,
    /// Human readable description of the revision.
    pub commit_pretty: String,
}

impl PackageManifest {
    /// Create an embedded manifest for `revision`.
    pub fn new(revision: &Revision, files: Vec<String>) -> Self {
        Self {
            files,
            branch: revision.branch.clone(),
            commit_sha: revision.id.clone(),
            commit_pretty: revision.summary.clone(),
        }
    }

    /// Decode the embedded manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Malformed`] if the bytes are not a valid manifest.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Pretty JSON, as written into the archive.
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(to_json_pretty(self)?)
    }
}

/// What the device last installed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledState {
    /// The published manifest that triggered the install.
    pub manifest: PublishedManifest,
    /// Variant that was installed.
    pub variant: VariantName,
    /// Files the installed package contained.
    pub files: Vec<String>,
    /// RFC 3339 timestamp of the install. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<String>,
}

impl InstalledState {
    /// Revision currently installed.
    pub fn revision(&self) -> &RevisionId {
        &self.manifest.commit_sha
    }

    /// Whether `remote` describes the revision already installed.
    pub fn is_current(&self, remote: &PublishedManifest) -> bool {
        self.manifest.commit_sha == remote.commit_sha
    }
}

fn to_json_pretty<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn wire_body() -> String {
        format!(
            r#"{{
    "commit_sha": "abc123",
    "commit_pretty": "Jo <jo@example.com>: first",
    "dict_tars": {{
        "src": {{"link": "src/abc123.tar", "sha256": "{HASH}", "size_bytes": 10240}},
        "mpy_version/6.1": {{"link": "mpy_version/6.1/abc123.tar", "sha256": "{HASH}", "size_bytes": 4096}}
    }}
}}"#
        )
    }

    #[test]
    fn parses_wire_format_without_branch() {
        let manifest = PublishedManifest::from_json(wire_body().as_bytes()).unwrap();
        assert_eq!(manifest.commit_sha, "abc123");
        assert_eq!(manifest.branch, None);
        assert_eq!(manifest.dict_tars.len(), 2);
        assert_eq!(manifest.dict_tars["src"].size_bytes, 10240);
    }

    #[test]
    fn rejects_bad_digest_and_empty_variants() {
        let bad = wire_body().replace(HASH, "deadbeef");
        assert!(matches!(
            PublishedManifest::from_json(bad.as_bytes()),
            Err(ManifestError::Malformed(_))
        ));

        let empty = r#"{"commit_sha": "x", "commit_pretty": "", "dict_tars": {}}"#;
        assert!(matches!(
            PublishedManifest::from_json(empty.as_bytes()),
            Err(ManifestError::Empty(_))
        ));
    }

    #[test]
    fn rejects_revision_ids_that_are_paths() {
        for id in ["/tmp/victim", "../../victim", ".."] {
            let body = wire_body().replace(
                r#""commit_sha": "abc123""#,
                &format!("\"commit_sha\": {id:?}"),
            );
            assert!(
                matches!(
                    PublishedManifest::from_json(body.as_bytes()),
                    Err(ManifestError::InvalidRevision(_))
                ),
                "{id} accepted"
            );
        }
    }

    #[test]
    fn select_variant_follows_preference() {
        let manifest = PublishedManifest::from_json(wire_body().as_bytes()).unwrap();
        let prefs = [VariantName::new("mpy_version/6.1"), VariantName::new("src")];
        let (name, entry) = manifest.select_variant(&prefs).unwrap();
        assert_eq!(name, "mpy_version/6.1");
        assert_eq!(entry.link, "mpy_version/6.1/abc123.tar");

        let none = manifest.select_variant(&[VariantName::new("mpy_version/7.0")]);
        assert!(none.is_none());
    }

    #[test]
    fn installed_state_compares_by_revision_only() {
        let manifest = PublishedManifest::from_json(wire_body().as_bytes()).unwrap();
        let state = InstalledState {
            manifest: manifest.clone(),
            variant: VariantName::new("src"),
            files: vec!["main.py".into()],
            installed_at: None,
        };
        let mut newer = manifest.clone();
        newer.commit_pretty = "reworded".into();
        assert!(state.is_current(&newer));
        newer.commit_sha = RevisionId::new("def456");
        assert!(!state.is_current(&newer));
    }

    #[test]
    fn json_uses_four_space_indent() {
        let rev = Revision::new("abc123", "summary", "main");
        let json = PackageManifest::new(&rev, vec!["main.py".into()])
            .to_json()
            .unwrap();
        assert!(json.contains("\n    \"files\""));
        let back = PackageManifest::from_json(json.as_bytes()).unwrap();
        assert_eq!(back.files, vec!["main.py".to_string()]);
    }
}
