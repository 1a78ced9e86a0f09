//! Shared types and wire format for fwup.
//!
//! Everything the packager writes and the device reads is defined here: the
//! published per-branch manifest, the manifest embedded in each package, the
//! device's installed state, and the SHA-256 digest newtype that all
//! integrity checks go through.

pub mod hash;
pub mod manifest;
pub mod types;

// Re-exports
pub use hash::*;
pub use manifest::{InstalledState, ManifestError, PackageManifest, PublishedManifest, TarEntry};
pub use types::*;

/// Name of the manifest file embedded at the root of every package archive.
pub const EMBEDDED_MANIFEST_NAME: &str = "config_package_manifest.json";

/// Extension of package archives. Packages are named `<revision_id>.tar`.
pub const TAR_SUFFIX: &str = ".tar";

/// Directory (relative to an app's base URL) that holds the per-branch latest pointers.
pub const LATEST_DIR: &str = "latest";

/// File name prefix for device-local files that updates must never remove.
pub const PRESERVED_PREFIX: &str = "config_";
