//! Package archive writer.
//!
//! Archives are written to a temp file next to their final path, flushed to
//! disk, hashed, and only then renamed into place. The final name is
//! `<variant>/<revision><TAR_SUFFIX>`, so a path that exists is complete.

use std::path::{Path, PathBuf};

use fwup_schema::{
    EMBEDDED_MANIFEST_NAME, PackageManifest, Revision, Sha256Digest, TAR_SUFFIX, TarEntry,
    VariantName,
};
use tempfile::NamedTempFile;

use super::BuildError;
use super::variant::Variant;

/// A package written to the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPackage {
    /// App the package belongs to.
    pub app: String,
    /// Variant the package was built as.
    pub variant: VariantName,
    /// Revision the package was built from.
    pub revision: Revision,
    /// Absolute path of the archive.
    pub path: PathBuf,
    /// What the published manifest records for this variant.
    pub entry: TarEntry,
    /// Entry names, in archive order, excluding the embedded manifest.
    pub files: Vec<String>,
}

/// Link of a package relative to the app's output directory.
pub fn package_link(variant: &VariantName, revision: &Revision) -> String {
    format!("{variant}/{}{TAR_SUFFIX}", revision.id)
}

fn header(size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_mtime(0);
    header
}

/// Build the `variant` package of `app` for `revision`.
///
/// `app_root` is the app directory inside the revision tree and `files` the
/// matched paths relative to it.
pub fn write_package(
    app_out: &Path,
    app: &str,
    variant: &dyn Variant,
    revision: &Revision,
    app_root: &Path,
    files: &[String],
) -> Result<BuiltPackage, BuildError> {
    let variant_name = variant.name();
    let link = package_link(&variant_name, revision);
    let path = app_out.join(&link);
    let parent = path.parent().unwrap_or(app_out);
    std::fs::create_dir_all(parent)?;

    let tmp = NamedTempFile::new_in(parent)?;
    let mut names = Vec::with_capacity(files.len());
    {
        let mut builder = tar::Builder::new(tmp.as_file());
        for relative in files {
            let source = app_root.join(relative);
            let transformed =
                variant
                    .transform(&source, relative)
                    .map_err(|source| BuildError::Compile {
                        app: app.to_string(),
                        variant: variant_name.clone(),
                        source,
                    })?;
            let mut header = header(transformed.data.len() as u64);
            builder.append_data(&mut header, &transformed.name, transformed.data.as_slice())?;
            names.push(transformed.name);
        }

        let manifest = PackageManifest::new(revision, names.clone())
            .to_json()
            .map_err(|e| BuildError::Io(std::io::Error::other(e)))?;
        let mut header = header(manifest.len() as u64);
        builder.append_data(&mut header, EMBEDDED_MANIFEST_NAME, manifest.as_bytes())?;
        builder.finish()?;
    }
    tmp.as_file().sync_all()?;

    let (sha256, size_bytes) = Sha256Digest::compute_file(tmp.path())?;
    tmp.persist(&path).map_err(|e| BuildError::Io(e.error))?;
    tracing::debug!(app, variant = %variant_name, revision = %revision.id, size_bytes, "package written");

    Ok(BuiltPackage {
        app: app.to_string(),
        variant: variant_name,
        revision: revision.clone(),
        path,
        entry: TarEntry {
            link,
            sha256,
            size_bytes,
        },
        files: names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::extract::read_embedded_manifest;
    use crate::packager::variant::SourceVariant;
    use std::io::Read;

    #[test]
    fn writes_hashed_archive_with_embedded_manifest() {
        let tree = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tree.path().join("lib")).unwrap();
        std::fs::write(tree.path().join("main.py"), "print(1)").unwrap();
        std::fs::write(tree.path().join("lib/pump.py"), "run()").unwrap();
        let out = tempfile::tempdir().unwrap();
        let revision = Revision::new("abc123", "Jo <jo@example.com>: first", "main");

        let built = write_package(
            out.path(),
            "app_a",
            &SourceVariant,
            &revision,
            tree.path(),
            &["lib/pump.py".to_string(), "main.py".to_string()],
        )
        .unwrap();

        assert_eq!(built.entry.link, "src/abc123.tar");
        assert_eq!(built.path, out.path().join("src/abc123.tar"));
        let bytes = std::fs::read(&built.path).unwrap();
        assert_eq!(built.entry.size_bytes, bytes.len() as u64);
        assert_eq!(built.entry.sha256, Sha256Digest::compute(&bytes));

        let manifest = read_embedded_manifest(&built.path).unwrap();
        assert_eq!(manifest.files, vec!["lib/pump.py", "main.py"]);
        assert_eq!(manifest.commit_sha, "abc123");

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str(), Some("lib/pump.py"));
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "run()");
    }

    #[test]
    fn rebuilding_is_byte_identical() {
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("main.py"), "print(1)").unwrap();
        let out = tempfile::tempdir().unwrap();
        let revision = Revision::new("abc123", "first", "main");
        let files = ["main.py".to_string()];

        let first = write_package(out.path(), "a", &SourceVariant, &revision, tree.path(), &files)
            .unwrap();
        let second = write_package(out.path(), "a", &SourceVariant, &revision, tree.path(), &files)
            .unwrap();
        assert_eq!(first.entry, second.entry);
    }

    #[test]
    fn failed_transform_leaves_no_archive() {
        let tree = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let revision = Revision::new("abc123", "first", "main");

        let err = write_package(
            out.path(),
            "a",
            &SourceVariant,
            &revision,
            tree.path(),
            &["missing.py".to_string()],
        )
        .unwrap_err();

        assert!(matches!(err, BuildError::Compile { .. }));
        assert!(!out.path().join("src/abc123.tar").exists());
        let leftovers = std::fs::read_dir(out.path().join("src")).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
