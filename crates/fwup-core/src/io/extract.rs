//! Archive extraction module
//!
//! Unpacks verified package archives into the device's application tree.
//!
//! Two install modes are supported:
//!
//! - [`InstallMode::Staged`]: the live tree is copied into a sibling staging
//!   directory, the archive is extracted and obsolete files are pruned there,
//!   and the staging tree is swapped in with two renames. Any failure before
//!   the swap leaves the live tree untouched; an interrupted swap is repaired
//!   by [`recover`].
//! - [`InstallMode::InPlace`]: entries are written straight over the live
//!   tree. A failure part way through leaves a mix of old and new files.
//!   Meant for targets without room for a second copy.

use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use fs_extra::dir::CopyOptions;
use fwup_schema::{EMBEDDED_MANIFEST_NAME, ManifestError, PRESERVED_PREFIX, PackageManifest};
use serde::{Deserialize, Serialize};
use tar::EntryType;
use thiserror::Error;
use walkdir::WalkDir;

const STAGING_SUFFIX: &str = "staging";
const PREVIOUS_SUFFIX: &str = "previous";

/// Errors raised while installing a package.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// An entry path is absolute or contains `..`.
    #[error("Invalid path in archive: {0}")]
    UnsafePath(String),

    /// An entry is neither a regular file nor a directory.
    #[error("Unsupported entry type {kind} for {path}")]
    UnsupportedEntry {
        /// Entry path.
        path: String,
        /// Entry type.
        kind: String,
    },

    /// A file sits where the archive needs a directory.
    #[error("{0} exists and is not a directory")]
    NotADirectory(PathBuf),

    /// The archive lacks the embedded manifest.
    #[error("archive has no {}", EMBEDDED_MANIFEST_NAME)]
    MissingManifest,

    /// The embedded manifest does not parse.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The live tree could not be copied into staging.
    #[error("failed to copy the live tree into staging: {0}")]
    Copy(#[from] fs_extra::error::Error),

    /// The root has no parent or file name to derive siblings from.
    #[error("install root {0} has no usable directory name")]
    InvalidRoot(PathBuf),
}

/// How a package is written into the application tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// Extract into a copy of the root, then swap it in by rename.
    #[default]
    Staged,
    /// Extract straight into the root; a failure can leave a mixed tree.
    InPlace,
}

impl std::fmt::Display for InstallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Staged => f.write_str("staged"),
            Self::InPlace => f.write_str("in_place"),
        }
    }
}

/// Directories known to exist under one extraction root.
///
/// Seeded once from the filesystem, then updated as directories are created,
/// so files sharing a directory cost one lookup instead of a storage round
/// trip each. Owned by a single extraction pass.
#[derive(Debug)]
pub struct DirCache {
    root: PathBuf,
    known: HashSet<PathBuf>,
}

impl DirCache {
    /// Scan every directory currently under `root` (which must exist).
    pub fn seed(root: &Path) -> io::Result<Self> {
        let mut known = HashSet::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_dir() {
                known.insert(entry.into_path());
            }
        }
        Ok(Self {
            root: root.to_path_buf(),
            known,
        })
    }

    /// Extraction root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `dir` is known to exist.
    pub fn contains(&self, dir: &Path) -> bool {
        self.known.contains(dir)
    }

    /// Number of known directories.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Whether no directory is known.
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Make sure `dir` exists, creating missing ancestors top-down.
    ///
    /// Walks upward only until the first directory already in the cache.
    /// Returns how many directories were created.
    pub fn ensure_dir(&mut self, dir: &Path) -> Result<usize, ExtractError> {
        let mut missing = Vec::new();
        let mut current = dir;
        while !self.known.contains(current) {
            missing.push(current.to_path_buf());
            match current.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => current = parent,
                _ => break,
            }
        }

        let mut created = 0;
        for path in missing.into_iter().rev() {
            match fs::create_dir(&path) {
                Ok(()) => created += 1,
                // pre-existing directory that the seed did not see
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !path.is_dir() {
                        return Err(ExtractError::NotADirectory(path));
                    }
                }
                Err(e) => return Err(e.into()),
            }
            self.known.insert(path);
        }
        Ok(created)
    }

    /// Make sure the directory containing `file` exists.
    pub fn ensure_parent(&mut self, file: &Path) -> Result<usize, ExtractError> {
        match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.ensure_dir(parent),
            _ => Ok(0),
        }
    }
}

/// What one extraction pass wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Files written, relative to the root with `/` separators, in archive order.
    pub files: Vec<String>,
    /// Directories created, including ones backfilled for file entries.
    pub dirs_created: usize,
    /// Archive entries processed.
    pub entries: u64,
}

/// Reduce an archive path to a relative path below the root.
///
/// Rejects `..`, absolute paths and prefixes.
fn sanitize(path: &Path) -> Result<PathBuf, ExtractError> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath(path.display().to_string()));
            }
        }
    }
    Ok(clean)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Extract `archive` into `dest`.
///
/// Directory entries are created if absent; file entries overwrite whatever
/// is at their path. `on_entry` is called with the running entry count.
pub fn extract_archive(
    archive: &Path,
    dest: &Path,
    on_entry: &mut dyn FnMut(u64),
) -> Result<ExtractReport, ExtractError> {
    fs::create_dir_all(dest)?;
    let mut cache = DirCache::seed(dest)?;
    let mut report = ExtractReport::default();

    let mut tar = tar::Archive::new(File::open(archive)?);
    for entry in tar.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path()?.into_owned();
        let relative = sanitize(&raw_path)?;
        let entry_type = entry.header().entry_type();

        match entry_type {
            EntryType::Directory => {
                if !relative.as_os_str().is_empty() {
                    report.dirs_created += cache.ensure_dir(&dest.join(&relative))?;
                }
            }
            EntryType::Regular | EntryType::Continuous => {
                if relative.as_os_str().is_empty() {
                    return Err(ExtractError::UnsafePath(raw_path.display().to_string()));
                }
                let target = dest.join(&relative);
                report.dirs_created += cache.ensure_parent(&target)?;
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                report.files.push(to_slash(&relative));
            }
            EntryType::XGlobalHeader
            | EntryType::XHeader
            | EntryType::GNULongName
            | EntryType::GNULongLink => {}
            other => {
                return Err(ExtractError::UnsupportedEntry {
                    path: raw_path.display().to_string(),
                    kind: format!("{other:?}"),
                });
            }
        }

        report.entries += 1;
        on_entry(report.entries);
    }

    tracing::debug!(
        dest = %dest.display(),
        files = report.files.len(),
        dirs_created = report.dirs_created,
        "archive extracted"
    );
    Ok(report)
}

/// Read the manifest embedded in a package archive without extracting it.
pub fn read_embedded_manifest(archive: &Path) -> Result<PackageManifest, ExtractError> {
    let mut tar = tar::Archive::new(File::open(archive)?);
    for entry in tar.entries()? {
        let mut entry = entry?;
        let relative = sanitize(&entry.path()?)?;
        if to_slash(&relative) == EMBEDDED_MANIFEST_NAME {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            return Ok(PackageManifest::from_json(&bytes)?);
        }
    }
    Err(ExtractError::MissingManifest)
}

/// Remove files listed in `previous` that `current` no longer contains.
///
/// Names starting with `config_` are device-local and always kept. Parent
/// directories left empty are removed up to (not including) `root`.
/// Returns the removed paths.
pub fn prune_obsolete(
    root: &Path,
    previous: &[String],
    current: &[String],
) -> Result<Vec<String>, ExtractError> {
    let keep: HashSet<&str> = current.iter().map(String::as_str).collect();
    let mut removed = Vec::new();

    for file in previous {
        if keep.contains(file.as_str()) {
            continue;
        }
        let relative = sanitize(Path::new(file))?;
        let preserved = relative
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(PRESERVED_PREFIX));
        if preserved || relative.as_os_str().is_empty() {
            continue;
        }

        let target = root.join(&relative);
        match fs::remove_file(&target) {
            Ok(()) => removed.push(file.clone()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }

        let mut dir = target.parent();
        while let Some(d) = dir {
            if d == root || !d.starts_with(root) || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    if !removed.is_empty() {
        tracing::debug!(count = removed.len(), "pruned obsolete files");
    }
    Ok(removed)
}

/// Result of [`install_archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Mode used.
    pub mode: InstallMode,
    /// What extraction wrote.
    pub extract: ExtractReport,
    /// Files of the previous package that were removed.
    pub pruned: Vec<String>,
}

fn sibling(root: &Path, suffix: &str) -> Result<PathBuf, ExtractError> {
    let name = root
        .file_name()
        .ok_or_else(|| ExtractError::InvalidRoot(root.to_path_buf()))?;
    let mut sibling = name.to_os_string();
    sibling.push(".");
    sibling.push(suffix);
    Ok(root.with_file_name(sibling))
}

/// Directory a staged install is extracted into before the swap.
pub fn staging_dir(root: &Path) -> Result<PathBuf, ExtractError> {
    sibling(root, STAGING_SUFFIX)
}

/// Where the replaced tree is parked during the swap.
pub fn previous_dir(root: &Path) -> Result<PathBuf, ExtractError> {
    sibling(root, PREVIOUS_SUFFIX)
}

/// Install a verified archive into `root`.
///
/// `previous_files` is the file list of the package currently installed; it
/// drives obsolete-file pruning.
pub fn install_archive(
    archive: &Path,
    root: &Path,
    mode: InstallMode,
    previous_files: &[String],
    on_entry: &mut dyn FnMut(u64),
) -> Result<InstallReport, ExtractError> {
    match mode {
        InstallMode::InPlace => {
            let extract = extract_archive(archive, root, on_entry)?;
            let pruned = prune_obsolete(root, previous_files, &extract.files)?;
            Ok(InstallReport {
                mode,
                extract,
                pruned,
            })
        }
        InstallMode::Staged => install_staged(archive, root, previous_files, on_entry),
    }
}

fn install_staged(
    archive: &Path,
    root: &Path,
    previous_files: &[String],
    on_entry: &mut dyn FnMut(u64),
) -> Result<InstallReport, ExtractError> {
    let staging = staging_dir(root)?;
    let previous = previous_dir(root)?;

    if staging.exists() {
        tracing::warn!(path = %staging.display(), "removing stale staging tree");
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let staged = stage(archive, root, &staging, previous_files, on_entry);
    let (extract, pruned) = match staged {
        Ok(done) => done,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                tracing::warn!(path = %staging.display(), "failed to remove staging tree: {cleanup}");
            }
            return Err(e);
        }
    };

    swap_in(root, &staging, &previous)?;
    Ok(InstallReport {
        mode: InstallMode::Staged,
        extract,
        pruned,
    })
}

fn stage(
    archive: &Path,
    root: &Path,
    staging: &Path,
    previous_files: &[String],
    on_entry: &mut dyn FnMut(u64),
) -> Result<(ExtractReport, Vec<String>), ExtractError> {
    if root.is_dir() {
        let options = CopyOptions::new().content_only(true).overwrite(true);
        fs_extra::dir::copy(root, staging, &options)?;
    }
    let extract = extract_archive(archive, staging, on_entry)?;
    let pruned = prune_obsolete(staging, previous_files, &extract.files)?;
    Ok((extract, pruned))
}

/// `root -> root.previous`, `root.staging -> root`, then drop the old tree.
fn swap_in(root: &Path, staging: &Path, previous: &Path) -> Result<(), ExtractError> {
    if previous.exists() {
        fs::remove_dir_all(previous)?;
    }

    let had_root = root.exists();
    if had_root {
        fs::rename(root, previous)?;
    }
    if let Err(e) = fs::rename(staging, root) {
        if had_root {
            fs::rename(previous, root)?;
        }
        return Err(e.into());
    }

    if had_root {
        if let Err(e) = fs::remove_dir_all(previous) {
            tracing::warn!(path = %previous.display(), "failed to remove replaced tree: {e}");
        }
    }
    Ok(())
}

/// What [`recover`] had to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Recovery {
    /// The live tree was missing and the parked previous tree was restored.
    pub restored_previous: bool,
    /// A swap had completed; the leftover previous tree was removed.
    pub removed_previous: bool,
    /// An unfinished staging tree was removed.
    pub removed_staging: bool,
}

impl Recovery {
    /// Whether there was nothing to recover.
    pub fn is_clean(&self) -> bool {
        !(self.restored_previous || self.removed_previous || self.removed_staging)
    }
}

/// Repair the tree after a staged install was interrupted.
///
/// If the swap stopped between its two renames the previous tree is put
/// back; otherwise leftovers are removed. Safe to run at any time.
pub fn recover(root: &Path) -> Result<Recovery, ExtractError> {
    let staging = staging_dir(root)?;
    let previous = previous_dir(root)?;
    let mut recovery = Recovery::default();

    if previous.exists() {
        if root.exists() {
            fs::remove_dir_all(&previous)?;
            recovery.removed_previous = true;
        } else {
            fs::rename(&previous, root)?;
            recovery.restored_previous = true;
            tracing::warn!(root = %root.display(), "restored previous tree after interrupted install");
        }
    }
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
        recovery.removed_staging = true;
    }
    Ok(recovery)
}

/// Every regular file under `root`, relative with `/` separators, sorted.
pub fn list_files(root: &Path) -> io::Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();
    if !root.exists() {
        return Ok(files);
    }
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.insert(to_slash(relative));
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    enum Item<'a> {
        Dir(&'a str),
        File(&'a str, &'a [u8]),
        Symlink(&'a str, &'a str),
        RawFile(&'a [u8], &'a [u8]),
    }

    fn build(items: &[Item<'_>]) -> NamedTempFile {
        let mut builder = tar::Builder::new(Vec::new());
        for item in items {
            let mut header = tar::Header::new_gnu();
            match item {
                Item::Dir(path) => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_mode(0o755);
                    header.set_size(0);
                    builder.append_data(&mut header, path, io::empty()).unwrap();
                }
                Item::File(path, data) => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_mode(0o644);
                    header.set_size(data.len() as u64);
                    builder.append_data(&mut header, path, *data).unwrap();
                }
                Item::Symlink(path, target) => {
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    builder
                        .append_link(&mut header, path, target)
                        .unwrap();
                }
                Item::RawFile(name, data) => {
                    // bypasses the builder's own path validation
                    header.set_entry_type(EntryType::Regular);
                    header.set_mode(0o644);
                    header.set_size(data.len() as u64);
                    header.as_old_mut().name[..name.len()].copy_from_slice(name);
                    header.set_cksum();
                    builder.append(&header, *data).unwrap();
                }
            }
        }
        let bytes = builder.into_inner().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file
    }

    fn extract(archive: &NamedTempFile, dest: &Path) -> Result<ExtractReport, ExtractError> {
        extract_archive(archive.path(), dest, &mut |_| {})
    }

    #[test]
    fn backfills_missing_directories() {
        let archive = build(&[Item::File("lib/drivers/pump/ctl.py", b"run()")]);
        let dest = TempDir::new().unwrap();

        let report = extract(&archive, dest.path()).unwrap();

        assert_eq!(
            fs::read(dest.path().join("lib/drivers/pump/ctl.py")).unwrap(),
            b"run()"
        );
        assert_eq!(report.files, vec!["lib/drivers/pump/ctl.py"]);
        assert_eq!(report.dirs_created, 3);
    }

    #[test]
    fn directory_entries_after_files_are_fine() {
        let archive = build(&[
            Item::File("lib/a.py", b"a"),
            Item::Dir("lib"),
            Item::Dir("lib/empty"),
        ]);
        let dest = TempDir::new().unwrap();

        let report = extract(&archive, dest.path()).unwrap();

        assert!(dest.path().join("lib/empty").is_dir());
        assert_eq!(report.entries, 3);
        // lib was created once for the file, lib/empty for its own entry
        assert_eq!(report.dirs_created, 2);
    }

    #[test]
    fn existing_directories_and_files_are_overwritten() {
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(dest.path().join("lib")).unwrap();
        fs::write(dest.path().join("lib/a.py"), b"old contents, longer").unwrap();

        let archive = build(&[Item::Dir("lib"), Item::File("lib/a.py", b"new")]);
        let report = extract(&archive, dest.path()).unwrap();

        assert_eq!(fs::read(dest.path().join("lib/a.py")).unwrap(), b"new");
        assert_eq!(report.dirs_created, 0);
    }

    #[test]
    fn directory_created_behind_the_cache_is_not_an_error() {
        let dest = TempDir::new().unwrap();
        let mut cache = DirCache::seed(dest.path()).unwrap();
        fs::create_dir(dest.path().join("late")).unwrap();

        let created = cache.ensure_dir(&dest.path().join("late/inner")).unwrap();
        assert_eq!(created, 1);
        assert!(cache.contains(&dest.path().join("late")));
    }

    #[test]
    fn file_in_place_of_directory_is_reported() {
        let dest = TempDir::new().unwrap();
        let mut cache = DirCache::seed(dest.path()).unwrap();
        fs::write(dest.path().join("lib"), b"not a dir").unwrap();

        assert!(matches!(
            cache.ensure_parent(&dest.path().join("lib/a.py")),
            Err(ExtractError::NotADirectory(_))
        ));
    }

    #[test]
    fn rejects_path_traversal() {
        let archive = build(&[Item::RawFile(b"../escape.py", b"x")]);
        let parent = TempDir::new().unwrap();
        let dest = parent.path().join("root");

        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(err, ExtractError::UnsafePath(_)));
        assert!(!parent.path().join("escape.py").exists());
    }

    #[test]
    fn rejects_unsupported_entry_types() {
        let archive = build(&[Item::Symlink("boot.py", "main.py")]);
        let dest = TempDir::new().unwrap();

        assert!(matches!(
            extract(&archive, dest.path()),
            Err(ExtractError::UnsupportedEntry { .. })
        ));
    }

    #[test]
    fn reads_embedded_manifest() {
        let manifest = br#"{"files": ["main.py"], "branch": "main", "commit_sha": "abc123", "commit_pretty": "x"}"#;
        let archive = build(&[
            Item::File("main.py", b"print(1)"),
            Item::File(EMBEDDED_MANIFEST_NAME, manifest),
        ]);
        let manifest = read_embedded_manifest(archive.path()).unwrap();
        assert_eq!(manifest.commit_sha, "abc123");

        let bare = build(&[Item::File("main.py", b"print(1)")]);
        assert!(matches!(
            read_embedded_manifest(bare.path()),
            Err(ExtractError::MissingManifest)
        ));
    }

    #[test]
    fn prune_keeps_config_files_and_removes_empty_dirs() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("old/deep")).unwrap();
        fs::write(root.path().join("old/deep/gone.py"), b"").unwrap();
        fs::write(root.path().join("config_wifi.json"), b"{}").unwrap();
        fs::write(root.path().join("main.py"), b"").unwrap();

        let previous = vec![
            "old/deep/gone.py".to_string(),
            "config_wifi.json".to_string(),
            "main.py".to_string(),
        ];
        let current = vec!["main.py".to_string()];
        let removed = prune_obsolete(root.path(), &previous, &current).unwrap();

        assert_eq!(removed, vec!["old/deep/gone.py"]);
        assert!(!root.path().join("old").exists());
        assert!(root.path().join("config_wifi.json").exists());
        assert!(root.path().join("main.py").exists());
    }

    #[test]
    fn staged_install_swaps_tree_and_keeps_local_files() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("app");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("main.py"), b"print(0)").unwrap();
        fs::write(root.join("old.py"), b"").unwrap();
        fs::write(root.join("config_local.json"), b"{}").unwrap();

        let archive = build(&[Item::File("main.py", b"print(1)")]);
        let previous = vec!["main.py".to_string(), "old.py".to_string()];
        let report =
            install_archive(archive.path(), &root, InstallMode::Staged, &previous, &mut |_| {})
                .unwrap();

        assert_eq!(report.pruned, vec!["old.py"]);
        assert_eq!(fs::read(root.join("main.py")).unwrap(), b"print(1)");
        assert!(root.join("config_local.json").exists());
        assert!(!staging_dir(&root).unwrap().exists());
        assert!(!previous_dir(&root).unwrap().exists());
    }

    #[test]
    fn failed_staged_install_leaves_live_tree_untouched() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("app");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("main.py"), b"print(0)").unwrap();

        let archive = build(&[
            Item::File("main.py", b"print(1)"),
            Item::Symlink("boot.py", "main.py"),
        ]);
        let err = install_archive(archive.path(), &root, InstallMode::Staged, &[], &mut |_| {})
            .unwrap_err();

        assert!(matches!(err, ExtractError::UnsupportedEntry { .. }));
        assert_eq!(fs::read(root.join("main.py")).unwrap(), b"print(0)");
        assert!(!staging_dir(&root).unwrap().exists());
    }

    #[test]
    fn in_place_install_writes_over_live_tree() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("app");

        let archive = build(&[Item::File("main.py", b"print(1)")]);
        let report =
            install_archive(archive.path(), &root, InstallMode::InPlace, &[], &mut |_| {})
                .unwrap();

        assert_eq!(report.mode, InstallMode::InPlace);
        assert_eq!(fs::read(root.join("main.py")).unwrap(), b"print(1)");
    }

    #[test]
    fn recover_restores_previous_tree_after_interrupted_swap() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("app");
        let previous = previous_dir(&root).unwrap();
        let staging = staging_dir(&root).unwrap();
        fs::create_dir_all(&previous).unwrap();
        fs::write(previous.join("main.py"), b"print(0)").unwrap();
        fs::create_dir_all(&staging).unwrap();

        let recovery = recover(&root).unwrap();

        assert!(recovery.restored_previous);
        assert!(recovery.removed_staging);
        assert_eq!(fs::read(root.join("main.py")).unwrap(), b"print(0)");
        assert!(recover(&root).unwrap().is_clean());
    }

    #[test]
    fn list_files_is_relative_and_sorted() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("lib")).unwrap();
        fs::write(root.path().join("lib/b.py"), b"").unwrap();
        fs::write(root.path().join("a.py"), b"").unwrap();

        let files: Vec<_> = list_files(root.path()).unwrap().into_iter().collect();
        assert_eq!(files, vec!["a.py", "lib/b.py"]);
    }
}
