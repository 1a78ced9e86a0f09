//! Revision sources for the packager.
//!
//! A source enumerates the tracked branches with the revision each one
//! points at, and materializes a revision's file tree on demand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use fwup_schema::{BranchName, Revision, RevisionId};
use tempfile::TempDir;
use thiserror::Error;

/// Errors raised while listing or materializing revisions.
#[derive(Error, Debug)]
pub enum RevisionError {
    /// `git` is not on `PATH`.
    #[error("git executable not found: {0}")]
    GitNotFound(#[from] which::Error),

    /// A git command exited unsuccessfully.
    #[error("git {args} failed: {stderr}")]
    Git {
        /// Arguments passed to git.
        args: String,
        /// What git printed on stderr.
        stderr: String,
    },

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The repository has neither remote nor local branches.
    #[error("no branches found in {0}")]
    NoBranches(PathBuf),

    /// The source does not know this revision.
    #[error("unknown revision {0}")]
    Unknown(RevisionId),
}

/// A revision's file tree, kept alive as long as this value is.
#[derive(Debug)]
pub struct Snapshot {
    root: PathBuf,
    _temp: Option<TempDir>,
}

impl Snapshot {
    /// A tree that is not owned (and not deleted) by the snapshot.
    pub fn borrowed(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            _temp: None,
        }
    }

    /// Root of the tree.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Blocking; the packager calls it from `spawn_blocking`.
pub trait RevisionSource: Send + Sync {
    /// One entry per tracked branch.
    fn revisions(&self) -> Result<Vec<Revision>, RevisionError>;

    /// The file tree of `revision`.
    fn snapshot(&self, revision: &Revision) -> Result<Snapshot, RevisionError>;
}

/// Branches and trees from a git repository, through the `git` CLI.
///
/// Remote-tracking branches are used when there are any, local branches
/// otherwise. Trees come from `git archive`, so the checkout is never touched.
#[derive(Debug, Clone)]
pub struct GitSource {
    repo: PathBuf,
    git: PathBuf,
    no_checkout: bool,
}

impl GitSource {
    /// Use the repository at `repo`. Fails if `git` cannot be found.
    pub fn new(repo: impl Into<PathBuf>) -> Result<Self, RevisionError> {
        Ok(Self {
            repo: repo.into(),
            git: which::which("git")?,
            no_checkout: false,
        })
    }

    /// Package the working tree as it is for every branch name, labelled
    /// with HEAD's revision.
    pub fn no_checkout(mut self, enabled: bool) -> Self {
        self.no_checkout = enabled;
        self
    }

    fn run(&self, args: &[&str]) -> Result<String, RevisionError> {
        tracing::trace!(repo = %self.repo.display(), "git {}", args.join(" "));
        let output = Command::new(&self.git)
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()?;
        if !output.status.success() {
            return Err(RevisionError::Git {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `branch -> sha` under `namespace` (`refs/remotes` or `refs/heads`).
    fn refs(&self, namespace: &str) -> Result<BTreeMap<String, String>, RevisionError> {
        let listing = self.run(&[
            "for-each-ref",
            "--format=%(refname)%09%(objectname)",
            namespace,
        ])?;
        let prefix = format!("{namespace}/");
        let remote = namespace == "refs/remotes";

        let mut branches = BTreeMap::new();
        for line in listing.lines() {
            let Some((refname, sha)) = line.split_once('\t') else {
                continue;
            };
            let Some(short) = refname.strip_prefix(&prefix) else {
                continue;
            };
            let branch = if remote {
                // `<remote>/<branch>`; branch names may contain `/`
                match short.split_once('/') {
                    Some((_, branch)) => branch,
                    None => continue,
                }
            } else {
                short
            };
            if branch == "HEAD" {
                continue;
            }
            branches
                .entry(branch.to_string())
                .or_insert_with(|| sha.to_string());
        }
        Ok(branches)
    }

    fn summary(&self, sha: &str) -> Result<String, RevisionError> {
        Ok(self
            .run(&["log", "-1", "--format=%an <%ae>: %s", sha])?
            .trim()
            .to_string())
    }
}

impl RevisionSource for GitSource {
    fn revisions(&self) -> Result<Vec<Revision>, RevisionError> {
        let mut branches = self.refs("refs/remotes")?;
        if branches.is_empty() {
            tracing::debug!("no remote branches, using local branches");
            branches = self.refs("refs/heads")?;
        }
        if branches.is_empty() {
            return Err(RevisionError::NoBranches(self.repo.clone()));
        }

        let head = if self.no_checkout {
            let sha = self.run(&["rev-parse", "HEAD"])?.trim().to_string();
            let summary = self.summary(&sha)?;
            Some((sha, summary))
        } else {
            None
        };

        let mut revisions = Vec::with_capacity(branches.len());
        for (branch, sha) in branches {
            let revision = match &head {
                Some((sha, summary)) => Revision::new(sha.as_str(), summary.as_str(), branch),
                None => {
                    let summary = self.summary(&sha)?;
                    Revision::new(sha, summary, branch)
                }
            };
            tracing::debug!(branch = %revision.branch, sha = %revision.id, "tracked branch");
            revisions.push(revision);
        }
        Ok(revisions)
    }

    fn snapshot(&self, revision: &Revision) -> Result<Snapshot, RevisionError> {
        if self.no_checkout {
            return Ok(Snapshot::borrowed(&self.repo));
        }

        let temp = tempfile::Builder::new().prefix("fwup-snapshot-").tempdir()?;
        let archive = temp.path().join(".snapshot.tar");
        let archive_arg = archive.to_string_lossy();
        self.run(&[
            "archive",
            "--format=tar",
            "-o",
            archive_arg.as_ref(),
            revision.id.as_str(),
        ])?;

        let tree = temp.path().join("tree");
        std::fs::create_dir(&tree)?;
        tar::Archive::new(std::fs::File::open(&archive)?).unpack(&tree)?;
        std::fs::remove_file(&archive)?;

        Ok(Snapshot {
            root: tree,
            _temp: Some(temp),
        })
    }
}

/// Fixed revisions backed by plain directories.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    entries: Vec<(Revision, PathBuf)>,
}

impl StaticSource {
    /// An empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `revision`, whose tree is the directory `tree`.
    pub fn with(mut self, revision: Revision, tree: impl Into<PathBuf>) -> Self {
        self.entries.push((revision, tree.into()));
        self
    }
}

impl RevisionSource for StaticSource {
    fn revisions(&self) -> Result<Vec<Revision>, RevisionError> {
        Ok(self.entries.iter().map(|(r, _)| r.clone()).collect())
    }

    fn snapshot(&self, revision: &Revision) -> Result<Snapshot, RevisionError> {
        self.entries
            .iter()
            .find(|(r, _)| r.id == revision.id)
            .map(|(_, tree)| Snapshot::borrowed(tree))
            .ok_or_else(|| RevisionError::Unknown(revision.id.clone()))
    }
}

/// Tracked branches grouped by the revision they point at.
///
/// Identical revisions on several branches are built once.
pub fn group_by_revision(revisions: Vec<Revision>) -> Vec<(Revision, Vec<BranchName>)> {
    let mut groups: Vec<(Revision, Vec<BranchName>)> = Vec::new();
    for revision in revisions {
        match groups.iter_mut().find(|(r, _)| r.id == revision.id) {
            Some((_, branches)) => branches.push(revision.branch),
            None => {
                let branch = revision.branch.clone();
                groups.push((revision, vec![branch]));
            }
        }
    }
    groups
}
