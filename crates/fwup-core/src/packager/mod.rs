//! Build-side packager.
//!
//! For every tracked revision, every discovered app and every configured
//! variant, a content-addressed archive is written under
//! `<output>/<app>/<variant>/<revision>.tar`. Once all variants of an app at a
//! revision exist, each branch pointing at that revision gets its
//! `<output>/<app>/latest/<branch>` pointer replaced. Index pages are
//! rendered last from what is actually on disk.
//!
//! Builds of distinct `(app, revision, variant)` tuples share no mutable
//! state and run concurrently, bounded by [`PackagerOptions::jobs`].

pub mod app;
pub mod archive;
pub mod compiler;
pub mod index;
pub mod publish;
pub mod variant;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use fwup_schema::{BranchName, Revision, RevisionId, TarEntry, VariantName};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::Reporter;
use crate::revision::{RevisionError, RevisionSource, Snapshot, group_by_revision};
use app::{AppError, AppSpec};
use archive::{BuiltPackage, write_package};
use compiler::CompileError;
use publish::{PublishError, publish_latest};
use variant::Variant;

/// Errors raised while building packages.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Listing or snapshotting revisions failed.
    #[error(transparent)]
    Revision(#[from] RevisionError),

    /// Collecting an app's files failed.
    #[error(transparent)]
    App(#[from] AppError),

    /// A file of one variant could not be transformed.
    #[error("failed to build {variant} of {app}: {source}")]
    Compile {
        /// App being built.
        app: String,
        /// Variant being built.
        variant: VariantName,
        /// Underlying error.
        source: CompileError,
    },

    /// Writing a latest pointer failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A build task panicked or was cancelled.
    #[error("build task failed: {0}")]
    Join(String),
}

/// How a [`Packager`] run behaves.
#[derive(Debug, Clone)]
pub struct PackagerOptions {
    /// Root of the static host tree (`web_downloads`).
    pub output: PathBuf,
    /// Concurrent package builds.
    pub jobs: usize,
    /// Remove `output` before building.
    pub clean: bool,
}

impl PackagerOptions {
    /// Write into `output`, one job per CPU, keeping existing output.
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            jobs: num_cpus::get(),
            clean: false,
        }
    }
}

/// What one run produced.
#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Every archive written.
    pub packages: Vec<BuiltPackage>,
    /// `(app, branch, revision)` for every pointer replaced.
    pub published: Vec<(String, BranchName, RevisionId)>,
    /// Human-readable failure descriptions, one per failed package or step.
    pub failures: Vec<String>,
}

impl BuildSummary {
    /// Whether nothing failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

type VariantOutcome = (VariantName, Result<Option<BuiltPackage>, BuildError>);
type TaskResult = (usize, usize, VariantName, Result<Option<BuiltPackage>, BuildError>);

/// Builds every app at every tracked revision in every variant.
pub struct Packager {
    apps: Vec<AppSpec>,
    source: Arc<dyn RevisionSource>,
    variants: Vec<Arc<dyn Variant>>,
    options: PackagerOptions,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Packager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packager")
            .field("apps", &self.apps)
            .field(
                "variants",
                &self.variants.iter().map(|v| v.name()).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Packager {
    /// A packager reporting nothing.
    pub fn new(
        apps: Vec<AppSpec>,
        source: Arc<dyn RevisionSource>,
        variants: Vec<Arc<dyn Variant>>,
        options: PackagerOptions,
    ) -> Self {
        Self {
            apps,
            source,
            variants,
            options,
            reporter: Arc::new(crate::NullReporter),
        }
    }

    /// Report progress to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Build, publish and index.
    ///
    /// Per-package failures land in [`BuildSummary::failures`]; the error
    /// path is for failures that stop the whole run.
    pub async fn run(&self) -> Result<BuildSummary, BuildError> {
        let output = &self.options.output;
        if self.options.clean && output.exists() {
            tracing::debug!(path = %output.display(), "cleaning output");
            std::fs::remove_dir_all(output)?;
        }
        std::fs::create_dir_all(output)?;

        let source = Arc::clone(&self.source);
        let revisions = tokio::task::spawn_blocking(move || source.revisions())
            .await
            .map_err(|e| BuildError::Join(e.to_string()))??;
        let groups = group_by_revision(revisions);
        tracing::debug!(revisions = groups.len(), apps = self.apps.len(), "planning build");

        let mut summary = BuildSummary::default();
        let snapshots = self.snapshots(&groups, &mut summary).await?;

        self.reporter.section("Building");
        let mut results = self.build_all(&groups, &snapshots, &mut summary).await;

        self.reporter.section("Publishing");
        for (app_idx, app) in self.apps.iter().enumerate() {
            for (group_idx, (revision, branches)) in groups.iter().enumerate() {
                if snapshots[group_idx].is_none() {
                    continue;
                }
                let outcomes = results.remove(&(app_idx, group_idx)).unwrap_or_default();
                self.finish_revision(app, revision, branches, outcomes, &mut summary);
            }
        }

        self.reporter.section("Indexing");
        let listings = index::scan(output, self.apps.iter().map(|a| a.name.as_str()))?;
        index::write_indexes(output, &listings)?;

        Ok(summary)
    }

    /// One snapshot per distinct revision. A revision that cannot be
    /// materialized is reported and skipped.
    async fn snapshots(
        &self,
        groups: &[(Revision, Vec<BranchName>)],
        summary: &mut BuildSummary,
    ) -> Result<Vec<Option<Arc<Snapshot>>>, BuildError> {
        let mut snapshots = Vec::with_capacity(groups.len());
        for (revision, _) in groups {
            let source = Arc::clone(&self.source);
            let rev = revision.clone();
            let snapshot = tokio::task::spawn_blocking(move || source.snapshot(&rev))
                .await
                .map_err(|e| BuildError::Join(e.to_string()))?;
            match snapshot {
                Ok(s) => snapshots.push(Some(Arc::new(s))),
                Err(e) => {
                    let msg = format!("cannot check out {}: {e}", revision.id);
                    self.reporter.error(&msg);
                    summary.failures.push(msg);
                    snapshots.push(None);
                }
            }
        }
        Ok(snapshots)
    }

    async fn build_all(
        &self,
        groups: &[(Revision, Vec<BranchName>)],
        snapshots: &[Option<Arc<Snapshot>>],
        summary: &mut BuildSummary,
    ) -> BTreeMap<(usize, usize), Vec<VariantOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.options.jobs.max(1)));
        let mut set: JoinSet<TaskResult> = JoinSet::new();

        for (app_idx, app) in self.apps.iter().enumerate() {
            for (group_idx, (revision, _)) in groups.iter().enumerate() {
                let Some(snapshot) = &snapshots[group_idx] else {
                    continue;
                };
                for variant in &self.variants {
                    let app = app.clone();
                    let revision = revision.clone();
                    let variant = Arc::clone(variant);
                    let snapshot = Arc::clone(snapshot);
                    let semaphore = Arc::clone(&semaphore);
                    let app_out = self.options.output.join(&app.name);

                    set.spawn(async move {
                        let name = variant.name();
                        let result = match semaphore.acquire_owned().await {
                            Ok(_permit) => tokio::task::spawn_blocking(move || {
                                build_one(&app, variant.as_ref(), &revision, &snapshot, &app_out)
                            })
                            .await
                            .unwrap_or_else(|e| Err(BuildError::Join(e.to_string()))),
                            Err(e) => Err(BuildError::Join(e.to_string())),
                        };
                        (app_idx, group_idx, name, result)
                    });
                }
            }
        }

        let mut results: BTreeMap<_, Vec<_>> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((app_idx, group_idx, variant, result)) => {
                    if let Ok(Some(built)) = &result {
                        self.reporter.built(
                            &built.app,
                            &built.variant,
                            &built.revision.id,
                            built.entry.size_bytes,
                        );
                    }
                    results
                        .entry((app_idx, group_idx))
                        .or_default()
                        .push((variant, result));
                }
                Err(e) => {
                    let msg = format!("Internal error: {e}");
                    self.reporter.error(&msg);
                    summary.failures.push(msg);
                }
            }
        }
        results
    }

    /// Record the outcome of every variant of `app` at `revision` and publish
    /// it to its branches if all of them succeeded.
    fn finish_revision(
        &self,
        app: &AppSpec,
        revision: &Revision,
        branches: &[BranchName],
        outcomes: Vec<VariantOutcome>,
        summary: &mut BuildSummary,
    ) {
        let mut dict_tars: BTreeMap<VariantName, TarEntry> = BTreeMap::new();
        let mut failed = false;
        let mut absent = false;
        for (variant, outcome) in outcomes {
            match outcome {
                Ok(Some(built)) => {
                    dict_tars.insert(variant, built.entry.clone());
                    summary.packages.push(built);
                }
                Ok(None) => absent = true,
                Err(e) => {
                    failed = true;
                    let msg = format!("{} {variant} @ {}: {e}", app.name, revision.id);
                    self.reporter.error(&msg);
                    summary.failures.push(msg);
                }
            }
        }

        if absent && dict_tars.is_empty() && !failed {
            tracing::debug!(app = %app.name, revision = %revision.id, "app not present in revision");
            return;
        }
        if failed || dict_tars.len() != self.variants.len() {
            self.reporter.failed(
                &app.name,
                &format!("latest pointer for {} left unchanged", revision.id),
            );
            return;
        }

        let app_out = self.options.output.join(&app.name);
        for branch in branches {
            match publish_latest(&app_out, branch, revision, dict_tars.clone()) {
                Ok(_) => {
                    self.reporter.published(&app.name, branch, &revision.id);
                    summary
                        .published
                        .push((app.name.clone(), branch.clone(), revision.id.clone()));
                }
                Err(e) => {
                    let msg = format!("{} latest/{branch}: {e}", app.name);
                    self.reporter.error(&msg);
                    summary.failures.push(msg);
                }
            }
        }
    }
}

/// Collect and package one `(app, revision, variant)`. `None` when the app
/// does not exist in that revision.
fn build_one(
    app: &AppSpec,
    variant: &dyn Variant,
    revision: &Revision,
    snapshot: &Snapshot,
    app_out: &std::path::Path,
) -> Result<Option<BuiltPackage>, BuildError> {
    let Some(files) = app.collect_files(snapshot.root())? else {
        return Ok(None);
    };
    let app_root = snapshot.root().join(&app.directory);
    write_package(app_out, &app.name, variant, revision, &app_root, &files).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use crate::revision::StaticSource;
    use super::compiler::Compiler;
    use fwup_schema::PublishedManifest;
    use std::path::Path;
    use super::variant::{PRECOMPILED_VARIANT, PrecompiledVariant, SourceVariant};

    struct Failing;

    impl Compiler for Failing {
        fn compile(&self, source: &Path) -> Result<Vec<u8>, CompileError> {
            Err(CompileError::Failed {
                file: source.to_path_buf(),
                status: "exit status: 1".into(),
                stderr: "SyntaxError: invalid syntax".into(),
            })
        }
    }

    struct Copying;

    impl Compiler for Copying {
        fn compile(&self, source: &Path) -> Result<Vec<u8>, CompileError> {
            Ok(std::fs::read(source)?)
        }
    }

    fn tree(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let path = dir.path().join("app_a").join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    fn packager(source: StaticSource, compiler: Arc<dyn Compiler>, out: &Path) -> Packager {
        Packager::new(
            vec![AppSpec::new("app_a", "app_a")],
            Arc::new(source),
            vec![
                Arc::new(SourceVariant),
                Arc::new(PrecompiledVariant::new(PRECOMPILED_VARIANT, compiler)),
            ],
            PackagerOptions {
                output: out.to_path_buf(),
                jobs: 2,
                clean: false,
            },
        )
        .with_reporter(Arc::new(NullReporter))
    }

    #[tokio::test]
    async fn builds_every_variant_and_publishes_each_branch() {
        let input = tree(&[("main.py", "print(1)"), ("lib/pump.py", "run()")]);
        let out = tempfile::tempdir().unwrap();
        let source = StaticSource::new()
            .with(Revision::new("abc123", "first", "main"), input.path())
            .with(Revision::new("abc123", "first", "release"), input.path());

        let summary = packager(source, Arc::new(Copying), out.path())
            .run()
            .await
            .unwrap();

        assert!(summary.is_success(), "{:?}", summary.failures);
        assert_eq!(summary.packages.len(), 2);
        assert_eq!(summary.published.len(), 2);
        let app_out = out.path().join("app_a");
        assert!(app_out.join("src/abc123.tar").is_file());
        assert!(app_out.join("mpy_version/6.1/abc123.tar").is_file());

        let latest = std::fs::read(app_out.join("latest/release")).unwrap();
        let manifest = PublishedManifest::from_json(&latest).unwrap();
        assert_eq!(manifest.commit_sha, "abc123");
        assert_eq!(manifest.dict_tars.len(), 2);
        assert!(out.path().join("index.html").is_file());
        assert!(app_out.join("index.html").is_file());
    }

    #[tokio::test]
    async fn compile_failure_keeps_previous_pointer() {
        let out = tempfile::tempdir().unwrap();
        let v1 = tree(&[("main.py", "print(1)")]);
        let first = StaticSource::new().with(Revision::new("aaa111", "one", "main"), v1.path());
        packager(first, Arc::new(Copying), out.path())
            .run()
            .await
            .unwrap();

        let v2 = tree(&[("main.py", "print(")]);
        let second = StaticSource::new().with(Revision::new("bbb222", "two", "main"), v2.path());
        let summary = packager(second, Arc::new(Failing), out.path())
            .run()
            .await
            .unwrap();

        assert!(!summary.is_success());
        assert!(summary.failures.iter().any(|f| f.contains("SyntaxError")));
        assert!(summary.published.is_empty());
        let latest = std::fs::read(out.path().join("app_a/latest/main")).unwrap();
        let manifest = PublishedManifest::from_json(&latest).unwrap();
        assert_eq!(manifest.commit_sha, "aaa111");
    }

    #[tokio::test]
    async fn app_missing_from_revision_is_skipped() {
        let input = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("README.md"), "nothing here").unwrap();
        let out = tempfile::tempdir().unwrap();
        let source = StaticSource::new().with(Revision::new("abc123", "first", "main"), input.path());

        let summary = packager(source, Arc::new(Copying), out.path())
            .run()
            .await
            .unwrap();

        assert!(summary.is_success());
        assert!(summary.packages.is_empty());
        assert!(!out.path().join("app_a/latest/main").exists());
    }

    #[tokio::test]
    async fn clean_removes_stale_output() {
        let input = tree(&[("main.py", "print(1)")]);
        let out = tempfile::tempdir().unwrap();
        std::fs::write(out.path().join("stale.txt"), "old").unwrap();
        let source = StaticSource::new().with(Revision::new("abc123", "first", "main"), input.path());

        let mut build = packager(source, Arc::new(Copying), out.path());
        build.options.clean = true;
        build.run().await.unwrap();

        assert!(!out.path().join("stale.txt").exists());
        assert!(out.path().join("app_a/latest/main").is_file());
    }
}
