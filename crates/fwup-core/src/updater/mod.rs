//! Device-side update protocol.
//!
//! One cycle of [`Updater::check_and_update`]:
//!
//! 1. require a live link,
//! 2. fetch `<base_url>/latest/<branch>` and parse it,
//! 3. stop with [`Outcome::NoUpdate`] if the installed revision matches,
//! 4. download the preferred variant, hashing while streaming,
//! 5. after verification, extract, persist [`InstalledState`], restart.
//!
//! Cycles never overlap: `check_and_update` takes `&mut self`.

pub mod backoff;
pub mod link;
pub mod poll;
pub mod restart;
pub mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fwup_schema::{
    BranchName, InstalledState, LATEST_DIR, ManifestError, PublishedManifest, RevisionId,
    TAR_SUFFIX, VariantName,
};
use thiserror::Error;

use crate::config::DeviceConfig;
use crate::io::download::{self, DownloadError, DownloadRequest};
use crate::io::extract::{self, ExtractError, InstallMode, InstallReport, Recovery};
use crate::io::fetch::{FetchError, Fetcher};
use crate::{LogReporter, Reporter, join_url};

pub use backoff::Backoff;
pub use link::{AlwaysConnected, NetworkLink, TcpLink};
pub use poll::{RunExit, run};
pub use restart::{CommandRestart, NoRestart, Restart, RestartError};
pub use state::{InstalledStateStore, StateError};

/// Published manifests are small; anything bigger is not one.
const MANIFEST_LIMIT: usize = 1024 * 1024;

/// Why an update cycle failed.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The link stayed down for the whole link timeout.
    #[error("network link unavailable")]
    NoLink,

    /// The host answered the manifest request with a non-success status.
    #[error("GET {url} returned status {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The manifest request did not complete.
    #[error("request failed: {0}")]
    Transport(#[from] FetchError),

    /// The manifest body could not be read.
    #[error("failed to read manifest body: {0}")]
    Body(std::io::Error),

    /// The manifest body is not a usable manifest.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// None of the offered variants is acceptable to this device.
    #[error("no acceptable variant for {revision}: offered [{offered}], accepted [{accepted}]")]
    NoVariant {
        /// Announced revision.
        revision: RevisionId,
        /// Variants in the manifest.
        offered: String,
        /// Variants this device accepts.
        accepted: String,
    },

    /// The package's embedded manifest names a different revision.
    #[error("package contains revision {found}, manifest announced {expected}")]
    RevisionMismatch {
        /// Revision in the published manifest.
        expected: RevisionId,
        /// Revision in the package.
        found: RevisionId,
    },

    /// The downloaded package does not match its published digest.
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Published digest.
        expected: String,
        /// Digest of the downloaded bytes.
        actual: String,
    },

    /// The package download failed.
    #[error("Download failed: {0}")]
    Download(DownloadError),

    /// The package could not be installed.
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    /// The installed state could not be saved.
    #[error(transparent)]
    State(#[from] StateError),
}

impl From<DownloadError> for UpdateError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::HashMismatch { expected, actual } => {
                Self::HashMismatch { expected, actual }
            }
            other => Self::Download(other),
        }
    }
}

/// Failure classes the poll loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No network link.
    LinkUnavailable,
    /// The manifest or package could not be obtained or was unusable.
    Fetch,
    /// Integrity check failed; nothing was extracted.
    HashMismatch,
    /// Extraction or pruning failed.
    Extraction,
    /// Persisting the installed state failed.
    State,
}

impl UpdateError {
    /// The failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoLink => ErrorKind::LinkUnavailable,
            Self::Status { .. }
            | Self::Transport(_)
            | Self::Body(_)
            | Self::Manifest(_)
            | Self::NoVariant { .. }
            | Self::RevisionMismatch { .. }
            | Self::Download(_) => ErrorKind::Fetch,
            Self::HashMismatch { .. } => ErrorKind::HashMismatch,
            Self::Extract(_) => ErrorKind::Extraction,
            Self::State(_) => ErrorKind::State,
        }
    }
}

/// Result of one update cycle.
#[derive(Debug)]
pub enum Outcome {
    /// The installed revision is the published one.
    NoUpdate,
    /// A new package was installed and the restart triggered.
    Updated {
        /// Installed revision.
        revision: RevisionId,
        /// Installed variant.
        variant: VariantName,
    },
    /// The cycle stopped early; the installed state is unchanged.
    Failed(UpdateError),
}

impl Outcome {
    /// Link and fetch failures are worth backing off for.
    pub fn is_retryable_failure(&self) -> bool {
        match self {
            Self::Failed(e) => matches!(e.kind(), ErrorKind::LinkUnavailable | ErrorKind::Fetch),
            _ => false,
        }
    }
}

/// Where the updater is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Between cycles, or checking the manifest.
    #[default]
    Idle,
    /// Streaming the package to disk.
    Downloading,
    /// Comparing the digest.
    Verifying,
    /// Writing the package into the root.
    Extracting,
    /// Install persisted, restart triggered.
    Rebooting,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Extracting => "extracting",
            Self::Rebooting => "rebooting",
        };
        f.write_str(name)
    }
}

/// What a dry-run check found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// The published revision is installed.
    UpToDate(RevisionId),
    /// A different revision is published.
    Available {
        /// Revision currently installed, if any.
        installed: Option<RevisionId>,
        /// The published manifest.
        remote: Box<PublishedManifest>,
        /// Variant that would be installed, if any is acceptable.
        variant: Option<VariantName>,
    },
}

/// The device agent.
pub struct Updater {
    base_url: String,
    variants: Vec<VariantName>,
    install_mode: InstallMode,
    root: PathBuf,
    download_dir: PathBuf,
    link_timeout: Duration,
    link: Arc<dyn NetworkLink>,
    fetcher: Arc<dyn Fetcher>,
    restart: Arc<dyn Restart>,
    reporter: Arc<dyn Reporter>,
    store: InstalledStateStore,
    installed: Option<InstalledState>,
    phase: Phase,
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("base_url", &self.base_url)
            .field("root", &self.root)
            .field("install_mode", &self.install_mode)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Updater {
    /// Build an updater from config. Reads the installed state once.
    pub fn new(config: &DeviceConfig, home: &Path, fetcher: Arc<dyn Fetcher>) -> Self {
        let store = InstalledStateStore::new(&config.state_dir(home));
        let installed = store.load_or_warn();
        Self {
            base_url: config.base_url.clone(),
            variants: config.variants.clone(),
            install_mode: config.install_mode,
            root: config.root_dir(home),
            download_dir: config.download_dir(home),
            link_timeout: config.link_timeout(),
            link: Arc::new(AlwaysConnected),
            fetcher,
            restart: Arc::new(NoRestart),
            reporter: Arc::new(LogReporter),
            store,
            installed,
            phase: Phase::Idle,
        }
    }

    /// Check the link through `link`.
    pub fn with_link(mut self, link: Arc<dyn NetworkLink>) -> Self {
        self.link = link;
        self
    }

    /// Trigger restarts through `restart`.
    pub fn with_restart(mut self, restart: Arc<dyn Restart>) -> Self {
        self.restart = restart;
        self
    }

    /// Report progress to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Where the current or last cycle got to.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The last successful install, if any.
    pub fn installed(&self) -> Option<&InstalledState> {
        self.installed.as_ref()
    }

    /// Application root packages are installed into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// How packages are written into the root.
    pub fn install_mode(&self) -> InstallMode {
        self.install_mode
    }

    /// URL of the latest pointer for `branch`.
    pub fn manifest_url(&self, branch: &BranchName) -> String {
        join_url(&join_url(&self.base_url, LATEST_DIR), branch.as_str())
    }

    /// Finish or roll back a staged swap that was interrupted.
    pub fn recover(&self) -> Result<Recovery, ExtractError> {
        let recovery = extract::recover(&self.root)?;
        if !recovery.is_clean() {
            self.reporter
                .warning(&format!("recovered install root {}", self.root.display()));
        }
        Ok(recovery)
    }

    /// Run one cycle. Never panics on remote or storage errors; they come
    /// back as [`Outcome::Failed`].
    pub async fn check_and_update(&mut self, branch: &BranchName) -> Outcome {
        self.phase = Phase::Idle;
        let outcome = match self.cycle(branch).await {
            Ok(None) => {
                tracing::debug!(%branch, "no update");
                Outcome::NoUpdate
            }
            Ok(Some((revision, variant))) => Outcome::Updated { revision, variant },
            Err(e) => {
                self.reporter.failed(branch.as_str(), &e.to_string());
                Outcome::Failed(e)
            }
        };
        if !matches!(outcome, Outcome::Updated { .. }) {
            self.phase = Phase::Idle;
        }
        outcome
    }

    /// Fetch the latest pointer and report what an update would do, without
    /// downloading anything.
    pub async fn preview(&self, branch: &BranchName) -> Result<Preview, UpdateError> {
        self.require_link().await?;
        let remote = self.fetch_manifest(branch).await?;
        if self.is_installed(&remote) {
            return Ok(Preview::UpToDate(remote.commit_sha));
        }
        let variant = remote
            .select_variant(&self.variants)
            .map(|(name, _)| name.clone());
        Ok(Preview::Available {
            installed: self.installed.as_ref().map(|s| s.revision().clone()),
            remote: Box::new(remote),
            variant,
        })
    }

    fn is_installed(&self, remote: &PublishedManifest) -> bool {
        self.installed
            .as_ref()
            .is_some_and(|installed| installed.is_current(remote))
    }

    async fn require_link(&self) -> Result<(), UpdateError> {
        if self.link.is_connected().await {
            return Ok(());
        }
        tracing::debug!(timeout = ?self.link_timeout, "link down, waiting");
        if self.link.ensure_connected(self.link_timeout).await {
            Ok(())
        } else {
            Err(UpdateError::NoLink)
        }
    }

    async fn fetch_manifest(&self, branch: &BranchName) -> Result<PublishedManifest, UpdateError> {
        let url = self.manifest_url(branch);
        let response = self.fetcher.fetch(&url).await?;
        if !response.is_success() {
            return Err(UpdateError::Status {
                url,
                status: response.status,
            });
        }
        let body = response
            .collect(MANIFEST_LIMIT)
            .await
            .map_err(UpdateError::Body)?;
        Ok(PublishedManifest::from_json(&body)?)
    }

    async fn cycle(
        &mut self,
        branch: &BranchName,
    ) -> Result<Option<(RevisionId, VariantName)>, UpdateError> {
        self.require_link().await?;
        let remote = self.fetch_manifest(branch).await?;

        if self.is_installed(&remote) {
            return Ok(None);
        }

        let (variant, entry) = remote.select_variant(&self.variants).ok_or_else(|| {
            UpdateError::NoVariant {
                revision: remote.commit_sha.clone(),
                offered: join_names(remote.dict_tars.keys()),
                accepted: join_names(self.variants.iter()),
            }
        })?;
        let (variant, entry) = (variant.clone(), entry.clone());
        let revision = remote.commit_sha.clone();
        self.reporter.section(&format!(
            "Updating {} -> {revision} ({variant})",
            self.installed
                .as_ref()
                .map_or("nothing", |s| s.revision().as_str())
        ));

        let url = join_url(&self.base_url, &entry.link);
        let dest = self
            .download_dir
            .join(format!("{revision}{TAR_SUFFIX}"));
        let request = DownloadRequest {
            url: &url,
            dest: &dest,
            expected_hash: &entry.sha256,
            expected_size: Some(entry.size_bytes),
            revision: &revision,
        };

        self.phase = Phase::Downloading;
        let (actual, size) =
            download::download_to(&*self.fetcher, request, &*self.reporter).await?;
        self.phase = Phase::Verifying;
        download::verify(&dest, &entry.sha256, &actual).await?;
        tracing::debug!(%revision, size, "package verified");

        self.phase = Phase::Extracting;
        let installed = self.install(&dest, &remote, &revision).await;
        tokio::fs::remove_file(&dest).await.ok();
        let report = installed?;
        self.reporter.done(
            revision.as_str(),
            &format!(
                "{} files installed, {} pruned",
                report.extract.files.len(),
                report.pruned.len()
            ),
        );

        let state = InstalledState {
            manifest: remote,
            variant: variant.clone(),
            files: report.extract.files,
            installed_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        self.store.save(&state)?;
        self.installed = Some(state);

        self.phase = Phase::Rebooting;
        if let Err(e) = self.restart.trigger(&revision).await {
            self.reporter.error(&format!("restart after installing {revision} failed: {e}"));
        }
        Ok(Some((revision, variant)))
    }

    async fn install(
        &self,
        archive: &Path,
        remote: &PublishedManifest,
        revision: &RevisionId,
    ) -> Result<InstallReport, UpdateError> {
        let archive = archive.to_path_buf();
        let root = self.root.clone();
        let mode = self.install_mode;
        let previous = self
            .installed
            .as_ref()
            .map(|s| s.files.clone())
            .unwrap_or_default();
        let expected = remote.commit_sha.clone();
        let reporter = Arc::clone(&self.reporter);
        let revision = revision.clone();

        let result = tokio::task::spawn_blocking(move || {
            let embedded = extract::read_embedded_manifest(&archive)?;
            if embedded.commit_sha != expected {
                return Err(UpdateError::RevisionMismatch {
                    expected,
                    found: embedded.commit_sha,
                });
            }
            let mut progress = |entries| reporter.extracting(&revision, entries);
            Ok(extract::install_archive(
                &archive,
                &root,
                mode,
                &previous,
                &mut progress,
            )?)
        })
        .await;

        match result {
            Ok(report) => report,
            Err(join) => Err(ExtractError::Io(std::io::Error::other(join)).into()),
        }
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a VariantName>) -> String {
    names
        .map(VariantName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
