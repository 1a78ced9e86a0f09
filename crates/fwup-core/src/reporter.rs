//! Reporter trait for dependency injection
//!
//! Core logic reports progress and outcomes through this trait so it is not
//! coupled to a particular console or log sink.

use fwup_schema::{BranchName, RevisionId, VariantName};

/// Sink for user-facing progress and outcome messages.
pub trait Reporter: Send + Sync {
    /// Indicates a new section or phase has started (e.g. "Building", "Publishing").
    fn section(&self, title: &str);

    /// Updates the progress of a package download.
    fn downloading(&self, revision: &RevisionId, current: u64, total: Option<u64>);

    /// Updates the progress of an extraction.
    fn extracting(&self, revision: &RevisionId, entries: u64);

    /// One package variant has been written and hashed.
    fn built(&self, app: &str, variant: &VariantName, revision: &RevisionId, size: u64);

    /// A branch's latest pointer now refers to `revision`.
    fn published(&self, app: &str, branch: &BranchName, revision: &RevisionId);

    /// An operation on `subject` completed.
    fn done(&self, subject: &str, detail: &str);

    /// An operation on `subject` failed with a specific reason.
    fn failed(&self, subject: &str, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message. Implementations must make these stand out from progress output.
    fn error(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn downloading(&self, revision: &RevisionId, current: u64, total: Option<u64>) {
        (**self).downloading(revision, current, total);
    }
    fn extracting(&self, revision: &RevisionId, entries: u64) {
        (**self).extracting(revision, entries);
    }
    fn built(&self, app: &str, variant: &VariantName, revision: &RevisionId, size: u64) {
        (**self).built(app, variant, revision, size);
    }
    fn published(&self, app: &str, branch: &BranchName, revision: &RevisionId) {
        (**self).published(app, branch, revision);
    }
    fn done(&self, subject: &str, detail: &str) {
        (**self).done(subject, detail);
    }
    fn failed(&self, subject: &str, reason: &str) {
        (**self).failed(subject, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn downloading(&self, _: &RevisionId, _: u64, _: Option<u64>) {}
    fn extracting(&self, _: &RevisionId, _: u64) {}
    fn built(&self, _: &str, _: &VariantName, _: &RevisionId, _: u64) {}
    fn published(&self, _: &str, _: &BranchName, _: &RevisionId) {}
    fn done(&self, _: &str, _: &str) {}
    fn failed(&self, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
}

/// Forwards everything to `tracing`. Used by headless device agents.
#[derive(Debug, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn section(&self, title: &str) {
        tracing::info!("{title}");
    }
    fn downloading(&self, revision: &RevisionId, current: u64, total: Option<u64>) {
        tracing::trace!(%revision, current, ?total, "downloading");
    }
    fn extracting(&self, revision: &RevisionId, entries: u64) {
        tracing::trace!(%revision, entries, "extracting");
    }
    fn built(&self, app: &str, variant: &VariantName, revision: &RevisionId, size: u64) {
        tracing::info!(app, %variant, %revision, size, "package built");
    }
    fn published(&self, app: &str, branch: &BranchName, revision: &RevisionId) {
        tracing::info!(app, %branch, %revision, "latest pointer published");
    }
    fn done(&self, subject: &str, detail: &str) {
        tracing::info!(subject, "{detail}");
    }
    fn failed(&self, subject: &str, reason: &str) {
        tracing::error!(subject, "{reason}");
    }
    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }
    fn warning(&self, msg: &str) {
        tracing::warn!("{msg}");
    }
    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }
}
