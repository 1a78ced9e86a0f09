//! The polling control loop.

use std::future::Future;

use fwup_schema::{BranchName, RevisionId};

use super::{Backoff, Outcome, Updater};

/// Why [`run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    /// A package was installed and the restart was triggered.
    Restarted(RevisionId),
    /// The shutdown signal fired.
    Shutdown,
    /// `max_cycles` cycles ran without an install.
    CycleLimit,
}

/// Poll `branch` until an update is installed or `shutdown` resolves.
///
/// Each cycle runs to completion; shutdown is only observed while sleeping.
/// An interrupted staged install is recovered once before the first cycle.
pub async fn run<F>(
    updater: &mut Updater,
    branch: &BranchName,
    mut backoff: Backoff,
    max_cycles: Option<u64>,
    shutdown: F,
) -> RunExit
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    if let Err(e) = updater.recover() {
        tracing::error!(root = %updater.root().display(), "recovery failed: {e}");
    }

    let mut cycles = 0u64;
    loop {
        let outcome = updater.check_and_update(branch).await;
        cycles += 1;

        match &outcome {
            Outcome::Updated { revision, .. } => {
                tracing::info!(%branch, %revision, "update installed");
                return RunExit::Restarted(revision.clone());
            }
            Outcome::NoUpdate => {}
            Outcome::Failed(e) => {
                tracing::warn!(%branch, kind = ?e.kind(), "update cycle failed: {e}");
            }
        }

        if max_cycles.is_some_and(|max| cycles >= max) {
            return RunExit::CycleLimit;
        }

        let delay = backoff.next_delay(&outcome);
        tracing::debug!(?delay, failures = backoff.failures(), "sleeping until next cycle");
        tokio::select! {
            () = &mut shutdown => return RunExit::Shutdown,
            () = tokio::time::sleep(delay) => {}
        }
    }
}
