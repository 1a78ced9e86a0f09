//! "Trigger reboot" capability.

use async_trait::async_trait;
use fwup_schema::RevisionId;
use thiserror::Error;

/// Errors raised while triggering a restart.
#[derive(Error, Debug)]
pub enum RestartError {
    /// The restart command could not be started.
    #[error("failed to spawn restart command {command}: {source}")]
    Spawn {
        /// Command line.
        command: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The restart command exited unsuccessfully.
    #[error("restart command {command} exited with {status}")]
    Failed {
        /// Command line.
        command: String,
        /// Exit status.
        status: String,
    },

    /// No program was given.
    #[error("restart command is empty")]
    Empty,
}

/// Makes a new install take effect.
#[async_trait]
pub trait Restart: Send + Sync {
    /// Make the freshly installed `revision` take effect.
    async fn trigger(&self, revision: &RevisionId) -> Result<(), RestartError>;
}

#[async_trait]
impl<T: Restart + ?Sized> Restart for std::sync::Arc<T> {
    async fn trigger(&self, revision: &RevisionId) -> Result<(), RestartError> {
        (**self).trigger(revision).await
    }
}

/// Leaves restarting to whoever supervises the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRestart;

#[async_trait]
impl Restart for NoRestart {
    async fn trigger(&self, revision: &RevisionId) -> Result<(), RestartError> {
        tracing::info!(%revision, "install complete, restart required");
        Ok(())
    }
}

/// Runs a configured command, e.g. `systemctl restart app`.
#[derive(Debug, Clone)]
pub struct CommandRestart {
    argv: Vec<String>,
}

impl CommandRestart {
    /// Run `argv[0]` with the remaining arguments. Fails if `argv` is empty.
    pub fn new(argv: Vec<String>) -> Result<Self, RestartError> {
        if argv.is_empty() {
            return Err(RestartError::Empty);
        }
        Ok(Self { argv })
    }
}

#[async_trait]
impl Restart for CommandRestart {
    async fn trigger(&self, revision: &RevisionId) -> Result<(), RestartError> {
        let command = self.argv.join(" ");
        let (program, args) = self.argv.split_first().ok_or(RestartError::Empty)?;
        tracing::info!(%revision, %command, "restarting");

        let status = tokio::process::Command::new(program)
            .args(args)
            .env("FWUP_REVISION", revision.as_str())
            .status()
            .await
            .map_err(|source| RestartError::Spawn {
                command: command.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(RestartError::Failed {
                command,
                status: status.to_string(),
            })
        }
    }
}
