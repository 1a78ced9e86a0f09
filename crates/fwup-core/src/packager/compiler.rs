//! Bytecode compiler invocation.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use wait_timeout::ChildExt;

/// Default time one file may take to compile.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised while compiling one file.
#[derive(Error, Debug)]
pub enum CompileError {
    /// The compiler program could not be located.
    #[error("compiler '{program}' not found: {source}")]
    NotFound {
        /// Program name as configured.
        program: String,
        /// Underlying error.
        source: which::Error,
    },

    /// The compiler could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Resolved program path.
        program: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The compiler exited unsuccessfully.
    #[error("compiling {file} failed ({status}): {stderr}")]
    Failed {
        /// Source file.
        file: PathBuf,
        /// Exit status.
        status: String,
        /// What the compiler printed on stderr.
        stderr: String,
    },

    /// The compiler ran longer than its timeout and was killed.
    #[error("compiling {file} timed out after {secs}s")]
    Timeout {
        /// Source file.
        file: PathBuf,
        /// Timeout that expired.
        secs: u64,
    },

    /// The compiler succeeded but wrote no output file.
    #[error("compiler produced no output for {0}")]
    MissingOutput(PathBuf),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns one source file into bytecode. Must fail loudly, never return
/// partial output.
pub trait Compiler: Send + Sync {
    /// Bytecode for `source`.
    fn compile(&self, source: &Path) -> Result<Vec<u8>, CompileError>;
}

/// An external compiler called as `<program> <args..> -o <out> <source>`.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCompiler {
    /// Locate `program` on `PATH` (or use it as given if it is a path).
    pub fn locate(program: &str) -> Result<Self, CompileError> {
        let program = which::which(program).map_err(|source| CompileError::NotFound {
            program: program.to_string(),
            source,
        })?;
        Ok(Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Extra arguments placed before `-o`.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Per-file time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolved program path.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, source: &Path) -> Result<Vec<u8>, CompileError> {
        let out_dir = tempfile::tempdir()?;
        let out = out_dir.path().join("out.mpy");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("-o")
            .arg(&out)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CompileError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let Some(status) = child.wait_timeout(self.timeout)? else {
            child.kill().ok();
            child.wait().ok();
            return Err(CompileError::Timeout {
                file: source.to_path_buf(),
                secs: self.timeout.as_secs(),
            });
        };

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            pipe.read_to_string(&mut stderr).ok();
        }
        if !status.success() {
            return Err(CompileError::Failed {
                file: source.to_path_buf(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(file = %source.display(), "compiler said: {}", stderr.trim());
        }

        match std::fs::read(&out) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CompileError::MissingOutput(source.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
