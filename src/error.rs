//! Error types for remote-runner.

use std::fmt;

use thiserror::Error;

use crate::execution::OutputStream;

/// Output captured from a command, attached to execution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedOutput {
    /// Standard output and standard error captured separately.
    Separate { stdout: String, stderr: String },
    /// Both streams merged into one buffer.
    Combined(String),
}

impl CapturedOutput {
    /// Returns true if nothing was captured on any stream.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Separate { stdout, stderr } => stdout.is_empty() && stderr.is_empty(),
            Self::Combined(output) => output.is_empty(),
        }
    }
}

impl fmt::Display for CapturedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Separate { stdout, stderr } => {
                write!(f, "stdout: {}\nstderr: {}", stdout, stderr)
            }
            Self::Combined(output) => write!(f, "output: {}", output),
        }
    }
}

/// Main error type for remote-runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The transport could not open a new session.
    #[error("creating session: {0}")]
    SessionCreation(#[source] std::io::Error),

    /// A session pipe could not be acquired before the command started.
    #[error("acquiring {stream} pipe: {source}")]
    StreamSetup {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The remote command ran and exited with a non-zero status.
    #[error("process exited with status {code}")]
    ExitStatus { code: i32 },

    /// The remote command terminated without reporting an exit status.
    #[error("process terminated by signal {signal}")]
    ExitSignal { signal: i32 },

    /// The transport failed while the command was running.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// A command failed; carries the command line and what it printed.
    #[error("command failed: {command}\n{output}")]
    Execution {
        command: String,
        output: CapturedOutput,
        #[source]
        source: Box<RunnerError>,
    },

    /// The command failed and draining one of its streams failed as well.
    #[error("{source} (draining {stream} also failed: {error})")]
    DrainFailed {
        #[source]
        source: Box<RunnerError>,
        stream: OutputStream,
        error: std::io::Error,
    },

    /// The number of bytes sent differs from the declared file length.
    #[error("{name}: expected to copy {expected} bytes, but copied {copied} instead")]
    TransferSizeMismatch {
        name: String,
        expected: u64,
        copied: u64,
    },

    /// The local content source failed mid-copy.
    #[error("reading {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Captured output could not be forwarded to its destination.
    #[error("writing output: {0}")]
    Output(#[source] std::io::Error),

    /// A spawned task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

impl RunnerError {
    /// Exit code of the failed remote command, looking through wrappers.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExitStatus { code } => Some(*code),
            Self::Execution { source, .. } | Self::DrainFailed { source, .. } => source.exit_code(),
            _ => None,
        }
    }

    /// Output captured before the command failed, if this error carries any.
    pub fn captured_output(&self) -> Option<&CapturedOutput> {
        match self {
            Self::Execution { output, .. } => Some(output),
            Self::DrainFailed { source, .. } => source.captured_output(),
            _ => None,
        }
    }

    /// Returns true if this is a transfer size mismatch.
    pub fn is_size_mismatch(&self) -> bool {
        matches!(self, Self::TransferSizeMismatch { .. })
    }
}

impl From<tokio::task::JoinError> for RunnerError {
    fn from(err: tokio::task::JoinError) -> Self {
        RunnerError::Task(err.to_string())
    }
}

/// Convenience Result type for remote-runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
