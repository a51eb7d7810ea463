//! Remote session abstraction.
//!
//! A [`RemoteSession`] is one ephemeral execution channel bound to a single
//! command invocation. Sessions come from a [`SessionFactory`], which wraps an
//! already-established transport. The runner opens a fresh session for every
//! operation and closes it exactly once when the operation ends.

mod id;
mod local;
mod state;

pub use id::CallId;
pub use local::{LocalSession, LocalSessionFactory};
pub use state::CallState;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::Result;

/// Readable end of a session output pipe.
pub type PipeReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable end of a session input pipe.
pub type PipeWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens new execution channels over an established transport.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a new, unused session.
    async fn open(&self) -> std::io::Result<Box<dyn RemoteSession>>;
}

/// One remote command invocation with its input and output pipes.
///
/// Pipes must be taken before [`run`](RemoteSession::run) is called, and each
/// can be taken only once. Once `run` returns, both output pipes have reached
/// (or will reach) end-of-stream.
#[async_trait]
pub trait RemoteSession: Send {
    /// Take the command's standard input.
    fn stdin(&mut self) -> std::io::Result<PipeWriter>;

    /// Take the command's standard output.
    fn stdout(&mut self) -> std::io::Result<PipeReader>;

    /// Take the command's standard error.
    fn stderr(&mut self) -> std::io::Result<PipeReader>;

    /// Start `command` and wait for it to complete.
    ///
    /// A command that exits non-zero yields
    /// [`RunnerError::ExitStatus`](crate::RunnerError::ExitStatus).
    async fn run(&mut self, command: &str) -> Result<()>;

    /// Close the channel.
    ///
    /// An error of kind [`UnexpectedEof`](std::io::ErrorKind::UnexpectedEof)
    /// means the channel had already ended and is not a failure.
    async fn close(&mut self) -> std::io::Result<()>;
}

/// Returns true if a close error only reports that the channel already ended.
pub fn is_benign_close(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::UnexpectedEof
}
