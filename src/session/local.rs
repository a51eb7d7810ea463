//! Loopback sessions that run commands with the local shell.
//!
//! `LocalSession` behaves like a remote execution channel: the caller gets
//! bounded in-memory pipes, and the shell process is only started by
//! [`run`](RemoteSession::run). A caller that stops draining the output
//! pipes stalls the command exactly like a remote channel would.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, trace};

use super::{PipeReader, PipeWriter, RemoteSession, SessionFactory};
use crate::config::{LocalSection, DEFAULT_PIPE_CAPACITY};
use crate::error::RunnerError;
use crate::Result;

/// Factory for [`LocalSession`]s.
#[derive(Debug, Clone)]
pub struct LocalSessionFactory {
    shell: String,
    pipe_capacity: usize,
}

impl LocalSessionFactory {
    /// Create a factory using `/bin/sh` and the default pipe capacity.
    pub fn new() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }

    /// Create a factory from the `local` configuration section.
    pub fn from_config(config: &LocalSection) -> Self {
        Self {
            shell: config.shell.clone(),
            pipe_capacity: config.pipe_capacity,
        }
    }

    /// Set the shell used to interpret command lines.
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Set the capacity of each session pipe.
    pub fn pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }
}

impl Default for LocalSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionFactory for LocalSessionFactory {
    async fn open(&self) -> io::Result<Box<dyn RemoteSession>> {
        Ok(Box::new(LocalSession::new(
            self.shell.clone(),
            self.pipe_capacity,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ready,
    Finished,
    Closed,
}

/// A single-use session backed by a local shell process.
pub struct LocalSession {
    shell: String,
    pipe_capacity: usize,
    stdin: Option<DuplexStream>,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    phase: Phase,
}

impl LocalSession {
    /// Create a session that will run its command with `shell -c`.
    pub fn new(shell: impl Into<String>, pipe_capacity: usize) -> Self {
        Self {
            shell: shell.into(),
            pipe_capacity: pipe_capacity.max(1),
            stdin: None,
            stdout: None,
            stderr: None,
            phase: Phase::Ready,
        }
    }

    fn take_pipe(
        phase: Phase,
        slot: &mut Option<DuplexStream>,
        capacity: usize,
        name: &str,
    ) -> io::Result<DuplexStream> {
        if phase != Phase::Ready {
            return Err(io::Error::other(format!(
                "{} requested after session started",
                name
            )));
        }
        if slot.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already taken", name),
            ));
        }
        let (caller_end, session_end) = tokio::io::duplex(capacity);
        *slot = Some(session_end);
        Ok(caller_end)
    }
}

#[async_trait]
impl RemoteSession for LocalSession {
    fn stdin(&mut self) -> io::Result<PipeWriter> {
        let pipe = Self::take_pipe(self.phase, &mut self.stdin, self.pipe_capacity, "stdin")?;
        Ok(Box::new(pipe))
    }

    fn stdout(&mut self) -> io::Result<PipeReader> {
        let pipe = Self::take_pipe(self.phase, &mut self.stdout, self.pipe_capacity, "stdout")?;
        Ok(Box::new(pipe))
    }

    fn stderr(&mut self) -> io::Result<PipeReader> {
        let pipe = Self::take_pipe(self.phase, &mut self.stderr, self.pipe_capacity, "stderr")?;
        Ok(Box::new(pipe))
    }

    async fn run(&mut self, command: &str) -> Result<()> {
        if self.phase != Phase::Ready {
            return Err(RunnerError::Transport(io::Error::other(
                "session already used",
            )));
        }
        self.phase = Phase::Finished;

        // Owned here so every pipe end is released when run returns.
        let stdin = self.stdin.take();
        let stdout = self.stdout.take();
        let stderr = self.stderr.take();

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RunnerError::Transport)?;

        debug!(shell = %self.shell, pid = ?child.id(), "local session started");

        let feeder = match (stdin, child.stdin.take()) {
            (Some(pipe), Some(child_stdin)) => Some(tokio::spawn(feed(pipe, child_stdin))),
            _ => None,
        };

        let child_out = child.stdout.take();
        let child_err = child.stderr.take();
        let (status, _, _) = tokio::join!(
            child.wait(),
            forward(child_out, stdout, "stdout"),
            forward(child_err, stderr, "stderr"),
        );

        // The process is gone; stop accepting input so writers see a closed pipe.
        if let Some(feeder) = feeder {
            feeder.abort();
        }

        let status = status.map_err(RunnerError::Transport)?;
        exit_result(status)
    }

    async fn close(&mut self) -> io::Result<()> {
        match self.phase {
            Phase::Ready => {
                self.stdin = None;
                self.stdout = None;
                self.stderr = None;
                self.phase = Phase::Closed;
                Ok(())
            }
            Phase::Finished | Phase::Closed => {
                self.phase = Phase::Closed;
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "session already ended",
                ))
            }
        }
    }
}

/// Copy caller input into the process until the caller closes its end.
async fn feed(mut pipe: DuplexStream, mut child_stdin: ChildStdin) {
    match tokio::io::copy(&mut pipe, &mut child_stdin).await {
        Ok(n) => trace!(bytes = n, "stdin closed by caller"),
        Err(e) => debug!(error = %e, "stdin feed stopped"),
    }
    // Dropping the handle delivers EOF to the process.
}

/// Copy one process output stream into the caller's pipe.
///
/// Output is still drained after the caller drops its end so the process
/// never blocks on a full pipe.
async fn forward<R>(source: Option<R>, pipe: Option<DuplexStream>, stream: &str)
where
    R: AsyncRead + Unpin,
{
    let Some(mut source) = source else {
        return;
    };

    match pipe {
        Some(mut pipe) => {
            if let Err(e) = tokio::io::copy(&mut source, &mut pipe).await {
                debug!(stream, error = %e, "pipe reader went away, discarding output");
                let _ = tokio::io::copy(&mut source, &mut tokio::io::sink()).await;
            }
            let _ = pipe.shutdown().await;
        }
        None => {
            let _ = tokio::io::copy(&mut source, &mut tokio::io::sink()).await;
        }
    }
}

fn exit_result(status: std::process::ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(RunnerError::ExitStatus { code });
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(RunnerError::ExitSignal { signal });
        }
    }

    Err(RunnerError::Transport(io::Error::other(
        "process exited without a status",
    )))
}
