//! Runner facade: the public operations over a session factory.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn, Instrument};

use crate::config::{Config, RunnerSection};
use crate::error::{CapturedOutput, RunnerError};
use crate::execution::{tee_session, CaptureBuffer};
use crate::logging::{LogSink, TracingLog};
use crate::session::{is_benign_close, CallId, CallState, RemoteSession, SessionFactory};
use crate::transfer::{scp, CopyableFile};
use crate::Result;

/// Runs commands and copies files through sessions from a [`SessionFactory`].
///
/// Every operation opens its own session, uses it for exactly one command
/// and closes it before returning. Nothing is retried and no state is kept
/// between calls.
pub struct Runner<F> {
    factory: F,
    log: Arc<dyn LogSink>,
    config: RunnerSection,
}

/// One operation in flight.
struct Call {
    id: CallId,
    state: CallState,
}

impl Call {
    fn new() -> Self {
        Self {
            id: CallId::new(),
            state: CallState::Idle,
        }
    }

    fn advance(&mut self, target: CallState) {
        if !self.state.advance(target) {
            debug!(call = %self.id, from = ?self.state, to = ?target, "ignored call state change");
        }
    }
}

impl<F: SessionFactory> Runner<F> {
    /// Create a runner that logs command output through `tracing`.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            log: Arc::new(TracingLog),
            config: RunnerSection::default(),
        }
    }

    /// Create a runner from the `runner` section of `config`.
    pub fn from_config(factory: F, config: &Config) -> Self {
        Self::new(factory).with_config(config.runner.clone())
    }

    /// Send command output lines to `log`.
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    /// Replace the runner settings.
    pub fn with_config(mut self, config: RunnerSection) -> Self {
        self.config = config;
        self
    }

    /// The session factory in use.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Run `command` and wait for it to finish.
    ///
    /// On failure the error carries the command's stdout and stderr. A
    /// session that could not be opened is reported as
    /// [`RunnerError::SessionCreation`].
    pub async fn run(&self, command: &str) -> Result<()> {
        let call = Call::new();
        let span = tracing::info_span!("run", call = %call.id);

        async {
            info!("Run: {}", command);
            let stdout = CaptureBuffer::new();
            let stderr = CaptureBuffer::new();

            self.execute(call, command, &stdout, &stderr)
                .await
                .map_err(|source| with_output(command, separate(&stdout, &stderr), source))
        }
        .instrument(span)
        .await
    }

    /// Run `command` and return its stdout and stderr merged into one text.
    ///
    /// The order in which lines of the two streams interleave is not
    /// deterministic. On failure the merged text is carried by the error;
    /// see [`RunnerError::captured_output`].
    pub async fn combined_output(&self, command: &str) -> Result<String> {
        let call = Call::new();
        let span = tracing::info_span!("run", call = %call.id);

        async {
            info!("Run with output: {}", command);
            let combined = CaptureBuffer::new();

            match self.execute(call, command, &combined, &combined).await {
                Ok(()) => Ok(combined.to_text()),
                Err(source) => Err(with_output(
                    command,
                    CapturedOutput::Combined(combined.to_text()),
                    source,
                )),
            }
        }
        .instrument(span)
        .await
    }

    /// Run `command` and write its combined output to `destination`.
    ///
    /// Nothing is written if the command fails.
    pub async fn combined_output_to<W>(&self, command: &str, destination: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let output = self.combined_output(command).await?;
        destination
            .write_all(output.as_bytes())
            .await
            .map_err(RunnerError::Output)?;
        destination.flush().await.map_err(RunnerError::Output)
    }

    /// Copy `file` to its target path on the remote host.
    pub async fn copy(&self, file: &dyn CopyableFile) -> Result<()> {
        let mut call = Call::new();
        let span = tracing::info_span!("copy", call = %call.id);

        async {
            let mut session = self.open(&mut call).await?;
            let result = self.copy_with(&mut call, session.as_mut(), file).await;
            self.finish(&mut call, session, result).await
        }
        .instrument(span)
        .await
    }

    /// Delete `file`'s target path on the remote host.
    pub async fn remove(&self, file: &dyn CopyableFile) -> Result<()> {
        let call = Call::new();
        let span = tracing::info_span!("remove", call = %call.id);

        async {
            let command = delete_command(file, &self.config);
            info!("Remove: {}", command);
            let stdout = CaptureBuffer::new();
            let stderr = CaptureBuffer::new();

            self.execute(call, &command, &stdout, &stderr)
                .await
                .map_err(|source| with_output(&command, separate(&stdout, &stderr), source))
        }
        .instrument(span)
        .await
    }

    /// Open a session, tee `command`'s output into the buffers, close.
    async fn execute(
        &self,
        mut call: Call,
        command: &str,
        stdout: &CaptureBuffer,
        stderr: &CaptureBuffer,
    ) -> Result<()> {
        let mut session = self.open(&mut call).await?;
        call.advance(CallState::Streaming);
        let result = tee_session(
            session.as_mut(),
            command,
            stdout,
            stderr,
            Arc::clone(&self.log),
            self.config.read_buffer_size,
        )
        .await;
        self.finish(&mut call, session, result).await
    }

    async fn copy_with(
        &self,
        call: &mut Call,
        session: &mut dyn RemoteSession,
        file: &dyn CopyableFile,
    ) -> Result<()> {
        let stdin = session.stdin().map_err(|source| RunnerError::StreamSetup {
            stream: "stdin",
            source,
        })?;

        info!(
            "Transferring {} bytes to {}",
            file.length(),
            file.target_path()
        );
        let command = scp::receive_command(file.target_dir(), &self.config);
        let output = CaptureBuffer::new();
        let buffer_size = self.config.read_buffer_size;

        call.advance(CallState::Streaming);
        let (sent, received) = tokio::join!(
            scp::send_and_close(stdin, file, buffer_size),
            tee_session(
                session,
                &command,
                &output,
                &output,
                Arc::clone(&self.log),
                buffer_size,
            ),
        );

        match (sent, received) {
            // Local failures explain whatever the receiver did afterwards.
            (
                Err(e @ (RunnerError::TransferSizeMismatch { .. } | RunnerError::Read { .. })),
                received,
            ) => {
                if let Err(remote) = received {
                    warn!(
                        error = %remote,
                        output = %output.to_text(),
                        "receiver failed after local error"
                    );
                }
                Err(e)
            }
            (sent, Err(remote)) => {
                if let Err(local) = sent {
                    debug!(error = %local, "sender stopped");
                }
                Err(RunnerError::Execution {
                    command,
                    output: CapturedOutput::Combined(output.to_text()),
                    source: Box::new(remote),
                })
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(outcome), Ok(())) => {
                debug!(bytes = outcome.bytes_written, "transfer complete");
                Ok(())
            }
        }
    }

    async fn open(&self, call: &mut Call) -> Result<Box<dyn RemoteSession>> {
        match self.factory.open().await {
            Ok(session) => {
                call.advance(CallState::SessionOpen);
                Ok(session)
            }
            Err(e) => {
                call.advance(CallState::Failure);
                Err(RunnerError::SessionCreation(e))
            }
        }
    }

    async fn finish<T>(
        &self,
        call: &mut Call,
        mut session: Box<dyn RemoteSession>,
        result: Result<T>,
    ) -> Result<T> {
        if let Err(e) = session.close().await {
            if !is_benign_close(&e) {
                error!("session close: {}", e);
            }
        }

        call.advance(if result.is_ok() {
            CallState::Success
        } else {
            CallState::Failure
        });
        debug!(state = ?call.state, "call finished");
        result
    }
}

/// Attach `output` to a failure of `command`.
///
/// A session that never opened ran nothing, so its error is passed through.
fn with_output(command: &str, output: CapturedOutput, source: RunnerError) -> RunnerError {
    match source {
        RunnerError::SessionCreation(_) => source,
        source => RunnerError::Execution {
            command: command.to_string(),
            output,
            source: Box::new(source),
        },
    }
}

fn separate(stdout: &CaptureBuffer, stderr: &CaptureBuffer) -> CapturedOutput {
    CapturedOutput::Separate {
        stdout: stdout.to_text(),
        stderr: stderr.to_text(),
    }
}

/// Command that deletes `file`'s target path.
pub fn delete_command(file: &dyn CopyableFile, config: &RunnerSection) -> String {
    let sudo = if config.elevate { "sudo " } else { "" };
    format!("{}rm {}", sudo, file.target_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::MemoryAsset;

    #[test]
    fn test_delete_command() {
        let file = MemoryAsset::new("x", "/etc/kubernetes/addons", "dashboard.yaml");
        assert_eq!(
            delete_command(&file, &RunnerSection::default()),
            "sudo rm /etc/kubernetes/addons/dashboard.yaml"
        );

        let plain = RunnerSection {
            elevate: false,
            ..RunnerSection::default()
        };
        assert_eq!(
            delete_command(&file, &plain),
            "rm /etc/kubernetes/addons/dashboard.yaml"
        );
    }

    #[test]
    fn test_with_output_passes_session_creation_through() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = with_output(
            "true",
            CapturedOutput::Combined(String::new()),
            RunnerError::SessionCreation(refused),
        );
        assert!(matches!(err, RunnerError::SessionCreation(_)));
        assert!(err.to_string().contains("refused"));

        let err = with_output(
            "false",
            CapturedOutput::Combined("no\n".into()),
            RunnerError::ExitStatus { code: 1 },
        );
        assert_eq!(err.captured_output(), Some(&CapturedOutput::Combined("no\n".into())));
        assert_eq!(err.exit_code(), Some(1));
    }

    /// Records the name of the span each output line was logged in.
    #[derive(Default)]
    struct SpanLog {
        seen: std::sync::Mutex<Vec<(Option<&'static str>, String)>>,
    }

    impl LogSink for SpanLog {
        fn log(&self, _level: tracing::Level, line: &str) {
            let span = tracing::Span::current().metadata().map(|m| m.name());
            self.seen.lock().unwrap().push((span, line.to_string()));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_lines_logged_inside_call_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let log = Arc::new(SpanLog::default());
        let runner = Runner::new(crate::session::LocalSessionFactory::new())
            .with_log(log.clone())
            .with_config(RunnerSection {
                elevate: false,
                ..RunnerSection::default()
            });

        runner.run("echo ran").await.unwrap();
        runner.combined_output("echo merged").await.unwrap();
        let missing = MemoryAsset::new("x", "/nonexistent-dir", "missing");
        assert!(runner.remove(&missing).await.is_err());

        let seen = log.seen.lock().unwrap().clone();
        assert!(seen.contains(&(Some("run"), "> ran".to_string())), "{:?}", seen);
        assert!(seen.contains(&(Some("run"), "> merged".to_string())), "{:?}", seen);
        assert!(
            seen.iter().any(|(span, line)| *span == Some("remove") && line.starts_with("! ")),
            "{:?}",
            seen
        );
    }

    #[test]
    fn test_call_starts_idle() {
        let mut call = Call::new();
        assert_eq!(call.state, CallState::Idle);
        call.advance(CallState::Success);
        assert_eq!(call.state, CallState::Idle);
        call.advance(CallState::SessionOpen);
        assert_eq!(call.state, CallState::SessionOpen);
    }
}
