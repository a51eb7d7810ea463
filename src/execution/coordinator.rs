//! Dual-stream coordinator.
//!
//! Runs a command on a session while both of its output streams are drained
//! concurrently. Draining must overlap the wait: session pipes are bounded,
//! so a command that prints more than a pipe holds would block forever if
//! nothing read its output until it exited.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, Instrument};

use super::capture::CaptureBuffer;
use super::tee::{tee, OutputStream};
use crate::error::RunnerError;
use crate::logging::LogSink;
use crate::session::{PipeReader, RemoteSession};
use crate::Result;

/// Run `command` on `session`, teeing stdout into `stdout` and stderr into
/// `stderr`.
///
/// Passing clones of one [`CaptureBuffer`] for both merges the streams.
/// Returns once the command has completed and both streams have reached
/// end-of-stream. The command's own error is returned as is; a failed drain
/// is attached to it as [`RunnerError::DrainFailed`] and otherwise only
/// logged.
pub async fn tee_session(
    session: &mut dyn RemoteSession,
    command: &str,
    stdout: &CaptureBuffer,
    stderr: &CaptureBuffer,
    log: Arc<dyn LogSink>,
    buffer_size: usize,
) -> Result<()> {
    let out_pipe = session
        .stdout()
        .map_err(|source| RunnerError::StreamSetup {
            stream: "stdout",
            source,
        })?;
    let err_pipe = session
        .stderr()
        .map_err(|source| RunnerError::StreamSetup {
            stream: "stderr",
            source,
        })?;

    let out_task = spawn_tee(
        OutputStream::Stdout,
        out_pipe,
        stdout.clone(),
        Arc::clone(&log),
        buffer_size,
    );
    let err_task = spawn_tee(
        OutputStream::Stderr,
        err_pipe,
        stderr.clone(),
        Arc::clone(&log),
        buffer_size,
    );

    let mut result = session.run(command).await;

    for (stream, task) in [(OutputStream::Stdout, out_task), (OutputStream::Stderr, err_task)] {
        match task.await {
            Ok(Ok(bytes)) => debug!(stream = %stream, bytes, "stream drained"),
            Ok(Err(e)) => {
                error!(stream = %stream, error = %e, "tee failed");
                result = result.map_err(|primary| RunnerError::DrainFailed {
                    source: Box::new(primary),
                    stream,
                    error: e,
                });
            }
            Err(join) => {
                // Captured output is incomplete; the command's own error still wins.
                error!(stream = %stream, error = %join, "tee task aborted");
                if result.is_ok() {
                    result = Err(join.into());
                }
            }
        }
    }

    result
}

fn spawn_tee(
    stream: OutputStream,
    pipe: PipeReader,
    capture: CaptureBuffer,
    log: Arc<dyn LogSink>,
    buffer_size: usize,
) -> JoinHandle<std::io::Result<u64>> {
    tokio::spawn(
        async move { tee(stream, pipe, &capture, log.as_ref(), buffer_size).await }
            .instrument(tracing::Span::current()),
    )
}
