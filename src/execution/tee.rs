//! Stream tee: drain one pipe into a capture buffer and a log.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, Level};

use super::capture::CaptureBuffer;
use super::sanitize::plain_line;
use crate::config::DEFAULT_READ_BUFFER_SIZE;
use crate::logging::LogSink;

/// Default chunk size used by [`tee`] callers that have no configuration.
pub const TEE_BUFFER_SIZE: usize = DEFAULT_READ_BUFFER_SIZE;

/// Which output stream of a command is being teed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl OutputStream {
    /// Prefix put in front of every logged line of this stream.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Stdout => "> ",
            Self::Stderr => "! ",
        }
    }

    /// Stream name as used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drain `reader` until end-of-stream.
///
/// Every chunk is appended unmodified to `capture`. Complete lines are also
/// sent to `log`, prefixed with the stream's marker; a trailing partial line
/// is logged at end-of-stream. Lines have no length limit.
///
/// Returns the number of bytes drained. Fails only if a read fails.
pub async fn tee<R>(
    stream: OutputStream,
    mut reader: R,
    capture: &CaptureBuffer,
    log: &dyn LogSink,
    buffer_size: usize,
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut pending: Vec<u8> = Vec::new();
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                flush_partial(stream, &mut pending, log);
                return Err(e);
            }
        };
        trace!(stream = %stream, bytes = n, "tee read");

        let chunk = &buf[..n];
        capture.append(chunk);
        total += n as u64;

        pending.extend_from_slice(chunk);
        let mut start = 0;
        while let Some(pos) = pending[start..].iter().position(|&b| b == b'\n') {
            log_line(stream, &pending[start..start + pos], log);
            start += pos + 1;
        }
        pending.drain(..start);
    }

    flush_partial(stream, &mut pending, log);
    Ok(total)
}

fn flush_partial(stream: OutputStream, pending: &mut Vec<u8>, log: &dyn LogSink) {
    if !pending.is_empty() {
        log_line(stream, pending, log);
        pending.clear();
    }
}

fn log_line(stream: OutputStream, line: &[u8], log: &dyn LogSink) {
    log.log(Level::INFO, &format!("{}{}", stream.prefix(), plain_line(line)));
}
