//! SCP sink protocol encoder.
//!
//! Pushes a single file to a receiver started as `scp -t <dir>`. On the
//! receiver's standard input the sender writes:
//!
//! ```text
//! C<perm> <len> <name>\n
//! <exactly len bytes>
//! \0
//! ```
//!
//! An empty file is the header followed directly by the `\0` terminator.

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::asset::CopyableFile;
use crate::config::RunnerSection;
use crate::error::RunnerError;
use crate::Result;

/// Byte that ends a file body.
pub const TERMINATOR: u8 = 0x00;

/// Bytes actually written for one copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Content bytes sent, excluding header and terminator.
    pub bytes_written: u64,
}

/// Header line announcing `file` to the receiver.
pub fn header(file: &dyn CopyableFile) -> String {
    format!(
        "C{} {} {}\n",
        file.permissions(),
        file.length(),
        file.target_name()
    )
}

/// Remote command that creates `target_dir` and starts the receiver in it.
pub fn receive_command(target_dir: &str, config: &RunnerSection) -> String {
    let sudo = if config.elevate { "sudo " } else { "" };
    format!(
        "{sudo}mkdir -p {dir} && {sudo}{receiver} -t {dir}",
        sudo = sudo,
        dir = target_dir,
        receiver = config.receiver
    )
}

/// Send `file` over `writer`, then close `writer` whatever the outcome.
///
/// The receiver waits for more input until its stdin is closed, so the
/// writer is shut down on success and on every error path.
pub async fn send_and_close<W>(
    mut writer: W,
    file: &dyn CopyableFile,
    buffer_size: usize,
) -> Result<TransferOutcome>
where
    W: AsyncWrite + Unpin,
{
    let result = send(&mut writer, file, buffer_size).await;
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "closing receiver input");
    }
    result
}

/// Write header, body and terminator for `file` to `writer`.
///
/// Fails with [`RunnerError::TransferSizeMismatch`] when the content is
/// shorter or longer than the declared length. Content past the declared
/// length is never sent; for a long source the reported count is the
/// declared length plus the one extra byte that was detected.
pub async fn send<W>(
    writer: &mut W,
    file: &dyn CopyableFile,
    buffer_size: usize,
) -> Result<TransferOutcome>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let name = file.target_name();
    let expected = file.length();

    writer
        .write_all(header(file).as_bytes())
        .await
        .map_err(RunnerError::Transport)?;

    if expected == 0 {
        warn!("{} is a 0 byte asset!", name);
        writer
            .write_all(&[TERMINATOR])
            .await
            .map_err(RunnerError::Transport)?;
        writer.flush().await.map_err(RunnerError::Transport)?;
        return Ok(TransferOutcome { bytes_written: 0 });
    }

    let read_error = |source: std::io::Error| RunnerError::Read {
        name: name.to_string(),
        source,
    };
    let mut reader = file.content().map_err(read_error)?;

    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut copied = 0u64;
    while copied < expected {
        let want = (expected - copied).min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want]).await.map_err(read_error)?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(RunnerError::Transport)?;
        copied += n as u64;
    }

    if copied == expected {
        // The source has to end exactly here. One more byte is enough to
        // tell, and a source that never ends is not read any further.
        let mut extra = [0u8; 1];
        let n = reader.read(&mut extra).await.map_err(read_error)?;
        copied += n as u64;
    }
    if copied != expected {
        return Err(RunnerError::TransferSizeMismatch {
            name: name.to_string(),
            expected,
            copied,
        });
    }

    writer
        .write_all(&[TERMINATOR])
        .await
        .map_err(RunnerError::Transport)?;
    writer.flush().await.map_err(RunnerError::Transport)?;

    info!("{}: copied {} bytes", name, copied);
    Ok(TransferOutcome {
        bytes_written: copied,
    })
}
