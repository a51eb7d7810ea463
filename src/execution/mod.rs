//! Output capture and concurrent stream draining.
//!
//! This module provides the pieces the runner builds its operations from:
//! - [`CaptureBuffer`]: a byte buffer safe for concurrent writers
//! - [`tee`]: drain one pipe into a capture buffer and a log
//! - [`tee_session`]: run a command while both output streams drain
//!
//! # Example
//!
//! ```
//! use remote_runner::execution::{tee, CaptureBuffer, OutputStream};
//! use remote_runner::logging::TracingLog;
//!
//! # tokio_test::block_on(async {
//! let capture = CaptureBuffer::new();
//! tee(OutputStream::Stdout, &b"hello\n"[..], &capture, &TracingLog, 4096)
//!     .await
//!     .unwrap();
//! assert_eq!(capture.to_text(), "hello\n");
//! # });
//! ```

mod capture;
mod coordinator;
mod sanitize;
mod tee;

pub use capture::CaptureBuffer;
pub use coordinator::tee_session;
pub use sanitize::plain_line;
pub use tee::{tee, OutputStream, TEE_BUFFER_SIZE};
