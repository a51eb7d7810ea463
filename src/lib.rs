//! # remote-runner
//!
//! Run commands and push files over an already-established remote execution
//! transport.
//!
//! A [`Runner`] asks a [`SessionFactory`] for a fresh session per operation,
//! drains the command's stdout and stderr concurrently with the wait for
//! completion, and folds every failure into one [`RunnerError`] that carries
//! what the command printed.
//!
//! ## Features
//!
//! - **Run**: execute a command, keeping stdout and stderr for diagnostics
//! - **Combined output**: stdout and stderr merged into one text
//! - **Copy**: push a file with the SCP sink protocol, byte-exact
//! - **Remove**: delete a previously copied file
//!
//! ## Quick Start
//!
//! ```no_run
//! use remote_runner::{LocalSessionFactory, MemoryAsset, Runner};
//!
//! #[tokio::main]
//! async fn main() -> remote_runner::Result<()> {
//!     remote_runner::logging::try_init().ok();
//!
//!     let runner = Runner::new(LocalSessionFactory::new());
//!
//!     runner.run("mkdir -p /tmp/demo").await?;
//!     let listing = runner.combined_output("ls -la /tmp/demo").await?;
//!     println!("{}", listing);
//!
//!     let file = MemoryAsset::new("hello\n", "/tmp/demo", "hello.txt");
//!     runner.copy(&file).await?;
//!     runner.remove(&file).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod runner;
pub mod session;
pub mod transfer;

// Re-export commonly used types
pub use config::Config;
pub use error::{CapturedOutput, Result, RunnerError};
pub use execution::{CaptureBuffer, OutputStream};
pub use logging::{LogSink, TracingLog};
pub use runner::{delete_command, Runner};
pub use session::{
    CallId, CallState, LocalSession, LocalSessionFactory, RemoteSession, SessionFactory,
};
pub use transfer::{CopyableFile, FileAsset, MemoryAsset, TransferOutcome};
