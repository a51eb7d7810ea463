//! File transfer to the remote host.
//!
//! - [`CopyableFile`]: what gets copied, with [`MemoryAsset`] and [`FileAsset`]
//! - [`scp`]: the sink protocol encoder used to push one file

mod asset;
pub mod scp;

pub use asset::{ContentReader, CopyableFile, FileAsset, MemoryAsset, DEFAULT_PERMISSIONS};
pub use scp::TransferOutcome;
