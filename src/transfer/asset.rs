//! Files that can be copied to a remote host.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncRead;

/// Readable content of a [`CopyableFile`], positioned at its start.
pub type ContentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Permissions used when none are given.
pub const DEFAULT_PERMISSIONS: &str = "0644";

/// A file to be placed on the remote host.
///
/// The content returned by [`content`](CopyableFile::content) must yield
/// exactly [`length`](CopyableFile::length) bytes; any difference fails the
/// copy.
pub trait CopyableFile: Send + Sync {
    /// Declared content length in bytes.
    fn length(&self) -> u64;

    /// Octal permission string, e.g. `"0644"`.
    fn permissions(&self) -> &str;

    /// Remote directory the file is placed in.
    fn target_dir(&self) -> &str;

    /// Remote file name, without any directory component.
    fn target_name(&self) -> &str;

    /// Open the content for reading.
    fn content(&self) -> io::Result<ContentReader>;

    /// Full remote path of the file.
    fn target_path(&self) -> String {
        let dir = self.target_dir().trim_end_matches('/');
        format!("{}/{}", dir, self.target_name())
    }
}

/// A file whose content is held in memory.
#[derive(Debug, Clone)]
pub struct MemoryAsset {
    data: Arc<[u8]>,
    target_dir: String,
    target_name: String,
    permissions: String,
}

impl MemoryAsset {
    /// Create an asset from bytes with the default permissions.
    pub fn new(
        data: impl Into<Vec<u8>>,
        target_dir: impl Into<String>,
        target_name: impl Into<String>,
    ) -> Self {
        let data: Vec<u8> = data.into();
        Self {
            data: Arc::from(data),
            target_dir: target_dir.into(),
            target_name: target_name.into(),
            permissions: DEFAULT_PERMISSIONS.to_string(),
        }
    }

    /// Set the permission string.
    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = permissions.into();
        self
    }
}

impl CopyableFile for MemoryAsset {
    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn permissions(&self) -> &str {
        &self.permissions
    }

    fn target_dir(&self) -> &str {
        &self.target_dir
    }

    fn target_name(&self) -> &str {
        &self.target_name
    }

    fn content(&self) -> io::Result<ContentReader> {
        Ok(Box::new(io::Cursor::new(Arc::clone(&self.data))))
    }
}

/// A file read from the local filesystem.
///
/// The length is taken from the file's metadata when the asset is created.
#[derive(Debug, Clone)]
pub struct FileAsset {
    source: PathBuf,
    length: u64,
    target_dir: String,
    target_name: String,
    permissions: String,
}

impl FileAsset {
    /// Describe the local file at `source` for copying.
    pub fn new(
        source: impl AsRef<Path>,
        target_dir: impl Into<String>,
        target_name: impl Into<String>,
    ) -> io::Result<Self> {
        let source = source.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&source)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", source.display()),
            ));
        }

        Ok(Self {
            source,
            length: metadata.len(),
            target_dir: target_dir.into(),
            target_name: target_name.into(),
            permissions: DEFAULT_PERMISSIONS.to_string(),
        })
    }

    /// Set the permission string.
    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = permissions.into();
        self
    }

    /// Local path the content is read from.
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl CopyableFile for FileAsset {
    fn length(&self) -> u64 {
        self.length
    }

    fn permissions(&self) -> &str {
        &self.permissions
    }

    fn target_dir(&self) -> &str {
        &self.target_dir
    }

    fn target_name(&self) -> &str {
        &self.target_name
    }

    fn content(&self) -> io::Result<ContentReader> {
        let file = std::fs::File::open(&self.source)?;
        Ok(Box::new(tokio::fs::File::from_std(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_memory_asset() {
        let asset = MemoryAsset::new("hello", "/etc/app", "app.conf").with_permissions("0600");

        assert_eq!(asset.length(), 5);
        assert_eq!(asset.permissions(), "0600");
        assert_eq!(asset.target_path(), "/etc/app/app.conf");

        let mut content = String::new();
        asset.content().unwrap().read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn test_memory_asset_content_reopens_at_start() {
        let asset = MemoryAsset::new(vec![1u8, 2, 3], "/tmp", "blob");

        for _ in 0..2 {
            let mut buf = Vec::new();
            asset.content().unwrap().read_to_end(&mut buf).await.unwrap();
            assert_eq!(buf, vec![1, 2, 3]);
        }
    }

    #[test]
    fn test_target_path_trailing_slash() {
        let asset = MemoryAsset::new("", "/var/lib/", "state");
        assert_eq!(asset.target_path(), "/var/lib/state");
        assert_eq!(asset.permissions(), DEFAULT_PERMISSIONS);
    }

    #[tokio::test]
    async fn test_file_asset() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"file content").unwrap();

        let asset = FileAsset::new(file.path(), "/opt", "content.txt").unwrap();
        assert_eq!(asset.length(), 12);
        assert_eq!(asset.source(), file.path());

        let mut content = String::new();
        asset.content().unwrap().read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "file content");
    }

    #[test]
    fn test_file_asset_missing() {
        let result = FileAsset::new("/nonexistent/source", "/opt", "x");
        assert!(result.is_err());
    }

    #[test]
    fn test_file_asset_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileAsset::new(dir.path(), "/opt", "x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
