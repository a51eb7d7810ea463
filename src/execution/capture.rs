//! Synchronized capture buffer.

use std::sync::{Arc, Mutex, MutexGuard};

/// Byte buffer shared by concurrent output writers.
///
/// Clones share the same storage. Each [`append`](CaptureBuffer::append) is
/// applied atomically, so chunks from different writers never interleave
/// byte-wise; the order between writers is whatever order the chunks arrive
/// in.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        // Appends leave the vector consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one chunk.
    pub fn append(&self, chunk: &[u8]) {
        self.lock().extend_from_slice(chunk);
    }

    /// Number of bytes captured so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the raw captured bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Captured content as text, replacing invalid UTF-8.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }
}
