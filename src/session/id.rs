//! Per-call identifier.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for call ID generation.
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies one runner operation (and the session it opened) in logs.
///
/// IDs come from an atomic counter and are unique within a process. They
/// are displayed as `call-XXXXXXXX` where X is a hexadecimal digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(u64);

impl CallId {
    /// Create a new unique call ID.
    pub fn new() -> Self {
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..10_000 {
            let id = CallId::new();
            assert!(ids.insert(id), "Duplicate ID generated: {}", id);
        }
    }

    #[test]
    fn test_display_format() {
        let id = CallId(255);
        assert_eq!(id.to_string(), "call-000000ff");
        assert_eq!(id.as_u64(), 255);
    }
}
