//! Bounded, append-only audit log of secret operations.
//!
//! Entries record which secret was touched, by which backend, and how.
//! Secret values are never recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use super::backend::BackendKind;

/// Default number of retained audit entries.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

/// Auditable secret operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Read,
    Write,
    Delete,
    Rotate,
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Rotate => "rotate",
        };
        f.write_str(s)
    }
}

/// A single audit record. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub secret_name: String,
    pub backend: BackendKind,
    pub operation: AuditOperation,
}

/// Fixed-capacity ring buffer of [`AuditEntry`] values.
///
/// When full, appending evicts the oldest entry. Appends from concurrent
/// tasks are serialized by a short-held mutex, so no entry is lost and the
/// length never exceeds the capacity.
#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    entries: Mutex<VecDeque<AuditEntry>>,
}

impl AuditLog {
    /// Create a log retaining at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry stamped with the current time.
    pub fn record(&self, secret_name: &str, backend: BackendKind, operation: AuditOperation) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            secret_name: secret_name.to_string(),
            backend,
            operation,
        };

        // A panic elsewhere while holding the lock cannot leave the deque
        // half-updated, so a poisoned lock is safe to reuse.
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Copy of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}
