//! Append-only audit log.
//!
//! Every grant, revoke and version mutation appends a [`ChangeEvent`].
//! Events are never deleted; the only way to shrink the log is an explicit
//! retention truncation by the caller.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::time::now_millis;
use crate::types::{FileId, Principal};

/// What kind of change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    FileCreated,
    VersionCreated,
    BranchCreated,
    BranchMerged,
    VersionReverted,
    VersionsCleaned,
    PermissionGranted,
    PermissionRevoked,
    KeyWrapped,
    KeyRevoked,
    TokenIssued,
    TokenRevoked,
    LinkCreated,
    LinkAccessed,
}

/// A single append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: EventKind,

    /// The file this event concerns, if any.
    pub file_id: Option<FileId>,

    /// When it happened (Unix milliseconds).
    pub timestamp: i64,

    /// Who caused it.
    pub principal: Principal,

    /// Free-form detail string.
    pub details: String,
}

impl ChangeEvent {
    /// Build an event stamped with the current time.
    pub fn now(
        kind: EventKind,
        file_id: Option<FileId>,
        principal: Principal,
        details: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            file_id,
            timestamp: now_millis(),
            principal,
            details: details.into(),
        }
    }
}

/// Thread-safe append-only event log.
///
/// Shared by the token service and the version engine so the audit trail
/// for a file interleaves permission and history changes in order.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: RwLock<Vec<ChangeEvent>>,
}

impl AuditLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn record(&self, event: ChangeEvent) {
        self.events.write().unwrap().push(event);
    }

    /// All events, oldest first.
    pub fn all(&self) -> Vec<ChangeEvent> {
        self.events.read().unwrap().clone()
    }

    /// Events concerning one file, oldest first.
    pub fn events_for(&self, file_id: &FileId) -> Vec<ChangeEvent> {
        self.events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.file_id.as_ref() == Some(file_id))
            .cloned()
            .collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop events older than the cutoff timestamp.
    ///
    /// This is the explicit retention policy hook. Nothing calls it
    /// automatically. Returns the number of events removed.
    pub fn truncate_before(&self, cutoff_millis: i64) -> usize {
        let mut events = self.events.write().unwrap();
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff_millis);
        before - events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, file: &str, ts: i64) -> ChangeEvent {
        ChangeEvent {
            kind,
            file_id: Some(FileId::new(file)),
            timestamp: ts,
            principal: Principal::new("alice"),
            details: String::new(),
        }
    }

    #[test]
    fn test_record_and_filter() {
        let log = AuditLog::new();
        log.record(event(EventKind::FileCreated, "f1", 1));
        log.record(event(EventKind::VersionCreated, "f2", 2));
        log.record(event(EventKind::PermissionGranted, "f1", 3));

        assert_eq!(log.len(), 3);
        let f1 = log.events_for(&FileId::new("f1"));
        assert_eq!(f1.len(), 2);
        assert_eq!(f1[0].kind, EventKind::FileCreated);
        assert_eq!(f1[1].kind, EventKind::PermissionGranted);
    }

    #[test]
    fn test_truncate_before_is_explicit_and_bounded() {
        let log = AuditLog::new();
        log.record(event(EventKind::FileCreated, "f1", 100));
        log.record(event(EventKind::VersionCreated, "f1", 200));
        log.record(event(EventKind::VersionCreated, "f1", 300));

        let removed = log.truncate_before(200);
        assert_eq!(removed, 1);
        assert_eq!(log.len(), 2);
        // Events at or after the cutoff survive.
        assert_eq!(log.all()[0].timestamp, 200);
    }
}
