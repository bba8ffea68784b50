//! Store adapter contract consumed by the matcher, ledger and orchestrator.
//!
//! The core never caches identities: every recognition re-fetches the full
//! enrolled set through [`IdentityStore::fetch_all_identities`].

use crate::types::{AttendanceEvent, Category, Descriptor, Identity, IdentityId};
use chrono::{DateTime, Local};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("identity {0} does not exist")]
    UnknownIdentity(IdentityId),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Read/append access to attendance history.
pub trait AttendanceLog {
    /// Most recent event for `identity_id` by timestamp.
    fn fetch_last_attendance(
        &self,
        identity_id: IdentityId,
    ) -> Result<Option<AttendanceEvent>, StoreError>;

    fn insert_attendance(
        &mut self,
        identity_id: IdentityId,
        category: Category,
        timestamp: DateTime<Local>,
    ) -> Result<AttendanceEvent, StoreError>;
}

/// Body of an exclusive attendance scope; see [`IdentityStore::exclusive_attendance`].
pub type AttendanceScope<'a> =
    &'a mut dyn FnMut(&mut dyn AttendanceLog) -> Result<Option<AttendanceEvent>, StoreError>;

/// Full store adapter: enrolled identities plus attendance history.
pub trait IdentityStore: AttendanceLog {
    fn fetch_all_identities(&self) -> Result<Vec<Identity>, StoreError>;

    /// Persist a person and their descriptor as one unit.
    fn insert_identity(
        &mut self,
        name: &str,
        descriptor: &Descriptor,
    ) -> Result<IdentityId, StoreError>;

    /// Run `scope` with exclusive access to the attendance log.
    ///
    /// Writes made by `scope` persist only if it returns `Ok`. Concurrent writers
    /// sharing the same backing store are excluded for the duration.
    fn exclusive_attendance(
        &mut self,
        scope: AttendanceScope<'_>,
    ) -> Result<Option<AttendanceEvent>, StoreError>;

    /// Up to `limit` events for `identity_id`, most recent first.
    fn attendance_history(
        &self,
        identity_id: IdentityId,
        limit: usize,
    ) -> Result<Vec<AttendanceEvent>, StoreError>;
}

/// In-process store, used by tests and by callers without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    identities: Vec<Identity>,
    events: Vec<AttendanceEvent>,
    next_id: IdentityId,
    read_only: bool,
}

#[derive(Error, Debug)]
#[error("memory store is read-only")]
struct ReadOnly;

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject all writes with [`StoreError::Backend`] while set.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn events(&self) -> &[AttendanceEvent] {
        &self.events
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::backend(ReadOnly));
        }
        Ok(())
    }
}

impl AttendanceLog for MemoryStore {
    fn fetch_last_attendance(
        &self,
        identity_id: IdentityId,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        let mut last: Option<&AttendanceEvent> = None;
        for event in self.events.iter().filter(|e| e.identity_id == identity_id) {
            if last.map_or(true, |prev| event.timestamp >= prev.timestamp) {
                last = Some(event);
            }
        }
        Ok(last.cloned())
    }

    fn insert_attendance(
        &mut self,
        identity_id: IdentityId,
        category: Category,
        timestamp: DateTime<Local>,
    ) -> Result<AttendanceEvent, StoreError> {
        self.check_writable()?;
        if !self.identities.iter().any(|i| i.id == identity_id) {
            return Err(StoreError::UnknownIdentity(identity_id));
        }
        let event = AttendanceEvent {
            identity_id,
            timestamp,
            category,
        };
        self.events.push(event.clone());
        Ok(event)
    }
}

impl IdentityStore for MemoryStore {
    fn fetch_all_identities(&self) -> Result<Vec<Identity>, StoreError> {
        Ok(self.identities.clone())
    }

    fn insert_identity(
        &mut self,
        name: &str,
        descriptor: &Descriptor,
    ) -> Result<IdentityId, StoreError> {
        self.check_writable()?;
        self.next_id += 1;
        self.identities.push(Identity {
            id: self.next_id,
            name: name.to_string(),
            descriptor: descriptor.clone(),
        });
        Ok(self.next_id)
    }

    fn exclusive_attendance(
        &mut self,
        scope: AttendanceScope<'_>,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        let checkpoint = self.events.len();
        let log: &mut dyn AttendanceLog = &mut *self;
        let result = scope(log);
        if result.is_err() {
            self.events.truncate(checkpoint);
        }
        result
    }

    fn attendance_history(
        &self,
        identity_id: IdentityId,
        limit: usize,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        let mut events: Vec<AttendanceEvent> = self
            .events
            .iter()
            .filter(|e| e.identity_id == identity_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal timestamps; reverse puts
        // the latest insert first.
        events.sort_by_key(|e| e.timestamp);
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn test_insert_identity_assigns_increasing_ids() {
        let mut store = MemoryStore::new();
        let a = store.insert_identity("a", &Descriptor::new(vec![0.0])).unwrap();
        let b = store.insert_identity("b", &Descriptor::new(vec![1.0])).unwrap();
        assert!(b > a);
        assert_eq!(store.fetch_all_identities().unwrap().len(), 2);
    }

    #[test]
    fn test_attendance_requires_existing_identity() {
        let mut store = MemoryStore::new();
        let err = store.insert_attendance(42, Category::Entry, at(9, 0)).unwrap_err();
        assert!(matches!(err, StoreError::UnknownIdentity(42)));
    }

    #[test]
    fn test_last_attendance_by_timestamp() {
        let mut store = MemoryStore::new();
        let id = store.insert_identity("a", &Descriptor::new(vec![0.0])).unwrap();
        store.insert_attendance(id, Category::Exit, at(18, 0)).unwrap();
        store.insert_attendance(id, Category::Entry, at(8, 0)).unwrap();
        let last = store.fetch_last_attendance(id).unwrap().unwrap();
        assert_eq!(last.timestamp, at(18, 0));
    }

    #[test]
    fn test_failed_scope_rolls_back() {
        let mut store = MemoryStore::new();
        let id = store.insert_identity("a", &Descriptor::new(vec![0.0])).unwrap();
        let mut abort = |log: &mut dyn AttendanceLog| -> Result<Option<AttendanceEvent>, StoreError> {
            log.insert_attendance(id, Category::Entry, at(9, 0))?;
            Err(StoreError::Corrupt("abort".into()))
        };
        let result = store.exclusive_attendance(&mut abort);
        assert!(result.is_err());
        assert!(store.events().is_empty());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let mut store = MemoryStore::new();
        store.set_read_only(true);
        let err = store.insert_identity("a", &Descriptor::new(vec![0.0])).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_history_most_recent_first() {
        let mut store = MemoryStore::new();
        let id = store.insert_identity("a", &Descriptor::new(vec![0.0])).unwrap();
        store.insert_attendance(id, Category::Entry, at(8, 0)).unwrap();
        store.insert_attendance(id, Category::Exit, at(18, 0)).unwrap();
        store.insert_attendance(id, Category::Entry, at(12, 0)).unwrap();
        let history = store.attendance_history(id, 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].timestamp, at(18, 0));
        assert_eq!(history[1].timestamp, at(12, 0));
    }
}
