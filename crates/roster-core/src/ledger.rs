//! Attendance ledger: cooldown suppression and entry/exit classification.
//!
//! Classification is a fixed wall-clock window. It does not look at the previous
//! event's category, so two consecutive `entry` events are possible once the
//! cooldown has elapsed inside the day window.

use crate::store::{AttendanceLog, IdentityStore, StoreError};
use crate::types::{AttendanceEvent, Category, IdentityId};
use chrono::{DateTime, Local, NaiveTime, TimeDelta};

/// Default minimum time between two recorded events for one identity.
pub const DEFAULT_COOLDOWN_SECS: i64 = 3600;

/// Half-open local time-of-day window `[start, end)` classified as `entry`.
///
/// A window with `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DayWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

impl Default for DayWindow {
    /// 05:00 to 17:00.
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(5, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceLedger {
    cooldown: TimeDelta,
    day: DayWindow,
}

impl Default for AttendanceLedger {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(DEFAULT_COOLDOWN_SECS), DayWindow::default())
    }
}

impl AttendanceLedger {
    pub fn new(cooldown: TimeDelta, day: DayWindow) -> Self {
        Self { cooldown, day }
    }

    pub fn cooldown(&self) -> TimeDelta {
        self.cooldown
    }

    pub fn day_window(&self) -> DayWindow {
        self.day
    }

    pub fn classify(&self, now: &DateTime<Local>) -> Category {
        if self.day.contains(now.time()) {
            Category::Entry
        } else {
            Category::Exit
        }
    }

    /// Record an event for `identity_id` at `now` unless one was recorded within
    /// the cooldown window. Returns `None` when suppressed.
    ///
    /// The lookup and the insert run inside one exclusive store scope.
    pub fn record<S>(
        &self,
        store: &mut S,
        identity_id: IdentityId,
        now: DateTime<Local>,
    ) -> Result<Option<AttendanceEvent>, StoreError>
    where
        S: IdentityStore + ?Sized,
    {
        let mut check_then_insert = |log: &mut dyn AttendanceLog| -> Result<Option<AttendanceEvent>, StoreError> {
            if let Some(prev) = log.fetch_last_attendance(identity_id)? {
                let elapsed = now.signed_duration_since(prev.timestamp);
                if elapsed < self.cooldown {
                    tracing::info!(
                        id = identity_id,
                        last = %prev.timestamp,
                        elapsed_secs = elapsed.num_seconds(),
                        "attendance suppressed within cooldown"
                    );
                    return Ok(None);
                }
            }

            let category = self.classify(&now);
            let event = log.insert_attendance(identity_id, category, now)?;
            tracing::info!(id = identity_id, %category, at = %now, "attendance recorded");
            Ok(Some(event))
        };
        store.exclusive_attendance(&mut check_then_insert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Descriptor;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 12, h, m, 0).unwrap()
    }

    fn store_with_identity() -> (MemoryStore, IdentityId) {
        let mut store = MemoryStore::new();
        let id = store
            .insert_identity("alice", &Descriptor::new(vec![0.0; 4]))
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_classify_morning_entry_evening_exit() {
        let ledger = AttendanceLedger::default();
        assert_eq!(ledger.classify(&at(9, 0)), Category::Entry);
        assert_eq!(ledger.classify(&at(20, 0)), Category::Exit);
    }

    #[test]
    fn test_classify_half_open_boundaries() {
        let ledger = AttendanceLedger::default();
        assert_eq!(ledger.classify(&at(5, 0)), Category::Entry);
        assert_eq!(ledger.classify(&at(4, 59)), Category::Exit);
        assert_eq!(ledger.classify(&at(16, 59)), Category::Entry);
        assert_eq!(ledger.classify(&at(17, 0)), Category::Exit);
    }

    #[test]
    fn test_wrapping_window() {
        let night = DayWindow::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        );
        assert!(night.contains(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(night.contains(NaiveTime::from_hms_opt(2, 0, 0).unwrap()));
        assert!(!night.contains(NaiveTime::from_hms_opt(6, 0, 0).unwrap()));
        assert!(!night.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn test_second_record_within_cooldown_suppressed() {
        let (mut store, id) = store_with_identity();
        let ledger = AttendanceLedger::default();

        let first = ledger.record(&mut store, id, at(9, 0)).unwrap();
        assert_eq!(first.map(|e| e.category), Some(Category::Entry));

        let second = ledger.record(&mut store, id, at(9, 59)).unwrap();
        assert!(second.is_none());
        assert_eq!(store.events().len(), 1);
    }

    #[test]
    fn test_record_after_cooldown_elapsed() {
        let (mut store, id) = store_with_identity();
        let ledger = AttendanceLedger::default();

        assert!(ledger.record(&mut store, id, at(9, 0)).unwrap().is_some());
        // Exactly one cooldown later is no longer inside the window.
        assert!(ledger.record(&mut store, id, at(10, 0)).unwrap().is_some());
        assert_eq!(store.events().len(), 2);
    }

    #[test]
    fn test_consecutive_entries_allowed() {
        let (mut store, id) = store_with_identity();
        let ledger = AttendanceLedger::default();

        let a = ledger.record(&mut store, id, at(8, 0)).unwrap().unwrap();
        let b = ledger.record(&mut store, id, at(11, 0)).unwrap().unwrap();
        assert_eq!(a.category, Category::Entry);
        assert_eq!(b.category, Category::Entry);
    }

    #[test]
    fn test_cooldown_is_per_identity() {
        let (mut store, alice) = store_with_identity();
        let bob = store
            .insert_identity("bob", &Descriptor::new(vec![1.0; 4]))
            .unwrap();
        let ledger = AttendanceLedger::default();

        assert!(ledger.record(&mut store, alice, at(9, 0)).unwrap().is_some());
        assert!(ledger.record(&mut store, bob, at(9, 1)).unwrap().is_some());
    }

    #[test]
    fn test_custom_cooldown() {
        let (mut store, id) = store_with_identity();
        let ledger = AttendanceLedger::new(TimeDelta::minutes(5), DayWindow::default());

        assert!(ledger.record(&mut store, id, at(9, 0)).unwrap().is_some());
        assert!(ledger.record(&mut store, id, at(9, 4)).unwrap().is_none());
        assert!(ledger.record(&mut store, id, at(9, 5)).unwrap().is_some());
    }

    #[test]
    fn test_persistence_failure_records_nothing() {
        let (mut store, id) = store_with_identity();
        store.set_read_only(true);
        let ledger = AttendanceLedger::default();

        let err = ledger.record(&mut store, id, at(9, 0)).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(store.events().is_empty());
    }
}
