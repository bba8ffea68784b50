use std::path::Path;

use chrono::{DateTime, Local, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use roster_core::store::AttendanceScope;
use roster_core::{
    AttendanceEvent, AttendanceLog, Category, Descriptor, Identity, IdentityId, IdentityStore,
    StoreError,
};

use crate::schema;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Stored timestamp layout: UTC, fixed microsecond precision, so that lexical
/// order in SQL equals chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// SQLite-backed identity and attendance store.
///
/// Owns one connection. The ledger's lookup-then-insert runs inside an
/// `IMMEDIATE` transaction, so separate processes sharing the file cannot both
/// pass the cooldown check.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
        }
        let conn = Connection::open(path).map_err(StoreError::backend)?;
        schema::initialize(&conn).map_err(StoreError::backend)?;
        let version = schema::get_schema_version(&conn).map_err(StoreError::backend)?;
        tracing::info!(path = %path.display(), ?version, "attendance store opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend)?;
        schema::initialize(&conn).map_err(StoreError::backend)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn identity_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))
            .map_err(StoreError::backend)?;
        Ok(count as usize)
    }
}

impl AttendanceLog for SqliteStore {
    fn fetch_last_attendance(&self, identity_id: IdentityId) -> Result<Option<AttendanceEvent>> {
        last_attendance_on(&self.conn, identity_id)
    }

    fn insert_attendance(
        &mut self,
        identity_id: IdentityId,
        category: Category,
        timestamp: DateTime<Local>,
    ) -> Result<AttendanceEvent> {
        insert_attendance_on(&self.conn, identity_id, category, timestamp)
    }
}

impl IdentityStore for SqliteStore {
    fn fetch_all_identities(&self) -> Result<Vec<Identity>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT e.id, e.name, f.encoding
                 FROM employees e JOIN face_encodings f ON e.id = f.employee_id
                 ORDER BY e.id, f.id",
            )
            .map_err(StoreError::backend)?;

        let rows: Vec<(i64, String, Vec<u8>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(StoreError::backend)?
            .collect::<rusqlite::Result<_>>()
            .map_err(StoreError::backend)?;

        let mut identities = Vec::with_capacity(rows.len());
        for (id, name, encoding) in rows {
            match Descriptor::from_bytes(&encoding) {
                Ok(descriptor) => identities.push(Identity {
                    id,
                    name,
                    descriptor,
                }),
                Err(err) => {
                    tracing::warn!(id, error = %err, "skipping unreadable face encoding");
                }
            }
        }
        Ok(identities)
    }

    fn insert_identity(&mut self, name: &str, descriptor: &Descriptor) -> Result<IdentityId> {
        let tx = self.conn.transaction().map_err(StoreError::backend)?;
        tx.execute("INSERT INTO employees (name) VALUES (?1)", [name])
            .map_err(StoreError::backend)?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO face_encodings (employee_id, encoding) VALUES (?1, ?2)",
            params![id, descriptor.to_bytes()],
        )
        .map_err(StoreError::backend)?;
        tx.commit().map_err(StoreError::backend)?;
        Ok(id)
    }

    fn exclusive_attendance(
        &mut self,
        scope: AttendanceScope<'_>,
    ) -> Result<Option<AttendanceEvent>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::backend)?;
        // Dropping `tx` on the error path rolls back.
        let mut log = TxLog { conn: &*tx };
        let event = scope(&mut log)?;
        tx.commit().map_err(StoreError::backend)?;
        Ok(event)
    }

    fn attendance_history(
        &self,
        identity_id: IdentityId,
        limit: usize,
    ) -> Result<Vec<AttendanceEvent>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT employee_id, timestamp, type FROM attendance
                 WHERE employee_id = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2",
            )
            .map_err(StoreError::backend)?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(i64, String, String)> = stmt
            .query_map(params![identity_id, limit], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(StoreError::backend)?
            .collect::<rusqlite::Result<_>>()
            .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|(id, ts, kind)| event_from_row(id, &ts, &kind))
            .collect()
    }
}

/// Attendance view over an open transaction.
struct TxLog<'a> {
    conn: &'a Connection,
}

impl AttendanceLog for TxLog<'_> {
    fn fetch_last_attendance(&self, identity_id: IdentityId) -> Result<Option<AttendanceEvent>> {
        last_attendance_on(self.conn, identity_id)
    }

    fn insert_attendance(
        &mut self,
        identity_id: IdentityId,
        category: Category,
        timestamp: DateTime<Local>,
    ) -> Result<AttendanceEvent> {
        insert_attendance_on(self.conn, identity_id, category, timestamp)
    }
}

fn last_attendance_on(conn: &Connection, identity_id: IdentityId) -> Result<Option<AttendanceEvent>> {
    let row: Option<(i64, String, String)> = conn
        .query_row(
            "SELECT employee_id, timestamp, type FROM attendance
             WHERE employee_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT 1",
            [identity_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(StoreError::backend)?;

    row.map(|(id, ts, kind)| event_from_row(id, &ts, &kind))
        .transpose()
}

fn insert_attendance_on(
    conn: &Connection,
    identity_id: IdentityId,
    category: Category,
    timestamp: DateTime<Local>,
) -> Result<AttendanceEvent> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM employees WHERE id = ?1",
            [identity_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::backend)?;
    if exists.is_none() {
        return Err(StoreError::UnknownIdentity(identity_id));
    }

    // Persist at the stored precision so the returned event equals what a
    // later read yields.
    let timestamp = timestamp.trunc_subsecs(6);
    conn.execute(
        "INSERT INTO attendance (employee_id, timestamp, type) VALUES (?1, ?2, ?3)",
        params![identity_id, format_timestamp(&timestamp), category.as_str()],
    )
    .map_err(StoreError::backend)?;

    Ok(AttendanceEvent {
        identity_id,
        timestamp,
        category,
    })
}

fn format_timestamp(ts: &DateTime<Local>) -> String {
    ts.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| StoreError::Corrupt(format!("attendance timestamp {s:?}: {e}")))
}

fn event_from_row(identity_id: IdentityId, ts: &str, kind: &str) -> Result<AttendanceEvent> {
    Ok(AttendanceEvent {
        identity_id,
        timestamp: parse_timestamp(ts)?,
        category: kind.parse().map_err(StoreError::Corrupt)?,
    })
}
