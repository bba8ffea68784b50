//! roster-store — SQLite persistence for enrolled identities and attendance.

pub mod schema;
pub mod store;

pub use store::SqliteStore;
