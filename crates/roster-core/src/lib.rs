//! roster-core — Face descriptor matching and attendance deduplication.
//!
//! Consumes descriptors from an external extractor, finds the nearest enrolled
//! identity within an acceptance threshold, and records entry/exit events with a
//! per-identity cooldown.

pub mod attendance;
pub mod extractor;
pub mod ledger;
pub mod matcher;
pub mod store;
pub mod types;

pub use attendance::{Attendance, AttendanceError, Recognition};
pub use extractor::Extractor;
pub use ledger::{AttendanceLedger, DayWindow};
pub use matcher::{EuclideanMatcher, Match, Matcher};
pub use store::{AttendanceLog, IdentityStore, MemoryStore, StoreError};
pub use types::{AttendanceEvent, Category, Descriptor, DescriptorError, Identity, IdentityId};

/// Default descriptor dimensionality (Facenet).
pub const DEFAULT_DESCRIPTOR_DIM: usize = 128;
