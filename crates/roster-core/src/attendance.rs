//! Orchestrator for enrollment and recognition requests.

use crate::ledger::AttendanceLedger;
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::store::{IdentityStore, StoreError};
use crate::types::{AttendanceEvent, Descriptor, DescriptorError, Identity, IdentityId};
use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("identity name must not be empty")]
    EmptyName,
    #[error("{0}")]
    Descriptor(#[from] DescriptorError),
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

/// Result of a recognition request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Recognition {
    /// Identity found. `event` is `None` when the cooldown suppressed recording.
    Matched {
        identity: Identity,
        distance: f32,
        event: Option<AttendanceEvent>,
    },
    Unmatched,
    NoFaceDetected,
}

impl Recognition {
    /// Matched, but no event was written because of the cooldown.
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Recognition::Matched { event: None, .. })
    }
}

/// Sequences matcher and ledger over an injected store.
///
/// Both entry points read then write the store, so callers must not run two
/// requests against the same instance concurrently; `&mut self` enforces this
/// within a process.
pub struct Attendance<S, M = EuclideanMatcher> {
    store: S,
    matcher: M,
    ledger: AttendanceLedger,
    descriptor_dim: usize,
}

impl<S: IdentityStore, M: Matcher> Attendance<S, M> {
    pub fn new(store: S, matcher: M, ledger: AttendanceLedger, descriptor_dim: usize) -> Self {
        Self {
            store,
            matcher,
            ledger,
            descriptor_dim,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    pub fn descriptor_dim(&self) -> usize {
        self.descriptor_dim
    }

    /// Enroll `name` with the descriptor extracted from the enrollment frame.
    ///
    /// `None` means the extractor found no face.
    pub fn enroll(
        &mut self,
        name: &str,
        descriptor: Option<Descriptor>,
    ) -> Result<Identity, AttendanceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AttendanceError::EmptyName);
        }
        let descriptor = descriptor.ok_or(AttendanceError::NoFaceDetected)?;
        descriptor.check_dim(self.descriptor_dim)?;

        let id = self.store.insert_identity(name, &descriptor)?;
        tracing::info!(id, name, "identity enrolled");

        Ok(Identity {
            id,
            name: name.to_string(),
            descriptor,
        })
    }

    /// Recognize at the current local time.
    pub fn recognize(
        &mut self,
        descriptor: Option<Descriptor>,
    ) -> Result<Recognition, AttendanceError> {
        self.recognize_at(descriptor, Local::now())
    }

    pub fn recognize_at(
        &mut self,
        descriptor: Option<Descriptor>,
        now: DateTime<Local>,
    ) -> Result<Recognition, AttendanceError> {
        let Some(query) = descriptor else {
            tracing::debug!("recognize: no face detected");
            return Ok(Recognition::NoFaceDetected);
        };
        query.check_dim(self.descriptor_dim)?;

        let candidates = self.store.fetch_all_identities()?;
        let Some(found) = self.matcher.best_match(&query, &candidates) else {
            tracing::info!(candidates = candidates.len(), "recognize: no enrolled identity within threshold");
            return Ok(Recognition::Unmatched);
        };
        let identity = found.identity.clone();
        let distance = found.distance;
        tracing::info!(id = identity.id, name = %identity.name, distance, "recognize: matched");

        let event = self.ledger.record(&mut self.store, identity.id, now)?;
        Ok(Recognition::Matched {
            identity,
            distance,
            event,
        })
    }

    pub fn identities(&self) -> Result<Vec<Identity>, AttendanceError> {
        Ok(self.store.fetch_all_identities()?)
    }

    pub fn history(
        &self,
        identity_id: IdentityId,
        limit: usize,
    ) -> Result<Vec<AttendanceEvent>, AttendanceError> {
        Ok(self.store.attendance_history(identity_id, limit)?)
    }
}
