use roster_core::{AttendanceError, Descriptor};
use zbus::interface;

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};

pub const BUS_NAME: &str = "org.freedesktop.Roster1";
pub const OBJECT_PATH: &str = "/org/freedesktop/Roster1";

/// D-Bus interface for the Roster attendance daemon.
///
/// Bus name: org.freedesktop.Roster1
/// Object path: /org/freedesktop/Roster1
///
/// Descriptors travel as `ad`; an empty array means the client's extractor
/// found no face.
pub struct RosterService {
    engine: EngineHandle,
    db_path: String,
    match_threshold: f32,
    extractor_model: String,
}

impl RosterService {
    pub fn new(engine: EngineHandle, config: &Config) -> Self {
        Self {
            engine,
            db_path: config.db_path.display().to_string(),
            match_threshold: config.match_threshold,
            extractor_model: config.extractor_model.clone(),
        }
    }
}

#[interface(name = "org.freedesktop.Roster1")]
impl RosterService {
    /// Enroll a new identity. Returns the identity as JSON.
    async fn enroll(&self, name: &str, descriptor: Vec<f64>) -> zbus::fdo::Result<String> {
        tracing::info!(name, dim = descriptor.len(), "enroll requested");
        let identity = self
            .engine
            .enroll(name.to_string(), descriptor_arg(descriptor))
            .await
            .map_err(to_fdo)?;
        to_json(&identity)
    }

    /// Match a descriptor and record attendance. Returns the outcome as JSON.
    async fn recognize(&self, descriptor: Vec<f64>) -> zbus::fdo::Result<String> {
        tracing::info!(dim = descriptor.len(), "recognize requested");
        let outcome = self
            .engine
            .recognize(descriptor_arg(descriptor))
            .await
            .map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// List enrolled identities (without descriptors).
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        tracing::info!("list_identities requested");
        let identities = self.engine.list_identities().await.map_err(to_fdo)?;
        to_json(&identities)
    }

    /// Most recent attendance events for one identity.
    async fn history(&self, identity_id: i64, limit: u32) -> zbus::fdo::Result<String> {
        tracing::info!(identity_id, limit, "history requested");
        let events = self
            .engine
            .history(identity_id, limit as usize)
            .await
            .map_err(to_fdo)?;
        to_json(&events)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let engine = self.engine.status().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "db_path": self.db_path,
            "identities": engine.identities,
            "descriptor_dim": engine.descriptor_dim,
            "match_threshold": self.match_threshold,
            "cooldown_secs": engine.cooldown_secs,
            "day_start": engine.day_start,
            "day_end": engine.day_end,
            "extractor_model": self.extractor_model,
        })
        .to_string())
    }
}

/// Empty array: no face detected.
fn descriptor_arg(values: Vec<f64>) -> Option<Descriptor> {
    if values.is_empty() {
        return None;
    }
    Some(Descriptor::new(values.into_iter().map(|v| v as f32).collect()))
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    tracing::warn!(error = %err, "request failed");
    match err {
        EngineError::Attendance(
            AttendanceError::NoFaceDetected
            | AttendanceError::EmptyName
            | AttendanceError::Descriptor(_),
        ) => zbus::fdo::Error::InvalidArgs(err.to_string()),
        _ => zbus::fdo::Error::Failed(err.to_string()),
    }
}
