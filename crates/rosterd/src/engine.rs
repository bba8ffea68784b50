use roster_core::{
    Attendance, AttendanceError, AttendanceEvent, Descriptor, Identity, IdentityId, Recognition,
};
use roster_store::SqliteStore;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::notify::Notifier;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Attendance(#[from] AttendanceError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Counters and effective settings of the running engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub identities: usize,
    pub descriptor_dim: usize,
    pub cooldown_secs: i64,
    pub day_start: String,
    pub day_end: String,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        name: String,
        descriptor: Option<Descriptor>,
        reply: oneshot::Sender<Result<Identity, EngineError>>,
    },
    Recognize {
        descriptor: Option<Descriptor>,
        reply: oneshot::Sender<Result<Recognition, EngineError>>,
    },
    ListIdentities {
        reply: oneshot::Sender<Result<Vec<Identity>, EngineError>>,
    },
    History {
        identity_id: IdentityId,
        limit: usize,
        reply: oneshot::Sender<Result<Vec<AttendanceEvent>, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<Result<EngineStatus, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Enroll `name` with an extracted descriptor (`None`: no face found).
    pub async fn enroll(
        &self,
        name: String,
        descriptor: Option<Descriptor>,
    ) -> Result<Identity, EngineError> {
        self.request(|reply| EngineRequest::Enroll {
            name,
            descriptor,
            reply,
        })
        .await
    }

    /// Match a descriptor and record attendance for the identity found.
    pub async fn recognize(&self, descriptor: Option<Descriptor>) -> Result<Recognition, EngineError> {
        self.request(|reply| EngineRequest::Recognize { descriptor, reply })
            .await
    }

    pub async fn list_identities(&self) -> Result<Vec<Identity>, EngineError> {
        self.request(|reply| EngineRequest::ListIdentities { reply })
            .await
    }

    pub async fn history(
        &self,
        identity_id: IdentityId,
        limit: usize,
    ) -> Result<Vec<AttendanceEvent>, EngineError> {
        self.request(|reply| EngineRequest::History {
            identity_id,
            limit,
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply })
            .await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the attendance service and its store connection, and handles
/// one request at a time, so the ledger's check-then-insert never interleaves
/// within this process. The thread exits once every handle is dropped.
pub fn spawn_engine<N>(
    mut service: Attendance<SqliteStore>,
    notifier: N,
) -> Result<EngineHandle, EngineError>
where
    N: Notifier + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("roster-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        name,
                        descriptor,
                        reply,
                    } => {
                        let result = service.enroll(&name, descriptor).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Recognize { descriptor, reply } => {
                        let result = run_recognize(&mut service, &notifier, descriptor);
                        let _ = reply.send(result);
                    }
                    EngineRequest::ListIdentities { reply } => {
                        let _ = reply.send(service.identities().map_err(EngineError::from));
                    }
                    EngineRequest::History {
                        identity_id,
                        limit,
                        reply,
                    } => {
                        let result = service
                            .history(identity_id, limit)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(engine_status(&service));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn engine_status(service: &Attendance<SqliteStore>) -> Result<EngineStatus, EngineError> {
    let identities = service
        .store()
        .identity_count()
        .map_err(|e| EngineError::Attendance(e.into()))?;
    let ledger = service.ledger();
    let day = ledger.day_window();
    Ok(EngineStatus {
        identities,
        descriptor_dim: service.descriptor_dim(),
        cooldown_secs: ledger.cooldown().num_seconds(),
        day_start: day.start.format("%H:%M").to_string(),
        day_end: day.end.format("%H:%M").to_string(),
    })
}

/// Recognize, then announce only events that were actually recorded.
fn run_recognize(
    service: &mut Attendance<SqliteStore>,
    notifier: &impl Notifier,
    descriptor: Option<Descriptor>,
) -> Result<Recognition, EngineError> {
    let outcome = service.recognize(descriptor)?;
    match &outcome {
        Recognition::Matched {
            identity,
            event: Some(event),
            ..
        } => notifier.announce(&identity.name, event.category),
        Recognition::Matched { identity, event: None, .. } => {
            tracing::debug!(id = identity.id, "recognize: already recorded, not announcing");
        }
        Recognition::Unmatched | Recognition::NoFaceDetected => {}
    }
    Ok(outcome)
}
