//! CoordinatorHandle - Client interface for the UI layer and transports

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use super::messages::{CoordRequest, DispatchMetrics, SessionEvent};
use crate::domain::{DispatchSession, Provider, ProviderId, SessionId};
use crate::error::{DispatchError, DispatchResult};
use crate::geo::Coordinate;

/// Handle for callers to interact with the Coordinator
///
/// This handle is cloneable; every clone talks to the same Coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    /// Sender to the Coordinator task
    tx: mpsc::Sender<CoordRequest>,

    /// Source of session event subscriptions
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>, event_tx: broadcast::Sender<SessionEvent>) -> Self {
        Self { tx, event_tx }
    }

    /// Send a request and wait for its reply
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> CoordRequest) -> DispatchResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| DispatchError::ChannelError)?;
        reply_rx.await.map_err(|_| DispatchError::ChannelError)
    }

    /// Trigger SOS for the requester's location
    ///
    /// Pass `None` when the device location could not be resolved; the call
    /// then fails with `LocationUnavailable`.
    pub async fn start_emergency(&self, location: Option<Coordinate>) -> DispatchResult<SessionId> {
        debug!(?location, "CoordinatorHandle::start_emergency: called");
        self.request(|reply| CoordRequest::StartEmergency { location, reply })
            .await?
    }

    /// Read a session
    pub async fn get_session(&self, session_id: &SessionId) -> DispatchResult<DispatchSession> {
        debug!(%session_id, "CoordinatorHandle::get_session: called");
        self.request(|reply| CoordRequest::GetSession {
            session_id: session_id.clone(),
            reply,
        })
        .await?
    }

    /// List sessions, optionally only the active ones
    pub async fn list_sessions(&self, active_only: bool) -> DispatchResult<Vec<DispatchSession>> {
        debug!(active_only, "CoordinatorHandle::list_sessions: called");
        self.request(|reply| CoordRequest::ListSessions { active_only, reply })
            .await
    }

    /// Record whether the notified provider accepted
    pub async fn record_provider_response(&self, session_id: &SessionId, accepted: bool) -> DispatchResult<()> {
        debug!(%session_id, accepted, "CoordinatorHandle::record_provider_response: called");
        self.request(|reply| CoordRequest::RecordResponse {
            session_id: session_id.clone(),
            accepted,
            reply,
        })
        .await?
    }

    /// Withdraw an emergency
    pub async fn cancel(&self, session_id: &SessionId) -> DispatchResult<()> {
        debug!(%session_id, "CoordinatorHandle::cancel: called");
        self.request(|reply| CoordRequest::Cancel {
            session_id: session_id.clone(),
            reply,
        })
        .await?
    }

    /// Time out overdue sessions as of `now`; returns the sessions that timed out
    pub async fn tick(&self, now: DateTime<Utc>) -> DispatchResult<Vec<SessionId>> {
        self.request(|reply| CoordRequest::Tick { now, reply }).await
    }

    /// Snapshot of all providers
    pub async fn list_providers(&self) -> DispatchResult<Vec<Provider>> {
        debug!("CoordinatorHandle::list_providers: called");
        self.request(|reply| CoordRequest::ListProviders { reply }).await
    }

    /// Registry-level availability change
    pub async fn set_provider_availability(&self, provider_id: &ProviderId, available: bool) -> DispatchResult<()> {
        debug!(%provider_id, available, "CoordinatorHandle::set_provider_availability: called");
        self.request(|reply| CoordRequest::SetProviderAvailability {
            provider_id: provider_id.clone(),
            available,
            reply,
        })
        .await?
    }

    /// Get current dispatch metrics
    pub async fn metrics(&self) -> DispatchResult<DispatchMetrics> {
        self.request(|reply| CoordRequest::GetMetrics { reply }).await
    }

    /// Subscribe to session state changes
    ///
    /// Only events published after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Request shutdown of the Coordinator
    pub async fn shutdown(&self) -> DispatchResult<()> {
        debug!("CoordinatorHandle::shutdown: called");
        self.tx
            .send(CoordRequest::Shutdown)
            .await
            .map_err(|_| DispatchError::ChannelError)
    }
}
