//! Message types for the Coordinator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::domain::{DispatchEvent, DispatchSession, DispatchState, Provider, ProviderId, SessionId};
use crate::error::DispatchResult;
use crate::geo::Coordinate;

/// State change broadcast to observers (UI layer, notifier, logs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "session-id")]
    pub session_id: SessionId,
    pub event: DispatchEvent,
    pub from: DispatchState,
    pub to: DispatchState,
    #[serde(rename = "provider-id")]
    pub provider_id: Option<ProviderId>,
    pub at: DateTime<Utc>,
}

impl SessionEvent {
    pub(crate) fn from_session(
        session: &DispatchSession,
        event: DispatchEvent,
        from: DispatchState,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session.id().clone(),
            event,
            from,
            to: session.state(),
            provider_id: session.matched_provider().map(|p| p.id.clone()),
            at,
        }
    }
}

/// Internal requests to the Coordinator task
#[derive(Debug)]
pub enum CoordRequest {
    /// Trigger SOS for a requester location (None: location not resolved)
    StartEmergency {
        location: Option<Coordinate>,
        reply: oneshot::Sender<DispatchResult<SessionId>>,
    },

    /// Read one session
    GetSession {
        session_id: SessionId,
        reply: oneshot::Sender<DispatchResult<DispatchSession>>,
    },

    /// Read all sessions, optionally only the active ones
    ListSessions {
        active_only: bool,
        reply: oneshot::Sender<Vec<DispatchSession>>,
    },

    /// Provider accepted or rejected a notified session
    RecordResponse {
        session_id: SessionId,
        accepted: bool,
        reply: oneshot::Sender<DispatchResult<()>>,
    },

    /// Requester withdrew
    Cancel {
        session_id: SessionId,
        reply: oneshot::Sender<DispatchResult<()>>,
    },

    /// Time out overdue sessions as of `now`
    Tick {
        now: DateTime<Utc>,
        reply: oneshot::Sender<Vec<SessionId>>,
    },

    /// Snapshot of the registry
    ListProviders { reply: oneshot::Sender<Vec<Provider>> },

    /// Registry-level availability change
    SetProviderAvailability {
        provider_id: ProviderId,
        available: bool,
        reply: oneshot::Sender<DispatchResult<()>>,
    },

    /// Get current metrics
    GetMetrics { reply: oneshot::Sender<DispatchMetrics> },

    /// Shutdown the coordinator
    Shutdown,
}

/// Dispatch counters for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchMetrics {
    pub sessions_started: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub rematched: u64,
    pub notify_failures: u64,
    pub active_sessions: usize,
}
