//! DispatchSession domain type
//!
//! One emergency request's lifecycle, driven by a fixed transition table:
//!
//! ```text
//! Idle --create_request--> Requested --match_found--> Notified --provider_accepts--> Accepted
//!  ^                           |                          |------provider_rejects--> Rejected
//!  +------match_not_found------+                          |------timeout_elapses---> TimedOut
//!                  Requested | Notified --user_cancels--> Cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ProviderId, SessionId};
use super::provider::Provider;
use super::request::DispatchRequest;
use crate::error::{DispatchError, DispatchResult};

/// Dispatch session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    /// No active request
    #[default]
    Idle,
    /// SOS triggered, matching in progress
    Requested,
    /// Provider matched and notified, awaiting a response
    Notified,
    /// Provider accepted
    Accepted,
    /// Provider declined
    Rejected,
    /// Provider did not respond in time
    TimedOut,
    /// Requester withdrew the request
    Cancelled,
}

impl DispatchState {
    /// Next state for an event, or None if the event does not apply
    pub fn next(self, event: DispatchEvent) -> Option<DispatchState> {
        use DispatchEvent::*;
        use DispatchState::*;

        match (self, event) {
            (Idle, CreateRequest) => Some(Requested),
            (Requested, MatchFound) => Some(Notified),
            (Requested, MatchNotFound) => Some(Idle),
            (Notified, ProviderAccepts) => Some(Accepted),
            (Notified, ProviderRejects) => Some(Rejected),
            (Notified, TimeoutElapses) => Some(TimedOut),
            (Requested | Notified, UserCancels) => Some(Cancelled),
            _ => None,
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DispatchState::Accepted | DispatchState::Rejected | DispatchState::TimedOut | DispatchState::Cancelled
        )
    }

    /// Requested or Notified
    pub fn is_active(self) -> bool {
        matches!(self, DispatchState::Requested | DispatchState::Notified)
    }

    /// Terminal states that hand the matched provider back to the pool
    ///
    /// Accepted is excluded: the provider is still engaged in the encounter.
    pub fn releases_provider(self) -> bool {
        matches!(
            self,
            DispatchState::Rejected | DispatchState::TimedOut | DispatchState::Cancelled
        )
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Requested => write!(f, "requested"),
            Self::Notified => write!(f, "notified"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Events that drive a session between states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchEvent {
    CreateRequest,
    MatchFound,
    MatchNotFound,
    ProviderAccepts,
    ProviderRejects,
    TimeoutElapses,
    UserCancels,
}

impl std::fmt::Display for DispatchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateRequest => write!(f, "create_request"),
            Self::MatchFound => write!(f, "match_found"),
            Self::MatchNotFound => write!(f, "match_not_found"),
            Self::ProviderAccepts => write!(f, "provider_accepts"),
            Self::ProviderRejects => write!(f, "provider_rejects"),
            Self::TimeoutElapses => write!(f, "timeout_elapses"),
            Self::UserCancels => write!(f, "user_cancels"),
        }
    }
}

/// Lifecycle record of one emergency request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSession {
    id: SessionId,
    request: DispatchRequest,
    state: DispatchState,

    /// Snapshot of the provider at match time
    matched_provider: Option<Provider>,

    /// Great-circle distance from requester to the matched provider
    distance_km: Option<f64>,

    /// Deadline for the provider's response (set on match)
    respond_by: Option<DateTime<Utc>>,

    /// Providers that may not be offered this request (earlier rejections)
    excluded: Vec<ProviderId>,

    /// Session this one re-matches after a rejection
    predecessor: Option<SessionId>,

    /// Session created to re-match after this one was rejected
    successor: Option<SessionId>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl DispatchSession {
    /// Create a session in Idle for a request
    pub fn new(request: DispatchRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(),
            request,
            state: DispatchState::Idle,
            matched_provider: None,
            distance_km: None,
            respond_by: None,
            excluded: Vec::new(),
            predecessor: None,
            successor: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    /// Builder method to link a re-match to the session it replaces
    pub fn with_predecessor(mut self, predecessor: SessionId, excluded: Vec<ProviderId>) -> Self {
        self.predecessor = Some(predecessor);
        self.excluded = excluded;
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn request(&self) -> &DispatchRequest {
        &self.request
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn matched_provider(&self) -> Option<&Provider> {
        self.matched_provider.as_ref()
    }

    pub fn distance_km(&self) -> Option<f64> {
        self.distance_km
    }

    pub fn respond_by(&self) -> Option<DateTime<Utc>> {
        self.respond_by
    }

    pub fn excluded(&self) -> &[ProviderId] {
        &self.excluded
    }

    pub fn predecessor(&self) -> Option<&SessionId> {
        self.predecessor.as_ref()
    }

    pub fn successor(&self) -> Option<&SessionId> {
        self.successor.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// When the session stopped changing: resolution time for terminal
    /// sessions, last update for unmatched (Idle) ones, None while active
    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            DispatchState::Idle => Some(self.updated_at),
            state if state.is_terminal() => self.resolved_at,
            _ => None,
        }
    }

    /// Notified and past the response deadline
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state == DispatchState::Notified && self.respond_by.is_some_and(|deadline| now >= deadline)
    }

    /// Idle -> Requested
    pub fn create_request(&mut self, now: DateTime<Utc>) -> DispatchResult<()> {
        self.apply(DispatchEvent::CreateRequest, now)
    }

    /// Requested -> Notified, recording the match and the response deadline
    pub fn match_found(
        &mut self,
        provider: Provider,
        distance_km: f64,
        respond_by: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DispatchResult<()> {
        self.apply(DispatchEvent::MatchFound, now)?;
        self.matched_provider = Some(provider);
        self.distance_km = Some(distance_km);
        self.respond_by = Some(respond_by);
        Ok(())
    }

    /// Requested -> Idle
    pub fn match_not_found(&mut self, now: DateTime<Utc>) -> DispatchResult<()> {
        self.apply(DispatchEvent::MatchNotFound, now)
    }

    /// Notified -> Accepted
    pub fn accept(&mut self, now: DateTime<Utc>) -> DispatchResult<()> {
        self.apply(DispatchEvent::ProviderAccepts, now)
    }

    /// Notified -> Rejected
    pub fn reject(&mut self, now: DateTime<Utc>) -> DispatchResult<()> {
        self.apply(DispatchEvent::ProviderRejects, now)
    }

    /// Notified -> TimedOut, only once `now >= respond_by`
    pub fn time_out(&mut self, now: DateTime<Utc>) -> DispatchResult<()> {
        if self.state == DispatchState::Notified && !self.is_overdue(now) {
            return Err(DispatchError::InvalidTransition {
                from: self.state,
                event: DispatchEvent::TimeoutElapses,
            });
        }
        self.apply(DispatchEvent::TimeoutElapses, now)
    }

    /// Requested | Notified -> Cancelled
    pub fn cancel(&mut self, now: DateTime<Utc>) -> DispatchResult<()> {
        self.apply(DispatchEvent::UserCancels, now)
    }

    pub(crate) fn set_successor(&mut self, successor: SessionId) {
        self.successor = Some(successor);
    }

    fn apply(&mut self, event: DispatchEvent, now: DateTime<Utc>) -> DispatchResult<()> {
        let next = self.state.next(event).ok_or(DispatchError::InvalidTransition {
            from: self.state,
            event,
        })?;
        self.state = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.resolved_at = Some(now);
        }
        Ok(())
    }
}
