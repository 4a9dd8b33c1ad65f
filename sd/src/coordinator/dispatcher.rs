//! Dispatcher - synchronous dispatch core owned by the Coordinator task
//!
//! Holds the registry and the session table. Every operation takes the
//! current time as an argument; nothing here sleeps, spawns or reads the
//! wall clock. State changes are queued as `SessionEvent`s for the owner to
//! drain and publish.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::messages::{DispatchMetrics, SessionEvent};
use crate::domain::{DispatchEvent, DispatchRequest, DispatchSession, DispatchState, Provider, ProviderId, SessionId};
use crate::error::{DispatchError, DispatchResult};
use crate::geo::Coordinate;
use crate::matcher::MatchEngine;
use crate::registry::ProviderRegistry;

/// Session table plus provider registry
pub struct Dispatcher {
    config: CoordinatorConfig,
    engine: MatchEngine,
    registry: Box<dyn ProviderRegistry>,
    sessions: HashMap<SessionId, DispatchSession>,
    /// Providers matched to an active session
    engaged: HashMap<ProviderId, SessionId>,
    events: Vec<SessionEvent>,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    /// Create a dispatcher over a registry
    pub fn new(config: CoordinatorConfig, registry: impl ProviderRegistry + 'static) -> Self {
        debug!(?config, "Dispatcher::new: called");
        Self {
            engine: config.match_engine(),
            config,
            registry: Box::new(registry),
            sessions: HashMap::new(),
            engaged: HashMap::new(),
            events: Vec::new(),
            metrics: DispatchMetrics::default(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Trigger SOS: create the request and session, then match synchronously
    ///
    /// Fails without creating a session when the location is missing or
    /// malformed. "Nobody available" succeeds; the session rests in Idle.
    pub fn start_emergency(&mut self, location: Option<Coordinate>, now: DateTime<Utc>) -> DispatchResult<SessionId> {
        debug!(?location, "start_emergency: called");
        let location = location.ok_or(DispatchError::LocationUnavailable)?;
        let request = DispatchRequest::new(location, now)?;

        let session_id = self.open_session(DispatchSession::new(request, now), now)?;
        self.metrics.sessions_started += 1;
        info!(%session_id, %location, "Emergency started");
        Ok(session_id)
    }

    /// Read a session
    pub fn get_session(&self, session_id: &SessionId) -> DispatchResult<DispatchSession> {
        self.sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| DispatchError::session_not_found(session_id))
    }

    /// All sessions in creation order
    pub fn list_sessions(&self, active_only: bool) -> Vec<DispatchSession> {
        let mut sessions: Vec<DispatchSession> = self
            .sessions
            .values()
            .filter(|s| !active_only || s.is_active())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.id().cmp(b.id())));
        sessions
    }

    /// Record the notified provider's answer
    pub fn record_provider_response(
        &mut self,
        session_id: &SessionId,
        accepted: bool,
        now: DateTime<Utc>,
    ) -> DispatchResult<()> {
        debug!(%session_id, accepted, "record_provider_response: called");
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DispatchError::session_not_found(session_id))?;

        let from = session.state();
        let event = if accepted {
            session.accept(now)?;
            DispatchEvent::ProviderAccepts
        } else {
            session.reject(now)?;
            DispatchEvent::ProviderRejects
        };
        let provider_id = session.matched_provider().map(|p| p.id.clone());
        self.events.push(SessionEvent::from_session(session, event, from, now));

        if accepted {
            self.metrics.accepted += 1;
            // Still unavailable in the registry, but no longer tied to an active session
            if let Some(id) = &provider_id {
                self.engaged.remove(id);
            }
            info!(%session_id, provider_id = ?provider_id, "Provider accepted");
            return Ok(());
        }

        self.metrics.rejected += 1;
        info!(%session_id, provider_id = ?provider_id, "Provider rejected");
        self.release(session_id);

        if self.config.rematch_on_reject {
            self.rematch(session_id, provider_id, now);
        }
        Ok(())
    }

    /// Withdraw a request that has not reached a terminal state
    pub fn cancel(&mut self, session_id: &SessionId, now: DateTime<Utc>) -> DispatchResult<()> {
        debug!(%session_id, "cancel: called");
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DispatchError::session_not_found(session_id))?;

        let from = session.state();
        session.cancel(now)?;
        let provider_id = session.matched_provider().map(|p| p.id.clone());
        self.events
            .push(SessionEvent::from_session(session, DispatchEvent::UserCancels, from, now));

        self.metrics.cancelled += 1;
        info!(%session_id, provider_id = ?provider_id, "Emergency cancelled");
        self.release(session_id);
        Ok(())
    }

    /// Time out every notified session whose deadline has passed
    ///
    /// Returns the sessions that transitioned on this call; calling again
    /// with the same `now` returns nothing. Settled sessions older than
    /// `session-retention-secs` are dropped on the way out.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<SessionId> {
        let mut overdue: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.is_overdue(now))
            .map(|s| s.id().clone())
            .collect();
        overdue.sort();

        let mut timed_out = Vec::with_capacity(overdue.len());
        for session_id in overdue {
            let Some(session) = self.sessions.get_mut(&session_id) else {
                continue;
            };
            let from = session.state();
            if let Err(e) = session.time_out(now) {
                warn!(%session_id, error = %e, "Failed to time out session");
                continue;
            }
            let provider_id = session.matched_provider().map(|p| p.id.clone());
            self.events
                .push(SessionEvent::from_session(session, DispatchEvent::TimeoutElapses, from, now));

            self.metrics.timed_out += 1;
            warn!(%session_id, provider_id = ?provider_id, "Provider response timed out");
            self.release(&session_id);
            timed_out.push(session_id);
        }

        self.prune_settled(now);
        timed_out
    }

    /// Registry snapshot as a list
    pub fn providers(&self) -> Vec<Provider> {
        self.registry.list().to_vec()
    }

    /// Registry-level availability change
    ///
    /// A provider tied to an active session stays out of matching until that
    /// session resolves, whatever the flag says.
    pub fn set_provider_availability(&mut self, provider_id: &ProviderId, available: bool) -> DispatchResult<()> {
        debug!(%provider_id, available, "set_provider_availability: called");
        if available && let Some(session_id) = self.engaged.get(provider_id) {
            warn!(%provider_id, %session_id, "Provider marked available while engaged in an active session");
        }
        self.registry.set_availability(provider_id, available)
    }

    /// Current counters
    pub fn metrics(&self) -> DispatchMetrics {
        DispatchMetrics {
            active_sessions: self.sessions.values().filter(|s| s.is_active()).count(),
            ..self.metrics.clone()
        }
    }

    /// Count a failed notification delivery
    pub fn record_notify_failure(&mut self) {
        self.metrics.notify_failures += 1;
    }

    /// Take the queued state-change events
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Move a fresh session to Requested, match it, and store it
    ///
    /// The session is stored only if every step succeeds.
    fn open_session(&mut self, mut session: DispatchSession, now: DateTime<Utc>) -> DispatchResult<SessionId> {
        let session_id = session.id().clone();
        let location = session.request().requester_location();

        session.create_request(now)?;
        let created = SessionEvent::from_session(&session, DispatchEvent::CreateRequest, DispatchState::Idle, now);

        let snapshot = self.registry.list();
        let candidates = snapshot
            .iter()
            .filter(|p| !self.engaged.contains_key(&p.id) && !session.excluded().contains(&p.id));
        let found = self.engine.find_nearest(&location, candidates)?;

        let outcome = match found {
            Some(m) => {
                let mut provider = m.provider;
                provider.available = false;
                let provider_id = provider.id.clone();
                let respond_by = now
                    .checked_add_signed(self.config.response_window())
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);

                session.match_found(provider, m.distance_km, respond_by, now)?;
                self.registry.set_availability(&provider_id, false)?;
                self.engaged.insert(provider_id.clone(), session_id.clone());
                self.metrics.matched += 1;
                info!(%session_id, %provider_id, distance_km = m.distance_km, %respond_by, "Provider matched");
                SessionEvent::from_session(&session, DispatchEvent::MatchFound, DispatchState::Requested, now)
            }
            None => {
                session.match_not_found(now)?;
                self.metrics.unmatched += 1;
                info!(%session_id, "No provider currently available");
                SessionEvent::from_session(&session, DispatchEvent::MatchNotFound, DispatchState::Requested, now)
            }
        };

        self.events.push(created);
        self.events.push(outcome);
        self.sessions.insert(session_id.clone(), session);
        Ok(session_id)
    }

    /// Drop sessions that settled longer ago than the retention window
    fn prune_settled(&mut self, now: DateTime<Utc>) {
        let retention = self.config.session_retention();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            session
                .settled_at()
                .is_none_or(|at| now.signed_duration_since(at) < retention)
        });
        let pruned = before - self.sessions.len();
        if pruned > 0 {
            info!(pruned, "Pruned settled sessions");
        }
    }

    /// Hand a provider back to the pool after a releasing terminal state
    fn release(&mut self, session_id: &SessionId) {
        let Some(session) = self.sessions.get(session_id) else {
            return;
        };
        if !session.state().releases_provider() {
            return;
        }
        let Some(provider_id) = session.matched_provider().map(|p| p.id.clone()) else {
            return;
        };
        if self.engaged.get(&provider_id) == Some(session_id) {
            self.engaged.remove(&provider_id);
        }
        // Removal from the registry is independent of sessions
        if let Err(e) = self.registry.set_availability(&provider_id, true) {
            warn!(%provider_id, error = %e, "Could not release provider");
        } else {
            debug!(%provider_id, "release: provider available again");
        }
    }

    /// Open a successor session that skips every provider that rejected
    fn rematch(&mut self, session_id: &SessionId, rejected_by: Option<ProviderId>, now: DateTime<Utc>) {
        let Some(previous) = self.sessions.get(session_id) else {
            return;
        };
        let mut excluded = previous.excluded().to_vec();
        excluded.extend(rejected_by);

        if excluded.len() > self.config.max_rematch_attempts as usize {
            info!(%session_id, attempts = excluded.len() - 1, "Re-match limit reached");
            return;
        }

        let successor = DispatchSession::new(previous.request().clone(), now).with_predecessor(session_id.clone(), excluded);
        match self.open_session(successor, now) {
            Ok(successor_id) => {
                self.metrics.rematched += 1;
                info!(%session_id, %successor_id, "Re-matching after rejection");
                if let Some(previous) = self.sessions.get_mut(session_id) {
                    previous.set_successor(successor_id);
                }
            }
            Err(e) => warn!(%session_id, error = %e, "Re-match failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use chrono::Duration;

    const ORIGIN: Coordinate = Coordinate {
        latitude: 40.7736,
        longitude: -73.9749,
    };

    fn north_of_origin(id: &str, km: f64, available: bool) -> Provider {
        let lat = ORIGIN.latitude + km / 111.195;
        Provider::new(id, id.to_uppercase(), Coordinate::new(lat, ORIGIN.longitude).unwrap()).with_available(available)
    }

    fn dispatcher(providers: Vec<Provider>) -> Dispatcher {
        dispatcher_with(CoordinatorConfig::default(), providers)
    }

    fn dispatcher_with(config: CoordinatorConfig, providers: Vec<Provider>) -> Dispatcher {
        Dispatcher::new(config, InMemoryRegistry::from_providers(providers).unwrap())
    }

    fn available(d: &Dispatcher, id: &str) -> bool {
        d.providers().iter().find(|p| p.id.as_str() == id).unwrap().available
    }

    #[test]
    fn test_scenario_a_skips_unavailable_nearer_provider() {
        let mut d = dispatcher(vec![north_of_origin("p1", 5.0, true), north_of_origin("p2", 2.0, false)]);
        let now = Utc::now();

        let id = d.start_emergency(Some(ORIGIN), now).unwrap();
        let session = d.get_session(&id).unwrap();

        assert_eq!(session.state(), DispatchState::Notified);
        assert_eq!(session.matched_provider().unwrap().id.as_str(), "p1");
        assert!((session.distance_km().unwrap() - 5.0).abs() < 0.01);
        assert_eq!(session.respond_by(), Some(now + Duration::seconds(180)));
        assert!(!available(&d, "p1"));
    }

    #[test]
    fn test_scenario_b_no_provider_is_not_an_error() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, false)]);
        let id = d.start_emergency(Some(ORIGIN), Utc::now()).unwrap();

        let session = d.get_session(&id).unwrap();
        assert_eq!(session.state(), DispatchState::Idle);
        assert!(session.matched_provider().is_none());
        assert_eq!(d.metrics().unmatched, 1);
        assert_eq!(d.metrics().active_sessions, 0);
    }

    #[test]
    fn test_scenario_c_timeout_is_idempotent() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true)]);
        let now = Utc::now();
        let id = d.start_emergency(Some(ORIGIN), now).unwrap();
        let respond_by = d.get_session(&id).unwrap().respond_by().unwrap();

        assert!(d.tick(respond_by - Duration::seconds(1)).is_empty());

        let later = respond_by + Duration::seconds(1);
        assert_eq!(d.tick(later), vec![id.clone()]);
        assert_eq!(d.get_session(&id).unwrap().state(), DispatchState::TimedOut);
        assert!(available(&d, "p1"));

        assert!(d.tick(later).is_empty());
        assert!(d.tick(later + Duration::hours(1)).is_empty());
        assert_eq!(d.metrics().timed_out, 1);
    }

    #[test]
    fn test_scenario_d_cancel_after_accept_is_noop() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true)]);
        let now = Utc::now();
        let id = d.start_emergency(Some(ORIGIN), now).unwrap();
        d.record_provider_response(&id, true, now).unwrap();

        let err = d.cancel(&id, now).unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(d.get_session(&id).unwrap().state(), DispatchState::Accepted);
        assert!(!available(&d, "p1"));
    }

    #[test]
    fn test_missing_location_leaves_no_session() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true)]);
        assert_eq!(
            d.start_emergency(None, Utc::now()),
            Err(DispatchError::LocationUnavailable)
        );
        let bad = Coordinate {
            latitude: 91.0,
            longitude: 0.0,
        };
        assert!(matches!(
            d.start_emergency(Some(bad), Utc::now()),
            Err(DispatchError::InvalidCoordinate { .. })
        ));
        assert!(d.list_sessions(false).is_empty());
        assert!(d.drain_events().is_empty());
        assert!(available(&d, "p1"));
    }

    #[test]
    fn test_reject_releases_provider() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true)]);
        let now = Utc::now();
        let id = d.start_emergency(Some(ORIGIN), now).unwrap();

        d.record_provider_response(&id, false, now).unwrap();
        assert_eq!(d.get_session(&id).unwrap().state(), DispatchState::Rejected);
        assert!(available(&d, "p1"));
        assert!(d.get_session(&id).unwrap().successor().is_none());
    }

    #[test]
    fn test_cancel_releases_provider() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true)]);
        let now = Utc::now();
        let id = d.start_emergency(Some(ORIGIN), now).unwrap();

        d.cancel(&id, now).unwrap();
        assert_eq!(d.get_session(&id).unwrap().state(), DispatchState::Cancelled);
        assert!(available(&d, "p1"));
    }

    #[test]
    fn test_response_requires_notified() {
        let mut d = dispatcher(vec![]);
        let now = Utc::now();
        let id = d.start_emergency(Some(ORIGIN), now).unwrap();

        let err = d.record_provider_response(&id, true, now).unwrap_err();
        assert_eq!(
            err,
            DispatchError::InvalidTransition {
                from: DispatchState::Idle,
                event: DispatchEvent::ProviderAccepts
            }
        );
    }

    #[test]
    fn test_unknown_session() {
        let mut d = dispatcher(vec![]);
        let ghost = SessionId::from_string("sos-ghost");
        assert!(matches!(d.get_session(&ghost), Err(DispatchError::NotFound(_))));
        assert!(matches!(
            d.record_provider_response(&ghost, true, Utc::now()),
            Err(DispatchError::NotFound(_))
        ));
        assert!(matches!(d.cancel(&ghost, Utc::now()), Err(DispatchError::NotFound(_))));
    }

    #[test]
    fn test_provider_serves_one_active_session() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true), north_of_origin("p2", 4.0, true)]);
        let now = Utc::now();

        let first = d.start_emergency(Some(ORIGIN), now).unwrap();
        let second = d.start_emergency(Some(ORIGIN), now).unwrap();
        let third = d.start_emergency(Some(ORIGIN), now).unwrap();

        let provider_of = |d: &Dispatcher, id: &SessionId| {
            d.get_session(id)
                .unwrap()
                .matched_provider()
                .map(|p| p.id.to_string())
        };
        assert_eq!(provider_of(&d, &first).as_deref(), Some("p1"));
        assert_eq!(provider_of(&d, &second).as_deref(), Some("p2"));
        assert_eq!(provider_of(&d, &third), None);
        assert_eq!(d.metrics().active_sessions, 2);
    }

    #[test]
    fn test_engaged_provider_not_rematched_when_flag_flipped() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true)]);
        let now = Utc::now();
        let first = d.start_emergency(Some(ORIGIN), now).unwrap();

        d.set_provider_availability(&"p1".into(), true).unwrap();
        let second = d.start_emergency(Some(ORIGIN), now).unwrap();

        assert_eq!(d.get_session(&first).unwrap().state(), DispatchState::Notified);
        assert_eq!(d.get_session(&second).unwrap().state(), DispatchState::Idle);
    }

    #[test]
    fn test_accepted_provider_returns_after_manual_release() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true)]);
        let now = Utc::now();
        let first = d.start_emergency(Some(ORIGIN), now).unwrap();
        d.record_provider_response(&first, true, now).unwrap();

        // Encounter over: the operator frees the provider
        d.set_provider_availability(&"p1".into(), true).unwrap();
        let second = d.start_emergency(Some(ORIGIN), now).unwrap();
        assert_eq!(d.get_session(&second).unwrap().state(), DispatchState::Notified);
    }

    #[test]
    fn test_rematch_on_reject() {
        let config = CoordinatorConfig {
            rematch_on_reject: true,
            ..Default::default()
        };
        let mut d = dispatcher_with(
            config,
            vec![north_of_origin("p1", 1.0, true), north_of_origin("p2", 2.0, true)],
        );
        let now = Utc::now();
        let first = d.start_emergency(Some(ORIGIN), now).unwrap();
        d.record_provider_response(&first, false, now).unwrap();

        let rejected = d.get_session(&first).unwrap();
        let second = rejected.successor().cloned().unwrap();
        let rematched = d.get_session(&second).unwrap();
        assert_eq!(rematched.state(), DispatchState::Notified);
        assert_eq!(rematched.matched_provider().unwrap().id.as_str(), "p2");
        assert_eq!(rematched.predecessor(), Some(&first));
        assert_eq!(rematched.request().id(), rejected.request().id());

        // p2 rejects too: p1 is excluded, nobody is left
        d.record_provider_response(&second, false, now).unwrap();
        let third = d.get_session(&second).unwrap().successor().cloned().unwrap();
        let last = d.get_session(&third).unwrap();
        assert_eq!(last.state(), DispatchState::Idle);
        assert_eq!(last.excluded().len(), 2);
        assert!(available(&d, "p1"));
        assert!(available(&d, "p2"));
        assert_eq!(d.metrics().rematched, 2);
    }

    #[test]
    fn test_rematch_limit() {
        let config = CoordinatorConfig {
            rematch_on_reject: true,
            max_rematch_attempts: 0,
            ..Default::default()
        };
        let mut d = dispatcher_with(
            config,
            vec![north_of_origin("p1", 1.0, true), north_of_origin("p2", 2.0, true)],
        );
        let now = Utc::now();
        let first = d.start_emergency(Some(ORIGIN), now).unwrap();
        d.record_provider_response(&first, false, now).unwrap();
        assert!(d.get_session(&first).unwrap().successor().is_none());
    }

    #[test]
    fn test_release_tolerates_removed_provider() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true)]);
        let now = Utc::now();
        let id = d.start_emergency(Some(ORIGIN), now).unwrap();

        d.registry.remove(&"p1".into()).unwrap();
        d.cancel(&id, now).unwrap();
        assert_eq!(d.get_session(&id).unwrap().state(), DispatchState::Cancelled);
        assert!(d.engaged.is_empty());
    }

    #[test]
    fn test_tick_prunes_settled_sessions_after_retention() {
        let config = CoordinatorConfig {
            session_retention_secs: 60,
            ..Default::default()
        };
        let mut d = dispatcher_with(
            config,
            vec![north_of_origin("p1", 1.0, true), north_of_origin("p2", 2.0, true)],
        );
        let now = Utc::now();

        let accepted = d.start_emergency(Some(ORIGIN), now).unwrap();
        d.record_provider_response(&accepted, true, now).unwrap();
        let active = d.start_emergency(Some(ORIGIN), now).unwrap();
        let unmatched = d.start_emergency(Some(ORIGIN), now).unwrap();
        assert_eq!(d.get_session(&unmatched).unwrap().state(), DispatchState::Idle);

        assert!(d.tick(now + Duration::seconds(30)).is_empty());
        assert_eq!(d.list_sessions(false).len(), 3);

        assert!(d.tick(now + Duration::seconds(61)).is_empty());
        assert!(matches!(d.get_session(&accepted), Err(DispatchError::NotFound(_))));
        assert!(matches!(d.get_session(&unmatched), Err(DispatchError::NotFound(_))));
        assert_eq!(d.get_session(&active).unwrap().state(), DispatchState::Notified);
        assert_eq!(d.metrics().accepted, 1);
    }

    #[test]
    fn test_events_trace_transitions() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true)]);
        let now = Utc::now();
        let id = d.start_emergency(Some(ORIGIN), now).unwrap();
        d.record_provider_response(&id, true, now).unwrap();

        let trail: Vec<(DispatchState, DispatchState)> = d.drain_events().iter().map(|e| (e.from, e.to)).collect();
        assert_eq!(
            trail,
            vec![
                (DispatchState::Idle, DispatchState::Requested),
                (DispatchState::Requested, DispatchState::Notified),
                (DispatchState::Notified, DispatchState::Accepted),
            ]
        );
        assert!(d.drain_events().is_empty());
    }

    #[test]
    fn test_list_sessions_active_only() {
        let mut d = dispatcher(vec![north_of_origin("p1", 1.0, true)]);
        let now = Utc::now();
        let active = d.start_emergency(Some(ORIGIN), now).unwrap();
        let _idle = d.start_emergency(Some(ORIGIN), now + Duration::seconds(1)).unwrap();

        assert_eq!(d.list_sessions(false).len(), 2);
        let only = d.list_sessions(true);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].id(), &active);
    }
}
