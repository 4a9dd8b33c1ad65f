//! Main Coordinator task implementation

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::dispatcher::Dispatcher;
use super::handle::CoordinatorHandle;
use super::messages::{CoordRequest, SessionEvent};
use super::notifier::{DispatchNotice, LogNotifier, Notifier};
use crate::domain::DispatchState;
use crate::registry::ProviderRegistry;

/// The Coordinator is the single owner of sessions and the registry
///
/// Requests are processed one at a time, so concurrent SOS triggers and
/// provider responses never race.
pub struct Coordinator {
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
    event_tx: broadcast::Sender<SessionEvent>,
    dispatcher: Dispatcher,
    notifier: Arc<dyn Notifier>,
}

impl Coordinator {
    /// Create a new Coordinator over a provider registry
    pub fn new(config: CoordinatorConfig, registry: impl ProviderRegistry + 'static) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            tx,
            rx,
            event_tx,
            dispatcher: Dispatcher::new(config, registry),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Replace the notification transport
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Create a handle for callers
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone(), self.event_tx.clone())
    }

    /// Spawn the Coordinator task and return a handle to it
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run the Coordinator task
    ///
    /// This consumes the Coordinator and runs until shutdown is requested.
    pub async fn run(mut self) {
        info!("Coordinator started");

        while let Some(req) = self.rx.recv().await {
            match req {
                CoordRequest::StartEmergency { location, reply } => {
                    let result = self.dispatcher.start_emergency(location, Utc::now());
                    if let Err(e) = &result {
                        warn!(error = %e, "Emergency rejected");
                    }
                    self.publish().await;
                    let _ = reply.send(result);
                }

                CoordRequest::GetSession { session_id, reply } => {
                    let _ = reply.send(self.dispatcher.get_session(&session_id));
                }

                CoordRequest::ListSessions { active_only, reply } => {
                    let _ = reply.send(self.dispatcher.list_sessions(active_only));
                }

                CoordRequest::RecordResponse {
                    session_id,
                    accepted,
                    reply,
                } => {
                    let result = self
                        .dispatcher
                        .record_provider_response(&session_id, accepted, Utc::now());
                    self.publish().await;
                    let _ = reply.send(result);
                }

                CoordRequest::Cancel { session_id, reply } => {
                    let result = self.dispatcher.cancel(&session_id, Utc::now());
                    self.publish().await;
                    let _ = reply.send(result);
                }

                CoordRequest::Tick { now, reply } => {
                    let timed_out = self.dispatcher.tick(now);
                    if !timed_out.is_empty() {
                        debug!(count = timed_out.len(), "Tick timed out sessions");
                    }
                    self.publish().await;
                    let _ = reply.send(timed_out);
                }

                CoordRequest::ListProviders { reply } => {
                    let _ = reply.send(self.dispatcher.providers());
                }

                CoordRequest::SetProviderAvailability {
                    provider_id,
                    available,
                    reply,
                } => {
                    let _ = reply.send(self.dispatcher.set_provider_availability(&provider_id, available));
                }

                CoordRequest::GetMetrics { reply } => {
                    let _ = reply.send(self.dispatcher.metrics());
                }

                CoordRequest::Shutdown => {
                    info!("Coordinator shutting down");
                    break;
                }
            }
        }

        info!("Coordinator stopped");
    }

    /// Deliver notices for new matches and broadcast every queued event
    async fn publish(&mut self) {
        for event in self.dispatcher.drain_events() {
            if event.to == DispatchState::Notified {
                let notice = self
                    .dispatcher
                    .get_session(&event.session_id)
                    .map_err(eyre::Report::from)
                    .and_then(|session| DispatchNotice::from_session(&session));
                match notice {
                    Ok(notice) => {
                        if let Err(e) = self.notifier.deliver(&notice).await {
                            warn!(session_id = %event.session_id, error = %e, "Failed to deliver dispatch notice");
                            self.dispatcher.record_notify_failure();
                        }
                    }
                    Err(e) => warn!(session_id = %event.session_id, error = %e, "Could not build dispatch notice"),
                }
            }

            // No subscribers is fine
            let _ = self.event_tx.send(event);
        }
    }
}
