//! Notification delivery boundary
//!
//! The coordinator hands every new match to a `Notifier`. Transport (push,
//! SMS, phone call) lives behind this trait; the provider's answer comes back
//! through `CoordinatorHandle::record_provider_response`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{DispatchSession, Provider, SessionId};
use crate::geo::Coordinate;

/// What a provider is told about an emergency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchNotice {
    #[serde(rename = "session-id")]
    pub session_id: SessionId,
    pub provider: Provider,
    #[serde(rename = "requester-location")]
    pub requester_location: Coordinate,
    #[serde(rename = "distance-km")]
    pub distance_km: f64,
    #[serde(rename = "respond-by")]
    pub respond_by: DateTime<Utc>,
}

impl DispatchNotice {
    /// Build a notice from a notified session
    pub fn from_session(session: &DispatchSession) -> Result<Self> {
        let provider = session
            .matched_provider()
            .ok_or_else(|| eyre!("Session {} has no matched provider", session.id()))?;
        let respond_by = session
            .respond_by()
            .ok_or_else(|| eyre!("Session {} has no response deadline", session.id()))?;

        Ok(Self {
            session_id: session.id().clone(),
            provider: provider.clone(),
            requester_location: session.request().requester_location(),
            distance_km: session.distance_km().unwrap_or_default(),
            respond_by,
        })
    }
}

/// Delivers dispatch notices to providers
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notice: &DispatchNotice) -> Result<()>;
}

/// Notifier that only logs
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notice: &DispatchNotice) -> Result<()> {
        info!(
            session_id = %notice.session_id,
            provider_id = %notice.provider.id,
            provider = %notice.provider.name,
            distance_km = notice.distance_km,
            respond_by = %notice.respond_by,
            "Dispatch notice"
        );
        Ok(())
    }
}
