//! Coordinator configuration

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::matcher::{DEFAULT_TIE_EPSILON_KM, MatchEngine};

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long a notified provider has to respond, in seconds
    #[serde(rename = "response-window-secs", default = "default_response_window_secs")]
    pub response_window_secs: u64,

    /// Channel buffer size for coordinator requests
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Broadcast buffer size for session events
    #[serde(rename = "event-buffer", default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Ticker period in milliseconds
    #[serde(rename = "tick-interval-ms", default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Re-match automatically when a provider rejects
    #[serde(rename = "rematch-on-reject", default)]
    pub rematch_on_reject: bool,

    /// Upper bound on re-matches along one chain of rejections
    #[serde(rename = "max-rematch-attempts", default = "default_max_rematch_attempts")]
    pub max_rematch_attempts: u32,

    /// Distances closer than this are ties
    #[serde(rename = "tie-epsilon-km", default = "default_tie_epsilon_km")]
    pub tie_epsilon_km: f64,

    /// Search radius; unlimited when absent
    #[serde(rename = "max-distance-km", default)]
    pub max_distance_km: Option<f64>,

    /// How long a resolved or unmatched session stays readable, in seconds
    #[serde(rename = "session-retention-secs", default = "default_session_retention_secs")]
    pub session_retention_secs: u64,
}

fn default_response_window_secs() -> u64 {
    debug!("default_response_window_secs: called");
    180
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    256
}

fn default_event_buffer() -> usize {
    debug!("default_event_buffer: called");
    64
}

fn default_tick_interval_ms() -> u64 {
    debug!("default_tick_interval_ms: called");
    1000
}

fn default_max_rematch_attempts() -> u32 {
    debug!("default_max_rematch_attempts: called");
    3
}

fn default_session_retention_secs() -> u64 {
    debug!("default_session_retention_secs: called");
    86_400
}

fn default_tie_epsilon_km() -> f64 {
    DEFAULT_TIE_EPSILON_KM
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            response_window_secs: 180,
            channel_buffer: 256,
            event_buffer: 64,
            tick_interval_ms: 1000,
            rematch_on_reject: false,
            max_rematch_attempts: 3,
            tie_epsilon_km: DEFAULT_TIE_EPSILON_KM,
            max_distance_km: None,
            session_retention_secs: 86_400,
        }
    }
}

impl CoordinatorConfig {
    /// Reject tolerances the matcher cannot compare against
    pub fn validate(&self) -> Result<()> {
        debug!("CoordinatorConfig::validate: called");
        if !self.tie_epsilon_km.is_finite() || self.tie_epsilon_km < 0.0 {
            return Err(eyre!(
                "tie-epsilon-km must be a finite, non-negative number, got {}",
                self.tie_epsilon_km
            ));
        }
        if let Some(max) = self.max_distance_km
            && (!max.is_finite() || max < 0.0)
        {
            return Err(eyre!("max-distance-km must be a finite, non-negative number, got {}", max));
        }
        Ok(())
    }

    /// Response window as a chrono Duration
    pub fn response_window(&self) -> chrono::Duration {
        debug!(response_window_secs = %self.response_window_secs, "CoordinatorConfig::response_window: called");
        i64::try_from(self.response_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Retention of resolved sessions as a chrono Duration
    pub fn session_retention(&self) -> chrono::Duration {
        i64::try_from(self.session_retention_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Ticker period as a Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Matching policy derived from this configuration
    pub fn match_engine(&self) -> MatchEngine {
        MatchEngine::new(self.tie_epsilon_km, self.max_distance_km)
    }
}
