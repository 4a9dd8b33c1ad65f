//! Dispatch errors
//!
//! Every failure the core can report is local and recoverable by the caller.
//! "No provider available" is not among them: it is an empty match result.

use thiserror::Error;

use crate::domain::{DispatchEvent, DispatchState};

/// Errors from geo, registry, session and coordinator operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("Invalid coordinate: latitude={latitude}, longitude={longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Requester location unavailable")]
    LocationUnavailable,

    #[error("Invalid transition: cannot apply {event} in state {from}")]
    InvalidTransition { from: DispatchState, event: DispatchEvent },

    #[error("Channel error")]
    ChannelError,
}

impl DispatchError {
    /// Shorthand for a missing provider
    pub fn provider_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("Provider {}", id))
    }

    /// Shorthand for a missing session
    pub fn session_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("Session {}", id))
    }

    /// True for state-machine misuse
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

/// Result of dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
