//! Domain types for SOS dispatch
//!
//! Core domain types: Provider, DispatchRequest, DispatchSession.
//! The session carries the dispatch state machine; the coordinator is its
//! only owner.

mod id;
mod provider;
mod request;
mod session;

pub use id::{ProviderId, SessionId, generate_id};
pub use provider::Provider;
pub use request::DispatchRequest;
pub use session::{DispatchEvent, DispatchSession, DispatchState};
