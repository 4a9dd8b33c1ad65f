//! Dispatch coordinator
//!
//! A single tokio task owns the provider registry and every session; callers
//! talk to it through a cloneable `CoordinatorHandle`:
//! - **start_emergency:** create a session and match the nearest provider
//! - **record_provider_response / cancel:** drive the session to a terminal state
//! - **tick:** time out sessions whose provider never answered

mod config;
mod core;
mod dispatcher;
mod handle;
mod messages;
mod notifier;
mod ticker;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use dispatcher::Dispatcher;
pub use handle::CoordinatorHandle;
pub use messages::{CoordRequest, DispatchMetrics, SessionEvent};
pub use notifier::{DispatchNotice, LogNotifier, Notifier};
pub use ticker::spawn_ticker;
