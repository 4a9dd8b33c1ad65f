//! sosdispatch - Nearest-provider matching and SOS dispatch
//!
//! A pregnant user triggers an SOS from a known location. The nearest
//! available midwife is selected by great-circle distance, notified, and
//! given a bounded window to accept or reject. Every request is tracked as a
//! session with an explicit, validated lifecycle.
//!
//! # Modules
//!
//! - [`geo`] - Coordinates and haversine distance
//! - [`domain`] - Providers, requests, sessions and the dispatch state machine
//! - [`registry`] - Provider storage and seed data
//! - [`matcher`] - Nearest available provider selection
//! - [`coordinator`] - Single-owner dispatch actor, handle, ticker and notifier
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod geo;
pub mod matcher;
pub mod registry;

// Re-export commonly used types
pub use config::{Config, RegistryConfig, SimulationConfig};
pub use coordinator::{
    CoordRequest, Coordinator, CoordinatorConfig, CoordinatorHandle, DispatchMetrics, DispatchNotice, Dispatcher,
    LogNotifier, Notifier, SessionEvent, spawn_ticker,
};
pub use domain::{DispatchEvent, DispatchRequest, DispatchSession, DispatchState, Provider, ProviderId, SessionId};
pub use error::{DispatchError, DispatchResult};
pub use geo::{Coordinate, EARTH_RADIUS_KM, distance_km};
pub use matcher::{Match, MatchEngine, find_nearest};
pub use registry::{InMemoryRegistry, ProviderRegistry, ProviderSnapshot, builtin_seed, load_seed};
