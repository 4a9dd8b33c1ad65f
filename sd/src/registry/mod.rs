//! Provider registry
//!
//! The registry is the single source of provider locations and availability.
//! `ProviderRegistry` is the seam a live data source plugs into; the shipped
//! implementation is an in-memory map loaded from seed data.

mod memory;
mod seed;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{Provider, ProviderId};
use crate::error::DispatchResult;

pub use memory::InMemoryRegistry;
pub use seed::{SeedFile, builtin_seed, load_seed};

/// Storage interface for providers
pub trait ProviderRegistry: Send {
    /// Snapshot of all providers; later mutations are not reflected in it
    fn list(&self) -> ProviderSnapshot;

    /// Fetch a provider by ID
    fn get(&self, id: &ProviderId) -> DispatchResult<Provider>;

    /// Mark a provider available or unavailable (idempotent)
    fn set_availability(&mut self, id: &ProviderId, available: bool) -> DispatchResult<()>;

    /// Insert or replace a provider
    fn upsert(&mut self, provider: Provider) -> DispatchResult<()>;

    /// Remove a provider, returning the removed record
    fn remove(&mut self, id: &ProviderId) -> DispatchResult<Provider>;
}

/// Immutable, restartable view of the registry at one point in time
///
/// Cloning shares the underlying map; iterating never observes writes made
/// after the snapshot was taken.
#[derive(Debug, Clone, Default)]
pub struct ProviderSnapshot {
    providers: Arc<BTreeMap<ProviderId, Provider>>,
}

impl ProviderSnapshot {
    pub(crate) fn new(providers: Arc<BTreeMap<ProviderId, Provider>>) -> Self {
        Self { providers }
    }

    /// Iterate providers in ID order
    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, id: &ProviderId) -> Option<&Provider> {
        self.providers.get(id)
    }

    /// Copy the providers out
    pub fn to_vec(&self) -> Vec<Provider> {
        self.providers.values().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a ProviderSnapshot {
    type Item = &'a Provider;
    type IntoIter = std::collections::btree_map::Values<'a, ProviderId, Provider>;

    fn into_iter(self) -> Self::IntoIter {
        self.providers.values()
    }
}
