//! In-memory provider registry
//!
//! Copy-on-write: writers clone the map only while a snapshot still holds
//! the previous version.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{ProviderRegistry, ProviderSnapshot};
use crate::domain::{Provider, ProviderId};
use crate::error::{DispatchError, DispatchResult};

/// Registry backed by a shared map
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    providers: Arc<BTreeMap<ProviderId, Provider>>,
}

impl InMemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from seed providers
    ///
    /// Every location is validated. A duplicate ID replaces the earlier entry.
    pub fn from_providers(providers: impl IntoIterator<Item = Provider>) -> DispatchResult<Self> {
        let mut map = BTreeMap::new();
        for provider in providers {
            provider.location.validate()?;
            if let Some(previous) = map.insert(provider.id.clone(), provider) {
                warn!(id = %previous.id, "Duplicate provider id in seed, keeping the later entry");
            }
        }
        info!(count = map.len(), "Provider registry loaded");
        Ok(Self {
            providers: Arc::new(map),
        })
    }

    fn entry_mut(&mut self, id: &ProviderId) -> DispatchResult<&mut Provider> {
        Arc::make_mut(&mut self.providers)
            .get_mut(id)
            .ok_or_else(|| DispatchError::provider_not_found(id))
    }
}

impl ProviderRegistry for InMemoryRegistry {
    fn list(&self) -> ProviderSnapshot {
        ProviderSnapshot::new(Arc::clone(&self.providers))
    }

    fn get(&self, id: &ProviderId) -> DispatchResult<Provider> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| DispatchError::provider_not_found(id))
    }

    fn set_availability(&mut self, id: &ProviderId, available: bool) -> DispatchResult<()> {
        debug!(%id, available, "set_availability: called");
        // Avoid a copy-on-write clone when nothing changes
        match self.providers.get(id) {
            None => return Err(DispatchError::provider_not_found(id)),
            Some(p) if p.available == available => return Ok(()),
            Some(_) => {}
        }
        self.entry_mut(id)?.available = available;
        Ok(())
    }

    fn upsert(&mut self, provider: Provider) -> DispatchResult<()> {
        debug!(id = %provider.id, "upsert: called");
        provider.location.validate()?;
        Arc::make_mut(&mut self.providers).insert(provider.id.clone(), provider);
        Ok(())
    }

    fn remove(&mut self, id: &ProviderId) -> DispatchResult<Provider> {
        debug!(%id, "remove: called");
        if !self.providers.contains_key(id) {
            return Err(DispatchError::provider_not_found(id));
        }
        Arc::make_mut(&mut self.providers)
            .remove(id)
            .ok_or_else(|| DispatchError::provider_not_found(id))
    }
}
