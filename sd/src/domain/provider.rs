//! Provider domain type

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::id::ProviderId;
use crate::geo::Coordinate;

/// A registered care professional who can be dispatched to a requester
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Unique identifier
    pub id: ProviderId,

    /// Display name
    pub name: String,

    /// Current location
    pub location: Coordinate,

    /// Whether the provider can take a new request
    #[serde(default = "default_available")]
    pub available: bool,

    /// Free-form attributes (experience, specialty, license, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_available() -> bool {
    true
}

impl Provider {
    /// Create an available provider with no metadata
    pub fn new(id: impl Into<ProviderId>, name: impl Into<String>, location: Coordinate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location,
            available: true,
            metadata: BTreeMap::new(),
        }
    }

    /// Builder method to set availability
    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Builder method to add a metadata attribute
    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}
