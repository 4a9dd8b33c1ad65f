//! DispatchRequest domain type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;
use crate::error::DispatchResult;
use crate::geo::Coordinate;

/// An SOS request; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    id: String,
    requester_location: Coordinate,
    created_at: DateTime<Utc>,
}

impl DispatchRequest {
    /// Create a request, rejecting a malformed location
    pub fn new(requester_location: Coordinate, created_at: DateTime<Utc>) -> DispatchResult<Self> {
        requester_location.validate()?;
        Ok(Self {
            id: generate_id("req"),
            requester_location,
            created_at,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn requester_location(&self) -> Coordinate {
        self.requester_location
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
