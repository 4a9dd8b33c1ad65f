//! Nearest-provider matching
//!
//! Picks the closest available provider to a requester. Ties within
//! `tie_epsilon_km` go to the lexicographically smaller provider ID, so the
//! result does not depend on candidate order.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::Provider;
use crate::error::DispatchResult;
use crate::geo::{Coordinate, distance_km};

/// Default tie tolerance in kilometers
pub const DEFAULT_TIE_EPSILON_KM: f64 = 1e-6;

/// A selected provider and its distance from the requester
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub provider: Provider,
    pub distance_km: f64,
}

/// Selection policy for nearest-provider matching
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchEngine {
    /// Distances closer than this are considered equal
    pub tie_epsilon_km: f64,

    /// Providers farther than this are not eligible
    pub max_distance_km: Option<f64>,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self {
            tie_epsilon_km: DEFAULT_TIE_EPSILON_KM,
            max_distance_km: None,
        }
    }
}

impl MatchEngine {
    pub fn new(tie_epsilon_km: f64, max_distance_km: Option<f64>) -> Self {
        Self {
            tie_epsilon_km,
            max_distance_km,
        }
    }

    /// Find the nearest available candidate
    ///
    /// `Ok(None)` means nobody is eligible; that is an answer, not an error.
    /// A malformed requester location is an error. A candidate with a
    /// malformed location is skipped.
    pub fn find_nearest<'a, I>(&self, requester: &Coordinate, candidates: I) -> DispatchResult<Option<Match>>
    where
        I: IntoIterator<Item = &'a Provider>,
    {
        debug!(%requester, "find_nearest: called");
        requester.validate()?;

        let mut eligible: Vec<(&Provider, f64)> = Vec::new();
        for provider in candidates.into_iter().filter(|p| p.available) {
            match distance_km(requester, &provider.location) {
                Ok(d) if self.max_distance_km.is_none_or(|max| d <= max) => eligible.push((provider, d)),
                Ok(d) => debug!(id = %provider.id, distance_km = d, "find_nearest: beyond max distance"),
                Err(e) => warn!(id = %provider.id, error = %e, "Skipping provider with invalid location"),
            }
        }

        // The minimum distance anchors the tie band: every provider whose
        // distance is less than `tie_epsilon_km` above it ties, and the
        // smallest ID in the band wins.
        let Some(min_d) = eligible.iter().map(|(_, d)| *d).min_by(f64::total_cmp) else {
            debug!("find_nearest: no eligible provider");
            return Ok(None);
        };
        let best = eligible
            .into_iter()
            .filter(|(_, d)| self.ties_with_min(*d, min_d))
            .min_by(|a, b| a.0.id.cmp(&b.0.id));

        let result = best.map(|(provider, distance_km)| Match {
            provider: provider.clone(),
            distance_km,
        });
        match &result {
            Some(m) => debug!(id = %m.provider.id, distance_km = m.distance_km, "find_nearest: matched"),
            None => debug!("find_nearest: no eligible provider"),
        }
        Ok(result)
    }

    /// `d` is the minimum itself or less than `tie_epsilon_km` above it
    fn ties_with_min(&self, d: f64, min_d: f64) -> bool {
        d <= min_d || d - min_d < self.tie_epsilon_km
    }
}

/// Nearest available provider with the default policy
pub fn find_nearest<'a, I>(requester: &Coordinate, candidates: I) -> DispatchResult<Option<Match>>
where
    I: IntoIterator<Item = &'a Provider>,
{
    MatchEngine::default().find_nearest(requester, candidates)
}
