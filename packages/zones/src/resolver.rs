//! Coordinate-to-zone resolution.
//!
//! Resolution is best-effort by design: an incident outside the service
//! bounding box, or with malformed coordinates, yields an unresolved
//! result rather than an error. Only the district determines `resolved`;
//! governorate, block, and police zone are enrichments.

use std::sync::Arc;

use crime_pulse_zones_models::{BoundingBox, ResolvedZone};
use serde::Deserialize;

use crate::ZoneRegistry;

/// Which spatial-lookup implementation the resolver uses.
///
/// `Aabb` is the degrade path: pure envelope containment with no exact
/// point-in-polygon test. It honors the same contract and exists so the
/// resolver keeps serving (coarsely) if prepared-geometry lookups ever
/// have to be disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// R-tree envelope query plus exact point-in-polygon test.
    #[default]
    Rtree,
    /// Axis-aligned bounding-box containment only.
    Aabb,
}

/// Resolver tuning knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Service domain; points outside resolve to nothing.
    pub bounds: BoundingBox,
    /// Maximum accepted block distance in degrees (0.045 is roughly 5 km
    /// at Kuwait's latitude).
    pub block_max_distance_deg: f64,
    /// Lookup backend.
    pub backend: IndexBackend,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            bounds: BoundingBox::default(),
            block_max_distance_deg: 0.045,
            backend: IndexBackend::default(),
        }
    }
}

/// Resolves `(lat, lon)` pairs to the administrative zone hierarchy.
///
/// Cheap to clone and safe to share: the registry is read-only after
/// construction.
#[derive(Clone)]
pub struct ZoneResolver {
    registry: Arc<ZoneRegistry>,
    config: ResolverConfig,
}

impl ZoneResolver {
    /// Creates a resolver over a loaded registry.
    #[must_use]
    pub const fn new(registry: Arc<ZoneRegistry>, config: ResolverConfig) -> Self {
        Self { registry, config }
    }

    /// Resolves a point to its zone hierarchy.
    ///
    /// Out-of-domain and malformed coordinates return
    /// [`ResolvedZone::unresolved`]; this path never errors because such
    /// points are an expected part of the input.
    #[must_use]
    pub fn resolve(&self, lat: f64, lon: f64) -> ResolvedZone {
        if !lat.is_finite() || !lon.is_finite() {
            log::debug!("Unresolvable coordinates: ({lat}, {lon})");
            return ResolvedZone::unresolved();
        }

        if !self.config.bounds.contains(lat, lon) {
            return ResolvedZone::unresolved();
        }

        let backend = self.config.backend;

        let governorate_code = self
            .registry
            .locate_governorate(lat, lon, backend)
            .map(|p| p.code.clone());
        let district_code = self
            .registry
            .locate_district(lat, lon, backend)
            .map(|p| p.code.clone());
        let police_zone_code = self
            .registry
            .locate_police_zone(lat, lon, backend)
            .map(|p| p.code.clone());
        let block_code = self
            .registry
            .nearest_block(lat, lon, self.config.block_max_distance_deg, backend)
            .map(|p| p.code.clone());

        ResolvedZone {
            resolved: district_code.is_some(),
            governorate_code,
            district_code,
            block_code,
            police_zone_code,
        }
    }
}
