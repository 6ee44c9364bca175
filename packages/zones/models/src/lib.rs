#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Administrative zone types used to geographically aggregate incidents.
//!
//! A zone is one level of the governorate -> district -> block hierarchy,
//! plus the independent police-zone layer. Zone features themselves are
//! static: they are loaded once at startup and never change while the
//! process is running.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The administrative layer a zone feature belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ZoneKind {
    /// Top-level administrative area.
    Governorate,
    /// Mid-level area; resolution succeeds iff a district is found.
    District,
    /// Point feature (block centroids, not polygons).
    Block,
    /// Police jurisdiction layer, independent of the civil hierarchy.
    PoliceZone,
}

/// Attribute properties of a single zone feature.
///
/// Geometry is deliberately not part of this type: the registry keeps
/// geometries inside its spatial indexes and only hands out properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneProperties {
    /// Stable zone code (e.g. "KW-HAW" or a district number).
    pub code: String,
    /// English display name.
    pub name_en: String,
    /// Arabic display name.
    pub name_ar: String,
    /// Which layer this feature belongs to.
    pub kind: ZoneKind,
    /// Code of the parent zone (district -> governorate, block -> district).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_code: Option<String>,
}

/// Result of resolving a coordinate pair against the zone hierarchy.
///
/// Invariant: `resolved` is `true` iff `district_code` is set. The other
/// fields are best-effort enrichments and may be present even when the
/// point did not resolve to a district.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedZone {
    /// Containing governorate code, if any.
    pub governorate_code: Option<String>,
    /// Containing district code, if any.
    pub district_code: Option<String>,
    /// Nearest block code within the acceptance distance, if any.
    pub block_code: Option<String>,
    /// Containing police zone code, if any.
    pub police_zone_code: Option<String>,
    /// Whether the point resolved to a district.
    pub resolved: bool,
}

impl ResolvedZone {
    /// An unresolved result, returned for out-of-domain or malformed
    /// coordinates.
    #[must_use]
    pub fn unresolved() -> Self {
        Self::default()
    }
}

/// Axis-aligned geographic bounding box delimiting the service domain.
///
/// Points outside the box are expected (neighboring countries, sea
/// coordinates, data-entry noise) and resolve to
/// [`ResolvedZone::unresolved`] without error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern edge, decimal degrees.
    pub min_lat: f64,
    /// Northern edge, decimal degrees.
    pub max_lat: f64,
    /// Western edge, decimal degrees.
    pub min_lon: f64,
    /// Eastern edge, decimal degrees.
    pub max_lon: f64,
}

impl BoundingBox {
    /// Returns `true` when the point lies within the box (inclusive).
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

impl Default for BoundingBox {
    /// The Kuwait service domain.
    fn default() -> Self {
        Self {
            min_lat: 28.5,
            max_lat: 30.5,
            min_lon: 46.5,
            max_lon: 49.0,
        }
    }
}
