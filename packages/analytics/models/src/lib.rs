#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Derived analytics record types: hotspots and forecasts.
//!
//! Both are a rebuildable cache recomputed on every pipeline run. Each
//! record is uniquely keyed by `(zone_key, predicted)` and upserts
//! overwrite the prior value for that key, so the store never accumulates
//! history for them.

use chrono::{DateTime, Utc};
use crime_pulse_incident_models::IncidentType;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How a hotspot row was produced.
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
pub enum HotspotKind {
    /// Density cluster of incidents within a district.
    Cluster,
    /// Raw per-police-zone incident aggregate, no clustering applied.
    PoliceZoneAggregate,
}

/// A detected (or predicted) spatial concentration of incidents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    /// Upsert key, unique together with `predicted`.
    pub zone_key: String,
    /// How this row was produced.
    pub kind: HotspotKind,
    /// Hotspot score; for clusters this is the member count.
    pub score: f64,
    /// Number of incidents contributing to the row.
    pub member_count: u64,
    /// Mean latitude of members.
    pub centroid_lat: f64,
    /// Mean longitude of members.
    pub centroid_lon: f64,
    /// District the hotspot belongs to, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    /// Dominant police zone among members, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub police_zone: Option<String>,
    /// Dominant governorate among members, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governorate: Option<String>,
    /// Most frequent incident type among members, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_type: Option<IncidentType>,
    /// When this row was computed.
    pub created_at: DateTime<Utc>,
    /// `true` for predicted rows, `false` for observed ones.
    pub predicted: bool,
}

impl Hotspot {
    /// The `(zone_key, predicted)` upsert key for this row.
    #[must_use]
    pub fn upsert_key(&self) -> (String, bool) {
        (self.zone_key.clone(), self.predicted)
    }
}

/// Which estimator produced a forecast record.
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
pub enum ForecastHorizon {
    /// 24-hour per-zone estimator; these rows feed escalation.
    Short,
    /// 7-day seasonal model; reporting only.
    Seasonal,
}

/// A near-term incident forecast for one zone (or one seasonal horizon
/// day of a wider scope).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRecord {
    /// Upsert key; seasonal rows encode the horizon day (e.g.
    /// `"global:d3"`), short-horizon rows use the district code.
    pub zone_key: String,
    /// Which estimator produced the row.
    pub horizon: ForecastHorizon,
    /// Predicted incident count, never negative.
    pub forecast_count: f64,
    /// Percent change versus the comparison window; 0 when the prior
    /// period had no incidents.
    pub trend_pct: f64,
    /// Lower edge of the ~95% interval, clamped at 0.
    pub lower_bound: f64,
    /// Upper edge of the ~95% interval.
    pub upper_bound: f64,
    /// Start of the period the forecast covers.
    pub valid_from: DateTime<Utc>,
    /// End of the period the forecast covers.
    pub valid_until: DateTime<Utc>,
    /// Always `true`; kept explicit so forecast rows share the hotspot
    /// key contract.
    pub predicted: bool,
}
