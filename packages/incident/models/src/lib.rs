#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident record types consumed by the hotspot pipeline.
//!
//! Incidents arrive from the upstream cleaning/ETL stage already
//! deduplicated and validated. This core treats them as read-only input:
//! nothing here ever mutates or re-persists an incident.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Incident type taxonomy shared across clustering, forecasting, and
/// pattern-based escalation.
///
/// The upstream feed delivers types as lowercase `snake_case` strings
/// (e.g. `"vehicle_theft"`), which is also the wire form used here.
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
pub enum IncidentType {
    /// Taking of property without force.
    Theft,
    /// Taking of property by force or threat.
    Robbery,
    /// Physical attack on a person.
    Assault,
    /// Unlawful entry to commit theft or another offense.
    Burglary,
    /// Theft of a motor vehicle.
    VehicleTheft,
    /// Willful destruction or damage of property.
    Vandalism,
    /// Possession, sale, or manufacture of controlled substances.
    DrugOffense,
    /// Deception for financial gain.
    Fraud,
    /// Abduction or unlawful confinement.
    Kidnapping,
    /// Murder or manslaughter.
    Homicide,
    /// Anything the upstream normalizer could not classify.
    Other,
}

/// A cleaned incident record from the upstream feed.
///
/// The optional zone fields are best-effort enrichments the feed may have
/// already attached; the pipeline fills in whatever is missing via the
/// zone resolver before clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Upstream incident identifier, unique within the feed.
    pub id: String,
    /// Normalized incident type.
    pub incident_type: IncidentType,
    /// Latitude in decimal degrees (WGS84).
    pub lat: f64,
    /// Longitude in decimal degrees (WGS84).
    pub lon: f64,
    /// When the incident occurred.
    pub occurred_at: DateTime<Utc>,
    /// Governorate code, if the feed pre-resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governorate: Option<String>,
    /// District code, if the feed pre-resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    /// Police zone code, if the feed pre-resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub police_zone: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn incident_type_snake_case_roundtrip() {
        assert_eq!(
            IncidentType::from_str("vehicle_theft").unwrap(),
            IncidentType::VehicleTheft
        );
        assert_eq!(IncidentType::DrugOffense.to_string(), "drug_offense");
        assert!(IncidentType::from_str("VEHICLE_THEFT").is_err());
    }

    #[test]
    fn incident_wire_form_is_camel_case_with_optional_zones() {
        let raw = r#"{
            "id": "i-1",
            "incidentType": "theft",
            "lat": 29.3,
            "lon": 47.9,
            "occurredAt": "2026-08-01T12:00:00Z"
        }"#;
        let incident: Incident = serde_json::from_str(raw).unwrap();
        assert_eq!(incident.incident_type, IncidentType::Theft);
        assert!(incident.district.is_none());
        assert!(incident.police_zone.is_none());
    }
}
