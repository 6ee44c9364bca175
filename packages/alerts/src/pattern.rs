//! Pattern-based escalation rules.
//!
//! Independent of hotspots and forecasts: a rule fires when one incident
//! type's trailing-24h count in a district reaches its threshold. Pattern
//! alerts go to superadmins only; the engine enforces that from the
//! candidate's source.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use crime_pulse_alerts_models::AlertSource;
use crime_pulse_incident_models::{Incident, IncidentType};
use serde::Deserialize;

use crate::Candidate;

/// One configured pattern rule.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PatternRule {
    /// Incident type this rule watches.
    pub incident_type: IncidentType,
    /// Trailing-24h count per district that triggers the rule.
    pub threshold: u64,
}

/// Evaluates all rules against the incident window.
///
/// Incidents without a resolved district are ignored; there is no zone
/// to alert on.
#[must_use]
pub fn pattern_candidates(
    incidents: &[Incident],
    rules: &[PatternRule],
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let cutoff = now - Duration::hours(24);

    let mut counts: BTreeMap<(&str, IncidentType), u64> = BTreeMap::new();
    for incident in incidents {
        if incident.occurred_at < cutoff || incident.occurred_at >= now {
            continue;
        }
        if let Some(district) = incident.district.as_deref() {
            *counts.entry((district, incident.incident_type)).or_default() += 1;
        }
    }

    let mut candidates = Vec::new();
    for rule in rules {
        for ((district, incident_type), &count) in &counts {
            if *incident_type == rule.incident_type && count >= rule.threshold {
                candidates.push(Candidate {
                    source: AlertSource::Pattern,
                    zone: (*district).to_string(),
                    score: count as f64,
                    message: format!(
                        "Pattern alert: {count} {incident_type} incidents in {district} over the last 24h"
                    ),
                });
            }
        }
    }

    candidates
}
