#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Alert, severity, and recipient types for the escalation engine.
//!
//! [`AlertEvent`] rows are the immutable audit trail: exactly one is
//! written per escalation decision and none is ever updated or deleted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Ordered severity tiers for escalated alerts.
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
pub enum Severity {
    /// Lowest escalatable tier.
    Low,
    /// Elevated activity.
    Medium,
    /// Serious activity.
    High,
    /// Highest tier.
    Critical,
}

/// Score thresholds for each severity tier, ordered ascending.
///
/// A score below `low` is suppressed entirely.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    /// Minimum score for [`Severity::Low`].
    pub low: f64,
    /// Minimum score for [`Severity::Medium`].
    pub medium: f64,
    /// Minimum score for [`Severity::High`].
    pub high: f64,
    /// Minimum score for [`Severity::Critical`].
    pub critical: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            low: 10.0,
            medium: 20.0,
            high: 40.0,
            critical: 60.0,
        }
    }
}

impl SeverityThresholds {
    /// Returns the highest tier whose threshold is `<= score`, or `None`
    /// when the score falls below the `low` threshold (suppressed).
    #[must_use]
    pub fn classify(&self, score: f64) -> Option<Severity> {
        if score >= self.critical {
            Some(Severity::Critical)
        } else if score >= self.high {
            Some(Severity::High)
        } else if score >= self.medium {
            Some(Severity::Medium)
        } else if score >= self.low {
            Some(Severity::Low)
        } else {
            None
        }
    }
}

/// What kind of candidate produced an alert.
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
pub enum AlertSource {
    /// A detected hotspot cluster or police-zone aggregate.
    Hotspot,
    /// A short-horizon forecast.
    Forecast,
    /// A per-incident-type pattern rule.
    Pattern,
}

/// Final status of an escalation decision.
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
pub enum AlertStatus {
    /// At least one delivery succeeded.
    Sent,
    /// Every delivery attempt failed.
    Failed,
    /// Suppressed by the cooldown window; nothing was dispatched.
    CooldownSkipped,
}

/// A notification delivery channel.
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
pub enum Channel {
    /// `WhatsApp` message.
    Whatsapp,
    /// Plain SMS.
    Sms,
    /// Email.
    Email,
}

/// Role of a contact in the directory.
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
pub enum Role {
    /// Crime analyst; receives hotspot and forecast alerts.
    Analyst,
    /// Platform superadmin; receives everything including pattern alerts.
    Superadmin,
    /// Read-only dashboard user; never alerted.
    Viewer,
}

/// An entry in the contact directory (an external collaborator; this core
/// only reads it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    /// Stable recipient identifier.
    pub id: String,
    /// Directory role.
    pub role: Role,
    /// Inactive contacts are never alerted.
    pub active: bool,
    /// Channel addresses (phone numbers, email addresses).
    #[serde(default)]
    pub addresses: BTreeMap<Channel, String>,
}

/// A resolved alert recipient with the addresses to deliver to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    /// Stable recipient identifier.
    pub id: String,
    /// Channel addresses.
    #[serde(default)]
    pub addresses: BTreeMap<Channel, String>,
}

impl From<ContactRecord> for Recipient {
    fn from(contact: ContactRecord) -> Self {
        Self {
            id: contact.id,
            addresses: contact.addresses,
        }
    }
}

/// One immutable audit row per escalation decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    /// Unique event id.
    pub id: Uuid,
    /// What produced the candidate.
    pub source: AlertSource,
    /// Severity tier the score mapped to.
    pub severity: Severity,
    /// Zone the alert concerns.
    pub zone: String,
    /// Explicit `(zone, alert_type)` dedup key driving the cooldown.
    pub dedup_key: String,
    /// Human-readable alert message.
    pub message: String,
    /// Ids of every recipient the alert was addressed to.
    pub recipients: Vec<String>,
    /// When the decision was made.
    pub sent_at: DateTime<Utc>,
    /// Outcome of the decision.
    pub status: AlertStatus,
}

/// Builds the explicit cooldown dedup key for a zone and alert source.
///
/// Replaces the legacy message-text substring match, which could
/// under/over-match when one zone name was a substring of another.
#[must_use]
pub fn dedup_key(zone: &str, source: AlertSource) -> String {
    format!("{zone}:{source}")
}
