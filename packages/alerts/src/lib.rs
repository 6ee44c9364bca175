#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Alert escalation: severity mapping, cooldown, delivery, and audit.
//!
//! Every candidate (hotspot, forecast, or pattern) passes through the
//! same state machine: suppressed below the lowest severity threshold,
//! cooled down when the zone was alerted recently, otherwise escalated
//! into one multi-channel dispatch plus exactly one immutable audit row.

mod engine;
pub mod notify;
pub mod pattern;

pub use engine::{EscalationEngine, EscalationOutcome};
pub use notify::{LogNotifier, Notifier, NotifyError};
pub use pattern::{PatternRule, pattern_candidates};

use crime_pulse_alerts_models::{AlertSource, Channel, Recipient, Role, SeverityThresholds};
use crime_pulse_storage::StorageError;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised during escalation.
///
/// Delivery failures are deliberately *not* represented here: they are
/// logged per recipient/channel and reflected in the audit row's status.
#[derive(Debug, Error)]
pub enum EscalationError {
    /// Audit or cooldown lookup failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// An escalation candidate produced by one of the upstream detectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// What produced the candidate.
    pub source: AlertSource,
    /// Zone the candidate concerns (district code or police zone key).
    pub zone: String,
    /// Score compared against the severity thresholds.
    pub score: f64,
    /// Message delivered verbatim to recipients.
    pub message: String,
}

/// Escalation engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Severity tier thresholds.
    pub thresholds: SeverityThresholds,
    /// Cooldown window per `(zone, alert_type)` dedup key.
    pub cooldown_minutes: i64,
    /// Per-send timeout; a stalled gateway never stalls the run.
    pub send_timeout_secs: u64,
    /// Channels to attempt for each recipient, in order of configuration.
    pub channels: Vec<Channel>,
    /// Always-notified recipients, independent of the directory.
    pub static_recipients: Vec<Recipient>,
    /// Directory roles resolved for hotspot/forecast alerts. Pattern
    /// alerts are restricted to superadmins regardless.
    pub alert_roles: Vec<Role>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            thresholds: SeverityThresholds::default(),
            cooldown_minutes: 30,
            send_timeout_secs: 10,
            channels: vec![Channel::Whatsapp, Channel::Sms, Channel::Email],
            static_recipients: Vec::new(),
            alert_roles: vec![Role::Analyst, Role::Superadmin],
        }
    }
}
