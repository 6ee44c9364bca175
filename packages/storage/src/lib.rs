#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Storage seams for the hotspot pipeline.
//!
//! The pipeline's persistence needs reduce to four narrow contracts:
//! per-key upserts for derived analytics rows, an append-only alert audit
//! log, a read-only incident feed, and a read-only contact directory.
//! Database-backed implementations live with the platform's storage
//! collaborator; [`MemoryStorage`] here is the reference implementation
//! and the test double.

mod memory;

pub use memory::MemoryStorage;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crime_pulse_alerts_models::{AlertEvent, ContactRecord, Role};
use crime_pulse_analytics_models::{ForecastRecord, Hotspot};
use crime_pulse_incident_models::Incident;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend rejected or failed the operation.
    #[error("storage backend error: {message}")]
    Backend {
        /// Description of what went wrong.
        message: String,
    },
}

/// Per-key upsert store for derived hotspot and forecast rows.
///
/// Keys are `(zone_key, predicted)` for hotspots and `zone_key` for
/// forecasts (forecast rows are always `predicted = true`). `put`
/// overwrites the prior value for the key; the backend guarantees
/// per-key atomicity. Rows here are a rebuildable cache, safe to drop
/// and regenerate.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Inserts or overwrites the hotspot row for its upsert key.
    async fn put_hotspot(&self, hotspot: Hotspot) -> Result<(), StorageError>;

    /// Removes all cluster hotspot rows for a district.
    ///
    /// Called just before a district's freshly computed set is written,
    /// so clusters that dissolved since the last run don't linger.
    async fn delete_hotspots_for_district(
        &self,
        district: &str,
        predicted: bool,
    ) -> Result<(), StorageError>;

    /// Removes one hotspot row by its upsert key, if present.
    ///
    /// Used by the end-of-run sweep that clears rows whose district or
    /// police zone vanished from the incident window.
    async fn delete_hotspot(&self, zone_key: &str, predicted: bool) -> Result<(), StorageError>;

    /// Inserts or overwrites the forecast row for its zone key.
    async fn put_forecast(&self, forecast: ForecastRecord) -> Result<(), StorageError>;

    /// Returns all hotspot rows with the given `predicted` flag.
    async fn hotspots(&self, predicted: bool) -> Result<Vec<Hotspot>, StorageError>;

    /// Returns the hotspot row for a key, if present.
    async fn hotspot(&self, zone_key: &str, predicted: bool)
    -> Result<Option<Hotspot>, StorageError>;

    /// Returns all forecast rows.
    async fn forecasts(&self) -> Result<Vec<ForecastRecord>, StorageError>;
}

/// Append-only audit log of escalation decisions.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Appends one audit row. Rows are never updated or deleted.
    async fn append(&self, event: AlertEvent) -> Result<(), StorageError>;

    /// Returns `true` if an alert with this dedup key was *sent* within
    /// `window` before `now`. Skipped and failed rows don't count: a
    /// skip never extends a cooldown, and a fully failed dispatch should
    /// not block a retry on the next sweep.
    async fn sent_within(
        &self,
        dedup_key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Returns the full audit log, oldest first.
    async fn events(&self) -> Result<Vec<AlertEvent>, StorageError>;
}

/// Read-only view of the cleaned incident feed.
#[async_trait]
pub trait IncidentFeed: Send + Sync {
    /// Returns incidents with `from <= occurred_at < to`.
    async fn incidents_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Incident>, StorageError>;
}

/// Read-only view of the contact directory.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Returns active contacts whose role is in `roles`.
    async fn active_with_roles(&self, roles: &[Role]) -> Result<Vec<ContactRecord>, StorageError>;
}
