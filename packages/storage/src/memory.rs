//! In-memory storage backend.
//!
//! Backs the default single-process deployment and every test. All maps
//! sit behind `tokio` RwLocks; per-key atomicity falls out of holding the
//! write guard for the whole upsert.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crime_pulse_alerts_models::{AlertEvent, AlertStatus, ContactRecord, Role};
use crime_pulse_analytics_models::{ForecastRecord, Hotspot, HotspotKind};
use crime_pulse_incident_models::Incident;
use tokio::sync::RwLock;

use crate::{AlertStore, AnalyticsStore, ContactDirectory, IncidentFeed, StorageError};

/// In-memory implementation of all four storage contracts.
#[derive(Default)]
pub struct MemoryStorage {
    hotspots: RwLock<BTreeMap<(String, bool), Hotspot>>,
    forecasts: RwLock<BTreeMap<String, ForecastRecord>>,
    alerts: RwLock<Vec<AlertEvent>>,
    incidents: RwLock<Vec<Incident>>,
    contacts: RwLock<Vec<ContactRecord>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the incident feed contents.
    pub async fn seed_incidents(&self, incidents: Vec<Incident>) {
        *self.incidents.write().await = incidents;
    }

    /// Replaces the contact directory contents.
    pub async fn seed_contacts(&self, contacts: Vec<ContactRecord>) {
        *self.contacts.write().await = contacts;
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStorage {
    async fn put_hotspot(&self, hotspot: Hotspot) -> Result<(), StorageError> {
        let key = hotspot.upsert_key();
        self.hotspots.write().await.insert(key, hotspot);
        Ok(())
    }

    async fn delete_hotspots_for_district(
        &self,
        district: &str,
        predicted: bool,
    ) -> Result<(), StorageError> {
        self.hotspots.write().await.retain(|(_, p), hotspot| {
            *p != predicted
                || hotspot.kind != HotspotKind::Cluster
                || hotspot.district.as_deref() != Some(district)
        });
        Ok(())
    }

    async fn delete_hotspot(&self, zone_key: &str, predicted: bool) -> Result<(), StorageError> {
        self.hotspots
            .write()
            .await
            .remove(&(zone_key.to_string(), predicted));
        Ok(())
    }

    async fn put_forecast(&self, forecast: ForecastRecord) -> Result<(), StorageError> {
        self.forecasts
            .write()
            .await
            .insert(forecast.zone_key.clone(), forecast);
        Ok(())
    }

    async fn hotspots(&self, predicted: bool) -> Result<Vec<Hotspot>, StorageError> {
        Ok(self
            .hotspots
            .read()
            .await
            .values()
            .filter(|h| h.predicted == predicted)
            .cloned()
            .collect())
    }

    async fn hotspot(
        &self,
        zone_key: &str,
        predicted: bool,
    ) -> Result<Option<Hotspot>, StorageError> {
        Ok(self
            .hotspots
            .read()
            .await
            .get(&(zone_key.to_string(), predicted))
            .cloned())
    }

    async fn forecasts(&self) -> Result<Vec<ForecastRecord>, StorageError> {
        Ok(self.forecasts.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl AlertStore for MemoryStorage {
    async fn append(&self, event: AlertEvent) -> Result<(), StorageError> {
        self.alerts.write().await.push(event);
        Ok(())
    }

    async fn sent_within(
        &self,
        dedup_key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let cutoff = now - window;
        Ok(self.alerts.read().await.iter().any(|event| {
            event.dedup_key == dedup_key
                && event.status == AlertStatus::Sent
                && event.sent_at > cutoff
        }))
    }

    async fn events(&self) -> Result<Vec<AlertEvent>, StorageError> {
        Ok(self.alerts.read().await.clone())
    }
}

#[async_trait]
impl IncidentFeed for MemoryStorage {
    async fn incidents_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Incident>, StorageError> {
        Ok(self
            .incidents
            .read()
            .await
            .iter()
            .filter(|i| i.occurred_at >= from && i.occurred_at < to)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContactDirectory for MemoryStorage {
    async fn active_with_roles(&self, roles: &[Role]) -> Result<Vec<ContactRecord>, StorageError> {
        Ok(self
            .contacts
            .read()
            .await
            .iter()
            .filter(|c| c.active && roles.contains(&c.role))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crime_pulse_alerts_models::{AlertSource, Severity};
    use uuid::Uuid;

    use super::*;

    fn hotspot(zone_key: &str, predicted: bool, score: f64) -> Hotspot {
        Hotspot {
            zone_key: zone_key.to_string(),
            kind: HotspotKind::Cluster,
            score,
            member_count: score as u64,
            centroid_lat: 29.3,
            centroid_lon: 47.5,
            district: Some("D01".to_string()),
            police_zone: None,
            governorate: None,
            dominant_type: None,
            created_at: Utc::now(),
            predicted,
        }
    }

    fn event(dedup_key: &str, status: AlertStatus, sent_at: DateTime<Utc>) -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            source: AlertSource::Hotspot,
            severity: Severity::High,
            zone: "D01".to_string(),
            dedup_key: dedup_key.to_string(),
            message: "test".to_string(),
            recipients: vec![],
            sent_at,
            status,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_per_key() {
        let store = MemoryStorage::new();
        store.put_hotspot(hotspot("D01:hs-0", false, 3.0)).await.unwrap();
        store.put_hotspot(hotspot("D01:hs-0", false, 5.0)).await.unwrap();

        let rows = store.hotspots(false).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].score - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn predicted_flag_is_part_of_the_key() {
        let store = MemoryStorage::new();
        store.put_hotspot(hotspot("D01:hs-0", false, 3.0)).await.unwrap();
        store.put_hotspot(hotspot("D01:hs-0", true, 4.0)).await.unwrap();

        assert_eq!(store.hotspots(false).await.unwrap().len(), 1);
        assert_eq!(store.hotspots(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_clears_only_that_districts_clusters() {
        let store = MemoryStorage::new();
        store.put_hotspot(hotspot("D01:hs-0", false, 3.0)).await.unwrap();

        let mut other = hotspot("D02:hs-0", false, 4.0);
        other.district = Some("D02".to_string());
        store.put_hotspot(other).await.unwrap();

        store.delete_hotspots_for_district("D01", false).await.unwrap();

        let rows = store.hotspots(false).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].district.as_deref(), Some("D02"));
    }

    #[tokio::test]
    async fn sent_within_ignores_skips_and_old_rows() {
        let store = MemoryStorage::new();
        let now = Utc::now();

        store
            .append(event("D01:hotspot", AlertStatus::CooldownSkipped, now))
            .await
            .unwrap();
        assert!(!store
            .sent_within("D01:hotspot", Duration::minutes(30), now)
            .await
            .unwrap());

        store
            .append(event("D01:hotspot", AlertStatus::Sent, now - Duration::minutes(45)))
            .await
            .unwrap();
        assert!(!store
            .sent_within("D01:hotspot", Duration::minutes(30), now)
            .await
            .unwrap());

        store
            .append(event("D01:hotspot", AlertStatus::Sent, now - Duration::minutes(5)))
            .await
            .unwrap();
        assert!(store
            .sent_within("D01:hotspot", Duration::minutes(30), now)
            .await
            .unwrap());
    }
}
