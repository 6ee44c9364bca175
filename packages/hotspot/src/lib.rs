#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Density-based hotspot detection over resolved incidents.
//!
//! Districts are clustered independently: each district is one unit of
//! work writing to disjoint upsert keys, so units run under a bounded
//! worker pool and one district's failure never aborts the others.

pub mod dbscan;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crime_pulse_analytics_models::{Hotspot, HotspotKind};
use crime_pulse_incident_models::Incident;
use crime_pulse_storage::{AnalyticsStore, StorageError};
use futures::StreamExt as _;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while persisting hotspot rows.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Storage write failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Clustering knobs.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    /// DBSCAN eps in raw degrees (0.01 is roughly 1.1 km).
    pub eps_degrees: f64,
    /// Minimum neighborhood size for a core point.
    pub min_samples: usize,
    /// Minimum incidents a district needs before clustering runs at all.
    pub min_points: usize,
    /// Bounded worker-pool width for per-district units.
    pub concurrency: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            eps_degrees: 0.01,
            min_samples: 3,
            min_points: 3,
            concurrency: 4,
        }
    }
}

/// Counters from one clustering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterOutcome {
    /// Districts that completed (including ones yielding zero clusters).
    pub districts_processed: usize,
    /// Districts whose writes failed; their prior rows were left intact
    /// or rolled back, never partial.
    pub districts_failed: usize,
    /// Hotspot rows upserted, clusters plus police-zone aggregates.
    pub hotspots_upserted: usize,
}

/// Detects per-district incident clusters and per-police-zone aggregates.
pub struct HotspotClusterer {
    store: Arc<dyn AnalyticsStore>,
    params: ClusterParams,
}

impl HotspotClusterer {
    /// Creates a clusterer writing to the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AnalyticsStore>, params: ClusterParams) -> Self {
        Self { store, params }
    }

    /// Runs the full clustering pass over an incident window.
    ///
    /// Incidents without a resolved district are ignored by the cluster
    /// pass (they still count toward police-zone aggregates when a police
    /// zone is set). Never returns an error: per-district failures are
    /// logged and counted in the outcome.
    pub async fn run(&self, incidents: &[Incident], now: DateTime<Utc>) -> ClusterOutcome {
        let mut by_district: BTreeMap<&str, Vec<&Incident>> = BTreeMap::new();
        for incident in incidents {
            if let Some(district) = incident.district.as_deref() {
                by_district.entry(district).or_default().push(incident);
            }
        }
        let districts: BTreeSet<String> = by_district.keys().map(ToString::to_string).collect();

        let mut outcome = ClusterOutcome::default();

        let results: Vec<(String, Result<usize, ClusterError>)> =
            futures::stream::iter(by_district.into_iter().map(|(district, members)| {
                let district = district.to_string();
                async move {
                    let result = self.cluster_district(&district, &members, now).await;
                    (district, result)
                }
            }))
            .buffer_unordered(self.params.concurrency.max(1))
            .collect()
            .await;

        for (district, result) in results {
            match result {
                Ok(upserted) => {
                    outcome.districts_processed += 1;
                    outcome.hotspots_upserted += upserted;
                }
                Err(e) => {
                    log::error!("Hotspot clustering failed for district {district}: {e}");
                    outcome.districts_failed += 1;
                }
            }
        }

        let mut zone_keys = BTreeSet::new();
        match self.aggregate_police_zones(incidents, now).await {
            Ok(written) => {
                outcome.hotspots_upserted += written.len();
                zone_keys = written;
            }
            Err(e) => log::error!("Police zone aggregation failed: {e}"),
        }

        // Rows whose district or police zone dropped out of the window
        // entirely are never visited above; clear them so a dissolved
        // hotspot stops feeding escalation sweeps.
        if let Err(e) = self.sweep_stale(&districts, &zone_keys).await {
            log::error!("Stale hotspot sweep failed: {e}");
        }

        log::info!(
            "Clustering pass complete: {} districts, {} failed, {} hotspots",
            outcome.districts_processed,
            outcome.districts_failed,
            outcome.hotspots_upserted,
        );

        outcome
    }

    /// Clusters one district and replaces its hotspot rows.
    ///
    /// Stale rows are cleared only after the new set is computed; if any
    /// upsert fails the district's rows are re-cleared so a failed unit
    /// never leaves a partial set behind.
    async fn cluster_district(
        &self,
        district: &str,
        members: &[&Incident],
        now: DateTime<Utc>,
    ) -> Result<usize, ClusterError> {
        if members.len() < self.params.min_points {
            log::debug!(
                "Skipping district {district}: {} incidents below minimum {}",
                members.len(),
                self.params.min_points
            );
            // The skip still clears prior rows: a district that thinned
            // out below the minimum has no hotspots anymore.
            self.store.delete_hotspots_for_district(district, false).await?;
            return Ok(0);
        }

        let hotspots = district_hotspots(district, members, self.params, now);

        self.store.delete_hotspots_for_district(district, false).await?;

        let total = hotspots.len();
        for hotspot in hotspots {
            if let Err(e) = self.store.put_hotspot(hotspot).await {
                // Roll the district back to empty rather than leaving a
                // partial cluster set.
                self.store
                    .delete_hotspots_for_district(district, false)
                    .await?;
                return Err(e.into());
            }
        }

        Ok(total)
    }

    /// Upserts one aggregate row per police zone, scored by raw count.
    /// Returns the set of zone keys written so the stale sweep can tell
    /// live aggregates from dissolved ones.
    async fn aggregate_police_zones(
        &self,
        incidents: &[Incident],
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<String>, ClusterError> {
        let mut by_zone: BTreeMap<&str, Vec<&Incident>> = BTreeMap::new();
        for incident in incidents {
            if let Some(zone) = incident.police_zone.as_deref() {
                by_zone.entry(zone).or_default().push(incident);
            }
        }

        let mut written = BTreeSet::new();
        for (zone, members) in by_zone {
            let count = members.len() as u64;
            let zone_key = format!("pz:{zone}");
            self.store
                .put_hotspot(Hotspot {
                    zone_key: zone_key.clone(),
                    kind: HotspotKind::PoliceZoneAggregate,
                    score: count as f64,
                    member_count: count,
                    centroid_lat: mean(members.iter().map(|i| i.lat)),
                    centroid_lon: mean(members.iter().map(|i| i.lon)),
                    district: None,
                    police_zone: Some(zone.to_string()),
                    governorate: dominant(members.iter().filter_map(|i| i.governorate.clone())),
                    dominant_type: dominant(members.iter().map(|i| i.incident_type)),
                    created_at: now,
                    predicted: false,
                })
                .await?;
            written.insert(zone_key);
        }

        Ok(written)
    }

    /// Deletes observed rows whose district or police zone no longer
    /// appears in the incident window.
    async fn sweep_stale(
        &self,
        districts: &BTreeSet<String>,
        zone_keys: &BTreeSet<String>,
    ) -> Result<(), ClusterError> {
        for row in self.store.hotspots(false).await? {
            let stale = match row.kind {
                HotspotKind::Cluster => {
                    row.district.as_ref().is_none_or(|d| !districts.contains(d))
                }
                HotspotKind::PoliceZoneAggregate => !zone_keys.contains(&row.zone_key),
            };
            if stale {
                log::debug!("Clearing stale hotspot row {}", row.zone_key);
                self.store.delete_hotspot(&row.zone_key, false).await?;
            }
        }
        Ok(())
    }
}

/// Computes the hotspot rows for one district. Pure; idempotent for
/// identical input up to cluster numbering.
fn district_hotspots(
    district: &str,
    members: &[&Incident],
    params: ClusterParams,
    now: DateTime<Utc>,
) -> Vec<Hotspot> {
    let points: Vec<[f64; 2]> = members.iter().map(|i| [i.lon, i.lat]).collect();
    let labels = dbscan::cluster(&points, params.eps_degrees, params.min_samples);

    let mut clusters: BTreeMap<usize, Vec<&Incident>> = BTreeMap::new();
    for (incident, label) in members.iter().zip(&labels) {
        if let Some(cluster_id) = label {
            clusters.entry(*cluster_id).or_default().push(incident);
        }
    }

    clusters
        .into_iter()
        .enumerate()
        .map(|(i, (_, cluster_members))| {
            let count = cluster_members.len() as u64;
            Hotspot {
                zone_key: format!("{district}:hs-{i}"),
                kind: HotspotKind::Cluster,
                score: count as f64,
                member_count: count,
                centroid_lat: mean(cluster_members.iter().map(|m| m.lat)),
                centroid_lon: mean(cluster_members.iter().map(|m| m.lon)),
                district: Some(district.to_string()),
                police_zone: dominant(cluster_members.iter().filter_map(|m| m.police_zone.clone())),
                governorate: dominant(cluster_members.iter().filter_map(|m| m.governorate.clone())),
                dominant_type: dominant(cluster_members.iter().map(|m| m.incident_type)),
                created_at: now,
                predicted: false,
            }
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Most frequent value; ties broken by first occurrence.
fn dominant<T: Clone + Eq + Hash>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (order, value) in values.enumerate() {
        counts
            .entry(value)
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, order));
    }

    counts
        .into_iter()
        .min_by_key(|(_, (count, first))| (usize::MAX - count, *first))
        .map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use crime_pulse_incident_models::IncidentType;
    use crime_pulse_storage::MemoryStorage;

    use super::*;

    fn incident(id: &str, lat: f64, lon: f64, district: &str, ty: IncidentType) -> Incident {
        Incident {
            id: id.to_string(),
            incident_type: ty,
            lat,
            lon,
            occurred_at: Utc::now(),
            governorate: Some("G1".to_string()),
            district: Some(district.to_string()),
            police_zone: Some("PZ1".to_string()),
        }
    }

    fn theft_trio() -> Vec<Incident> {
        vec![
            incident("i1", 29.300, 47.490, "D01", IncidentType::Theft),
            incident("i2", 29.301, 47.491, "D01", IncidentType::Theft),
            incident("i3", 29.302, 47.492, "D01", IncidentType::Theft),
        ]
    }

    #[tokio::test]
    async fn three_nearby_thefts_make_one_hotspot() {
        let store = Arc::new(MemoryStorage::new());
        let clusterer = HotspotClusterer::new(store.clone(), ClusterParams::default());

        let outcome = clusterer.run(&theft_trio(), Utc::now()).await;
        assert_eq!(outcome.districts_processed, 1);
        assert_eq!(outcome.districts_failed, 0);

        let hotspots = store.hotspots(false).await.unwrap();
        let clusters: Vec<_> = hotspots
            .iter()
            .filter(|h| h.kind == HotspotKind::Cluster)
            .collect();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_count, 3);
        assert!((clusters[0].score - 3.0).abs() < f64::EPSILON);
        assert_eq!(clusters[0].dominant_type, Some(IncidentType::Theft));
        assert_eq!(clusters[0].district.as_deref(), Some("D01"));
    }

    #[tokio::test]
    async fn rerun_on_unchanged_window_is_idempotent() {
        let store = Arc::new(MemoryStorage::new());
        let clusterer = HotspotClusterer::new(store.clone(), ClusterParams::default());
        let incidents = theft_trio();
        let now = Utc::now();

        clusterer.run(&incidents, now).await;
        let first: Vec<_> = store
            .hotspots(false)
            .await
            .unwrap()
            .into_iter()
            .map(|h| (h.centroid_lat.to_bits(), h.centroid_lon.to_bits(), h.member_count))
            .collect();

        clusterer.run(&incidents, now).await;
        let second: Vec<_> = store
            .hotspots(false)
            .await
            .unwrap()
            .into_iter()
            .map(|h| (h.centroid_lat.to_bits(), h.centroid_lon.to_bits(), h.member_count))
            .collect();

        assert_eq!(first, second);
        // Still exactly one cluster row for the district, not accumulating.
        assert_eq!(
            store
                .hotspots(false)
                .await
                .unwrap()
                .iter()
                .filter(|h| h.kind == HotspotKind::Cluster)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn sparse_district_is_skipped() {
        let store = Arc::new(MemoryStorage::new());
        let clusterer = HotspotClusterer::new(store.clone(), ClusterParams::default());

        let incidents = vec![
            incident("i1", 29.3, 47.49, "D02", IncidentType::Robbery),
            incident("i2", 29.9, 48.2, "D02", IncidentType::Robbery),
        ];
        let outcome = clusterer.run(&incidents, Utc::now()).await;

        assert_eq!(outcome.districts_processed, 1);
        assert!(store
            .hotspots(false)
            .await
            .unwrap()
            .iter()
            .all(|h| h.kind != HotspotKind::Cluster));
    }

    #[tokio::test]
    async fn scattered_points_yield_no_clusters_but_aggregate_remains() {
        let store = Arc::new(MemoryStorage::new());
        let clusterer = HotspotClusterer::new(store.clone(), ClusterParams::default());

        let incidents = vec![
            incident("i1", 29.1, 47.1, "D01", IncidentType::Theft),
            incident("i2", 29.5, 47.9, "D01", IncidentType::Theft),
            incident("i3", 30.1, 48.5, "D01", IncidentType::Theft),
        ];
        clusterer.run(&incidents, Utc::now()).await;

        let hotspots = store.hotspots(false).await.unwrap();
        assert!(hotspots.iter().all(|h| h.kind != HotspotKind::Cluster));

        let aggregate = hotspots
            .iter()
            .find(|h| h.kind == HotspotKind::PoliceZoneAggregate)
            .unwrap();
        assert_eq!(aggregate.zone_key, "pz:PZ1");
        assert_eq!(aggregate.member_count, 3);
    }

    #[tokio::test]
    async fn empty_window_clears_previous_rows() {
        let store = Arc::new(MemoryStorage::new());
        let clusterer = HotspotClusterer::new(store.clone(), ClusterParams::default());

        clusterer.run(&theft_trio(), Utc::now()).await;
        assert!(!store.hotspots(false).await.unwrap().is_empty());

        // Every incident aged out of the window: both the cluster rows
        // and the police-zone aggregate must dissolve with it.
        clusterer.run(&[], Utc::now()).await;
        assert!(store.hotspots(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn thinned_district_loses_its_cluster_rows() {
        let store = Arc::new(MemoryStorage::new());
        let clusterer = HotspotClusterer::new(store.clone(), ClusterParams::default());

        clusterer.run(&theft_trio(), Utc::now()).await;
        assert!(store
            .hotspots(false)
            .await
            .unwrap()
            .iter()
            .any(|h| h.kind == HotspotKind::Cluster));

        // Same district, now below the clustering minimum.
        let trio = theft_trio();
        clusterer.run(&trio[..2], Utc::now()).await;

        let hotspots = store.hotspots(false).await.unwrap();
        assert!(hotspots.iter().all(|h| h.kind != HotspotKind::Cluster));

        // The aggregate survives but reflects the thinner window.
        let aggregate = hotspots
            .iter()
            .find(|h| h.kind == HotspotKind::PoliceZoneAggregate)
            .unwrap();
        assert_eq!(aggregate.member_count, 2);
    }

    #[test]
    fn dominant_breaks_ties_by_first_occurrence() {
        let values = ["b", "a", "a", "b"];
        assert_eq!(dominant(values.iter().copied()), Some("b"));
        assert_eq!(dominant(std::iter::empty::<&str>()), None);
    }
}
