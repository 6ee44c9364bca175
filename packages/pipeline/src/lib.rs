#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! End-to-end pipeline orchestration.
//!
//! One tick chains enrich -> cluster -> forecast -> escalate over a
//! sliding incident window. Stages are isolated: a failing district,
//! zone, or candidate loses only its own unit of work and is counted in
//! the [`RunSummary`], never propagated out of the tick.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crime_pulse_alerts::{
    Candidate, EscalationConfig, EscalationEngine, EscalationOutcome, Notifier, PatternRule,
    pattern_candidates,
};
use crime_pulse_alerts_models::AlertSource;
use crime_pulse_analytics_models::{ForecastHorizon, Hotspot, HotspotKind};
use crime_pulse_forecast::{ForecastOutcome, ForecastParams, TrendForecaster};
use crime_pulse_hotspot::{ClusterOutcome, ClusterParams, HotspotClusterer};
use crime_pulse_incident_models::Incident;
use crime_pulse_storage::{
    AlertStore, AnalyticsStore, ContactDirectory, IncidentFeed, StorageError,
};
use crime_pulse_zones::ZoneResolver;
use serde::Deserialize;
use thiserror::Error;

/// Errors that abort an entire tick.
///
/// Only the initial window read can do that: with no incidents there is
/// nothing for any stage to run on. Everything downstream is isolated
/// per unit and surfaces through the summary counters instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading the incident window failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Pipeline orchestration knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sliding incident window in days.
    pub window_days: i64,
    /// Clustering parameters.
    pub cluster: ClusterParams,
    /// Forecasting parameters.
    pub forecast: ForecastParams,
    /// Escalation parameters.
    pub escalation: EscalationConfig,
    /// Per-incident-type pattern rules.
    pub pattern_rules: Vec<PatternRule>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            cluster: ClusterParams::default(),
            forecast: ForecastParams::default(),
            escalation: EscalationConfig::default(),
            pattern_rules: Vec::new(),
        }
    }
}

/// The storage seams a pipeline reads from and writes to.
#[derive(Clone)]
pub struct PipelineStores {
    /// Derived hotspot/forecast rows.
    pub analytics: Arc<dyn AnalyticsStore>,
    /// Append-only alert audit log.
    pub alerts: Arc<dyn AlertStore>,
    /// Contact directory for recipient resolution.
    pub contacts: Arc<dyn ContactDirectory>,
    /// Cleaned incident feed.
    pub incidents: Arc<dyn IncidentFeed>,
}

/// Escalation counters shared by ticks and sweeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscalationTally {
    /// Candidates evaluated.
    pub candidates: usize,
    /// Candidates that dispatched an alert.
    pub escalated: usize,
    /// Candidates skipped by an active cooldown.
    pub cooled_down: usize,
    /// Candidates below the lowest severity threshold.
    pub suppressed: usize,
    /// Candidates whose escalation failed at the storage layer.
    pub failed: usize,
}

/// Counters from one full tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Incidents fetched for the tick (covers the longer of the cluster
    /// window and the forecast history window).
    pub incidents_seen: usize,
    /// Incidents whose zones were filled in by the resolver this tick.
    pub enriched: usize,
    /// Incidents still without a district after enrichment.
    pub unresolved: usize,
    /// Clustering counters.
    pub cluster: ClusterOutcome,
    /// Forecasting counters.
    pub forecast: ForecastOutcome,
    /// Escalation counters.
    pub escalation: EscalationTally,
    /// Wall-clock duration of the tick.
    pub elapsed: std::time::Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} incidents ({} enriched, {} unresolved)",
            self.incidents_seen, self.enriched, self.unresolved
        )?;
        writeln!(
            f,
            "clusters: {} districts, {} failed, {} hotspots",
            self.cluster.districts_processed,
            self.cluster.districts_failed,
            self.cluster.hotspots_upserted
        )?;
        writeln!(
            f,
            "forecasts: {} seasonal, {} short, {} skipped, {} failed",
            self.forecast.seasonal_rows,
            self.forecast.short_rows,
            self.forecast.skipped,
            self.forecast.failed
        )?;
        writeln!(
            f,
            "alerts: {} candidates, {} escalated, {} cooled down, {} suppressed, {} failed",
            self.escalation.candidates,
            self.escalation.escalated,
            self.escalation.cooled_down,
            self.escalation.suppressed,
            self.escalation.failed
        )?;
        write!(f, "done in {:.1}s", self.elapsed.as_secs_f64())
    }
}

/// Wires the resolver, detectors, and escalation engine into one
/// schedulable unit.
pub struct Pipeline {
    resolver: ZoneResolver,
    clusterer: HotspotClusterer,
    forecaster: TrendForecaster,
    engine: EscalationEngine,
    analytics: Arc<dyn AnalyticsStore>,
    incidents: Arc<dyn IncidentFeed>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Builds a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        resolver: ZoneResolver,
        stores: PipelineStores,
        notifier: Arc<dyn Notifier>,
        config: PipelineConfig,
    ) -> Self {
        let clusterer = HotspotClusterer::new(stores.analytics.clone(), config.cluster);
        let forecaster = TrendForecaster::new(stores.analytics.clone(), config.forecast);
        let engine = EscalationEngine::new(
            stores.alerts,
            stores.contacts,
            notifier,
            config.escalation.clone(),
        );

        Self {
            resolver,
            clusterer,
            forecaster,
            engine,
            analytics: stores.analytics,
            incidents: stores.incidents,
            config,
        }
    }

    /// Runs one full tick at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] only when the incident window
    /// itself cannot be read.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<RunSummary, PipelineError> {
        let started = std::time::Instant::now();

        // One read covers both windows: the short-horizon estimator
        // needs more trailing history than the clustering window.
        let fetch_days = self
            .config
            .window_days
            .max(self.config.forecast.short.history_days);
        let from = now - Duration::days(fetch_days);

        let mut incidents = self.incidents.incidents_between(from, now).await?;
        let mut summary = RunSummary {
            incidents_seen: incidents.len(),
            ..RunSummary::default()
        };
        log::info!(
            "Tick started: {} incidents fetched ({fetch_days}-day history, {}-day cluster window)",
            incidents.len(),
            self.config.window_days
        );

        self.enrich(&mut incidents, &mut summary);

        let window_start = now - Duration::days(self.config.window_days);
        let window: Vec<Incident> = incidents
            .iter()
            .filter(|i| i.occurred_at >= window_start)
            .cloned()
            .collect();

        summary.cluster = self.clusterer.run(&window, now).await;
        summary.forecast = self.forecaster.run(&incidents, now).await;

        let mut candidates = self.stored_candidates().await;
        candidates.extend(pattern_candidates(
            &window,
            &self.config.pattern_rules,
            now,
        ));
        summary.escalation = self.escalate_all(&candidates, now).await;

        summary.elapsed = started.elapsed();
        log::info!("Tick complete: {summary}");
        Ok(summary)
    }

    /// Re-evaluates the stored hotspot and forecast rows for escalation
    /// without recomputing them. Used between full ticks so an operator
    /// can re-run alerting after changing thresholds or contacts.
    pub async fn run_escalation_sweep(&self, now: DateTime<Utc>) -> EscalationTally {
        let candidates = self.stored_candidates().await;
        let tally = self.escalate_all(&candidates, now).await;
        log::info!(
            "Sweep complete: {} candidates, {} escalated, {} cooled down",
            tally.candidates,
            tally.escalated,
            tally.cooled_down
        );
        tally
    }

    /// Fills zone fields on incidents that arrived without them.
    fn enrich(&self, incidents: &mut [Incident], summary: &mut RunSummary) {
        for incident in incidents.iter_mut() {
            if incident.district.is_none() {
                let zone = self.resolver.resolve(incident.lat, incident.lon);
                if zone.resolved {
                    summary.enriched += 1;
                }
                incident.governorate = zone.governorate_code;
                incident.district = zone.district_code;
                incident.police_zone = zone.police_zone_code;
            }
            if incident.district.is_none() {
                summary.unresolved += 1;
            }
        }
        log::info!(
            "Enrichment: {} filled, {} unresolved",
            summary.enriched,
            summary.unresolved
        );
    }

    /// Builds escalation candidates from the stored observed hotspots and
    /// short-horizon forecasts. A failed read loses that family's
    /// candidates for this pass, nothing more.
    async fn stored_candidates(&self) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        match self.analytics.hotspots(false).await {
            Ok(hotspots) => {
                candidates.extend(hotspots.iter().map(hotspot_candidate));
            }
            Err(e) => log::error!("Failed to read hotspots for escalation: {e}"),
        }

        match self.analytics.forecasts().await {
            Ok(forecasts) => {
                // Only the short-horizon rows feed escalation; seasonal
                // rows are reporting output.
                candidates.extend(
                    forecasts
                        .iter()
                        .filter(|f| f.horizon == ForecastHorizon::Short)
                        .map(|f| Candidate {
                            source: AlertSource::Forecast,
                            zone: f.zone_key.clone(),
                            score: f.forecast_count,
                            message: format!(
                                "Forecast alert: {:.0} incidents expected in {} over the next 24h ({:+.0}% vs last week)",
                                f.forecast_count, f.zone_key, f.trend_pct
                            ),
                        }),
                );
            }
            Err(e) => log::error!("Failed to read forecasts for escalation: {e}"),
        }

        candidates
    }

    async fn escalate_all(&self, candidates: &[Candidate], now: DateTime<Utc>) -> EscalationTally {
        let mut tally = EscalationTally {
            candidates: candidates.len(),
            ..EscalationTally::default()
        };

        for candidate in candidates {
            match self.engine.escalate(candidate, now).await {
                Ok(EscalationOutcome::Escalated(_)) => tally.escalated += 1,
                Ok(EscalationOutcome::CooledDown) => tally.cooled_down += 1,
                Ok(EscalationOutcome::Suppressed) => tally.suppressed += 1,
                Err(e) => {
                    log::error!("Escalation failed for {}: {e}", candidate.zone);
                    tally.failed += 1;
                }
            }
        }

        tally
    }
}

/// Maps a stored hotspot row to an escalation candidate.
///
/// The candidate's zone (and therefore the cooldown dedup key) is the
/// administrative zone the row concerns, never the per-cluster upsert
/// key: cluster ids are unstable across runs, and two clusters in the
/// same district are one story for cooldown purposes.
fn hotspot_candidate(hotspot: &Hotspot) -> Candidate {
    let (zone, message) = match hotspot.kind {
        HotspotKind::Cluster => (
            hotspot
                .district
                .clone()
                .unwrap_or_else(|| hotspot.zone_key.clone()),
            format!(
                "Hotspot alert: {} incidents clustered near ({:.4}, {:.4}) in {}",
                hotspot.member_count,
                hotspot.centroid_lat,
                hotspot.centroid_lon,
                hotspot.district.as_deref().unwrap_or("unknown district"),
            ),
        ),
        HotspotKind::PoliceZoneAggregate => (
            hotspot.zone_key.clone(),
            format!(
                "Police zone alert: {} incidents in zone {}",
                hotspot.member_count,
                hotspot.police_zone.as_deref().unwrap_or("unknown"),
            ),
        ),
    };

    Candidate {
        source: AlertSource::Hotspot,
        zone,
        score: hotspot.score,
        message,
    }
}
