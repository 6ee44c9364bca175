#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-zone incident trend forecasting.
//!
//! Two coexisting estimators, both upserting [`ForecastRecord`] rows
//! keyed by `(zone_key, predicted = true)`:
//!
//! * a 7-day additive seasonal model over daily counts, fitted globally
//!   and per governorate (reporting horizon), and
//! * a 24 h short-horizon estimator per district (escalation horizon).
//!
//! Reruns overwrite the prior rows; no forecast history is kept.

pub mod seasonal;
pub mod short_term;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use crime_pulse_analytics_models::{ForecastHorizon, ForecastRecord};
use crime_pulse_incident_models::Incident;
use crime_pulse_storage::{AnalyticsStore, StorageError};
use serde::Deserialize;
use thiserror::Error;

use seasonal::{DailyCount, SeasonalModel};
use short_term::{ShortTermParams, short_term};

/// Errors raised while persisting forecast rows.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Storage write failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Forecasting knobs.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct ForecastParams {
    /// Short-horizon estimator parameters.
    pub short: ShortTermParams,
}

/// Counters from one forecasting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForecastOutcome {
    /// Seasonal rows upserted (7 per fitted scope).
    pub seasonal_rows: usize,
    /// Short-horizon rows upserted.
    pub short_rows: usize,
    /// Zones/scopes skipped for insufficient history.
    pub skipped: usize,
    /// Zones whose row write failed.
    pub failed: usize,
}

/// Scope key for the global seasonal fit.
const GLOBAL_SCOPE: &str = "global";

/// Seasonal forecast horizon in days.
const SEASONAL_HORIZON_DAYS: usize = 7;

/// Computes and persists both forecast families.
pub struct TrendForecaster {
    store: Arc<dyn AnalyticsStore>,
    params: ForecastParams,
}

impl TrendForecaster {
    /// Creates a forecaster writing to the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AnalyticsStore>, params: ForecastParams) -> Self {
        Self { store, params }
    }

    /// Runs both estimators over an incident window.
    ///
    /// Never returns an error: insufficient history is a skip, and a
    /// failed write only loses that zone's row.
    pub async fn run(&self, incidents: &[Incident], now: DateTime<Utc>) -> ForecastOutcome {
        let mut outcome = ForecastOutcome::default();

        self.run_seasonal(incidents, &mut outcome).await;
        self.run_short_term(incidents, now, &mut outcome).await;

        log::info!(
            "Forecast pass complete: {} seasonal rows, {} short rows, {} skipped, {} failed",
            outcome.seasonal_rows,
            outcome.short_rows,
            outcome.skipped,
            outcome.failed,
        );

        outcome
    }

    /// Fits the seasonal model globally and per governorate.
    async fn run_seasonal(&self, incidents: &[Incident], outcome: &mut ForecastOutcome) {
        let mut scopes: Vec<(String, Vec<DailyCount>)> =
            vec![(GLOBAL_SCOPE.to_string(), daily_counts(incidents.iter()))];

        let mut by_governorate: BTreeMap<&str, Vec<&Incident>> = BTreeMap::new();
        for incident in incidents {
            if let Some(gov) = incident.governorate.as_deref() {
                by_governorate.entry(gov).or_default().push(incident);
            }
        }
        for (gov, members) in by_governorate {
            scopes.push((gov.to_string(), daily_counts(members.into_iter())));
        }

        for (scope, series) in scopes {
            let Some(model) = SeasonalModel::fit(&series) else {
                log::debug!("Seasonal forecast skipped for {scope}: insufficient history");
                outcome.skipped += 1;
                continue;
            };

            for (offset, point) in model.forecast(SEASONAL_HORIZON_DAYS).iter().enumerate() {
                let valid_from = day_start(point.date);
                let record = ForecastRecord {
                    zone_key: format!("{scope}:d{}", offset + 1),
                    horizon: ForecastHorizon::Seasonal,
                    forecast_count: point.yhat,
                    trend_pct: 0.0,
                    lower_bound: point.lower,
                    upper_bound: point.upper,
                    valid_from,
                    valid_until: valid_from + Duration::days(1),
                    predicted: true,
                };

                if let Err(e) = self.store.put_forecast(record).await {
                    log::error!("Failed to write seasonal forecast for {scope}: {e}");
                    outcome.failed += 1;
                } else {
                    outcome.seasonal_rows += 1;
                }
            }
        }
    }

    /// Runs the 24 h estimator for every district seen in the window.
    async fn run_short_term(
        &self,
        incidents: &[Incident],
        now: DateTime<Utc>,
        outcome: &mut ForecastOutcome,
    ) {
        let mut by_district: BTreeMap<&str, Vec<DateTime<Utc>>> = BTreeMap::new();
        for incident in incidents {
            if let Some(district) = incident.district.as_deref() {
                by_district.entry(district).or_default().push(incident.occurred_at);
            }
        }

        for (district, timestamps) in by_district {
            let Some(forecast) = short_term(&timestamps, now, &self.params.short) else {
                outcome.skipped += 1;
                continue;
            };

            let record = ForecastRecord {
                zone_key: district.to_string(),
                horizon: ForecastHorizon::Short,
                forecast_count: forecast.forecast_count,
                trend_pct: forecast.trend_pct,
                lower_bound: forecast.forecast_count,
                upper_bound: forecast.forecast_count,
                valid_from: now,
                valid_until: now + Duration::hours(24),
                predicted: true,
            };

            if let Err(e) = self.store.put_forecast(record).await {
                log::error!("Failed to write short-term forecast for {district}: {e}");
                outcome.failed += 1;
            } else {
                outcome.short_rows += 1;
            }
        }
    }
}

/// Builds a contiguous daily series (gaps filled with zero counts) from
/// incident timestamps.
fn daily_counts<'a>(incidents: impl Iterator<Item = &'a Incident>) -> Vec<DailyCount> {
    let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for incident in incidents {
        *counts.entry(incident.occurred_at.date_naive()).or_default() += 1;
    }

    let (Some((&first, _)), Some((&last, _))) =
        (counts.first_key_value(), counts.last_key_value())
    else {
        return Vec::new();
    };

    let mut series = Vec::new();
    let mut date = first;
    while date <= last {
        series.push(DailyCount {
            date,
            count: counts.get(&date).copied().unwrap_or(0),
        });
        let Some(next) = date.succ_opt() else { break };
        date = next;
    }

    series
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}
