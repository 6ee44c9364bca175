//! Short-horizon (24 h) per-zone estimator.
//!
//! The point forecast blends the trailing 24 h rate with the recent
//! momentum: `m24 + 0.5 × (m48 − p48)`, where `m48` is the trailing-48h
//! hourly mean and `p48` the 48 h before that. The trend compares the
//! trailing 24 h against the same window seven days earlier.

use chrono::{DateTime, Duration, Timelike as _, Utc};
use serde::Deserialize;

/// Estimator knobs.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ShortTermParams {
    /// Trailing history window in days.
    pub history_days: i64,
    /// Minimum distinct non-empty hourly buckets required; zones below
    /// this are skipped as insufficient data.
    pub min_hourly_buckets: usize,
}

impl Default for ShortTermParams {
    fn default() -> Self {
        Self {
            history_days: 90,
            min_hourly_buckets: 24,
        }
    }
}

/// A computed short-horizon forecast for one zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShortTermForecast {
    /// Predicted incident count over the next 24 h, never negative.
    pub forecast_count: f64,
    /// Percent change of the trailing 24 h versus the same window seven
    /// days earlier; 0 when the earlier window had no incidents.
    pub trend_pct: f64,
}

/// Computes the estimator for one zone's incident timestamps.
///
/// Returns `None` when the zone has fewer than
/// [`ShortTermParams::min_hourly_buckets`] non-empty hourly buckets in
/// the history window — a skip, not an error.
#[must_use]
pub fn short_term(
    timestamps: &[DateTime<Utc>],
    now: DateTime<Utc>,
    params: &ShortTermParams,
) -> Option<ShortTermForecast> {
    let window_start = now - Duration::days(params.history_days);
    let in_window: Vec<DateTime<Utc>> = timestamps
        .iter()
        .copied()
        .filter(|ts| *ts >= window_start && *ts < now)
        .collect();

    let buckets = distinct_hourly_buckets(&in_window);
    if buckets < params.min_hourly_buckets {
        log::debug!("Short-term forecast skipped: {buckets} hourly buckets");
        return None;
    }

    let count_between = |from: DateTime<Utc>, to: DateTime<Utc>| -> f64 {
        in_window.iter().filter(|ts| **ts >= from && **ts < to).count() as f64
    };

    let m24 = count_between(now - Duration::hours(24), now) / 24.0;
    let m48 = count_between(now - Duration::hours(48), now) / 48.0;
    let p48 = count_between(now - Duration::hours(96), now - Duration::hours(48)) / 48.0;

    let hourly_rate = 0.5f64.mul_add(m48 - p48, m24).max(0.0);

    let prior_start = now - Duration::days(7) - Duration::hours(24);
    let prior_mean = count_between(prior_start, now - Duration::days(7)) / 24.0;
    let trend_pct = if prior_mean > 0.0 {
        (m24 - prior_mean) / prior_mean * 100.0
    } else {
        // Zero prior mean: report no trend rather than dividing by zero.
        0.0
    };

    Some(ShortTermForecast {
        forecast_count: hourly_rate * 24.0,
        trend_pct,
    })
}

fn distinct_hourly_buckets(timestamps: &[DateTime<Utc>]) -> usize {
    let mut hours: Vec<i64> = timestamps
        .iter()
        .map(|ts| ts.timestamp() - i64::from(ts.minute()) * 60 - i64::from(ts.second()))
        .collect();
    hours.sort_unstable();
    hours.dedup();
    hours.len()
}
