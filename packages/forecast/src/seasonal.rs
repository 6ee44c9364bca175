//! Additive seasonal model for 7-day incident forecasts.
//!
//! Fits `y = trend + weekly + yearly` by ordinary least squares: a linear
//! trend, day-of-week offsets, and a first-order yearly Fourier pair. No
//! daily seasonality. The ~95% interval is `yhat ± 1.96σ` with σ taken
//! from the fit residuals.
//!
//! Short histories degrade instead of failing: below
//! [`FULL_MODEL_MIN_DAYS`] the seasonal terms are dropped (trend only),
//! and a singular system falls back to the series mean.

use chrono::{Datelike as _, NaiveDate};

/// One observed day of incident counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCount {
    /// Observation date.
    pub date: NaiveDate,
    /// Incidents on that date.
    pub count: u64,
}

/// One forecast day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    /// Forecast date.
    pub date: NaiveDate,
    /// Point forecast, clamped at 0.
    pub yhat: f64,
    /// Lower ~95% bound, clamped at 0.
    pub lower: f64,
    /// Upper ~95% bound.
    pub upper: f64,
}

/// Minimum days of history before the weekly + yearly terms are used.
///
/// Ten coefficients need comfortably more observations than parameters;
/// three weeks is the smallest history where the weekly pattern has been
/// seen three times.
pub const FULL_MODEL_MIN_DAYS: usize = 21;

/// Minimum days of history to fit anything at all.
pub const MIN_DAYS: usize = 3;

const YEAR_DAYS: f64 = 365.25;
const Z_95: f64 = 1.96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelKind {
    /// Trend + weekly offsets + yearly Fourier pair.
    Full,
    /// Intercept + slope only.
    TrendOnly,
    /// Series mean; last resort when the system is singular.
    MeanOnly,
}

/// A fitted additive model over one daily-count series.
#[derive(Debug, Clone)]
pub struct SeasonalModel {
    kind: ModelKind,
    coefficients: Vec<f64>,
    sigma: f64,
    start: NaiveDate,
    end: NaiveDate,
}

impl SeasonalModel {
    /// Fits the model to a contiguous daily series.
    ///
    /// Returns `None` with fewer than [`MIN_DAYS`] observations — an
    /// insufficient-data case, not an error.
    #[must_use]
    pub fn fit(series: &[DailyCount]) -> Option<Self> {
        if series.len() < MIN_DAYS {
            return None;
        }

        let start = series[0].date;
        let end = series[series.len() - 1].date;
        let y: Vec<f64> = series.iter().map(|d| d.count as f64).collect();

        let kind = if series.len() >= FULL_MODEL_MIN_DAYS {
            ModelKind::Full
        } else {
            ModelKind::TrendOnly
        };

        let (kind, coefficients) = Self::solve_for(kind, series, &y)
            .or_else(|| Self::solve_for(ModelKind::TrendOnly, series, &y))
            .unwrap_or_else(|| {
                let mean = y.iter().sum::<f64>() / y.len() as f64;
                (ModelKind::MeanOnly, vec![mean])
            });

        let mut model = Self {
            kind,
            coefficients,
            sigma: 0.0,
            start,
            end,
        };

        let p = model.coefficients.len();
        let sse: f64 = series
            .iter()
            .zip(&y)
            .map(|(day, &observed)| {
                let err = observed - model.predict_raw(day.date);
                err * err
            })
            .sum();
        let dof = series.len().saturating_sub(p).max(1);
        model.sigma = (sse / dof as f64).sqrt();

        Some(model)
    }

    fn solve_for(
        kind: ModelKind,
        series: &[DailyCount],
        y: &[f64],
    ) -> Option<(ModelKind, Vec<f64>)> {
        let rows: Vec<Vec<f64>> = series
            .iter()
            .map(|d| features(kind, day_index(series[0].date, d.date), d.date))
            .collect();
        least_squares(&rows, y).map(|beta| (kind, beta))
    }

    /// Forecasts the next `horizon` days after the end of the series.
    #[must_use]
    pub fn forecast(&self, horizon: usize) -> Vec<ForecastPoint> {
        let margin = Z_95 * self.sigma;

        (1..=horizon as i64)
            .filter_map(|offset| self.end.checked_add_days(chrono::Days::new(offset as u64)))
            .map(|date| {
                let yhat = self.predict_raw(date).max(0.0);
                ForecastPoint {
                    date,
                    yhat,
                    lower: (yhat - margin).max(0.0),
                    upper: yhat + margin,
                }
            })
            .collect()
    }

    fn predict_raw(&self, date: NaiveDate) -> f64 {
        let row = features(self.kind, day_index(self.start, date), date);
        row.iter()
            .zip(&self.coefficients)
            .map(|(x, b)| x * b)
            .sum()
    }
}

fn day_index(start: NaiveDate, date: NaiveDate) -> f64 {
    (date - start).num_days() as f64
}

fn features(kind: ModelKind, t: f64, date: NaiveDate) -> Vec<f64> {
    match kind {
        ModelKind::MeanOnly => vec![1.0],
        ModelKind::TrendOnly => vec![1.0, t],
        ModelKind::Full => {
            let mut row = vec![1.0, t];

            // Day-of-week dummies, Sunday as baseline.
            let dow = date.weekday().num_days_from_sunday() as usize;
            for d in 1..7 {
                row.push(if dow == d { 1.0 } else { 0.0 });
            }

            let phase = 2.0 * std::f64::consts::PI * f64::from(date.ordinal()) / YEAR_DAYS;
            row.push(phase.sin());
            row.push(phase.cos());
            row
        }
    }
}

/// Solves `XᵀX β = Xᵀy`. Returns `None` if the normal equations are
/// singular (e.g. a day-of-week never observed).
fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    let p = rows.first()?.len();
    if rows.len() < p {
        return None;
    }

    let mut xtx = vec![vec![0.0f64; p]; p];
    let mut xty = vec![0.0f64; p];

    for (row, &observed) in rows.iter().zip(y) {
        for i in 0..p {
            xty[i] += row[i] * observed;
            for j in 0..p {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    solve(&mut xtx, &mut xty)
}

/// Gaussian elimination with partial pivoting.
fn solve(a: &mut [Vec<f64>], b: &mut [f64]) -> Option<Vec<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut solution = vec![0.0f64; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * solution[k]).sum();
        solution[row] = (b[row] - tail) / a[row][row];
    }

    Some(solution)
}
