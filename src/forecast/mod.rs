//! Daily cost forecasting.
//!
//! Any model that can be fitted to a `(date, value)` series and then queried
//! for arbitrary dates implements [`Forecaster`]; the pipeline only depends on
//! that pair of traits. [`seasonal::SeasonalModel`] is the built-in
//! implementation, backed by augurs.

pub mod plot;
pub mod seasonal;

use crate::models::{ForecastPoint, MonthlyForecastTotal, SeriesPoint, YearMonth};
use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

/// Error type for forecasting operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastError {
    #[error("insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("degenerate series: {0}")]
    DegenerateSeries(String),

    #[error("invalid forecast setting: {0}")]
    InvalidSetting(String),

    #[error("forecast model error: {0}")]
    Model(String),
}

pub trait Forecaster {
    type Model: FittedModel;

    fn fit(&self, series: &[SeriesPoint]) -> Result<Self::Model, ForecastError>;
}

pub trait FittedModel {
    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<ForecastPoint>, ForecastError>;

    fn last_observed(&self) -> NaiveDate;
}

/// Every distinct historical date followed by `horizon_days` consecutive days
/// after the last observation.
pub fn future_dates(series: &[SeriesPoint], horizon_days: u32) -> Result<Vec<NaiveDate>, ForecastError> {
    let mut dates: Vec<NaiveDate> = series.iter().map(|p| p.ds).collect();
    dates.sort_unstable();
    dates.dedup();
    if let Some(&last) = dates.last() {
        let horizon = u64::from(horizon_days);
        if last.checked_add_days(Days::new(horizon)).is_none() {
            return Err(ForecastError::InvalidSetting(format!(
                "a horizon of {horizon_days} days from {last} is past the last supported date"
            )));
        }
        dates.extend((1..=horizon).filter_map(|i| last.checked_add_days(Days::new(i))));
    }
    Ok(dates)
}

/// Sums `yhat` per calendar month, in date order within each month.
pub fn monthly_totals(points: &[ForecastPoint]) -> Vec<MonthlyForecastTotal> {
    let mut sorted: Vec<&ForecastPoint> = points.iter().collect();
    sorted.sort_by_key(|p| p.ds);

    let mut totals: BTreeMap<YearMonth, f64> = BTreeMap::new();
    for p in sorted {
        *totals.entry(YearMonth::of(p.ds)).or_insert(0.0) += p.yhat;
    }

    totals
        .into_iter()
        .map(|(month, monthly_total_cost)| MonthlyForecastTotal {
            month,
            monthly_total_cost,
        })
        .collect()
}
