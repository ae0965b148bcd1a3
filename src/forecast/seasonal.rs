//! Seasonal trend forecasting with augurs.
//!
//! The series is laid out on a contiguous daily grid (duplicate dates summed,
//! missing days interpolated) and decomposed with MSTL over every configured
//! period the history can support; AutoETS models the trend. Histories too
//! short for any period fall back to plain AutoETS.

use super::{FittedModel, ForecastError, Forecaster};
use crate::models::{ForecastPoint, SeriesPoint};
use augurs::{
    ets::AutoETS,
    forecaster::{transforms::LinearInterpolator, Forecaster as AugursForecaster},
    mstl::MSTLModel,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// Minimum number of distinct observed days.
const MIN_OBSERVATIONS: usize = 7;

/// A period is only modelled once the history covers two full cycles.
const MIN_CYCLES: usize = 2;

const WEEKLY_PERIOD: usize = 7;
const CYCLE_24_DAY_PERIOD: usize = 24;
const DEFAULT_INTERVAL_WIDTH: f64 = 0.95;

type Predictor = Box<dyn Fn(usize) -> Result<augurs::Forecast, ForecastError>>;

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalModel {
    /// Seasonal periods in days.
    pub periods: Vec<usize>,
    pub interval_width: f64,
}

impl Default for SeasonalModel {
    fn default() -> Self {
        Self {
            periods: vec![WEEKLY_PERIOD, CYCLE_24_DAY_PERIOD],
            interval_width: DEFAULT_INTERVAL_WIDTH,
        }
    }
}

impl SeasonalModel {
    pub fn with_interval_width(mut self, width: f64) -> Self {
        self.interval_width = width;
        self
    }

    fn usable_periods(&self, days: usize) -> Vec<usize> {
        let mut periods: Vec<usize> = self
            .periods
            .iter()
            .copied()
            .filter(|&p| p > 1 && days >= p * MIN_CYCLES)
            .collect();
        periods.sort_unstable();
        periods.dedup();
        periods
    }
}

pub struct SeasonalFit {
    first_observed: NaiveDate,
    last_observed: NaiveDate,
    periods: Vec<usize>,
    in_sample: Vec<Band>,
    predictor: Predictor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Band {
    yhat: f64,
    lower: f64,
    upper: f64,
}

fn bands(forecast: &augurs::Forecast) -> Vec<Band> {
    match &forecast.intervals {
        Some(intervals) => forecast
            .point
            .iter()
            .zip(intervals.lower.iter().zip(intervals.upper.iter()))
            .map(|(&yhat, (&lower, &upper))| Band { yhat, lower, upper })
            .collect(),
        None => forecast
            .point
            .iter()
            .map(|&yhat| Band {
                yhat,
                lower: yhat,
                upper: yhat,
            })
            .collect(),
    }
}

/// Sums duplicate dates and lays the series out day by day from the first
/// to the last observation. Missing days are NaN.
fn daily_grid(series: &[SeriesPoint]) -> Result<(NaiveDate, NaiveDate, usize, Vec<f64>), ForecastError> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for p in series {
        if !p.y.is_finite() {
            return Err(ForecastError::DegenerateSeries(format!(
                "non-finite value {} on {}",
                p.y, p.ds
            )));
        }
        *totals.entry(p.ds).or_insert(0.0) += p.y;
    }

    let observed = totals.len();
    let (first, last) = match (totals.keys().next(), totals.keys().next_back()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => {
            return Err(ForecastError::InsufficientData {
                needed: MIN_OBSERVATIONS,
                got: 0,
            })
        }
    };

    let span = usize::try_from((last - first).num_days())
        .map_err(|_| ForecastError::DegenerateSeries("dates out of order".into()))?
        + 1;
    let mut values = vec![f64::NAN; span];
    for (ds, y) in totals {
        values[(ds - first).num_days() as usize] = y;
    }
    Ok((first, last, observed, values))
}

fn fit_mstl(values: &[f64], periods: Vec<usize>, level: f64) -> Result<(augurs::Forecast, Predictor), ForecastError> {
    let ets = AutoETS::non_seasonal().into_trend_model();
    let mstl = MSTLModel::new(periods, ets);
    let transformers: Vec<Box<dyn augurs::forecaster::Transformer>> =
        vec![Box::new(LinearInterpolator::default())];
    let mut forecaster = AugursForecaster::new(mstl).with_transformers(transformers);

    forecaster
        .fit(values)
        .map_err(|e| ForecastError::Model(format!("MSTL fit error: {e}")))?;
    let in_sample = forecaster
        .predict_in_sample(level)
        .map_err(|e| ForecastError::Model(format!("MSTL in-sample error: {e}")))?;
    let predictor: Predictor = Box::new(move |horizon| {
        forecaster
            .predict(horizon, level)
            .map_err(|e| ForecastError::Model(format!("MSTL predict error: {e}")))
    });
    Ok((in_sample, predictor))
}

fn fit_ets(values: &[f64], level: f64) -> Result<(augurs::Forecast, Predictor), ForecastError> {
    let ets = AutoETS::non_seasonal();
    let transformers: Vec<Box<dyn augurs::forecaster::Transformer>> =
        vec![Box::new(LinearInterpolator::default())];
    let mut forecaster = AugursForecaster::new(ets).with_transformers(transformers);

    forecaster
        .fit(values)
        .map_err(|e| ForecastError::Model(format!("ETS fit error: {e}")))?;
    let in_sample = forecaster
        .predict_in_sample(level)
        .map_err(|e| ForecastError::Model(format!("ETS in-sample error: {e}")))?;
    let predictor: Predictor = Box::new(move |horizon| {
        forecaster
            .predict(horizon, level)
            .map_err(|e| ForecastError::Model(format!("ETS predict error: {e}")))
    });
    Ok((in_sample, predictor))
}

impl Forecaster for SeasonalModel {
    type Model = SeasonalFit;

    fn fit(&self, series: &[SeriesPoint]) -> Result<SeasonalFit, ForecastError> {
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ForecastError::InvalidSetting(format!(
                "interval width must be in (0, 1), got {}",
                self.interval_width
            )));
        }

        let (first, last, observed, values) = daily_grid(series)?;
        if observed < MIN_OBSERVATIONS {
            return Err(ForecastError::InsufficientData {
                needed: MIN_OBSERVATIONS,
                got: observed,
            });
        }

        let periods = self.usable_periods(values.len());
        debug!(days = values.len(), observed, periods = ?periods, "fitting seasonal model");
        let (in_sample, predictor) = if periods.is_empty() {
            fit_ets(&values, self.interval_width)?
        } else {
            fit_mstl(&values, periods.clone(), self.interval_width)?
        };

        let in_sample = bands(&in_sample);
        if in_sample.len() != values.len() {
            return Err(ForecastError::Model(format!(
                "in-sample fit has {} points for {} days",
                in_sample.len(),
                values.len()
            )));
        }

        Ok(SeasonalFit {
            first_observed: first,
            last_observed: last,
            periods,
            in_sample,
            predictor,
        })
    }
}

impl SeasonalFit {
    /// Periods the decomposition used; empty when the trend model ran alone.
    pub fn periods(&self) -> &[usize] {
        &self.periods
    }
}

impl FittedModel for SeasonalFit {
    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<ForecastPoint>, ForecastError> {
        let horizon = dates
            .iter()
            .map(|&ds| (ds - self.last_observed).num_days())
            .max()
            .unwrap_or(0);
        let future = if horizon > 0 {
            let steps = usize::try_from(horizon)
                .map_err(|_| ForecastError::InvalidSetting(format!("horizon of {horizon} days")))?;
            bands(&(self.predictor)(steps)?)
        } else {
            Vec::new()
        };

        dates
            .iter()
            .map(|&ds| {
                let band = if ds <= self.last_observed {
                    let offset = (ds - self.first_observed).num_days();
                    usize::try_from(offset)
                        .ok()
                        .and_then(|i| self.in_sample.get(i))
                } else {
                    let ahead = (ds - self.last_observed).num_days();
                    usize::try_from(ahead - 1).ok().and_then(|i| future.get(i))
                };
                let band = band.ok_or_else(|| {
                    ForecastError::Model(format!(
                        "{ds} is before the first observation {}",
                        self.first_observed
                    ))
                })?;
                if !band.yhat.is_finite() {
                    return Err(ForecastError::Model(format!("non-finite prediction for {ds}")));
                }
                Ok(ForecastPoint {
                    ds,
                    yhat: band.yhat,
                    yhat_lower: band.lower.min(band.yhat),
                    yhat_upper: band.upper.max(band.yhat),
                })
            })
            .collect()
    }

    fn last_observed(&self) -> NaiveDate {
        self.last_observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::future_dates;
    use chrono::Duration;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).expect("valid date")
    }

    fn series_from(f: impl Fn(i64) -> f64, days: i64) -> Vec<SeriesPoint> {
        (0..days)
            .map(|i| SeriesPoint {
                ds: start() + Duration::days(i),
                y: f(i),
            })
            .collect()
    }

    #[test]
    fn short_history_uses_trend_model_only() {
        let series = series_from(|i| 100.0 + i as f64, 10);
        let fit = SeasonalModel::default().fit(&series).expect("fit");
        assert!(fit.periods().is_empty());

        let forecast = fit.predict(&future_dates(&series, 5).expect("dates")).expect("predict");
        assert_eq!(forecast.len(), 15);
        assert!(forecast.iter().all(|p| p.yhat.is_finite()));
    }

    #[test]
    fn periods_follow_history_length() {
        let model = SeasonalModel::default();
        assert_eq!(model.usable_periods(13), Vec::<usize>::new());
        assert_eq!(model.usable_periods(28), vec![7]);
        assert_eq!(model.usable_periods(60), vec![7, 24]);

        let fit = model.fit(&series_from(|i| 50.0 + (i % 7) as f64, 60)).expect("fit");
        assert_eq!(fit.periods(), &[7, 24]);
    }

    #[test]
    fn captures_weekly_pattern() {
        let weekly = |i: i64| {
            let base = if (i % 7) >= 5 { 140.0 } else { 215.0 };
            base + ((i * 37) % 5) as f64
        };
        let series = series_from(weekly, 140);
        let fit = SeasonalModel::default().fit(&series).expect("fit");
        let future: Vec<NaiveDate> = (140..154).map(|i| start() + Duration::days(i)).collect();
        let forecast = fit.predict(&future).expect("predict");

        let mean = |weekend: bool| {
            let picked: Vec<f64> = forecast
                .iter()
                .filter(|p| (((p.ds - start()).num_days() % 7) >= 5) == weekend)
                .map(|p| p.yhat)
                .collect();
            picked.iter().sum::<f64>() / picked.len() as f64
        };
        assert!(mean(false) - mean(true) > 30.0, "weekday {} weekend {}", mean(false), mean(true));
    }

    #[test]
    fn trend_forecast_stays_near_recent_level() {
        let series = series_from(|i| 50.0 + 2.0 * i as f64, 60);
        let fit = SeasonalModel::default().fit(&series).expect("fit");
        let future: Vec<NaiveDate> = (60..74).map(|i| start() + Duration::days(i)).collect();
        for p in fit.predict(&future).expect("predict") {
            assert!(p.yhat > 150.0 && p.yhat < 300.0, "{}: {}", p.ds, p.yhat);
        }
    }

    #[test]
    fn intervals_bracket_the_point_forecast() {
        let noisy = |i: i64| 100.0 + ((i * 7919) % 23) as f64 - 11.0;
        let series = series_from(noisy, 90);
        let fit = SeasonalModel::default().with_interval_width(0.90).fit(&series).expect("fit");

        let forecast = fit.predict(&future_dates(&series, 30).expect("dates")).expect("predict");
        assert_eq!(forecast.len(), 120);
        for p in &forecast {
            assert!(p.yhat_lower <= p.yhat && p.yhat <= p.yhat_upper, "{}", p.ds);
        }
        let last = forecast.last().expect("future point");
        assert!(last.yhat_upper > last.yhat_lower);
    }

    #[test]
    fn gaps_are_interpolated() {
        let series: Vec<SeriesPoint> = series_from(|i| 80.0 + (i % 3) as f64, 30)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| i % 2 == 1)
            .map(|(_, p)| p)
            .collect();
        let fit = SeasonalModel::default().fit(&series).expect("fit");

        let gap_day = start() + Duration::days(2);
        let forecast = fit.predict(&[gap_day]).expect("predict");
        assert!(forecast[0].yhat.is_finite());
    }

    #[test]
    fn duplicate_dates_are_summed() {
        let mut series = series_from(|_| 10.0, 10);
        series.extend(series_from(|_| 5.0, 10));
        let fit = SeasonalModel::default().fit(&series).expect("fit");
        let forecast = fit.predict(&[start()]).expect("predict");
        assert!((forecast[0].yhat - 15.0).abs() < 5.0, "{}", forecast[0].yhat);
    }

    #[test]
    fn rejects_degenerate_input() {
        let model = SeasonalModel::default();
        assert_eq!(
            model.fit(&series_from(|_| 1.0, 5)).err(),
            Some(ForecastError::InsufficientData { needed: 7, got: 5 })
        );
        assert_eq!(
            model.fit(&[]).err(),
            Some(ForecastError::InsufficientData { needed: 7, got: 0 })
        );

        let mut with_nan = series_from(|i| i as f64, 10);
        with_nan[3].y = f64::NAN;
        assert!(matches!(model.fit(&with_nan), Err(ForecastError::DegenerateSeries(_))));

        let bad_width = SeasonalModel::default().with_interval_width(1.5);
        assert!(matches!(
            bad_width.fit(&series_from(|i| i as f64, 10)),
            Err(ForecastError::InvalidSetting(_))
        ));
    }

    #[test]
    fn rejects_dates_before_history() {
        let series = series_from(|i| 20.0 + i as f64, 10);
        let fit = SeasonalModel::default().fit(&series).expect("fit");
        let before = start() - Duration::days(1);
        assert!(matches!(fit.predict(&[before]), Err(ForecastError::Model(_))));
    }
}
