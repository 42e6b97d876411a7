//! MSTL forecaster: decomposes via `decomposition::mstl_decompose`, then
//! extrapolates the trend linearly and repeats the last full cycle of each
//! seasonal component.

use tracing::trace;

use crate::cancel::CancellationToken;
use crate::decomposition;
use crate::error::{ForecastError, Result};
use crate::forecaster::{Capabilities, Forecaster};
use crate::intervals;
use crate::numerics;
use crate::series::{Forecast, Series};

#[derive(Debug, Clone)]
pub struct MstlConfig {
    pub periods: Vec<usize>,
    /// LOESS trend span as a fraction of series length, in `(0, 1]`.
    pub trend_span: f64,
}

impl Default for MstlConfig {
    fn default() -> Self {
        Self { periods: Vec::new(), trend_span: 0.3 }
    }
}

impl MstlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.periods.is_empty() {
            return Err(ForecastError::InvalidConfiguration(
                "mstl requires at least one seasonal period".to_string(),
            ));
        }
        if self.periods.iter().any(|&p| p < 2) {
            return Err(ForecastError::InvalidConfiguration(
                "mstl seasonal periods must be >= 2".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.trend_span) || self.trend_span <= 0.0 {
            return Err(ForecastError::InvalidConfiguration(
                "mstl trend_span must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Mstl {
    config: MstlConfig,
    trend: Vec<f64>,
    seasonal: Vec<Vec<f64>>,
    remainder: Vec<f64>,
    trend_slope: f64,
    residual_std: f64,
    n: usize,
}

impl Mstl {
    pub fn new(config: MstlConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, trend: Vec::new(), seasonal: Vec::new(), remainder: Vec::new(), trend_slope: 0.0, residual_std: 0.0, n: 0 })
    }

    fn fitted(&self) -> Vec<f64> {
        (0..self.n)
            .map(|t| self.trend[t] + self.seasonal.iter().map(|s| s[t]).sum::<f64>())
            .collect()
    }
}

impl Forecaster for Mstl {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        let max_period = *self.config.periods.iter().max().unwrap();
        if series.len() < (2 * max_period).max(10) {
            return Err(ForecastError::InsufficientData { needed: (2 * max_period).max(10), got: series.len() });
        }
        cancel.check()?;

        let values = series.values();
        let (trend, seasonal, remainder) = decomposition::mstl_decompose(values, &self.config.periods, self.config.trend_span)?;
        let n = values.len();
        let x: Vec<Vec<f64>> = (0..n).map(|i| vec![1.0, i as f64]).collect();
        let beta = numerics::ols(&x, &trend)?.beta;
        self.trend_slope = beta[1];

        self.trend = trend;
        self.seasonal = seasonal;
        self.remainder = remainder;
        self.n = n;

        let mean_r = self.remainder.iter().sum::<f64>() / n as f64;
        self.residual_std = (self.remainder.iter().map(|r| (r - mean_r).powi(2)).sum::<f64>() / n as f64).sqrt();

        trace!(periods = ?self.config.periods, residual_std = self.residual_std, "mstl decomposition complete");
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        if self.n == 0 {
            return Err(ForecastError::InvalidConfiguration("mstl: predict called before fit".to_string()));
        }
        let last_trend = *self.trend.last().unwrap();
        let point: Vec<f64> = (1..=horizon)
            .map(|h| {
                let trend_part = last_trend + self.trend_slope * h as f64;
                let seasonal_part: f64 = self
                    .seasonal
                    .iter()
                    .zip(self.config.periods.iter())
                    .map(|(s, &period)| {
                        let idx = self.n - period + ((self.n + h - 1) % period);
                        s[idx.min(s.len() - 1)]
                    })
                    .sum();
                trend_part + seasonal_part
            })
            .collect();
        Ok(Forecast::point_only(point).with_fitted(self.fitted()))
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        let base = self.predict(horizon)?;
        let z = intervals::z_score(confidence_level);
        let lower: Vec<f64> = base.point.iter().enumerate().map(|(i, p)| p - z * self.residual_std * ((i + 1) as f64).sqrt()).collect();
        let upper: Vec<f64> = base.point.iter().enumerate().map(|(i, p)| p + z * self.residual_std * ((i + 1) as f64).sqrt()).collect();
        Ok(Forecast::with_bands(base.point, lower, upper, confidence_level).with_fitted(base.fitted.unwrap_or_default()))
    }

    fn name(&self) -> String {
        "mstl".to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { prediction_intervals: true, in_sample_fitted: true, model_components: false, information_criteria: false }
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        if self.n == 0 { None } else { Some(self.fitted()) }
    }
}

/// Picks the best single seasonal period (by in-sample residual std) from a
/// candidate list, then the full candidate set jointly, keeping whichever
/// decomposition leaves the smallest residual spread.
pub struct AutoMstl {
    candidate_periods: Vec<usize>,
    best: Option<Mstl>,
    models_evaluated: usize,
}

impl AutoMstl {
    pub fn new(candidate_periods: Vec<usize>) -> Self {
        Self { candidate_periods, best: None, models_evaluated: 0 }
    }

    pub fn models_evaluated(&self) -> usize {
        self.models_evaluated
    }
}

impl Forecaster for AutoMstl {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        self.models_evaluated = 0;
        let mut configs: Vec<Vec<usize>> = self.candidate_periods.iter().map(|&p| vec![p]).collect();
        if self.candidate_periods.len() > 1 {
            configs.push(self.candidate_periods.clone());
        }

        let mut best: Option<Mstl> = None;
        for periods in configs {
            cancel.check()?;
            self.models_evaluated += 1;
            let mut candidate = match Mstl::new(MstlConfig { periods, trend_span: 0.3 }) {
                Ok(m) => m,
                Err(_) => continue,
            };
            match candidate.fit(series, cancel) {
                Ok(()) => {
                    let better = best.as_ref().map(|b| candidate.residual_std < b.residual_std).unwrap_or(true);
                    if better {
                        best = Some(candidate);
                    }
                }
                Err(err) if err.is_fatal_to_search() => return Err(err),
                Err(_) => continue,
            }
        }

        self.best = Some(best.ok_or_else(|| ForecastError::NumericalFailure("AutoMSTL: no candidate converged".to_string()))?);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        self.best.as_ref().ok_or_else(|| ForecastError::InvalidConfiguration("AutoMSTL: predict called before fit".to_string()))?.predict(horizon)
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        self.best
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidConfiguration("AutoMSTL: predict called before fit".to_string()))?
            .predict_with_confidence(horizon, confidence_level)
    }

    fn name(&self) -> String {
        "auto_mstl".to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { prediction_intervals: true, in_sample_fitted: true, model_components: false, information_criteria: false }
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        self.best.as_ref().and_then(|m| m.fitted_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seasonal_series(n: usize, period: usize) -> Vec<f64> {
        (0..n).map(|i| 50.0 + 0.2 * i as f64 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / period as f64).sin()).collect()
    }

    #[test]
    fn decomposes_and_extrapolates_trend() {
        let values = seasonal_series(48, 12);
        let series = Series::new(values).unwrap();
        let mut model = Mstl::new(MstlConfig { periods: vec![12], trend_span: 0.3 }).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict(6).unwrap();
        assert_eq!(forecast.point.len(), 6);
        assert!(forecast.point.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rejects_empty_periods() {
        assert!(Mstl::new(MstlConfig { periods: vec![], trend_span: 0.3 }).is_err());
    }

    #[test]
    fn rejects_short_series() {
        let series = Series::new(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut model = Mstl::new(MstlConfig { periods: vec![12], trend_span: 0.3 }).unwrap();
        assert!(model.fit(&series, &CancellationToken::new()).is_err());
    }

    #[test]
    fn auto_mstl_picks_a_candidate() {
        let values = seasonal_series(72, 12);
        let series = Series::new(values).unwrap();
        let mut auto = AutoMstl::new(vec![12, 6]);
        auto.fit(&series, &CancellationToken::new()).unwrap();
        assert_eq!(auto.models_evaluated(), 3);
    }

    #[test]
    fn cancellation_aborts_auto_mstl() {
        let values = seasonal_series(72, 12);
        let series = Series::new(values).unwrap();
        let mut auto = AutoMstl::new(vec![12]);
        let token = CancellationToken::new();
        token.cancel();
        assert!(auto.fit(&series, &token).is_err());
    }
}
