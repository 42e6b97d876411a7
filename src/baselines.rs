//! Minimal baseline `Forecaster` implementations, satisfying the contract
//! without the full baseline catalogue (out of scope beyond this set).

use crate::cancel::CancellationToken;
use crate::error::{ForecastError, Result};
use crate::forecaster::{Capabilities, Forecaster};
use crate::series::{Forecast, Series};

/// Repeats the last observed value.
#[derive(Debug, Clone, Default)]
pub struct Naive {
    last: f64,
    fitted: Vec<f64>,
}

impl Forecaster for Naive {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        cancel.check()?;
        let values = series.values();
        self.last = *values.last().unwrap();
        self.fitted = std::iter::once(values[0]).chain(values[..values.len() - 1].iter().copied()).collect();
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        Ok(Forecast::point_only(vec![self.last; horizon]).with_fitted(self.fitted.clone()))
    }

    fn predict_with_confidence(&self, horizon: usize, _confidence_level: f64) -> Result<Forecast> {
        Ok(self.predict(horizon)?.unsupported_intervals())
    }

    fn name(&self) -> String {
        "naive".to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { in_sample_fitted: true, ..Capabilities::default() }
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        Some(self.fitted.clone())
    }
}

/// Repeats the value observed `period` steps ago.
#[derive(Debug, Clone)]
pub struct SeasonalNaive {
    period: usize,
    history: Vec<f64>,
    fitted: Vec<f64>,
}

impl SeasonalNaive {
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "seasonal period must be positive".to_string(),
            ));
        }
        Ok(Self { period, history: Vec::new(), fitted: Vec::new() })
    }
}

impl Forecaster for SeasonalNaive {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        cancel.check()?;
        series.validate_seasonal_period(self.period)?;
        self.history = series.values().to_vec();
        self.fitted = (0..self.history.len())
            .map(|i| if i >= self.period { self.history[i - self.period] } else { self.history[i] })
            .collect();
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let n = self.history.len();
        let point: Vec<f64> = (0..horizon)
            .map(|h| {
                let idx = n - self.period + (h % self.period);
                self.history[idx]
            })
            .collect();
        Ok(Forecast::point_only(point).with_fitted(self.fitted.clone()))
    }

    fn predict_with_confidence(&self, horizon: usize, _confidence_level: f64) -> Result<Forecast> {
        Ok(self.predict(horizon)?.unsupported_intervals())
    }

    fn name(&self) -> String {
        format!("seasonal_naive({})", self.period)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { in_sample_fitted: true, ..Capabilities::default() }
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        Some(self.fitted.clone())
    }
}

/// Simple moving average over the trailing `window` observations.
#[derive(Debug, Clone)]
pub struct Sma {
    window: usize,
    history: Vec<f64>,
}

impl Sma {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "sma window must be positive".to_string(),
            ));
        }
        Ok(Self { window, history: Vec::new() })
    }
}

impl Forecaster for Sma {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        cancel.check()?;
        if series.len() < self.window {
            return Err(ForecastError::InsufficientData { needed: self.window, got: series.len() });
        }
        self.history = series.values().to_vec();
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let n = self.history.len();
        let avg = self.history[n - self.window..].iter().sum::<f64>() / self.window as f64;
        Ok(Forecast::point_only(vec![avg; horizon]))
    }

    fn predict_with_confidence(&self, horizon: usize, _confidence_level: f64) -> Result<Forecast> {
        Ok(self.predict(horizon)?.unsupported_intervals())
    }

    fn name(&self) -> String {
        format!("sma({})", self.window)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

/// Simple exponential smoothing, level only (no trend or season).
#[derive(Debug, Clone)]
pub struct Ses {
    alpha: f64,
    level: f64,
    fitted: Vec<f64>,
}

impl Ses {
    pub fn new(alpha: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ForecastError::InvalidConfiguration(
                "ses alpha must be in [0, 1]".to_string(),
            ));
        }
        Ok(Self { alpha, level: 0.0, fitted: Vec::new() })
    }
}

impl Forecaster for Ses {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        cancel.check()?;
        let values = series.values();
        let mut level = values[0];
        let mut fitted = Vec::with_capacity(values.len());
        for &v in values {
            fitted.push(level);
            level = self.alpha * v + (1.0 - self.alpha) * level;
        }
        self.level = level;
        self.fitted = fitted;
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        Ok(Forecast::point_only(vec![self.level; horizon]).with_fitted(self.fitted.clone()))
    }

    fn predict_with_confidence(&self, horizon: usize, _confidence_level: f64) -> Result<Forecast> {
        Ok(self.predict(horizon)?.unsupported_intervals())
    }

    fn name(&self) -> String {
        format!("ses(alpha={:.2})", self.alpha)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { in_sample_fitted: true, ..Capabilities::default() }
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        Some(self.fitted.clone())
    }
}

/// Theta method: average of SES-on-the-series and a linear-drift
/// extrapolation of the de-trended series (theta line at theta=2).
#[derive(Debug, Clone, Default)]
pub struct Theta {
    ses_level: f64,
    drift_per_step: f64,
    last_value: f64,
    fitted: Vec<f64>,
}

impl Forecaster for Theta {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        cancel.check()?;
        let values = series.values();
        let n = values.len();
        let alpha = 0.2;
        let mut level = values[0];
        let mut fitted = Vec::with_capacity(n);
        for &v in values {
            fitted.push(level);
            level = alpha * v + (1.0 - alpha) * level;
        }
        self.ses_level = level;
        self.last_value = *values.last().unwrap();
        self.drift_per_step = (values[n - 1] - values[0]) / (n - 1).max(1) as f64;
        self.fitted = fitted;
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let point: Vec<f64> = (1..=horizon)
            .map(|h| 0.5 * self.ses_level + 0.5 * (self.last_value + self.drift_per_step * h as f64))
            .collect();
        Ok(Forecast::point_only(point).with_fitted(self.fitted.clone()))
    }

    fn predict_with_confidence(&self, horizon: usize, _confidence_level: f64) -> Result<Forecast> {
        Ok(self.predict(horizon)?.unsupported_intervals())
    }

    fn name(&self) -> String {
        "theta".to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { in_sample_fitted: true, ..Capabilities::default() }
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        Some(self.fitted.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_repeats_last_value() {
        let mut model = Naive::default();
        let series = Series::new(vec![1.0, 2.0, 3.0]).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict(3).unwrap();
        assert_eq!(forecast.point, vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn seasonal_naive_cycles_through_period() {
        let mut model = SeasonalNaive::new(3).unwrap();
        let series = Series::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict(3).unwrap();
        assert_eq!(forecast.point, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn seasonal_naive_rejects_short_series() {
        let mut model = SeasonalNaive::new(10).unwrap();
        let series = Series::new(vec![1.0, 2.0, 3.0]).unwrap();
        assert!(model.fit(&series, &CancellationToken::new()).is_err());
    }

    #[test]
    fn sma_averages_trailing_window() {
        let mut model = Sma::new(2).unwrap();
        let series = Series::new(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict(1).unwrap();
        assert_eq!(forecast.point, vec![3.5]);
    }

    #[test]
    fn ses_converges_toward_constant_series() {
        let mut model = Ses::new(0.5).unwrap();
        let series = Series::new(vec![5.0; 10]).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict(1).unwrap();
        assert!((forecast.point[0] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn theta_extrapolates_linear_trend_reasonably() {
        let mut model = Theta::default();
        let series = Series::new((0..20).map(|i| i as f64).collect()).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict(1).unwrap();
        assert!(forecast.point[0] > 15.0);
    }

    #[test]
    fn cancellation_aborts_fit() {
        let mut model = Naive::default();
        let series = Series::new(vec![1.0, 2.0, 3.0]).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert!(model.fit(&series, &token).is_err());
    }
}
