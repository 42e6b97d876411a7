//! TBATS: Box-Cox transform, damped trend, ARMA-modeled error, and
//! trigonometric (Fourier) seasonal terms, with an AIC-searched AutoTBATS
//! wrapper over the Box-Cox/damping/seasonal-order choices.

use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::decomposition;
use crate::error::{ForecastError, Result};
use crate::forecaster::{Capabilities, Forecaster};
use crate::intervals;
use crate::numerics;
use crate::series::{Forecast, ModelComponents, Series};

/// Configuration for one TBATS fit.
#[derive(Debug, Clone)]
pub struct TbatsConfig {
    /// `None` means the Box-Cox lambda is estimated via Guerrero's method.
    pub box_cox_lambda: Option<f64>,
    /// `None` disables damping.
    pub damping_phi: Option<f64>,
    /// `(period, fourier_order)` pairs.
    pub seasonal_periods: Vec<(usize, usize)>,
    /// AR/MA order of the error process, fit via CSS on the post-seasonal
    /// residual (mirrors `arima.rs`'s conditional-sum-of-squares approach).
    pub arma_p: usize,
    pub arma_q: usize,
}

impl Default for TbatsConfig {
    fn default() -> Self {
        Self {
            box_cox_lambda: None,
            damping_phi: Some(0.98),
            seasonal_periods: Vec::new(),
            arma_p: 1,
            arma_q: 0,
        }
    }
}

impl TbatsConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(phi) = self.damping_phi {
            if !(0.0..=1.0).contains(&phi) {
                return Err(ForecastError::InvalidConfiguration(
                    "damping_phi must be in [0, 1]".to_string(),
                ));
            }
        }
        if self.seasonal_periods.iter().any(|&(p, k)| p == 0 || k == 0) {
            return Err(ForecastError::InvalidConfiguration(
                "seasonal periods and fourier orders must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A fitted TBATS model.
#[derive(Debug, Clone)]
pub struct Tbats {
    config: TbatsConfig,
    lambda: f64,
    level: f64,
    trend: f64,
    alpha: f64,
    beta: f64,
    phi: f64,
    seasonal_coefs: Vec<f64>,
    ar_coefs: Vec<f64>,
    ma_coefs: Vec<f64>,
    residuals: Vec<f64>,
    residual_std: f64,
    fitted: Vec<f64>,
    sse: f64,
    n: usize,
}

impl Tbats {
    pub fn new(config: TbatsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            lambda: 1.0,
            level: 0.0,
            trend: 0.0,
            alpha: 0.3,
            beta: 0.05,
            phi: 1.0,
            seasonal_coefs: Vec::new(),
            ar_coefs: Vec::new(),
            ma_coefs: Vec::new(),
            residuals: Vec::new(),
            residual_std: 0.0,
            fitted: Vec::new(),
            sse: 0.0,
            n: 0,
        })
    }

    fn fourier_column_count(&self) -> usize {
        self.config.seasonal_periods.iter().map(|&(_, k)| 2 * k).sum()
    }
}

impl Forecaster for Tbats {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        let min_period = self.config.seasonal_periods.iter().map(|&(p, _)| p).max().unwrap_or(1);
        if series.len() < (2 * min_period).max(8) {
            return Err(ForecastError::InsufficientData { needed: (2 * min_period).max(8), got: series.len() });
        }
        cancel.check()?;

        let raw = series.values();
        let all_positive = raw.iter().all(|&v| v > 0.0);
        self.lambda = match self.config.box_cox_lambda {
            Some(l) => l,
            None if all_positive => decomposition::estimate_box_cox_lambda(raw, min_period.max(2)),
            None => 1.0,
        };
        let transformed = if all_positive {
            decomposition::box_cox(raw, self.lambda)?
        } else {
            self.lambda = 1.0;
            raw.to_vec()
        };

        let n = transformed.len();
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let (trend_slope, trend_intercept) = numerics::ols(
            &x.iter().map(|&xi| vec![1.0, xi]).collect::<Vec<_>>(),
            &transformed,
        )
        .map(|fit| (fit.beta[1], fit.beta[0]))?;
        self.level = trend_intercept;
        self.trend = trend_slope;
        self.phi = self.config.damping_phi.unwrap_or(1.0);

        let detrended: Vec<f64> = transformed.iter().zip(x.iter()).map(|(v, &xi)| v - (trend_intercept + trend_slope * xi)).collect();

        cancel.check()?;
        let n_cols = self.fourier_column_count();
        let seasonal_fitted;
        if n_cols > 0 {
            let design: Vec<Vec<f64>> = (0..n).map(|t| decomposition::fourier_row(t, &self.config.seasonal_periods)).collect();
            self.seasonal_coefs = numerics::ols(&design, &detrended)?.beta;
            seasonal_fitted = design.iter().map(|row| row.iter().zip(self.seasonal_coefs.iter()).map(|(a, b)| a * b).sum::<f64>()).collect::<Vec<f64>>();
        } else {
            self.seasonal_coefs = Vec::new();
            seasonal_fitted = vec![0.0; n];
        }

        let error_series: Vec<f64> = detrended.iter().zip(seasonal_fitted.iter()).map(|(d, s)| d - s).collect();

        cancel.check()?;
        let ar_lags: Vec<usize> = (1..=self.config.arma_p).collect();
        let ma_lags: Vec<usize> = (1..=self.config.arma_q).collect();
        let n_params = ar_lags.len() + ma_lags.len();
        if n_params > 0 {
            let max_lag = ar_lags.iter().chain(ma_lags.iter()).copied().max().unwrap_or(0);
            let objective = |p: &[f64]| -> f64 {
                let ar = &p[..ar_lags.len()];
                let ma = &p[ar_lags.len()..];
                let mut resid = vec![0.0; error_series.len()];
                let mut sse = 0.0;
                for t in 0..error_series.len() {
                    let mut pred = 0.0;
                    for (i, &lag) in ar_lags.iter().enumerate() {
                        if t >= lag {
                            pred += ar[i] * error_series[t - lag];
                        }
                    }
                    for (j, &lag) in ma_lags.iter().enumerate() {
                        if t >= lag {
                            pred += ma[j] * resid[t - lag];
                        }
                    }
                    let e = error_series[t] - pred;
                    resid[t] = e;
                    if t >= max_lag {
                        sse += e * e;
                    }
                }
                if sse.is_finite() { sse } else { f64::MAX }
            };
            let initial = vec![0.0; n_params];
            let bounds = vec![1.3; n_params];
            let lower: Vec<f64> = bounds.iter().map(|b| -b).collect();
            let best = numerics::nelder_mead(&initial, &lower, &bounds, 300, &objective);
            self.ar_coefs = best[..ar_lags.len()].to_vec();
            self.ma_coefs = best[ar_lags.len()..].to_vec();
        } else {
            self.ar_coefs = Vec::new();
            self.ma_coefs = Vec::new();
        }

        let mut resid = vec![0.0; error_series.len()];
        let mut sse = 0.0;
        let max_lag = ar_lags.iter().chain(ma_lags.iter()).copied().max().unwrap_or(0);
        for t in 0..error_series.len() {
            let mut pred = 0.0;
            for (i, &lag) in ar_lags.iter().enumerate() {
                if t >= lag {
                    pred += self.ar_coefs[i] * error_series[t - lag];
                }
            }
            for (j, &lag) in ma_lags.iter().enumerate() {
                if t >= lag {
                    pred += self.ma_coefs[j] * resid[t - lag];
                }
            }
            let e = error_series[t] - pred;
            resid[t] = e;
            if t >= max_lag {
                sse += e * e;
            }
        }
        self.residuals = resid;
        self.sse = sse;

        let transformed_fitted: Vec<f64> = (0..n)
            .map(|t| trend_intercept + trend_slope * t as f64 + seasonal_fitted[t] + (error_series[t] - self.residuals[t]))
            .collect();
        self.fitted = decomposition::inverse_box_cox(&transformed_fitted, self.lambda);

        let errors: Vec<f64> = raw.iter().zip(self.fitted.iter()).map(|(v, f)| v - f).collect();
        let mean_e = errors.iter().sum::<f64>() / n as f64;
        self.residual_std = (errors.iter().map(|e| (e - mean_e).powi(2)).sum::<f64>() / n as f64).sqrt();
        self.n = n;

        trace!(lambda = self.lambda, sse = self.sse, "tbats fit complete");
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        if self.n == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "tbats: predict called before fit".to_string(),
            ));
        }
        let mut point_transformed = Vec::with_capacity(horizon);
        for h in 1..=horizon {
            let t = self.n + h - 1;
            let damp_sum = (1..=h).map(|j| self.phi.powi(j as i32)).sum::<f64>();
            let trend_part = self.level + damp_sum * self.trend;
            let seasonal_part = if self.seasonal_coefs.is_empty() {
                0.0
            } else {
                let row = decomposition::fourier_row(t, &self.config.seasonal_periods);
                row.iter().zip(self.seasonal_coefs.iter()).map(|(a, b)| a * b).sum::<f64>()
            };
            point_transformed.push(trend_part + seasonal_part);
        }
        let point = decomposition::inverse_box_cox(&point_transformed, self.lambda);
        Ok(Forecast::point_only(point).with_fitted(self.fitted.clone()))
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        let base = self.predict(horizon)?;
        let z = intervals::z_score(confidence_level);
        let lower: Vec<f64> = base.point.iter().enumerate().map(|(i, p)| p - z * self.residual_std * ((i + 1) as f64).sqrt()).collect();
        let upper: Vec<f64> = base.point.iter().enumerate().map(|(i, p)| p + z * self.residual_std * ((i + 1) as f64).sqrt()).collect();
        Ok(Forecast::with_bands(base.point, lower, upper, confidence_level).with_fitted(base.fitted.unwrap_or_default()))
    }

    fn name(&self) -> String {
        "tbats".to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { prediction_intervals: true, in_sample_fitted: true, model_components: true, information_criteria: true }
    }

    fn components(&self) -> Option<ModelComponents> {
        Some(ModelComponents::Tbats {
            box_cox_lambda: self.config.box_cox_lambda.or(Some(self.lambda)),
            damping_phi: self.config.damping_phi,
            fourier_orders: self.config.seasonal_periods.clone(),
        })
    }

    fn aic(&self) -> Option<f64> {
        let k = 2 + self.seasonal_coefs.len() + self.ar_coefs.len() + self.ma_coefs.len() + 1;
        let n = self.n.max(1) as f64;
        let sigma2 = (self.sse / n).max(1e-12);
        let loglik = -0.5 * n * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        Some(-2.0 * loglik + 2.0 * k as f64)
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        Some(self.fitted.clone())
    }
}

/// AIC-searches Box-Cox usage, damping on/off, and the Fourier order for
/// each candidate seasonal period, refitting the best combination.
pub struct AutoTbats {
    seasonal_periods: Vec<usize>,
    max_fourier_order: usize,
    best: Option<Tbats>,
    models_evaluated: usize,
    models_failed: usize,
}

impl AutoTbats {
    pub fn new(seasonal_periods: Vec<usize>, max_fourier_order: usize) -> Self {
        Self { seasonal_periods, max_fourier_order: max_fourier_order.max(1), best: None, models_evaluated: 0, models_failed: 0 }
    }

    pub fn models_evaluated(&self) -> usize {
        self.models_evaluated
    }

    pub fn models_failed(&self) -> usize {
        self.models_failed
    }
}

impl Forecaster for AutoTbats {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        self.models_evaluated = 0;
        self.models_failed = 0;
        let mut best: Option<Tbats> = None;

        for damping in [Some(0.98), None] {
            for order in 1..=self.max_fourier_order {
                cancel.check()?;
                let config = TbatsConfig {
                    box_cox_lambda: None,
                    damping_phi: damping,
                    seasonal_periods: self.seasonal_periods.iter().map(|&p| (p, order)).collect(),
                    arma_p: 1,
                    arma_q: 0,
                };
                self.models_evaluated += 1;
                let mut candidate = match Tbats::new(config) {
                    Ok(c) => c,
                    Err(_) => {
                        self.models_failed += 1;
                        continue;
                    }
                };
                match candidate.fit(series, cancel) {
                    Ok(()) => {
                        let candidate_aic = candidate.aic().unwrap_or(f64::INFINITY);
                        let better = best.as_ref().map(|b| candidate_aic < b.aic().unwrap_or(f64::INFINITY)).unwrap_or(true);
                        if better {
                            debug!(order, ?damping, aic = candidate_aic, "new best tbats candidate");
                            best = Some(candidate);
                        }
                    }
                    Err(err) => {
                        if err.is_fatal_to_search() {
                            return Err(err);
                        }
                        self.models_failed += 1;
                    }
                }
            }
        }

        self.best = Some(best.ok_or_else(|| {
            ForecastError::NumericalFailure("AutoTBATS: no candidate converged".to_string())
        })?);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        self.best
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidConfiguration("AutoTBATS: predict called before fit".to_string()))?
            .predict(horizon)
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        self.best
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidConfiguration("AutoTBATS: predict called before fit".to_string()))?
            .predict_with_confidence(horizon, confidence_level)
    }

    fn name(&self) -> String {
        "auto_tbats".to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { prediction_intervals: true, in_sample_fitted: true, model_components: true, information_criteria: true }
    }

    fn components(&self) -> Option<ModelComponents> {
        self.best.as_ref().and_then(|m| m.components())
    }

    fn aic(&self) -> Option<f64> {
        self.best.as_ref().and_then(|m| m.aic())
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        self.best.as_ref().and_then(|m| m.fitted_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_seasonal_series_with_reasonable_error() {
        let period = 12;
        let values: Vec<f64> = (0..60)
            .map(|i| 100.0 + 0.5 * i as f64 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / period as f64).sin())
            .collect();
        let series = Series::new(values.clone()).unwrap();
        let config = TbatsConfig { seasonal_periods: vec![(period, 2)], ..TbatsConfig::default() };
        let mut model = Tbats::new(config).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let fitted = model.fitted_values().unwrap();
        let mae: f64 = values.iter().zip(fitted.iter()).map(|(a, f)| (a - f).abs()).sum::<f64>() / values.len() as f64;
        assert!(mae < 15.0, "mae too high: {mae}");
    }

    #[test]
    fn rejects_short_series_for_period() {
        let series = Series::new(vec![1.0, 2.0, 3.0]).unwrap();
        let config = TbatsConfig { seasonal_periods: vec![(12, 2)], ..TbatsConfig::default() };
        let mut model = Tbats::new(config).unwrap();
        assert!(model.fit(&series, &CancellationToken::new()).is_err());
    }

    #[test]
    fn non_positive_series_skips_box_cox() {
        let values: Vec<f64> = (0..20).map(|i| i as f64 - 10.0).collect();
        let series = Series::new(values).unwrap();
        let mut model = Tbats::new(TbatsConfig { seasonal_periods: vec![], ..TbatsConfig::default() }).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        assert_eq!(model.lambda, 1.0);
    }

    #[test]
    fn auto_tbats_evaluates_multiple_candidates() {
        let period = 12;
        let values: Vec<f64> = (0..48).map(|i| 50.0 + 5.0 * (2.0 * std::f64::consts::PI * i as f64 / period as f64).sin()).collect();
        let series = Series::new(values).unwrap();
        let mut auto = AutoTbats::new(vec![period], 2);
        auto.fit(&series, &CancellationToken::new()).unwrap();
        assert!(auto.models_evaluated() >= 2);
    }

    #[test]
    fn cancellation_aborts_auto_tbats() {
        let values: Vec<f64> = (0..48).map(|i| i as f64).collect();
        let series = Series::new(values).unwrap();
        let mut auto = AutoTbats::new(vec![12], 2);
        let token = CancellationToken::new();
        token.cancel();
        assert!(auto.fit(&series, &token).is_err());
    }
}
