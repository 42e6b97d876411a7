//! ARIMA(p,d,q)(P,D,Q)[s] via conditional sum of squares, plus a stepwise
//! AutoARIMA search in the spirit of Hyndman-Khandakar.
//!
//! Seasonal AR/MA terms are folded into the same coefficient vectors as
//! the regular terms (extra lags at multiples of `s`) rather than
//! expanded via full polynomial multiplication of the regular and
//! seasonal operators. This keeps a single CSS objective and a single
//! lag-indexed recursion for both the regular and seasonal parts, at the
//! cost of not modeling their multiplicative interaction exactly the way
//! a textbook SARIMA does.

use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::error::{ForecastError, Result};
use crate::forecaster::{Capabilities, Forecaster};
use crate::intervals;
use crate::numerics;
use crate::series::{Forecast, ModelComponents, Series};

/// Order specification for an ARIMA(p,d,q)(P,D,Q)[s] model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArimaConfig {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub s: usize,
    pub include_drift: bool,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self {
            p: 1,
            d: 1,
            q: 1,
            seasonal_p: 0,
            seasonal_d: 0,
            seasonal_q: 0,
            s: 1,
            include_drift: false,
        }
    }
}

impl ArimaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.d > 2 || self.seasonal_d > 1 {
            return Err(ForecastError::InvalidConfiguration(
                "ARIMA: d must be <= 2 and seasonal_d <= 1".to_string(),
            ));
        }
        if self.seasonal_p > 0 || self.seasonal_q > 0 || self.seasonal_d > 0 {
            if self.s < 2 {
                return Err(ForecastError::InvalidConfiguration(
                    "ARIMA: seasonal orders require s >= 2".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn ar_lags(&self) -> Vec<usize> {
        let mut lags: Vec<usize> = (1..=self.p).collect();
        if self.s >= 2 {
            lags.extend((1..=self.seasonal_p).map(|i| i * self.s));
        }
        lags
    }

    fn ma_lags(&self) -> Vec<usize> {
        let mut lags: Vec<usize> = (1..=self.q).collect();
        if self.s >= 2 {
            lags.extend((1..=self.seasonal_q).map(|i| i * self.s));
        }
        lags
    }
}

fn diff_once(values: &[f64], lag: usize) -> Vec<f64> {
    values.windows(lag + 1).map(|w| w[lag] - w[0]).collect()
}

#[derive(Debug, Clone)]
struct DiffPass {
    lag: usize,
    tail: Vec<f64>,
}

fn apply_differencing(values: &[f64], d: usize, seasonal_d: usize, s: usize) -> Result<(Vec<f64>, Vec<DiffPass>)> {
    let mut working = values.to_vec();
    let mut passes = Vec::new();
    for _ in 0..d {
        if working.len() < 2 {
            return Err(ForecastError::InsufficientData { needed: 2, got: working.len() });
        }
        passes.push(DiffPass { lag: 1, tail: vec![*working.last().unwrap()] });
        working = diff_once(&working, 1);
    }
    for _ in 0..seasonal_d {
        if working.len() <= s {
            return Err(ForecastError::InsufficientData { needed: s + 1, got: working.len() });
        }
        passes.push(DiffPass { lag: s, tail: working[working.len() - s..].to_vec() });
        working = diff_once(&working, s);
    }
    Ok((working, passes))
}

fn integrate(forecast_diff: &[f64], tail: &[f64], lag: usize) -> Vec<f64> {
    let mut extended = tail.to_vec();
    let mut out = Vec::with_capacity(forecast_diff.len());
    for &d in forecast_diff {
        let prev = extended[extended.len() - lag];
        let value = d + prev;
        extended.push(value);
        out.push(value);
    }
    out
}

/// Conditional-sum-of-squares residuals and objective, shared by fitting
/// and forecasting.
fn css_predict(
    stat: &[f64],
    resid_hist: &[f64],
    t: usize,
    ar_lags: &[usize],
    ma_lags: &[usize],
    ar_coefs: &[f64],
    ma_coefs: &[f64],
    drift: f64,
) -> f64 {
    let mut pred = drift;
    for (i, &lag) in ar_lags.iter().enumerate() {
        if t >= lag {
            pred += ar_coefs[i] * stat[t - lag];
        }
    }
    for (j, &lag) in ma_lags.iter().enumerate() {
        if t >= lag && t - lag < resid_hist.len() {
            pred += ma_coefs[j] * resid_hist[t - lag];
        }
    }
    pred
}

/// A fitted ARIMA model.
#[derive(Debug, Clone)]
pub struct Arima {
    config: ArimaConfig,
    ar_lags: Vec<usize>,
    ma_lags: Vec<usize>,
    ar_coefs: Vec<f64>,
    ma_coefs: Vec<f64>,
    drift: f64,
    stat: Vec<f64>,
    residuals: Vec<f64>,
    passes: Vec<DiffPass>,
    sse: f64,
    n: usize,
}

impl Arima {
    pub fn new(config: ArimaConfig) -> Result<Self> {
        config.validate()?;
        let ar_lags = config.ar_lags();
        let ma_lags = config.ma_lags();
        Ok(Self {
            config,
            ar_coefs: vec![0.0; ar_lags.len()],
            ma_coefs: vec![0.0; ma_lags.len()],
            ar_lags,
            ma_lags,
            drift: 0.0,
            stat: Vec::new(),
            residuals: Vec::new(),
            passes: Vec::new(),
            sse: 0.0,
            n: 0,
        })
    }

    fn max_lag(&self) -> usize {
        self.ar_lags.iter().chain(self.ma_lags.iter()).copied().max().unwrap_or(0)
    }

    fn css(&self, stat: &[f64], params: &[f64]) -> f64 {
        let n_ar = self.ar_lags.len();
        let n_ma = self.ma_lags.len();
        let ar_coefs = &params[..n_ar];
        let ma_coefs = &params[n_ar..n_ar + n_ma];
        let drift = if self.config.include_drift { params[n_ar + n_ma] } else { 0.0 };

        let n = stat.len();
        let mut resid = vec![0.0; n];
        let max_lag = self.max_lag();
        let mut sse = 0.0;
        for t in 0..n {
            let pred = css_predict(stat, &resid, t, &self.ar_lags, &self.ma_lags, ar_coefs, ma_coefs, drift);
            let e = stat[t] - pred;
            resid[t] = e;
            if t >= max_lag {
                sse += e * e;
            }
        }
        sse
    }
}

impl Forecaster for Arima {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        let min_needed = self.config.p.max(self.config.q) + self.config.d + self.config.seasonal_d * self.config.s.max(1) + 5;
        if series.len() < min_needed {
            return Err(ForecastError::InsufficientData { needed: min_needed, got: series.len() });
        }
        cancel.check()?;

        let (stat, passes) = apply_differencing(series.values(), self.config.d, self.config.seasonal_d, self.config.s)?;
        if stat.len() <= self.max_lag() + 2 {
            return Err(ForecastError::InsufficientData {
                needed: self.max_lag() + 3 + self.config.d + self.config.seasonal_d * self.config.s,
                got: series.len(),
            });
        }

        let n_params = self.ar_lags.len() + self.ma_lags.len() + if self.config.include_drift { 1 } else { 0 };
        let initial = vec![0.0; n_params];
        let bound = 1.3;
        let mut lower = vec![-bound; self.ar_lags.len() + self.ma_lags.len()];
        let mut upper = vec![bound; self.ar_lags.len() + self.ma_lags.len()];
        if self.config.include_drift {
            let data_range = stat.iter().cloned().fold(f64::MIN, f64::max) - stat.iter().cloned().fold(f64::MAX, f64::min);
            lower.push(-data_range.abs() - 1.0);
            upper.push(data_range.abs() + 1.0);
        }

        cancel.check()?;
        let objective = |p: &[f64]| -> f64 {
            let sse = self.css(&stat, p);
            if sse.is_finite() { sse } else { f64::MAX }
        };
        let best = numerics::nelder_mead(&initial, &lower, &upper, 400, &objective);

        let n_ar = self.ar_lags.len();
        let n_ma = self.ma_lags.len();
        self.ar_coefs = best[..n_ar].to_vec();
        self.ma_coefs = best[n_ar..n_ar + n_ma].to_vec();
        self.drift = if self.config.include_drift { best[n_ar + n_ma] } else { 0.0 };

        let max_lag = self.max_lag();
        let mut resid = vec![0.0; stat.len()];
        let mut sse = 0.0;
        for t in 0..stat.len() {
            let pred = css_predict(&stat, &resid, t, &self.ar_lags, &self.ma_lags, &self.ar_coefs, &self.ma_coefs, self.drift);
            let e = stat[t] - pred;
            resid[t] = e;
            if t >= max_lag {
                sse += e * e;
            }
        }

        self.stat = stat;
        self.residuals = resid;
        self.passes = passes;
        self.sse = sse;
        self.n = series.len();

        trace!(p = self.config.p, d = self.config.d, q = self.config.q, sse = self.sse, "arima css fit complete");
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        if self.n == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "arima: predict called before fit".to_string(),
            ));
        }
        let mut extended = self.stat.clone();
        let mut resid_hist = self.residuals.clone();
        for _ in 0..horizon {
            let t = extended.len();
            let pred = css_predict(&extended, &resid_hist, t, &self.ar_lags, &self.ma_lags, &self.ar_coefs, &self.ma_coefs, self.drift);
            extended.push(pred);
            resid_hist.push(0.0);
        }
        let mut forecast_diff = extended[self.stat.len()..].to_vec();
        for pass in self.passes.iter().rev() {
            forecast_diff = integrate(&forecast_diff, &pass.tail, pass.lag);
        }
        Ok(Forecast::point_only(forecast_diff))
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        let base = self.predict(horizon)?;
        let n_warmup = self.max_lag();
        let denom = (self.stat.len().saturating_sub(n_warmup)).max(1);
        let sigma = (self.sse / denom as f64).sqrt();
        let z = intervals::z_score(confidence_level);
        let lower: Vec<f64> = base
            .point
            .iter()
            .enumerate()
            .map(|(i, p)| p - z * sigma * ((i + 1) as f64).sqrt())
            .collect();
        let upper: Vec<f64> = base
            .point
            .iter()
            .enumerate()
            .map(|(i, p)| p + z * sigma * ((i + 1) as f64).sqrt())
            .collect();
        Ok(Forecast::with_bands(base.point, lower, upper, confidence_level))
    }

    fn name(&self) -> String {
        format!(
            "arima({},{},{})({},{},{})[{}]",
            self.config.p, self.config.d, self.config.q, self.config.seasonal_p, self.config.seasonal_d, self.config.seasonal_q, self.config.s
        )
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { prediction_intervals: true, in_sample_fitted: false, model_components: true, information_criteria: true }
    }

    fn components(&self) -> Option<ModelComponents> {
        Some(ModelComponents::Arima {
            p: self.config.p,
            d: self.config.d,
            q: self.config.q,
            seasonal_p: self.config.seasonal_p,
            seasonal_d: self.config.seasonal_d,
            seasonal_q: self.config.seasonal_q,
            s: self.config.s,
            drift: if self.config.include_drift { Some(self.drift) } else { None },
            ar_coefficients: self.ar_coefs.clone(),
            ma_coefficients: self.ma_coefs.clone(),
        })
    }

    fn aic(&self) -> Option<f64> {
        let k = self.ar_lags.len() + self.ma_lags.len() + if self.config.include_drift { 1 } else { 0 } + 1;
        let n_warmup = self.max_lag();
        let n = (self.stat.len().saturating_sub(n_warmup)).max(1) as f64;
        let sigma2 = (self.sse / n).max(1e-12);
        let loglik = -0.5 * n * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let aic = -2.0 * loglik + 2.0 * k as f64;
        if n - k as f64 - 1.0 > 0.0 {
            Some(aic + (2.0 * k as f64 * (k as f64 + 1.0)) / (n - k as f64 - 1.0))
        } else {
            Some(f64::INFINITY)
        }
    }
}

fn estimate_d(values: &[f64]) -> usize {
    let mut variance = sample_variance(values);
    let mut working = values.to_vec();
    let mut d = 0;
    while d < 2 && working.len() > 4 {
        let diffed = diff_once(&working, 1);
        let new_variance = sample_variance(&diffed);
        if new_variance < variance * 0.9 {
            working = diffed;
            variance = new_variance;
            d += 1;
        } else {
            break;
        }
    }
    d
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Stepwise AutoARIMA: starts from a Hyndman-Khandakar-style seed order
/// and greedily accepts neighboring orders (each regular/seasonal term
/// +-1) that improve AICc, stopping when no neighbor improves on the
/// incumbent.
pub struct AutoArima {
    seasonal_period: usize,
    best: Option<Arima>,
    models_evaluated: usize,
    models_failed: usize,
}

impl AutoArima {
    pub fn new(seasonal_period: usize) -> Self {
        Self { seasonal_period, best: None, models_evaluated: 0, models_failed: 0 }
    }

    pub fn models_evaluated(&self) -> usize {
        self.models_evaluated
    }

    pub fn models_failed(&self) -> usize {
        self.models_failed
    }

    fn try_fit(&mut self, config: ArimaConfig, series: &Series, cancel: &CancellationToken) -> Option<Arima> {
        self.models_evaluated += 1;
        let mut candidate = match Arima::new(config) {
            Ok(c) => c,
            Err(_) => {
                self.models_failed += 1;
                return None;
            }
        };
        match candidate.fit(series, cancel) {
            Ok(()) => Some(candidate),
            Err(_) => {
                self.models_failed += 1;
                None
            }
        }
    }

    fn neighbors(config: ArimaConfig) -> Vec<ArimaConfig> {
        let mut out = Vec::new();
        let deltas: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
        for (dp, dq) in deltas {
            let p = (config.p as i64 + dp).max(0) as usize;
            let q = (config.q as i64 + dq).max(0) as usize;
            if p <= 5 && q <= 5 {
                out.push(ArimaConfig { p, q, ..config });
            }
        }
        if config.s >= 2 {
            for (dp, dq) in deltas {
                let sp = (config.seasonal_p as i64 + dp).max(0) as usize;
                let sq = (config.seasonal_q as i64 + dq).max(0) as usize;
                if sp <= 2 && sq <= 2 {
                    out.push(ArimaConfig { seasonal_p: sp, seasonal_q: sq, ..config });
                }
            }
        }
        out.push(ArimaConfig { include_drift: !config.include_drift, ..config });
        out
    }
}

impl Forecaster for AutoArima {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        self.models_evaluated = 0;
        self.models_failed = 0;
        let d = estimate_d(series.values());
        let seasonal_d = if self.seasonal_period >= 2 && series.len() > 2 * self.seasonal_period {
            1
        } else {
            0
        };

        let seed = ArimaConfig {
            p: 2,
            d,
            q: 2,
            seasonal_p: if seasonal_d > 0 { 1 } else { 0 },
            seasonal_d,
            seasonal_q: if seasonal_d > 0 { 1 } else { 0 },
            s: self.seasonal_period.max(1),
            include_drift: d == 0,
        };

        cancel.check()?;
        let mut incumbent_config = seed;
        let mut incumbent = self.try_fit(seed, series, cancel);

        loop {
            cancel.check()?;
            let incumbent_aic = match &incumbent {
                Some(model) => model.aic().unwrap_or(f64::INFINITY),
                None => f64::INFINITY,
            };
            let mut improved = false;
            for neighbor in Self::neighbors(incumbent_config) {
                cancel.check()?;
                if let Some(candidate) = self.try_fit(neighbor, series, cancel) {
                    let candidate_aic = candidate.aic().unwrap_or(f64::INFINITY);
                    if candidate_aic < incumbent_aic {
                        debug!(aic = candidate_aic, "autoarima improved");
                        incumbent_config = neighbor;
                        incumbent = Some(candidate);
                        improved = true;
                        break;
                    }
                }
            }
            if !improved {
                break;
            }
        }

        self.best = Some(incumbent.ok_or_else(|| {
            ForecastError::NumericalFailure("AutoARIMA: no candidate converged".to_string())
        })?);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        self.best
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidConfiguration("AutoARIMA: predict called before fit".to_string()))?
            .predict(horizon)
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        self.best
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidConfiguration("AutoARIMA: predict called before fit".to_string()))?
            .predict_with_confidence(horizon, confidence_level)
    }

    fn name(&self) -> String {
        self.best.as_ref().map(|m| format!("auto_{}", m.name())).unwrap_or_else(|| "auto_arima".to_string())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { prediction_intervals: true, in_sample_fitted: false, model_components: true, information_criteria: true }
    }

    fn components(&self) -> Option<ModelComponents> {
        self.best.as_ref().and_then(|m| m.components())
    }

    fn aic(&self) -> Option<f64> {
        self.best.as_ref().and_then(|m| m.aic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn differencing_roundtrips_to_original_scale() {
        let values: Vec<f64> = (0..20).map(|i| (i * i) as f64).collect();
        let (stat, passes) = apply_differencing(&values, 2, 0, 1).unwrap();
        let mut reconstructed = stat;
        for pass in passes.iter().rev() {
            reconstructed = integrate(&reconstructed, &pass.tail, pass.lag);
        }
        // reconstructed should just reproduce the same differences forward
        // from the tail; verify length matches the stationary series.
        assert_eq!(reconstructed.len(), values.len() - 2);
    }

    #[test]
    fn arima_forecasts_constant_series_flat() {
        let series = Series::new(vec![10.0; 20]).unwrap();
        let config = ArimaConfig { p: 1, d: 0, q: 0, seasonal_p: 0, seasonal_d: 0, seasonal_q: 0, s: 1, include_drift: false };
        let mut model = Arima::new(config).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict(3).unwrap();
        for p in forecast.point {
            assert!((p - 10.0).abs() < 1.0, "p={p}");
        }
    }

    #[test]
    fn arima_rejects_short_series() {
        let series = Series::new(vec![1.0, 2.0, 3.0]).unwrap();
        let mut model = Arima::new(ArimaConfig::default()).unwrap();
        assert!(model.fit(&series, &CancellationToken::new()).is_err());
    }

    #[test]
    fn config_rejects_seasonal_orders_without_period() {
        let config = ArimaConfig { seasonal_p: 1, s: 1, ..ArimaConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn estimate_d_detects_linear_trend() {
        let values: Vec<f64> = (0..30).map(|i| i as f64 * 3.0).collect();
        assert!(estimate_d(&values) >= 1);
    }

    #[test]
    fn auto_arima_fits_and_tracks_candidate_counts() {
        let values: Vec<f64> = (0..40).map(|i| 5.0 + 0.3 * i as f64).collect();
        let series = Series::new(values).unwrap();
        let mut auto = AutoArima::new(1);
        auto.fit(&series, &CancellationToken::new()).unwrap();
        assert!(auto.models_evaluated() >= 1);
    }

    #[test]
    fn cancellation_aborts_auto_arima() {
        let values: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let series = Series::new(values).unwrap();
        let mut auto = AutoArima::new(1);
        let token = CancellationToken::new();
        token.cancel();
        assert!(auto.fit(&series, &token).is_err());
    }
}
