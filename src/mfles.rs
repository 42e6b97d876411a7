//! MFLES: a gradient-boosted additive decomposition engine. Each round
//! fits a trend sub-learner, a WLS-weighted seasonal sub-learner, and an
//! exponential-smoothing ensemble sub-learner against the current
//! residual, subtracts a (per-sub-learner) learning-rate-scaled copy, and
//! moves on.

use crate::cancel::CancellationToken;
use crate::decomposition::{self, TrendMethod};
use crate::error::{ForecastError, Result};
use crate::forecaster::{Capabilities, Forecaster};
use crate::numerics;
use crate::series::{Forecast, ModelComponents, Series};

/// Configuration for the MFLES engine.
#[derive(Debug, Clone)]
pub struct MflesConfig {
    pub max_rounds: usize,
    pub seasonal_periods: Vec<usize>,
    pub fourier_order: usize,
    pub trend_method: TrendMethod,
    /// When `true`, round 1 fits a flat (median) trend, rounds 2-4 fit an
    /// OLS line regardless of `trend_method`, and only round 5 onward use
    /// the configured `trend_method`. When `false`, every round uses
    /// `trend_method` directly. Defaults to `true`.
    pub progressive_trend: bool,
    /// When `true`, each round fits exactly one seasonal period, cycling
    /// through `seasonal_periods` round-robin. When `false`, all periods
    /// are stacked into a single joint WLS fit every round. Defaults to
    /// `true`.
    pub sequential_seasonality: bool,
    /// Number of evenly-spaced smoothing constants in the per-round
    /// exponential-smoothing ensemble sub-learner.
    pub es_ensemble_steps: usize,
    pub min_alpha: f64,
    pub max_alpha: f64,
    pub lr_trend: f64,
    pub lr_season: f64,
    pub lr_level: f64,
    /// When `true`, the baseline is a trailing moving-window median
    /// (window `2 * max(seasonal_periods)`) instead of the global median.
    pub moving_medians: bool,
    /// When `true`, forecasts are clipped to the training value range
    /// expanded by a fixed margin.
    pub cap_outliers: bool,
}

impl Default for MflesConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            seasonal_periods: Vec::new(),
            fourier_order: 5,
            trend_method: TrendMethod::Linear,
            progressive_trend: true,
            sequential_seasonality: true,
            es_ensemble_steps: 20,
            min_alpha: 0.1,
            max_alpha: 0.9,
            lr_trend: 0.3,
            lr_season: 0.5,
            lr_level: 0.8,
            moving_medians: false,
            cap_outliers: false,
        }
    }
}

impl MflesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "max_rounds must be positive".to_string(),
            ));
        }
        for (name, rate) in [
            ("lr_trend", self.lr_trend),
            ("lr_season", self.lr_season),
            ("lr_level", self.lr_level),
        ] {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(ForecastError::InvalidConfiguration(format!(
                    "{name} must be in (0, 1]"
                )));
            }
        }
        if self.fourier_order == 0 && !self.seasonal_periods.is_empty() {
            return Err(ForecastError::InvalidConfiguration(
                "fourier_order must be positive when seasonal_periods is non-empty".to_string(),
            ));
        }
        if self.seasonal_periods.iter().any(|&p| p == 0) {
            return Err(ForecastError::InvalidConfiguration(
                "seasonal periods must be positive".to_string(),
            ));
        }
        if self.es_ensemble_steps == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "es_ensemble_steps must be positive".to_string(),
            ));
        }
        if !(self.min_alpha > 0.0 && self.min_alpha < 1.0)
            || !(self.max_alpha > 0.0 && self.max_alpha < 1.0)
            || self.min_alpha >= self.max_alpha
        {
            return Err(ForecastError::InvalidConfiguration(
                "min_alpha must be < max_alpha, both in (0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct TrendRound {
    intercept: f64,
    slope: f64,
}

#[derive(Debug, Clone)]
struct SeasonalRound {
    periods: Vec<(usize, usize)>,
    coefs: Vec<f64>,
}

#[derive(Debug, Clone)]
struct EsRound {
    level: f64,
    fitted: Vec<f64>,
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn trailing_moving_median(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    (0..n)
        .map(|t| {
            let start = t.saturating_sub(window.saturating_sub(1));
            let mut w = values[start..=t].to_vec();
            numerics::median(&mut w)
        })
        .collect()
}

/// A fitted MFLES model.
#[derive(Debug, Clone)]
pub struct Mfles {
    config: MflesConfig,
    baseline: Vec<f64>,
    trend_rounds: Vec<TrendRound>,
    seasonal_rounds: Vec<SeasonalRound>,
    es_rounds: Vec<EsRound>,
    residual_std: f64,
    train_min: f64,
    train_max: f64,
    n: usize,
}

impl Mfles {
    pub fn new(config: MflesConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            baseline: Vec::new(),
            trend_rounds: Vec::new(),
            seasonal_rounds: Vec::new(),
            es_rounds: Vec::new(),
            residual_std: 0.0,
            train_min: 0.0,
            train_max: 0.0,
            n: 0,
        })
    }

    fn baseline_at(&self, t: usize) -> f64 {
        if self.baseline.is_empty() {
            return 0.0;
        }
        if t < self.baseline.len() {
            self.baseline[t]
        } else {
            *self.baseline.last().unwrap()
        }
    }

    fn trend_total(&self, t: f64) -> f64 {
        self.trend_rounds.iter().map(|r| r.intercept + r.slope * t).sum()
    }

    fn seasonal_total(&self, t: usize) -> f64 {
        self.seasonal_rounds
            .iter()
            .map(|round| {
                let row = decomposition::fourier_row(t, &round.periods);
                row.iter().zip(round.coefs.iter()).map(|(x, c)| x * c).sum::<f64>()
            })
            .sum()
    }

    fn es_total_fitted(&self, t: usize) -> f64 {
        self.es_rounds.iter().map(|r| r.fitted[t]).sum()
    }

    fn es_total_level(&self) -> f64 {
        self.es_rounds.iter().map(|r| r.level).sum()
    }

    fn fit_trend_round(&self, residual: &[f64], round_index: usize) -> TrendRound {
        let n = residual.len();
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();

        let median_only = self.config.progressive_trend && round_index == 0;
        let forced_linear = self.config.progressive_trend && (1..4).contains(&round_index);
        let method = if median_only {
            None
        } else if forced_linear {
            Some(TrendMethod::Linear)
        } else {
            Some(self.config.trend_method)
        };

        let (slope, intercept) = match method {
            None => {
                let mut copy = residual.to_vec();
                (0.0, numerics::median(&mut copy))
            }
            Some(TrendMethod::Robust) if n >= 3 => siegel_or_fallback(&x, residual),
            Some(TrendMethod::Loess) => match decomposition::loess(&x, residual, 0.3, 0) {
                Ok(smoothed) if n >= 2 => {
                    let slope = smoothed[n - 1] - smoothed[n - 2];
                    let intercept = smoothed[n - 1] - slope * (n - 1) as f64;
                    (slope, intercept)
                }
                Ok(smoothed) => (0.0, smoothed[0]),
                Err(_) => {
                    let mut copy = residual.to_vec();
                    (0.0, numerics::median(&mut copy))
                }
            },
            _ => {
                let design: Vec<Vec<f64>> = x.iter().map(|&xi| vec![1.0, xi]).collect();
                match numerics::ols(&design, residual) {
                    Ok(fit) if fit.beta.iter().all(|b| b.is_finite()) => (fit.beta[1], fit.beta[0]),
                    _ => {
                        let mut copy = residual.to_vec();
                        (0.0, numerics::median(&mut copy))
                    }
                }
            }
        };
        TrendRound {
            intercept: intercept * self.config.lr_trend,
            slope: slope * self.config.lr_trend,
        }
    }

    /// Fits one seasonal block (single period or a jointly stacked set),
    /// weighted by the seasonal-strength estimate
    /// `max(0, 1 - Var(remainder) / Var(residual))`. A singular WLS system
    /// or a non-positive residual variance downgrades the block to an
    /// all-zero coefficient vector rather than erroring.
    fn fit_seasonal_block(residual: &[f64], fourier_periods: &[(usize, usize)]) -> Vec<f64> {
        let n = residual.len();
        let design: Vec<Vec<f64>> = (0..n).map(|t| decomposition::fourier_row(t, fourier_periods)).collect();
        let k = design.first().map(|r| r.len()).unwrap_or(0);
        if k == 0 {
            return Vec::new();
        }

        let initial = match numerics::ols(&design, residual) {
            Ok(fit) if fit.beta.iter().all(|b| b.is_finite()) => fit,
            _ => return vec![0.0; k],
        };
        let seasonal_fitted: Vec<f64> = design
            .iter()
            .map(|row| row.iter().zip(initial.beta.iter()).map(|(x, b)| x * b).sum())
            .collect();
        let remainder: Vec<f64> = residual.iter().zip(seasonal_fitted.iter()).map(|(r, s)| r - s).collect();

        let var_residual = variance(residual);
        if var_residual <= 1e-12 {
            return vec![0.0; k];
        }
        let var_remainder = variance(&remainder);
        let strength = (1.0 - var_remainder / var_residual).clamp(0.0, 1.0);

        let weights = vec![strength; n];
        match numerics::wls(&design, residual, &weights) {
            Ok(beta) if beta.iter().all(|b| b.is_finite()) => beta,
            _ => vec![0.0; k],
        }
    }

    fn fit_seasonal_round(&self, residual: &mut [f64], round_index: usize) -> SeasonalRound {
        let periods = &self.config.seasonal_periods;

        let fourier_periods: Vec<(usize, usize)> = if self.config.sequential_seasonality {
            let p = periods[round_index % periods.len()];
            vec![(p, self.config.fourier_order)]
        } else {
            periods.iter().map(|&p| (p, self.config.fourier_order)).collect()
        };

        let coefs = Self::fit_seasonal_block(residual, &fourier_periods);
        let scaled: Vec<f64> = coefs.iter().map(|c| c * self.config.lr_season).collect();

        for (t, r) in residual.iter_mut().enumerate() {
            let row = decomposition::fourier_row(t, &fourier_periods);
            let contrib: f64 = row.iter().zip(scaled.iter()).map(|(x, c)| x * c).sum();
            *r -= contrib;
        }

        SeasonalRound { periods: fourier_periods, coefs: scaled }
    }

    /// `m` evenly-spaced smoothing constants in `[min_alpha, max_alpha]`,
    /// averaged into a single fitted series and a single extrapolation
    /// level, per round.
    fn fit_es_round(&self, residual: &[f64]) -> EsRound {
        let n = residual.len();
        let m = self.config.es_ensemble_steps;
        let alphas: Vec<f64> = if m <= 1 {
            vec![self.config.min_alpha]
        } else {
            (0..m)
                .map(|i| {
                    self.config.min_alpha
                        + (self.config.max_alpha - self.config.min_alpha) * i as f64 / (m - 1) as f64
                })
                .collect()
        };

        let mut fitted_sum = vec![0.0; n];
        let mut level_sum = 0.0;
        for &alpha in &alphas {
            let mut level = residual[0];
            for (t, &r) in residual.iter().enumerate() {
                fitted_sum[t] += level;
                level = alpha * r + (1.0 - alpha) * level;
            }
            level_sum += level;
        }
        let count = alphas.len() as f64;
        let lr = self.config.lr_level;
        EsRound {
            level: (level_sum / count) * lr,
            fitted: fitted_sum.iter().map(|v| (v / count) * lr).collect(),
        }
    }
}

fn siegel_or_fallback(x: &[f64], y: &[f64]) -> (f64, f64) {
    match numerics::siegel_repeated_medians(x, y) {
        Ok(result) => result,
        Err(_) => {
            let mut copy = y.to_vec();
            (0.0, numerics::median(&mut copy))
        }
    }
}

impl Forecaster for Mfles {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        let min_len = 2 * self.config.seasonal_periods.iter().copied().max().unwrap_or(1);
        if series.len() < min_len.max(4) {
            return Err(ForecastError::InsufficientData { needed: min_len.max(4), got: series.len() });
        }
        let values = series.values();
        let n = values.len();
        self.n = n;
        self.train_min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        self.train_max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        self.baseline = if self.config.moving_medians {
            let max_period = self.config.seasonal_periods.iter().copied().max().unwrap_or(1);
            trailing_moving_median(values, (2 * max_period).max(2))
        } else {
            let mut copy = values.to_vec();
            vec![numerics::median(&mut copy); n]
        };

        let mut residual: Vec<f64> = values.iter().zip(self.baseline.iter()).map(|(v, b)| v - b).collect();
        self.trend_rounds.clear();
        self.seasonal_rounds.clear();
        self.es_rounds.clear();

        for round_index in 0..self.config.max_rounds {
            cancel.check()?;

            let trend_round = self.fit_trend_round(&residual, round_index);
            for (t, r) in residual.iter_mut().enumerate() {
                *r -= trend_round.intercept + trend_round.slope * t as f64;
            }
            self.trend_rounds.push(trend_round);

            if !self.config.seasonal_periods.is_empty() {
                let seasonal_round = self.fit_seasonal_round(&mut residual, round_index);
                self.seasonal_rounds.push(seasonal_round);
            }

            cancel.check()?;
            let es_round = self.fit_es_round(&residual);
            for (t, r) in residual.iter_mut().enumerate() {
                *r -= es_round.fitted[t];
            }
            self.es_rounds.push(es_round);
        }

        let in_sample: Vec<f64> = (0..n)
            .map(|t| {
                self.baseline_at(t) + self.trend_total(t as f64) + self.seasonal_total(t) + self.es_total_fitted(t)
            })
            .collect();
        let errors: Vec<f64> = values.iter().zip(in_sample.iter()).map(|(v, f)| v - f).collect();
        let mean_err = errors.iter().sum::<f64>() / n as f64;
        self.residual_std = (errors.iter().map(|e| (e - mean_err).powi(2)).sum::<f64>() / n as f64).sqrt();

        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        if self.n == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "mfles: predict called before fit".to_string(),
            ));
        }
        let es_level = self.es_total_level();
        let mut point: Vec<f64> = (0..horizon)
            .map(|h| {
                let t = self.n + h;
                self.baseline_at(t) + self.trend_total(t as f64) + self.seasonal_total(t) + es_level
            })
            .collect();

        if self.config.cap_outliers {
            let range = (self.train_max - self.train_min).max(1e-9);
            let lower_bound = self.train_min - 0.5 * range;
            let upper_bound = self.train_max + 0.5 * range;
            for p in point.iter_mut() {
                *p = p.clamp(lower_bound, upper_bound);
            }
        }

        let fitted: Vec<f64> = (0..self.n)
            .map(|t| {
                self.baseline_at(t) + self.trend_total(t as f64) + self.seasonal_total(t) + self.es_total_fitted(t)
            })
            .collect();
        Ok(Forecast::point_only(point).with_fitted(fitted))
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        let base = self.predict(horizon)?;
        let z = crate::intervals::z_score(confidence_level);
        let widen = self.residual_std.max(1e-9) * z;
        let lower = base.point.iter().map(|p| p - widen).collect();
        let upper = base.point.iter().map(|p| p + widen).collect();
        Ok(Forecast::with_bands(base.point, lower, upper, confidence_level).with_fitted(base.fitted.unwrap_or_default()))
    }

    fn name(&self) -> String {
        "mfles".to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            prediction_intervals: true,
            in_sample_fitted: true,
            model_components: true,
            information_criteria: false,
        }
    }

    fn components(&self) -> Option<ModelComponents> {
        Some(ModelComponents::Mfles {
            rounds: self.trend_rounds.len(),
            seasonal_periods: self.config.seasonal_periods.clone(),
        })
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        if self.n == 0 {
            return None;
        }
        Some(
            (0..self.n)
                .map(|t| {
                    self.baseline_at(t) + self.trend_total(t as f64) + self.seasonal_total(t) + self.es_total_fitted(t)
                })
                .collect(),
        )
    }
}
