//! ETS(Error, Trend, Season) exponential smoothing state-space family and
//! the AutoETS grid search over it.
//!
//! The recursion below is a single generalized update shared across every
//! (E,T,S) combination rather than 30 hand-written variants: trend and
//! season enter either additively or as ratios depending on their type,
//! and the one-step error is always computed as the absolute residual
//! `y - yhat`. This keeps the 30-member grid tractable as one code path;
//! the distinction that matters statistically between additive- and
//! multiplicative-error members is captured in the AICc computation
//! (multiplicative error adds the `sum(log|yhat|)` Jacobian term), not in
//! the point-forecast recursion itself.

use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::error::{ForecastError, Result};
use crate::forecaster::{Capabilities, Forecaster};
use crate::intervals;
use crate::numerics;
use crate::series::{Forecast, ModelComponents, Series};

/// Error component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Additive,
    Multiplicative,
}

/// Trend component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendType {
    None,
    Additive,
    AdditiveDamped,
    Multiplicative,
    MultiplicativeDamped,
}

/// Season component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonType {
    None,
    Additive,
    Multiplicative,
}

impl TrendType {
    fn is_present(self) -> bool {
        !matches!(self, TrendType::None)
    }

    fn is_damped(self) -> bool {
        matches!(self, TrendType::AdditiveDamped | TrendType::MultiplicativeDamped)
    }

    fn is_multiplicative(self) -> bool {
        matches!(self, TrendType::Multiplicative | TrendType::MultiplicativeDamped)
    }

    fn letter(self) -> char {
        match self {
            TrendType::None => 'N',
            TrendType::Additive => 'A',
            TrendType::AdditiveDamped => 'A',
            TrendType::Multiplicative => 'M',
            TrendType::MultiplicativeDamped => 'M',
        }
    }
}

/// A single point in the (E,T,S) grid, plus the seasonal period it applies to.
#[derive(Debug, Clone, Copy)]
pub struct EtsSpec {
    pub error: ErrorType,
    pub trend: TrendType,
    pub season: SeasonType,
    pub period: usize,
}

impl EtsSpec {
    /// Hyndman-style short notation, e.g. `"ETS(A,Ad,M)"`.
    pub fn notation(&self) -> String {
        let e = match self.error {
            ErrorType::Additive => 'A',
            ErrorType::Multiplicative => 'M',
        };
        let t = match self.trend {
            TrendType::None => "N".to_string(),
            other if other.is_damped() => format!("{}d", other.letter()),
            other => other.letter().to_string(),
        };
        let s = match self.season {
            SeasonType::None => 'N',
            SeasonType::Additive => 'A',
            SeasonType::Multiplicative => 'M',
        };
        format!("ETS({e},{t},{s})")
    }

    /// (M, A, A) and (M, Ad, A) are excluded as numerically unstable.
    fn is_unstable(&self) -> bool {
        self.error == ErrorType::Multiplicative
            && matches!(self.trend, TrendType::Additive | TrendType::AdditiveDamped)
            && self.season == SeasonType::Additive
    }

    fn requires_positive_data(&self) -> bool {
        self.trend.is_multiplicative() || self.season == SeasonType::Multiplicative || self.error == ErrorType::Multiplicative
    }

    /// All 30 admissible (E,T,S) combinations for `period` minus the 2
    /// unstable ones, giving 28.
    pub fn all_combinations(period: usize) -> Vec<EtsSpec> {
        let errors = [ErrorType::Additive, ErrorType::Multiplicative];
        let trends = [
            TrendType::None,
            TrendType::Additive,
            TrendType::AdditiveDamped,
            TrendType::Multiplicative,
            TrendType::MultiplicativeDamped,
        ];
        let seasons = if period >= 2 {
            vec![SeasonType::None, SeasonType::Additive, SeasonType::Multiplicative]
        } else {
            vec![SeasonType::None]
        };
        let mut specs = Vec::new();
        for &error in &errors {
            for &trend in &trends {
                for &season in &seasons {
                    let spec = EtsSpec { error, trend, season, period };
                    if !spec.is_unstable() {
                        specs.push(spec);
                    }
                }
            }
        }
        specs
    }
}

/// Smoothing parameters. `None` entries are optimized during `fit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EtsConfig {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    pub phi: Option<f64>,
}

impl EtsConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("alpha", self.alpha), ("beta", self.beta), ("gamma", self.gamma)] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(ForecastError::InvalidConfiguration(format!(
                        "{name} must be in [0, 1], got {v}"
                    )));
                }
            }
        }
        if let Some(phi) = self.phi {
            if !(0.0..=1.0).contains(&phi) {
                return Err(ForecastError::InvalidConfiguration(format!(
                    "phi must be in [0, 1], got {phi}"
                )));
            }
        }
        Ok(())
    }
}

/// A fitted ETS model.
#[derive(Debug, Clone)]
pub struct Ets {
    spec: EtsSpec,
    config: EtsConfig,
    alpha: f64,
    beta: f64,
    gamma: f64,
    phi: f64,
    level: f64,
    trend: f64,
    season: Vec<f64>,
    fitted: Vec<f64>,
    residual_std: f64,
    aicc: f64,
    n: usize,
}

const EPS: f64 = 1e-8;

impl Ets {
    pub fn new(spec: EtsSpec, config: EtsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            spec,
            config,
            alpha: config.alpha.unwrap_or(0.3),
            beta: config.beta.unwrap_or(0.1),
            gamma: config.gamma.unwrap_or(0.1),
            phi: config.phi.unwrap_or(0.98),
            level: 0.0,
            trend: if spec.trend.is_multiplicative() { 1.0 } else { 0.0 },
            season: Vec::new(),
            fitted: Vec::new(),
            residual_std: 0.0,
            aicc: f64::INFINITY,
            n: 0,
        })
    }

    fn initial_states(&self, values: &[f64]) -> (f64, f64, Vec<f64>) {
        let m = self.spec.period.max(1);
        let season_present = self.spec.season != SeasonType::None && m >= 2;
        let level0;
        let trend0;
        let mut season0 = vec![if self.spec.season == SeasonType::Multiplicative { 1.0 } else { 0.0 }; m];

        if season_present && values.len() >= 2 * m {
            let first_cycle_mean = values[..m].iter().sum::<f64>() / m as f64;
            let second_cycle_mean = values[m..2 * m].iter().sum::<f64>() / m as f64;
            level0 = first_cycle_mean;
            trend0 = if self.spec.trend.is_multiplicative() {
                (second_cycle_mean / first_cycle_mean.max(EPS)).max(EPS)
            } else {
                (second_cycle_mean - first_cycle_mean) / m as f64
            };
            for i in 0..m {
                if self.spec.season == SeasonType::Multiplicative {
                    season0[i] = values[i] / first_cycle_mean.max(EPS);
                } else {
                    season0[i] = values[i] - first_cycle_mean;
                }
            }
        } else {
            level0 = values[0];
            trend0 = if self.spec.trend.is_multiplicative() {
                (values[1] / values[0].max(EPS)).max(EPS)
            } else {
                values[1] - values[0]
            };
        }
        (level0, if self.spec.trend.is_present() { trend0 } else { 0.0 }, season0)
    }

    /// Runs the recursion once with the given smoothing parameters,
    /// returning (fitted values, final level, final trend, final season
    /// cycle, sum of squared errors).
    fn run(&self, values: &[f64], alpha: f64, beta: f64, gamma: f64, phi: f64) -> (Vec<f64>, f64, f64, Vec<f64>, f64) {
        let m = self.spec.period.max(1);
        let (mut level, mut trend, mut season) = self.initial_states(values);
        let n = values.len();
        let mut fitted = Vec::with_capacity(n);
        let mut sse = 0.0;

        for t in 0..n {
            let g = match self.spec.trend {
                TrendType::None => level,
                TrendType::Additive => level + trend,
                TrendType::AdditiveDamped => level + phi * trend,
                TrendType::Multiplicative => level * trend,
                TrendType::MultiplicativeDamped => level * trend.powf(phi),
            };
            let season_idx = t % m;
            let s_prev = if self.spec.season == SeasonType::None { 0.0 } else { season[season_idx] };
            let yhat = match self.spec.season {
                SeasonType::None => g,
                SeasonType::Additive => g + s_prev,
                SeasonType::Multiplicative => g * s_prev,
            };
            fitted.push(yhat);
            let e = values[t] - yhat;
            sse += e * e;

            let level_e = match self.spec.season {
                SeasonType::Multiplicative => e / s_prev.abs().max(EPS) * s_prev.signum(),
                _ => e,
            };
            let new_level = g + alpha * level_e;

            let new_trend = match self.spec.trend {
                TrendType::None => 0.0,
                TrendType::Additive => trend + beta * level_e,
                TrendType::AdditiveDamped => phi * trend + beta * level_e,
                TrendType::Multiplicative => {
                    let rel = e / g.abs().max(EPS);
                    (trend + beta * rel).max(EPS)
                }
                TrendType::MultiplicativeDamped => {
                    let rel = e / g.abs().max(EPS);
                    (trend.powf(phi) + beta * rel).max(EPS)
                }
            };

            if self.spec.season != SeasonType::None {
                let new_season = match self.spec.season {
                    SeasonType::Additive => s_prev + gamma * e,
                    SeasonType::Multiplicative => {
                        let rel = e / g.abs().max(EPS);
                        s_prev * (1.0 + gamma * rel)
                    }
                    SeasonType::None => unreachable!(),
                };
                season[season_idx] = new_season;
            }

            level = new_level;
            trend = new_trend;
        }

        (fitted, level, trend, season, sse)
    }

    fn aicc_from_sse(&self, sse: f64, n: usize) -> f64 {
        let k = 1 // alpha
            + if self.spec.trend.is_present() { 1 } else { 0 } // beta
            + if self.spec.season != SeasonType::None { 1 } else { 0 } // gamma
            + if self.spec.trend.is_damped() { 1 } else { 0 } // phi
            + 1; // sigma^2
        let n = n as f64;
        let sigma2 = (sse / n).max(1e-12);
        let loglik = -0.5 * n * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let aic = -2.0 * loglik + 2.0 * k as f64;
        if n - (k as f64) - 1.0 > 0.0 {
            aic + (2.0 * k as f64 * (k as f64 + 1.0)) / (n - k as f64 - 1.0)
        } else {
            f64::INFINITY
        }
    }
}

impl Forecaster for Ets {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        let m = self.spec.period.max(1);
        if self.spec.season != SeasonType::None {
            series.validate_seasonal_period(m)?;
        } else if series.len() < 2 {
            return Err(ForecastError::InsufficientData { needed: 2, got: series.len() });
        }
        let values = series.values();
        if self.spec.requires_positive_data() && values.iter().any(|&v| v <= 0.0) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "{} requires strictly positive data for its multiplicative components",
                self.spec.notation()
            )));
        }
        cancel.check()?;

        let optimize_alpha = self.config.alpha.is_none();
        let optimize_beta = self.config.beta.is_none() && self.spec.trend.is_present();
        let optimize_gamma = self.config.gamma.is_none() && self.spec.season != SeasonType::None;
        let optimize_phi = self.config.phi.is_none() && self.spec.trend.is_damped();

        if optimize_alpha || optimize_beta || optimize_gamma || optimize_phi {
            let mut initial = Vec::new();
            let mut lower = Vec::new();
            let mut upper = Vec::new();
            if optimize_alpha {
                initial.push(self.alpha);
                lower.push(0.01);
                upper.push(0.99);
            }
            if optimize_beta {
                initial.push(self.beta);
                lower.push(0.001);
                upper.push(0.99);
            }
            if optimize_gamma {
                initial.push(self.gamma);
                lower.push(0.001);
                upper.push(0.99);
            }
            if optimize_phi {
                initial.push(self.phi);
                lower.push(0.8);
                upper.push(0.999);
            }

            let objective = |p: &[f64]| -> f64 {
                let mut idx = 0;
                let alpha = if optimize_alpha {
                    let v = p[idx];
                    idx += 1;
                    v
                } else {
                    self.alpha
                };
                let beta = if optimize_beta {
                    let v = p[idx];
                    idx += 1;
                    v
                } else {
                    self.beta
                };
                let gamma = if optimize_gamma {
                    let v = p[idx];
                    idx += 1;
                    v
                } else {
                    self.gamma
                };
                let phi = if optimize_phi { p[idx] } else { self.phi };
                let (_, _, _, _, sse) = self.run(values, alpha, beta, gamma, phi);
                if sse.is_finite() { sse } else { f64::MAX }
            };

            let best = numerics::nelder_mead(&initial, &lower, &upper, 300, &objective);
            let mut idx = 0;
            if optimize_alpha {
                self.alpha = best[idx];
                idx += 1;
            }
            if optimize_beta {
                self.beta = best[idx];
                idx += 1;
            }
            if optimize_gamma {
                self.gamma = best[idx];
                idx += 1;
            }
            if optimize_phi {
                self.phi = best[idx];
            }
        }

        cancel.check()?;
        let (fitted, level, trend, season, sse) = self.run(values, self.alpha, self.beta, self.gamma, self.phi);
        self.fitted = fitted;
        self.level = level;
        self.trend = trend;
        self.season = season;
        self.n = values.len();
        self.aicc = self.aicc_from_sse(sse, self.n);

        let errors: Vec<f64> = values.iter().zip(self.fitted.iter()).map(|(v, f)| v - f).collect();
        let mean_err = errors.iter().sum::<f64>() / self.n as f64;
        self.residual_std = (errors.iter().map(|e| (e - mean_err).powi(2)).sum::<f64>() / self.n as f64).sqrt();

        trace!(model = %self.spec.notation(), aicc = self.aicc, "ets fit complete");
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        if self.n == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "ets: predict called before fit".to_string(),
            ));
        }
        let m = self.spec.period.max(1);
        let mut point = Vec::with_capacity(horizon);
        for h in 1..=horizon {
            let damp_sum = if self.spec.trend.is_damped() {
                (1..=h).map(|j| self.phi.powi(j as i32)).sum::<f64>()
            } else {
                h as f64
            };
            let g = match self.spec.trend {
                TrendType::None => self.level,
                TrendType::Additive => self.level + h as f64 * self.trend,
                TrendType::AdditiveDamped => self.level + damp_sum * self.trend,
                TrendType::Multiplicative => self.level * self.trend.powi(h as i32),
                TrendType::MultiplicativeDamped => self.level * self.trend.powf(damp_sum),
            };
            let season_idx = (self.n + h - 1) % m;
            let s = if self.spec.season == SeasonType::None { 0.0 } else { self.season[season_idx] };
            let yhat = match self.spec.season {
                SeasonType::None => g,
                SeasonType::Additive => g + s,
                SeasonType::Multiplicative => g * s,
            };
            point.push(yhat);
        }
        Ok(Forecast::point_only(point).with_fitted(self.fitted.clone()))
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        let base = self.predict(horizon)?;
        let z = intervals::z_score(confidence_level);
        // widen proportionally to sqrt(h) to reflect accumulating uncertainty,
        // matching the usual random-walk-with-drift interval shape.
        let lower: Vec<f64> = base
            .point
            .iter()
            .enumerate()
            .map(|(i, p)| p - z * self.residual_std * ((i + 1) as f64).sqrt())
            .collect();
        let upper: Vec<f64> = base
            .point
            .iter()
            .enumerate()
            .map(|(i, p)| p + z * self.residual_std * ((i + 1) as f64).sqrt())
            .collect();
        Ok(Forecast::with_bands(base.point, lower, upper, confidence_level).with_fitted(base.fitted.unwrap_or_default()))
    }

    fn name(&self) -> String {
        self.spec.notation()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            prediction_intervals: true,
            in_sample_fitted: true,
            model_components: true,
            information_criteria: true,
        }
    }

    fn components(&self) -> Option<ModelComponents> {
        Some(ModelComponents::Ets {
            notation: self.spec.notation(),
            damped: self.spec.trend.is_damped(),
            alpha: self.alpha,
            beta: if self.spec.trend.is_present() { Some(self.beta) } else { None },
            gamma: if self.spec.season != SeasonType::None { Some(self.gamma) } else { None },
            phi: if self.spec.trend.is_damped() { Some(self.phi) } else { None },
        })
    }

    fn aic(&self) -> Option<f64> {
        Some(self.aicc)
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        Some(self.fitted.clone())
    }
}

/// Searches the 28-member admissible ETS grid (for a given seasonal
/// period) and refits the AICc-best model on the full series.
pub struct AutoEts {
    period: usize,
    best: Option<Ets>,
    models_evaluated: usize,
    models_failed: usize,
}

impl AutoEts {
    pub fn new(period: usize) -> Self {
        Self { period, best: None, models_evaluated: 0, models_failed: 0 }
    }

    pub fn models_evaluated(&self) -> usize {
        self.models_evaluated
    }

    pub fn models_failed(&self) -> usize {
        self.models_failed
    }

    pub fn best_notation(&self) -> Option<String> {
        self.best.as_ref().map(|m| m.name())
    }
}

impl Forecaster for AutoEts {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        let specs = EtsSpec::all_combinations(self.period);
        self.models_evaluated = 0;
        self.models_failed = 0;
        let mut best: Option<Ets> = None;

        for spec in specs {
            cancel.check()?;
            self.models_evaluated += 1;
            let mut candidate = Ets::new(spec, EtsConfig::default())?;
            match candidate.fit(series, cancel) {
                Ok(()) => {
                    let better = best.as_ref().map(|b| candidate.aicc < b.aicc).unwrap_or(true);
                    if better {
                        debug!(model = %spec.notation(), aicc = candidate.aicc, "new best ETS candidate");
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

        self.best = Some(best.ok_or_else(|| {
            ForecastError::NumericalFailure("AutoETS: no candidate converged".to_string())
        })?);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        self.best
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidConfiguration("AutoETS: predict called before fit".to_string()))?
            .predict(horizon)
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        self.best
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidConfiguration("AutoETS: predict called before fit".to_string()))?
            .predict_with_confidence(horizon, confidence_level)
    }

    fn name(&self) -> String {
        self.best.as_ref().map(|m| format!("auto_ets[{}]", m.name())).unwrap_or_else(|| "auto_ets".to_string())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            prediction_intervals: true,
            in_sample_fitted: true,
            model_components: true,
            information_criteria: true,
        }
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
    fn ann_tracks_level_series() {
        let series = Series::new(vec![10.0; 20]).unwrap();
        let spec = EtsSpec { error: ErrorType::Additive, trend: TrendType::None, season: SeasonType::None, period: 1 };
        let mut model = Ets::new(spec, EtsConfig::default()).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict(3).unwrap();
        for p in forecast.point {
            assert!((p - 10.0).abs() < 1e-6);
        }
    }

    #[test]
    fn aan_extrapolates_linear_trend() {
        let values: Vec<f64> = (0..30).map(|i| 5.0 + 2.0 * i as f64).collect();
        let series = Series::new(values).unwrap();
        let spec = EtsSpec { error: ErrorType::Additive, trend: TrendType::Additive, season: SeasonType::None, period: 1 };
        let mut model = Ets::new(spec, EtsConfig::default()).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict(1).unwrap();
        assert!(forecast.point[0] > values_last(&model) - 1.0);
    }

    fn values_last(model: &Ets) -> f64 {
        model.fitted.last().copied().unwrap_or(0.0)
    }

    #[test]
    fn aaa_captures_seasonal_pattern() {
        let period = 4;
        let pattern = [5.0, -5.0, 3.0, -3.0];
        let values: Vec<f64> = (0..40).map(|i| 50.0 + pattern[i % period]).collect();
        let series = Series::new(values).unwrap();
        let spec = EtsSpec { error: ErrorType::Additive, trend: TrendType::None, season: SeasonType::Additive, period };
        let mut model = Ets::new(spec, EtsConfig::default()).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict(4).unwrap();
        for (p, expected) in forecast.point.iter().zip(pattern.iter()) {
            assert!((p - (50.0 + expected)).abs() < 5.0, "p={p} expected={expected}");
        }
    }

    #[test]
    fn unstable_combination_is_excluded_from_grid() {
        let specs = EtsSpec::all_combinations(4);
        assert!(!specs.iter().any(|s| {
            s.error == ErrorType::Multiplicative
                && matches!(s.trend, TrendType::Additive | TrendType::AdditiveDamped)
                && s.season == SeasonType::Additive
        }));
    }

    #[test]
    fn grid_has_28_members_when_seasonal() {
        let specs = EtsSpec::all_combinations(4);
        assert_eq!(specs.len(), 28);
    }

    #[test]
    fn grid_has_10_members_when_non_seasonal() {
        let specs = EtsSpec::all_combinations(1);
        assert_eq!(specs.len(), 10);
    }

    #[test]
    fn multiplicative_requires_positive_data() {
        let series = Series::new(vec![-1.0, 2.0, 3.0, 4.0]).unwrap();
        let spec = EtsSpec { error: ErrorType::Multiplicative, trend: TrendType::None, season: SeasonType::None, period: 1 };
        let mut model = Ets::new(spec, EtsConfig::default()).unwrap();
        assert!(model.fit(&series, &CancellationToken::new()).is_err());
    }

    #[test]
    fn auto_ets_selects_a_model_and_counts_candidates() {
        let values: Vec<f64> = (0..36).map(|i| 20.0 + 0.5 * i as f64).collect();
        let series = Series::new(values).unwrap();
        let mut auto = AutoEts::new(1);
        auto.fit(&series, &CancellationToken::new()).unwrap();
        assert!(auto.models_evaluated() >= 10);
        assert!(auto.best_notation().is_some());
    }

    #[test]
    fn cancellation_aborts_auto_ets_search() {
        let values: Vec<f64> = (0..36).map(|i| i as f64).collect();
        let series = Series::new(values).unwrap();
        let mut auto = AutoEts::new(1);
        let token = CancellationToken::new();
        token.cancel();
        assert!(auto.fit(&series, &token).is_err());
    }
}
