//! Grid search over MFLES hyperparameters, scored by cross-validation.

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::cv::{self, CVConfig, WindowKind};
use crate::decomposition::TrendMethod;
use crate::error::{ForecastError, Result};
use crate::forecaster::{Capabilities, Forecaster};
use crate::mfles::{Mfles, MflesConfig};
use crate::series::{Forecast, ModelComponents, Series};

/// Search space for `AutoMfles`.
#[derive(Debug, Clone)]
pub struct AutoMflesConfig {
    pub trend_methods: Vec<TrendMethod>,
    pub fourier_orders: Vec<usize>,
    pub max_rounds_options: Vec<usize>,
    pub seasonal_periods: Vec<usize>,
    pub cv_horizon: usize,
}

impl Default for AutoMflesConfig {
    fn default() -> Self {
        Self {
            trend_methods: vec![TrendMethod::Linear, TrendMethod::Robust],
            fourier_orders: vec![1, 3],
            max_rounds_options: vec![5, 10, 20],
            seasonal_periods: Vec::new(),
            cv_horizon: 1,
        }
    }
}

impl AutoMflesConfig {
    fn candidates(&self) -> Vec<MflesConfig> {
        let mut out = Vec::new();
        for &trend_method in &self.trend_methods {
            for &fourier_order in &self.fourier_orders {
                for &max_rounds in &self.max_rounds_options {
                    out.push(MflesConfig {
                        max_rounds,
                        seasonal_periods: self.seasonal_periods.clone(),
                        fourier_order,
                        trend_method,
                        ..MflesConfig::default()
                    });
                }
            }
        }
        out
    }
}

/// Selects the `MflesConfig` with the lowest mean cross-validated MAE, then
/// refits it on the full series.
pub struct AutoMfles {
    search: AutoMflesConfig,
    best: Option<Mfles>,
    best_cv_mae: f64,
    models_evaluated: usize,
    models_failed: usize,
}

impl AutoMfles {
    pub fn new(search: AutoMflesConfig) -> Self {
        Self { search, best: None, best_cv_mae: f64::INFINITY, models_evaluated: 0, models_failed: 0 }
    }

    pub fn models_evaluated(&self) -> usize {
        self.models_evaluated
    }

    pub fn models_failed(&self) -> usize {
        self.models_failed
    }

    pub fn best_cv_mae(&self) -> f64 {
        self.best_cv_mae
    }
}

impl Forecaster for AutoMfles {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        self.models_evaluated = 0;
        self.models_failed = 0;
        self.best_cv_mae = f64::INFINITY;

        let candidates = self.search.candidates();
        if candidates.is_empty() {
            return Err(ForecastError::InvalidConfiguration(
                "AutoMFLES: empty search space".to_string(),
            ));
        }
        let cv_config = CVConfig {
            horizon: self.search.cv_horizon,
            step: self.search.cv_horizon.max(1),
            gap: 0,
            strategy: WindowKind::Expanding,
            initial_window: (series.len() / 2).max(8),
            ..CVConfig::default()
        };

        let mut best_config: Option<MflesConfig> = None;
        for config in candidates {
            cancel.check()?;
            self.models_evaluated += 1;
            let config_for_factory = config.clone();
            let result = cv::evaluate(series, &cv_config, cancel, || {
                Box::new(Mfles::new(config_for_factory.clone()).expect("grid candidates are pre-validated"))
            });
            match result {
                Ok(cv_result) => {
                    if cv_result.mean_mae < self.best_cv_mae {
                        debug!(mae = cv_result.mean_mae, fourier_order = config.fourier_order, max_rounds = config.max_rounds, "new best mfles candidate");
                        self.best_cv_mae = cv_result.mean_mae;
                        best_config = Some(config);
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

        let config = best_config.ok_or_else(|| {
            ForecastError::NumericalFailure("AutoMFLES: no candidate survived cross-validation".to_string())
        })?;
        let mut final_model = Mfles::new(config)?;
        final_model.fit(series, cancel)?;
        self.best = Some(final_model);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        self.best
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidConfiguration("AutoMFLES: predict called before fit".to_string()))?
            .predict(horizon)
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        self.best
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidConfiguration("AutoMFLES: predict called before fit".to_string()))?
            .predict_with_confidence(horizon, confidence_level)
    }

    fn name(&self) -> String {
        "auto_mfles".to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { prediction_intervals: true, in_sample_fitted: true, model_components: true, information_criteria: false }
    }

    fn components(&self) -> Option<ModelComponents> {
        self.best.as_ref().and_then(|m| m.components())
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        self.best.as_ref().and_then(|m| m.fitted_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_full_grid_and_selects_a_model() {
        let values: Vec<f64> = (0..40).map(|i| 10.0 + 0.3 * i as f64).collect();
        let series = Series::new(values).unwrap();
        let search = AutoMflesConfig {
            trend_methods: vec![TrendMethod::Linear],
            fourier_orders: vec![1],
            max_rounds_options: vec![3, 5],
            seasonal_periods: Vec::new(),
            cv_horizon: 1,
        };
        let mut auto = AutoMfles::new(search);
        auto.fit(&series, &CancellationToken::new()).unwrap();
        assert_eq!(auto.models_evaluated(), 2);
        assert!(auto.best_cv_mae().is_finite());
        let forecast = auto.predict(3).unwrap();
        assert_eq!(forecast.point.len(), 3);
    }

    #[test]
    fn rejects_empty_search_space() {
        let values: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let series = Series::new(values).unwrap();
        let search = AutoMflesConfig { trend_methods: vec![], fourier_orders: vec![], max_rounds_options: vec![], seasonal_periods: vec![], cv_horizon: 1 };
        let mut auto = AutoMfles::new(search);
        assert!(auto.fit(&series, &CancellationToken::new()).is_err());
    }

    #[test]
    fn cancellation_aborts_grid_search() {
        let values: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let series = Series::new(values).unwrap();
        let mut auto = AutoMfles::new(AutoMflesConfig::default());
        let token = CancellationToken::new();
        token.cancel();
        assert!(auto.fit(&series, &token).is_err());
    }
}
