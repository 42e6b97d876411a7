//! Wraps an auto-search `Forecaster` to capture search diagnostics:
//! candidate counts, wall time, and the winning model's description.

use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::forecaster::{Capabilities, Forecaster};
use crate::series::{Forecast, ModelComponents, Series};

/// Diagnostics captured from one auto-search fit.
#[derive(Debug, Clone)]
pub struct SearchDiagnostics {
    pub models_evaluated: usize,
    pub models_failed: usize,
    pub selected_model: String,
    pub fit_duration: Duration,
}

/// Any auto-search forecaster that can report how many candidates it tried.
pub trait AutoSearch: Forecaster {
    fn models_evaluated(&self) -> usize;
    fn models_failed(&self) -> usize;
}

/// Wraps an `AutoSearch` forecaster, recording diagnostics alongside the
/// normal `Forecaster` contract.
pub struct AutoDiagnostics<M: AutoSearch> {
    inner: M,
    diagnostics: Option<SearchDiagnostics>,
}

impl<M: AutoSearch> AutoDiagnostics<M> {
    pub fn new(inner: M) -> Self {
        Self { inner, diagnostics: None }
    }

    pub fn diagnostics(&self) -> Option<&SearchDiagnostics> {
        self.diagnostics.as_ref()
    }

    pub fn into_inner(self) -> M {
        self.inner
    }
}

impl<M: AutoSearch> Forecaster for AutoDiagnostics<M> {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.fit(series, cancel);
        let fit_duration = start.elapsed();
        self.diagnostics = Some(SearchDiagnostics {
            models_evaluated: self.inner.models_evaluated(),
            models_failed: self.inner.models_failed(),
            selected_model: if result.is_ok() { self.inner.name() } else { "none".to_string() },
            fit_duration,
        });
        result
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        self.inner.predict(horizon)
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        self.inner.predict_with_confidence(horizon, confidence_level)
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn components(&self) -> Option<ModelComponents> {
        self.inner.components()
    }

    fn aic(&self) -> Option<f64> {
        self.inner.aic()
    }

    fn fitted_values(&self) -> Option<Vec<f64>> {
        self.inner.fitted_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ets::AutoEts;

    impl AutoSearch for AutoEts {
        fn models_evaluated(&self) -> usize {
            AutoEts::models_evaluated(self)
        }

        fn models_failed(&self) -> usize {
            AutoEts::models_failed(self)
        }
    }

    #[test]
    fn records_evaluated_count_and_duration() {
        let values: Vec<f64> = (0..20).map(|i| 10.0 + i as f64 * 0.1).collect();
        let series = Series::new(values).unwrap();
        let mut wrapped = AutoDiagnostics::new(AutoEts::new(1));
        wrapped.fit(&series, &CancellationToken::new()).unwrap();
        let diag = wrapped.diagnostics().unwrap();
        assert!(diag.models_evaluated > 0);
        assert_eq!(diag.models_failed, 0.max(diag.models_failed));
    }

    #[test]
    fn records_failure_state_on_error() {
        let series = Series::new(vec![1.0, 2.0, 3.0]).unwrap();
        let mut wrapped = AutoDiagnostics::new(AutoEts::new(12));
        let _ = wrapped.fit(&series, &CancellationToken::new());
        assert!(wrapped.diagnostics().is_some());
    }
}
