//! The `Forecaster` contract every concrete model (baseline, MFLES, ETS,
//! ARIMA, TBATS, MSTL, Ensemble) implements.

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::metrics;
use crate::series::{Forecast, ModelComponents, Series};

/// Which optional capabilities a `Forecaster` exposes. Callers branch on
/// these rather than calling a method and catching `Unsupported`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub prediction_intervals: bool,
    pub in_sample_fitted: bool,
    pub model_components: bool,
    pub information_criteria: bool,
}

/// The 8 accuracy metrics named in the external interface, computed
/// against a held-out actual vector.
#[derive(Debug, Clone, Copy)]
pub struct AccuracyMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mape: Option<f64>,
    pub smape: Option<f64>,
    pub mase: Option<f64>,
    pub r2: Option<f64>,
    pub bias: f64,
}

/// Common contract for every forecasting model in the crate.
///
/// `fit` consumes the implementor in place (it mutates `&mut self`) rather
/// than returning a new fitted type, so Auto-* selectors can hold a
/// `Vec<Box<dyn Forecaster>>` and refit the winner on the full series
/// without re-allocating a new trait object.
pub trait Forecaster {
    /// Fit the model to `series`, checking `cancel` between expensive
    /// internal steps (boosting rounds, search iterations).
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()>;

    /// Produce a point forecast for `horizon` steps past the fitted series.
    fn predict(&self, horizon: usize) -> Result<Forecast>;

    /// Produce a forecast with prediction bands at `confidence_level`
    /// (e.g. `0.95`). Returns `Err(Unsupported)` if `capabilities()` does
    /// not advertise `prediction_intervals` instead of silently omitting
    /// bands.
    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast>;

    /// Score `self`'s predictions against `actual` using the 8 metrics
    /// named in the external interface. `baseline` supplies the in-sample
    /// series `mase` scales against.
    fn score(&self, actual: &[f64], forecast: &[f64], baseline: &[f64]) -> Result<AccuracyMetrics> {
        Ok(AccuracyMetrics {
            mae: metrics::mae(actual, forecast)?,
            mse: metrics::mse(actual, forecast)?,
            rmse: metrics::rmse(actual, forecast)?,
            mape: metrics::mape(actual, forecast).ok(),
            smape: metrics::smape(actual, forecast).ok(),
            mase: metrics::mase(actual, forecast, baseline).ok(),
            r2: metrics::r2(actual, forecast).ok(),
            bias: metrics::bias(actual, forecast)?,
        })
    }

    /// A short, stable model name (e.g. `"ets(A,N,N)"`, `"mfles"`).
    fn name(&self) -> String;

    /// Which optional capabilities this implementation supports.
    fn capabilities(&self) -> Capabilities;

    /// Structured view of the fitted state, when `capabilities().model_components`.
    fn components(&self) -> Option<ModelComponents> {
        None
    }

    /// Akaike information criterion of the fit, when
    /// `capabilities().information_criteria`.
    fn aic(&self) -> Option<f64> {
        None
    }

    /// In-sample fitted values, when `capabilities().in_sample_fitted`.
    fn fitted_values(&self) -> Option<Vec<f64>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstantForecaster {
        value: f64,
    }

    impl Forecaster for ConstantForecaster {
        fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
            cancel.check()?;
            self.value = series.values().last().copied().unwrap_or(0.0);
            Ok(())
        }

        fn predict(&self, horizon: usize) -> Result<Forecast> {
            Ok(Forecast::point_only(vec![self.value; horizon]))
        }

        fn predict_with_confidence(&self, horizon: usize, _confidence_level: f64) -> Result<Forecast> {
            Ok(self.predict(horizon)?.unsupported_intervals())
        }

        fn name(&self) -> String {
            "constant".to_string()
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
    }

    #[test]
    fn default_score_uses_metrics_module() {
        let model = ConstantForecaster { value: 2.0 };
        let actual = vec![2.0, 2.0, 2.0];
        let forecast = vec![2.0, 2.0, 2.0];
        let baseline = vec![1.0, 2.0, 3.0, 4.0];
        let scored = model.score(&actual, &forecast, &baseline).unwrap();
        assert_eq!(scored.mae, 0.0);
        assert_eq!(scored.mse, 0.0);
    }

    #[test]
    fn unsupported_intervals_marks_flag() {
        let mut model = ConstantForecaster { value: 0.0 };
        let series = Series::new(vec![1.0, 2.0, 3.0]).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = model.predict_with_confidence(2, 0.95).unwrap();
        assert!(forecast.intervals_unsupported);
    }
}
