//! `fcst_core`: a univariate time-series forecasting engine.
//!
//! Ships a shared [`Forecaster`] contract, a handful of baselines, and
//! three families of more sophisticated models: a gradient-boosted additive
//! decomposition ([`mfles`]), exponential smoothing state-space models
//! ([`ets`]), and Box-Jenkins ARIMA ([`arima`]), plus TBATS ([`tbats`]) and
//! MSTL ([`mstl`]) decomposition-based forecasters. [`cv`] cross-validates
//! any forecaster, [`ensemble`] combines several, and [`diagnostics`] wraps
//! an auto-search model to report what it tried.

pub mod arima;
pub mod automfles;
pub mod baselines;
pub mod cancel;
pub mod cv;
pub mod decomposition;
pub mod diagnostics;
pub mod ensemble;
pub mod error;
pub mod ets;
pub mod forecaster;
pub mod intervals;
pub mod metrics;
pub mod mfles;
pub mod mstl;
pub mod numerics;
pub mod series;
pub mod tbats;

pub use automfles::{AutoMfles, AutoMflesConfig};
pub use baselines::{Naive, Ses, Sma, SeasonalNaive, Theta};
pub use cancel::CancellationToken;
pub use cv::{CVConfig, CVFold, CVResult, FoldScore, WindowKind};
pub use diagnostics::{AutoDiagnostics, AutoSearch, SearchDiagnostics};
pub use ensemble::{CombinationPolicy, Ensemble};
pub use error::{ForecastError, Result};
pub use arima::{ArimaConfig, Arima, AutoArima};
pub use ets::{AutoEts, Ets, EtsConfig, EtsSpec};
pub use forecaster::{AccuracyMetrics, Capabilities, Forecaster};
pub use mfles::{Mfles, MflesConfig};
pub use mstl::{AutoMstl, Mstl, MstlConfig};
pub use series::{Forecast, ModelComponents, Series};
pub use tbats::{AutoTbats, Tbats, TbatsConfig};

#[cfg(test)]
mod tests {
    use super::*;

    /// End-to-end: fit a baseline on a short seasonal series, forecast, and
    /// score against a naive reference — exercises the full public surface
    /// in one pass.
    #[test]
    fn seasonal_naive_end_to_end() {
        let values = vec![
            112.0, 118.0, 132.0, 129.0, 121.0, 135.0, 148.0, 148.0, 136.0, 119.0, 104.0, 118.0, 115.0, 126.0, 141.0, 135.0,
        ];
        let series = Series::new(values.clone()).unwrap();
        let mut model = SeasonalNaive::new(12).unwrap();
        let token = CancellationToken::new();
        model.fit(&series, &token).unwrap();
        let forecast = model.predict(4).unwrap();
        assert_eq!(forecast.point.len(), 4);

        let mut baseline = Naive::default();
        baseline.fit(&series, &token).unwrap();
        let baseline_forecast = baseline.predict(4).unwrap();

        let actual = vec![126.0, 135.0, 150.0, 140.0];
        let score = model.score(&actual, &forecast.point, &baseline_forecast.point).unwrap();
        assert!(score.mae >= 0.0);
    }

    /// Synthetic sine-plus-trend series: MFLES should recover both signal
    /// components with reasonably low reconstruction error.
    #[test]
    fn mfles_recovers_sine_plus_trend() {
        let period = 12;
        let values: Vec<f64> = (0..60)
            .map(|i| 20.0 + 0.4 * i as f64 + 8.0 * (2.0 * std::f64::consts::PI * i as f64 / period as f64).sin())
            .collect();
        let series = Series::new(values.clone()).unwrap();
        let config = MflesConfig { seasonal_periods: vec![period], ..MflesConfig::default() };
        let mut model = Mfles::new(config).unwrap();
        model.fit(&series, &CancellationToken::new()).unwrap();
        let fitted = model.fitted_values().unwrap();
        let mae: f64 = values.iter().zip(fitted.iter()).map(|(a, f)| (a - f).abs()).sum::<f64>() / values.len() as f64;
        assert!(mae < 10.0, "mfles mae too high: {mae}");
    }

    /// Rolling-window CV fold boundaries never overlap the held-out window
    /// with its own training window.
    #[test]
    fn rolling_cv_folds_do_not_leak_into_training() {
        let config = CVConfig { horizon: 3, step: 3, gap: 1, strategy: WindowKind::Rolling, initial_window: 10, ..CVConfig::default() };
        let folds = cv::generate_folds(40, &config).unwrap();
        assert!(!folds.is_empty());
        for fold in &folds {
            assert!(fold.test_start >= fold.train_end + config.gap);
        }
    }

    /// An ensemble of two baselines should never blow past either member's
    /// worst-case forecast by more than a small margin.
    #[test]
    fn ensemble_combines_within_member_bounds() {
        let values: Vec<f64> = (0..20).map(|i| 10.0 + (i % 3) as f64 * 0.5).collect();
        let series = Series::new(values).unwrap();
        let members: Vec<Box<dyn Forecaster>> = vec![Box::new(Naive::default()), Box::new(Ses::new(0.4).unwrap())];
        let mut ensemble = Ensemble::new(members, CombinationPolicy::Mean).unwrap();
        ensemble.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = ensemble.predict(2).unwrap();

        let mut naive = Naive::default();
        naive.fit(&series, &CancellationToken::new()).unwrap();
        let naive_point = naive.predict(2).unwrap().point;

        for (e, n) in forecast.point.iter().zip(naive_point.iter()) {
            assert!((e - n).abs() < 5.0);
        }
    }

    /// AutoMFLES's grid search evaluates exactly the configured candidate
    /// count and reports it through diagnostics.
    #[test]
    fn automfles_grid_evaluation_count_matches_search_space() {
        let values: Vec<f64> = (0..40).map(|i| 10.0 + 0.2 * i as f64).collect();
        let series = Series::new(values).unwrap();
        let search = AutoMflesConfig {
            trend_methods: vec![decomposition::TrendMethod::Linear, decomposition::TrendMethod::Robust],
            fourier_orders: vec![1],
            max_rounds_options: vec![3, 5],
            seasonal_periods: Vec::new(),
            cv_horizon: 1,
        };
        let mut auto = AutoMfles::new(search);
        auto.fit(&series, &CancellationToken::new()).unwrap();
        assert_eq!(auto.models_evaluated(), 4);
    }
}
