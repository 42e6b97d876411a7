//! Rolling/expanding-window cross-validation over a `Forecaster`.

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::{ForecastError, Result};
use crate::forecaster::Forecaster;
use crate::metrics;
use crate::series::Series;

/// Fold-generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Training window grows with each fold.
    Expanding,
    /// Training window has fixed size and slides forward.
    Rolling,
}

#[derive(Debug, Clone)]
pub struct CVConfig {
    pub horizon: usize,
    /// Size of the first fold's training window (and, for `Rolling`, every
    /// fold's training window).
    pub initial_window: usize,
    pub step: usize,
    pub strategy: WindowKind,
    /// Number of points skipped between the end of training and the start
    /// of the held-out window, to avoid leakage from overlapping lags.
    pub gap: usize,
    /// Points immediately preceding the previous fold's test window that
    /// are excluded from the current (rolling) fold's training window.
    pub embargo: usize,
    /// Caps the number of folds generated, earliest-first.
    pub max_folds: Option<usize>,
    /// When `true`, a fold whose test window would run past the end of the
    /// series is truncated instead of skipped. Defaults to `false`
    /// (skip), so every retained fold has a full-length test window.
    pub clip_horizon: bool,
}

impl Default for CVConfig {
    fn default() -> Self {
        Self {
            horizon: 1,
            initial_window: 10,
            step: 1,
            strategy: WindowKind::Expanding,
            gap: 0,
            embargo: 0,
            max_folds: None,
            clip_horizon: false,
        }
    }
}

impl CVConfig {
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(ForecastError::InvalidConfiguration("cv horizon must be positive".to_string()));
        }
        if self.step == 0 {
            return Err(ForecastError::InvalidConfiguration("cv step must be positive".to_string()));
        }
        if self.initial_window == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "cv initial_window must be positive".to_string(),
            ));
        }
        if self.max_folds == Some(0) {
            return Err(ForecastError::InvalidConfiguration(
                "cv max_folds must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// One train/test split.
#[derive(Debug, Clone)]
pub struct CVFold {
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

/// Generates fold boundaries for a series of length `n`.
///
/// A fold whose test window would run past `n` is skipped unless
/// `clip_horizon` is set, in which case it is truncated to whatever
/// remains. `embargo` (rolling strategy only — an expanding window's
/// training start is always `0`, so there is no leading edge to embargo)
/// pulls the training start forward past the embargo zone preceding the
/// previous fold's test window. Generation stops once `max_folds` folds
/// have been produced, if set.
pub fn generate_folds(n: usize, config: &CVConfig) -> Result<Vec<CVFold>> {
    config.validate()?;
    let mut folds: Vec<CVFold> = Vec::new();
    if config.initial_window >= n {
        return Ok(folds);
    }

    let mut train_end = config.initial_window;
    while train_end < n {
        if let Some(max) = config.max_folds {
            if folds.len() >= max {
                break;
            }
        }
        let test_start = train_end + config.gap;
        if test_start >= n {
            break;
        }
        let test_end_full = test_start + config.horizon;
        let (test_end, skip) = if test_end_full > n {
            if config.clip_horizon {
                (n, false)
            } else {
                (test_end_full, true)
            }
        } else {
            (test_end_full, false)
        };

        if !skip {
            let mut train_start = if config.strategy == WindowKind::Rolling {
                train_end.saturating_sub(config.initial_window)
            } else {
                0
            };
            if config.embargo > 0 && config.strategy == WindowKind::Rolling {
                if let Some(prev) = folds.last() {
                    let embargo_bound = prev.test_start.saturating_sub(config.embargo);
                    train_start = train_start.max(embargo_bound.min(train_end));
                }
            }
            folds.push(CVFold { train_start, train_end, test_start, test_end });
        }

        train_end += config.step;
    }
    Ok(folds)
}

/// Scores one fold in isolation. Metrics that can fail on degenerate data
/// (zero actual values, zero-variance actuals, a flat baseline) are
/// `None` rather than aborting the whole cross-validation run.
#[derive(Debug, Clone)]
pub struct FoldScore {
    pub fold: usize,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mape: Option<f64>,
    pub smape: Option<f64>,
    pub mase: Option<f64>,
    pub r2: Option<f64>,
}

/// Aggregated cross-validation result.
#[derive(Debug, Clone)]
pub struct CVResult {
    pub fold_scores: Vec<FoldScore>,
    pub mean_mae: f64,
    pub mean_rmse: f64,
}

/// Runs `config`'s folds against `factory()`-produced fresh forecasters,
/// fitting on each fold's training slice and scoring against its held-out
/// window. `factory` must return an unfitted model so folds don't leak
/// state into one another.
pub fn evaluate<F>(series: &Series, config: &CVConfig, cancel: &CancellationToken, mut factory: F) -> Result<CVResult>
where
    F: FnMut() -> Box<dyn Forecaster>,
{
    let folds = generate_folds(series.len(), config)?;
    if folds.is_empty() {
        return Err(ForecastError::InsufficientData {
            needed: config.initial_window + config.horizon,
            got: series.len(),
        });
    }

    let mut fold_scores = Vec::with_capacity(folds.len());
    let values = series.values();
    for (idx, fold) in folds.iter().enumerate() {
        cancel.check()?;
        let train_slice = &values[fold.train_start..fold.train_end];
        let test_slice = &values[fold.test_start..fold.test_end];
        let train_series = Series::new(train_slice.to_vec())?;

        let mut model = factory();
        if let Err(err) = model.fit(&train_series, cancel) {
            if err.is_fatal_to_search() {
                return Err(err);
            }
            debug!(fold = idx, error = %err, "cv fold skipped after fit failure");
            continue;
        }
        let horizon = test_slice.len();
        let forecast = model.predict(horizon)?;
        let predicted = &forecast.point[..horizon.min(forecast.point.len())];
        let actual = &test_slice[..predicted.len()];

        let mae = metrics::mae(actual, predicted)?;
        let mse = metrics::mse(actual, predicted)?;
        let rmse = metrics::rmse(actual, predicted)?;
        let mape = metrics::mape(actual, predicted).ok();
        let smape = metrics::smape(actual, predicted).ok();
        let mase = metrics::mase(actual, predicted, train_slice).ok();
        let r2 = metrics::r2(actual, predicted).ok();
        fold_scores.push(FoldScore { fold: idx, mae, mse, rmse, mape, smape, mase, r2 });
    }

    if fold_scores.is_empty() {
        return Err(ForecastError::NumericalFailure("cv: every fold failed to fit".to_string()));
    }

    let mean_mae = fold_scores.iter().map(|f| f.mae).sum::<f64>() / fold_scores.len() as f64;
    let mean_rmse = fold_scores.iter().map(|f| f.rmse).sum::<f64>() / fold_scores.len() as f64;
    Ok(CVResult { fold_scores, mean_mae, mean_rmse })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baselines::Naive;

    #[test]
    fn expanding_folds_grow_train_window() {
        let config = CVConfig { horizon: 2, step: 2, gap: 0, strategy: WindowKind::Expanding, initial_window: 5, ..CVConfig::default() };
        let folds = generate_folds(15, &config).unwrap();
        assert!(folds.len() >= 3);
        for w in folds.windows(2) {
            assert!(w[1].train_end >= w[0].train_end);
            assert_eq!(w[0].train_start, 0);
        }
    }

    #[test]
    fn rolling_folds_keep_fixed_window_size() {
        let config = CVConfig { horizon: 2, step: 2, gap: 0, strategy: WindowKind::Rolling, initial_window: 6, ..CVConfig::default() };
        let folds = generate_folds(20, &config).unwrap();
        assert!(!folds.is_empty());
        for fold in &folds {
            assert_eq!(fold.train_end - fold.train_start, 6);
        }
    }

    #[test]
    fn spec_worked_example_produces_exactly_eight_rolling_folds() {
        let config = CVConfig {
            horizon: 6,
            step: 6,
            gap: 0,
            strategy: WindowKind::Rolling,
            initial_window: 50,
            max_folds: Some(8),
            ..CVConfig::default()
        };
        let folds = generate_folds(100, &config).unwrap();
        assert_eq!(folds.len(), 8);
        assert_eq!((folds[0].train_start, folds[0].train_end), (0, 50));
        assert_eq!((folds[0].test_start, folds[0].test_end), (50, 56));
        assert_eq!((folds[7].train_start, folds[7].train_end), (42, 92));
        assert_eq!((folds[7].test_start, folds[7].test_end), (92, 98));
    }

    #[test]
    fn final_fold_horizon_is_skipped_by_default() {
        let config = CVConfig { horizon: 5, step: 5, gap: 0, strategy: WindowKind::Expanding, initial_window: 10, ..CVConfig::default() };
        // n=12: the only candidate fold (train_end=10) would need test=[10,15) but n=12
        let folds = generate_folds(12, &config).unwrap();
        assert!(folds.is_empty());
    }

    #[test]
    fn clip_horizon_truncates_instead_of_skipping() {
        let config = CVConfig {
            horizon: 5,
            step: 5,
            gap: 0,
            strategy: WindowKind::Expanding,
            initial_window: 10,
            clip_horizon: true,
            ..CVConfig::default()
        };
        let folds = generate_folds(12, &config).unwrap();
        assert_eq!(folds.len(), 1);
        assert_eq!(folds[0].test_end - folds[0].test_start, 2);
    }

    #[test]
    fn gap_pushes_test_window_forward() {
        let config = CVConfig { horizon: 2, step: 2, gap: 3, strategy: WindowKind::Expanding, initial_window: 5, ..CVConfig::default() };
        let folds = generate_folds(20, &config).unwrap();
        assert_eq!(folds[0].test_start, folds[0].train_end + 3);
    }

    #[test]
    fn max_folds_caps_fold_count() {
        let config = CVConfig { horizon: 2, step: 2, gap: 0, strategy: WindowKind::Expanding, initial_window: 5, max_folds: Some(2), ..CVConfig::default() };
        let folds = generate_folds(20, &config).unwrap();
        assert_eq!(folds.len(), 2);
    }

    #[test]
    fn embargo_pulls_rolling_train_start_forward() {
        let plain = CVConfig { horizon: 2, step: 2, gap: 0, strategy: WindowKind::Rolling, initial_window: 6, embargo: 0, ..CVConfig::default() };
        let embargoed = CVConfig { embargo: 3, ..plain.clone() };
        let plain_folds = generate_folds(20, &plain).unwrap();
        let embargoed_folds = generate_folds(20, &embargoed).unwrap();
        assert!(embargoed_folds[1].train_start >= plain_folds[1].train_start);
    }

    #[test]
    fn evaluate_scores_naive_baseline() {
        let values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let series = Series::new(values).unwrap();
        let config = CVConfig { horizon: 2, step: 4, gap: 0, strategy: WindowKind::Expanding, initial_window: 10, ..CVConfig::default() };
        let result = evaluate(&series, &config, &CancellationToken::new(), || Box::new(Naive::default())).unwrap();
        assert!(result.mean_mae >= 0.0);
        assert!(!result.fold_scores.is_empty());
        assert!(result.fold_scores[0].mse >= 0.0);
    }

    #[test]
    fn rejects_series_too_short_for_any_fold() {
        let series = Series::new(vec![1.0, 2.0, 3.0]).unwrap();
        let config = CVConfig::default();
        let result = evaluate(&series, &config, &CancellationToken::new(), || Box::new(Naive::default()));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_initial_window() {
        let config = CVConfig { initial_window: 0, ..CVConfig::default() };
        assert!(config.validate().is_err());
    }
}
