//! Combines several fitted forecasters into a single `Forecaster`.

use crate::cancel::CancellationToken;
use crate::error::{ForecastError, Result};
use crate::forecaster::{Capabilities, Forecaster};
use crate::metrics;
use crate::series::{Forecast, Series};

/// Fraction of the training series reserved as a held-out tail when scoring
/// members under `WeightedAccuracy`.
const HELD_OUT_FRACTION: f64 = 0.2;

/// Softmax temperature for `WeightedAic`/`WeightedAccuracy`. Lower sharpens
/// the distribution toward the best-scoring member; higher flattens it
/// toward uniform.
const TEMPERATURE: f64 = 1.0;

/// How member forecasts are combined into the ensemble forecast.
#[derive(Debug, Clone)]
pub enum CombinationPolicy {
    Mean,
    Median,
    /// `softmax(-AIC / tau)` over members that expose an AIC; members that
    /// don't are excluded from the softmax and receive zero weight. Falls
    /// back to `Mean` if no member exposes one.
    WeightedAic,
    /// `softmax(-score / tau)` where `score` is each member's MAE against a
    /// held-out tail of the training series, from a pre-fit pass on the
    /// remaining prefix.
    WeightedAccuracy,
}

/// `softmax(-scores / tau)`, stable against the largest `-score/tau` term.
fn softmax_neg(scores: &[f64], tau: f64) -> Vec<f64> {
    let scaled: Vec<f64> = scores.iter().map(|s| -s / tau).collect();
    let max = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scaled.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

/// Owns and fits a set of members, combining their forecasts per `policy`.
pub struct Ensemble {
    members: Vec<Box<dyn Forecaster>>,
    policy: CombinationPolicy,
    weights: Vec<f64>,
}

impl Ensemble {
    pub fn new(members: Vec<Box<dyn Forecaster>>, policy: CombinationPolicy) -> Result<Self> {
        if members.is_empty() {
            return Err(ForecastError::InvalidConfiguration(
                "ensemble requires at least one member".to_string(),
            ));
        }
        Ok(Self { members, policy, weights: Vec::new() })
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name()).collect()
    }

    /// Each member's own forecast for `horizon`, in member order. Exposed so
    /// callers can inspect what the ensemble is averaging over, not just its
    /// combined output.
    pub fn individual_forecasts(&self, horizon: usize) -> Result<Vec<Forecast>> {
        self.members.iter().map(|m| m.predict(horizon)).collect()
    }

    fn combine(&self, columns: &[Vec<f64>]) -> Vec<f64> {
        let horizon = columns[0].len();
        (0..horizon)
            .map(|h| {
                let values: Vec<f64> = columns.iter().map(|c| c[h]).collect();
                match self.policy {
                    CombinationPolicy::Mean | CombinationPolicy::WeightedAic | CombinationPolicy::WeightedAccuracy => {
                        if self.weights.is_empty() {
                            values.iter().sum::<f64>() / values.len() as f64
                        } else {
                            values.iter().zip(self.weights.iter()).map(|(v, w)| v * w).sum::<f64>()
                        }
                    }
                    CombinationPolicy::Median => {
                        let mut sorted = values.clone();
                        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
                        let mid = sorted.len() / 2;
                        if sorted.len() % 2 == 0 {
                            (sorted[mid - 1] + sorted[mid]) / 2.0
                        } else {
                            sorted[mid]
                        }
                    }
                }
            })
            .collect()
    }

    /// Weights `WeightedAic` members by `softmax(-AIC / tau)`, restricted to
    /// members that expose one. Members fit before this runs.
    fn weighted_aic(&self) -> Vec<f64> {
        let aics: Vec<Option<f64>> = self.members.iter().map(|m| m.aic()).collect();
        let exposing: Vec<usize> = aics.iter().enumerate().filter_map(|(i, a)| a.map(|_| i)).collect();
        if exposing.is_empty() {
            return vec![1.0 / self.members.len() as f64; self.members.len()];
        }
        let scores: Vec<f64> = exposing.iter().map(|&i| aics[i].unwrap()).collect();
        let softmaxed = softmax_neg(&scores, TEMPERATURE);
        let mut weights = vec![0.0; self.members.len()];
        for (pos, &i) in exposing.iter().enumerate() {
            weights[i] = softmaxed[pos];
        }
        weights
    }

    /// Fits each member on the prefix `(1 - HELD_OUT_FRACTION)` of `series`,
    /// scores its forecast against the held-out tail, and weights by
    /// `softmax(-MAE / tau)`. Leaves members fit on the prefix; the caller
    /// must refit them on the full series afterward for production use.
    fn weighted_accuracy(&mut self, series: &Series, cancel: &CancellationToken) -> Result<Vec<f64>> {
        let n = series.len();
        let tail_len = ((n as f64 * HELD_OUT_FRACTION).round() as usize).clamp(1, n.saturating_sub(1));
        let prefix_len = n - tail_len;
        let values = series.values();
        let prefix_series = Series::new(values[..prefix_len].to_vec())?;
        let held_out_actual = &values[prefix_len..];

        let mut scores = Vec::with_capacity(self.members.len());
        for member in self.members.iter_mut() {
            cancel.check()?;
            let score = member
                .fit(&prefix_series, cancel)
                .and_then(|_| member.predict(tail_len))
                .map(|forecast| metrics::mae(held_out_actual, &forecast.point).unwrap_or(f64::INFINITY))
                .unwrap_or(f64::INFINITY);
            scores.push(score);
        }

        if scores.iter().all(|s| !s.is_finite()) {
            return Ok(vec![1.0 / self.members.len() as f64; self.members.len()]);
        }
        let worst_finite = scores.iter().cloned().filter(|s| s.is_finite()).fold(0.0_f64, f64::max);
        let scores: Vec<f64> = scores.iter().map(|&s| if s.is_finite() { s } else { worst_finite * 2.0 + 1.0 }).collect();
        Ok(softmax_neg(&scores, TEMPERATURE))
    }
}

impl Forecaster for Ensemble {
    fn fit(&mut self, series: &Series, cancel: &CancellationToken) -> Result<()> {
        self.weights = match self.policy {
            CombinationPolicy::WeightedAccuracy => self.weighted_accuracy(series, cancel)?,
            _ => Vec::new(),
        };

        for member in self.members.iter_mut() {
            cancel.check()?;
            member.fit(series, cancel)?;
        }

        self.weights = match self.policy {
            CombinationPolicy::Mean | CombinationPolicy::Median => Vec::new(),
            CombinationPolicy::WeightedAic => self.weighted_aic(),
            CombinationPolicy::WeightedAccuracy => self.weights.clone(),
        };
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let columns: Result<Vec<Vec<f64>>> = self.members.iter().map(|m| m.predict(horizon).map(|f| f.point)).collect();
        let columns = columns?;
        Ok(Forecast::point_only(self.combine(&columns)))
    }

    fn predict_with_confidence(&self, horizon: usize, confidence_level: f64) -> Result<Forecast> {
        let forecasts: Result<Vec<Forecast>> = self.members.iter().map(|m| m.predict_with_confidence(horizon, confidence_level)).collect();
        let forecasts = forecasts?;
        let point_cols: Vec<Vec<f64>> = forecasts.iter().map(|f| f.point.clone()).collect();
        let point = self.combine(&point_cols);

        let all_bands = forecasts.iter().all(|f| f.lower.is_some() && f.upper.is_some());
        if !all_bands {
            return Ok(Forecast::point_only(point).unsupported_intervals());
        }
        let lower_cols: Vec<Vec<f64>> = forecasts.iter().map(|f| f.lower.clone().unwrap()).collect();
        let upper_cols: Vec<Vec<f64>> = forecasts.iter().map(|f| f.upper.clone().unwrap()).collect();
        let lower = self.combine(&lower_cols);
        let upper = self.combine(&upper_cols);
        Ok(Forecast::with_bands(point, lower, upper, confidence_level))
    }

    fn name(&self) -> String {
        format!("ensemble({})", self.member_names().join("+"))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            prediction_intervals: self.members.iter().all(|m| m.capabilities().prediction_intervals),
            in_sample_fitted: false,
            model_components: false,
            information_criteria: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baselines::{Naive, Ses};

    fn members() -> Vec<Box<dyn Forecaster>> {
        vec![Box::new(Naive::default()), Box::new(Ses::new(0.3).unwrap())]
    }

    #[test]
    fn mean_combination_averages_members() {
        let mut ensemble = Ensemble::new(members(), CombinationPolicy::Mean).unwrap();
        let series = Series::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        ensemble.fit(&series, &CancellationToken::new()).unwrap();
        let forecast = ensemble.predict(2).unwrap();
        assert_eq!(forecast.point.len(), 2);
    }

    #[test]
    fn median_combination_succeeds_with_odd_and_even_member_counts() {
        let mut ensemble = Ensemble::new(members(), CombinationPolicy::Median).unwrap();
        let series = Series::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        ensemble.fit(&series, &CancellationToken::new()).unwrap();
        assert!(ensemble.predict(1).is_ok());
    }

    #[test]
    fn weighted_accuracy_weights_sum_to_one_and_refits_on_full_series() {
        let mut ensemble = Ensemble::new(members(), CombinationPolicy::WeightedAccuracy).unwrap();
        let series = Series::new(vec![5.0; 10]).unwrap();
        ensemble.fit(&series, &CancellationToken::new()).unwrap();
        assert!((ensemble.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        // Naive refit on the full constant series should predict the last value exactly.
        let forecast = ensemble.predict(1).unwrap();
        assert!((forecast.point[0] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_accuracy_favors_member_with_lower_held_out_error() {
        // A flat series with one noisy jump right before the held-out tail:
        // Naive (last-value) will badly mispredict the flat tail relative to
        // SES, which should end up with the larger weight.
        let mut values = vec![10.0; 8];
        values.push(40.0);
        values.extend(vec![10.0; 6]);
        let series = Series::new(values).unwrap();
        let mut ensemble = Ensemble::new(members(), CombinationPolicy::WeightedAccuracy).unwrap();
        ensemble.fit(&series, &CancellationToken::new()).unwrap();
        assert_eq!(ensemble.weights.len(), 2);
        assert!((ensemble.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_aic_falls_back_to_uniform_when_no_member_exposes_one() {
        let mut ensemble = Ensemble::new(members(), CombinationPolicy::WeightedAic).unwrap();
        let series = Series::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        ensemble.fit(&series, &CancellationToken::new()).unwrap();
        // Naive and Ses expose no AIC, so weighted_aic falls back to uniform.
        for w in &ensemble.weights {
            assert!((w - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn individual_forecasts_returns_one_per_member() {
        let mut ensemble = Ensemble::new(members(), CombinationPolicy::Mean).unwrap();
        let series = Series::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        ensemble.fit(&series, &CancellationToken::new()).unwrap();
        let forecasts = ensemble.individual_forecasts(3).unwrap();
        assert_eq!(forecasts.len(), 2);
        for f in &forecasts {
            assert_eq!(f.point.len(), 3);
        }
    }

    #[test]
    fn rejects_empty_member_list() {
        assert!(Ensemble::new(Vec::new(), CombinationPolicy::Mean).is_err());
    }

    #[test]
    fn ensemble_beats_or_matches_the_worse_individual_on_a_noisy_constant() {
        let series = Series::new(vec![10.0, 10.1, 9.9, 10.2, 9.8, 10.0, 10.1, 9.9]).unwrap();
        let mut ensemble = Ensemble::new(members(), CombinationPolicy::Mean).unwrap();
        ensemble.fit(&series, &CancellationToken::new()).unwrap();
        let ensemble_forecast = ensemble.predict(1).unwrap();

        let mut naive = Naive::default();
        naive.fit(&series, &CancellationToken::new()).unwrap();
        let naive_forecast = naive.predict(1).unwrap();

        assert!((ensemble_forecast.point[0] - 10.0).abs() <= (naive_forecast.point[0] - 10.0).abs() + 0.5);
    }
}
