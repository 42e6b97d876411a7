//! Accuracy metrics shared by `Forecaster::score` and the cross-validation
//! and ensemble-weighting machinery.

use crate::error::{ForecastError, Result};

fn validate_inputs(actual: &[f64], forecast: &[f64]) -> Result<()> {
    if actual.is_empty() || forecast.is_empty() {
        return Err(ForecastError::InvalidConfiguration(
            "metrics: empty input".to_string(),
        ));
    }
    if actual.len() != forecast.len() {
        return Err(ForecastError::InvalidConfiguration(format!(
            "metrics: length mismatch, actual {} vs forecast {}",
            actual.len(),
            forecast.len()
        )));
    }
    Ok(())
}

/// Mean absolute error.
pub fn mae(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    Ok(actual.iter().zip(forecast).map(|(a, f)| (a - f).abs()).sum::<f64>() / actual.len() as f64)
}

/// Mean squared error.
pub fn mse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    Ok(actual.iter().zip(forecast).map(|(a, f)| (a - f).powi(2)).sum::<f64>() / actual.len() as f64)
}

/// Root mean squared error.
pub fn rmse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    Ok(mse(actual, forecast)?.sqrt())
}

/// Mean absolute percentage error, as a fraction (not multiplied by 100).
/// Points where `actual` is zero are skipped.
pub fn mape(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let mut sum = 0.0;
    let mut count = 0usize;
    for (a, f) in actual.iter().zip(forecast) {
        if a.abs() > 1e-12 {
            sum += ((a - f) / a).abs();
            count += 1;
        }
    }
    if count == 0 {
        return Err(ForecastError::NumericalFailure(
            "mape: all actual values are zero".to_string(),
        ));
    }
    Ok(sum / count as f64)
}

/// Symmetric MAPE, as a fraction.
pub fn smape(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let mut sum = 0.0;
    let mut count = 0usize;
    for (a, f) in actual.iter().zip(forecast) {
        let denom = a.abs() + f.abs();
        if denom > 1e-12 {
            sum += 2.0 * (a - f).abs() / denom;
            count += 1;
        }
    }
    if count == 0 {
        return Err(ForecastError::NumericalFailure(
            "smape: all denominators are zero".to_string(),
        ));
    }
    Ok(sum / count as f64)
}

/// Mean absolute scaled error, scaled by the in-sample naive (lag-1) MAE
/// of `baseline`.
pub fn mase(actual: &[f64], forecast: &[f64], baseline: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    if baseline.len() < 2 {
        return Err(ForecastError::InsufficientData { needed: 2, got: baseline.len() });
    }
    let scale: f64 = baseline.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (baseline.len() - 1) as f64;
    if scale.abs() < 1e-12 {
        return Err(ForecastError::NumericalFailure(
            "mase: baseline has zero naive error".to_string(),
        ));
    }
    let mae_val = mae(actual, forecast)?;
    Ok(mae_val / scale)
}

/// Coefficient of determination.
pub fn r2(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual.iter().zip(forecast).map(|(a, f)| (a - f).powi(2)).sum();
    if ss_tot.abs() < 1e-12 {
        return Err(ForecastError::NumericalFailure(
            "r2: actual series has zero variance".to_string(),
        ));
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Mean signed error (forecast minus actual).
pub fn bias(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    Ok(forecast.iter().zip(actual).map(|(f, a)| f - a).sum::<f64>() / actual.len() as f64)
}

/// Relative MAE: `mae(actual, pred1) / mae(actual, pred2)`. Values below 1
/// favor `pred1`.
pub fn rmae(actual: &[f64], pred1: &[f64], pred2: &[f64]) -> Result<f64> {
    let mae1 = mae(actual, pred1)?;
    let mae2 = mae(actual, pred2)?;
    if mae2.abs() < 1e-12 {
        return Err(ForecastError::NumericalFailure(
            "rmae: second forecast has zero error".to_string(),
        ));
    }
    Ok(mae1 / mae2)
}

/// Pinball/quantile loss at a single quantile level.
pub fn quantile_loss(actual: &[f64], forecast: &[f64], quantile: f64) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    if !(0.0..=1.0).contains(&quantile) {
        return Err(ForecastError::InvalidConfiguration(
            "quantile_loss: quantile must be in [0, 1]".to_string(),
        ));
    }
    let sum: f64 = actual
        .iter()
        .zip(forecast)
        .map(|(a, f)| {
            let diff = a - f;
            if diff >= 0.0 {
                quantile * diff
            } else {
                (quantile - 1.0) * diff
            }
        })
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Mean quantile loss averaged over several forecast vectors/quantile levels.
pub fn mqloss(actual: &[f64], forecasts: &[Vec<f64>], quantiles: &[f64]) -> Result<f64> {
    if forecasts.len() != quantiles.len() || forecasts.is_empty() {
        return Err(ForecastError::InvalidConfiguration(
            "mqloss: forecasts/quantiles length mismatch".to_string(),
        ));
    }
    let mut total = 0.0;
    for (f, &q) in forecasts.iter().zip(quantiles) {
        total += quantile_loss(actual, f, q)?;
    }
    Ok(total / forecasts.len() as f64)
}

/// Fraction of points for which `lower <= actual <= upper`.
pub fn coverage(actual: &[f64], lower: &[f64], upper: &[f64]) -> Result<f64> {
    validate_inputs(actual, lower)?;
    validate_inputs(actual, upper)?;
    let hits = actual
        .iter()
        .zip(lower)
        .zip(upper)
        .filter(|((a, l), u)| **l <= **a && **a <= **u)
        .count();
    Ok(hits as f64 / actual.len() as f64)
}
