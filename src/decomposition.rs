//! Decomposition primitives: LOESS-smoothed STL, piecewise-linear trend,
//! Fourier seasonal bases, and the Box-Cox transform.

use crate::error::{ForecastError, Result};
use crate::numerics;

/// Trend-extraction method used by MFLES rounds and MSTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendMethod {
    /// OLS line through the whole window.
    Linear,
    /// Siegel repeated-medians line (robust to outliers).
    Robust,
    /// LOESS-smoothed local trend.
    Loess,
}

/// Result of one STL-style decomposition pass over a single period.
#[derive(Debug, Clone)]
pub struct StlResult {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub remainder: Vec<f64>,
}

/// LOESS: locally-weighted regression smoothing with a tricube kernel.
///
/// `span` is the fraction of points (0, 1] included in each local window.
/// `robust_iters` rounds of bisquare reweighting are run after the first
/// pass to downweight outliers, per the classic STL robustness step.
pub fn loess(x: &[f64], y: &[f64], span: f64, robust_iters: usize) -> Result<Vec<f64>> {
    let n = x.len();
    if n != y.len() || n < 2 {
        return Err(ForecastError::InsufficientData { needed: 2, got: n });
    }
    let window = ((span.clamp(0.01, 1.0) * n as f64).ceil() as usize).clamp(2, n);

    let mut robustness = vec![1.0; n];
    let mut fitted = vec![0.0; n];

    for _ in 0..=robust_iters {
        for i in 0..n {
            fitted[i] = loess_point(x, y, &robustness, x[i], window)?;
        }
        if robust_iters == 0 {
            break;
        }
        let mut residuals: Vec<f64> = y.iter().zip(fitted.iter()).map(|(a, b)| (a - b).abs()).collect();
        let mad = 6.0 * numerics::median(&mut residuals.clone());
        if mad.abs() < 1e-12 {
            continue;
        }
        for i in 0..n {
            let u = (residuals[i] / mad).min(1.0);
            robustness[i] = (1.0 - u * u).powi(2);
        }
    }
    Ok(fitted)
}

fn loess_point(x: &[f64], y: &[f64], robustness: &[f64], x0: f64, window: usize) -> Result<f64> {
    let n = x.len();
    let mut dists: Vec<(f64, usize)> = (0..n).map(|i| ((x[i] - x0).abs(), i)).collect();
    dists.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let h = dists[window.saturating_sub(1).min(n - 1)].0.max(1e-9);

    let mut sw = 0.0;
    let mut swx = 0.0;
    let mut swy = 0.0;
    let mut swxx = 0.0;
    let mut swxy = 0.0;
    for &(d, i) in dists.iter().take(window) {
        let u = (d / h).min(1.0);
        let tricube = (1.0 - u.powi(3)).max(0.0).powi(3);
        let w = tricube * robustness[i];
        sw += w;
        swx += w * x[i];
        swy += w * y[i];
        swxx += w * x[i] * x[i];
        swxy += w * x[i] * y[i];
    }
    if sw < 1e-12 {
        return Ok(y[dists[0].1]);
    }
    let denom = sw * swxx - swx * swx;
    if denom.abs() < 1e-9 {
        return Ok(swy / sw);
    }
    let slope = (sw * swxy - swx * swy) / denom;
    let intercept = (swy - slope * swx) / sw;
    Ok(intercept + slope * x0)
}

/// One seasonal period's STL decomposition: trend via LOESS, seasonal via
/// cycle-subseries averaging of the detrended series, remainder as the rest.
pub fn stl_decompose(values: &[f64], period: usize, trend_span: f64) -> Result<StlResult> {
    let n = values.len();
    if period == 0 || n < 2 * period {
        return Err(ForecastError::InsufficientData {
            needed: 2 * period.max(1),
            got: n,
        });
    }
    let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let trend = loess(&x, values, trend_span, 1)?;
    let detrended: Vec<f64> = values.iter().zip(trend.iter()).map(|(v, t)| v - t).collect();

    let mut cycle_means = vec![0.0; period];
    let mut cycle_counts = vec![0usize; period];
    for (i, &d) in detrended.iter().enumerate() {
        cycle_means[i % period] += d;
        cycle_counts[i % period] += 1;
    }
    for i in 0..period {
        if cycle_counts[i] > 0 {
            cycle_means[i] /= cycle_counts[i] as f64;
        }
    }
    let overall_mean = cycle_means.iter().sum::<f64>() / period as f64;
    for m in cycle_means.iter_mut() {
        *m -= overall_mean;
    }
    let seasonal: Vec<f64> = (0..n).map(|i| cycle_means[i % period]).collect();
    let remainder: Vec<f64> = values
        .iter()
        .zip(trend.iter())
        .zip(seasonal.iter())
        .map(|((v, t), s)| v - t - s)
        .collect();

    Ok(StlResult { trend, seasonal, remainder })
}

/// Multi-period STL: iteratively extract one seasonal component per period,
/// longest period first, subtracting each from the working residual before
/// moving to the next.
pub fn mstl_decompose(values: &[f64], periods: &[usize], trend_span: f64) -> Result<(Vec<f64>, Vec<Vec<f64>>, Vec<f64>)> {
    if periods.is_empty() {
        return Err(ForecastError::InvalidConfiguration(
            "mstl_decompose: at least one period required".to_string(),
        ));
    }
    let mut sorted_periods = periods.to_vec();
    sorted_periods.sort_unstable_by(|a, b| b.cmp(a));

    let mut working = values.to_vec();
    let mut seasonals = Vec::with_capacity(sorted_periods.len());
    let mut last_trend = vec![0.0; values.len()];

    for &p in &sorted_periods {
        let result = stl_decompose(&working, p, trend_span)?;
        for i in 0..working.len() {
            working[i] -= result.seasonal[i];
        }
        last_trend = result.trend;
        seasonals.push(result.seasonal);
    }
    let remainder: Vec<f64> = values
        .iter()
        .zip(last_trend.iter())
        .enumerate()
        .map(|(i, (v, t))| {
            let seasonal_sum: f64 = seasonals.iter().map(|s| s[i]).sum();
            v - t - seasonal_sum
        })
        .collect();

    // restore input period order
    let mut ordered = Vec::with_capacity(periods.len());
    for &p in periods {
        let idx = sorted_periods.iter().position(|&sp| sp == p).unwrap();
        ordered.push(seasonals[idx].clone());
    }
    Ok((last_trend, ordered, remainder))
}

/// Fit a piecewise-linear trend with one breakpoint at `n/2`: two OLS lines
/// joined at the midpoint, continuous at the join.
pub fn piecewise_linear_trend(values: &[f64]) -> Result<Vec<f64>> {
    let n = values.len();
    if n < 4 {
        return Err(ForecastError::InsufficientData { needed: 4, got: n });
    }
    let mid = n / 2;
    let x1: Vec<f64> = (0..mid).map(|i| i as f64).collect();
    let x2: Vec<f64> = (mid..n).map(|i| i as f64).collect();
    let design1: Vec<Vec<f64>> = x1.iter().map(|&xi| vec![1.0, xi]).collect();
    let design2: Vec<Vec<f64>> = x2.iter().map(|&xi| vec![1.0, xi]).collect();
    let beta1 = numerics::ols(&design1, &values[..mid])?.beta;
    let beta2 = numerics::ols(&design2, &values[mid..])?.beta;

    let mut trend = Vec::with_capacity(n);
    for i in 0..mid {
        trend.push(beta1[0] + beta1[1] * i as f64);
    }
    // shift the second segment so it is continuous with the first at `mid`
    let join_left = beta1[0] + beta1[1] * mid as f64;
    let join_right = beta2[0] + beta2[1] * mid as f64;
    let shift = join_left - join_right;
    for i in mid..n {
        trend.push(beta2[0] + beta2[1] * i as f64 + shift);
    }
    Ok(trend)
}

/// Build a Fourier design matrix with `order` sin/cos pairs per entry in
/// `periods`, evaluated at integer positions `0..n`. Produces `2 * sum(order)`
/// columns (no intercept column; callers add their own).
pub fn fourier_basis(n: usize, periods: &[(usize, usize)]) -> Vec<Vec<f64>> {
    (0..n).map(|t| fourier_row(t, periods)).collect()
}

/// A single row of the Fourier design matrix at integer position `t`. Valid
/// for any `t`, including positions past the fitted range, since the
/// terms are periodic closed-form functions of `t`.
pub fn fourier_row(t: usize, periods: &[(usize, usize)]) -> Vec<f64> {
    let mut row = Vec::with_capacity(periods.iter().map(|&(_, o)| 2 * o).sum());
    for &(period, order) in periods {
        if period == 0 {
            continue;
        }
        for k in 1..=order {
            let freq = 2.0 * std::f64::consts::PI * k as f64 / period as f64;
            let angle = freq * t as f64;
            row.push(angle.sin());
            row.push(angle.cos());
        }
    }
    row
}

/// Box-Cox transform: `(y^lambda - 1) / lambda` for `lambda != 0`, `ln(y)`
/// otherwise. Requires strictly positive inputs.
pub fn box_cox(values: &[f64], lambda: f64) -> Result<Vec<f64>> {
    if values.iter().any(|&v| v <= 0.0) {
        return Err(ForecastError::InvalidConfiguration(
            "box_cox requires strictly positive values".to_string(),
        ));
    }
    Ok(values
        .iter()
        .map(|&v| {
            if lambda.abs() < 1e-8 {
                v.ln()
            } else {
                (v.powf(lambda) - 1.0) / lambda
            }
        })
        .collect())
}

/// Inverse Box-Cox transform.
pub fn inverse_box_cox(values: &[f64], lambda: f64) -> Vec<f64> {
    values
        .iter()
        .map(|&v| {
            if lambda.abs() < 1e-8 {
                v.exp()
            } else {
                let inner = lambda * v + 1.0;
                if inner <= 0.0 {
                    f64::NAN
                } else {
                    inner.powf(1.0 / lambda)
                }
            }
        })
        .collect()
}

/// Guerrero-style grid search for a Box-Cox lambda in `[-1, 2]` that
/// minimizes the coefficient of variation across seasonal-period blocks.
pub fn estimate_box_cox_lambda(values: &[f64], period: usize) -> f64 {
    if values.iter().any(|&v| v <= 0.0) {
        return 1.0;
    }
    let period = period.max(2).min(values.len().max(2));
    let blocks: Vec<&[f64]> = values.chunks(period).filter(|b| b.len() == period).collect();
    if blocks.len() < 2 {
        return 1.0;
    }
    let mut best_lambda = 1.0;
    let mut best_cv = f64::INFINITY;
    let mut lambda = -1.0;
    while lambda <= 2.0001 {
        let transformed: Vec<f64> = match box_cox(values, lambda) {
            Ok(t) => t,
            Err(_) => return 1.0,
        };
        let tblocks: Vec<&[f64]> = transformed.chunks(period).filter(|b| b.len() == period).collect();
        let means: Vec<f64> = tblocks.iter().map(|b| b.iter().sum::<f64>() / period as f64).collect();
        let stds: Vec<f64> = tblocks
            .iter()
            .zip(means.iter())
            .map(|(b, m)| {
                let var = b.iter().map(|v| (v - m).powi(2)).sum::<f64>() / period as f64;
                var.sqrt()
            })
            .collect();
        let ratios: Vec<f64> = stds
            .iter()
            .zip(means.iter())
            .filter(|(_, m)| m.abs() > 1e-9)
            .map(|(s, m)| s / m)
            .collect();
        if !ratios.is_empty() {
            let mean_ratio = ratios.iter().sum::<f64>() / ratios.len() as f64;
            let cv = ratios.iter().map(|r| (r - mean_ratio).powi(2)).sum::<f64>();
            if cv < best_cv {
                best_cv = cv;
                best_lambda = lambda;
            }
        }
        lambda += 0.1;
    }
    best_lambda
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn loess_smooths_noisy_line() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &xi)| 2.0 * xi + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let smoothed = loess(&x, &y, 0.3, 0).unwrap();
        assert_relative_eq!(smoothed[25], 50.0, epsilon = 5.0);
    }

    #[test]
    fn stl_recovers_known_seasonal_pattern() {
        let period = 4;
        let pattern = [10.0, -10.0, 5.0, -5.0];
        let n = 40;
        let values: Vec<f64> = (0..n)
            .map(|i| 100.0 + 0.5 * i as f64 + pattern[i % period])
            .collect();
        let result = stl_decompose(&values, period, 0.5).unwrap();
        for i in 0..period {
            assert_relative_eq!(result.seasonal[i], pattern[i], epsilon = 2.0);
        }
    }

    #[test]
    fn stl_rejects_too_short_series() {
        assert!(stl_decompose(&[1.0, 2.0, 3.0], 4, 0.5).is_err());
    }

    #[test]
    fn mstl_handles_multiple_periods_in_any_order() {
        let n = 96;
        let values: Vec<f64> = (0..n)
            .map(|i| 50.0 + 3.0 * (i % 12) as f64 + 1.0 * (i % 4) as f64)
            .collect();
        let (trend, seasonals, remainder) = mstl_decompose(&values, &[4, 12], 0.5).unwrap();
        assert_eq!(seasonals.len(), 2);
        assert_eq!(trend.len(), n);
        assert_eq!(remainder.len(), n);
    }

    #[test]
    fn piecewise_linear_trend_is_continuous_at_joint() {
        let values: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let trend = piecewise_linear_trend(&values).unwrap();
        let mid = 10;
        assert_relative_eq!(trend[mid - 1] + (trend[mid] - trend[mid - 1]), trend[mid], epsilon = 1e-6);
    }

    #[test]
    fn fourier_basis_has_expected_column_count() {
        let basis = fourier_basis(10, &[(12, 2), (4, 1)]);
        assert_eq!(basis[0].len(), 2 * (2 + 1));
        assert_eq!(basis.len(), 10);
    }

    #[test]
    fn box_cox_roundtrips() {
        let values = vec![1.0, 2.0, 5.0, 10.0];
        for lambda in [-0.5, 0.0, 0.5, 1.0] {
            let transformed = box_cox(&values, lambda).unwrap();
            let back = inverse_box_cox(&transformed, lambda);
            for (a, b) in values.iter().zip(back.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn box_cox_rejects_non_positive_values() {
        assert!(box_cox(&[1.0, 0.0, 2.0], 0.5).is_err());
    }
}
