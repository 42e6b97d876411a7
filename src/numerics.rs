//! Hand-rolled numerical kernels: linear regression, robust regression,
//! order statistics, a bounded derivative-free optimiser, and an FFT.
//!
//! Nothing here delegates to an external linear-algebra crate; everything
//! downstream (decomposition, ETS, ARIMA, TBATS, MFLES) is built on these
//! primitives.

use crate::error::{ForecastError, Result};

/// Outcome of an ordinary (or weighted) least-squares fit: coefficients,
/// sum of squared residuals, and Akaike information criterion.
///
/// `beta` is NaN-filled (and `ssr`/`aic` accordingly NaN) when the normal
/// equations are singular to within `1e-12` — a rank-deficient design is
/// treated as "this candidate failed," not as a hard error. Callers skip
/// a NaN fit rather than propagate it.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub beta: Vec<f64>,
    pub ssr: f64,
    pub aic: f64,
}

/// Solve ordinary least squares `X * beta = y` via Gaussian elimination
/// with partial pivoting on the normal equations `X'X beta = X'y`.
///
/// `design` is row-major, `n` rows by `k` columns (including any
/// intercept column the caller wants). A shape mismatch (ragged rows,
/// `n != y.len()`, or `n < k`) is a programming error and fails fast with
/// `Err`; numerical singularity at the solved pivot does not — it yields
/// an `OlsFit` with NaN coefficients instead.
pub fn ols(design: &[Vec<f64>], y: &[f64]) -> Result<OlsFit> {
    let n = design.len();
    if n == 0 || y.len() != n {
        return Err(ForecastError::InvalidConfiguration(
            "ols: design/response length mismatch".to_string(),
        ));
    }
    let k = design[0].len();
    if k == 0 || design.iter().any(|row| row.len() != k) {
        return Err(ForecastError::InvalidConfiguration(
            "ols: ragged or empty design matrix".to_string(),
        ));
    }
    if n < k {
        return Err(ForecastError::InsufficientData { needed: k, got: n });
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for row in 0..n {
        for a in 0..k {
            xty[a] += design[row][a] * y[row];
            for b in 0..k {
                xtx[a][b] += design[row][a] * design[row][b];
            }
        }
    }
    let beta = gaussian_solve(xtx, xty);

    if beta.iter().any(|b| !b.is_finite()) {
        return Ok(OlsFit { beta, ssr: f64::NAN, aic: f64::NAN });
    }

    let ssr: f64 = (0..n)
        .map(|row| {
            let fitted: f64 = design[row].iter().zip(beta.iter()).map(|(x, b)| x * b).sum();
            (y[row] - fitted).powi(2)
        })
        .sum();
    let aic = if ssr > 0.0 {
        n as f64 * (ssr / n as f64).ln() + 2.0 * k as f64
    } else {
        f64::NAN
    };
    Ok(OlsFit { beta, ssr, aic })
}

/// Weighted least squares: each row of `design`/`y` is scaled by `sqrt(weight)`
/// before delegating to [`ols`]. Only the coefficient vector is returned;
/// a NaN-filled vector (from a singular or all-zero-weight system) signals
/// "skip this candidate" the same way [`ols`] does.
pub fn wls(design: &[Vec<f64>], y: &[f64], weights: &[f64]) -> Result<Vec<f64>> {
    if weights.len() != y.len() {
        return Err(ForecastError::InvalidConfiguration(
            "wls: weights/response length mismatch".to_string(),
        ));
    }
    let k = design.first().map(|r| r.len()).unwrap_or(0);
    let mut weighted_design = Vec::with_capacity(design.len());
    let mut weighted_y = Vec::with_capacity(y.len());
    for i in 0..design.len() {
        let w = weights[i].max(0.0).sqrt();
        let mut row = Vec::with_capacity(k);
        for &x in &design[i] {
            row.push(x * w);
        }
        weighted_design.push(row);
        weighted_y.push(y[i] * w);
    }
    Ok(ols(&weighted_design, &weighted_y)?.beta)
}

/// Solve a square linear system `a * x = b` by Gaussian elimination with
/// partial pivoting. `a` is consumed and modified in place. Returns a
/// NaN-filled vector, rather than an `Err`, when a pivot falls below
/// `1e-12` — singularity is a property of the data, not a programming
/// error, so it is reported at the value level.
fn gaussian_solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let k = b.len();
    for col in 0..k {
        let mut pivot_row = col;
        let mut pivot_val = a[col][col].abs();
        for row in (col + 1)..k {
            if a[row][col].abs() > pivot_val {
                pivot_val = a[row][col].abs();
                pivot_row = row;
            }
        }
        if pivot_val < 1e-12 {
            return vec![f64::NAN; k];
        }
        if pivot_row != col {
            a.swap(col, pivot_row);
            b.swap(col, pivot_row);
        }
        let diag = a[col][col];
        for row in (col + 1)..k {
            let factor = a[row][col] / diag;
            if factor == 0.0 {
                continue;
            }
            for c in col..k {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; k];
    for row in (0..k).rev() {
        let mut sum = b[row];
        for c in (row + 1)..k {
            sum -= a[row][c] * x[c];
        }
        let diag = a[row][row];
        if diag.abs() < 1e-12 {
            return vec![f64::NAN; k];
        }
        x[row] = sum / diag;
    }
    x
}

/// Siegel repeated-medians regression: a robust slope/intercept estimator
/// with a ~29% breakdown point. For each point `i`, the median over `j != i`
/// of the pairwise slope `(y_j - y_i) / (x_j - x_i)` is taken, then the
/// overall slope is the median of those per-point medians; the intercept is
/// the median of `y_i - slope * x_i`.
pub fn siegel_repeated_medians(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    let n = x.len();
    if n != y.len() || n < 3 {
        return Err(ForecastError::InsufficientData { needed: 3, got: n });
    }
    let mut per_point_slopes = Vec::with_capacity(n);
    for i in 0..n {
        let mut slopes = Vec::with_capacity(n - 1);
        for j in 0..n {
            if j == i {
                continue;
            }
            let dx = x[j] - x[i];
            if dx.abs() > 1e-12 {
                slopes.push((y[j] - y[i]) / dx);
            }
        }
        if slopes.is_empty() {
            continue;
        }
        per_point_slopes.push(median(&mut slopes));
    }
    if per_point_slopes.is_empty() {
        return Err(ForecastError::NumericalFailure(
            "siegel regression: all x values coincide".to_string(),
        ));
    }
    let slope = median(&mut per_point_slopes);
    let mut intercepts: Vec<f64> = x
        .iter()
        .zip(y.iter())
        .map(|(&xi, &yi)| yi - slope * xi)
        .collect();
    let intercept = median(&mut intercepts);
    Ok((slope, intercept))
}

/// Median of a slice, computed via partial sort (selection, not full sort).
/// Mutates the input order.
pub fn median(values: &mut [f64]) -> f64 {
    quantile(values, 0.5)
}

/// Quantile via linear interpolation between order statistics (the `type 7`
/// convention used by NumPy/R's default `quantile`). `q` in `[0, 1]`.
/// Mutates the input order (partial sort, not full sort).
pub fn quantile(values: &mut [f64], q: f64) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return values[0];
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let lo_val = select_nth(values, lo);
    if lo == hi {
        return lo_val;
    }
    let hi_val = select_nth(values, hi);
    let frac = pos - lo as f64;
    lo_val + (hi_val - lo_val) * frac
}

/// Returns the `n`th order statistic (0-indexed) via `select_nth_unstable_by`.
fn select_nth(values: &mut [f64], n: usize) -> f64 {
    let (_, &mut pivot, _) =
        values.select_nth_unstable_by(n, |a, b| a.partial_cmp(b).unwrap());
    pivot
}

/// Sample autocorrelation at `lag` (biased estimator, denominator `n`).
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if lag >= n || n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let denom: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    let numer: f64 = (0..n - lag)
        .map(|i| (values[i] - mean) * (values[i + lag] - mean))
        .sum();
    numer / denom
}

/// Point to evaluate a downhill objective at, for Nelder-Mead.
type Objective<'a> = dyn Fn(&[f64]) -> f64 + 'a;

/// Bounded Nelder-Mead simplex search. Parameters are clamped into
/// `[lower[i], upper[i]]` after every reflect/expand/contract step.
/// Returns the best parameter vector found within `max_iters`.
pub fn nelder_mead(
    initial: &[f64],
    lower: &[f64],
    upper: &[f64],
    max_iters: usize,
    f: &Objective,
) -> Vec<f64> {
    let k = initial.len();
    let clamp = |mut p: Vec<f64>| -> Vec<f64> {
        for i in 0..k {
            p[i] = p[i].clamp(lower[i], upper[i]);
        }
        p
    };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(k + 1);
    simplex.push(clamp(initial.to_vec()));
    for i in 0..k {
        let mut p = initial.to_vec();
        let step = if p[i].abs() > 1e-6 { p[i] * 0.05 } else { 0.05 };
        p[i] += step;
        simplex.push(clamp(p));
    }
    let mut values: Vec<f64> = simplex.iter().map(|p| f(p)).collect();

    let (alpha, gamma, rho, sigma) = (1.0, 2.0, 0.5, 0.5);

    for _ in 0..max_iters {
        let mut order: Vec<usize> = (0..=k).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let best = values[0];
        let worst = values[k];
        if (worst - best).abs() < 1e-10 {
            break;
        }

        let centroid: Vec<f64> = (0..k)
            .map(|i| simplex[..k].iter().map(|p| p[i]).sum::<f64>() / k as f64)
            .collect();

        let reflected: Vec<f64> = clamp(
            (0..k)
                .map(|i| centroid[i] + alpha * (centroid[i] - simplex[k][i]))
                .collect(),
        );
        let reflected_val = f(&reflected);

        if reflected_val < values[0] {
            let expanded: Vec<f64> = clamp(
                (0..k)
                    .map(|i| centroid[i] + gamma * (reflected[i] - centroid[i]))
                    .collect(),
            );
            let expanded_val = f(&expanded);
            if expanded_val < reflected_val {
                simplex[k] = expanded;
                values[k] = expanded_val;
            } else {
                simplex[k] = reflected;
                values[k] = reflected_val;
            }
        } else if reflected_val < values[k - 1] {
            simplex[k] = reflected;
            values[k] = reflected_val;
        } else {
            let contracted: Vec<f64> = clamp(
                (0..k)
                    .map(|i| centroid[i] + rho * (simplex[k][i] - centroid[i]))
                    .collect(),
            );
            let contracted_val = f(&contracted);
            if contracted_val < values[k] {
                simplex[k] = contracted;
                values[k] = contracted_val;
            } else {
                for i in 1..=k {
                    simplex[i] = clamp(
                        (0..k)
                            .map(|j| simplex[0][j] + sigma * (simplex[i][j] - simplex[0][j]))
                            .collect(),
                    );
                    values[i] = f(&simplex[i]);
                }
            }
        }
    }

    let best_idx = (0..=k)
        .min_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap())
        .unwrap();
    simplex[best_idx].clone()
}

/// Radix-2 Cooley-Tukey FFT. Zero-pads `input` up to the next power of two
/// and returns `(real, imaginary)` parts of length `next_pow2(input.len())`.
pub fn fft(input: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = input.len().max(1).next_power_of_two();
    let mut re: Vec<f64> = input.iter().copied().chain(std::iter::repeat(0.0)).take(n).collect();
    let mut im = vec![0.0; n];
    fft_inplace(&mut re, &mut im);
    (re, im)
}

fn fft_inplace(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    if n <= 1 {
        return;
    }
    // bit-reversal permutation
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }
    let mut len = 2;
    while len <= n {
        let ang = -2.0 * std::f64::consts::PI / len as f64;
        let wr = ang.cos();
        let wi = ang.sin();
        let mut start = 0;
        while start < n {
            let mut cur_r = 1.0;
            let mut cur_i = 0.0;
            for k in 0..len / 2 {
                let a = start + k;
                let b = start + k + len / 2;
                let ur = re[a];
                let ui = im[a];
                let vr = re[b] * cur_r - im[b] * cur_i;
                let vi = re[b] * cur_i + im[b] * cur_r;
                re[a] = ur + vr;
                im[a] = ui + vi;
                re[b] = ur - vr;
                im[b] = ui - vi;
                let next_r = cur_r * wr - cur_i * wi;
                let next_i = cur_r * wi + cur_i * wr;
                cur_r = next_r;
                cur_i = next_i;
            }
            start += len;
        }
        len <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ols_recovers_exact_line() {
        let design: Vec<Vec<f64>> = (0..10).map(|i| vec![1.0, i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| 2.0 + 3.0 * i as f64).collect();
        let fit = ols(&design, &y).unwrap();
        assert_relative_eq!(fit.beta[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(fit.beta[1], 3.0, epsilon = 1e-8);
        assert!(fit.ssr.abs() < 1e-8);
    }

    #[test]
    fn ols_rejects_underdetermined_system() {
        let design = vec![vec![1.0, 1.0]];
        let y = vec![1.0];
        assert!(ols(&design, &y).is_err());
    }

    #[test]
    fn ols_nan_fills_on_singular_design() {
        // two identical columns: X'X is singular
        let design: Vec<Vec<f64>> = (0..6).map(|i| vec![1.0, i as f64, i as f64]).collect();
        let y: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let fit = ols(&design, &y).unwrap();
        assert!(fit.beta.iter().all(|b| b.is_nan()));
        assert!(fit.ssr.is_nan());
        assert!(fit.aic.is_nan());
    }

    #[test]
    fn wls_zero_weights_nan_fill_instead_of_erroring() {
        let design: Vec<Vec<f64>> = (0..6).map(|i| vec![1.0, i as f64]).collect();
        let y: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let weights = vec![0.0; 6];
        let beta = wls(&design, &y, &weights).unwrap();
        assert!(beta.iter().all(|b| b.is_nan()));
    }

    #[test]
    fn siegel_resists_outliers() {
        let x: Vec<f64> = (0..21).map(|i| i as f64).collect();
        let mut y: Vec<f64> = x.iter().map(|&xi| 1.0 + 2.0 * xi).collect();
        // corrupt ~20% of points with large outliers
        for i in (0..21).step_by(5) {
            y[i] += 500.0;
        }
        let (slope, intercept) = siegel_repeated_medians(&x, &y).unwrap();
        assert_relative_eq!(slope, 2.0, epsilon = 0.5);
        assert_relative_eq!(intercept, 1.0, epsilon = 5.0);
    }

    #[test]
    fn median_matches_known_value() {
        let mut v = vec![5.0, 3.0, 1.0, 4.0, 2.0];
        assert_relative_eq!(median(&mut v), 3.0);
        let mut v2 = vec![1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(median(&mut v2), 2.5);
    }

    #[test]
    fn quantile_endpoints_are_min_max() {
        let mut v = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        assert_relative_eq!(quantile(&mut v.clone(), 0.0), 1.0);
        assert_relative_eq!(quantile(&mut v, 1.0), 5.0);
    }

    #[test]
    fn autocorrelation_of_constant_series_is_zero() {
        let v = vec![5.0; 10];
        assert_eq!(autocorrelation(&v, 1), 0.0);
    }

    #[test]
    fn autocorrelation_of_alternating_series_is_negative() {
        let v: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(autocorrelation(&v, 1) < -0.9);
    }

    #[test]
    fn nelder_mead_finds_quadratic_minimum() {
        let f = |p: &[f64]| (p[0] - 3.0).powi(2) + (p[1] + 1.0).powi(2);
        let best = nelder_mead(&[0.0, 0.0], &[-10.0, -10.0], &[10.0, 10.0], 500, &f);
        assert_relative_eq!(best[0], 3.0, epsilon = 0.05);
        assert_relative_eq!(best[1], -1.0, epsilon = 0.05);
    }

    #[test]
    fn nelder_mead_respects_bounds() {
        let f = |p: &[f64]| (p[0] - 100.0).powi(2);
        let best = nelder_mead(&[0.0], &[0.0], &[1.0], 200, &f);
        assert!(best[0] <= 1.0 + 1e-9);
    }

    #[test]
    fn fft_of_single_tone_has_energy_at_bin() {
        let n = 64;
        let freq_bin = 4;
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq_bin as f64 * i as f64 / n as f64).sin())
            .collect();
        let (re, im) = fft(&signal);
        let power: Vec<f64> = re.iter().zip(im.iter()).map(|(r, i)| r * r + i * i).collect();
        let peak = (0..n / 2)
            .max_by(|&a, &b| power[a].partial_cmp(&power[b]).unwrap())
            .unwrap();
        assert_eq!(peak, freq_bin);
    }

    #[test]
    fn fft_zero_pads_to_power_of_two() {
        let signal = vec![1.0; 5];
        let (re, _) = fft(&signal);
        assert_eq!(re.len(), 8);
    }
}
