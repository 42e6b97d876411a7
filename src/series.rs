//! The `Series`/`Forecast`/`ModelComponents` data model (spec §3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// A finite, ordered sequence of observations.
///
/// Timestamps, when present, must be strictly increasing Unix seconds.
/// Values are IEEE-754 doubles; `NaN` is forbidden inside the fitted
/// range (run an imputation pre-step first if your data has gaps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    values: Vec<f64>,
    timestamps: Option<Vec<i64>>,
    frequency: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl Series {
    /// Build a series from values alone. Requires `n >= 2` and no `NaN`.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        Self::validate_values(&values)?;
        Ok(Self {
            values,
            timestamps: None,
            frequency: None,
            metadata: BTreeMap::new(),
        })
    }

    /// Build a series with timestamps. Timestamps must be strictly increasing
    /// and the same length as `values`.
    pub fn with_timestamps(values: Vec<f64>, timestamps: Vec<i64>) -> Result<Self> {
        Self::validate_values(&values)?;
        if timestamps.len() != values.len() {
            return Err(ForecastError::InvalidConfiguration(format!(
                "timestamps length {} does not match values length {}",
                timestamps.len(),
                values.len()
            )));
        }
        if !timestamps.windows(2).all(|w| w[1] > w[0]) {
            return Err(ForecastError::InvalidConfiguration(
                "timestamps must be strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            values,
            timestamps: Some(timestamps),
            frequency: None,
            metadata: BTreeMap::new(),
        })
    }

    fn validate_values(values: &[f64]) -> Result<()> {
        if values.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidConfiguration(
                "series contains NaN or infinite values; impute before fitting".to_string(),
            ));
        }
        Ok(())
    }

    /// Attach a human-readable frequency label (e.g. `"monthly"`).
    pub fn with_frequency(mut self, frequency: impl Into<String>) -> Self {
        self.frequency = Some(frequency.into());
        self
    }

    /// Attach a metadata key/value pair.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no observations (never true for a validly
    /// constructed `Series`, kept for clippy's `len_without_is_empty`).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw observation values, in order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Unix-second timestamps, if attached.
    pub fn timestamps(&self) -> Option<&[i64]> {
        self.timestamps.as_deref()
    }

    /// The frequency label, if attached.
    pub fn frequency(&self) -> Option<&str> {
        self.frequency.as_deref()
    }

    /// Metadata attached to the series.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Checks `n >= 2*s` for a seasonal model with period `s`.
    pub fn validate_seasonal_period(&self, s: usize) -> Result<()> {
        if s == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "seasonal period must be positive".to_string(),
            ));
        }
        if self.len() < 2 * s {
            return Err(ForecastError::InsufficientData {
                needed: 2 * s,
                got: self.len(),
            });
        }
        Ok(())
    }

    /// A contiguous slice `[start, end)` of the series, preserving order.
    pub fn slice(&self, start: usize, end: usize) -> Series {
        Series {
            values: self.values[start..end].to_vec(),
            timestamps: self
                .timestamps
                .as_ref()
                .map(|t| t[start..end].to_vec()),
            frequency: self.frequency.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// The result of `predict(h)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    /// Forecast horizon.
    pub horizon: usize,
    /// Point forecasts, length `horizon`.
    pub point: Vec<f64>,
    /// Lower prediction band, same length as `point`, if produced.
    pub lower: Option<Vec<f64>>,
    /// Upper prediction band, same length as `point`, if produced.
    pub upper: Option<Vec<f64>>,
    /// The nominal confidence level the bands were produced at.
    pub confidence_level: Option<f64>,
    /// In-sample fitted values, length `n`, if requested/available.
    pub fitted: Option<Vec<f64>>,
    /// Set when the model does not support intervals and the bands
    /// returned (if any) simply equal the point forecast.
    pub intervals_unsupported: bool,
}

impl Forecast {
    /// A point-only forecast with no intervals.
    pub fn point_only(point: Vec<f64>) -> Self {
        let horizon = point.len();
        Self {
            horizon,
            point,
            lower: None,
            upper: None,
            confidence_level: None,
            fitted: None,
            intervals_unsupported: false,
        }
    }

    /// A forecast with symmetric prediction bands at `confidence_level`.
    pub fn with_bands(point: Vec<f64>, lower: Vec<f64>, upper: Vec<f64>, confidence_level: f64) -> Self {
        let horizon = point.len();
        debug_assert_eq!(lower.len(), horizon);
        debug_assert_eq!(upper.len(), horizon);
        debug_assert!(lower
            .iter()
            .zip(point.iter())
            .zip(upper.iter())
            .all(|((l, p), u)| l <= p && p <= u));
        Self {
            horizon,
            point,
            lower: Some(lower),
            upper: Some(upper),
            confidence_level: Some(confidence_level),
            fitted: None,
            intervals_unsupported: false,
        }
    }

    /// Attach in-sample fitted values.
    pub fn with_fitted(mut self, fitted: Vec<f64>) -> Self {
        self.fitted = Some(fitted);
        self
    }

    /// Mark that intervals were requested but this model cannot produce
    /// them; `lower`/`upper` are set equal to `point`.
    pub fn unsupported_intervals(mut self) -> Self {
        self.lower = Some(self.point.clone());
        self.upper = Some(self.point.clone());
        self.intervals_unsupported = true;
        self
    }
}

/// Per-model structured view of fitted state, exposed for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelComponents {
    /// ETS(Error, Trend, Season) state-space fit.
    Ets {
        notation: String,
        damped: bool,
        alpha: f64,
        beta: Option<f64>,
        gamma: Option<f64>,
        phi: Option<f64>,
    },
    /// ARIMA(p,d,q)(P,D,Q)[s] fit.
    Arima {
        p: usize,
        d: usize,
        q: usize,
        seasonal_p: usize,
        seasonal_d: usize,
        seasonal_q: usize,
        s: usize,
        drift: Option<f64>,
        ar_coefficients: Vec<f64>,
        ma_coefficients: Vec<f64>,
    },
    /// TBATS fit.
    Tbats {
        box_cox_lambda: Option<f64>,
        damping_phi: Option<f64>,
        fourier_orders: Vec<(usize, usize)>,
    },
    /// MFLES per-round trend/seasonal summary.
    Mfles { rounds: usize, seasonal_periods: Vec<usize> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_series() {
        let err = Series::new(vec![1.0]).unwrap_err();
        assert_eq!(err, ForecastError::InsufficientData { needed: 2, got: 1 });
    }

    #[test]
    fn rejects_nan() {
        let err = Series::new(vec![1.0, f64::NAN, 3.0]).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_non_increasing_timestamps() {
        let err = Series::with_timestamps(vec![1.0, 2.0, 3.0], vec![0, 10, 5]).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidConfiguration(_)));
    }

    #[test]
    fn slice_preserves_order() {
        let s = Series::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let sub = s.slice(1, 4);
        assert_eq!(sub.values(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn forecast_band_invariant_holds_by_construction() {
        let f = Forecast::with_bands(vec![1.0, 2.0], vec![0.5, 1.5], vec![1.5, 2.5], 0.95);
        for ((l, p), u) in f
            .lower
            .as_ref()
            .unwrap()
            .iter()
            .zip(f.point.iter())
            .zip(f.upper.as_ref().unwrap().iter())
        {
            assert!(l <= p && p <= u);
        }
    }
}
