//! Error taxonomy for the forecasting engine.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Failure modes a `Forecaster`, Auto-selector, or CV loop can raise.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Mutually inconsistent or out-of-range configuration, surfaced at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Series shorter than the model's minimum, surfaced from `fit`.
    #[error("insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Singular system or non-finite intermediate affecting the whole fit.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    /// Cooperative cancellation triggered at a checkpoint.
    #[error("operation cancelled")]
    Cancelled,

    /// Requested capability not exposed by this model.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ForecastError {
    /// True for errors that should abort a whole-search caller (Auto-*, CV)
    /// rather than merely being attributed to one candidate/fold.
    pub fn is_fatal_to_search(&self) -> bool {
        matches!(self, ForecastError::Cancelled)
    }
}
