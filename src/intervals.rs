//! Shared prediction-interval helpers.

use statrs::distribution::{ContinuousCDF, Normal};

/// Two-sided normal z-score for a confidence level, e.g. `0.95 -> 1.96`.
/// Falls back to the standard-normal inverse CDF for levels not in the
/// common lookup table.
pub fn z_score(confidence_level: f64) -> f64 {
    match (confidence_level * 100.0).round() as i64 {
        99 => 2.576,
        95 => 1.96,
        90 => 1.645,
        80 => 1.28,
        _ => {
            let tail = (1.0 - confidence_level) / 2.0;
            let normal = Normal::new(0.0, 1.0).expect("standard normal is always valid");
            normal.inverse_cdf(1.0 - tail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lookup_table_matches_known_values() {
        assert_relative_eq!(z_score(0.95), 1.96, epsilon = 1e-9);
        assert_relative_eq!(z_score(0.99), 2.576, epsilon = 1e-9);
    }

    #[test]
    fn falls_back_to_inverse_cdf_for_uncommon_levels() {
        let z = z_score(0.5);
        assert_relative_eq!(z, 0.674, epsilon = 0.01);
    }
}
