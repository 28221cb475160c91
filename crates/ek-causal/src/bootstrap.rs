//! Percentile bootstrap interval helpers.
//!
//! The estimators in this crate return point estimates; interval
//! estimation for the simulation-based contrasts is a caller-driven
//! serial loop (refit, resimulate, collect). These helpers reduce the
//! collected replicates to a percentile interval.

use ek_core::{Error, Result};

/// Quantile via sorting + linear interpolation.
///
/// - `q = 0` returns the minimum, `q = 1` the maximum;
/// - an empty input returns `NaN`.
pub fn quantile_linear(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted.len() == 1 {
        return sorted[0];
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let i = pos.floor() as usize;
    let j = pos.ceil() as usize;
    if i == j {
        return sorted[i];
    }
    let t = pos - i as f64;
    (1.0 - t) * sorted[i] + t * sorted[j]
}

/// Percentile interval from bootstrap replicates.
///
/// # Errors
/// Requires at least 2 replicates, all finite, and `conf_level` in `(0,1)`.
pub fn percentile_interval(replicates: &[f64], conf_level: f64) -> Result<(f64, f64)> {
    if replicates.len() < 2 {
        return Err(Error::Validation(
            "percentile_interval requires at least 2 replicates".to_string(),
        ));
    }
    if replicates.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation("replicates must be finite".to_string()));
    }
    if !(conf_level.is_finite() && conf_level > 0.0 && conf_level < 1.0) {
        return Err(Error::Validation(format!("conf_level must be in (0,1), got {conf_level}")));
    }
    let alpha = (1.0 - conf_level) / 2.0;
    let lo = quantile_linear(replicates, alpha);
    let hi = quantile_linear(replicates, 1.0 - alpha);
    Ok((lo.min(hi), lo.max(hi)))
}
