//! Small numerically-stable math utilities used across the estimators.

use ek_core::{Error, Result};

/// Stable inverse-logit: `1 / (1 + exp(-x))`.
///
/// Branchless core: single `exp(-|x|)`, then a sign flip. Never overflows
/// for any finite `x`.
#[inline]
pub fn expit(x: f64) -> f64 {
    let e = (-x.abs()).exp();
    let recip = 1.0 / (1.0 + e);
    // x >= 0: expit = 1/(1+exp(-x)) = recip
    // x <  0: expit = exp(x)/(1+exp(x)) = e/(1+e) = e*recip
    if x >= 0.0 { recip } else { e * recip }
}

/// Log-odds of a probability.
///
/// # Errors
/// Rejects probabilities outside the open interval `(0, 1)`, where the
/// log-odds is undefined.
#[inline]
pub fn logit(p: f64) -> Result<f64> {
    if !p.is_finite() || p <= 0.0 || p >= 1.0 {
        return Err(Error::Validation(format!("logit requires p in (0,1), got {p}")));
    }
    Ok((p / (1.0 - p)).ln())
}

/// Convert a probability to odds.
///
/// # Errors
/// Rejects probabilities outside `[0, 1)` (odds diverge at `p = 1`).
#[inline]
pub fn probability_to_odds(p: f64) -> Result<f64> {
    if !p.is_finite() || !(0.0..1.0).contains(&p) {
        return Err(Error::Validation(format!("odds require p in [0,1), got {p}")));
    }
    Ok(p / (1.0 - p))
}

/// Convert odds to a probability.
///
/// # Errors
/// Rejects negative or non-finite odds.
#[inline]
pub fn odds_to_probability(odds: f64) -> Result<f64> {
    if !odds.is_finite() || odds < 0.0 {
        return Err(Error::Validation(format!("odds must be finite and >= 0, got {odds}")));
    }
    Ok(odds / (1.0 + odds))
}

/// Clamp a predicted probability into `[lower, upper]`.
///
/// Used to bound propensity scores before they enter weight denominators;
/// near-zero predictions otherwise produce unbounded weights and break the
/// targeting step.
///
/// # Errors
/// Rejects bounds outside `(0, 1)` or with `lower >= upper`.
#[inline]
pub fn bound_probability(p: f64, lower: f64, upper: f64) -> Result<f64> {
    if !(lower.is_finite() && upper.is_finite() && 0.0 < lower && upper < 1.0 && lower < upper) {
        return Err(Error::Validation(format!(
            "probability bounds must satisfy 0 < lower < upper < 1, got [{lower}, {upper}]"
        )));
    }
    Ok(p.clamp(lower, upper))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expit_matches_naive_moderate_values() {
        let xs: [f64; 7] = [-10.0, -2.0, -0.1, 0.0, 0.1, 2.0, 10.0];
        for x in xs {
            let naive = 1.0 / (1.0 + (-x).exp());
            assert!((expit(x) - naive).abs() < 1e-15, "x={x}");
        }
    }

    #[test]
    fn expit_bounds_and_symmetry() {
        for x in [-700.0, -50.0, 0.0, 50.0, 700.0] {
            let s = expit(x);
            assert!((0.0..=1.0).contains(&s), "expit({x})={s}");
            assert!((s + expit(-x) - 1.0).abs() < 1e-15);
        }
    }

    #[test]
    fn logit_inverts_expit() {
        for p in [0.01, 0.25, 0.5, 0.75, 0.99] {
            assert!((expit(logit(p).unwrap()) - p).abs() < 1e-12);
        }
        assert!(logit(0.0).is_err());
        assert!(logit(1.0).is_err());
    }

    #[test]
    fn odds_roundtrip() {
        for p in [0.0, 0.2, 0.5, 0.8] {
            let o = probability_to_odds(p).unwrap();
            assert!((odds_to_probability(o).unwrap() - p).abs() < 1e-12);
        }
        assert!(probability_to_odds(1.0).is_err());
        assert!(odds_to_probability(-0.5).is_err());
    }

    #[test]
    fn bound_probability_clamps() {
        assert_eq!(bound_probability(0.01, 0.1, 0.9).unwrap(), 0.1);
        assert_eq!(bound_probability(0.99, 0.1, 0.9).unwrap(), 0.9);
        assert_eq!(bound_probability(0.5, 0.1, 0.9).unwrap(), 0.5);
        assert!(bound_probability(0.5, 0.9, 0.1).is_err());
        assert!(bound_probability(0.5, 0.0, 0.9).is_err());
    }
}
