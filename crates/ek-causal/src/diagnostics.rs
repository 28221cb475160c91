//! Weight and covariate-balance diagnostics.
//!
//! - [`weight_summary`]: the positivity check — a mean far from the
//!   extremes of the weight distribution suggests model misspecification
//!   or a positivity violation (Cole & Hernán, *Am J Epidemiol* 2008).
//! - [`standardized_mean_differences`]: covariate balance between
//!   treatment groups before and after weighting (Austin 2011; Austin &
//!   Stuart 2015). Weighted differences above roughly 0.10 flag residual
//!   imbalance.

use ek_core::{CovariateState, Error, Result};
use nalgebra::{DMatrix, DVector};

/// Summary statistics of a weight distribution.
#[derive(Debug, Clone, Copy)]
pub struct WeightSummary {
    /// Mean weight (≈ 1 for well-behaved stabilized weights).
    pub mean: f64,
    /// Standard deviation (unbiased).
    pub sd: f64,
    /// Minimum weight.
    pub min: f64,
    /// Maximum weight.
    pub max: f64,
    /// Number of weights summarized.
    pub n: usize,
}

/// Summarize a weight vector for the positivity diagnostic.
///
/// # Errors
/// Rejects fewer than two weights or non-finite values.
pub fn weight_summary(weights: &[f64]) -> Result<WeightSummary> {
    if weights.len() < 2 {
        return Err(Error::Validation("need at least 2 weights to summarize".to_string()));
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(Error::Validation("weights must be finite".to_string()));
    }
    let n = weights.len() as f64;
    let mean = weights.iter().sum::<f64>() / n;
    let var = weights.iter().map(|w| (w - mean) * (w - mean)).sum::<f64>() / (n - 1.0);
    let min = weights.iter().copied().fold(f64::INFINITY, f64::min);
    let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(WeightSummary { mean, sd: var.sqrt(), min, max, n: weights.len() })
}

/// Measurement scale of a balance variable.
#[derive(Debug, Clone)]
pub enum VariableScale {
    /// 0/1 indicator; difference uses the pooled binomial variance.
    Binary,
    /// Continuous; difference uses the pooled weighted variance.
    Continuous,
    /// Multi-level variable given as its indicator columns (reference
    /// level first); the difference is a Mahalanobis distance over the
    /// non-reference levels.
    Categorical(Vec<String>),
}

/// One variable to check balance for.
#[derive(Debug, Clone)]
pub struct BalanceVariable {
    /// State variable name (display label for categorical variables).
    pub label: String,
    /// Measurement scale.
    pub scale: VariableScale,
}

impl BalanceVariable {
    /// A binary balance variable.
    pub fn binary(label: &str) -> Self {
        Self { label: label.to_string(), scale: VariableScale::Binary }
    }

    /// A continuous balance variable.
    pub fn continuous(label: &str) -> Self {
        Self { label: label.to_string(), scale: VariableScale::Continuous }
    }

    /// A categorical balance variable from its indicator columns
    /// (reference level first).
    pub fn categorical(label: &str, indicators: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            scale: VariableScale::Categorical(
                indicators.iter().map(|s| (*s).to_string()).collect(),
            ),
        }
    }
}

/// Standardized mean difference for one variable, with and without
/// weighting.
#[derive(Debug, Clone)]
pub struct StandardizedDifference {
    /// Variable label.
    pub label: String,
    /// Unweighted standardized difference.
    pub unweighted: f64,
    /// Weighted standardized difference.
    pub weighted: f64,
}

/// Compute standardized mean differences between treatment groups.
///
/// Rows with missing treatment or missing weight are excluded, matching
/// the weighting estimators that produced them.
///
/// # Errors
/// Validation errors on length mismatches, empty groups, undefined
/// variables, or non-0/1 values in binary columns.
pub fn standardized_mean_differences(
    states: &[CovariateState],
    treatment: &[Option<u8>],
    weights: &[Option<f64>],
    variables: &[BalanceVariable],
) -> Result<Vec<StandardizedDifference>> {
    let n = states.len();
    if n == 0 {
        return Err(Error::Validation("states must be non-empty".to_string()));
    }
    if treatment.len() != n || weights.len() != n {
        return Err(Error::Validation(format!(
            "treatment/weights must match states length {n}: got {} and {}",
            treatment.len(),
            weights.len()
        )));
    }

    // Complete rows, split by arm.
    let mut treated: Vec<(usize, f64)> = Vec::new();
    let mut untreated: Vec<(usize, f64)> = Vec::new();
    for i in 0..n {
        if let (Some(a), Some(w)) = (treatment[i], weights[i]) {
            match a {
                1 => treated.push((i, w)),
                0 => untreated.push((i, w)),
                _ => {
                    return Err(Error::Validation(format!(
                        "treatment must be coded 0/1, got {a}"
                    )))
                }
            }
        }
    }
    if treated.is_empty() || untreated.is_empty() {
        return Err(Error::Validation(
            "both treatment groups must contain weighted observations".to_string(),
        ));
    }

    variables
        .iter()
        .map(|variable| {
            let smd = |use_weights: bool| -> Result<f64> {
                match &variable.scale {
                    VariableScale::Binary => {
                        let pt = group_mean(states, &treated, &variable.label, use_weights, true)?;
                        let pn =
                            group_mean(states, &untreated, &variable.label, use_weights, true)?;
                        Ok((pt - pn) / ((pt * (1.0 - pt) + pn * (1.0 - pn)) / 2.0).sqrt())
                    }
                    VariableScale::Continuous => {
                        let (mt, vt) =
                            group_mean_var(states, &treated, &variable.label, use_weights)?;
                        let (mn, vn) =
                            group_mean_var(states, &untreated, &variable.label, use_weights)?;
                        Ok((mt - mn) / ((vt + vn) / 2.0).sqrt())
                    }
                    VariableScale::Categorical(indicators) => {
                        categorical_smd(states, &treated, &untreated, indicators, use_weights)
                    }
                }
            };
            Ok(StandardizedDifference {
                label: variable.label.clone(),
                unweighted: smd(false)?,
                weighted: smd(true)?,
            })
        })
        .collect()
}

/// Weighted mean of one variable over a group. `check_binary` enforces
/// 0/1 coding.
fn group_mean(
    states: &[CovariateState],
    group: &[(usize, f64)],
    name: &str,
    use_weights: bool,
    check_binary: bool,
) -> Result<f64> {
    let mut sum = 0.0;
    let mut sum_w = 0.0;
    for &(i, w) in group {
        let x = states[i].get(name)?;
        if check_binary && x != 0.0 && x != 1.0 {
            return Err(Error::Validation(format!(
                "binary balance variable '{name}' has non-0/1 value {x}"
            )));
        }
        let w = if use_weights { w } else { 1.0 };
        sum += w * x;
        sum_w += w;
    }
    if sum_w <= 0.0 {
        return Err(Error::Validation(format!(
            "non-positive total weight for variable '{name}'"
        )));
    }
    Ok(sum / sum_w)
}

/// Weighted mean and unbiased weighted variance of one variable.
fn group_mean_var(
    states: &[CovariateState],
    group: &[(usize, f64)],
    name: &str,
    use_weights: bool,
) -> Result<(f64, f64)> {
    let mean = group_mean(states, group, name, use_weights, false)?;
    let mut ss = 0.0;
    let mut sum_w = 0.0;
    for &(i, w) in group {
        let x = states[i].get(name)?;
        let w = if use_weights { w } else { 1.0 };
        ss += w * (x - mean) * (x - mean);
        sum_w += w;
    }
    if sum_w <= 1.0 {
        return Err(Error::Validation(format!(
            "total weight must exceed 1 for the variance of '{name}'"
        )));
    }
    Ok((mean, ss / (sum_w - 1.0)))
}

/// Mahalanobis standardized difference over non-reference levels of a
/// categorical variable.
///
/// The covariance of the level proportions is the pooled multinomial
/// covariance:
/// `S_kk = (p1k(1-p1k) + p2k(1-p2k)) / 2`,
/// `S_kl = -(p1k·p1l + p2k·p2l) / 2` for `k ≠ l`.
fn categorical_smd(
    states: &[CovariateState],
    treated: &[(usize, f64)],
    untreated: &[(usize, f64)],
    indicators: &[String],
    use_weights: bool,
) -> Result<f64> {
    if indicators.len() < 2 {
        return Err(Error::Validation(
            "categorical variables need at least 2 indicator columns".to_string(),
        ));
    }
    let pt: Vec<f64> = indicators
        .iter()
        .map(|name| group_mean(states, treated, name, use_weights, true))
        .collect::<Result<_>>()?;
    let pn: Vec<f64> = indicators
        .iter()
        .map(|name| group_mean(states, untreated, name, use_weights, true))
        .collect::<Result<_>>()?;

    // Drop the reference level (first indicator).
    let k = indicators.len() - 1;
    let diff = DVector::from_iterator(k, (1..=k).map(|i| pt[i] - pn[i]));
    let mut cov = DMatrix::zeros(k, k);
    for i in 0..k {
        for j in 0..k {
            let (p1i, p2i) = (pt[i + 1], pn[i + 1]);
            let (p1j, p2j) = (pt[j + 1], pn[j + 1]);
            cov[(i, j)] = if i == j {
                (p1i * (1.0 - p1i) + p2i * (1.0 - p2i)) / 2.0
            } else {
                -(p1i * p1j + p2i * p2j) / 2.0
            };
        }
    }
    let inv = cov.try_inverse().ok_or_else(|| {
        Error::Computation(
            "singular level-proportion covariance; a category level may be empty".to_string(),
        )
    })?;
    Ok((diff.transpose() * inv * diff)[(0, 0)].sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(vals: &[(&str, f64)]) -> CovariateState {
        CovariateState::from_pairs(vals.iter().copied()).unwrap()
    }

    #[test]
    fn weight_summary_basic_moments() {
        let s = weight_summary(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((s.mean - 2.5).abs() < 1e-12);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
        // Unbiased variance of 1..4 is 5/3.
        assert!((s.sd - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!(weight_summary(&[1.0]).is_err());
    }

    #[test]
    fn binary_smd_hand_computed() {
        // Treated prevalence 0.75, untreated 0.25.
        let states = vec![
            row(&[("male", 1.0)]),
            row(&[("male", 1.0)]),
            row(&[("male", 1.0)]),
            row(&[("male", 0.0)]),
            row(&[("male", 1.0)]),
            row(&[("male", 0.0)]),
            row(&[("male", 0.0)]),
            row(&[("male", 0.0)]),
        ];
        let treatment: Vec<Option<u8>> =
            vec![Some(1), Some(1), Some(1), Some(1), Some(0), Some(0), Some(0), Some(0)];
        let weights: Vec<Option<f64>> = vec![Some(1.0); 8];
        let smd = standardized_mean_differences(
            &states,
            &treatment,
            &weights,
            &[BalanceVariable::binary("male")],
        )
        .unwrap();
        let expected = 0.5 / (0.1875f64).sqrt();
        assert!((smd[0].unweighted - expected).abs() < 1e-12);
        // Unit weights: weighted equals unweighted.
        assert!((smd[0].weighted - smd[0].unweighted).abs() < 1e-12);
    }

    #[test]
    fn weighting_can_remove_imbalance() {
        // Two treated rows (x = 1, 0), two untreated (x = 1, 0); upweight
        // the untreated x=1 row so the weighted means coincide.
        let states = vec![
            row(&[("x", 1.0)]),
            row(&[("x", 1.0)]),
            row(&[("x", 1.0)]),
            row(&[("x", 0.0)]),
            row(&[("x", 0.0)]),
        ];
        let treatment = vec![Some(1), Some(1), Some(0), Some(0), Some(1)];
        // Treated mean = 2/3. Untreated weighted mean = 2w/(2w+1) = 2/3 at w=1.
        let weights = vec![Some(1.0), Some(1.0), Some(2.0), Some(1.0), Some(1.0)];
        let smd = standardized_mean_differences(
            &states,
            &treatment,
            &weights,
            &[BalanceVariable::binary("x")],
        )
        .unwrap();
        assert!(smd[0].weighted.abs() < 1e-12, "weighted smd = {}", smd[0].weighted);
        assert!(smd[0].unweighted.abs() > 0.1);
    }

    #[test]
    fn continuous_smd_is_zero_for_identical_groups() {
        let states = vec![
            row(&[("age", 30.0)]),
            row(&[("age", 50.0)]),
            row(&[("age", 30.0)]),
            row(&[("age", 50.0)]),
        ];
        let treatment = vec![Some(1), Some(1), Some(0), Some(0)];
        let weights = vec![Some(1.0); 4];
        let smd = standardized_mean_differences(
            &states,
            &treatment,
            &weights,
            &[BalanceVariable::continuous("age")],
        )
        .unwrap();
        assert!(smd[0].unweighted.abs() < 1e-12);
    }

    #[test]
    fn categorical_smd_detects_shifted_levels() {
        let make = |l0: f64, l1: f64, l2: f64| {
            row(&[("race_0", l0), ("race_1", l1), ("race_2", l2)])
        };
        let states = vec![
            make(1.0, 0.0, 0.0),
            make(0.0, 1.0, 0.0),
            make(0.0, 1.0, 0.0),
            make(0.0, 0.0, 1.0),
            make(1.0, 0.0, 0.0),
            make(1.0, 0.0, 0.0),
            make(0.0, 1.0, 0.0),
            make(0.0, 0.0, 1.0),
        ];
        let treatment =
            vec![Some(1), Some(1), Some(1), Some(1), Some(0), Some(0), Some(0), Some(0)];
        let weights = vec![Some(1.0); 8];
        let var = BalanceVariable::categorical("race", &["race_0", "race_1", "race_2"]);
        let smd =
            standardized_mean_differences(&states, &treatment, &weights, &[var]).unwrap();
        assert!(smd[0].unweighted > 0.0);
        assert!(smd[0].unweighted.is_finite());
    }

    #[test]
    fn rows_with_missing_weight_or_treatment_are_excluded() {
        let states = vec![
            row(&[("male", 1.0)]),
            row(&[("male", 0.0)]),
            row(&[("male", 1.0)]),
            row(&[("male", 1.0)]),
        ];
        let treatment = vec![Some(1), Some(0), None, Some(0)];
        let weights = vec![Some(1.0), Some(1.0), Some(1.0), None];
        // Only rows 0 and 1 survive: prevalences 1.0 and 0.0 make the
        // pooled binomial variance zero, so the difference diverges.
        let smd = standardized_mean_differences(
            &states,
            &treatment,
            &weights,
            &[BalanceVariable::binary("male")],
        )
        .unwrap();
        assert!(smd[0].unweighted.is_infinite());
    }
}
