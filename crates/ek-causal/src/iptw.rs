//! Inverse probability of treatment weights.
//!
//! Weights are computed from an already-fitted propensity model. With
//! stabilization the weight is `Pr(A=a) / Pr(A=a|L)`; unstabilized weights
//! use `1 / Pr(A=a|L)`. Standardized-mortality-ratio (SMR) weighting to the
//! exposed or unexposed group is supported for both forms (Sato &
//! Matsuyama, *Epidemiology* 2003).

use ek_core::{CovariateState, Error, ProbabilityModel, Result};

/// Group the weighted estimate is standardized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standardization {
    /// Weight to the entire population.
    Population,
    /// SMR weight to the exposed group.
    Exposed,
    /// SMR weight to the unexposed group.
    Unexposed,
}

/// Output of [`Iptw::fit`].
#[derive(Debug, Clone)]
pub struct WeightSet {
    /// Per-row weight; `None` where treatment was missing.
    pub weights: Vec<Option<f64>>,
    /// Denominator probabilities `Pr(A=1|L)`.
    pub denominator: Vec<f64>,
    /// Numerator probabilities `Pr(A=1)` (all `1.0` when unstabilized).
    pub numerator: Vec<f64>,
}

impl WeightSet {
    /// Weights for the rows where treatment was observed.
    pub fn observed(&self) -> Vec<f64> {
        self.weights.iter().copied().flatten().collect()
    }
}

/// Inverse probability of treatment weight calculator.
#[derive(Debug, Clone, Copy)]
pub struct Iptw {
    stabilized: bool,
    standardize: Standardization,
}

impl Iptw {
    /// Configure the weighting scheme. Stabilized population weights are
    /// the conventional default.
    pub fn new(stabilized: bool, standardize: Standardization) -> Self {
        Self { stabilized, standardize }
    }

    /// Whether stabilized weights were requested.
    pub fn stabilized(&self) -> bool {
        self.stabilized
    }

    /// Compute weights for each row.
    ///
    /// `numerator_model` stabilizes the weights; when omitted under
    /// stabilization, the observed treatment prevalence is used (the
    /// intercept-only numerator of the original formulation).
    ///
    /// # Errors
    /// - configuration: a numerator model supplied with `stabilized =
    ///   false` (it would silently be ignored otherwise);
    /// - validation: length mismatches, treatment codes outside {0, 1},
    ///   or predicted probabilities outside `(0, 1)` (positivity).
    pub fn fit(
        &self,
        states: &[CovariateState],
        treatment: &[Option<u8>],
        denominator_model: &dyn ProbabilityModel,
        numerator_model: Option<&dyn ProbabilityModel>,
    ) -> Result<WeightSet> {
        if states.is_empty() {
            return Err(Error::Validation("states must be non-empty".to_string()));
        }
        if states.len() != treatment.len() {
            return Err(Error::Validation(format!(
                "states/treatment length mismatch: {} vs {}",
                states.len(),
                treatment.len()
            )));
        }
        if !self.stabilized && numerator_model.is_some() {
            return Err(Error::Specification(
                "a numerator model is only used for stabilized weights".to_string(),
            ));
        }
        for a in treatment.iter().flatten() {
            if *a > 1 {
                return Err(Error::Validation(format!("treatment must be coded 0/1, got {a}")));
            }
        }

        let denominator: Vec<f64> = states
            .iter()
            .map(|s| {
                let p = denominator_model.predict_probability(s)?;
                ensure_open_unit(p, "denominator model")
            })
            .collect::<Result<_>>()?;

        let numerator: Vec<f64> = if self.stabilized {
            match numerator_model {
                Some(model) => states
                    .iter()
                    .map(|s| {
                        let p = model.predict_probability(s)?;
                        ensure_open_unit(p, "numerator model")
                    })
                    .collect::<Result<_>>()?,
                None => {
                    let prevalence = treatment_prevalence(treatment)?;
                    vec![prevalence; states.len()]
                }
            }
        } else {
            vec![1.0; states.len()]
        };

        let weights = treatment
            .iter()
            .zip(denominator.iter().zip(&numerator))
            .map(|(a, (&d, &n))| a.map(|a| self.weight(a == 1, d, n)))
            .collect();

        Ok(WeightSet { weights, denominator, numerator })
    }

    /// One weight from the treatment indicator and the two probabilities.
    fn weight(&self, treated: bool, d: f64, n: f64) -> f64 {
        match (self.stabilized, self.standardize) {
            (true, Standardization::Population) => {
                if treated { n / d } else { (1.0 - n) / (1.0 - d) }
            }
            (true, Standardization::Exposed) => {
                if treated { 1.0 } else { (d / (1.0 - d)) * ((1.0 - n) / n) }
            }
            (true, Standardization::Unexposed) => {
                if treated { ((1.0 - d) / d) * (n / (1.0 - n)) } else { 1.0 }
            }
            (false, Standardization::Population) => {
                if treated { 1.0 / d } else { 1.0 / (1.0 - d) }
            }
            (false, Standardization::Exposed) => {
                if treated { 1.0 } else { d / (1.0 - d) }
            }
            (false, Standardization::Unexposed) => {
                if treated { (1.0 - d) / d } else { 1.0 }
            }
        }
    }
}

fn ensure_open_unit(p: f64, what: &str) -> Result<f64> {
    if !p.is_finite() || p <= 0.0 || p >= 1.0 {
        return Err(Error::Validation(format!(
            "{what} must predict probabilities strictly inside (0,1) for weighting \
             (positivity), got {p}"
        )));
    }
    Ok(p)
}

/// Observed treatment prevalence, ignoring missing rows.
fn treatment_prevalence(treatment: &[Option<u8>]) -> Result<f64> {
    let mut observed = 0usize;
    let mut treated = 0usize;
    for a in treatment.iter().flatten() {
        observed += 1;
        treated += usize::from(*a == 1);
    }
    if observed == 0 {
        return Err(Error::Validation(
            "treatment is missing for every row; cannot stabilize".to_string(),
        ));
    }
    ensure_open_unit(treated as f64 / observed as f64, "treatment prevalence")
}
