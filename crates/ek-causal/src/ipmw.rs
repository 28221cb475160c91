//! Inverse probability of missingness weights.
//!
//! Reweights complete cases so they represent the full sample under a
//! missing-at-random assumption. The weight for an observed row is
//! `1 / Pr(M=0|L)`, or `Pr(M=0) / Pr(M=0|L)` when stabilized; rows with
//! missing data receive no weight.

use ek_core::{CovariateState, Error, ProbabilityModel, Result};

/// Inverse probability of missingness weight calculator.
#[derive(Debug, Clone, Copy)]
pub struct Ipmw {
    stabilized: bool,
}

impl Ipmw {
    /// Configure the weighting scheme.
    pub fn new(stabilized: bool) -> Self {
        Self { stabilized }
    }

    /// Compute weights for each row from a fitted observed-probability
    /// model (`Pr(M=0|L)`, i.e. the probability the row is complete).
    ///
    /// # Errors
    /// Validation errors on length mismatches, an all-missing sample, or
    /// predicted probabilities outside `(0, 1)`.
    pub fn fit(
        &self,
        states: &[CovariateState],
        observed: &[bool],
        model: &dyn ProbabilityModel,
    ) -> Result<Vec<Option<f64>>> {
        if states.is_empty() {
            return Err(Error::Validation("states must be non-empty".to_string()));
        }
        if states.len() != observed.len() {
            return Err(Error::Validation(format!(
                "states/observed length mismatch: {} vs {}",
                states.len(),
                observed.len()
            )));
        }
        let n_observed = observed.iter().filter(|o| **o).count();
        if n_observed == 0 {
            return Err(Error::Validation("every row is missing; nothing to weight".to_string()));
        }
        let numerator = if self.stabilized {
            n_observed as f64 / observed.len() as f64
        } else {
            1.0
        };

        states
            .iter()
            .zip(observed)
            .map(|(state, &is_observed)| {
                if !is_observed {
                    return Ok(None);
                }
                let p = model.predict_probability(state)?;
                if !p.is_finite() || p <= 0.0 || p >= 1.0 {
                    return Err(Error::Validation(format!(
                        "observed-probability model must predict inside (0,1), got {p}"
                    )));
                }
                Ok(Some(numerator / p))
            })
            .collect()
    }
}
