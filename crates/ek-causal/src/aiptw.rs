//! Augmented inverse probability of treatment weighting.
//!
//! The doubly-robust point estimator: combines a fitted propensity model
//! `g(W) = Pr(A=1|W)` and a fitted outcome model `Q(a, W)` so that correct
//! specification of either yields a consistent marginal contrast,
//!
//! ```text
//! E[Y^(a=1)] = mean( A·Y/g − Q(1,W)·(A − g)/g )
//! E[Y^(a=0)] = mean( (1−A)·Y/(1−g) + Q(0,W)·(A − g)/(1−g) )
//! ```
//!
//! Interval estimation is left to a caller-driven bootstrap (see
//! [`crate::bootstrap`]).

use ek_core::{CovariateState, Error, ProbabilityModel, Result};
use ek_prob::bound_probability;

/// Result of an AIPTW fit.
#[derive(Debug, Clone, Copy)]
pub struct AiptwResult {
    /// Estimated risk had everyone been exposed.
    pub risk_exposed: f64,
    /// Estimated risk had everyone been unexposed.
    pub risk_unexposed: f64,
    /// Risk difference.
    pub risk_difference: f64,
    /// Risk ratio.
    pub risk_ratio: f64,
    /// Number of observations.
    pub n: usize,
}

/// Augmented IPTW estimator.
///
/// Both nuisance models must be registered before [`fit`](Self::fit); the
/// outcome model is evaluated with the exposure variable forced to each
/// arm in turn.
pub struct Aiptw {
    exposure_name: String,
    exposure_model: Option<Box<dyn ProbabilityModel>>,
    outcome_model: Option<Box<dyn ProbabilityModel>>,
    trim: Option<f64>,
}

impl Aiptw {
    /// Create an estimator; `exposure_name` is the state variable the
    /// outcome model reads for the treatment indicator.
    pub fn new(exposure_name: &str) -> Self {
        Self {
            exposure_name: exposure_name.to_string(),
            exposure_model: None,
            outcome_model: None,
            trim: None,
        }
    }

    /// Register the fitted propensity model `Pr(A=1|W)`.
    pub fn exposure_model(&mut self, model: impl ProbabilityModel + 'static) -> &mut Self {
        self.exposure_model = Some(Box::new(model));
        self
    }

    /// Register the fitted outcome model `Q(a, W)`.
    pub fn outcome_model(&mut self, model: impl ProbabilityModel + 'static) -> &mut Self {
        self.outcome_model = Some(Box::new(model));
        self
    }

    /// Symmetrically trim propensity scores into `[bound, 1 − bound]`
    /// before they enter the weights.
    pub fn trim(&mut self, bound: f64) -> &mut Self {
        self.trim = Some(bound);
        self
    }

    /// Compute the doubly-robust arm risks and their contrasts.
    ///
    /// # Errors
    /// - [`Error::Specification`] when either nuisance model is missing;
    /// - validation errors on length mismatches, non-binary codes, or
    ///   propensities outside `(0, 1)` after any trimming.
    pub fn fit(
        &self,
        states: &[CovariateState],
        treatment: &[u8],
        outcome: &[u8],
    ) -> Result<AiptwResult> {
        let exposure_model = self.exposure_model.as_ref().ok_or_else(|| {
            Error::Specification(
                "no exposure model registered; call exposure_model() before fit()".to_string(),
            )
        })?;
        let outcome_model = self.outcome_model.as_ref().ok_or_else(|| {
            Error::Specification(
                "no outcome model registered; call outcome_model() before fit()".to_string(),
            )
        })?;
        let n = states.len();
        if n == 0 {
            return Err(Error::Validation("states must be non-empty".to_string()));
        }
        if treatment.len() != n || outcome.len() != n {
            return Err(Error::Validation(format!(
                "treatment/outcome must match states length {n}: got {} and {}",
                treatment.len(),
                outcome.len()
            )));
        }

        let mut sum_exposed = 0.0;
        let mut sum_unexposed = 0.0;
        for ((state, &a), &y) in states.iter().zip(treatment).zip(outcome) {
            if a > 1 || y > 1 {
                return Err(Error::Validation(
                    "treatment and outcome must be coded 0/1".to_string(),
                ));
            }
            let mut g = exposure_model.predict_probability(state)?;
            if let Some(bound) = self.trim {
                g = bound_probability(g, bound, 1.0 - bound)?;
            }
            if !g.is_finite() || g <= 0.0 || g >= 1.0 {
                return Err(Error::Validation(format!(
                    "propensity must lie strictly inside (0,1) (positivity), got {g}"
                )));
            }

            let q1 = self.predict_arm(outcome_model.as_ref(), state, 1.0)?;
            let q0 = self.predict_arm(outcome_model.as_ref(), state, 0.0)?;

            let a = f64::from(a);
            let y = f64::from(y);
            sum_exposed += a * y / g - q1 * (a - g) / g;
            sum_unexposed += (1.0 - a) * y / (1.0 - g) + q0 * (a - g) / (1.0 - g);
        }

        let risk_exposed = sum_exposed / n as f64;
        let risk_unexposed = sum_unexposed / n as f64;
        Ok(AiptwResult {
            risk_exposed,
            risk_unexposed,
            risk_difference: risk_exposed - risk_unexposed,
            risk_ratio: risk_exposed / risk_unexposed,
            n,
        })
    }

    /// Outcome prediction with the exposure forced to `arm`.
    fn predict_arm(
        &self,
        model: &dyn ProbabilityModel,
        state: &CovariateState,
        arm: f64,
    ) -> Result<f64> {
        let mut forced = state.clone();
        forced.set(&self.exposure_name, arm)?;
        let q = model.predict_probability(&forced)?;
        if !q.is_finite() || !(0.0..=1.0).contains(&q) {
            return Err(Error::Validation(format!(
                "outcome model must predict a probability in [0,1], got {q}"
            )));
        }
        Ok(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ek_core::ProbabilityFn;

    fn states(n: usize) -> Vec<CovariateState> {
        (0..n)
            .map(|i| CovariateState::from_pairs([("x", i as f64)]).unwrap())
            .collect()
    }

    #[test]
    fn missing_models_are_specification_errors() {
        let bare = Aiptw::new("art");
        assert!(matches!(
            bare.fit(&states(2), &[1, 0], &[1, 0]),
            Err(Error::Specification(_))
        ));

        let mut only_exposure = Aiptw::new("art");
        only_exposure.exposure_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        assert!(matches!(
            only_exposure.fit(&states(2), &[1, 0], &[1, 0]),
            Err(Error::Specification(_))
        ));

        let mut only_outcome = Aiptw::new("art");
        only_outcome.outcome_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        assert!(matches!(
            only_outcome.fit(&states(2), &[1, 0], &[1, 0]),
            Err(Error::Specification(_))
        ));
    }

    #[test]
    fn hand_computed_contrast() {
        let mut aipw = Aiptw::new("art");
        aipw.exposure_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        aipw.outcome_model(ProbabilityFn::new(|s: &CovariateState| {
            Ok(0.2 + 0.3 * s.get("art")?)
        }));
        let result = aipw.fit(&states(4), &[1, 0, 1, 0], &[1, 0, 0, 1]).unwrap();
        // With g = 0.5, Q(1,·) = 0.5, Q(0,·) = 0.2:
        // arm-1 contributions: 1.5, 0.5, -0.5, 0.5 -> mean 0.5
        // arm-0 contributions: 0.2, -0.2, 0.2, 1.8 -> mean 0.5
        assert!((result.risk_exposed - 0.5).abs() < 1e-12);
        assert!((result.risk_unexposed - 0.5).abs() < 1e-12);
        assert!(result.risk_difference.abs() < 1e-12);
        assert!((result.risk_ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn correct_outcome_model_rescues_a_wrong_propensity() {
        // Y = A exactly; the outcome model knows it, the propensity is off.
        let mut aipw = Aiptw::new("art");
        aipw.exposure_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.3)));
        aipw.outcome_model(ProbabilityFn::new(|s: &CovariateState| s.get("art")));
        let treatment = [1, 0, 1, 0, 1, 0];
        let outcome = treatment;
        let result = aipw.fit(&states(6), &treatment, &outcome).unwrap();
        assert!((result.risk_exposed - 1.0).abs() < 1e-12);
        assert!(result.risk_unexposed.abs() < 1e-12);
        assert!((result.risk_difference - 1.0).abs() < 1e-12);
    }

    #[test]
    fn trimming_bounds_the_propensity() {
        let mut aipw = Aiptw::new("art");
        aipw.exposure_model(ProbabilityFn::new(|s: &CovariateState| {
            Ok(if s.get("x")? < 1.0 { 0.001 } else { 0.6 })
        }));
        aipw.outcome_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.2)));
        aipw.trim(0.05);
        // Without trimming the first row's weight would be 1/0.001.
        let result = aipw.fit(&states(2), &[1, 0], &[1, 0]).unwrap();
        assert!(result.risk_exposed.abs() <= 1.0 / 0.05 / 2.0 + 1.0);
    }
}
