//! Targeted maximum likelihood estimation.
//!
//! TMLE takes fitted nuisance models — a propensity `g(W) = Pr(A=1|W)` and
//! an outcome regression `Q(a, W)` — and targets the outcome predictions
//! with a one-step logistic fluctuation before the marginal contrast is
//! formed. The fluctuation regresses `Y` on the clever covariates
//! `H0 = (1−A)/(1−g)` and `H1 = A/g` with offset `logit(Q(A,W))` and no
//! intercept; its two coefficients are solved by damped Newton iterations
//! on the score (a fixed 2×2 system, not a general regression fit).
//!
//! Point estimates and influence-curve confidence intervals are produced
//! for the risk difference, risk ratio, and odds ratio.

use ek_core::{CovariateState, Error, IntervalEstimate, ProbabilityModel, Result};
use ek_prob::{bound_probability, expit};
use nalgebra::{Matrix2, Vector2};
use statrs::distribution::{ContinuousCDF, Normal};

/// Bound keeping outcome predictions inside the open unit interval so the
/// logit offset stays finite.
const Q_EPS: f64 = 1e-12;
/// Newton iteration cap for the fluctuation fit.
const MAX_NEWTON_ITER: usize = 100;
/// Convergence tolerance on the score infinity-norm.
const SCORE_TOL: f64 = 1e-10;

/// Result of a TMLE fit.
#[derive(Debug, Clone)]
pub struct TmleResult {
    /// Fluctuation coefficients `[epsilon_H0, epsilon_H1]`.
    pub epsilon: [f64; 2],
    /// Targeted risk had everyone been exposed.
    pub risk_exposed: f64,
    /// Targeted risk had everyone been unexposed.
    pub risk_unexposed: f64,
    /// Risk difference with influence-curve interval.
    pub risk_difference: IntervalEstimate,
    /// Risk ratio with log-scale influence-curve interval.
    pub risk_ratio: IntervalEstimate,
    /// Odds ratio with log-scale influence-curve interval.
    pub odds_ratio: IntervalEstimate,
    /// Number of observations.
    pub n: usize,
}

/// Targeted maximum likelihood estimator.
pub struct Tmle {
    exposure_name: String,
    exposure_model: Option<Box<dyn ProbabilityModel>>,
    outcome_model: Option<Box<dyn ProbabilityModel>>,
    bounds: Option<(f64, f64)>,
}

impl Tmle {
    /// Create an estimator; `exposure_name` is the state variable the
    /// outcome model reads for the treatment indicator.
    pub fn new(exposure_name: &str) -> Self {
        Self {
            exposure_name: exposure_name.to_string(),
            exposure_model: None,
            outcome_model: None,
            bounds: None,
        }
    }

    /// Register the fitted propensity model.
    pub fn exposure_model(&mut self, model: impl ProbabilityModel + 'static) -> &mut Self {
        self.exposure_model = Some(Box::new(model));
        self
    }

    /// Register the fitted outcome model.
    pub fn outcome_model(&mut self, model: impl ProbabilityModel + 'static) -> &mut Self {
        self.outcome_model = Some(Box::new(model));
        self
    }

    /// Clamp propensity scores into `[lower, upper]` before the clever
    /// covariates are formed.
    pub fn bound_propensity(&mut self, lower: f64, upper: f64) -> &mut Self {
        self.bounds = Some((lower, upper));
        self
    }

    /// Symmetric propensity bound: `[bound, 1 − bound]`.
    pub fn bound_propensity_symmetric(&mut self, bound: f64) -> &mut Self {
        self.bound_propensity(bound, 1.0 - bound)
    }

    /// Run the targeting step and form the marginal contrasts.
    ///
    /// # Errors
    /// - [`Error::Specification`] when either nuisance model is missing;
    /// - validation errors on length mismatches, non-binary codes, or
    ///   propensities outside `(0, 1)` after bounding;
    /// - [`Error::Computation`] when the fluctuation fit does not
    ///   converge.
    pub fn fit(
        &self,
        states: &[CovariateState],
        treatment: &[u8],
        outcome: &[u8],
        conf_level: f64,
    ) -> Result<TmleResult> {
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
        if n < 2 {
            return Err(Error::Validation("TMLE requires at least 2 observations".to_string()));
        }
        if treatment.len() != n || outcome.len() != n {
            return Err(Error::Validation(format!(
                "treatment/outcome must match states length {n}: got {} and {}",
                treatment.len(),
                outcome.len()
            )));
        }
        if !(conf_level.is_finite() && conf_level > 0.0 && conf_level < 1.0) {
            return Err(Error::Validation(format!("conf_level must be in (0,1), got {conf_level}")));
        }

        // Nuisance predictions per row.
        let mut g = Vec::with_capacity(n);
        let mut q1 = Vec::with_capacity(n);
        let mut q0 = Vec::with_capacity(n);
        let mut a_vec = Vec::with_capacity(n);
        let mut y_vec = Vec::with_capacity(n);
        for ((state, &a), &y) in states.iter().zip(treatment).zip(outcome) {
            if a > 1 || y > 1 {
                return Err(Error::Validation(
                    "treatment and outcome must be coded 0/1".to_string(),
                ));
            }
            let mut gi = exposure_model.predict_probability(state)?;
            if let Some((lower, upper)) = self.bounds {
                gi = bound_probability(gi, lower, upper)?;
            }
            if !gi.is_finite() || gi <= 0.0 || gi >= 1.0 {
                return Err(Error::Validation(format!(
                    "propensity must lie strictly inside (0,1) (positivity), got {gi}"
                )));
            }
            g.push(gi);
            q1.push(self.predict_arm(outcome_model.as_ref(), state, 1.0)?);
            q0.push(self.predict_arm(outcome_model.as_ref(), state, 0.0)?);
            a_vec.push(f64::from(a));
            y_vec.push(f64::from(y));
        }

        // Clever covariates and offset at the observed arm.
        let h0: Vec<f64> = a_vec.iter().zip(&g).map(|(&a, &gi)| (1.0 - a) / (1.0 - gi)).collect();
        let h1: Vec<f64> = a_vec.iter().zip(&g).map(|(&a, &gi)| a / gi).collect();
        let offset: Vec<f64> = a_vec
            .iter()
            .zip(q1.iter().zip(&q0))
            .map(|(&a, (&q1i, &q0i))| logit_bounded(if a == 1.0 { q1i } else { q0i }))
            .collect();

        let epsilon = fit_fluctuation(&h0, &h1, &offset, &y_vec)?;

        // Targeted predictions under each arm and at the observed arm.
        let mut sum1 = 0.0;
        let mut sum0 = 0.0;
        let mut q1_star = Vec::with_capacity(n);
        let mut q0_star = Vec::with_capacity(n);
        let mut qa_star = Vec::with_capacity(n);
        for i in 0..n {
            let q1s = expit(logit_bounded(q1[i]) + epsilon[1] / g[i]);
            let q0s = expit(logit_bounded(q0[i]) + epsilon[0] / (1.0 - g[i]));
            sum1 += q1s;
            sum0 += q0s;
            qa_star.push(if a_vec[i] == 1.0 { q1s } else { q0s });
            q1_star.push(q1s);
            q0_star.push(q0s);
        }
        let psi1 = sum1 / n as f64;
        let psi0 = sum0 / n as f64;
        if !(0.0..=1.0).contains(&psi1) || !(0.0..=1.0).contains(&psi0) {
            return Err(Error::Computation(format!(
                "targeted risks fell outside [0,1]: {psi1}, {psi0}"
            )));
        }

        // Influence-curve intervals.
        let z = z_value(conf_level);
        let rd = psi1 - psi0;
        let ic_rd: Vec<f64> = (0..n)
            .map(|i| {
                (h1[i] - h0[i]) * (y_vec[i] - qa_star[i]) + q1_star[i] - q0_star[i] - rd
            })
            .collect();
        let se_rd = ic_standard_error(&ic_rd);
        let risk_difference =
            IntervalEstimate::with_interval(rd, rd - z * se_rd, rd + z * se_rd, conf_level);

        let rr = psi1 / psi0;
        let ic_log_rr: Vec<f64> = (0..n)
            .map(|i| {
                (h1[i] * (y_vec[i] - qa_star[i]) + q1_star[i] - psi1) / psi1
                    - (h0[i] * (y_vec[i] - qa_star[i]) + q0_star[i] - psi0) / psi0
            })
            .collect();
        let se_log_rr = ic_standard_error(&ic_log_rr);
        let risk_ratio = IntervalEstimate::with_interval(
            rr,
            (rr.ln() - z * se_log_rr).exp(),
            (rr.ln() + z * se_log_rr).exp(),
            conf_level,
        );

        let or = (psi1 / (1.0 - psi1)) / (psi0 / (1.0 - psi0));
        let ic_log_or: Vec<f64> = (0..n)
            .map(|i| {
                (h1[i] * (y_vec[i] - qa_star[i]) + q1_star[i] - psi1) / (psi1 * (1.0 - psi1))
                    - (h0[i] * (y_vec[i] - qa_star[i]) + q0_star[i] - psi0)
                        / (psi0 * (1.0 - psi0))
            })
            .collect();
        let se_log_or = ic_standard_error(&ic_log_or);
        let odds_ratio = IntervalEstimate::with_interval(
            or,
            (or.ln() - z * se_log_or).exp(),
            (or.ln() + z * se_log_or).exp(),
            conf_level,
        );

        Ok(TmleResult {
            epsilon,
            risk_exposed: psi1,
            risk_unexposed: psi0,
            risk_difference,
            risk_ratio,
            odds_ratio,
            n,
        })
    }

    /// Outcome prediction with the exposure forced to `arm`, clamped into
    /// the open unit interval for the logit offset.
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
        Ok(q.clamp(Q_EPS, 1.0 - Q_EPS))
    }
}

#[inline]
fn logit_bounded(p: f64) -> f64 {
    let p = p.clamp(Q_EPS, 1.0 - Q_EPS);
    (p / (1.0 - p)).ln()
}

#[inline]
fn z_value(conf_level: f64) -> f64 {
    // Safe by construction for mean=0, sigma=1.
    let normal = Normal::new(0.0, 1.0).expect("standard normal should be constructible");
    normal.inverse_cdf(1.0 - (1.0 - conf_level) / 2.0)
}

/// Standard error of the estimate from its influence curve:
/// `sqrt(Var(IC) / n)` with the unbiased variance.
fn ic_standard_error(ic: &[f64]) -> f64 {
    let n = ic.len() as f64;
    let mean = ic.iter().sum::<f64>() / n;
    let var = ic.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1.0);
    (var / n).sqrt()
}

/// Solve the two-parameter logistic fluctuation
/// `Y ~ expit(offset + e0·H0 + e1·H1)` by damped Newton on the score.
///
/// The objective is a concave log-likelihood; the step is halved until the
/// likelihood does not decrease, which keeps early oversized steps from
/// diverging when clever covariates are large.
fn fit_fluctuation(h0: &[f64], h1: &[f64], offset: &[f64], y: &[f64]) -> Result<[f64; 2]> {
    let n = y.len();
    let log_likelihood = |e: &Vector2<f64>| -> f64 {
        (0..n)
            .map(|i| {
                let p = expit(offset[i] + e[0] * h0[i] + e[1] * h1[i])
                    .clamp(Q_EPS, 1.0 - Q_EPS);
                y[i] * p.ln() + (1.0 - y[i]) * (1.0 - p).ln()
            })
            .sum()
    };

    let mut eps = Vector2::zeros();
    let mut ll = log_likelihood(&eps);
    for _ in 0..MAX_NEWTON_ITER {
        let mut score = Vector2::zeros();
        let mut info = Matrix2::zeros();
        for i in 0..n {
            let p = expit(offset[i] + eps[0] * h0[i] + eps[1] * h1[i]);
            let resid = y[i] - p;
            let w = (p * (1.0 - p)).max(Q_EPS);
            score[0] += h0[i] * resid;
            score[1] += h1[i] * resid;
            info[(0, 0)] += h0[i] * h0[i] * w;
            info[(0, 1)] += h0[i] * h1[i] * w;
            info[(1, 1)] += h1[i] * h1[i] * w;
        }
        info[(1, 0)] = info[(0, 1)];

        if score.amax() < SCORE_TOL {
            return Ok([eps[0], eps[1]]);
        }

        let step = info.lu().solve(&score).ok_or_else(|| {
            Error::Computation(
                "singular information matrix in the targeting step; check positivity".to_string(),
            )
        })?;

        // Damping: halve until the log-likelihood does not decrease.
        let mut scale = 1.0;
        let mut accepted = false;
        for _ in 0..30 {
            let candidate = eps + step * scale;
            let candidate_ll = log_likelihood(&candidate);
            if candidate_ll >= ll - 1e-14 {
                eps = candidate;
                ll = candidate_ll;
                accepted = true;
                break;
            }
            scale *= 0.5;
        }
        if !accepted {
            return Err(Error::Computation(
                "targeting step stalled; no ascent direction found".to_string(),
            ));
        }
    }
    Err(Error::Computation("targeting step did not converge".to_string()))
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

    /// Arm means 0.8 / 0.2 reproduced exactly by the data, so the score is
    /// zero at epsilon = 0 and the targeting step is a no-op.
    fn balanced_fixture() -> (Vec<CovariateState>, Vec<u8>, Vec<u8>) {
        let treatment = vec![1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
        let outcome = vec![1, 1, 1, 1, 0, 1, 0, 0, 0, 0];
        (states(10), treatment, outcome)
    }

    fn fitted_tmle() -> Tmle {
        let mut tmle = Tmle::new("art");
        tmle.exposure_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        tmle.outcome_model(ProbabilityFn::new(|s: &CovariateState| {
            Ok(0.2 + 0.6 * s.get("art")?)
        }));
        tmle
    }

    #[test]
    fn missing_models_are_specification_errors() {
        let (s, a, y) = balanced_fixture();

        let bare = Tmle::new("art");
        assert!(matches!(bare.fit(&s, &a, &y, 0.95), Err(Error::Specification(_))));

        let mut only_exposure = Tmle::new("art");
        only_exposure.exposure_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        assert!(matches!(only_exposure.fit(&s, &a, &y, 0.95), Err(Error::Specification(_))));

        let mut only_outcome = Tmle::new("art");
        only_outcome.outcome_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        assert!(matches!(only_outcome.fit(&s, &a, &y, 0.95), Err(Error::Specification(_))));
    }

    #[test]
    fn already_targeted_models_leave_epsilon_at_zero() {
        let (s, a, y) = balanced_fixture();
        let result = fitted_tmle().fit(&s, &a, &y, 0.95).unwrap();
        assert!(result.epsilon[0].abs() < 1e-8, "eps0 = {}", result.epsilon[0]);
        assert!(result.epsilon[1].abs() < 1e-8, "eps1 = {}", result.epsilon[1]);
        assert!((result.risk_exposed - 0.8).abs() < 1e-8);
        assert!((result.risk_unexposed - 0.2).abs() < 1e-8);
        assert!((result.risk_difference.estimate - 0.6).abs() < 1e-8);
        assert!((result.risk_ratio.estimate - 4.0).abs() < 1e-6);
        // OR = (0.8/0.2)/(0.2/0.8) = 16.
        assert!((result.odds_ratio.estimate - 16.0).abs() < 1e-5);
    }

    #[test]
    fn fluctuation_corrects_a_miscalibrated_outcome_model() {
        // Treated mean is 1.0 but the outcome model says 0.6: the targeting
        // step must push the exposed risk upward.
        let treatment = vec![1, 1, 1, 1, 0, 0, 0, 0];
        let outcome = vec![1, 1, 1, 1, 0, 0, 0, 1];
        let mut tmle = Tmle::new("art");
        tmle.exposure_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        tmle.outcome_model(ProbabilityFn::new(|s: &CovariateState| {
            Ok(0.2 + 0.4 * s.get("art")?)
        }));
        let result = tmle.fit(&states(8), &treatment, &outcome, 0.95).unwrap();
        assert!(result.epsilon[1] > 0.0, "eps1 = {}", result.epsilon[1]);
        assert!(result.risk_exposed > 0.6);
        // With constant g and Q, the targeted risk matches the arm mean.
        assert!((result.risk_exposed - 1.0).abs() < 1e-6);
        assert!((result.risk_unexposed - 0.25).abs() < 1e-6);
    }

    #[test]
    fn intervals_bracket_their_estimates() {
        let (s, a, y) = balanced_fixture();
        let result = fitted_tmle().fit(&s, &a, &y, 0.95).unwrap();
        for e in [&result.risk_difference, &result.risk_ratio, &result.odds_ratio] {
            let (lo, hi) = (e.lower.unwrap(), e.upper.unwrap());
            assert!(lo < e.estimate && e.estimate < hi);
        }
        assert!(result.risk_ratio.lower.unwrap() > 0.0);
        assert!(result.odds_ratio.lower.unwrap() > 0.0);
    }

    #[test]
    fn propensity_bounds_rescue_degenerate_scores() {
        let (s, a, y) = balanced_fixture();
        let mut tmle = Tmle::new("art");
        tmle.exposure_model(ProbabilityFn::new(|_s: &CovariateState| Ok(1.0)));
        tmle.outcome_model(ProbabilityFn::new(|s: &CovariateState| {
            Ok(0.2 + 0.6 * s.get("art")?)
        }));
        assert!(tmle.fit(&s, &a, &y, 0.95).is_err());
        tmle.bound_propensity_symmetric(0.1);
        assert!(tmle.fit(&s, &a, &y, 0.95).is_ok());
    }

    #[test]
    fn asymmetric_bounds_are_honoured() {
        // Heterogeneous propensities with a pocket of near-zero scores and
        // a miscalibrated outcome model: the two clamps produce different
        // clever covariates, so the targeted risks must differ.
        let (s, a, y) = balanced_fixture();
        let heterogeneous_g = |s: &CovariateState| -> Result<f64> {
            Ok(if s.get("x")? < 2.0 { 0.02 } else { 0.7 })
        };

        let mut symmetric = Tmle::new("art");
        symmetric.exposure_model(ProbabilityFn::new(heterogeneous_g));
        symmetric.outcome_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        symmetric.bound_propensity_symmetric(0.1);
        let res_sym = symmetric.fit(&s, &a, &y, 0.95).unwrap();

        let mut asymmetric = Tmle::new("art");
        asymmetric.exposure_model(ProbabilityFn::new(heterogeneous_g));
        asymmetric.outcome_model(ProbabilityFn::new(|_s: &CovariateState| Ok(0.5)));
        asymmetric.bound_propensity(0.25, 0.65);
        let res_asym = asymmetric.fit(&s, &a, &y, 0.95).unwrap();

        assert!(
            (res_sym.risk_exposed - res_asym.risk_exposed).abs() > 1e-6,
            "{} vs {}",
            res_sym.risk_exposed,
            res_asym.risk_exposed
        );
    }
}
