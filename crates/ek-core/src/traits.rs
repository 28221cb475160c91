//! Prediction-model traits.
//!
//! These traits are the seam between epikit and whatever fitted the
//! nuisance models: a logistic regression, a GEE fit, a machine-learning
//! classifier, or a hand-written rule. Estimators depend only on the
//! `predict(state) -> value_or_probability` capability, never on a fitting
//! implementation.

use crate::{CovariateState, Result};

/// A fitted model returning an event probability for a covariate state.
///
/// Implementations must return values in `[0, 1]`; the consuming engine
/// validates before drawing from the prediction.
pub trait ProbabilityModel: Send + Sync {
    /// Predicted probability given the current covariate state.
    fn predict_probability(&self, state: &CovariateState) -> Result<f64>;
}

/// A fitted model returning a predicted value for a covariate state.
///
/// For binary covariates the value is interpreted as a Bernoulli success
/// probability; for continuous covariates it is used as the fitted value.
pub trait ValueModel: Send + Sync {
    /// Predicted value given the current covariate state.
    fn predict_value(&self, state: &CovariateState) -> Result<f64>;
}

/// Closure adapter for [`ProbabilityModel`].
///
/// Wraps any `Fn(&CovariateState) -> Result<f64>`, which is how fitted
/// linear predictors are most conveniently supplied:
///
/// ```
/// use ek_core::{CovariateState, ProbabilityFn, ProbabilityModel};
///
/// let model = ProbabilityFn::new(|s: &CovariateState| {
///     let x = s.get("age")?;
///     Ok(1.0 / (1.0 + (-(-3.0 + 0.05 * x)).exp()))
/// });
/// let state = CovariateState::from_pairs([("age", 40.0)]).unwrap();
/// assert!(model.predict_probability(&state).unwrap() < 0.5);
/// ```
pub struct ProbabilityFn<F>(F);

impl<F> ProbabilityFn<F>
where
    F: Fn(&CovariateState) -> Result<f64> + Send + Sync,
{
    /// Wrap a closure as a probability model.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ProbabilityModel for ProbabilityFn<F>
where
    F: Fn(&CovariateState) -> Result<f64> + Send + Sync,
{
    fn predict_probability(&self, state: &CovariateState) -> Result<f64> {
        (self.0)(state)
    }
}

/// Closure adapter for [`ValueModel`].
pub struct ValueFn<F>(F);

impl<F> ValueFn<F>
where
    F: Fn(&CovariateState) -> Result<f64> + Send + Sync,
{
    /// Wrap a closure as a value model.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ValueModel for ValueFn<F>
where
    F: Fn(&CovariateState) -> Result<f64> + Send + Sync,
{
    fn predict_value(&self, state: &CovariateState) -> Result<f64> {
        (self.0)(state)
    }
}

impl<M: ProbabilityModel + ?Sized> ProbabilityModel for Box<M> {
    fn predict_probability(&self, state: &CovariateState) -> Result<f64> {
        (**self).predict_probability(state)
    }
}

impl<M: ValueModel + ?Sized> ValueModel for Box<M> {
    fn predict_value(&self, state: &CovariateState) -> Result<f64> {
        (**self).predict_value(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn closure_adapters_forward_predictions() {
        let p = ProbabilityFn::new(|_: &CovariateState| Ok(0.25));
        let v = ValueFn::new(|s: &CovariateState| Ok(2.0 * s.get("x")?));
        let state = CovariateState::from_pairs([("x", 3.0)]).unwrap();
        assert_eq!(p.predict_probability(&state).unwrap(), 0.25);
        assert_eq!(v.predict_value(&state).unwrap(), 6.0);
    }

    #[test]
    fn undefined_reference_propagates() {
        let v = ValueFn::new(|s: &CovariateState| s.get("missing"));
        let state = CovariateState::new();
        assert!(matches!(v.predict_value(&state), Err(Error::UndefinedVariable(_))));
    }
}
