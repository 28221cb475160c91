//! # ek-prob
//!
//! Probability building blocks for epikit:
//! - stable logit/expit primitives and probability↔odds conversions,
//! - validated Bernoulli draws for simulated binary covariates,
//! - effect measures from 2×2 tables (risk difference/ratio, odds ratio)
//!   with Wald confidence intervals.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bernoulli;
pub mod math;
pub mod measures;

pub use bernoulli::draw_bernoulli;
pub use math::{bound_probability, expit, logit, odds_to_probability, probability_to_odds};
pub use measures::{odds_ratio, risk_difference, risk_ratio, TwoByTwo};
