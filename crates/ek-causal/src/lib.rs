//! # ek-causal
//!
//! Causal-inference estimators for discrete-time epidemiological data.
//!
//! This crate provides:
//! - the time-varying Monte Carlo g-formula simulation engine,
//! - inverse probability of treatment / censoring / missingness weights,
//! - augmented IPTW and targeted maximum likelihood estimation,
//! - weight and covariate-balance diagnostics,
//! - percentile bootstrap interval helpers.
//!
//! ## Architecture
//!
//! Every estimator consumes already-fitted prediction functions through the
//! `ProbabilityModel`/`ValueModel` traits from `ek-core`. No regression
//! fitting happens here; the caller supplies `predict(state)` capabilities
//! from whatever fit them.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Augmented inverse probability of treatment weighting (doubly robust).
pub mod aiptw;
/// Percentile bootstrap interval helpers for caller-driven resampling.
pub mod bootstrap;
/// Weight positivity and covariate-balance diagnostics.
pub mod diagnostics;
/// Time-varying Monte Carlo g-formula simulation engine.
pub mod gformula;
/// Inverse probability of censoring weights.
pub mod ipcw;
/// Inverse probability of missingness weights.
pub mod ipmw;
/// Inverse probability of treatment weights.
pub mod iptw;
/// Targeted maximum likelihood estimation.
pub mod tmle;

pub use aiptw::{Aiptw, AiptwResult};
pub use bootstrap::{percentile_interval, quantile_linear};
pub use diagnostics::{
    standardized_mean_differences, weight_summary, BalanceVariable, StandardizedDifference,
    VariableScale, WeightSummary,
};
pub use gformula::{
    BaselineRecord, CovariateModel, MonteCarloGFormula, SimulatedCohort, SimulatedInterval,
    SimulationConfig, SubjectStatus, TreatmentPolicy, VariableKind,
};
pub use ipcw::{expand_flat_records, CensoringRecord, FlatRecord, Ipcw, IpcwWeights};
pub use ipmw::Ipmw;
pub use iptw::{Iptw, Standardization, WeightSet};
pub use tmle::{Tmle, TmleResult};
