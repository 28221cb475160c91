//! # ek-core
//!
//! Core building blocks for epikit:
//! - the shared [`Error`]/[`Result`] types,
//! - the prediction-model traits that decouple estimators from whatever
//!   fitted the models (`ProbabilityModel`, `ValueModel`),
//! - the [`CovariateState`] record passed through each simulation step,
//! - shared result types (`IntervalEstimate`).
//!
//! ## Architecture
//!
//! Estimator crates depend on the traits defined here, NOT on any concrete
//! regression or machine-learning implementation. Fitted models arrive from
//! the caller as anything implementing `predict(state) -> value`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod state;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use state::CovariateState;
pub use traits::{ProbabilityFn, ProbabilityModel, ValueFn, ValueModel};
pub use types::IntervalEstimate;

/// Crate version, stamped into serialized artifacts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
