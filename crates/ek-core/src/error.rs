//! Error types for epikit.

use thiserror::Error;

/// epikit error type.
///
/// Estimator misuse surfaces as configuration errors (`Specification`,
/// `UndefinedVariable`) raised before any simulation or weighting starts;
/// `Validation`/`Computation` cover bad data and numerical breakdowns.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An estimator was asked to run before its required models were registered
    #[error("Specification error: {0}")]
    Specification(String),

    /// A model, policy, or recode referenced a variable not present in the state
    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    /// Input data failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Numerical computation failed
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
