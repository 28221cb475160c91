//! Weight / propensity distribution artifact (numbers-first).
//!
//! Per-arm five-number summaries plus means: exactly the numbers a
//! stratified boxplot of weights or propensity scores renders when
//! checking positivity qualitatively.

use ek_causal::bootstrap::quantile_linear;
use ek_core::{Error, Result};
use serde::Serialize;

use crate::meta::ArtifactMeta;

/// Distribution artifact for weights or propensities by treatment arm.
#[derive(Debug, Clone, Serialize)]
pub struct WeightDistributionArtifact {
    /// Artifact schema identifier.
    pub schema_version: String,
    /// Provenance.
    pub meta: ArtifactMeta,
    /// What was summarized ("weight" or "probability").
    pub measure: String,
    /// Treated-arm summary.
    pub treated: ArmSummary,
    /// Untreated-arm summary.
    pub untreated: ArmSummary,
}

/// Five-number summary plus mean for one arm.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ArmSummary {
    /// Number of observations.
    pub n: usize,
    /// Mean.
    pub mean: f64,
    /// Minimum.
    pub min: f64,
    /// First quartile.
    pub q1: f64,
    /// Median.
    pub median: f64,
    /// Third quartile.
    pub q3: f64,
    /// Maximum.
    pub max: f64,
}

fn summarize(values: &[f64], arm: &str) -> Result<ArmSummary> {
    if values.is_empty() {
        return Err(Error::Validation(format!("{arm} arm has no observations")));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation(format!("{arm} arm contains non-finite values")));
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Ok(ArmSummary {
        n: values.len(),
        mean,
        min: quantile_linear(values, 0.0),
        q1: quantile_linear(values, 0.25),
        median: quantile_linear(values, 0.5),
        q3: quantile_linear(values, 0.75),
        max: quantile_linear(values, 1.0),
    })
}

/// Build a distribution artifact from per-arm values.
///
/// `measure` names what the values are (e.g. `"weight"` or
/// `"probability"`) and is carried into the artifact for axis labelling.
///
/// # Errors
/// Rejects an empty arm or non-finite values.
pub fn weight_distribution_artifact(
    treated: &[f64],
    untreated: &[f64],
    measure: &str,
) -> Result<WeightDistributionArtifact> {
    Ok(WeightDistributionArtifact {
        schema_version: "epikit_weight_dist_v1".to_string(),
        meta: ArtifactMeta::new()?,
        measure: measure.to_string(),
        treated: summarize(treated, "treated")?,
        untreated: summarize(untreated, "untreated")?,
    })
}
