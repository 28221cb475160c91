//! Effect-measure forest plot artifact (numbers-first).
//!
//! One labelled row per estimate, plus the axis hints a renderer needs:
//! the scale (linear for differences, log for ratios) and the null
//! reference line (0 and 1 respectively).

use ek_core::{Error, IntervalEstimate, Result};
use serde::Serialize;

use crate::meta::ArtifactMeta;

/// Axis scale for the plotted measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForestScale {
    /// Difference measures; null reference at 0.
    Linear,
    /// Ratio measures; null reference at 1.
    Log,
}

/// Forest plot artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ForestArtifact {
    /// Artifact schema identifier.
    pub schema_version: String,
    /// Provenance.
    pub meta: ArtifactMeta,
    /// Axis scale hint.
    pub scale: ForestScale,
    /// Null reference line (0 for linear, 1 for log).
    pub reference: f64,
    /// Rows in input order (the caller's presentation order).
    pub rows: Vec<ForestRow>,
}

/// One labelled estimate row.
#[derive(Debug, Clone, Serialize)]
pub struct ForestRow {
    /// Display label.
    pub label: String,
    /// Point estimate.
    pub estimate: f64,
    /// Lower confidence bound, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    /// Upper confidence bound, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

/// Build a forest plot artifact from labelled estimates.
///
/// Row order is preserved: effect-measure tables are presented in the
/// caller's order, not resorted.
///
/// # Errors
/// Validation errors on length mismatches, empty input, non-finite
/// estimates, or non-positive values under the log scale.
pub fn forest_artifact(
    labels: &[&str],
    estimates: &[IntervalEstimate],
    scale: ForestScale,
) -> Result<ForestArtifact> {
    if labels.is_empty() {
        return Err(Error::Validation("forest artifact needs at least one row".to_string()));
    }
    if labels.len() != estimates.len() {
        return Err(Error::Validation(format!(
            "labels/estimates length mismatch: {} vs {}",
            labels.len(),
            estimates.len()
        )));
    }

    let mut rows = Vec::with_capacity(labels.len());
    for (label, estimate) in labels.iter().zip(estimates) {
        if !estimate.estimate.is_finite() {
            return Err(Error::Validation(format!(
                "estimate for '{label}' must be finite, got {}",
                estimate.estimate
            )));
        }
        if scale == ForestScale::Log {
            let positive = estimate.estimate > 0.0
                && estimate.lower.map_or(true, |v| v > 0.0)
                && estimate.upper.map_or(true, |v| v > 0.0);
            if !positive {
                return Err(Error::Validation(format!(
                    "log-scale row '{label}' requires strictly positive values"
                )));
            }
        }
        rows.push(ForestRow {
            label: (*label).to_string(),
            estimate: estimate.estimate,
            lower: estimate.lower,
            upper: estimate.upper,
        });
    }

    Ok(ForestArtifact {
        schema_version: "epikit_forest_v1".to_string(),
        meta: ArtifactMeta::new()?,
        scale,
        reference: match scale {
            ForestScale::Linear => 0.0,
            ForestScale::Log => 1.0,
        },
        rows,
    })
}
