//! Love-plot covariate balance artifact (numbers-first).
//!
//! Absolute standardized mean differences per variable, weighted and
//! unweighted, with the conventional 0.10 reference line. Entries are
//! sorted by descending unweighted difference so the most imbalanced
//! variables render first.

use ek_causal::diagnostics::StandardizedDifference;
use ek_core::{Error, Result};
use serde::Serialize;

use crate::meta::ArtifactMeta;

/// Love plot artifact.
#[derive(Debug, Clone, Serialize)]
pub struct LovePlotArtifact {
    /// Artifact schema identifier.
    pub schema_version: String,
    /// Provenance.
    pub meta: ArtifactMeta,
    /// Ordering applied to `entries`.
    pub ordering_policy: String,
    /// Conventional balance threshold (0.10).
    pub threshold: f64,
    /// Per-variable absolute differences, most imbalanced first.
    pub entries: Vec<LoveEntry>,
}

/// One variable's balance entry.
#[derive(Debug, Clone, Serialize)]
pub struct LoveEntry {
    /// Variable label.
    pub label: String,
    /// |SMD| before weighting.
    pub unweighted: f64,
    /// |SMD| after weighting.
    pub weighted: f64,
}

/// Build a love plot artifact from standardized mean differences.
///
/// # Errors
/// Rejects empty input and non-finite differences.
pub fn love_plot_artifact(differences: &[StandardizedDifference]) -> Result<LovePlotArtifact> {
    if differences.is_empty() {
        return Err(Error::Validation("love plot needs at least one variable".to_string()));
    }
    let mut entries: Vec<LoveEntry> = differences
        .iter()
        .map(|d| {
            if !d.unweighted.is_finite() || !d.weighted.is_finite() {
                return Err(Error::Validation(format!(
                    "differences for '{}' must be finite",
                    d.label
                )));
            }
            Ok(LoveEntry {
                label: d.label.clone(),
                unweighted: d.unweighted.abs(),
                weighted: d.weighted.abs(),
            })
        })
        .collect::<Result<_>>()?;

    entries.sort_by(|a, b| {
        b.unweighted.partial_cmp(&a.unweighted).unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(LovePlotArtifact {
        schema_version: "epikit_love_v1".to_string(),
        meta: ArtifactMeta::new()?,
        ordering_policy: "unweighted_desc".to_string(),
        threshold: 0.1,
        entries,
    })
}
