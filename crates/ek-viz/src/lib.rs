//! # ek-viz
//!
//! Visualization data artifacts for epikit.
//!
//! This crate is intentionally dependency-light and focuses on emitting
//! plot-friendly JSON structures (flat arrays, stable ordering, explicit
//! schema versions). No rendering happens here; a forest plot, love plot,
//! weight boxplot, or risk curve is drawn by whatever consumes the
//! artifact.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Love-plot covariate balance artifacts.
pub mod balance;
/// Effect-measure forest plot artifacts.
pub mod forest;
/// Shared artifact metadata.
pub mod meta;
/// Simulated cumulative-incidence curve artifacts.
pub mod risk_curve;
/// Weight and propensity distribution artifacts.
pub mod weights;

pub use balance::{love_plot_artifact, LoveEntry, LovePlotArtifact};
pub use forest::{forest_artifact, ForestArtifact, ForestRow, ForestScale};
pub use meta::ArtifactMeta;
pub use risk_curve::{risk_curve_artifact, RiskCurveArtifact, RiskCurvePoint};
pub use weights::{weight_distribution_artifact, ArmSummary, WeightDistributionArtifact};
