//! Simulated cumulative-incidence curve artifact (numbers-first).
//!
//! Tabulates a synthetic cohort's outcome trajectory per interval: at-risk
//! counts, events, and the running cumulative incidence under the policy
//! the cohort was simulated with. This is bookkeeping over simulated rows;
//! survival estimation on observed data stays outside this toolkit.

use ek_causal::gformula::SimulatedCohort;
use ek_core::{Error, Result};
use serde::Serialize;

use crate::meta::ArtifactMeta;

/// Cumulative-incidence curve artifact for one simulated policy.
#[derive(Debug, Clone, Serialize)]
pub struct RiskCurveArtifact {
    /// Artifact schema identifier.
    pub schema_version: String,
    /// Provenance.
    pub meta: ArtifactMeta,
    /// Caller-supplied label for the policy (e.g. "treat-all").
    pub policy: String,
    /// Number of simulated subjects.
    pub n_subjects: usize,
    /// One point per interval, in time order, starting at time 0 with
    /// incidence 0.
    pub points: Vec<RiskCurvePoint>,
}

/// One step of the cumulative-incidence curve.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RiskCurvePoint {
    /// Interval exit time.
    pub time: u32,
    /// Subjects entering the interval at risk.
    pub at_risk: usize,
    /// Events during the interval.
    pub events: usize,
    /// Cumulative incidence at `time`.
    pub cumulative_incidence: f64,
}

/// Build the cumulative-incidence curve from a simulated cohort.
///
/// # Errors
/// Rejects an empty cohort.
pub fn risk_curve_artifact(cohort: &SimulatedCohort, policy: &str) -> Result<RiskCurveArtifact> {
    let n = cohort.n_subjects();
    if n == 0 || cohort.rows().is_empty() {
        return Err(Error::Validation("cohort has no simulated rows".to_string()));
    }

    let t_max = cohort.t_max() as usize;
    let mut at_risk = vec![0usize; t_max];
    let mut events = vec![0usize; t_max];
    for row in cohort.rows() {
        let t = row.t_in as usize;
        at_risk[t] += 1;
        events[t] += usize::from(row.event == 1);
    }

    let mut points = Vec::with_capacity(t_max + 1);
    points.push(RiskCurvePoint { time: 0, at_risk: n, events: 0, cumulative_incidence: 0.0 });
    let mut cumulative = 0usize;
    for t in 0..t_max {
        // Past the longest trajectory every subject is in an absorbing
        // state; the curve is flat from there on.
        if at_risk[t] == 0 {
            break;
        }
        cumulative += events[t];
        points.push(RiskCurvePoint {
            time: (t + 1) as u32,
            at_risk: at_risk[t],
            events: events[t],
            cumulative_incidence: cumulative as f64 / n as f64,
        });
    }

    Ok(RiskCurveArtifact {
        schema_version: "epikit_risk_curve_v1".to_string(),
        meta: ArtifactMeta::new()?,
        policy: policy.to_string(),
        n_subjects: n,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ek_causal::gformula::{
        BaselineRecord, MonteCarloGFormula, SimulationConfig, TreatmentPolicy,
    };
    use ek_core::{CovariateState, ProbabilityFn};

    fn cohort(hazard: f64, n_subjects: usize) -> SimulatedCohort {
        let baseline = vec![BaselineRecord {
            id: 1,
            exit_time: 4,
            covariates: CovariateState::from_pairs([("x", 0.0)]).unwrap(),
        }];
        let mut gf = MonteCarloGFormula::new(baseline, "art", "dead").unwrap();
        gf.outcome_model(ProbabilityFn::new(move |_s: &CovariateState| Ok(hazard)));
        gf.simulate(&SimulationConfig {
            policy: TreatmentPolicy::None,
            n_subjects,
            t_max: Some(4),
            seed: 8,
            n_threads: 1,
        })
        .unwrap()
    }

    #[test]
    fn certain_event_curve_jumps_to_one() {
        let artifact = risk_curve_artifact(&cohort(1.0, 10), "treat-none").unwrap();
        assert_eq!(artifact.points.len(), 2);
        assert_eq!(artifact.points[0].cumulative_incidence, 0.0);
        assert_eq!(artifact.points[1].at_risk, 10);
        assert_eq!(artifact.points[1].events, 10);
        assert_eq!(artifact.points[1].cumulative_incidence, 1.0);
    }

    #[test]
    fn event_free_curve_stays_flat_with_everyone_at_risk() {
        let artifact = risk_curve_artifact(&cohort(0.0, 7), "treat-none").unwrap();
        assert_eq!(artifact.points.len(), 5);
        for point in &artifact.points {
            assert_eq!(point.cumulative_incidence, 0.0);
        }
        assert!(artifact.points[1..].iter().all(|p| p.at_risk == 7));
    }

    #[test]
    fn at_risk_counts_shrink_as_events_accumulate() {
        let artifact = risk_curve_artifact(&cohort(0.5, 200), "treat-none").unwrap();
        let at_risk: Vec<usize> = artifact.points[1..].iter().map(|p| p.at_risk).collect();
        assert!(at_risk.windows(2).all(|w| w[1] <= w[0]));
        let ci: Vec<f64> =
            artifact.points.iter().map(|p| p.cumulative_incidence).collect();
        assert!(ci.windows(2).all(|w| w[1] >= w[0]));
        let last = artifact.points.last().unwrap();
        assert!(last.cumulative_incidence > 0.5 && last.cumulative_incidence < 1.0);
    }
}
