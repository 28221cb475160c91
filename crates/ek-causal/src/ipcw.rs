//! Inverse probability of censoring weights.
//!
//! Weights correct for informative loss to follow-up: per subject, the
//! weight at time `t` is the cumulative product over intervals up to `t`
//! of `numerator / denominator`, where both are fitted probabilities of
//! remaining uncensored given history. Unstabilized weights use a constant
//! numerator of 1.

use std::collections::BTreeSet;

use ek_core::{CovariateState, Error, ProbabilityModel, Result};

/// One observation interval in long-format follow-up data.
#[derive(Debug, Clone)]
pub struct CensoringRecord {
    /// Subject identifier.
    pub id: u64,
    /// Interval entry time; the ordering key within a subject.
    pub time: u32,
    /// Whether the outcome event occurred in this interval.
    pub event: bool,
    /// Covariate history available at this interval.
    pub covariates: CovariateState,
}

/// One-row-per-subject follow-up data, expanded by
/// [`expand_flat_records`].
#[derive(Debug, Clone)]
pub struct FlatRecord {
    /// Subject identifier.
    pub id: u64,
    /// Last follow-up time.
    pub time: u32,
    /// Whether the subject had the event at `time`.
    pub event: bool,
    /// Entry time (0 unless late entry).
    pub enter: u32,
    /// Baseline covariates, replicated onto every interval.
    pub covariates: CovariateState,
}

/// Output of [`Ipcw::fit`], aligned with the input record order.
#[derive(Debug, Clone)]
pub struct IpcwWeights {
    /// Cumulative-product weight per record.
    pub weights: Vec<f64>,
    /// Derived uncensored indicator per record (the outcome the caller's
    /// censoring models were fitted against).
    pub uncensored: Vec<bool>,
}

/// Inverse probability of censoring weight calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipcw;

impl Ipcw {
    /// Create a calculator.
    pub fn new() -> Self {
        Self
    }

    /// Compute per-interval censoring weights.
    ///
    /// Records may arrive in any order; weights are returned in the input
    /// order. Passing `None` for the numerator model yields unstabilized
    /// weights.
    ///
    /// # Errors
    /// - validation: empty input, duplicate `(id, time)` pairs, or a
    ///   maximum observation time of 1 or less (cumulative products need
    ///   more than one period to estimate censoring);
    /// - validation: predicted probabilities outside `(0, 1]`.
    pub fn fit(
        &self,
        records: &[CensoringRecord],
        denominator_model: &dyn ProbabilityModel,
        numerator_model: Option<&dyn ProbabilityModel>,
    ) -> Result<IpcwWeights> {
        if records.is_empty() {
            return Err(Error::Validation("records must be non-empty".to_string()));
        }
        let max_time = records.iter().map(|r| r.time).max().unwrap_or(0);
        if max_time <= 1 {
            return Err(Error::Validation(
                "maximum observation time must exceed 1 for censoring weights; more periods \
                 give better weight estimation"
                    .to_string(),
            ));
        }

        let mut order: Vec<usize> = (0..records.len()).collect();
        order.sort_by_key(|&i| (records[i].id, records[i].time));
        let mut seen = BTreeSet::new();
        for &i in &order {
            if !seen.insert((records[i].id, records[i].time)) {
                return Err(Error::Validation(format!(
                    "duplicate interval for subject {} at time {}",
                    records[i].id, records[i].time
                )));
            }
        }

        let uncensored_sorted = uncensored_in_order(records, &order, max_time);

        let mut weights = vec![0.0; records.len()];
        let mut uncensored = vec![true; records.len()];
        let mut current_id: Option<u64> = None;
        let mut cum_numer = 1.0;
        let mut cum_denom = 1.0;
        for (pos, &i) in order.iter().enumerate() {
            let record = &records[i];
            if current_id != Some(record.id) {
                current_id = Some(record.id);
                cum_numer = 1.0;
                cum_denom = 1.0;
            }
            let d = denominator_model.predict_probability(&record.covariates)?;
            cum_denom *= ensure_half_open_unit(d, "denominator model")?;
            if let Some(model) = numerator_model {
                let n = model.predict_probability(&record.covariates)?;
                cum_numer *= ensure_half_open_unit(n, "numerator model")?;
            }
            weights[i] = cum_numer / cum_denom;
            uncensored[i] = uncensored_sorted[pos];
        }

        Ok(IpcwWeights { weights, uncensored })
    }
}

/// Derive the uncensored indicator in sorted order: a subject's last
/// interval with no event is a censoring, unless follow-up ran to the
/// administrative end of observation.
fn uncensored_in_order(records: &[CensoringRecord], order: &[usize], max_time: u32) -> Vec<bool> {
    let n = order.len();
    let mut out = vec![true; n];
    for (pos, &i) in order.iter().enumerate() {
        let record = &records[i];
        let last_of_subject =
            pos + 1 == n || records[order[pos + 1]].id != record.id;
        if last_of_subject && !record.event && record.time < max_time {
            out[pos] = false;
        }
    }
    out
}

fn ensure_half_open_unit(p: f64, what: &str) -> Result<f64> {
    if !p.is_finite() || p <= 0.0 || p > 1.0 {
        return Err(Error::Validation(format!(
            "{what} must predict probabilities in (0,1], got {p}"
        )));
    }
    Ok(p)
}

/// Expand one-row-per-subject data into one record per time unit.
///
/// Each subject contributes intervals `enter..time`; the event, if any, is
/// placed on the final interval and baseline covariates are replicated.
/// Intervals before `enter` are omitted (late entry).
///
/// # Errors
/// Rejects subjects whose entry time is not strictly before their exit
/// time.
pub fn expand_flat_records(records: &[FlatRecord]) -> Result<Vec<CensoringRecord>> {
    let mut out = Vec::new();
    for record in records {
        if record.enter >= record.time {
            return Err(Error::Validation(format!(
                "subject {}: entry time {} must precede exit time {}",
                record.id, record.enter, record.time
            )));
        }
        for t in record.enter..record.time {
            out.push(CensoringRecord {
                id: record.id,
                time: t,
                event: record.event && t + 1 == record.time,
                covariates: record.covariates.clone(),
            });
        }
    }
    Ok(out)
}
